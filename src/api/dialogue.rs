//! Voice turn and session endpoints

use axum::extract::{Path, State};
use serde::Deserialize;

use super::{failure, respond, ApiJson, ApiReply, ApiState, AuthUser};
use crate::error::BankingError;

#[derive(Debug, Deserialize)]
pub struct VoiceTurnRequest {
    pub audio_base64: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// Focused form field, e.g. `amount` or `recipient`
    #[serde(default)]
    pub context: Option<String>,
}

pub fn default_language() -> String {
    "en".to_string()
}

pub async fn voice_turn(
    State(state): State<ApiState>,
    user: AuthUser,
    ApiJson(req): ApiJson<VoiceTurnRequest>,
) -> ApiReply {
    respond(
        state
            .assistant
            .dialogue
            .process_voice_turn(
                user.user_id(),
                &req.audio_base64,
                &req.language,
                req.context.as_deref(),
            )
            .await,
    )
}

pub async fn session(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(user_id): Path<String>,
) -> ApiReply {
    if user_id != user.user_id() {
        return failure(&BankingError::Forbidden(
            "cannot access another user's session".into(),
        ));
    }
    respond(state.assistant.auth.session_state(&user_id).await)
}
