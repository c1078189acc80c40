//! Login, token and voice enrollment endpoints

use axum::extract::State;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{respond, ApiJson, ApiReply, ApiState};
use crate::models::TokenPair;
use crate::voice::decode_audio;
use crate::Result;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub user_id: String,
    #[serde(default)]
    pub otp: String,
    #[serde(default)]
    pub audio_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct VoiceEnrollRequest {
    pub user_id: String,
    pub audio_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct VoiceVerifyRequest {
    pub user_id: String,
    pub audio_base64: String,
    #[serde(default)]
    pub otp: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenResponse {
    fn bearer(tokens: TokenPair, expires_in: i64) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: "bearer".to_string(),
            expires_in,
        }
    }
}

pub async fn login(State(state): State<ApiState>, ApiJson(req): ApiJson<LoginRequest>) -> ApiReply {
    info!(username = %req.username, "Login attempt");
    respond(state.assistant.auth.login(&req.username, &req.password).await)
}

pub async fn issue_token(State(state): State<ApiState>, ApiJson(req): ApiJson<TokenRequest>) -> ApiReply {
    respond(exchange_for_tokens(&state, &req).await)
}

async fn exchange_for_tokens(state: &ApiState, req: &TokenRequest) -> Result<TokenResponse> {
    let auth = &state.assistant.auth;
    let audio = decode_audio(&req.audio_base64)?;
    let tokens = auth.issue_tokens(&req.user_id, &req.otp, &audio).await?;
    Ok(TokenResponse::bearer(tokens, auth.expires_in()))
}

pub async fn refresh(State(state): State<ApiState>, ApiJson(req): ApiJson<RefreshRequest>) -> ApiReply {
    let auth = &state.assistant.auth;
    let result = auth
        .refresh(&req.refresh_token)
        .await
        .map(|tokens| TokenResponse::bearer(tokens, auth.expires_in()));
    respond(result)
}

pub async fn logout(State(state): State<ApiState>, ApiJson(req): ApiJson<RefreshRequest>) -> ApiReply {
    let result = state.assistant.auth.revoke(&req.refresh_token).await;
    respond(result.map(|()| json!({ "status": "logged_out" })))
}

pub async fn enroll_voice(
    State(state): State<ApiState>,
    ApiJson(req): ApiJson<VoiceEnrollRequest>,
) -> ApiReply {
    let result = match decode_audio(&req.audio_base64) {
        Ok(audio) => state.assistant.auth.enroll_voice(&req.user_id, &audio).await,
        Err(e) => Err(e),
    };
    respond(result.map(|()| json!({ "status": "enrolled" })))
}

pub async fn verify_voice(
    State(state): State<ApiState>,
    ApiJson(req): ApiJson<VoiceVerifyRequest>,
) -> ApiReply {
    let result = match decode_audio(&req.audio_base64) {
        Ok(audio) => {
            state
                .assistant
                .auth
                .verify_voice(&req.user_id, &audio, req.otp.as_deref())
                .await
        }
        Err(e) => Err(e),
    };
    respond(result)
}
