//! REST and WebSocket surface
//!
//! Every JSON response uses the [`ApiResponse`] envelope. Failures carry
//! the status code mapped from the error kind.

pub mod auth;
pub mod banking;
pub mod dialogue;
pub mod ws;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::assistant::Assistant;
use crate::error::{BankingError, ErrorKind};
use crate::models::User;
use crate::Result;
use ws::VoiceConnections;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

pub type ApiReply = (StatusCode, Json<ApiResponse>);

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn failure(err: &BankingError) -> ApiReply {
    let status = status_for(err.kind());
    if status.is_server_error() {
        error!(error = %err, "Request failed");
    }
    (status, Json(ApiResponse::error(err.to_string())))
}

/// Envelope a service result.
pub fn respond<T: Serialize>(result: Result<T>) -> ApiReply {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))),
        Err(err) => failure(&err),
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub assistant: Arc<Assistant>,
    pub connections: Arc<VoiceConnections>,
}

impl ApiState {
    pub fn new(assistant: Arc<Assistant>) -> Self {
        Self {
            assistant,
            connections: Arc::new(VoiceConnections::new()),
        }
    }
}

/// Caller resolved from `Authorization: Bearer <access token>`
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn user_id(&self) -> &str {
        &self.0.user_id
    }
}

pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = ApiReply;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Err(failure(&BankingError::TokenInvalid(
                "missing bearer token".into(),
            )));
        };

        match state.assistant.auth.authenticate(token).await {
            Ok(user) => Ok(AuthUser(user)),
            Err(err) => {
                warn!(error = %err, "Rejected bearer token");
                Err(failure(&err))
            }
        }
    }
}

/// JSON body whose parse failures still use the [`ApiResponse`] envelope
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiReply;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => {
                warn!(error = %rejection.body_text(), "Rejected request body");
                Err(failure(&BankingError::ValidationFailed(
                    rejection.body_text(),
                )))
            }
        }
    }
}

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "app": state.assistant.settings.app_name,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub fn create_router(assistant: Arc<Assistant>) -> Router {
    let state = ApiState::new(assistant);

    Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(auth::login))
        .route("/auth/token", post(auth::issue_token))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/voice/enroll", post(auth::enroll_voice))
        .route("/auth/voice/verify", post(auth::verify_voice))
        .route("/balance", get(banking::balance))
        .route("/transfer/init", post(banking::init_transfer))
        .route("/transfer/confirm", post(banking::confirm_transfer))
        .route("/transactions", get(banking::transactions))
        .route("/loans", get(banking::loans))
        .route(
            "/reminders",
            post(banking::create_reminder).get(banking::list_reminders),
        )
        .route("/reminders/due", get(banking::due_reminders))
        .route("/reminders/:reminder_id", delete(banking::delete_reminder))
        .route("/offers/eligible", get(banking::eligible_offers))
        .route("/dialogue/voice-turn", post(dialogue::voice_turn))
        .route("/dialogue/session/:user_id", get(dialogue::session))
        .route("/ws/voice", get(ws::voice_socket))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn start_server(
    assistant: Arc<Assistant>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(assistant);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
