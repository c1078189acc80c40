//! Banking endpoints. All require a bearer token.

use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{failure, respond, ApiJson, ApiReply, ApiState, AuthUser};
use crate::banking::MfaProof;
use crate::error::BankingError;
use crate::models::{TransactionStatus, TransferRequest, DEFAULT_ACCOUNT, DEFAULT_CHANNEL};

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub account_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TransferInitRequest {
    /// Ignored; the token subject is the payer.
    #[serde(default)]
    pub user_id: Option<String>,
    pub amount: f64,
    pub counterparty: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub upi: Option<String>,
    #[serde(default)]
    pub ifsc: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
}

impl From<TransferInitRequest> for TransferRequest {
    fn from(req: TransferInitRequest) -> Self {
        TransferRequest {
            amount: req.amount,
            counterparty: req.counterparty,
            channel: req.channel.unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
            account_type: req.account_type.unwrap_or_else(|| DEFAULT_ACCOUNT.to_string()),
            upi: req.upi,
            ifsc: req.ifsc,
            account_number: req.account_number,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TransferConfirmRequest {
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub otp: Option<String>,
    #[serde(default)]
    pub voice_verified: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TransferConfirmResponse {
    pub status: TransactionStatus,
    pub txn_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReminderRequest {
    pub title: String,
    pub schedule_iso: String,
    #[serde(default)]
    pub channel: Option<String>,
}

pub async fn balance(
    State(state): State<ApiState>,
    user: AuthUser,
    Query(query): Query<BalanceQuery>,
) -> ApiReply {
    respond(
        state
            .assistant
            .banking
            .balance(user.user_id(), query.account_type.as_deref())
            .await,
    )
}

pub async fn init_transfer(
    State(state): State<ApiState>,
    user: AuthUser,
    ApiJson(req): ApiJson<TransferInitRequest>,
) -> ApiReply {
    respond(
        state
            .assistant
            .transfers
            .init(user.user_id(), req.into())
            .await,
    )
}

pub async fn confirm_transfer(
    State(state): State<ApiState>,
    user: AuthUser,
    ApiJson(req): ApiJson<TransferConfirmRequest>,
) -> ApiReply {
    if let Some(claimed) = req.user_id.as_deref() {
        if claimed != user.user_id() {
            return failure(&BankingError::Forbidden("user mismatch".into()));
        }
    }

    let proof = MfaProof {
        otp: req.otp.as_deref(),
        voice_verified: req.voice_verified,
    };
    let result = state
        .assistant
        .transfers
        .confirm(user.user_id(), &req.session_id, proof)
        .await
        .map(|txn| TransferConfirmResponse {
            status: txn.status,
            txn_id: txn.txn_id,
        });
    respond(result)
}

pub async fn transactions(
    State(state): State<ApiState>,
    user: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> ApiReply {
    let result = state
        .assistant
        .banking
        .transactions(user.user_id(), query.limit)
        .await
        .map(|transactions| json!({ "transactions": transactions }));
    respond(result)
}

pub async fn loans(State(state): State<ApiState>, user: AuthUser) -> ApiReply {
    let result = state
        .assistant
        .banking
        .loans(user.user_id())
        .await
        .map(|loans| json!({ "loans": loans }));
    respond(result)
}

pub async fn create_reminder(
    State(state): State<ApiState>,
    user: AuthUser,
    ApiJson(req): ApiJson<ReminderRequest>,
) -> ApiReply {
    respond(
        state
            .assistant
            .banking
            .create_reminder(
                user.user_id(),
                &req.title,
                &req.schedule_iso,
                req.channel.as_deref(),
            )
            .await,
    )
}

pub async fn list_reminders(State(state): State<ApiState>, user: AuthUser) -> ApiReply {
    let result = state
        .assistant
        .banking
        .reminders(user.user_id())
        .await
        .map(|reminders| json!({ "reminders": reminders }));
    respond(result)
}

pub async fn due_reminders(State(state): State<ApiState>, user: AuthUser) -> ApiReply {
    respond(state.assistant.banking.due_reminders(user.user_id()).await)
}

pub async fn delete_reminder(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(reminder_id): Path<String>,
) -> ApiReply {
    let result = state
        .assistant
        .banking
        .delete_reminder(user.user_id(), &reminder_id)
        .await
        .map(|()| json!({ "status": "deleted", "reminder_id": reminder_id }));
    respond(result)
}

pub async fn eligible_offers(State(state): State<ApiState>, user: AuthUser) -> ApiReply {
    respond(state.assistant.banking.eligible_offers(user.user_id()).await)
}
