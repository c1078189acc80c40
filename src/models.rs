//! Core data models for the voice banking assistant

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_ACCOUNT: &str = "savings";
pub const DEFAULT_CHANNEL: &str = "UPI";

//
// ================= User =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default = "default_language")]
    pub preferred_language: String,
    /// Hex SHA-256 of `user_id:password`
    pub password_hash: String,
    #[serde(default)]
    pub voice_embedding: Option<Vec<f64>>,
    #[serde(default)]
    pub balances: BTreeMap<String, f64>,
    pub daily_limit: f64,
    #[serde(default)]
    pub credit_score: Option<u32>,
}

impl User {
    pub fn balance(&self, account_type: &str) -> Option<f64> {
        self.balances.get(account_type).copied()
    }

    pub fn has_voice_profile(&self) -> bool {
        self.voice_embedding
            .as_ref()
            .map(|e| !e.is_empty())
            .unwrap_or(false)
    }
}

fn default_language() -> String {
    "en".to_string()
}

//
// ================= Session =================
//

/// Coarse login phase derived from the stored OTP.
/// `Authenticated` is never stored: holding a valid access token is the proof.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Anonymous,
    OtpPending,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialogueState {
    pub session_id: String,
    pub user_id: String,
    pub route: String,
    #[serde(default)]
    pub field_to_focus: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub dialog_trace: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferRequest {
    pub amount: f64,
    pub counterparty: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_account")]
    pub account_type: String,
    #[serde(default)]
    pub upi: Option<String>,
    #[serde(default)]
    pub ifsc: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
}

impl TransferRequest {
    pub fn new(amount: f64, counterparty: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            amount,
            counterparty: counterparty.into(),
            channel: channel.into(),
            account_type: default_account(),
            upi: None,
            ifsc: None,
            account_number: None,
        }
    }

    pub fn summary(&self) -> String {
        format!("{} to {} via {}", self.amount, self.counterparty, self.channel)
    }
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

fn default_account() -> String {
    DEFAULT_ACCOUNT.to_string()
}

/// Pending transfer awaiting confirmation (at most one per user)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferSession {
    pub session_id: String,
    pub request: TransferRequest,
    pub mfa_required: bool,
    pub created_at: DateTime<Utc>,
}

/// Per-user session record: OTP, dialogue state and the pending transfer slot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub user_id: String,
    #[serde(default)]
    pub otp: Option<String>,
    #[serde(default)]
    pub otp_expires: Option<DateTime<Utc>>,
    pub state: DialogueState,
    #[serde(default)]
    pub transfer_session: Option<TransferSession>,
    pub updated_at: DateTime<Utc>,
}

//
// ================= Ledger =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Success,
}

/// Immutable record of a completed transfer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub txn_id: String,
    pub user_id: String,
    pub amount: f64,
    pub counterparty: String,
    pub channel: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    /// Transfer session that produced this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_session_id: Option<String>,
}

/// Result of applying a transfer to the store
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Applied(Transaction),
    AlreadyApplied(Transaction),
}

impl TransferOutcome {
    pub fn into_transaction(self) -> Transaction {
        match self {
            TransferOutcome::Applied(t) | TransferOutcome::AlreadyApplied(t) => t,
        }
    }
}

//
// ================= Loans & Reminders =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Loan {
    pub loan_id: String,
    pub user_id: String,
    pub loan_type: String,
    pub interest_rate: f64,
    pub outstanding: f64,
    pub emi_due: f64,
    pub next_due: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReminderChannel {
    Push,
    Voice,
    Email,
}

impl FromStr for ReminderChannel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "push" => Ok(ReminderChannel::Push),
            "voice" => Ok(ReminderChannel::Voice),
            "email" => Ok(ReminderChannel::Email),
            other => Err(format!("unsupported reminder channel: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reminder {
    pub reminder_id: String,
    pub user_id: String,
    pub title: String,
    pub schedule_iso: String,
    pub channel: ReminderChannel,
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        parse_schedule(&self.schedule_iso)
    }
}

/// Parse an ISO-8601 schedule. Timestamps without an offset are taken as UTC.
pub fn parse_schedule(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

//
// ================= Auth =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Outcome of a voice login check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct VoiceCheck {
    pub success: bool,
    pub similarity: f64,
    pub fallback_required: bool,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Success => "SUCCESS",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for ReminderChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReminderChannel::Push => "push",
            ReminderChannel::Voice => "voice",
            ReminderChannel::Email => "email",
        };
        write!(f, "{}", s)
    }
}
