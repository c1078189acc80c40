//! Session state machine
//!
//! One [`SessionRecord`] per user holds the live OTP, the dialogue state and
//! the pending transfer slot. Mutations for a user are serialized through
//! [`UserLocks`]; different users never contend.

use crate::models::{DialogueState, SessionPhase, SessionRecord, TransferSession};
use crate::security::constant_time_eq;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Route shown before the first dialogue turn
pub const HOME_ROUTE: &str = "/home";

/// Registry of per-user mutation locks
#[derive(Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`'s state.
    pub async fn lock(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

impl DialogueState {
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            session_id: format!("session_{}", Uuid::new_v4().simple()),
            user_id: user_id.to_string(),
            route: HOME_ROUTE.to_string(),
            field_to_focus: None,
            updated_at: now,
            dialog_trace: Vec::new(),
        }
    }

    /// Append one user/assistant exchange and move to `route`.
    pub fn record_turn(
        &mut self,
        user_text: &str,
        assistant_text: &str,
        route: &str,
        field_to_focus: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.dialog_trace.push(format!("user:{}", user_text));
        self.dialog_trace.push(format!("assistant:{}", assistant_text));
        self.route = route.to_string();
        self.field_to_focus = field_to_focus;
        self.updated_at = now;
    }
}

impl SessionRecord {
    /// Record with no OTP and an empty dialogue.
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            otp: None,
            otp_expires: None,
            state: DialogueState::new(user_id, now),
            transfer_session: None,
            updated_at: now,
        }
    }

    /// Fresh record issued at login. A pending transfer from an earlier
    /// session is carried over so it can still be confirmed.
    pub fn for_login(
        user_id: &str,
        otp: String,
        otp_expires: DateTime<Utc>,
        previous: Option<SessionRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            otp: Some(otp),
            otp_expires: Some(otp_expires),
            transfer_session: previous.and_then(|p| p.transfer_session),
            ..Self::new(user_id, now)
        }
    }

    /// The stored OTP, if it has not expired at `now`.
    pub fn live_otp(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.otp, self.otp_expires) {
            (Some(otp), Some(expires)) if expires > now => Some(otp.as_str()),
            _ => None,
        }
    }

    pub fn otp_matches(&self, supplied: &str, now: DateTime<Utc>) -> bool {
        self.live_otp(now)
            .map(|stored| constant_time_eq(stored, supplied))
            .unwrap_or(false)
    }

    pub fn phase(&self, now: DateTime<Utc>) -> SessionPhase {
        if self.live_otp(now).is_some() {
            SessionPhase::OtpPending
        } else {
            SessionPhase::Anonymous
        }
    }

    pub fn attach_transfer(&mut self, transfer: TransferSession, now: DateTime<Utc>) {
        self.transfer_session = Some(transfer);
        self.updated_at = now;
    }

    /// The pending transfer, only if its id matches `session_id`.
    pub fn pending_transfer(&self, session_id: &str) -> Option<&TransferSession> {
        self.transfer_session
            .as_ref()
            .filter(|t| t.session_id == session_id)
    }

    pub fn clear_transfer(&mut self, now: DateTime<Utc>) {
        self.transfer_session = None;
        self.updated_at = now;
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
