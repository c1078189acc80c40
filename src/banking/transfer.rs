//! Two-phase transfer workflow
//!
//! `init` parks a pending transfer in the user's session; `confirm` passes
//! the MFA gate, applies the ledger entry and debit as one store operation,
//! then clears the slot. The transaction id is derived from the transfer
//! session id, so a confirm retried after a partial failure finds the
//! existing record instead of debiting twice.

use crate::clock::Clock;
use crate::config::MfaOtpPolicy;
use crate::error::BankingError;
use crate::models::{
    SessionRecord, Transaction, TransactionStatus, TransferOutcome, TransferRequest,
    TransferSession,
};
use crate::session::UserLocks;
use crate::store::BankStore;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Transfer MFA and funds policy
#[derive(Debug, Clone, Copy)]
pub struct TransferPolicy {
    /// Amounts at or above this need MFA at confirm time
    pub mfa_threshold: f64,
    pub otp_policy: MfaOtpPolicy,
    pub allow_overdraft: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferTicket {
    pub summary: String,
    pub mfa_required: bool,
    pub session_id: String,
}

/// Proof offered at confirm time
#[derive(Debug, Clone, Default)]
pub struct MfaProof<'a> {
    pub otp: Option<&'a str>,
    pub voice_verified: bool,
}

pub struct TransferWorkflow {
    store: Arc<dyn BankStore>,
    locks: Arc<UserLocks>,
    clock: Arc<dyn Clock>,
    policy: TransferPolicy,
}

impl TransferWorkflow {
    pub fn new(
        store: Arc<dyn BankStore>,
        locks: Arc<UserLocks>,
        clock: Arc<dyn Clock>,
        policy: TransferPolicy,
    ) -> Self {
        Self {
            store,
            locks,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> TransferPolicy {
        self.policy
    }

    /// Park a transfer in the user's session, replacing any earlier one.
    pub async fn init(&self, user_id: &str, request: TransferRequest) -> Result<TransferTicket> {
        validate(&request)?;

        let _guard = self.locks.lock(user_id).await;

        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| BankingError::NotFound(format!("user {}", user_id)))?;

        if request.amount > user.daily_limit {
            warn!(
                user_id,
                amount = request.amount,
                limit = user.daily_limit,
                "Transfer over daily limit"
            );
            return Err(BankingError::LimitExceeded {
                amount: request.amount,
                limit: user.daily_limit,
            });
        }

        let mut session = self
            .store
            .load_session(user_id)
            .await?
            .ok_or_else(|| BankingError::SessionMissing(user_id.to_string()))?;

        let now = self.clock.now();
        let mfa_required = request.amount >= self.policy.mfa_threshold;
        let session_id = format!("transfer_{}", Uuid::new_v4().simple());
        let summary = request.summary();

        if let Some(replaced) = &session.transfer_session {
            info!(user_id, replaced = %replaced.session_id, "Replacing pending transfer");
        }

        session.attach_transfer(
            TransferSession {
                session_id: session_id.clone(),
                request,
                mfa_required,
                created_at: now,
            },
            now,
        );
        self.store.save_session(&session).await?;

        info!(user_id, session_id = %session_id, mfa_required, "Transfer initiated");

        Ok(TransferTicket {
            summary,
            mfa_required,
            session_id,
        })
    }

    /// Commit the pending transfer named by `session_id`.
    pub async fn confirm(
        &self,
        user_id: &str,
        session_id: &str,
        proof: MfaProof<'_>,
    ) -> Result<Transaction> {
        let _guard = self.locks.lock(user_id).await;
        let now = self.clock.now();

        let mut session = self
            .store
            .load_session(user_id)
            .await?
            .ok_or_else(|| BankingError::TransferSessionMissing(session_id.to_string()))?;

        let pending = session
            .pending_transfer(session_id)
            .cloned()
            .ok_or_else(|| BankingError::TransferSessionMissing(session_id.to_string()))?;

        if pending.mfa_required && !self.mfa_satisfied(&session, &proof, now) {
            warn!(user_id, session_id, "MFA not satisfied");
            return Err(BankingError::AuthenticationFailed("MFA required".into()));
        }

        let txn_id = transaction_id(session_id);

        // A record under this id means an earlier confirm already debited.
        if let Some(existing) = self.store.find_transaction(&txn_id).await? {
            warn!(user_id, txn_id = %txn_id, "Recovering already applied transfer");
            session.clear_transfer(now);
            self.store.save_session(&session).await?;
            return Ok(existing);
        }

        let request = &pending.request;
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| BankingError::NotFound(format!("user {}", user_id)))?;

        if !self.policy.allow_overdraft {
            let available = user.balance(&request.account_type).unwrap_or(0.0);
            if available < request.amount {
                return Err(BankingError::InsufficientFunds {
                    requested: request.amount,
                    available,
                });
            }
        }

        let txn = Transaction {
            txn_id,
            user_id: user_id.to_string(),
            amount: request.amount,
            counterparty: request.counterparty.clone(),
            channel: request.channel.clone(),
            status: TransactionStatus::Success,
            created_at: now,
            transfer_session_id: Some(session_id.to_string()),
        };

        let outcome = self.store.apply_transfer(&txn, &request.account_type).await?;
        if let TransferOutcome::AlreadyApplied(_) = &outcome {
            warn!(user_id, txn_id = %txn.txn_id, "Ledger already held this transfer");
        }

        session.clear_transfer(now);
        self.store.save_session(&session).await?;

        let txn = outcome.into_transaction();
        info!(user_id, txn_id = %txn.txn_id, amount = txn.amount, "Transfer committed");
        Ok(txn)
    }

    fn mfa_satisfied(&self, session: &SessionRecord, proof: &MfaProof<'_>, now: DateTime<Utc>) -> bool {
        if proof.voice_verified {
            return true;
        }
        match proof.otp.map(str::trim).filter(|otp| !otp.is_empty()) {
            None => false,
            Some(_) if self.policy.otp_policy == MfaOtpPolicy::PresenceOnly => true,
            Some(otp) => session.otp_matches(otp, now),
        }
    }
}

fn validate(request: &TransferRequest) -> Result<()> {
    if !request.amount.is_finite() || request.amount <= 0.0 {
        return Err(BankingError::ValidationFailed(
            "amount must be a positive number".into(),
        ));
    }
    if request.counterparty.trim().is_empty() {
        return Err(BankingError::ValidationFailed(
            "counterparty is required".into(),
        ));
    }
    if request.account_type.trim().is_empty() {
        return Err(BankingError::ValidationFailed(
            "account_type is required".into(),
        ));
    }
    Ok(())
}

/// Ledger id for the transfer parked under `session_id`
pub fn transaction_id(session_id: &str) -> String {
    let digest = Sha256::digest(session_id.as_bytes());
    format!("txn_{}", &hex::encode(digest)[..24])
}
