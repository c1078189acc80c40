//! Banking service
//!
//! Balances, history, loans, reminders and product eligibility. Money
//! movement lives in [`transfer`].

pub mod offers;
pub mod transfer;

pub use offers::{EligibilityEngine, EligibilityRule, EligibleProducts, CustomerProfile};
pub use transfer::{MfaProof, TransferPolicy, TransferTicket, TransferWorkflow};

use crate::clock::Clock;
use crate::error::BankingError;
use crate::models::{
    parse_schedule, Loan, Reminder, ReminderChannel, Transaction, DEFAULT_ACCOUNT,
};
use crate::store::BankStore;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use offers::DEFAULT_CREDIT_SCORE;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Default page size for transaction history
pub const DEFAULT_HISTORY_LIMIT: usize = 5;
const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceView {
    pub account_type: String,
    pub balance: f64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderReceipt {
    pub reminder_id: String,
    pub next_run: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DueReminders {
    pub reminders: Vec<Reminder>,
    pub count: usize,
}

pub struct BankingService {
    store: Arc<dyn BankStore>,
    clock: Arc<dyn Clock>,
    eligibility: EligibilityEngine,
    reminder_lookahead: Duration,
}

impl BankingService {
    pub fn new(store: Arc<dyn BankStore>, clock: Arc<dyn Clock>, reminder_lookahead_minutes: i64) -> Self {
        Self {
            store,
            clock,
            eligibility: EligibilityEngine::standard(),
            reminder_lookahead: Duration::minutes(reminder_lookahead_minutes),
        }
    }

    pub async fn balance(&self, user_id: &str, account_type: Option<&str>) -> Result<BalanceView> {
        let account_type = account_type.unwrap_or(DEFAULT_ACCOUNT);
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| BankingError::NotFound(format!("user {}", user_id)))?;

        let balance = user
            .balance(account_type)
            .ok_or_else(|| BankingError::NotFound(format!("account {}", account_type)))?;

        Ok(BalanceView {
            account_type: account_type.to_string(),
            balance,
            last_updated: self.clock.now(),
        })
    }

    /// Newest first
    pub async fn transactions(&self, user_id: &str, limit: Option<usize>) -> Result<Vec<Transaction>> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .min(MAX_HISTORY_LIMIT);
        self.store.list_transactions(user_id, limit).await
    }

    pub async fn loans(&self, user_id: &str) -> Result<Vec<Loan>> {
        self.store.list_loans(user_id).await
    }

    pub async fn create_reminder(
        &self,
        user_id: &str,
        title: &str,
        schedule_iso: &str,
        channel: Option<&str>,
    ) -> Result<ReminderReceipt> {
        let title = title.trim();
        if title.is_empty() {
            return Err(BankingError::ValidationFailed("title is required".into()));
        }
        let channel: ReminderChannel = channel
            .unwrap_or("push")
            .parse()
            .map_err(BankingError::ValidationFailed)?;
        if parse_schedule(schedule_iso).is_none() {
            return Err(BankingError::ValidationFailed(format!(
                "schedule_iso is not an ISO-8601 timestamp: {}",
                schedule_iso
            )));
        }

        let reminder = Reminder {
            reminder_id: format!("rem_{}", Uuid::new_v4().simple()),
            user_id: user_id.to_string(),
            title: title.to_string(),
            schedule_iso: schedule_iso.trim().to_string(),
            channel,
            created_at: self.clock.now(),
        };
        self.store.insert_reminder(&reminder).await?;

        info!(user_id, reminder_id = %reminder.reminder_id, channel = %channel, "Reminder created");

        Ok(ReminderReceipt {
            reminder_id: reminder.reminder_id,
            next_run: reminder.schedule_iso,
        })
    }

    pub async fn reminders(&self, user_id: &str) -> Result<Vec<Reminder>> {
        self.store.list_reminders(user_id).await
    }

    pub async fn delete_reminder(&self, user_id: &str, reminder_id: &str) -> Result<()> {
        if !self.store.delete_reminder(user_id, reminder_id).await? {
            return Err(BankingError::NotFound(format!("reminder {}", reminder_id)));
        }
        info!(user_id, reminder_id, "Reminder deleted");
        Ok(())
    }

    /// Reminders scheduled within `[now, now + lookahead]`
    pub async fn due_reminders(&self, user_id: &str) -> Result<DueReminders> {
        let now = self.clock.now();
        let horizon = now + self.reminder_lookahead;

        let reminders: Vec<Reminder> = self
            .store
            .list_reminders(user_id)
            .await?
            .into_iter()
            .filter(|r| match r.scheduled_at() {
                Some(at) => at >= now && at <= horizon,
                None => {
                    warn!(reminder_id = %r.reminder_id, schedule = %r.schedule_iso, "Skipping unparsable schedule");
                    false
                }
            })
            .collect();

        Ok(DueReminders {
            count: reminders.len(),
            reminders,
        })
    }

    pub async fn eligible_offers(&self, user_id: &str) -> Result<EligibleProducts> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| BankingError::NotFound(format!("user {}", user_id)))?;

        Ok(self.eligibility.evaluate(CustomerProfile {
            balance: user.balance(DEFAULT_ACCOUNT).unwrap_or(0.0),
            credit_score: user.credit_score.unwrap_or(DEFAULT_CREDIT_SCORE),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{seed_demo_data, InMemoryBankStore, DEMO_USER_ID};

    async fn service() -> (BankingService, Arc<ManualClock>) {
        let store: Arc<dyn BankStore> = Arc::new(InMemoryBankStore::new());
        seed_demo_data(store.as_ref()).await.unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        (BankingService::new(store, clock.clone(), 5), clock)
    }

    #[tokio::test]
    async fn test_balance_lookup() {
        let (banking, _) = service().await;
        let view = banking.balance(DEMO_USER_ID, None).await.unwrap();
        assert_eq!(view.account_type, "savings");
        assert_eq!(view.balance, 23_450.0);

        assert!(matches!(
            banking.balance(DEMO_USER_ID, Some("current")).await,
            Err(BankingError::NotFound(_))
        ));
        assert!(matches!(
            banking.balance("ghost", None).await,
            Err(BankingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_due_reminder_window() {
        let (banking, clock) = service().await;
        let now = clock.now();
        let soon = (now + Duration::minutes(3)).to_rfc3339();
        let later = (now + Duration::minutes(10)).to_rfc3339();
        let past = (now - Duration::minutes(1)).to_rfc3339();

        let due = banking
            .create_reminder(DEMO_USER_ID, "Card bill", &soon, Some("push"))
            .await
            .unwrap();
        banking
            .create_reminder(DEMO_USER_ID, "Rent", &later, Some("voice"))
            .await
            .unwrap();
        banking
            .create_reminder(DEMO_USER_ID, "Missed", &past, None)
            .await
            .unwrap();

        let listing = banking.due_reminders(DEMO_USER_ID).await.unwrap();
        assert_eq!(listing.count, 1);
        assert_eq!(listing.reminders[0].reminder_id, due.reminder_id);
        assert_eq!(banking.reminders(DEMO_USER_ID).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_reminder_validation() {
        let (banking, _) = service().await;
        assert!(matches!(
            banking
                .create_reminder(DEMO_USER_ID, "Bill", "2026-01-01T10:00:00Z", Some("sms"))
                .await,
            Err(BankingError::ValidationFailed(_))
        ));
        assert!(matches!(
            banking
                .create_reminder(DEMO_USER_ID, "Bill", "tomorrow", None)
                .await,
            Err(BankingError::ValidationFailed(_))
        ));
        assert!(matches!(
            banking
                .create_reminder(DEMO_USER_ID, "  ", "2026-01-01T10:00:00Z", None)
                .await,
            Err(BankingError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_reminder() {
        let (banking, _) = service().await;
        let receipt = banking
            .create_reminder(DEMO_USER_ID, "EMI", "2026-01-01T10:00:00Z", Some("email"))
            .await
            .unwrap();
        assert_eq!(receipt.next_run, "2026-01-01T10:00:00Z");

        banking.delete_reminder(DEMO_USER_ID, &receipt.reminder_id).await.unwrap();
        assert!(matches!(
            banking.delete_reminder(DEMO_USER_ID, &receipt.reminder_id).await,
            Err(BankingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_history_and_loans() {
        let (banking, _) = service().await;
        let history = banking.transactions(DEMO_USER_ID, None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].counterparty, "Rahul");

        let loans = banking.loans(DEMO_USER_ID).await.unwrap();
        assert_eq!(loans[0].emi_due, 4_500.0);
    }

    #[tokio::test]
    async fn test_eligible_offers_for_demo_user() {
        let (banking, _) = service().await;
        let sheet = banking.eligible_offers(DEMO_USER_ID).await.unwrap();
        assert_eq!(sheet.credit_score, 720);
        assert_eq!(sheet.balance, 23_450.0);
        assert_eq!(sheet.loans.len(), 3);
    }
}
