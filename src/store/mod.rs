//! Persistence layer
//!
//! Typed document store for users, sessions, the transaction ledger, loans
//! and reminders. In-memory for development; Postgres when a database URL
//! is configured.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryBankStore;
pub use postgres::PostgresBankStore;

use crate::config::Settings;
use crate::models::{
    Loan, Reminder, SessionRecord, Transaction, TransactionStatus, TransferOutcome, User,
};
use crate::security::hash_password;
use crate::Result;
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Trait for bank state persistence
#[async_trait::async_trait]
pub trait BankStore: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn upsert_user(&self, user: &User) -> Result<()>;
    /// Returns false when the user does not exist.
    async fn set_voice_embedding(&self, user_id: &str, embedding: &[f64]) -> Result<bool>;

    async fn load_session(&self, user_id: &str) -> Result<Option<SessionRecord>>;
    async fn save_session(&self, session: &SessionRecord) -> Result<()>;

    /// Insert a ledger record unless one with the same id exists.
    /// Returns whether it was inserted.
    async fn insert_transaction(&self, txn: &Transaction) -> Result<bool>;
    async fn find_transaction(&self, txn_id: &str) -> Result<Option<Transaction>>;
    /// Record the transaction and debit `account_type` as one unit.
    /// A second call with the same `txn_id` debits nothing.
    async fn apply_transfer(&self, txn: &Transaction, account_type: &str)
        -> Result<TransferOutcome>;
    /// Newest first
    async fn list_transactions(&self, user_id: &str, limit: usize) -> Result<Vec<Transaction>>;

    async fn insert_loan(&self, loan: &Loan) -> Result<()>;
    async fn list_loans(&self, user_id: &str) -> Result<Vec<Loan>>;

    async fn insert_reminder(&self, reminder: &Reminder) -> Result<()>;
    /// Ordered by schedule string, ascending
    async fn list_reminders(&self, user_id: &str) -> Result<Vec<Reminder>>;
    /// Returns false when no reminder with that id belongs to the user.
    async fn delete_reminder(&self, user_id: &str, reminder_id: &str) -> Result<bool>;
}

/// Pick a backend from settings. Postgres pool creation failures fall back
/// to the in-memory store.
pub fn connect(settings: &Settings) -> Arc<dyn BankStore> {
    if let Some(url) = settings.database_url.as_deref() {
        match PostgresBankStore::connect_lazy(url) {
            Ok(store) => {
                info!("Bank store backend: postgres");
                return Arc::new(store);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres bank store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Bank store backend: in-memory");
    Arc::new(InMemoryBankStore::new())
}

pub const DEMO_USER_ID: &str = "user_001";
pub const DEMO_USERNAME: &str = "demo_user";
pub const DEMO_PASSWORD: &str = "bank-demo";

/// Provision the demo customer, one past transfer and one loan.
/// Existing records are left untouched.
pub async fn seed_demo_data(store: &dyn BankStore) -> Result<()> {
    if store.find_user(DEMO_USER_ID).await?.is_none() {
        let mut balances = BTreeMap::new();
        balances.insert("savings".to_string(), 23_450.0);

        store
            .upsert_user(&User {
                user_id: DEMO_USER_ID.to_string(),
                username: DEMO_USERNAME.to_string(),
                full_name: Some("Demo Customer".to_string()),
                preferred_language: "en".to_string(),
                password_hash: hash_password(DEMO_USER_ID, DEMO_PASSWORD),
                voice_embedding: None,
                balances,
                daily_limit: 50_000.0,
                credit_score: Some(720),
            })
            .await?;
        info!(user_id = DEMO_USER_ID, "Seeded demo user");
    }

    let now = Utc::now();

    store
        .insert_transaction(&Transaction {
            txn_id: "txn_001".to_string(),
            user_id: DEMO_USER_ID.to_string(),
            amount: 500.0,
            counterparty: "Rahul".to_string(),
            channel: "UPI".to_string(),
            status: TransactionStatus::Success,
            created_at: now - Duration::days(1),
            transfer_session_id: None,
        })
        .await?;

    let loans = store.list_loans(DEMO_USER_ID).await?;
    if !loans.iter().any(|l| l.loan_id == "loan_001") {
        store
            .insert_loan(&Loan {
                loan_id: "loan_001".to_string(),
                user_id: DEMO_USER_ID.to_string(),
                loan_type: "personal".to_string(),
                interest_rate: 11.25,
                outstanding: 150_000.0,
                emi_due: 4_500.0,
                next_due: now + Duration::days(10),
            })
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store = InMemoryBankStore::new();
        seed_demo_data(&store).await.unwrap();
        seed_demo_data(&store).await.unwrap();

        let user = store.find_user(DEMO_USER_ID).await.unwrap().unwrap();
        assert_eq!(user.balance("savings"), Some(23_450.0));
        assert_eq!(user.daily_limit, 50_000.0);
        assert_eq!(store.list_transactions(DEMO_USER_ID, 10).await.unwrap().len(), 1);
        assert_eq!(store.list_loans(DEMO_USER_ID).await.unwrap().len(), 1);
    }

    #[test]
    fn test_connect_without_url_is_in_memory() {
        let settings = Settings::default();
        // Construction must not need a runtime or network.
        let _store = connect(&settings);
    }
}
