//! In-memory bank store for development and tests

use super::BankStore;
use crate::error::BankingError;
use crate::models::{Loan, Reminder, SessionRecord, Transaction, TransferOutcome, User};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Ledger {
    users: HashMap<String, User>,
    transactions: HashMap<String, Transaction>,
}

pub struct InMemoryBankStore {
    // Users and transactions share one lock so a transfer is applied as a unit.
    ledger: Arc<RwLock<Ledger>>,
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
    loans: Arc<RwLock<Vec<Loan>>>,
    reminders: Arc<RwLock<Vec<Reminder>>>,
}

impl InMemoryBankStore {
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(RwLock::new(Ledger::default())),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            loans: Arc::new(RwLock::new(Vec::new())),
            reminders: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryBankStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl BankStore for InMemoryBankStore {

    async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        let ledger = self.ledger.read().await;
        Ok(ledger.users.get(user_id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let ledger = self.ledger.read().await;
        Ok(ledger
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        let mut ledger = self.ledger.write().await;
        ledger.users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn set_voice_embedding(&self, user_id: &str, embedding: &[f64]) -> Result<bool> {
        let mut ledger = self.ledger.write().await;
        match ledger.users.get_mut(user_id) {
            Some(user) => {
                user.voice_embedding = Some(embedding.to_vec());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn load_session(&self, user_id: &str) -> Result<Option<SessionRecord>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(user_id).cloned())
    }

    async fn save_session(&self, session: &SessionRecord) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.user_id.clone(), session.clone());
        Ok(())
    }

    async fn insert_transaction(&self, txn: &Transaction) -> Result<bool> {
        let mut ledger = self.ledger.write().await;
        if ledger.transactions.contains_key(&txn.txn_id) {
            return Ok(false);
        }
        ledger.transactions.insert(txn.txn_id.clone(), txn.clone());
        Ok(true)
    }

    async fn find_transaction(&self, txn_id: &str) -> Result<Option<Transaction>> {
        let ledger = self.ledger.read().await;
        Ok(ledger.transactions.get(txn_id).cloned())
    }

    async fn apply_transfer(
        &self,
        txn: &Transaction,
        account_type: &str,
    ) -> Result<TransferOutcome> {
        let mut ledger = self.ledger.write().await;

        if let Some(existing) = ledger.transactions.get(&txn.txn_id) {
            return Ok(TransferOutcome::AlreadyApplied(existing.clone()));
        }

        let user = ledger
            .users
            .get_mut(&txn.user_id)
            .ok_or_else(|| BankingError::NotFound(format!("user {}", txn.user_id)))?;
        *user.balances.entry(account_type.to_string()).or_insert(0.0) -= txn.amount;

        ledger.transactions.insert(txn.txn_id.clone(), txn.clone());
        Ok(TransferOutcome::Applied(txn.clone()))
    }

    async fn list_transactions(&self, user_id: &str, limit: usize) -> Result<Vec<Transaction>> {
        let ledger = self.ledger.read().await;
        let mut items: Vec<Transaction> = ledger
            .transactions
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();

        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit);
        Ok(items)
    }

    async fn insert_loan(&self, loan: &Loan) -> Result<()> {
        self.loans.write().await.push(loan.clone());
        Ok(())
    }

    async fn list_loans(&self, user_id: &str) -> Result<Vec<Loan>> {
        let loans = self.loans.read().await;
        Ok(loans.iter().filter(|l| l.user_id == user_id).cloned().collect())
    }

    async fn insert_reminder(&self, reminder: &Reminder) -> Result<()> {
        self.reminders.write().await.push(reminder.clone());
        Ok(())
    }

    async fn list_reminders(&self, user_id: &str) -> Result<Vec<Reminder>> {
        let reminders = self.reminders.read().await;
        let mut items: Vec<Reminder> = reminders
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.schedule_iso.cmp(&b.schedule_iso));
        Ok(items)
    }

    async fn delete_reminder(&self, user_id: &str, reminder_id: &str) -> Result<bool> {
        let mut reminders = self.reminders.write().await;
        let before = reminders.len();
        reminders.retain(|r| !(r.user_id == user_id && r.reminder_id == reminder_id));
        Ok(reminders.len() != before)
    }
}
