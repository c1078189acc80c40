//! Postgres-backed bank store
//!
//! Each entity is kept as a JSONB document next to the columns it is
//! looked up by. The schema is created lazily on first use.

use super::BankStore;
use crate::error::BankingError;
use crate::models::{Loan, Reminder, SessionRecord, Transaction, TransferOutcome, User};
use crate::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS bank_users (
      user_id TEXT PRIMARY KEY,
      username TEXT NOT NULL UNIQUE,
      doc JSONB NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bank_sessions (
      user_id TEXT PRIMARY KEY,
      doc JSONB NOT NULL,
      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bank_transactions (
      txn_id TEXT PRIMARY KEY,
      user_id TEXT NOT NULL,
      created_at TIMESTAMPTZ NOT NULL,
      doc JSONB NOT NULL
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_bank_transactions_user_time
    ON bank_transactions (user_id, created_at DESC);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bank_loans (
      loan_id TEXT PRIMARY KEY,
      user_id TEXT NOT NULL,
      doc JSONB NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bank_reminders (
      reminder_id TEXT PRIMARY KEY,
      user_id TEXT NOT NULL,
      schedule_iso TEXT NOT NULL,
      doc JSONB NOT NULL
    );
    "#,
];

pub struct PostgresBankStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> BankingError {
    move |e| BankingError::DatabaseError(format!("{}: {}", context, e))
}

impl PostgresBankStore {
    pub fn connect_lazy(url: &str) -> std::result::Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new().max_connections(5).connect_lazy(url)?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                for statement in SCHEMA {
                    sqlx::query(statement).execute(&self.pool).await?;
                }
                debug!("Bank store schema ready");
                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(db_err("Failed to initialize bank store schema"))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BankStore for PostgresBankStore {

    async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        self.ensure_schema().await?;
        let row: Option<(Json<User>,)> =
            sqlx::query_as("SELECT doc FROM bank_users WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err("Failed to load user"))?;
        Ok(row.map(|(Json(user),)| user))
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.ensure_schema().await?;
        let row: Option<(Json<User>,)> =
            sqlx::query_as("SELECT doc FROM bank_users WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err("Failed to load user by username"))?;
        Ok(row.map(|(Json(user),)| user))
    }

    async fn upsert_user(&self, user: &User) -> Result<()> {
        self.ensure_schema().await?;
        sqlx::query(
            r#"
            INSERT INTO bank_users (user_id, username, doc) VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET username = EXCLUDED.username, doc = EXCLUDED.doc
            "#,
        )
        .bind(&user.user_id)
        .bind(&user.username)
        .bind(Json(user))
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to upsert user"))?;
        Ok(())
    }

    async fn set_voice_embedding(&self, user_id: &str, embedding: &[f64]) -> Result<bool> {
        self.ensure_schema().await?;
        let result = sqlx::query(
            "UPDATE bank_users SET doc = jsonb_set(doc, '{voice_embedding}', $2) WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(Json(embedding))
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to store voice embedding"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn load_session(&self, user_id: &str) -> Result<Option<SessionRecord>> {
        self.ensure_schema().await?;
        let row: Option<(Json<SessionRecord>,)> =
            sqlx::query_as("SELECT doc FROM bank_sessions WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err("Failed to load session"))?;
        Ok(row.map(|(Json(session),)| session))
    }

    async fn save_session(&self, session: &SessionRecord) -> Result<()> {
        self.ensure_schema().await?;
        sqlx::query(
            r#"
            INSERT INTO bank_sessions (user_id, doc, updated_at) VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET doc = EXCLUDED.doc, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&session.user_id)
        .bind(Json(session))
        .bind(session.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to save session"))?;
        Ok(())
    }

    async fn insert_transaction(&self, txn: &Transaction) -> Result<bool> {
        self.ensure_schema().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO bank_transactions (txn_id, user_id, created_at, doc) VALUES ($1, $2, $3, $4)
            ON CONFLICT (txn_id) DO NOTHING
            "#,
        )
        .bind(&txn.txn_id)
        .bind(&txn.user_id)
        .bind(txn.created_at)
        .bind(Json(txn))
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to insert transaction"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_transaction(&self, txn_id: &str) -> Result<Option<Transaction>> {
        self.ensure_schema().await?;
        let row: Option<(Json<Transaction>,)> =
            sqlx::query_as("SELECT doc FROM bank_transactions WHERE txn_id = $1")
                .bind(txn_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err("Failed to load transaction"))?;
        Ok(row.map(|(Json(t),)| t))
    }

    async fn apply_transfer(
        &self,
        txn: &Transaction,
        account_type: &str,
    ) -> Result<TransferOutcome> {
        self.ensure_schema().await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transfer transaction"))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO bank_transactions (txn_id, user_id, created_at, doc) VALUES ($1, $2, $3, $4)
            ON CONFLICT (txn_id) DO NOTHING
            "#,
        )
        .bind(&txn.txn_id)
        .bind(&txn.user_id)
        .bind(txn.created_at)
        .bind(Json(txn))
        .execute(&mut *tx)
        .await
        .map_err(db_err("Failed to record transaction"))?
        .rows_affected();

        if inserted == 0 {
            let existing: Option<(Json<Transaction>,)> =
                sqlx::query_as("SELECT doc FROM bank_transactions WHERE txn_id = $1")
                    .bind(&txn.txn_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_err("Failed to load existing transaction"))?;
            tx.commit()
                .await
                .map_err(db_err("Failed to commit transfer transaction"))?;

            return match existing {
                Some((Json(existing),)) => Ok(TransferOutcome::AlreadyApplied(existing)),
                None => Err(BankingError::DatabaseError(format!(
                    "transaction {} conflicted but could not be read",
                    txn.txn_id
                ))),
            };
        }

        let debited = sqlx::query(
            r#"
            UPDATE bank_users
            SET doc = jsonb_set(
              doc,
              ARRAY['balances', $2::text],
              to_jsonb(COALESCE((doc #>> ARRAY['balances', $2::text])::float8, 0) - $3),
              true
            )
            WHERE user_id = $1
            "#,
        )
        .bind(&txn.user_id)
        .bind(account_type)
        .bind(txn.amount)
        .execute(&mut *tx)
        .await
        .map_err(db_err("Failed to debit balance"))?
        .rows_affected();

        if debited == 0 {
            tx.rollback()
                .await
                .map_err(db_err("Failed to roll back transfer transaction"))?;
            return Err(BankingError::NotFound(format!("user {}", txn.user_id)));
        }

        tx.commit()
            .await
            .map_err(db_err("Failed to commit transfer transaction"))?;

        Ok(TransferOutcome::Applied(txn.clone()))
    }

    async fn list_transactions(&self, user_id: &str, limit: usize) -> Result<Vec<Transaction>> {
        self.ensure_schema().await?;
        let rows: Vec<(Json<Transaction>,)> = sqlx::query_as(
            "SELECT doc FROM bank_transactions WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list transactions"))?;
        Ok(rows.into_iter().map(|(Json(t),)| t).collect())
    }

    async fn insert_loan(&self, loan: &Loan) -> Result<()> {
        self.ensure_schema().await?;
        sqlx::query(
            r#"
            INSERT INTO bank_loans (loan_id, user_id, doc) VALUES ($1, $2, $3)
            ON CONFLICT (loan_id) DO UPDATE SET doc = EXCLUDED.doc
            "#,
        )
        .bind(&loan.loan_id)
        .bind(&loan.user_id)
        .bind(Json(loan))
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to insert loan"))?;
        Ok(())
    }

    async fn list_loans(&self, user_id: &str) -> Result<Vec<Loan>> {
        self.ensure_schema().await?;
        let rows: Vec<(Json<Loan>,)> =
            sqlx::query_as("SELECT doc FROM bank_loans WHERE user_id = $1 ORDER BY loan_id")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err("Failed to list loans"))?;
        Ok(rows.into_iter().map(|(Json(l),)| l).collect())
    }

    async fn insert_reminder(&self, reminder: &Reminder) -> Result<()> {
        self.ensure_schema().await?;
        sqlx::query(
            "INSERT INTO bank_reminders (reminder_id, user_id, schedule_iso, doc) VALUES ($1, $2, $3, $4)",
        )
        .bind(&reminder.reminder_id)
        .bind(&reminder.user_id)
        .bind(&reminder.schedule_iso)
        .bind(Json(reminder))
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to insert reminder"))?;
        Ok(())
    }

    async fn list_reminders(&self, user_id: &str) -> Result<Vec<Reminder>> {
        self.ensure_schema().await?;
        let rows: Vec<(Json<Reminder>,)> = sqlx::query_as(
            "SELECT doc FROM bank_reminders WHERE user_id = $1 ORDER BY schedule_iso ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list reminders"))?;
        Ok(rows.into_iter().map(|(Json(r),)| r).collect())
    }

    async fn delete_reminder(&self, user_id: &str, reminder_id: &str) -> Result<bool> {
        self.ensure_schema().await?;
        let result =
            sqlx::query("DELETE FROM bank_reminders WHERE user_id = $1 AND reminder_id = $2")
                .bind(user_id)
                .bind(reminder_id)
                .execute(&self.pool)
                .await
                .map_err(db_err("Failed to delete reminder"))?;
        Ok(result.rows_affected() > 0)
    }
}
