//! SQLite store: all sessions in one database file.
//!
//! Table `session_state(session_id PRIMARY KEY, state, updated_at)`.
//! `get` answers with the matching rows as a JSON array (zero or one
//! element), the same shape a database query node hands back.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use statewright_core::error::StoreError;
use statewright_core::store::{StateStore, StoreOperation, StoreRequest};
use std::path::Path;
use tracing::info;

/// A SQLite-backed store scoped to one session.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    session_id: String,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and scope it to `session_id`.
    pub async fn open(path: &Path, session_id: impl Into<String>) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("Failed to create database directory: {e}"))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool, session_id).await?;
        info!("SQLite state store initialized at {}", path.display());
        Ok(store)
    }

    /// Create from an existing pool (useful for sharing one pool across sessions).
    pub async fn from_pool(pool: SqlitePool, session_id: impl Into<String>) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            session_id: session_id.into(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// A view of the same database for another session.
    pub fn scoped(&self, session_id: impl Into<String>) -> Self {
        Self {
            pool: self.pool.clone(),
            session_id: session_id.into(),
        }
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_state (
                session_id  TEXT PRIMARY KEY NOT NULL,
                state       TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("session_state table: {e}")))?;
        Ok(())
    }

    async fn load_rows(&self) -> Result<Value, StoreError> {
        let rows = sqlx::query("SELECT state FROM session_state WHERE session_id = ?")
            .bind(&self.session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to load state: {e}")))?;

        let mut states = Vec::with_capacity(rows.len());
        for row in rows {
            let text: String = row.get("state");
            let state: Value = serde_json::from_str(&text)
                .map_err(|e| StoreError::InvalidPayload(format!("Corrupted state row: {e}")))?;
            states.push(state);
        }
        Ok(Value::Array(states))
    }

    async fn upsert(&self, content: &str) -> Result<(), StoreError> {
        let state = crate::parse_state_content(content)?;
        sqlx::query(
            r#"
            INSERT INTO session_state (session_id, state, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.session_id)
        .bind(state.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Failed to save state: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn call(&self, request: StoreRequest) -> Result<Option<Value>, StoreError> {
        match request.operation {
            StoreOperation::Get => self.load_rows().await.map(Some),
            StoreOperation::Set => {
                self.upsert(&request.content).await?;
                Ok(None)
            }
        }
    }
}
