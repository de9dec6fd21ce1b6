//! # Offline Queue Repository
//!
//! Durable FIFO of actions captured while a device was offline. Every
//! staff member owns a separate queue; all reads and deletes are scoped
//! to one owner.
//!
//! ```text
//! owner A: enqueue ──► [seq 1][seq 4] ──peek──► sink
//! owner B: enqueue ──► [seq 2][seq 3] ──peek──► sink
//!                         ▲                       │
//!                         └─ delete on success ◄──┤
//!                            record_failure ◄─────┘  (head stays put)
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use quan_core::OfflineAction;

const ACTION_COLUMNS: &str =
    "id, seq, owner, kind, payload, attempts, last_error, created_at, last_attempt_at";

/// Repository for the offline action queue.
#[derive(Debug, Clone)]
pub struct OfflineQueueRepository {
    pool: SqlitePool,
}

impl OfflineQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OfflineQueueRepository { pool }
    }

    /// Appends an action to the tail of `owner`'s queue.
    pub async fn enqueue(
        &self,
        owner: &str,
        kind: &str,
        payload: &str,
        now: DateTime<Utc>,
    ) -> DbResult<OfflineAction> {
        let id = Uuid::new_v4().to_string();

        let result = sqlx::query(
            r#"
            INSERT INTO offline_actions (id, owner, kind, payload, attempts, last_error, created_at, last_attempt_at)
            VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5, NULL)
            "#,
        )
        .bind(&id)
        .bind(owner)
        .bind(kind)
        .bind(payload)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let seq = result.last_insert_rowid();
        debug!(id = %id, seq, owner, kind, "Queued offline action");

        Ok(OfflineAction {
            id,
            seq,
            owner: owner.to_string(),
            kind: kind.to_string(),
            payload: payload.to_string(),
            attempts: 0,
            last_error: None,
            created_at: now,
            last_attempt_at: None,
        })
    }

    /// The oldest `limit` actions of `owner` in insertion order.
    pub async fn peek(&self, owner: &str, limit: i64) -> DbResult<Vec<OfflineAction>> {
        let sql = format!(
            "SELECT {} FROM offline_actions WHERE owner = ?1 ORDER BY seq LIMIT ?2",
            ACTION_COLUMNS
        );
        let actions = sqlx::query_as::<_, OfflineAction>(&sql)
            .bind(owner)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(actions)
    }

    /// Removes one of `owner`'s actions. Actions of other owners are
    /// reported as missing.
    pub async fn delete(&self, owner: &str, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM offline_actions WHERE id = ?1 AND owner = ?2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("OfflineAction", id));
        }
        Ok(())
    }

    /// Bumps the attempt counter and stores the last error; the action keeps
    /// its position.
    pub async fn record_failure(
        &self,
        id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE offline_actions SET
                attempts = attempts + 1,
                last_error = ?2,
                last_attempt_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count(&self, owner: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM offline_actions WHERE owner = ?1")
            .bind(owner)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Drops every action `owner` has queued. Returns how many were removed.
    pub async fn clear(&self, owner: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM offline_actions WHERE owner = ?1")
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
