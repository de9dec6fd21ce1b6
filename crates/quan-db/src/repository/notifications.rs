//! # Notification Repository
//!
//! Return notifications: one row per item the kitchen sent back to the
//! floor, pending until a waiter acknowledges it.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use quan_core::{NotificationStatus, OrderItem, ReturnNotification};

const NOTIFICATION_COLUMNS: &str = "id, order_id, table_id, order_item_id, item_name, quantity, \
     reason, status, created_at, acknowledged_at, acknowledged_by";

/// Repository for return notifications.
#[derive(Debug, Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        NotificationRepository { pool }
    }

    /// Records a pending notification for a returned item.
    pub async fn create_in(
        conn: &mut SqliteConnection,
        table_id: &str,
        item: &OrderItem,
        reason: &str,
        now: DateTime<Utc>,
    ) -> DbResult<ReturnNotification> {
        let notification = ReturnNotification {
            id: Uuid::new_v4().to_string(),
            order_id: item.order_id.clone(),
            table_id: table_id.to_string(),
            order_item_id: item.id.clone(),
            item_name: item.name.clone(),
            quantity: item.quantity,
            reason: reason.to_string(),
            status: NotificationStatus::Pending,
            created_at: now,
            acknowledged_at: None,
            acknowledged_by: None,
        };

        debug!(
            id = %notification.id,
            order_item_id = %notification.order_item_id,
            "Creating return notification"
        );

        sqlx::query(
            r#"
            INSERT INTO return_notifications (
                id, order_id, table_id, order_item_id, item_name, quantity,
                reason, status, created_at, acknowledged_at, acknowledged_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.order_id)
        .bind(&notification.table_id)
        .bind(&notification.order_item_id)
        .bind(&notification.item_name)
        .bind(notification.quantity)
        .bind(&notification.reason)
        .bind(notification.status)
        .bind(notification.created_at)
        .bind(notification.acknowledged_at)
        .bind(&notification.acknowledged_by)
        .execute(conn)
        .await?;

        Ok(notification)
    }

    /// Unacknowledged notifications, oldest first.
    pub async fn list_pending(&self) -> DbResult<Vec<ReturnNotification>> {
        let sql = format!(
            "SELECT {} FROM return_notifications WHERE status = 'pending' ORDER BY created_at",
            NOTIFICATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReturnNotification>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<ReturnNotification>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, id).await
    }

    pub async fn get_in(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<ReturnNotification>> {
        let sql = format!(
            "SELECT {} FROM return_notifications WHERE id = ?1",
            NOTIFICATION_COLUMNS
        );
        let row = sqlx::query_as::<_, ReturnNotification>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(row)
    }

    /// Marks a pending notification acknowledged. Returns false if it was
    /// already acknowledged or does not exist.
    pub async fn acknowledge(
        &self,
        id: &str,
        staff_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE return_notifications SET
                status = 'acknowledged',
                acknowledged_at = ?2,
                acknowledged_by = ?3
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(staff_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
