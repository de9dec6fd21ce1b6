//! # Order Repository
//!
//! Orders, their items, the kitchen queue and the stale-item scan used by
//! the escalation worker.
//!
//! ## Guarded Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE order_items SET status = :to                                    │
//! │  WHERE id = :id AND status = :expected                                  │
//! │                                                                         │
//! │  rows_affected = 1  → this caller won                                   │
//! │  rows_affected = 0  → someone moved the item first; caller re-reads     │
//! │                                                                         │
//! │  Same idea for payments:                                                │
//! │  UPDATE orders SET payment_status = 'paid' ... WHERE payment_status    │
//! │  != 'paid'  → a repeated webhook never moves paid_at                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use super::placeholders;
use crate::error::{DbError, DbResult};
use quan_core::lifecycle::order_total;
use quan_core::payment::payment_reference;
use quan_core::{
    KitchenTicket, Money, Order, OrderItem, OrderItemStatus, OrderStatus, PaymentMethod,
    PaymentStatus,
};

const ORDER_COLUMNS: &str = "id, table_id, status, payment_status, payment_method, total_amount, \
     payment_reference, provider_transaction_id, note, opened_by, created_at, updated_at, paid_at";
const ITEM_COLUMNS: &str =
    "id, order_id, menu_item_id, name, unit_price, quantity, status, note, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct KitchenRow {
    #[sqlx(flatten)]
    item: OrderItem,
    table_id: String,
    table_name: String,
}

/// Repository for orders and order items.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Creates an open, unpaid order with its payment reference.
    pub async fn create_order_in(
        conn: &mut SqliteConnection,
        table_id: &str,
        opened_by: &str,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<Order> {
        let id = Uuid::new_v4().to_string();
        let order = Order {
            payment_reference: payment_reference(&id),
            id,
            table_id: table_id.to_string(),
            status: OrderStatus::Open,
            payment_status: PaymentStatus::Unpaid,
            payment_method: None,
            total_amount: 0,
            provider_transaction_id: None,
            note: note.map(str::to_string),
            opened_by: opened_by.to_string(),
            created_at: now,
            updated_at: now,
            paid_at: None,
        };

        debug!(id = %order.id, table_id = %table_id, "Creating order");

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, table_id, status, payment_status, payment_method, total_amount,
                payment_reference, provider_transaction_id, note, opened_by,
                created_at, updated_at, paid_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&order.id)
        .bind(&order.table_id)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.payment_method)
        .bind(order.total_amount)
        .bind(&order.payment_reference)
        .bind(&order.provider_transaction_id)
        .bind(&order.note)
        .bind(&order.opened_by)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.paid_at)
        .execute(conn)
        .await?;

        Ok(order)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, id).await
    }

    pub async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLUMNS);
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(order)
    }

    pub async fn require_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Order> {
        Self::get_in(conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))
    }

    /// Looks an order up by the reference printed in transfer descriptions.
    pub async fn find_by_reference_in(
        conn: &mut SqliteConnection,
        reference: &str,
    ) -> DbResult<Option<Order>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE payment_reference = ?1",
            ORDER_COLUMNS
        );
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(reference.trim().to_ascii_uppercase())
            .fetch_optional(conn)
            .await?;
        Ok(order)
    }

    pub async fn list_open(&self) -> DbResult<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE status = 'open' ORDER BY created_at",
            ORDER_COLUMNS
        );
        let orders = sqlx::query_as::<_, Order>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(orders)
    }

    /// Moves an open order to another table.
    pub async fn transfer_in(
        conn: &mut SqliteConnection,
        order_id: &str,
        to_table_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE orders SET table_id = ?2, updated_at = ?3 WHERE id = ?1 AND status = 'open'",
        )
        .bind(order_id)
        .bind(to_table_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Open order", order_id));
        }

        // Open requests and notifications follow the order.
        sqlx::query("UPDATE cancellation_requests SET table_id = ?2 WHERE order_id = ?1 AND status = 'pending'")
            .bind(order_id)
            .bind(to_table_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("UPDATE return_notifications SET table_id = ?2 WHERE order_id = ?1 AND status = 'pending'")
            .bind(order_id)
            .bind(to_table_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Returns true if the order was open and is now closed.
    pub async fn close_in(
        conn: &mut SqliteConnection,
        order_id: &str,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status = 'open'",
        )
        .bind(order_id)
        .bind(status)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Totals & payment
    // =========================================================================

    /// Recomputes the total from billable items and stores it.
    pub async fn recompute_total_in(
        conn: &mut SqliteConnection,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Money> {
        let items = Self::items_for_order_in(&mut *conn, order_id).await?;
        let total = order_total(&items);

        sqlx::query("UPDATE orders SET total_amount = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(order_id)
            .bind(total.dong())
            .bind(now)
            .execute(conn)
            .await?;

        Ok(total)
    }

    /// Records that a provider payment was requested. Paid orders are left
    /// alone; returns false for them.
    pub async fn mark_payment_pending_in(
        conn: &mut SqliteConnection,
        order_id: &str,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                payment_status = 'pending',
                payment_method = ?2,
                updated_at = ?3
            WHERE id = ?1 AND payment_status != 'paid'
            "#,
        )
        .bind(order_id)
        .bind(method)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Marks an order paid. Returns false, changing nothing, if it already was.
    pub async fn mark_paid_in(
        conn: &mut SqliteConnection,
        order_id: &str,
        method: PaymentMethod,
        provider_transaction_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                payment_status = 'paid',
                payment_method = ?2,
                provider_transaction_id = ?3,
                paid_at = ?4,
                updated_at = ?4
            WHERE id = ?1 AND payment_status != 'paid'
            "#,
        )
        .bind(order_id)
        .bind(method)
        .bind(provider_transaction_id)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Items
    // =========================================================================

    pub async fn add_item_in(conn: &mut SqliteConnection, item: &OrderItem) -> DbResult<()> {
        debug!(order_id = %item.order_id, menu_item_id = %item.menu_item_id, "Adding order item");

        sqlx::query(
            r#"
            INSERT INTO order_items (
                id, order_id, menu_item_id, name, unit_price, quantity,
                status, note, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(&item.menu_item_id)
        .bind(&item.name)
        .bind(item.unit_price)
        .bind(item.quantity)
        .bind(item.status)
        .bind(&item.note)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn get_item(&self, id: &str) -> DbResult<Option<OrderItem>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_item_in(&mut conn, id).await
    }

    pub async fn get_item_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<OrderItem>> {
        let sql = format!("SELECT {} FROM order_items WHERE id = ?1", ITEM_COLUMNS);
        let item = sqlx::query_as::<_, OrderItem>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(item)
    }

    pub async fn require_item_in(conn: &mut SqliteConnection, id: &str) -> DbResult<OrderItem> {
        Self::get_item_in(conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("OrderItem", id))
    }

    pub async fn items_for_order(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let mut conn = self.pool.acquire().await?;
        Self::items_for_order_in(&mut conn, order_id).await
    }

    pub async fn items_for_order_in(
        conn: &mut SqliteConnection,
        order_id: &str,
    ) -> DbResult<Vec<OrderItem>> {
        let sql = format!(
            "SELECT {} FROM order_items WHERE order_id = ?1 ORDER BY created_at, id",
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, OrderItem>(&sql)
            .bind(order_id)
            .fetch_all(conn)
            .await?;
        Ok(items)
    }

    /// Items of one menu item currently in `status`, across open orders.
    pub async fn items_for_menu_item_in(
        conn: &mut SqliteConnection,
        menu_item_id: &str,
        status: OrderItemStatus,
    ) -> DbResult<Vec<OrderItem>> {
        let sql = format!(
            r#"
            SELECT {} FROM order_items
            WHERE menu_item_id = ?1 AND status = ?2
              AND order_id IN (SELECT id FROM orders WHERE status = 'open')
            ORDER BY created_at
            "#,
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, OrderItem>(&sql)
            .bind(menu_item_id)
            .bind(status)
            .fetch_all(conn)
            .await?;
        Ok(items)
    }

    /// Moves an item from `expected` to `to`.
    ///
    /// Returns false if the item was no longer in `expected`. Transition
    /// legality is the caller's job (`OrderItemStatus::transition`).
    pub async fn update_item_status_in(
        conn: &mut SqliteConnection,
        item_id: &str,
        expected: OrderItemStatus,
        to: OrderItemStatus,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE order_items SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        )
        .bind(item_id)
        .bind(expected)
        .bind(to)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Kitchen & escalation
    // =========================================================================

    /// Items of open orders in one of `statuses`, created at or before
    /// `cutoff`, not already on a pending cancellation request. Oldest first.
    pub async fn stale_items(
        &self,
        cutoff: DateTime<Utc>,
        statuses: &[OrderItemStatus],
    ) -> DbResult<Vec<OrderItem>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT {cols} FROM order_items oi
            WHERE oi.created_at <= ?
              AND oi.status IN ({statuses})
              AND oi.order_id IN (SELECT id FROM orders WHERE status = 'open')
              AND NOT EXISTS (
                  SELECT 1
                  FROM cancellation_request_items ri
                  JOIN cancellation_requests r ON r.id = ri.request_id
                  WHERE ri.order_item_id = oi.id AND r.status = 'pending'
              )
            ORDER BY oi.created_at, oi.id
            "#,
            cols = prefixed_item_columns("oi"),
            statuses = placeholders(statuses.len()),
        );

        let mut query = sqlx::query_as::<_, OrderItem>(&sql).bind(cutoff);
        for status in statuses {
            query = query.bind(*status);
        }
        let items = query.fetch_all(&self.pool).await?;
        Ok(items)
    }

    /// Waiting and in-progress items of open orders, as tickets per order,
    /// oldest ticket first.
    pub async fn kitchen_queue(&self) -> DbResult<Vec<KitchenTicket>> {
        let sql = format!(
            r#"
            SELECT {cols}, t.id AS table_id, t.name AS table_name
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            JOIN dining_tables t ON t.id = o.table_id
            WHERE o.status = 'open' AND oi.status IN ('waiting', 'in_progress')
            ORDER BY oi.created_at, oi.id
            "#,
            cols = prefixed_item_columns("oi"),
        );
        let rows = sqlx::query_as::<_, KitchenRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        let mut tickets: Vec<KitchenTicket> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for row in rows {
            let existing = index.get(&row.item.order_id).copied();
            match existing {
                Some(i) => tickets[i].items.push(row.item),
                None => {
                    index.insert(row.item.order_id.clone(), tickets.len());
                    tickets.push(KitchenTicket {
                        order_id: row.item.order_id.clone(),
                        table_id: row.table_id,
                        table_name: row.table_name,
                        oldest_item_at: row.item.created_at,
                        items: vec![row.item],
                    });
                }
            }
        }
        Ok(tickets)
    }
}

fn prefixed_item_columns(alias: &str) -> String {
    ITEM_COLUMNS
        .split(", ")
        .map(|col| format!("{alias}.{col} AS {col}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use chrono::Duration;
    use OrderItemStatus::*;

    #[tokio::test]
    async fn test_create_order_has_reference() {
        let db = fixtures::db().await;
        let table = fixtures::table(&db, "B1").await;
        let order = fixtures::open_order(&db, &table).await;

        assert_eq!(order.payment_reference, payment_reference(&order.id));
        assert_eq!(order.status, OrderStatus::Open);

        let mut conn = db.pool().acquire().await.unwrap();
        let found = OrderRepository::find_by_reference_in(
            &mut conn,
            &order.payment_reference.to_lowercase(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(found.id, order.id);
    }

    #[tokio::test]
    async fn test_guarded_status_update() {
        let db = fixtures::db().await;
        let table = fixtures::table(&db, "B1").await;
        let menu = fixtures::menu_item(&db, "Phở bò", 65_000).await;
        let order = fixtures::open_order(&db, &table).await;
        let item = fixtures::item(&db, &order, &menu, Waiting).await;

        let mut conn = db.pool().acquire().await.unwrap();
        let now = Utc::now();
        assert!(OrderRepository::update_item_status_in(&mut conn, &item.id, Waiting, InProgress, now)
            .await
            .unwrap());
        // Second writer still expects `waiting`
        assert!(!OrderRepository::update_item_status_in(&mut conn, &item.id, Waiting, Cancelled, now)
            .await
            .unwrap());

        let stored = OrderRepository::require_item_in(&mut conn, &item.id).await.unwrap();
        assert_eq!(stored.status, InProgress);
    }

    #[tokio::test]
    async fn test_recompute_total_skips_voided() {
        let db = fixtures::db().await;
        let table = fixtures::table(&db, "B1").await;
        let pho = fixtures::menu_item(&db, "Phở bò", 65_000).await;
        let tea = fixtures::menu_item(&db, "Trà đá", 5_000).await;
        let order = fixtures::open_order(&db, &table).await;
        fixtures::item(&db, &order, &pho, Served).await;
        fixtures::item(&db, &order, &tea, Cancelled).await;
        fixtures::item(&db, &order, &tea, Waiting).await;

        let mut conn = db.pool().acquire().await.unwrap();
        let total = OrderRepository::recompute_total_in(&mut conn, &order.id, Utc::now())
            .await
            .unwrap();
        assert_eq!(total.dong(), 70_000);
        let stored = OrderRepository::require_in(&mut conn, &order.id).await.unwrap();
        assert_eq!(stored.total_amount, 70_000);
    }

    #[tokio::test]
    async fn test_mark_paid_is_idempotent() {
        let db = fixtures::db().await;
        let table = fixtures::table(&db, "B1").await;
        let order = fixtures::open_order(&db, &table).await;
        let mut conn = db.pool().acquire().await.unwrap();

        let first = Utc::now();
        assert!(OrderRepository::mark_payment_pending_in(&mut conn, &order.id, PaymentMethod::Momo, first)
            .await
            .unwrap());
        assert!(OrderRepository::mark_paid_in(&mut conn, &order.id, PaymentMethod::Momo, Some("tx-1"), first)
            .await
            .unwrap());
        let later = first + Duration::minutes(3);
        assert!(!OrderRepository::mark_paid_in(&mut conn, &order.id, PaymentMethod::Momo, Some("tx-1"), later)
            .await
            .unwrap());
        assert!(!OrderRepository::mark_payment_pending_in(&mut conn, &order.id, PaymentMethod::Vietqr, later)
            .await
            .unwrap());

        let paid = OrderRepository::require_in(&mut conn, &order.id).await.unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(
            paid.paid_at.map(|t| t.timestamp_millis()),
            Some(first.timestamp_millis())
        );
        assert_eq!(paid.payment_method, Some(PaymentMethod::Momo));
    }

    #[tokio::test]
    async fn test_stale_items_filters() {
        let db = fixtures::db().await;
        let table = fixtures::table(&db, "B1").await;
        let menu = fixtures::menu_item(&db, "Phở bò", 65_000).await;
        let order = fixtures::open_order(&db, &table).await;

        let now = Utc::now();
        let old = now - Duration::minutes(10);
        let stale_waiting = fixtures::item_at(&db, &order, &menu, Waiting, old).await;
        let stale_cooking = fixtures::item_at(&db, &order, &menu, InProgress, old).await;
        fixtures::item_at(&db, &order, &menu, Ready, old).await;
        fixtures::item_at(&db, &order, &menu, Waiting, now - Duration::minutes(1)).await;

        let cutoff = now - Duration::minutes(5);
        let stale = db
            .orders()
            .stale_items(cutoff, &[Waiting, InProgress])
            .await
            .unwrap();
        let mut ids: Vec<_> = stale.iter().map(|i| i.id.clone()).collect();
        ids.sort();
        let mut expected = vec![stale_waiting.id.clone(), stale_cooking.id.clone()];
        expected.sort();
        assert_eq!(ids, expected);

        assert!(db.orders().stale_items(cutoff, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_kitchen_queue_groups_by_order() {
        let db = fixtures::db().await;
        let b1 = fixtures::table(&db, "B1").await;
        let b2 = fixtures::table(&db, "B2").await;
        let menu = fixtures::menu_item(&db, "Phở bò", 65_000).await;
        let first = fixtures::open_order(&db, &b1).await;
        let second = fixtures::open_order(&db, &b2).await;

        let now = Utc::now();
        fixtures::item_at(&db, &first, &menu, Waiting, now - Duration::minutes(8)).await;
        fixtures::item_at(&db, &second, &menu, InProgress, now - Duration::minutes(6)).await;
        fixtures::item_at(&db, &first, &menu, InProgress, now - Duration::minutes(4)).await;
        fixtures::item_at(&db, &first, &menu, Served, now - Duration::minutes(9)).await;

        let queue = db.orders().kitchen_queue().await.unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].table_name, "B1");
        assert_eq!(queue[0].items.len(), 2);
        assert_eq!(queue[1].table_name, "B2");
    }

    #[tokio::test]
    async fn test_transfer_and_close() {
        let db = fixtures::db().await;
        let b1 = fixtures::table(&db, "B1").await;
        let b2 = fixtures::table(&db, "B2").await;
        let order = fixtures::open_order(&db, &b1).await;
        let mut conn = db.pool().acquire().await.unwrap();

        OrderRepository::transfer_in(&mut conn, &order.id, &b2.id, Utc::now())
            .await
            .unwrap();
        assert!(OrderRepository::close_in(&mut conn, &order.id, OrderStatus::Closed, Utc::now())
            .await
            .unwrap());
        assert!(!OrderRepository::close_in(&mut conn, &order.id, OrderStatus::Closed, Utc::now())
            .await
            .unwrap());

        let closed = OrderRepository::require_in(&mut conn, &order.id).await.unwrap();
        assert_eq!(closed.table_id, b2.id);
        assert!(OrderRepository::transfer_in(&mut conn, &order.id, &b1.id, Utc::now())
            .await
            .is_err());
    }
}
