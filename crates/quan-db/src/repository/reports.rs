//! # Report Repository
//!
//! Read-only aggregates for the cashier screens. Every query takes a
//! half-open `[from, to)` window over UTC timestamps; turning a local business
//! date into that window is the caller's job.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::DbResult;
use quan_core::{CancellationStats, DailySummary, MethodTotal, TopItem};

/// Repository for reporting queries.
#[derive(Debug, Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReportRepository { pool }
    }

    /// Paid orders and revenue for the window, with a per-method breakdown.
    pub async fn daily_summary(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        date_label: &str,
    ) -> DbResult<DailySummary> {
        let by_method = sqlx::query_as::<_, MethodTotal>(
            r#"
            SELECT payment_method AS method,
                   COUNT(*) AS orders,
                   COALESCE(SUM(total_amount), 0) AS amount
            FROM orders
            WHERE payment_status = 'paid'
              AND payment_method IS NOT NULL
              AND paid_at >= ?1 AND paid_at < ?2
            GROUP BY payment_method
            ORDER BY amount DESC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let paid_orders: i64 = by_method.iter().map(|m| m.orders).sum();
        let gross_revenue: i64 = by_method.iter().map(|m| m.amount).sum();
        let average_order_value = if paid_orders > 0 {
            gross_revenue / paid_orders
        } else {
            0
        };

        let (cancelled_items, returned_items): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'cancelled' THEN quantity ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'returned' THEN quantity ELSE 0 END), 0)
            FROM order_items
            WHERE updated_at >= ?1 AND updated_at < ?2
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(DailySummary {
            date: date_label.to_string(),
            paid_orders,
            gross_revenue,
            average_order_value,
            by_method,
            cancelled_items,
            returned_items,
        })
    }

    /// Best sellers among billable items of paid orders.
    pub async fn top_items(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: i64,
    ) -> DbResult<Vec<TopItem>> {
        let items = sqlx::query_as::<_, TopItem>(
            r#"
            SELECT oi.menu_item_id AS menu_item_id,
                   MAX(oi.name) AS name,
                   SUM(oi.quantity) AS quantity,
                   SUM(oi.quantity * oi.unit_price) AS revenue
            FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE o.payment_status = 'paid'
              AND o.paid_at >= ?1 AND o.paid_at < ?2
              AND oi.status NOT IN ('cancelled', 'returned', 'out_of_stock')
            GROUP BY oi.menu_item_id
            ORDER BY quantity DESC, revenue DESC
            LIMIT ?3
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Request counts by source and item decisions for requests created in
    /// the window.
    pub async fn cancellation_stats(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<CancellationStats> {
        let stats = sqlx::query_as::<_, CancellationStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM cancellation_requests
                  WHERE created_at >= ?1 AND created_at < ?2) AS requests,
                (SELECT COUNT(*) FROM cancellation_requests
                  WHERE source = 'auto_timeout'
                    AND created_at >= ?1 AND created_at < ?2) AS auto_requests,
                (SELECT COUNT(*) FROM cancellation_requests
                  WHERE status = 'pending'
                    AND created_at >= ?1 AND created_at < ?2) AS pending_requests,
                (SELECT COUNT(*) FROM cancellation_request_items ri
                   JOIN cancellation_requests r ON r.id = ri.request_id
                  WHERE ri.decision = 'approved'
                    AND r.created_at >= ?1 AND r.created_at < ?2) AS approved_items,
                (SELECT COUNT(*) FROM cancellation_request_items ri
                   JOIN cancellation_requests r ON r.id = ri.request_id
                  WHERE ri.decision = 'rejected'
                    AND r.created_at >= ?1 AND r.created_at < ?2) AS rejected_items
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::cancellations::{CancellationRepository, NewRequest};
    use crate::repository::fixtures;
    use crate::OrderRepository;
    use chrono::Duration;
    use quan_core::cancellation::RequestLine;
    use quan_core::{OrderItemStatus, PaymentMethod, RequestKind, RequestSource};

    #[tokio::test]
    async fn test_daily_summary_and_top_items() {
        let db = fixtures::db().await;
        let table = fixtures::table(&db, "B1").await;
        let pho = fixtures::menu_item(&db, "Phở bò", 65_000).await;
        let tra = fixtures::menu_item(&db, "Trà đá", 5_000).await;
        let order = fixtures::open_order(&db, &table).await;
        fixtures::item(&db, &order, &pho, OrderItemStatus::Served).await;
        fixtures::item(&db, &order, &tra, OrderItemStatus::Served).await;
        fixtures::item(&db, &order, &tra, OrderItemStatus::Served).await;
        fixtures::item(&db, &order, &pho, OrderItemStatus::Cancelled).await;

        let now = Utc::now();
        {
            let mut conn = db.pool().acquire().await.unwrap();
            OrderRepository::recompute_total_in(&mut conn, &order.id, now)
                .await
                .unwrap();
            OrderRepository::mark_paid_in(&mut conn, &order.id, PaymentMethod::Cash, None, now)
                .await
                .unwrap();
        }

        let from = now - Duration::hours(1);
        let to = now + Duration::hours(1);
        let summary = db.reports().daily_summary(from, to, "2026-10-18").await.unwrap();
        assert_eq!(summary.paid_orders, 1);
        assert_eq!(summary.gross_revenue, 75_000);
        assert_eq!(summary.average_order_value, 75_000);
        assert_eq!(summary.by_method.len(), 1);
        assert_eq!(summary.by_method[0].method, PaymentMethod::Cash);
        assert_eq!(summary.cancelled_items, 1);
        assert_eq!(summary.returned_items, 0);

        let top = db.reports().top_items(from, to, 5).await.unwrap();
        assert_eq!(top[0].name, "Trà đá");
        assert_eq!(top[0].quantity, 2);
        assert_eq!(top[1].revenue, 65_000);

        let empty = db
            .reports()
            .daily_summary(to, to + Duration::hours(1), "2026-10-19")
            .await
            .unwrap();
        assert_eq!(empty.paid_orders, 0);
        assert_eq!(empty.average_order_value, 0);
    }

    #[tokio::test]
    async fn test_cancellation_stats() {
        let db = fixtures::db().await;
        let table = fixtures::table(&db, "B1").await;
        let menu = fixtures::menu_item(&db, "Bún chả", 60_000).await;
        let order = fixtures::open_order(&db, &table).await;
        let item = fixtures::item(&db, &order, &menu, OrderItemStatus::Waiting).await;

        let now = Utc::now();
        {
            let mut conn = db.pool().acquire().await.unwrap();
            CancellationRepository::create_in(
                &mut conn,
                NewRequest {
                    order_id: &order.id,
                    table_id: &table.id,
                    kind: RequestKind::Cancel,
                    source: RequestSource::AutoTimeout,
                    reason: "timeout",
                    requested_by: None,
                },
                &[RequestLine {
                    order_item_id: item.id.clone(),
                    item_name: item.name.clone(),
                    quantity: 1,
                }],
                now,
            )
            .await
            .unwrap();
        }

        let stats = db
            .reports()
            .cancellation_stats(now - Duration::minutes(1), now + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.auto_requests, 1);
        assert_eq!(stats.pending_requests, 1);
        assert_eq!(stats.approved_items, 0);
    }
}
