//! # Cancellation Repository
//!
//! Cancellation / return requests and their items.
//!
//! ```text
//! cancellation_requests (1) ──< cancellation_request_items (n) >── order_items
//!        status                         decision
//!        pending ──────────────────────► approved / rejected / partially_approved
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use super::placeholders;
use crate::error::{DbError, DbResult};
use quan_core::cancellation::RequestLine;
use quan_core::{
    CancellationRequest, CancellationRequestDetail, CancellationRequestItem, ItemDecision,
    RequestKind, RequestSource, RequestStatus,
};

const REQUEST_COLUMNS: &str = "id, order_id, table_id, kind, source, status, reason, \
     requested_by, resolved_by, created_at, updated_at, resolved_at";
const ITEM_COLUMNS: &str =
    "id, request_id, order_item_id, item_name, quantity, decision, decided_at";

/// Fields of a request about to be created.
#[derive(Debug, Clone)]
pub struct NewRequest<'a> {
    pub order_id: &'a str,
    pub table_id: &'a str,
    pub kind: RequestKind,
    pub source: RequestSource,
    pub reason: &'a str,
    pub requested_by: Option<&'a str>,
}

/// Repository for cancellation requests.
#[derive(Debug, Clone)]
pub struct CancellationRepository {
    pool: SqlitePool,
}

impl CancellationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CancellationRepository { pool }
    }

    /// Inserts a pending request together with its lines.
    pub async fn create_in(
        conn: &mut SqliteConnection,
        new: NewRequest<'_>,
        lines: &[RequestLine],
        now: DateTime<Utc>,
    ) -> DbResult<CancellationRequestDetail> {
        let request = CancellationRequest {
            id: Uuid::new_v4().to_string(),
            order_id: new.order_id.to_string(),
            table_id: new.table_id.to_string(),
            kind: new.kind,
            source: new.source,
            status: RequestStatus::Pending,
            reason: new.reason.to_string(),
            requested_by: new.requested_by.map(str::to_string),
            resolved_by: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };

        debug!(
            id = %request.id,
            order_id = %request.order_id,
            kind = ?request.kind,
            source = ?request.source,
            lines = lines.len(),
            "Creating cancellation request"
        );

        sqlx::query(
            r#"
            INSERT INTO cancellation_requests (
                id, order_id, table_id, kind, source, status, reason,
                requested_by, resolved_by, created_at, updated_at, resolved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&request.id)
        .bind(&request.order_id)
        .bind(&request.table_id)
        .bind(request.kind)
        .bind(request.source)
        .bind(request.status)
        .bind(&request.reason)
        .bind(&request.requested_by)
        .bind(&request.resolved_by)
        .bind(request.created_at)
        .bind(request.updated_at)
        .bind(request.resolved_at)
        .execute(&mut *conn)
        .await?;

        let items = Self::insert_lines(&mut *conn, &request.id, lines).await?;
        Ok(CancellationRequestDetail { request, items })
    }

    /// Appends lines to an existing request and bumps its `updated_at`.
    pub async fn add_items_in(
        conn: &mut SqliteConnection,
        request_id: &str,
        lines: &[RequestLine],
        now: DateTime<Utc>,
    ) -> DbResult<Vec<CancellationRequestItem>> {
        let items = Self::insert_lines(&mut *conn, request_id, lines).await?;
        sqlx::query("UPDATE cancellation_requests SET updated_at = ?2 WHERE id = ?1")
            .bind(request_id)
            .bind(now)
            .execute(conn)
            .await?;
        Ok(items)
    }

    async fn insert_lines(
        conn: &mut SqliteConnection,
        request_id: &str,
        lines: &[RequestLine],
    ) -> DbResult<Vec<CancellationRequestItem>> {
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let item = CancellationRequestItem {
                id: Uuid::new_v4().to_string(),
                request_id: request_id.to_string(),
                order_item_id: line.order_item_id.clone(),
                item_name: line.item_name.clone(),
                quantity: line.quantity,
                decision: ItemDecision::Pending,
                decided_at: None,
            };
            sqlx::query(
                r#"
                INSERT INTO cancellation_request_items (
                    id, request_id, order_item_id, item_name, quantity, decision, decided_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&item.id)
            .bind(&item.request_id)
            .bind(&item.order_item_id)
            .bind(&item.item_name)
            .bind(item.quantity)
            .bind(item.decision)
            .bind(item.decided_at)
            .execute(&mut *conn)
            .await?;
            items.push(item);
        }
        Ok(items)
    }

    /// The pending request of `kind` from `source` for an order, if any.
    pub async fn find_pending_in(
        conn: &mut SqliteConnection,
        order_id: &str,
        kind: RequestKind,
        source: RequestSource,
    ) -> DbResult<Option<CancellationRequest>> {
        let sql = format!(
            r#"
            SELECT {} FROM cancellation_requests
            WHERE order_id = ?1 AND kind = ?2 AND source = ?3 AND status = 'pending'
            ORDER BY created_at
            LIMIT 1
            "#,
            REQUEST_COLUMNS
        );
        let request = sqlx::query_as::<_, CancellationRequest>(&sql)
            .bind(order_id)
            .bind(kind)
            .bind(source)
            .fetch_optional(conn)
            .await?;
        Ok(request)
    }

    pub async fn get_in(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<CancellationRequest>> {
        let sql = format!(
            "SELECT {} FROM cancellation_requests WHERE id = ?1",
            REQUEST_COLUMNS
        );
        let request = sqlx::query_as::<_, CancellationRequest>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(request)
    }

    pub async fn items_for_request_in(
        conn: &mut SqliteConnection,
        request_id: &str,
    ) -> DbResult<Vec<CancellationRequestItem>> {
        let sql = format!(
            "SELECT {} FROM cancellation_request_items WHERE request_id = ?1 ORDER BY rowid",
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, CancellationRequestItem>(&sql)
            .bind(request_id)
            .fetch_all(conn)
            .await?;
        Ok(items)
    }

    pub async fn get_detail_in(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<CancellationRequestDetail>> {
        let Some(request) = Self::get_in(&mut *conn, id).await? else {
            return Ok(None);
        };
        let items = Self::items_for_request_in(conn, id).await?;
        Ok(Some(CancellationRequestDetail { request, items }))
    }

    pub async fn get_detail(&self, id: &str) -> DbResult<Option<CancellationRequestDetail>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_detail_in(&mut conn, id).await
    }

    /// Requests with their items, newest first. `None` lists every status.
    pub async fn list(
        &self,
        status: Option<RequestStatus>,
    ) -> DbResult<Vec<CancellationRequestDetail>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!(
            "SELECT {} FROM cancellation_requests WHERE (?1 IS NULL OR status = ?1) ORDER BY created_at DESC",
            REQUEST_COLUMNS
        );
        let requests = sqlx::query_as::<_, CancellationRequest>(&sql)
            .bind(status)
            .fetch_all(&mut *conn)
            .await?;

        let mut details = Vec::with_capacity(requests.len());
        for request in requests {
            let items = Self::items_for_request_in(&mut conn, &request.id).await?;
            details.push(CancellationRequestDetail { request, items });
        }
        Ok(details)
    }

    /// Of `order_item_ids`, those already on some pending request.
    pub async fn items_in_pending_request_in(
        conn: &mut SqliteConnection,
        order_item_ids: &[String],
    ) -> DbResult<Vec<String>> {
        if order_item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            SELECT ri.order_item_id
            FROM cancellation_request_items ri
            JOIN cancellation_requests r ON r.id = ri.request_id
            WHERE r.status = 'pending' AND ri.order_item_id IN ({})
            "#,
            placeholders(order_item_ids.len())
        );
        let mut query = sqlx::query_scalar::<_, String>(&sql);
        for id in order_item_ids {
            query = query.bind(id);
        }
        Ok(query.fetch_all(conn).await?)
    }

    /// Records a decision on a pending item. Returns false if the item was
    /// already decided.
    pub async fn set_item_decision_in(
        conn: &mut SqliteConnection,
        item_id: &str,
        decision: ItemDecision,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE cancellation_request_items SET decision = ?2, decided_at = ?3 WHERE id = ?1 AND decision = 'pending'",
        )
        .bind(item_id)
        .bind(decision)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Sets the overall status. A non-pending status also stamps the resolver.
    pub async fn set_status_in(
        conn: &mut SqliteConnection,
        request_id: &str,
        status: RequestStatus,
        resolved_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let resolved_at = (status != RequestStatus::Pending).then_some(now);
        let result = sqlx::query(
            r#"
            UPDATE cancellation_requests SET
                status = ?2,
                resolved_by = ?3,
                resolved_at = ?4,
                updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(request_id)
        .bind(status)
        .bind(resolved_by)
        .bind(resolved_at)
        .bind(now)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CancellationRequest", request_id));
        }
        Ok(())
    }
}
