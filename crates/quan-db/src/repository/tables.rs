//! # Table Repository
//!
//! Dining tables and their occupancy.
//!
//! ```text
//! available ──open_table──► occupied ──close_order──► cleaning ──► available
//!     ▲                        │
//!     └──── reserved           └── transfer_order moves current_order_id
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use quan_core::{DiningTable, TableStatus};

const TABLE_COLUMNS: &str = "id, name, area, capacity, status, current_order_id, updated_at";

/// Repository for dining table operations.
#[derive(Debug, Clone)]
pub struct TableRepository {
    pool: SqlitePool,
}

impl TableRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TableRepository { pool }
    }

    /// All tables, by area then name.
    pub async fn list(&self) -> DbResult<Vec<DiningTable>> {
        let sql = format!(
            "SELECT {} FROM dining_tables ORDER BY area, name",
            TABLE_COLUMNS
        );
        let tables = sqlx::query_as::<_, DiningTable>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(tables)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<DiningTable>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, id).await
    }

    pub async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<DiningTable>> {
        let sql = format!("SELECT {} FROM dining_tables WHERE id = ?1", TABLE_COLUMNS);
        let table = sqlx::query_as::<_, DiningTable>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(table)
    }

    /// Like [`get_in`](Self::get_in) but missing rows are an error.
    pub async fn require_in(conn: &mut SqliteConnection, id: &str) -> DbResult<DiningTable> {
        Self::get_in(conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Table", id))
    }

    /// Creates an available table.
    pub async fn insert(
        &self,
        name: &str,
        area: Option<&str>,
        capacity: i64,
    ) -> DbResult<DiningTable> {
        let table = DiningTable {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            area: area.map(str::to_string),
            capacity,
            status: TableStatus::Available,
            current_order_id: None,
            updated_at: Utc::now(),
        };

        debug!(id = %table.id, name = %table.name, "Inserting table");

        sqlx::query(
            r#"
            INSERT INTO dining_tables (id, name, area, capacity, status, current_order_id, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&table.id)
        .bind(&table.name)
        .bind(&table.area)
        .bind(table.capacity)
        .bind(table.status)
        .bind(&table.current_order_id)
        .bind(table.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(table)
    }

    /// Sets the status, leaving the current order untouched.
    pub async fn set_status(&self, id: &str, status: TableStatus) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::set_status_in(&mut conn, id, status, Utc::now()).await
    }

    pub async fn set_status_in(
        conn: &mut SqliteConnection,
        id: &str,
        status: TableStatus,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query("UPDATE dining_tables SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .bind(now)
            .execute(conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Table", id));
        }
        Ok(())
    }

    /// Seats an order: status `occupied`, `current_order_id` set.
    pub async fn assign_order_in(
        conn: &mut SqliteConnection,
        table_id: &str,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE dining_tables SET
                status = 'occupied',
                current_order_id = ?2,
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(table_id)
        .bind(order_id)
        .bind(now)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Table", table_id));
        }
        Ok(())
    }

    /// Detaches the current order and moves the table to `status`.
    pub async fn clear_order_in(
        conn: &mut SqliteConnection,
        table_id: &str,
        status: TableStatus,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE dining_tables SET
                status = ?2,
                current_order_id = NULL,
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(table_id)
        .bind(status)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;

    #[tokio::test]
    async fn test_insert_and_list() {
        let db = fixtures::db().await;
        fixtures::table(&db, "B2").await;
        fixtures::table(&db, "B1").await;

        let tables = db.tables().list().await.unwrap();
        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["B1", "B2"]);
        assert!(tables.iter().all(|t| t.status == TableStatus::Available));
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let db = fixtures::db().await;
        fixtures::table(&db, "B1").await;
        let err = db.tables().insert("B1", None, 2).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_assign_and_clear_order() {
        let db = fixtures::db().await;
        let table = fixtures::table(&db, "B1").await;
        let mut conn = db.pool().acquire().await.unwrap();

        TableRepository::assign_order_in(&mut conn, &table.id, "order-1", Utc::now())
            .await
            .unwrap();
        let seated = TableRepository::require_in(&mut conn, &table.id).await.unwrap();
        assert_eq!(seated.status, TableStatus::Occupied);
        assert_eq!(seated.current_order_id.as_deref(), Some("order-1"));

        TableRepository::clear_order_in(&mut conn, &table.id, TableStatus::Cleaning, Utc::now())
            .await
            .unwrap();
        let cleared = TableRepository::require_in(&mut conn, &table.id).await.unwrap();
        assert_eq!(cleared.status, TableStatus::Cleaning);
        assert!(cleared.current_order_id.is_none());
    }

    #[tokio::test]
    async fn test_set_status_unknown_table() {
        let db = fixtures::db().await;
        let err = db
            .tables()
            .set_status("missing", TableStatus::Reserved)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
