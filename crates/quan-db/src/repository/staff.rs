//! # Staff Repository
//!
//! Staff accounts. Password hashing happens in the engine; this layer only
//! stores the encoded hash.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use quan_core::{Role, StaffUser};

const STAFF_COLUMNS: &str = "id, username, display_name, role, password_hash, is_active, created_at";

/// Repository for staff accounts.
#[derive(Debug, Clone)]
pub struct StaffRepository {
    pool: SqlitePool,
}

impl StaffRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StaffRepository { pool }
    }

    pub async fn insert(
        &self,
        username: &str,
        display_name: &str,
        role: Role,
        password_hash: &str,
    ) -> DbResult<StaffUser> {
        let user = StaffUser {
            id: Uuid::new_v4().to_string(),
            username: username.trim().to_lowercase(),
            display_name: display_name.trim().to_string(),
            role,
            password_hash: password_hash.to_string(),
            is_active: true,
            created_at: Utc::now(),
        };

        debug!(id = %user.id, username = %user.username, role = ?user.role, "Inserting staff user");

        sqlx::query(
            r#"
            INSERT INTO staff_users (id, username, display_name, role, password_hash, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(user.role)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(user)
    }

    /// Case-insensitive lookup by username.
    pub async fn find_by_username(&self, username: &str) -> DbResult<Option<StaffUser>> {
        let sql = format!(
            "SELECT {} FROM staff_users WHERE username = ?1",
            STAFF_COLUMNS
        );
        let user = sqlx::query_as::<_, StaffUser>(&sql)
            .bind(username.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<StaffUser>> {
        let sql = format!("SELECT {} FROM staff_users WHERE id = ?1", STAFF_COLUMNS);
        let user = sqlx::query_as::<_, StaffUser>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn list(&self) -> DbResult<Vec<StaffUser>> {
        let sql = format!("SELECT {} FROM staff_users ORDER BY username", STAFF_COLUMNS);
        let users = sqlx::query_as::<_, StaffUser>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE staff_users SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("StaffUser", id));
        }
        Ok(())
    }
}
