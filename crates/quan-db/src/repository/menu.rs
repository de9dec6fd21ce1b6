//! # Menu Repository
//!
//! Menu items, ingredients, recipes and purchase orders.
//!
//! ## Stock Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  purchase order ──receive──► ingredients.stock_quantity += qty          │
//! │                                      │                                  │
//! │  order item ──in_progress──► stock_quantity -= recipe qty × item qty    │
//! │                                      │                                  │
//! │                              stock ≤ 0 ──► menu items using it          │
//! │                                            become unavailable           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use quan_core::{Ingredient, MenuItem, PurchaseOrder, PurchaseOrderStatus, RecipeLine};

const MENU_COLUMNS: &str =
    "id, name, category, price, station, is_available, created_at, updated_at";
const INGREDIENT_COLUMNS: &str =
    "id, name, unit, stock_quantity, reorder_level, updated_at";
const PURCHASE_ORDER_COLUMNS: &str =
    "id, ingredient_id, quantity, unit_cost, status, created_at, received_at";

/// Repository for menu and inventory operations.
#[derive(Debug, Clone)]
pub struct MenuRepository {
    pool: SqlitePool,
}

impl MenuRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MenuRepository { pool }
    }

    // =========================================================================
    // Menu items
    // =========================================================================

    pub async fn insert_item(
        &self,
        name: &str,
        category: &str,
        price: i64,
        station: Option<&str>,
    ) -> DbResult<MenuItem> {
        let now = Utc::now();
        let item = MenuItem {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            category: category.trim().to_string(),
            price,
            station: station.map(str::to_string),
            is_available: true,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %item.id, name = %item.name, "Inserting menu item");

        sqlx::query(
            r#"
            INSERT INTO menu_items (id, name, category, price, station, is_available, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&item.id)
        .bind(&item.name)
        .bind(&item.category)
        .bind(item.price)
        .bind(&item.station)
        .bind(item.is_available)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(item)
    }

    pub async fn get_item(&self, id: &str) -> DbResult<Option<MenuItem>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_item_in(&mut conn, id).await
    }

    pub async fn get_item_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<MenuItem>> {
        let sql = format!("SELECT {} FROM menu_items WHERE id = ?1", MENU_COLUMNS);
        let item = sqlx::query_as::<_, MenuItem>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(item)
    }

    /// The menu, grouped by category. `available_only` hides sold-out items.
    pub async fn list_items(&self, available_only: bool) -> DbResult<Vec<MenuItem>> {
        let sql = format!(
            "SELECT {} FROM menu_items WHERE (?1 = 0 OR is_available = 1) ORDER BY category, name",
            MENU_COLUMNS
        );
        let items = sqlx::query_as::<_, MenuItem>(&sql)
            .bind(available_only)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    /// Returns true if the flag changed.
    pub async fn set_availability_in(
        conn: &mut SqliteConnection,
        id: &str,
        available: bool,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let exists: Option<bool> =
            sqlx::query_scalar("SELECT is_available FROM menu_items WHERE id = ?1")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;
        let Some(current) = exists else {
            return Err(DbError::not_found("MenuItem", id));
        };
        if current == available {
            return Ok(false);
        }

        sqlx::query("UPDATE menu_items SET is_available = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(available)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        Ok(true)
    }

    pub async fn set_availability(&self, id: &str, available: bool) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        Self::set_availability_in(&mut conn, id, available, Utc::now()).await
    }

    // =========================================================================
    // Ingredients
    // =========================================================================

    pub async fn insert_ingredient(
        &self,
        name: &str,
        unit: &str,
        stock_quantity: i64,
        reorder_level: i64,
    ) -> DbResult<Ingredient> {
        let ingredient = Ingredient {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            unit: unit.trim().to_string(),
            stock_quantity,
            reorder_level,
            updated_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO ingredients (id, name, unit, stock_quantity, reorder_level, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&ingredient.id)
        .bind(&ingredient.name)
        .bind(&ingredient.unit)
        .bind(ingredient.stock_quantity)
        .bind(ingredient.reorder_level)
        .bind(ingredient.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(ingredient)
    }

    pub async fn get_ingredient_in(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Ingredient>> {
        let sql = format!("SELECT {} FROM ingredients WHERE id = ?1", INGREDIENT_COLUMNS);
        let ingredient = sqlx::query_as::<_, Ingredient>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(ingredient)
    }

    pub async fn list_ingredients(&self) -> DbResult<Vec<Ingredient>> {
        let sql = format!("SELECT {} FROM ingredients ORDER BY name", INGREDIENT_COLUMNS);
        let ingredients = sqlx::query_as::<_, Ingredient>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(ingredients)
    }

    /// Ingredients at or below their reorder level.
    pub async fn low_stock(&self) -> DbResult<Vec<Ingredient>> {
        let sql = format!(
            "SELECT {} FROM ingredients WHERE stock_quantity <= reorder_level ORDER BY name",
            INGREDIENT_COLUMNS
        );
        let ingredients = sqlx::query_as::<_, Ingredient>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(ingredients)
    }

    /// Adds `delta` (negative to consume) and returns the updated row.
    /// Stock is allowed to go negative: the kitchen already cooked it.
    pub async fn adjust_stock_in(
        conn: &mut SqliteConnection,
        ingredient_id: &str,
        delta: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Ingredient> {
        let result = sqlx::query(
            "UPDATE ingredients SET stock_quantity = stock_quantity + ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(ingredient_id)
        .bind(delta)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Ingredient", ingredient_id));
        }

        Self::get_ingredient_in(conn, ingredient_id)
            .await?
            .ok_or_else(|| DbError::not_found("Ingredient", ingredient_id))
    }

    // =========================================================================
    // Recipes
    // =========================================================================

    /// Inserts or replaces how much of an ingredient one portion uses.
    pub async fn set_recipe_line(
        &self,
        menu_item_id: &str,
        ingredient_id: &str,
        quantity: i64,
    ) -> DbResult<RecipeLine> {
        sqlx::query(
            r#"
            INSERT INTO recipe_lines (menu_item_id, ingredient_id, quantity)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (menu_item_id, ingredient_id) DO UPDATE SET quantity = excluded.quantity
            "#,
        )
        .bind(menu_item_id)
        .bind(ingredient_id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        Ok(RecipeLine {
            menu_item_id: menu_item_id.to_string(),
            ingredient_id: ingredient_id.to_string(),
            quantity,
        })
    }

    pub async fn recipe_for_in(
        conn: &mut SqliteConnection,
        menu_item_id: &str,
    ) -> DbResult<Vec<RecipeLine>> {
        let lines = sqlx::query_as::<_, RecipeLine>(
            "SELECT menu_item_id, ingredient_id, quantity FROM recipe_lines WHERE menu_item_id = ?1",
        )
        .bind(menu_item_id)
        .fetch_all(conn)
        .await?;
        Ok(lines)
    }

    pub async fn recipe_for(&self, menu_item_id: &str) -> DbResult<Vec<RecipeLine>> {
        let mut conn = self.pool.acquire().await?;
        Self::recipe_for_in(&mut conn, menu_item_id).await
    }

    /// Ids of menu items whose recipe uses the ingredient.
    pub async fn items_using_in(
        conn: &mut SqliteConnection,
        ingredient_id: &str,
    ) -> DbResult<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT menu_item_id FROM recipe_lines WHERE ingredient_id = ?1 ORDER BY menu_item_id",
        )
        .bind(ingredient_id)
        .fetch_all(conn)
        .await?;
        Ok(ids)
    }

    /// True when every ingredient of the item's recipe has stock left.
    /// Items without a recipe are always cookable.
    pub async fn is_cookable_in(conn: &mut SqliteConnection, menu_item_id: &str) -> DbResult<bool> {
        let depleted: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM recipe_lines r
            JOIN ingredients i ON i.id = r.ingredient_id
            WHERE r.menu_item_id = ?1 AND i.stock_quantity <= 0
            "#,
        )
        .bind(menu_item_id)
        .fetch_one(conn)
        .await?;
        Ok(depleted == 0)
    }

    // =========================================================================
    // Purchase orders
    // =========================================================================

    pub async fn create_purchase_order(
        &self,
        ingredient_id: &str,
        quantity: i64,
        unit_cost: i64,
    ) -> DbResult<PurchaseOrder> {
        let po = PurchaseOrder {
            id: Uuid::new_v4().to_string(),
            ingredient_id: ingredient_id.to_string(),
            quantity,
            unit_cost,
            status: PurchaseOrderStatus::Pending,
            created_at: Utc::now(),
            received_at: None,
        };

        debug!(id = %po.id, ingredient_id = %ingredient_id, quantity, "Creating purchase order");

        sqlx::query(
            r#"
            INSERT INTO purchase_orders (id, ingredient_id, quantity, unit_cost, status, created_at, received_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&po.id)
        .bind(&po.ingredient_id)
        .bind(po.quantity)
        .bind(po.unit_cost)
        .bind(po.status)
        .bind(po.created_at)
        .bind(po.received_at)
        .execute(&self.pool)
        .await?;

        Ok(po)
    }

    pub async fn get_purchase_order_in(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<PurchaseOrder>> {
        let sql = format!(
            "SELECT {} FROM purchase_orders WHERE id = ?1",
            PURCHASE_ORDER_COLUMNS
        );
        let po = sqlx::query_as::<_, PurchaseOrder>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(po)
    }

    pub async fn list_purchase_orders(
        &self,
        status: Option<PurchaseOrderStatus>,
    ) -> DbResult<Vec<PurchaseOrder>> {
        let sql = format!(
            "SELECT {} FROM purchase_orders WHERE (?1 IS NULL OR status = ?1) ORDER BY created_at DESC",
            PURCHASE_ORDER_COLUMNS
        );
        let orders = sqlx::query_as::<_, PurchaseOrder>(&sql)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        Ok(orders)
    }

    /// Marks a pending purchase order received and adds its quantity to
    /// stock. Returns `None` when the order is not pending.
    pub async fn receive_purchase_order_in(
        conn: &mut SqliteConnection,
        id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<(PurchaseOrder, Ingredient)>> {
        let result = sqlx::query(
            "UPDATE purchase_orders SET status = 'received', received_at = ?2 WHERE id = ?1 AND status = 'pending'",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let po = Self::get_purchase_order_in(&mut *conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("PurchaseOrder", id))?;
        let ingredient = Self::adjust_stock_in(conn, &po.ingredient_id, po.quantity, now).await?;

        Ok(Some((po, ingredient)))
    }

    /// Receives a purchase order in its own transaction.
    pub async fn receive_purchase_order(
        &self,
        id: &str,
    ) -> DbResult<Option<(PurchaseOrder, Ingredient)>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        let received = Self::receive_purchase_order_in(&mut tx, id, Utc::now()).await?;
        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        Ok(received)
    }

    /// Returns true if a pending order was cancelled.
    pub async fn cancel_purchase_order(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE purchase_orders SET status = 'cancelled' WHERE id = ?1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
