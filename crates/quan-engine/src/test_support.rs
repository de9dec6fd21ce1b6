//! Fixtures shared by the engine's unit tests.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use quan_core::{DiningTable, Ingredient, MenuItem, Order, OrderItem, OrderItemStatus};
use quan_db::{Database, DbConfig, OrderRepository, TableRepository};

use crate::hub::NotificationHub;

pub async fn setup() -> (Database, NotificationHub) {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    (db, NotificationHub::new(64))
}

pub async fn table(db: &Database, name: &str) -> DiningTable {
    db.tables().insert(name, Some("Tầng 1"), 4).await.unwrap()
}

pub async fn menu_item(db: &Database, name: &str, price: i64) -> MenuItem {
    db.menu()
        .insert_item(name, "Món chính", price, Some("bếp nóng"))
        .await
        .unwrap()
}

pub async fn ingredient(db: &Database, name: &str, stock: i64) -> Ingredient {
    db.menu().insert_ingredient(name, "phần", stock, 2).await.unwrap()
}

/// Opens an order and seats it, bypassing the workflow.
pub async fn open_order(db: &Database, table: &DiningTable) -> Order {
    let mut conn = db.pool().acquire().await.unwrap();
    let now = Utc::now();
    let order = OrderRepository::create_order_in(&mut conn, &table.id, "staff-1", None, now)
        .await
        .unwrap();
    TableRepository::assign_order_in(&mut conn, &table.id, &order.id, now)
        .await
        .unwrap();
    order
}

/// Inserts an item directly in `status`, created at `created_at`.
pub async fn item_at(
    db: &Database,
    order: &Order,
    menu: &MenuItem,
    status: OrderItemStatus,
    created_at: DateTime<Utc>,
) -> OrderItem {
    let item = OrderItem {
        id: Uuid::new_v4().to_string(),
        order_id: order.id.clone(),
        menu_item_id: menu.id.clone(),
        name: menu.name.clone(),
        unit_price: menu.price,
        quantity: 1,
        status,
        note: None,
        created_at,
        updated_at: created_at,
    };
    let mut conn = db.pool().acquire().await.unwrap();
    OrderRepository::add_item_in(&mut conn, &item).await.unwrap();
    OrderRepository::recompute_total_in(&mut conn, &order.id, Utc::now())
        .await
        .unwrap();
    item
}

pub async fn item(
    db: &Database,
    order: &Order,
    menu: &MenuItem,
    status: OrderItemStatus,
) -> OrderItem {
    item_at(db, order, menu, status, Utc::now()).await
}
