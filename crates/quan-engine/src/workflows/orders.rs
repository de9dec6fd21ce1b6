//! # Table & Order Workflow
//!
//! Seating, order entry, kitchen progress and closing.
//!
//! ## Table Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   available ──open_table──► occupied ──close_order──► cleaning          │
//! │   reserved  ──open_table──┘    │                         │              │
//! │       ▲                        │ transfer_order          │              │
//! │       │                        ▼                         │              │
//! │       │                    (source → available,          │              │
//! │       │                     target → occupied)           │              │
//! │       └──────────────────────release_table───────────────┘              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use quan_core::validation::{validate_note, validate_quantity};
use quan_core::{
    DiningTable, KitchenTicket, MenuItem, Order, OrderItem, OrderItemStatus, OrderStatus,
    TableStatus,
};
use quan_db::{Database, DbError, MenuRepository, OrderRepository, TableRepository};

use crate::error::{EngineError, EngineResult};
use crate::hub::{EventPayload, NotificationHub};
use crate::workflows::stock::StockService;

/// An order with its lines.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Clone)]
pub struct OrderService {
    db: Database,
    hub: NotificationHub,
}

impl OrderService {
    pub fn new(db: Database, hub: NotificationHub) -> Self {
        OrderService { db, hub }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn list_tables(&self) -> EngineResult<Vec<DiningTable>> {
        Ok(self.db.tables().list().await?)
    }

    pub async fn list_menu(&self, available_only: bool) -> EngineResult<Vec<MenuItem>> {
        Ok(self.db.menu().list_items(available_only).await?)
    }

    pub async fn list_open_orders(&self) -> EngineResult<Vec<Order>> {
        Ok(self.db.orders().list_open().await?)
    }

    pub async fn order_detail(&self, order_id: &str) -> EngineResult<OrderDetail> {
        let order = self
            .db
            .orders()
            .get(order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))?;
        let items = self.db.orders().items_for_order(order_id).await?;
        Ok(OrderDetail { order, items })
    }

    /// Waiting and in-progress items grouped per order, oldest first.
    pub async fn kitchen_queue(&self) -> EngineResult<Vec<KitchenTicket>> {
        Ok(self.db.orders().kitchen_queue().await?)
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Seats guests: creates an open order and marks the table occupied.
    pub async fn open_table(
        &self,
        table_id: &str,
        staff_id: &str,
        note: Option<&str>,
    ) -> EngineResult<Order> {
        let note = validate_note(note)?;
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let table = TableRepository::require_in(&mut tx, table_id).await?;
        if !table.status.can_seat() {
            return Err(EngineError::conflict(format!(
                "Table {} is {:?}",
                table.name, table.status
            )));
        }

        let order =
            OrderRepository::create_order_in(&mut tx, table_id, staff_id, note.as_deref(), now)
                .await?;
        TableRepository::assign_order_in(&mut tx, table_id, &order.id, now).await?;
        let table = TableRepository::require_in(&mut tx, table_id).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(table = %table.name, order_id = %order.id, staff_id, "Table opened");
        self.hub.publish(EventPayload::TableChanged { table });
        Ok(order)
    }

    /// Marks a table that was being cleaned as available again.
    pub async fn release_table(&self, table_id: &str) -> EngineResult<DiningTable> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let table = TableRepository::require_in(&mut tx, table_id).await?;
        if table.current_order_id.is_some() {
            return Err(EngineError::conflict(format!(
                "Table {} still has an open order",
                table.name
            )));
        }
        TableRepository::set_status_in(&mut tx, table_id, TableStatus::Available, now).await?;
        let table = TableRepository::require_in(&mut tx, table_id).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        self.hub.publish(EventPayload::TableChanged {
            table: table.clone(),
        });
        Ok(table)
    }

    // =========================================================================
    // Items
    // =========================================================================

    /// Adds a line to an open order, snapshotting the menu name and price.
    pub async fn add_item(
        &self,
        order_id: &str,
        menu_item_id: &str,
        quantity: i64,
        note: Option<&str>,
    ) -> EngineResult<OrderItem> {
        validate_quantity(quantity)?;
        let note = validate_note(note)?;
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let order = OrderRepository::require_in(&mut tx, order_id).await?;
        ensure_editable(&order)?;

        let menu = MenuRepository::get_item_in(&mut tx, menu_item_id)
            .await?
            .ok_or_else(|| EngineError::not_found("MenuItem", menu_item_id))?;
        if !menu.is_available || !MenuRepository::is_cookable_in(&mut tx, menu_item_id).await? {
            return Err(EngineError::conflict(format!("{} is not available", menu.name)));
        }

        let item = OrderItem {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            menu_item_id: menu.id.clone(),
            name: menu.name.clone(),
            unit_price: menu.price,
            quantity,
            status: OrderItemStatus::Waiting,
            note,
            created_at: now,
            updated_at: now,
        };
        OrderRepository::add_item_in(&mut tx, &item).await?;
        let total = OrderRepository::recompute_total_in(&mut tx, order_id, now).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(order_id, item = %item.name, quantity, %total, "Item added");
        self.hub.publish(EventPayload::ItemStatusChanged {
            table_id: order.table_id,
            previous: None,
            item: item.clone(),
        });
        Ok(item)
    }

    /// Moves an item through the kitchen.
    ///
    /// Cancelling and returning go through cancellation requests and
    /// running out goes through [`StockService::mark_out_of_stock`]; both
    /// are refused here. Starting an item consumes its recipe.
    pub async fn update_item_status(
        &self,
        item_id: &str,
        to: OrderItemStatus,
        actor: &str,
    ) -> EngineResult<OrderItem> {
        match to {
            OrderItemStatus::Cancelled | OrderItemStatus::Returned => {
                return Err(EngineError::conflict(
                    "Cancelling or returning an item needs a cancellation request",
                ));
            }
            OrderItemStatus::OutOfStock => {
                return Err(EngineError::conflict(
                    "Use the out-of-stock action to mark an item out of stock",
                ));
            }
            _ => {}
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let item = OrderRepository::require_item_in(&mut tx, item_id).await?;
        let from = item.status;
        from.transition(to)?;

        let order = OrderRepository::require_in(&mut tx, &item.order_id).await?;
        if order.status != OrderStatus::Open {
            return Err(EngineError::conflict(format!("Order {} is closed", order.id)));
        }

        if !OrderRepository::update_item_status_in(&mut tx, item_id, from, to, now).await? {
            return Err(EngineError::conflict(format!(
                "Item {} changed while updating",
                item_id
            )));
        }

        let disabled = if to == OrderItemStatus::InProgress {
            StockService::consume_ingredients_in(&mut tx, &item, now).await?
        } else {
            Vec::new()
        };

        OrderRepository::recompute_total_in(&mut tx, &item.order_id, now).await?;
        let updated = OrderRepository::require_item_in(&mut tx, item_id).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(item_id, %from, %to, actor, "Item status changed");
        if !disabled.is_empty() {
            info!(menu_items = ?disabled, "Menu items ran out of ingredients");
        }
        self.hub.publish(EventPayload::ItemStatusChanged {
            table_id: order.table_id,
            previous: Some(from),
            item: updated.clone(),
        });
        Ok(updated)
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Moves an open order to an empty table.
    pub async fn transfer_order(&self, order_id: &str, to_table_id: &str) -> EngineResult<Order> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let order = OrderRepository::require_in(&mut tx, order_id).await?;
        if order.status != OrderStatus::Open {
            return Err(EngineError::conflict(format!("Order {} is closed", order_id)));
        }
        if order.table_id == to_table_id {
            return Err(EngineError::conflict("Order is already at that table"));
        }

        let target = TableRepository::require_in(&mut tx, to_table_id).await?;
        if !target.status.can_seat() {
            return Err(EngineError::conflict(format!(
                "Table {} is {:?}",
                target.name, target.status
            )));
        }

        OrderRepository::transfer_in(&mut tx, order_id, to_table_id, now).await?;
        TableRepository::clear_order_in(&mut tx, &order.table_id, TableStatus::Available, now)
            .await?;
        TableRepository::assign_order_in(&mut tx, to_table_id, order_id, now).await?;

        let source = TableRepository::require_in(&mut tx, &order.table_id).await?;
        let target = TableRepository::require_in(&mut tx, to_table_id).await?;
        let moved = OrderRepository::require_in(&mut tx, order_id).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(order_id, from = %source.name, to = %target.name, "Order transferred");
        self.hub.publish(EventPayload::TableChanged { table: source });
        self.hub.publish(EventPayload::TableChanged { table: target });
        Ok(moved)
    }

    /// Closes a settled order and sends its table to cleaning.
    ///
    /// An order closes when it is paid or has nothing billable on it.
    pub async fn close_order(&self, order_id: &str) -> EngineResult<Order> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let order = OrderRepository::require_in(&mut tx, order_id).await?;
        if order.status != OrderStatus::Open {
            return Err(EngineError::conflict(format!("Order {} is already closed", order_id)));
        }

        let total = OrderRepository::recompute_total_in(&mut tx, order_id, now).await?;
        if !order.is_paid() && total.is_positive() {
            return Err(EngineError::conflict(format!(
                "Order {} has {} unpaid",
                order_id, total
            )));
        }

        if !OrderRepository::close_in(&mut tx, order_id, OrderStatus::Closed, now).await? {
            return Err(EngineError::conflict(format!("Order {} is already closed", order_id)));
        }

        let table = TableRepository::require_in(&mut tx, &order.table_id).await?;
        if table.current_order_id.as_deref() == Some(order_id) {
            TableRepository::clear_order_in(&mut tx, &table.id, TableStatus::Cleaning, now)
                .await?;
        }
        let table = TableRepository::require_in(&mut tx, &order.table_id).await?;
        let closed = OrderRepository::require_in(&mut tx, order_id).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(order_id, table = %table.name, "Order closed");
        self.hub.publish(EventPayload::TableChanged { table });
        Ok(closed)
    }
}

/// Items can only be added to an open, unpaid order.
fn ensure_editable(order: &Order) -> EngineResult<()> {
    if order.status != OrderStatus::Open {
        return Err(EngineError::conflict(format!("Order {} is closed", order.id)));
    }
    if order.is_paid() {
        return Err(EngineError::conflict(format!("Order {} is already paid", order.id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{SubscriptionFilter, Topic};
    use crate::test_support as ts;
    use quan_core::{CoreError, PaymentStatus};

    fn service(db: &Database, hub: &NotificationHub) -> OrderService {
        OrderService::new(db.clone(), hub.clone())
    }

    #[tokio::test]
    async fn test_open_table_seats_order() {
        let (db, hub) = ts::setup().await;
        let mut sub = hub.subscribe(SubscriptionFilter::default().with_topics([Topic::Tables]));
        let table = ts::table(&db, "B1").await;

        let order = service(&db, &hub)
            .open_table(&table.id, "staff-1", Some("  sinh nhật "))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.note.as_deref(), Some("sinh nhật"));

        let seated = db.tables().get(&table.id).await.unwrap().unwrap();
        assert_eq!(seated.status, TableStatus::Occupied);
        assert_eq!(seated.current_order_id.as_deref(), Some(order.id.as_str()));

        let event = sub.recv().await.unwrap();
        assert!(matches!(event.payload, EventPayload::TableChanged { .. }));
    }

    #[tokio::test]
    async fn test_open_occupied_table_conflicts() {
        let (db, hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let svc = service(&db, &hub);
        svc.open_table(&table.id, "staff-1", None).await.unwrap();

        let err = svc.open_table(&table.id, "staff-2", None).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_add_item_snapshots_menu_and_totals() {
        let (db, hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let svc = service(&db, &hub);
        let order = svc.open_table(&table.id, "staff-1", None).await.unwrap();

        let item = svc.add_item(&order.id, &pho.id, 2, None).await.unwrap();
        assert_eq!(item.status, OrderItemStatus::Waiting);
        assert_eq!(item.name, "Phở bò");
        assert_eq!(item.unit_price, 65_000);

        let detail = svc.order_detail(&order.id).await.unwrap();
        assert_eq!(detail.order.total_amount, 130_000);
        assert_eq!(detail.items.len(), 1);
    }

    #[tokio::test]
    async fn test_add_unavailable_item_conflicts() {
        let (db, hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        db.menu().set_availability(&pho.id, false).await.unwrap();
        let svc = service(&db, &hub);
        let order = svc.open_table(&table.id, "staff-1", None).await.unwrap();

        let err = svc.add_item(&order.id, &pho.id, 1, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));

        let err = svc.add_item(&order.id, &pho.id, 0, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_item_status_follows_state_machine() {
        let (db, hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let svc = service(&db, &hub);
        let order = svc.open_table(&table.id, "staff-1", None).await.unwrap();
        let item = svc.add_item(&order.id, &pho.id, 1, None).await.unwrap();

        let err = svc
            .update_item_status(&item.id, OrderItemStatus::Served, "kitchen-1")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::InvalidTransition { .. })));

        for to in [
            OrderItemStatus::InProgress,
            OrderItemStatus::Ready,
            OrderItemStatus::Served,
        ] {
            let updated = svc.update_item_status(&item.id, to, "kitchen-1").await.unwrap();
            assert_eq!(updated.status, to);
        }

        let err = svc
            .update_item_status(&item.id, OrderItemStatus::Returned, "waiter-1")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_starting_item_consumes_recipe() {
        let (db, hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let beef = ts::ingredient(&db, "Thịt bò", 2).await;
        db.menu().set_recipe_line(&pho.id, &beef.id, 1).await.unwrap();
        let svc = service(&db, &hub);
        let order = svc.open_table(&table.id, "staff-1", None).await.unwrap();
        let item = svc.add_item(&order.id, &pho.id, 2, None).await.unwrap();

        svc.update_item_status(&item.id, OrderItemStatus::InProgress, "kitchen-1")
            .await
            .unwrap();

        let stock = db.menu().list_ingredients().await.unwrap();
        assert_eq!(stock[0].stock_quantity, 0);
        let menu = db.menu().get_item(&pho.id).await.unwrap().unwrap();
        assert!(!menu.is_available);
    }

    #[tokio::test]
    async fn test_transfer_moves_order_and_frees_source() {
        let (db, hub) = ts::setup().await;
        let b1 = ts::table(&db, "B1").await;
        let b2 = ts::table(&db, "B2").await;
        let svc = service(&db, &hub);
        let order = svc.open_table(&b1.id, "staff-1", None).await.unwrap();

        let moved = svc.transfer_order(&order.id, &b2.id).await.unwrap();
        assert_eq!(moved.table_id, b2.id);

        let source = db.tables().get(&b1.id).await.unwrap().unwrap();
        let target = db.tables().get(&b2.id).await.unwrap().unwrap();
        assert_eq!(source.status, TableStatus::Available);
        assert!(source.current_order_id.is_none());
        assert_eq!(target.status, TableStatus::Occupied);
        assert_eq!(target.current_order_id.as_deref(), Some(order.id.as_str()));

        // Back onto an occupied table is refused.
        let other = svc.open_table(&b1.id, "staff-1", None).await.unwrap();
        let err = svc.transfer_order(&other.id, &b2.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_close_requires_payment() {
        let (db, hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let svc = service(&db, &hub);
        let order = svc.open_table(&table.id, "staff-1", None).await.unwrap();
        svc.add_item(&order.id, &pho.id, 1, None).await.unwrap();

        let err = svc.close_order(&order.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));

        {
            let mut conn = db.pool().acquire().await.unwrap();
            OrderRepository::mark_paid_in(
                &mut conn,
                &order.id,
                quan_core::PaymentMethod::Cash,
                None,
                Utc::now(),
            )
            .await
            .unwrap();
        }

        let closed = svc.close_order(&order.id).await.unwrap();
        assert_eq!(closed.status, OrderStatus::Closed);
        assert_eq!(closed.payment_status, PaymentStatus::Paid);

        let table = db.tables().get(&table.id).await.unwrap().unwrap();
        assert_eq!(table.status, TableStatus::Cleaning);

        let table = svc.release_table(&table.id).await.unwrap();
        assert_eq!(table.status, TableStatus::Available);
    }

    #[tokio::test]
    async fn test_empty_order_closes_without_payment() {
        let (db, hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let svc = service(&db, &hub);
        let order = svc.open_table(&table.id, "staff-1", None).await.unwrap();

        let closed = svc.close_order(&order.id).await.unwrap();
        assert_eq!(closed.status, OrderStatus::Closed);

        let err = svc.add_item(&order.id, "whatever", 1, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_kitchen_queue_lists_active_items() {
        let (db, hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let svc = service(&db, &hub);
        let order = svc.open_table(&table.id, "staff-1", None).await.unwrap();
        let a = svc.add_item(&order.id, &pho.id, 1, None).await.unwrap();
        svc.add_item(&order.id, &pho.id, 1, None).await.unwrap();
        svc.update_item_status(&a.id, OrderItemStatus::InProgress, "kitchen-1")
            .await
            .unwrap();
        svc.update_item_status(&a.id, OrderItemStatus::Ready, "kitchen-1")
            .await
            .unwrap();

        let queue = svc.kitchen_queue().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].table_name, "B1");
        assert_eq!(queue[0].items.len(), 1);
    }
}
