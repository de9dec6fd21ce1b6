//! # Stock Workflow
//!
//! Out-of-stock handling, ingredient consumption, purchase orders and the
//! waiter's return notifications.
//!
//! ## Availability
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  item → in_progress ──► recipe consumed ──► ingredient ≤ 0              │
//! │                                                │                        │
//! │                                                ▼                        │
//! │                               dishes using it → unavailable             │
//! │                                                                         │
//! │  kitchen marks item out_of_stock ──► dish unavailable                   │
//! │                                   └► return notification to waiter     │
//! │                                                                         │
//! │  purchase order received ──► stock added ──► cookable dishes available  │
//! │  restock_menu_item ──► dish available, out_of_stock items → waiting     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use quan_core::validation::{validate_price, validate_stock_quantity};
use quan_core::{
    Ingredient, MenuItem, OrderItem, OrderItemStatus, OrderStatus, PurchaseOrder,
    PurchaseOrderStatus, ReturnNotification,
};
use quan_db::{
    Database, DbError, MenuRepository, NotificationRepository, OrderRepository, SqliteConnection,
};

use crate::error::{EngineError, EngineResult};
use crate::hub::{EventPayload, NotificationHub};

/// Reason put on notifications raised by the kitchen running out.
pub const OUT_OF_STOCK_REASON: &str = "Hết hàng";

#[derive(Debug, Clone, Serialize)]
pub struct OutOfStockOutcome {
    pub item: OrderItem,
    pub menu_item: MenuItem,
    pub notification: ReturnNotification,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestockOutcome {
    pub menu_item: MenuItem,
    /// Items moved from `out_of_stock` back to `waiting`.
    pub restored: Vec<OrderItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiveOutcome {
    pub purchase_order: PurchaseOrder,
    pub ingredient: Ingredient,
    /// Ids of dishes that became available again.
    pub restored_menu_items: Vec<String>,
}

#[derive(Clone)]
pub struct StockService {
    db: Database,
    hub: NotificationHub,
}

impl StockService {
    pub fn new(db: Database, hub: NotificationHub) -> Self {
        StockService { db, hub }
    }

    // =========================================================================
    // Out of stock
    // =========================================================================

    /// The kitchen cannot make an item: flag it, pull the dish from the menu
    /// and tell the waiter.
    pub async fn mark_out_of_stock(
        &self,
        item_id: &str,
        actor: &str,
    ) -> EngineResult<OutOfStockOutcome> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let item = OrderRepository::require_item_in(&mut tx, item_id).await?;
        let from = item.status;
        from.transition(OrderItemStatus::OutOfStock)?;

        let order = OrderRepository::require_in(&mut tx, &item.order_id).await?;
        if order.status != OrderStatus::Open {
            return Err(EngineError::conflict(format!("Order {} is closed", order.id)));
        }

        if !OrderRepository::update_item_status_in(
            &mut tx,
            item_id,
            from,
            OrderItemStatus::OutOfStock,
            now,
        )
        .await?
        {
            return Err(EngineError::conflict(format!(
                "Item {} changed while updating",
                item_id
            )));
        }

        MenuRepository::set_availability_in(&mut tx, &item.menu_item_id, false, now).await?;
        let menu_item = MenuRepository::get_item_in(&mut tx, &item.menu_item_id)
            .await?
            .ok_or_else(|| EngineError::not_found("MenuItem", &item.menu_item_id))?;

        let updated = OrderRepository::require_item_in(&mut tx, item_id).await?;
        let notification = NotificationRepository::create_in(
            &mut tx,
            &order.table_id,
            &updated,
            OUT_OF_STOCK_REASON,
            now,
        )
        .await?;
        OrderRepository::recompute_total_in(&mut tx, &order.id, now).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(item_id, dish = %menu_item.name, actor, "Item out of stock");
        self.hub.publish(EventPayload::ItemStatusChanged {
            table_id: order.table_id,
            previous: Some(from),
            item: updated.clone(),
        });
        self.hub.publish(EventPayload::ReturnNotificationCreated {
            notification: notification.clone(),
        });

        Ok(OutOfStockOutcome {
            item: updated,
            menu_item,
            notification,
        })
    }

    /// Puts a dish back on the menu and sends its out-of-stock items back
    /// to the kitchen.
    pub async fn restock_menu_item(&self, menu_item_id: &str) -> EngineResult<RestockOutcome> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let menu = MenuRepository::get_item_in(&mut tx, menu_item_id)
            .await?
            .ok_or_else(|| EngineError::not_found("MenuItem", menu_item_id))?;
        if !MenuRepository::is_cookable_in(&mut tx, menu_item_id).await? {
            return Err(EngineError::conflict(format!(
                "{} still has depleted ingredients",
                menu.name
            )));
        }
        MenuRepository::set_availability_in(&mut tx, menu_item_id, true, now).await?;

        let stuck =
            OrderRepository::items_for_menu_item_in(&mut tx, menu_item_id, OrderItemStatus::OutOfStock)
                .await?;
        let mut restored = Vec::with_capacity(stuck.len());
        for item in stuck {
            let to = item.status.transition(OrderItemStatus::Waiting)?;
            if OrderRepository::update_item_status_in(&mut tx, &item.id, item.status, to, now)
                .await?
            {
                restored.push(OrderRepository::require_item_in(&mut tx, &item.id).await?);
            }
        }

        let mut tables = Vec::with_capacity(restored.len());
        for item in &restored {
            let order = OrderRepository::require_in(&mut tx, &item.order_id).await?;
            tables.push(order.table_id);
        }

        let menu_item = MenuRepository::get_item_in(&mut tx, menu_item_id)
            .await?
            .ok_or_else(|| EngineError::not_found("MenuItem", menu_item_id))?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(dish = %menu_item.name, restored = restored.len(), "Dish restocked");
        for (item, table_id) in restored.iter().zip(tables) {
            self.hub.publish(EventPayload::ItemStatusChanged {
                table_id,
                previous: Some(OrderItemStatus::OutOfStock),
                item: item.clone(),
            });
        }

        Ok(RestockOutcome {
            menu_item,
            restored,
        })
    }

    /// Subtracts one item's recipe from stock.
    ///
    /// Stock may go negative. Every dish that depends on an ingredient that
    /// hits zero is taken off the menu; their ids are returned.
    pub async fn consume_ingredients_in(
        conn: &mut SqliteConnection,
        item: &OrderItem,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<String>> {
        let recipe = MenuRepository::recipe_for_in(&mut *conn, &item.menu_item_id).await?;
        let mut disabled = Vec::new();

        for line in recipe {
            let ingredient = MenuRepository::adjust_stock_in(
                &mut *conn,
                &line.ingredient_id,
                -(line.quantity * item.quantity),
                now,
            )
            .await?;

            if ingredient.is_low() {
                warn!(
                    ingredient = %ingredient.name,
                    stock = ingredient.stock_quantity,
                    reorder_level = ingredient.reorder_level,
                    "Ingredient low"
                );
            }
            if ingredient.is_depleted() {
                for menu_item_id in MenuRepository::items_using_in(&mut *conn, &ingredient.id).await? {
                    if MenuRepository::set_availability_in(&mut *conn, &menu_item_id, false, now)
                        .await?
                    {
                        disabled.push(menu_item_id);
                    }
                }
            }
        }

        Ok(disabled)
    }

    // =========================================================================
    // Ingredients & purchase orders
    // =========================================================================

    pub async fn list_ingredients(&self) -> EngineResult<Vec<Ingredient>> {
        Ok(self.db.menu().list_ingredients().await?)
    }

    pub async fn low_stock(&self) -> EngineResult<Vec<Ingredient>> {
        Ok(self.db.menu().low_stock().await?)
    }

    pub async fn list_purchase_orders(
        &self,
        status: Option<PurchaseOrderStatus>,
    ) -> EngineResult<Vec<PurchaseOrder>> {
        Ok(self.db.menu().list_purchase_orders(status).await?)
    }

    pub async fn create_purchase_order(
        &self,
        ingredient_id: &str,
        quantity: i64,
        unit_cost: i64,
    ) -> EngineResult<PurchaseOrder> {
        validate_stock_quantity(quantity)?;
        validate_price(unit_cost)?;

        {
            let mut conn = self.db.pool().acquire().await.map_err(DbError::from)?;
            if MenuRepository::get_ingredient_in(&mut conn, ingredient_id)
                .await?
                .is_none()
            {
                return Err(EngineError::not_found("Ingredient", ingredient_id));
            }
        }

        let po = self
            .db
            .menu()
            .create_purchase_order(ingredient_id, quantity, unit_cost)
            .await?;
        info!(po_id = %po.id, ingredient_id, quantity, "Purchase order created");
        Ok(po)
    }

    /// Books a delivery into stock. Dishes that are cookable again go back
    /// on the menu.
    pub async fn receive_purchase_order(&self, po_id: &str) -> EngineResult<ReceiveOutcome> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let po = MenuRepository::get_purchase_order_in(&mut tx, po_id)
            .await?
            .ok_or_else(|| EngineError::not_found("PurchaseOrder", po_id))?;
        if po.status != PurchaseOrderStatus::Pending {
            return Err(EngineError::conflict(format!(
                "Purchase order {} is {:?}",
                po_id, po.status
            )));
        }

        let (purchase_order, ingredient) =
            MenuRepository::receive_purchase_order_in(&mut tx, po_id, now)
                .await?
                .ok_or_else(|| EngineError::conflict(format!("Purchase order {} changed", po_id)))?;

        let mut restored_menu_items = Vec::new();
        if !ingredient.is_depleted() {
            for menu_item_id in MenuRepository::items_using_in(&mut tx, &ingredient.id).await? {
                if MenuRepository::is_cookable_in(&mut tx, &menu_item_id).await?
                    && MenuRepository::set_availability_in(&mut tx, &menu_item_id, true, now)
                        .await?
                {
                    restored_menu_items.push(menu_item_id);
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            po_id,
            ingredient = %ingredient.name,
            stock = ingredient.stock_quantity,
            restored = restored_menu_items.len(),
            "Purchase order received"
        );

        Ok(ReceiveOutcome {
            purchase_order,
            ingredient,
            restored_menu_items,
        })
    }

    pub async fn cancel_purchase_order(&self, po_id: &str) -> EngineResult<()> {
        if self.db.menu().cancel_purchase_order(po_id).await? {
            info!(po_id, "Purchase order cancelled");
            Ok(())
        } else {
            Err(EngineError::conflict(format!(
                "Purchase order {} is not pending",
                po_id
            )))
        }
    }

    // =========================================================================
    // Return notifications
    // =========================================================================

    pub async fn list_pending_notifications(&self) -> EngineResult<Vec<ReturnNotification>> {
        Ok(self.db.notifications().list_pending().await?)
    }

    /// Marks a notification handled. Acknowledging twice is a no-op.
    pub async fn acknowledge_notification(
        &self,
        id: &str,
        staff_id: &str,
    ) -> EngineResult<ReturnNotification> {
        let repo = self.db.notifications();
        let acknowledged = repo.acknowledge(id, staff_id, Utc::now()).await?;
        let notification = repo
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found("ReturnNotification", id))?;

        if acknowledged {
            info!(id, staff_id, "Return notification acknowledged");
        }
        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{SubscriptionFilter, Topic};
    use crate::test_support as ts;
    use quan_core::{CoreError, NotificationStatus};

    fn service(db: &Database, hub: &NotificationHub) -> StockService {
        StockService::new(db.clone(), hub.clone())
    }

    #[tokio::test]
    async fn test_out_of_stock_notifies_waiter() {
        let (db, hub) = ts::setup().await;
        let mut sub = hub.subscribe(
            SubscriptionFilter::default().with_topics([Topic::ReturnNotifications]),
        );
        let table = ts::table(&db, "B1").await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let order = ts::open_order(&db, &table).await;
        let item = ts::item(&db, &order, &pho, OrderItemStatus::Waiting).await;

        let outcome = service(&db, &hub)
            .mark_out_of_stock(&item.id, "kitchen-1")
            .await
            .unwrap();
        assert_eq!(outcome.item.status, OrderItemStatus::OutOfStock);
        assert!(!outcome.menu_item.is_available);
        assert_eq!(outcome.notification.table_id, table.id);
        assert_eq!(outcome.notification.reason, OUT_OF_STOCK_REASON);

        let event = sub.recv().await.unwrap();
        assert!(matches!(event.payload, EventPayload::ReturnNotificationCreated { .. }));
    }

    #[tokio::test]
    async fn test_served_item_cannot_run_out() {
        let (db, hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let order = ts::open_order(&db, &table).await;
        let item = ts::item(&db, &order, &pho, OrderItemStatus::Served).await;

        let err = service(&db, &hub)
            .mark_out_of_stock(&item.id, "kitchen-1")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_restock_returns_items_to_kitchen() {
        let (db, hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let order = ts::open_order(&db, &table).await;
        let item = ts::item(&db, &order, &pho, OrderItemStatus::Waiting).await;
        let svc = service(&db, &hub);
        svc.mark_out_of_stock(&item.id, "kitchen-1").await.unwrap();

        let outcome = svc.restock_menu_item(&pho.id).await.unwrap();
        assert!(outcome.menu_item.is_available);
        assert_eq!(outcome.restored.len(), 1);
        assert_eq!(outcome.restored[0].status, OrderItemStatus::Waiting);
    }

    #[tokio::test]
    async fn test_restock_refused_while_ingredient_depleted() {
        let (db, hub) = ts::setup().await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let beef = ts::ingredient(&db, "Thịt bò", 0).await;
        db.menu().set_recipe_line(&pho.id, &beef.id, 1).await.unwrap();

        let err = service(&db, &hub).restock_menu_item(&pho.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_receiving_purchase_order_restores_dishes() {
        let (db, hub) = ts::setup().await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let beef = ts::ingredient(&db, "Thịt bò", 0).await;
        db.menu().set_recipe_line(&pho.id, &beef.id, 1).await.unwrap();
        db.menu().set_availability(&pho.id, false).await.unwrap();
        let svc = service(&db, &hub);

        let po = svc.create_purchase_order(&beef.id, 20, 120_000).await.unwrap();
        let outcome = svc.receive_purchase_order(&po.id).await.unwrap();
        assert_eq!(outcome.ingredient.stock_quantity, 20);
        assert_eq!(outcome.purchase_order.status, PurchaseOrderStatus::Received);
        assert_eq!(outcome.restored_menu_items, vec![pho.id.clone()]);

        // A received order can be neither received again nor cancelled.
        assert!(matches!(
            svc.receive_purchase_order(&po.id).await.unwrap_err(),
            EngineError::Conflict(_)
        ));
        assert!(matches!(
            svc.cancel_purchase_order(&po.id).await.unwrap_err(),
            EngineError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_purchase_order_for_unknown_ingredient() {
        let (db, hub) = ts::setup().await;
        let err = service(&db, &hub)
            .create_purchase_order("missing", 5, 1_000)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_acknowledge_is_idempotent() {
        let (db, hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let order = ts::open_order(&db, &table).await;
        let item = ts::item(&db, &order, &pho, OrderItemStatus::Waiting).await;
        let svc = service(&db, &hub);
        let outcome = svc.mark_out_of_stock(&item.id, "kitchen-1").await.unwrap();

        assert_eq!(svc.list_pending_notifications().await.unwrap().len(), 1);
        let first = svc
            .acknowledge_notification(&outcome.notification.id, "waiter-1")
            .await
            .unwrap();
        assert_eq!(first.status, NotificationStatus::Acknowledged);
        assert_eq!(first.acknowledged_by.as_deref(), Some("waiter-1"));

        let second = svc
            .acknowledge_notification(&outcome.notification.id, "waiter-2")
            .await
            .unwrap();
        assert_eq!(second.acknowledged_by.as_deref(), Some("waiter-1"));
        assert!(svc.list_pending_notifications().await.unwrap().is_empty());

        let err = svc.acknowledge_notification("missing", "waiter-1").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }
}
