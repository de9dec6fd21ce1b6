//! # Domain Types
//!
//! Entities shared by every layer of Quan POS.
//!
//! ## Entity Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  DiningTable ──1:1 (open)──► Order ──1:n──► OrderItem ──n:1──► MenuItem │
//! │                                │               ▲                  │     │
//! │                                │               │                  │     │
//! │                                ▼               │              RecipeLine│
//! │                      CancellationRequest ─1:n─ RequestItem        │     │
//! │                                                                   ▼     │
//! │                      ReturnNotification                      Ingredient │
//! │                        (to the waiter)                            ▲     │
//! │                                                                   │     │
//! │  StaffUser (role)                                          PurchaseOrder│
//! │  OfflineAction (device-side queue)                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ids are UUID v4 strings. Amounts are whole đồng (`i64`) with a
//! [`Money`] accessor. Ingredient quantities are integers in the
//! ingredient's base unit (grams, millilitres, pieces).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::lifecycle::OrderItemStatus;
use crate::money::Money;

// =============================================================================
// Tables
// =============================================================================

/// Occupancy of a dining table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum TableStatus {
    Available,
    Occupied,
    Reserved,
    /// Guests left, table not yet wiped down.
    Cleaning,
}

impl TableStatus {
    /// A new order can be opened on the table.
    pub const fn can_seat(&self) -> bool {
        matches!(self, TableStatus::Available | TableStatus::Reserved)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DiningTable {
    pub id: String,
    pub name: String,
    /// Floor / zone label ("Tầng 1", "Sân vườn").
    pub area: Option<String>,
    pub capacity: i64,
    pub status: TableStatus,
    pub current_order_id: Option<String>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Menu & Inventory
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    pub category: String,
    /// Price in đồng.
    pub price: i64,
    /// Kitchen station that prepares it ("bếp nóng", "quầy bar").
    pub station: Option<String>,
    pub is_available: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl MenuItem {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_dong(self.price)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Ingredient {
    pub id: String,
    pub name: String,
    /// Base unit the quantities are counted in ("g", "ml", "pcs").
    pub unit: String,
    pub stock_quantity: i64,
    pub reorder_level: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Ingredient {
    /// At or below the reorder level.
    pub fn is_low(&self) -> bool {
        self.stock_quantity <= self.reorder_level
    }

    /// Nothing left to cook with.
    pub fn is_depleted(&self) -> bool {
        self.stock_quantity <= 0
    }
}

/// How much of an ingredient one portion of a menu item consumes.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RecipeLine {
    pub menu_item_id: String,
    pub ingredient_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PurchaseOrderStatus {
    Pending,
    Received,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseOrder {
    pub id: String,
    pub ingredient_id: String,
    pub quantity: i64,
    /// Cost per base unit in đồng.
    pub unit_cost: i64,
    pub status: PurchaseOrderStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub received_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum OrderStatus {
    Open,
    Closed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PaymentStatus {
    Unpaid,
    /// A QR / wallet payment was requested and the provider has not
    /// confirmed it yet.
    Pending,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum PaymentMethod {
    Cash,
    Card,
    Momo,
    Zalopay,
    Vietqr,
}

impl PaymentMethod {
    /// Confirmed asynchronously by a provider webhook.
    pub const fn is_provider_confirmed(&self) -> bool {
        matches!(
            self,
            PaymentMethod::Momo | PaymentMethod::Zalopay | PaymentMethod::Vietqr
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub table_id: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    /// Sum of billable lines in đồng.
    pub total_amount: i64,
    /// Short code put in transfer descriptions so webhooks can find the order.
    pub payment_reference: String,
    pub provider_transaction_id: Option<String>,
    pub note: Option<String>,
    /// Staff id of the waiter who opened the table.
    pub opened_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl Order {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_dong(self.total_amount)
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }
}

/// A line on an order. Name and price are frozen at the time of ordering.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub menu_item_id: String,
    pub name: String,
    pub unit_price: i64,
    pub quantity: i64,
    pub status: OrderItemStatus,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl OrderItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_dong(self.unit_price)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price().multiply_quantity(self.quantity)
    }
}

/// One order's worth of active lines, as shown on the kitchen display.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct KitchenTicket {
    pub order_id: String,
    pub table_id: String,
    pub table_name: String,
    #[ts(as = "String")]
    pub oldest_item_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

// =============================================================================
// Cancellation & Returns
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RequestKind {
    /// Void an item that has not reached the guest.
    Cancel,
    /// Take back an item that was served.
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RequestSource {
    Staff,
    /// Raised by the escalation worker for items stuck in the kitchen.
    AutoTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    PartiallyApproved,
}

impl RequestStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::PartiallyApproved => "partially_approved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ItemDecision {
    Pending,
    Approved,
    Rejected,
}

impl ItemDecision {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ItemDecision::Pending => "pending",
            ItemDecision::Approved => "approved",
            ItemDecision::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CancellationRequest {
    pub id: String,
    pub order_id: String,
    pub table_id: String,
    pub kind: RequestKind,
    pub source: RequestSource,
    pub status: RequestStatus,
    pub reason: String,
    pub requested_by: Option<String>,
    pub resolved_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CancellationRequestItem {
    pub id: String,
    pub request_id: String,
    pub order_item_id: String,
    pub item_name: String,
    pub quantity: i64,
    pub decision: ItemDecision,
    #[ts(as = "Option<String>")]
    pub decided_at: Option<DateTime<Utc>>,
}

/// A request together with its lines.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CancellationRequestDetail {
    pub request: CancellationRequest,
    pub items: Vec<CancellationRequestItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum NotificationStatus {
    Pending,
    Acknowledged,
}

/// Tells the waiter to go back to a table about an item.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReturnNotification {
    pub id: String,
    pub order_id: String,
    pub table_id: String,
    pub order_item_id: String,
    pub item_name: String,
    pub quantity: i64,
    pub reason: String,
    pub status: NotificationStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
}

// =============================================================================
// Staff
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    Admin,
    Cashier,
    Waiter,
    Kitchen,
}

/// Actions gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Open tables, add items, transfer orders.
    TakeOrders,
    /// Move items through the kitchen states, mark out of stock.
    WorkKitchen,
    /// Raise a cancellation / return request.
    RequestCancellation,
    /// Approve or reject cancellation requests.
    DecideCancellation,
    /// Acknowledge return notifications.
    AcknowledgeNotifications,
    /// Take payments, close orders.
    TakePayments,
    /// Read cashier reports.
    ViewReports,
    /// Menu, stock and purchase orders.
    ManageInventory,
    /// Create staff accounts.
    ManageStaff,
}

impl Role {
    /// Returns true if this role may perform `permission`.
    pub fn allows(&self, permission: Permission) -> bool {
        use Permission::*;
        match self {
            Role::Admin => true,
            Role::Waiter => matches!(
                permission,
                TakeOrders | RequestCancellation | AcknowledgeNotifications
            ),
            Role::Kitchen => matches!(
                permission,
                WorkKitchen | DecideCancellation | ManageInventory
            ),
            Role::Cashier => matches!(
                permission,
                TakePayments | ViewReports | RequestCancellation | TakeOrders
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StaffUser {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    #[serde(skip_serializing, default)]
    #[ts(skip)]
    pub password_hash: String,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Offline Queue
// =============================================================================

/// A mutation captured while the device had no connectivity.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OfflineAction {
    pub id: String,
    /// Monotonic insertion order; flushing follows it.
    pub seq: i64,
    /// Staff member the action was queued by. Queues never mix owners.
    pub owner: String,
    pub kind: String,
    /// JSON body of the action.
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Reporting
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct MethodTotal {
    pub method: PaymentMethod,
    pub orders: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DailySummary {
    /// Local business date, `YYYY-MM-DD`.
    pub date: String,
    pub paid_orders: i64,
    pub gross_revenue: i64,
    pub average_order_value: i64,
    pub by_method: Vec<MethodTotal>,
    pub cancelled_items: i64,
    pub returned_items: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TopItem {
    pub menu_item_id: String,
    pub name: String,
    pub quantity: i64,
    pub revenue: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CancellationStats {
    pub requests: i64,
    pub auto_requests: i64,
    pub pending_requests: i64,
    pub approved_items: i64,
    pub rejected_items: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================
