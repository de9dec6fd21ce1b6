//! JSON handlers for staff devices.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use quan_core::{
    CancellationRequestDetail, CancellationStats, DailySummary, DiningTable, Ingredient,
    ItemDecision, KitchenTicket, MenuItem, OfflineAction, Order, OrderItem, OrderItemStatus,
    PaymentMethod, Permission, PurchaseOrder, PurchaseOrderStatus, RequestStatus,
    ReturnNotification, Role, StaffUser, TopItem,
};
use quan_engine::workflows::{
    CashReceipt, DecisionOutcome, LineDecision, OrderDetail, OutOfStockOutcome, PaymentRequest,
    ReceiveOutcome, RestockOutcome,
};
use quan_engine::{FlushReport, OfflineActionKind, TokenPair};

use crate::error::{ApiError, ApiResult};
use crate::extract::AuthUser;
use crate::AppState;

// =============================================================================
// Health & auth
// =============================================================================

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = state.engine.db().health_check().await;
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if database { "ok" } else { "degraded" },
            "database": database,
            "realtime_subscribers": state.engine.hub().subscriber_count(),
        })),
    )
}

#[derive(Deserialize)]
pub struct LoginBody {
    pub username: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> ApiResult<Json<TokenPair>> {
    Ok(Json(state.engine.auth.login(&body.username, &body.password).await?))
}

#[derive(Deserialize)]
pub struct CreateStaffBody {
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub password: String,
}

pub async fn create_staff(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateStaffBody>,
) -> ApiResult<(StatusCode, Json<StaffUser>)> {
    user.require(&state, Permission::ManageStaff)?;
    let staff = state
        .engine
        .auth
        .create_staff(&body.username, &body.display_name, body.role, &body.password)
        .await?;
    Ok((StatusCode::CREATED, Json(staff)))
}

pub async fn list_staff(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<StaffUser>>> {
    user.require(&state, Permission::ManageStaff)?;
    Ok(Json(state.engine.auth.list_staff().await?))
}

// =============================================================================
// Tables & menu
// =============================================================================

pub async fn list_tables(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Json<Vec<DiningTable>>> {
    Ok(Json(state.engine.orders.list_tables().await?))
}

#[derive(Deserialize, Default)]
pub struct OpenTableBody {
    #[serde(default)]
    pub note: Option<String>,
}

pub async fn open_table(
    State(state): State<AppState>,
    user: AuthUser,
    Path(table_id): Path<String>,
    body: Option<Json<OpenTableBody>>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    user.require(&state, Permission::TakeOrders)?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let order = state
        .engine
        .orders
        .open_table(&table_id, user.id(), body.note.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn release_table(
    State(state): State<AppState>,
    user: AuthUser,
    Path(table_id): Path<String>,
) -> ApiResult<Json<DiningTable>> {
    user.require(&state, Permission::TakeOrders)?;
    Ok(Json(state.engine.orders.release_table(&table_id).await?))
}

#[derive(Deserialize)]
pub struct MenuQuery {
    #[serde(default)]
    pub available_only: bool,
}

pub async fn list_menu(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<MenuQuery>,
) -> ApiResult<Json<Vec<MenuItem>>> {
    Ok(Json(state.engine.orders.list_menu(query.available_only).await?))
}

pub async fn restock_menu_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(menu_item_id): Path<String>,
) -> ApiResult<Json<RestockOutcome>> {
    user.require(&state, Permission::ManageInventory)?;
    Ok(Json(state.engine.stock.restock_menu_item(&menu_item_id).await?))
}

// =============================================================================
// Orders & items
// =============================================================================

pub async fn list_open_orders(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(state.engine.orders.list_open_orders().await?))
}

pub async fn order_detail(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(order_id): Path<String>,
) -> ApiResult<Json<OrderDetail>> {
    Ok(Json(state.engine.orders.order_detail(&order_id).await?))
}

#[derive(Deserialize)]
pub struct AddItemBody {
    pub menu_item_id: String,
    #[serde(default = "one")]
    pub quantity: i64,
    #[serde(default)]
    pub note: Option<String>,
}

fn one() -> i64 {
    1
}

pub async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<String>,
    Json(body): Json<AddItemBody>,
) -> ApiResult<(StatusCode, Json<OrderItem>)> {
    user.require(&state, Permission::TakeOrders)?;
    let item = state
        .engine
        .orders
        .add_item(&order_id, &body.menu_item_id, body.quantity, body.note.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[derive(Deserialize)]
pub struct ItemStatusBody {
    pub status: OrderItemStatus,
}

/// Waiters may mark items served; every other move belongs to the kitchen.
fn status_permissions(status: OrderItemStatus) -> &'static [Permission] {
    match status {
        OrderItemStatus::Served => &[Permission::WorkKitchen, Permission::TakeOrders],
        _ => &[Permission::WorkKitchen],
    }
}

pub async fn update_item_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<String>,
    Json(body): Json<ItemStatusBody>,
) -> ApiResult<Json<OrderItem>> {
    user.require_any(&state, status_permissions(body.status))?;
    let item = state
        .engine
        .orders
        .update_item_status(&item_id, body.status, user.id())
        .await?;
    Ok(Json(item))
}

pub async fn mark_out_of_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<String>,
) -> ApiResult<Json<OutOfStockOutcome>> {
    user.require(&state, Permission::WorkKitchen)?;
    Ok(Json(state.engine.stock.mark_out_of_stock(&item_id, user.id()).await?))
}

#[derive(Deserialize)]
pub struct TransferBody {
    pub table_id: String,
}

pub async fn transfer_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<String>,
    Json(body): Json<TransferBody>,
) -> ApiResult<Json<Order>> {
    user.require(&state, Permission::TakeOrders)?;
    Ok(Json(
        state.engine.orders.transfer_order(&order_id, &body.table_id).await?,
    ))
}

pub async fn close_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<String>,
) -> ApiResult<Json<Order>> {
    user.require(&state, Permission::TakePayments)?;
    Ok(Json(state.engine.orders.close_order(&order_id).await?))
}

pub async fn kitchen_queue(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Json<Vec<KitchenTicket>>> {
    Ok(Json(state.engine.orders.kitchen_queue().await?))
}

// =============================================================================
// Payments
// =============================================================================

#[derive(Deserialize)]
pub struct PaymentBody {
    pub method: PaymentMethod,
}

pub async fn request_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<String>,
    Json(body): Json<PaymentBody>,
) -> ApiResult<Json<PaymentRequest>> {
    user.require(&state, Permission::TakePayments)?;
    Ok(Json(
        state.engine.payments.payment_request(&order_id, body.method).await?,
    ))
}

#[derive(Deserialize)]
pub struct CashBody {
    pub tendered: i64,
}

pub async fn cash_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<String>,
    Json(body): Json<CashBody>,
) -> ApiResult<Json<CashReceipt>> {
    user.require(&state, Permission::TakePayments)?;
    Ok(Json(
        state.engine.payments.record_cash_payment(&order_id, body.tendered).await?,
    ))
}

// =============================================================================
// Cancellations & notifications
// =============================================================================

#[derive(Deserialize)]
pub struct CancellationQuery {
    #[serde(default)]
    pub status: Option<RequestStatus>,
}

pub async fn list_cancellations(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<CancellationQuery>,
) -> ApiResult<Json<Vec<CancellationRequestDetail>>> {
    Ok(Json(state.engine.cancellations.list(query.status).await?))
}

pub async fn get_cancellation(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(request_id): Path<String>,
) -> ApiResult<Json<CancellationRequestDetail>> {
    Ok(Json(state.engine.cancellations.get(&request_id).await?))
}

#[derive(Deserialize)]
pub struct CancellationBody {
    pub order_id: String,
    pub item_ids: Vec<String>,
    pub reason: String,
}

pub async fn request_cancellation(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CancellationBody>,
) -> ApiResult<(StatusCode, Json<Vec<CancellationRequestDetail>>)> {
    user.require(&state, Permission::RequestCancellation)?;
    let requests = state
        .engine
        .cancellations
        .request(&body.order_id, &body.item_ids, &body.reason, user.id())
        .await?;
    Ok((StatusCode::CREATED, Json(requests)))
}

/// Either per-line decisions or one decision for every open line.
#[derive(Deserialize)]
pub struct DecideBody {
    #[serde(default)]
    pub decisions: Vec<LineDecision>,
    #[serde(default)]
    pub all: Option<ItemDecision>,
}

pub async fn decide_cancellation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(request_id): Path<String>,
    Json(body): Json<DecideBody>,
) -> ApiResult<Json<DecisionOutcome>> {
    user.require(&state, Permission::DecideCancellation)?;
    let cancellations = &state.engine.cancellations;
    let outcome = match body.all {
        Some(ItemDecision::Approved) => cancellations.approve_all(&request_id, user.id()).await?,
        Some(ItemDecision::Rejected) => cancellations.reject_all(&request_id, user.id()).await?,
        Some(ItemDecision::Pending) => {
            return Err(ApiError::bad_request("`all` must be approved or rejected"))
        }
        None => {
            cancellations
                .decide(&request_id, &body.decisions, user.id())
                .await?
        }
    };
    Ok(Json(outcome))
}

pub async fn list_notifications(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Json<Vec<ReturnNotification>>> {
    Ok(Json(state.engine.stock.list_pending_notifications().await?))
}

pub async fn acknowledge_notification(
    State(state): State<AppState>,
    user: AuthUser,
    Path(notification_id): Path<String>,
) -> ApiResult<Json<ReturnNotification>> {
    user.require(&state, Permission::AcknowledgeNotifications)?;
    Ok(Json(
        state
            .engine
            .stock
            .acknowledge_notification(&notification_id, user.id())
            .await?,
    ))
}

// =============================================================================
// Inventory
// =============================================================================

pub async fn list_ingredients(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<Ingredient>>> {
    user.require(&state, Permission::ManageInventory)?;
    Ok(Json(state.engine.stock.list_ingredients().await?))
}

pub async fn low_stock(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<Ingredient>>> {
    user.require(&state, Permission::ManageInventory)?;
    Ok(Json(state.engine.stock.low_stock().await?))
}

#[derive(Deserialize)]
pub struct PurchaseOrderQuery {
    #[serde(default)]
    pub status: Option<PurchaseOrderStatus>,
}

pub async fn list_purchase_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<PurchaseOrderQuery>,
) -> ApiResult<Json<Vec<PurchaseOrder>>> {
    user.require(&state, Permission::ManageInventory)?;
    Ok(Json(state.engine.stock.list_purchase_orders(query.status).await?))
}

#[derive(Deserialize)]
pub struct PurchaseOrderBody {
    pub ingredient_id: String,
    pub quantity: i64,
    pub unit_cost: i64,
}

pub async fn create_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<PurchaseOrderBody>,
) -> ApiResult<(StatusCode, Json<PurchaseOrder>)> {
    user.require(&state, Permission::ManageInventory)?;
    let po = state
        .engine
        .stock
        .create_purchase_order(&body.ingredient_id, body.quantity, body.unit_cost)
        .await?;
    Ok((StatusCode::CREATED, Json(po)))
}

pub async fn receive_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(po_id): Path<String>,
) -> ApiResult<Json<ReceiveOutcome>> {
    user.require(&state, Permission::ManageInventory)?;
    Ok(Json(state.engine.stock.receive_purchase_order(&po_id).await?))
}

pub async fn cancel_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(po_id): Path<String>,
) -> ApiResult<StatusCode> {
    user.require(&state, Permission::ManageInventory)?;
    state.engine.stock.cancel_purchase_order(&po_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Reports
// =============================================================================

#[derive(Deserialize)]
pub struct DailyQuery {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

pub async fn daily_report(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<DailyQuery>,
) -> ApiResult<Json<DailySummary>> {
    user.require(&state, Permission::ViewReports)?;
    let reports = &state.engine.reports;
    let date = query.date.unwrap_or_else(|| reports.today());
    Ok(Json(reports.daily_summary(date, query.utc_offset_minutes).await?))
}

/// `from` / `to` are local dates, both inclusive; default today.
#[derive(Deserialize)]
pub struct RangeQuery {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    10
}

impl RangeQuery {
    fn days(&self, state: &AppState) -> (NaiveDate, NaiveDate) {
        let today = state.engine.reports.today();
        let from = self.from.unwrap_or(today);
        (from, self.to.unwrap_or(from.max(today)))
    }
}

pub async fn top_items_report(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<Vec<TopItem>>> {
    user.require(&state, Permission::ViewReports)?;
    let (from, to) = query.days(&state);
    Ok(Json(state.engine.reports.top_items(from, to, query.limit).await?))
}

pub async fn cancellation_report(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<CancellationStats>> {
    user.require(&state, Permission::ViewReports)?;
    let (from, to) = query.days(&state);
    Ok(Json(state.engine.reports.cancellation_stats(from, to).await?))
}

// =============================================================================
// Offline replay
// =============================================================================

#[derive(Deserialize)]
pub struct OfflineBatch {
    pub actions: Vec<OfflineActionKind>,
}

fn permissions_for(action: &OfflineActionKind) -> &'static [Permission] {
    match action {
        OfflineActionKind::AddItem { .. } => &[Permission::TakeOrders],
        OfflineActionKind::UpdateItemStatus { status, .. } => status_permissions(*status),
        OfflineActionKind::RequestCancellation { .. } => &[Permission::RequestCancellation],
        OfflineActionKind::AcknowledgeNotification { .. } => &[Permission::AcknowledgeNotifications],
    }
}

/// Queues the caller's offline actions behind anything they already have
/// waiting and replays the caller's queue. Actions run as the caller.
pub async fn replay_offline(
    State(state): State<AppState>,
    user: AuthUser,
    Json(batch): Json<OfflineBatch>,
) -> ApiResult<Json<FlushReport>> {
    for action in &batch.actions {
        user.require_any(&state, permissions_for(action))?;
    }
    for action in &batch.actions {
        state.engine.offline.enqueue(user.id(), action).await?;
    }
    let sink = state.engine.local_sink();
    Ok(Json(state.engine.offline.flush(user.id(), &sink).await?))
}

/// The caller's queued actions, head first, with the last error on each.
pub async fn list_offline_queue(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<OfflineAction>>> {
    Ok(Json(state.engine.offline.pending(user.id()).await?))
}

/// Drops one of the caller's queued actions so the rest can flow.
pub async fn discard_offline_action(
    State(state): State<AppState>,
    user: AuthUser,
    Path(action_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.engine.offline.discard(user.id(), &action_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
