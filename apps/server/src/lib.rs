//! # Quan POS Server
//!
//! axum routes over the [`Engine`].
//!
//! ## Route Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  public     GET  /health            POST /auth/login                    │
//! │             POST /webhooks/{momo,zalopay,vietqr}                        │
//! │                                                                         │
//! │  bearer     /tables  /menu  /orders  /order-items  /kitchen/queue       │
//! │             /cancellations  /notifications  /reports/*                  │
//! │             /ingredients  /purchase-orders  /staff  /offline/*          │
//! │                                                                         │
//! │  token      GET  /realtime?topics=&token=   (WebSocket)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod extract;
pub mod realtime;
pub mod routes;
pub mod webhooks;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use quan_engine::Engine;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/auth/login", post(routes::login))
        .route("/staff", get(routes::list_staff).post(routes::create_staff))
        // Tables & menu
        .route("/tables", get(routes::list_tables))
        .route("/tables/{id}/open", post(routes::open_table))
        .route("/tables/{id}/release", post(routes::release_table))
        .route("/menu", get(routes::list_menu))
        .route("/menu/{id}/restock", post(routes::restock_menu_item))
        // Orders
        .route("/orders", get(routes::list_open_orders))
        .route("/orders/{id}", get(routes::order_detail))
        .route("/orders/{id}/items", post(routes::add_item))
        .route("/orders/{id}/transfer", post(routes::transfer_order))
        .route("/orders/{id}/close", post(routes::close_order))
        .route("/orders/{id}/payment", post(routes::request_payment))
        .route("/orders/{id}/cash", post(routes::cash_payment))
        .route("/order-items/{id}/status", patch(routes::update_item_status))
        .route("/order-items/{id}/out-of-stock", post(routes::mark_out_of_stock))
        .route("/kitchen/queue", get(routes::kitchen_queue))
        // Cancellations & notifications
        .route(
            "/cancellations",
            get(routes::list_cancellations).post(routes::request_cancellation),
        )
        .route("/cancellations/{id}", get(routes::get_cancellation))
        .route("/cancellations/{id}/decide", post(routes::decide_cancellation))
        .route("/notifications", get(routes::list_notifications))
        .route("/notifications/{id}/ack", post(routes::acknowledge_notification))
        // Inventory
        .route("/ingredients", get(routes::list_ingredients))
        .route("/ingredients/low", get(routes::low_stock))
        .route(
            "/purchase-orders",
            get(routes::list_purchase_orders).post(routes::create_purchase_order),
        )
        .route("/purchase-orders/{id}/receive", post(routes::receive_purchase_order))
        .route("/purchase-orders/{id}/cancel", post(routes::cancel_purchase_order))
        // Reports
        .route("/reports/daily", get(routes::daily_report))
        .route("/reports/top-items", get(routes::top_items_report))
        .route("/reports/cancellations", get(routes::cancellation_report))
        // Offline replay
        .route("/offline/replay", post(routes::replay_offline))
        .route("/offline/queue", get(routes::list_offline_queue))
        .route("/offline/queue/{id}", delete(routes::discard_offline_action))
        // Webhooks
        .route("/webhooks/momo", post(webhooks::momo))
        .route("/webhooks/zalopay", post(webhooks::zalopay))
        .route("/webhooks/vietqr", post(webhooks::vietqr))
        // Realtime
        .route("/realtime", get(realtime::realtime_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use quan_core::{OrderItemStatus, Role};
    use quan_db::{Database, DbConfig};
    use quan_engine::AppConfig;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app() -> (Router, Engine) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "server-test-secret-0123456789".into();
        let engine = Engine::new(db, &config);
        (router(AppState { engine: engine.clone() }), engine)
    }

    async fn token(engine: &Engine, username: &str, role: Role) -> String {
        engine
            .auth
            .create_staff(username, username, role, "matkhau123")
            .await
            .unwrap();
        engine.auth.login(username, "matkhau123").await.unwrap().access_token
    }

    async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let (app, _) = app().await;
        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"], true);
    }

    #[tokio::test]
    async fn test_routes_require_bearer_token() {
        let (app, _) = app().await;
        let (status, body) = send(&app, Method::GET, "/tables", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, _) = send(&app, Method::GET, "/tables", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_and_role_checks() {
        let (app, engine) = app().await;
        engine
            .auth
            .create_staff("thungan", "Thu ngân", Role::Cashier, "matkhau123")
            .await
            .unwrap();

        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "thungan", "password": "matkhau123" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["access_token"].as_str().unwrap().to_string();
        assert_eq!(body["user"]["role"], "cashier");
        assert!(body["user"].get("password_hash").is_none());

        let (status, body) = send(&app, Method::POST, "/cancellations/x/decide", Some(&token), Some(json!({ "all": "approved" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");

        let (status, _) = send(&app, Method::GET, "/reports/daily", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_order_flow_over_http() {
        let (app, engine) = app().await;
        let waiter = token(&engine, "phucvu", Role::Waiter).await;
        let kitchen = token(&engine, "bep", Role::Kitchen).await;
        let cashier = token(&engine, "thungan", Role::Cashier).await;

        let table = engine.db().tables().insert("B1", None, 4).await.unwrap();
        let pho = engine
            .db()
            .menu()
            .insert_item("Phở bò", "Món chính", 65_000, None)
            .await
            .unwrap();

        let (status, order) = send(&app, Method::POST, &format!("/tables/{}/open", table.id), Some(&waiter), None).await;
        assert_eq!(status, StatusCode::CREATED);
        let order_id = order["id"].as_str().unwrap().to_string();

        let (status, item) = send(
            &app,
            Method::POST,
            &format!("/orders/{}/items", order_id),
            Some(&waiter),
            Some(json!({ "menu_item_id": pho.id, "quantity": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let item_id = item["id"].as_str().unwrap().to_string();

        // Waiters cannot start cooking.
        let uri = format!("/order-items/{}/status", item_id);
        let (status, _) = send(&app, Method::PATCH, &uri, Some(&waiter), Some(json!({ "status": "in_progress" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Skipping the kitchen is an invalid transition.
        let (status, body) = send(&app, Method::PATCH, &uri, Some(&kitchen), Some(json!({ "status": "served" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "INVALID_TRANSITION");

        for next in ["in_progress", "ready"] {
            let (status, _) = send(&app, Method::PATCH, &uri, Some(&kitchen), Some(json!({ "status": next }))).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, body) = send(&app, Method::PATCH, &uri, Some(&waiter), Some(json!({ "status": "served" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "served");

        let (status, receipt) = send(
            &app,
            Method::POST,
            &format!("/orders/{}/cash", order_id),
            Some(&cashier),
            Some(json!({ "tendered": 150_000 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(receipt["change"], 20_000);

        let (status, closed) = send(&app, Method::POST, &format!("/orders/{}/close", order_id), Some(&cashier), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(closed["status"], "closed");
    }

    /// A seated order with one dish on the menu.
    async fn seated_order(engine: &Engine, table: &str) -> (String, String) {
        let table = engine.db().tables().insert(table, None, 4).await.unwrap();
        let pho = engine
            .db()
            .menu()
            .insert_item("Phở bò", "Món chính", 65_000, None)
            .await
            .unwrap();
        let order = engine.orders.open_table(&table.id, "staff-1", None).await.unwrap();
        (order.id, pho.id)
    }

    fn add_item(order_id: &str, menu_item_id: &str) -> Value {
        json!({ "kind": "add_item", "payload": { "order_id": order_id, "menu_item_id": menu_item_id, "quantity": 1 } })
    }

    #[tokio::test]
    async fn test_offline_queues_are_per_caller() {
        let (app, engine) = app().await;
        let waiter_a = token(&engine, "phucvu1", Role::Waiter).await;
        let waiter_b = token(&engine, "phucvu2", Role::Waiter).await;
        let (order_id, pho_id) = seated_order(&engine, "B1").await;

        let (status, report) = send(
            &app,
            Method::POST,
            "/offline/replay",
            Some(&waiter_a),
            Some(json!({ "actions": [add_item("gone", &pho_id)] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["applied"], 0);
        assert_eq!(report["remaining"], 1);
        assert!(report["halted_on"]["error"].as_str().is_some());

        // A stuck head on one device does not hold up another.
        let (status, report) = send(
            &app,
            Method::POST,
            "/offline/replay",
            Some(&waiter_b),
            Some(json!({ "actions": [add_item(&order_id, &pho_id)] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report, json!({ "applied": 1, "remaining": 0, "halted_on": null }));
        assert_eq!(engine.db().orders().items_for_order(&order_id).await.unwrap().len(), 1);

        let (status, queue) = send(&app, Method::GET, "/offline/queue", Some(&waiter_a), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(queue.as_array().unwrap().len(), 1);
        assert!(queue[0]["last_error"].as_str().is_some());
        let stuck = format!("/offline/queue/{}", queue[0]["id"].as_str().unwrap());

        let (_, queue) = send(&app, Method::GET, "/offline/queue", Some(&waiter_b), None).await;
        assert_eq!(queue, json!([]));

        let (status, _) = send(&app, Method::DELETE, &stuck, Some(&waiter_b), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, Method::DELETE, &stuck, Some(&waiter_a), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, queue) = send(&app, Method::GET, "/offline/queue", Some(&waiter_a), None).await;
        assert_eq!(queue, json!([]));
    }

    #[tokio::test]
    async fn test_offline_replay_acts_as_caller() {
        let (app, engine) = app().await;
        let waiter = token(&engine, "phucvu1", Role::Waiter).await;
        let waiter_id = engine.auth.verify(&waiter).unwrap().sub;
        let (order_id, pho_id) = seated_order(&engine, "B1").await;
        let first = engine.orders.add_item(&order_id, &pho_id, 1, None).await.unwrap();
        let second = engine.orders.add_item(&order_id, &pho_id, 1, None).await.unwrap();

        let cancel = json!({
            "kind": "request_cancellation",
            "payload": { "order_id": order_id, "item_ids": [first.id], "reason": "Khách đổi ý", "requested_by": "quanly" }
        });
        let (status, report) =
            send(&app, Method::POST, "/offline/replay", Some(&waiter), Some(json!({ "actions": [cancel] }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["applied"], 1);
        let requests = engine.db().cancellations().list(None).await.unwrap();
        assert_eq!(requests[0].request.requested_by.as_deref(), Some(waiter_id.as_str()));

        // Waiters may serve offline as they can online, but not cook.
        let cook = json!({ "kind": "update_item_status", "payload": { "item_id": second.id, "status": "in_progress" } });
        let (status, body) =
            send(&app, Method::POST, "/offline/replay", Some(&waiter), Some(json!({ "actions": [cook] }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");
        assert_eq!(engine.offline.count(&waiter_id).await.unwrap(), 0);

        for next in [OrderItemStatus::InProgress, OrderItemStatus::Ready] {
            engine.orders.update_item_status(&second.id, next, "bep").await.unwrap();
        }
        let serve = json!({ "kind": "update_item_status", "payload": { "item_id": second.id, "status": "served" } });
        let (status, report) =
            send(&app, Method::POST, "/offline/replay", Some(&waiter), Some(json!({ "actions": [serve] }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["applied"], 1);
        let item = engine.db().orders().get_item(&second.id).await.unwrap().unwrap();
        assert_eq!(item.status, OrderItemStatus::Served);
    }

    #[tokio::test]
    async fn test_concurrent_replays_apply_each_action_once() {
        let (app, engine) = app().await;
        let waiter = token(&engine, "phucvu1", Role::Waiter).await;
        let (order_id, pho_id) = seated_order(&engine, "B1").await;

        let batch = json!({ "actions": [add_item(&order_id, &pho_id)] });
        let ((first, a), (second, b)) = tokio::join!(
            send(&app, Method::POST, "/offline/replay", Some(&waiter), Some(batch.clone())),
            send(&app, Method::POST, "/offline/replay", Some(&waiter), Some(batch.clone())),
        );
        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::OK);
        assert_eq!(a["applied"].as_u64().unwrap() + b["applied"].as_u64().unwrap(), 2);
        assert_eq!(engine.db().orders().items_for_order(&order_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_webhooks_reject_bad_signatures() {
        let (app, _) = app().await;

        // Unconfigured providers answer 503 rather than accepting anything.
        let (status, _) = send(&app, Method::POST, "/webhooks/momo", None, Some(json!({}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = send(&app, Method::POST, "/webhooks/zalopay", None, Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["return_code"], 0);
    }

    #[tokio::test]
    async fn test_zalopay_bad_mac() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut config = AppConfig::default();
        config.payments.zalopay.key2 = "zalopay-key2".into();
        let engine = Engine::new(db, &config);
        let app = router(AppState { engine });

        let body = json!({ "data": "{\"app_trans_id\":\"240723_QP0123456789\",\"amount\":1000,\"zp_trans_id\":1}", "mac": "00", "type": 1 });
        let (status, reply) = send(&app, Method::POST, "/webhooks/zalopay", None, Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["return_code"], -1);
    }
}
