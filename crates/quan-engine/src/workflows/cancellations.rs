//! # Cancellation & Return Workflow
//!
//! Staff ask to void or take back items; the kitchen decides per item.
//!
//! ## Request Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  request(order, items, reason)                                          │
//! │     │  served items   → kind = return                                   │
//! │     │  anything else  → kind = cancel                                   │
//! │     ▼                                                                   │
//! │  ┌─────────┐   decide(item → approved)   item → resolution_target       │
//! │  │ pending │ ─────────────────────────►  (cancelled / returned)         │
//! │  └────┬────┘                             left the kitchen? → notify     │
//! │       │        decide(item → rejected)   item untouched                 │
//! │       │                                                                 │
//! │       ▼  every item decided                                             │
//! │  approved │ rejected │ partially_approved                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

use quan_core::cancellation::{apply_decision, ensure_open, merge_items, resolve_status, RequestLine};
use quan_core::validation::validate_reason;
use quan_core::{
    CancellationRequestDetail, ItemDecision, OrderItem, OrderItemStatus, OrderStatus,
    RequestKind, RequestSource, RequestStatus, ReturnNotification, ValidationError,
};
use quan_db::{
    CancellationRepository, Database, DbError, NewRequest, NotificationRepository,
    OrderRepository,
};

use crate::error::{EngineError, EngineResult};
use crate::hub::{EventPayload, NotificationHub};

/// A decision on one line of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineDecision {
    /// Id of the request line (not of the order item).
    pub request_item_id: String,
    pub decision: ItemDecision,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionOutcome {
    pub request: CancellationRequestDetail,
    /// Order items whose status changed.
    pub items: Vec<OrderItem>,
    pub notifications: Vec<ReturnNotification>,
}

#[derive(Clone)]
pub struct CancellationService {
    db: Database,
    hub: NotificationHub,
}

impl CancellationService {
    pub fn new(db: Database, hub: NotificationHub) -> Self {
        CancellationService { db, hub }
    }

    pub async fn list(
        &self,
        status: Option<RequestStatus>,
    ) -> EngineResult<Vec<CancellationRequestDetail>> {
        Ok(self.db.cancellations().list(status).await?)
    }

    pub async fn get(&self, request_id: &str) -> EngineResult<CancellationRequestDetail> {
        self.db
            .cancellations()
            .get_detail(request_id)
            .await?
            .ok_or_else(|| EngineError::not_found("CancellationRequest", request_id))
    }

    /// Raises requests for items of one order.
    ///
    /// Served items go on a `return` request, the rest on a `cancel`
    /// request, so up to two requests come back.
    pub async fn request(
        &self,
        order_id: &str,
        item_ids: &[String],
        reason: &str,
        requested_by: &str,
    ) -> EngineResult<Vec<CancellationRequestDetail>> {
        validate_reason(reason)?;
        if item_ids.is_empty() {
            return Err(ValidationError::Required {
                field: "item_ids".to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let order = OrderRepository::require_in(&mut tx, order_id).await?;
        if order.status != OrderStatus::Open {
            return Err(EngineError::conflict(format!("Order {} is closed", order_id)));
        }

        let mut seen = HashSet::new();
        let mut groups: Vec<(RequestKind, Vec<RequestLine>)> = Vec::new();
        for item_id in item_ids {
            if !seen.insert(item_id.as_str()) {
                continue;
            }
            let item = OrderRepository::require_item_in(&mut tx, item_id).await?;
            if item.order_id != order_id {
                return Err(ValidationError::InvalidFormat {
                    field: "item_ids".to_string(),
                    reason: format!("item {} is not on order {}", item_id, order_id),
                }
                .into());
            }
            // Terminal items have nowhere to go.
            item.status.resolution_target()?;

            let kind = RequestKind::for_item_status(item.status);
            let line = RequestLine {
                order_item_id: item.id,
                item_name: item.name,
                quantity: item.quantity,
            };
            match groups.iter_mut().find(|(k, _)| *k == kind) {
                Some((_, lines)) => lines.push(line),
                None => groups.push((kind, vec![line])),
            }
        }

        let unique: Vec<String> = seen.iter().map(|id| id.to_string()).collect();
        let taken = CancellationRepository::items_in_pending_request_in(&mut tx, &unique).await?;
        if !taken.is_empty() {
            return Err(EngineError::conflict(format!(
                "Already awaiting a decision: {}",
                taken.join(", ")
            )));
        }

        let mut created = Vec::with_capacity(groups.len());
        for (kind, lines) in groups {
            let lines = merge_items(std::iter::empty(), lines);
            let detail = CancellationRepository::create_in(
                &mut tx,
                NewRequest {
                    order_id,
                    table_id: &order.table_id,
                    kind,
                    source: RequestSource::Staff,
                    reason: reason.trim(),
                    requested_by: Some(requested_by),
                },
                &lines,
                now,
            )
            .await?;
            created.push(detail);
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        for detail in &created {
            info!(
                request_id = %detail.request.id,
                order_id,
                kind = ?detail.request.kind,
                items = detail.items.len(),
                requested_by,
                "Cancellation requested"
            );
            self.hub.publish(EventPayload::CancellationRequested {
                created: true,
                request: detail.clone(),
            });
        }
        Ok(created)
    }

    /// Applies decisions to request lines in one transaction.
    pub async fn decide(
        &self,
        request_id: &str,
        decisions: &[LineDecision],
        resolver: &str,
    ) -> EngineResult<DecisionOutcome> {
        if decisions.is_empty() {
            return Err(ValidationError::Required {
                field: "decisions".to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let request = CancellationRepository::get_in(&mut tx, request_id)
            .await?
            .ok_or_else(|| EngineError::not_found("CancellationRequest", request_id))?;
        ensure_open(&request)?;

        let mut lines = CancellationRepository::items_for_request_in(&mut tx, request_id).await?;
        let mut changed: Vec<(OrderItemStatus, OrderItem)> = Vec::new();
        let mut notifications = Vec::new();

        for d in decisions {
            let line = lines
                .iter_mut()
                .find(|line| line.id == d.request_item_id)
                .ok_or_else(|| EngineError::not_found("CancellationRequestItem", &d.request_item_id))?;
            let decision = apply_decision(&line.id, line.decision, d.decision)?;

            if !CancellationRepository::set_item_decision_in(&mut tx, &line.id, decision, now)
                .await?
            {
                return Err(EngineError::conflict(format!(
                    "Request item {} changed while deciding",
                    line.id
                )));
            }
            line.decision = decision;

            if decision != ItemDecision::Approved {
                continue;
            }

            let item = OrderRepository::require_item_in(&mut tx, &line.order_item_id).await?;
            let from = item.status;
            let target = from.resolution_target()?;
            if !OrderRepository::update_item_status_in(&mut tx, &item.id, from, target, now)
                .await?
            {
                return Err(EngineError::conflict(format!(
                    "Item {} changed while deciding",
                    item.id
                )));
            }
            let updated = OrderRepository::require_item_in(&mut tx, &item.id).await?;

            if from.has_left_kitchen() {
                let notification = NotificationRepository::create_in(
                    &mut tx,
                    &request.table_id,
                    &updated,
                    &request.reason,
                    now,
                )
                .await?;
                notifications.push(notification);
            }
            changed.push((from, updated));
        }

        let status = resolve_status(&lines.iter().map(|l| l.decision).collect::<Vec<_>>());
        if status != RequestStatus::Pending {
            CancellationRepository::set_status_in(&mut tx, request_id, status, Some(resolver), now)
                .await?;
        }
        OrderRepository::recompute_total_in(&mut tx, &request.order_id, now).await?;

        let detail = CancellationRepository::get_detail_in(&mut tx, request_id)
            .await?
            .ok_or_else(|| EngineError::not_found("CancellationRequest", request_id))?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            request_id,
            status = status.as_str(),
            changed = changed.len(),
            resolver,
            "Cancellation decided"
        );

        let mut items = Vec::with_capacity(changed.len());
        for (previous, item) in changed {
            self.hub.publish(EventPayload::ItemStatusChanged {
                table_id: request.table_id.clone(),
                previous: Some(previous),
                item: item.clone(),
            });
            items.push(item);
        }
        for notification in &notifications {
            self.hub.publish(EventPayload::ReturnNotificationCreated {
                notification: notification.clone(),
            });
        }
        if status != RequestStatus::Pending {
            self.hub.publish(EventPayload::CancellationResolved {
                request: detail.clone(),
            });
        }

        Ok(DecisionOutcome {
            request: detail,
            items,
            notifications,
        })
    }

    /// Approves every line still pending.
    pub async fn approve_all(&self, request_id: &str, resolver: &str) -> EngineResult<DecisionOutcome> {
        self.decide_remaining(request_id, ItemDecision::Approved, resolver)
            .await
    }

    /// Rejects every line still pending.
    pub async fn reject_all(&self, request_id: &str, resolver: &str) -> EngineResult<DecisionOutcome> {
        self.decide_remaining(request_id, ItemDecision::Rejected, resolver)
            .await
    }

    async fn decide_remaining(
        &self,
        request_id: &str,
        decision: ItemDecision,
        resolver: &str,
    ) -> EngineResult<DecisionOutcome> {
        let detail = self.get(request_id).await?;
        ensure_open(&detail.request)?;

        let decisions: Vec<LineDecision> = detail
            .items
            .iter()
            .filter(|line| line.decision == ItemDecision::Pending)
            .map(|line| LineDecision {
                request_item_id: line.id.clone(),
                decision,
            })
            .collect();
        self.decide(request_id, &decisions, resolver).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support as ts;
    use quan_core::CoreError;

    fn service(db: &Database, hub: &NotificationHub) -> CancellationService {
        CancellationService::new(db.clone(), hub.clone())
    }

    #[tokio::test]
    async fn test_request_splits_cancel_and_return() {
        let (db, hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let order = ts::open_order(&db, &table).await;
        let waiting = ts::item(&db, &order, &pho, OrderItemStatus::Waiting).await;
        let served = ts::item(&db, &order, &pho, OrderItemStatus::Served).await;

        let created = service(&db, &hub)
            .request(
                &order.id,
                &[waiting.id.clone(), served.id.clone(), waiting.id.clone()],
                "Khách đổi ý",
                "waiter-1",
            )
            .await
            .unwrap();

        assert_eq!(created.len(), 2);
        let cancel = created.iter().find(|d| d.request.kind == RequestKind::Cancel).unwrap();
        let ret = created.iter().find(|d| d.request.kind == RequestKind::Return).unwrap();
        assert_eq!(cancel.items.len(), 1);
        assert_eq!(cancel.items[0].order_item_id, waiting.id);
        assert_eq!(ret.items[0].order_item_id, served.id);
        assert_eq!(cancel.request.source, RequestSource::Staff);
        assert_eq!(cancel.request.requested_by.as_deref(), Some("waiter-1"));
    }

    #[tokio::test]
    async fn test_item_cannot_be_on_two_pending_requests() {
        let (db, hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let order = ts::open_order(&db, &table).await;
        let item = ts::item(&db, &order, &pho, OrderItemStatus::Waiting).await;
        let svc = service(&db, &hub);

        svc.request(&order.id, &[item.id.clone()], "Lâu quá", "waiter-1")
            .await
            .unwrap();
        let err = svc
            .request(&order.id, &[item.id.clone()], "Lâu quá", "waiter-2")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_request_validation() {
        let (db, hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let other_table = ts::table(&db, "B2").await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let order = ts::open_order(&db, &table).await;
        let other = ts::open_order(&db, &other_table).await;
        let foreign = ts::item(&db, &other, &pho, OrderItemStatus::Waiting).await;
        let cancelled = ts::item(&db, &order, &pho, OrderItemStatus::Cancelled).await;
        let svc = service(&db, &hub);

        let err = svc.request(&order.id, &[foreign.id.clone()], "x", "w").await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));

        let err = svc.request(&order.id, &[cancelled.id.clone()], "x", "w").await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::InvalidTransition { .. })));

        let err = svc.request(&order.id, &[], "x", "w").await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));

        let err = svc.request(&order.id, &[foreign.id.clone()], "  ", "w").await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_partial_approval_updates_items_and_total() {
        let (db, hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let tea = ts::menu_item(&db, "Trà đá", 5_000).await;
        let order = ts::open_order(&db, &table).await;
        let a = ts::item(&db, &order, &pho, OrderItemStatus::Waiting).await;
        let b = ts::item(&db, &order, &tea, OrderItemStatus::Ready).await;
        let svc = service(&db, &hub);

        let created = svc
            .request(&order.id, &[a.id.clone(), b.id.clone()], "Khách về sớm", "waiter-1")
            .await
            .unwrap();
        let detail = &created[0];
        let line_a = detail.items.iter().find(|l| l.order_item_id == a.id).unwrap();
        let line_b = detail.items.iter().find(|l| l.order_item_id == b.id).unwrap();

        // First decision leaves the request pending.
        let first = svc
            .decide(
                &detail.request.id,
                &[LineDecision {
                    request_item_id: line_b.id.clone(),
                    decision: ItemDecision::Approved,
                }],
                "kitchen-1",
            )
            .await
            .unwrap();
        assert_eq!(first.request.request.status, RequestStatus::Pending);
        assert_eq!(first.items[0].status, OrderItemStatus::Cancelled);
        // The tea had left the kitchen, so the waiter is told.
        assert_eq!(first.notifications.len(), 1);

        let outcome = svc
            .decide(
                &detail.request.id,
                &[LineDecision {
                    request_item_id: line_a.id.clone(),
                    decision: ItemDecision::Rejected,
                }],
                "kitchen-1",
            )
            .await
            .unwrap();
        assert_eq!(outcome.request.request.status, RequestStatus::PartiallyApproved);
        assert_eq!(outcome.request.request.resolved_by.as_deref(), Some("kitchen-1"));
        assert!(outcome.items.is_empty());

        let order = db.orders().get(&order.id).await.unwrap().unwrap();
        assert_eq!(order.total_amount, 65_000);

        // Closed requests cannot be touched.
        let err = svc.approve_all(&detail.request.id, "kitchen-1").await.unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::RequestClosed { .. })));
    }

    #[tokio::test]
    async fn test_approve_all_returns_served_item() {
        let (db, hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let order = ts::open_order(&db, &table).await;
        let served = ts::item(&db, &order, &pho, OrderItemStatus::Served).await;
        let svc = service(&db, &hub);

        let created = svc
            .request(&order.id, &[served.id.clone()], "Món bị nguội", "waiter-1")
            .await
            .unwrap();
        let outcome = svc.approve_all(&created[0].request.id, "kitchen-1").await.unwrap();

        assert_eq!(outcome.request.request.status, RequestStatus::Approved);
        assert_eq!(outcome.items[0].status, OrderItemStatus::Returned);
        assert_eq!(outcome.notifications[0].reason, "Món bị nguội");

        let order = db.orders().get(&order.id).await.unwrap().unwrap();
        assert_eq!(order.total_amount, 0);
    }

    #[tokio::test]
    async fn test_reject_all_leaves_items() {
        let (db, hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let order = ts::open_order(&db, &table).await;
        let item = ts::item(&db, &order, &pho, OrderItemStatus::InProgress).await;
        let svc = service(&db, &hub);

        let created = svc
            .request(&order.id, &[item.id.clone()], "Nhầm món", "waiter-1")
            .await
            .unwrap();
        let outcome = svc.reject_all(&created[0].request.id, "kitchen-1").await.unwrap();
        assert_eq!(outcome.request.request.status, RequestStatus::Rejected);
        assert!(outcome.notifications.is_empty());

        let item = db.orders().get_item(&item.id).await.unwrap().unwrap();
        assert_eq!(item.status, OrderItemStatus::InProgress);

        // Once rejected the item may be requested again.
        svc.request(&order.id, &[item.id.clone()], "Nhầm món", "waiter-1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deciding_twice_fails() {
        let (db, hub) = ts::setup().await;
        let table = ts::table(&db, "B1").await;
        let pho = ts::menu_item(&db, "Phở bò", 65_000).await;
        let order = ts::open_order(&db, &table).await;
        let a = ts::item(&db, &order, &pho, OrderItemStatus::Waiting).await;
        let b = ts::item(&db, &order, &pho, OrderItemStatus::Waiting).await;
        let svc = service(&db, &hub);

        let created = svc
            .request(&order.id, &[a.id.clone(), b.id.clone()], "x", "w")
            .await
            .unwrap();
        let line = created[0].items[0].id.clone();
        let twice = [
            LineDecision {
                request_item_id: line.clone(),
                decision: ItemDecision::Approved,
            },
            LineDecision {
                request_item_id: line,
                decision: ItemDecision::Rejected,
            },
        ];
        let err = svc
            .decide(&created[0].request.id, &twice, "kitchen-1")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::AlreadyDecided { .. })));

        // Nothing was applied.
        let item = db.orders().get_item(&a.id).await.unwrap().unwrap();
        assert_eq!(item.status, OrderItemStatus::Waiting);
    }
}
