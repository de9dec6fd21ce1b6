//! # Escalation Worker
//!
//! Turns items that sat too long in the kitchen into cancellation requests.
//!
//! ## Escalation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Escalation Worker Flow                             │
//! │                                                                         │
//! │  every poll_interval (30 s):                                            │
//! │                                                                         │
//! │  1. Scan: order_items in stale statuses (waiting, in_progress)          │
//! │           created_at <= now - threshold (5 min)                         │
//! │           not already on a pending request                              │
//! │                                                                         │
//! │  2. Group by order                                                      │
//! │                                                                         │
//! │  3. Per order, one transaction:                                         │
//! │       ┌──────────────────────────────────────────────┐                  │
//! │       │ pending auto_timeout request of that kind?   │                  │
//! │       │    yes → merge items (duplicates skipped)    │                  │
//! │       │    no  → create request with the items       │                  │
//! │       └──────────────────────────────────────────────┘                  │
//! │                                                                         │
//! │  4. Publish CancellationRequested for each request created or grown     │
//! │                                                                         │
//! │  FAILURES:                                                              │
//! │  • One order failing is logged; the others still escalate               │
//! │  • A failed scan is logged; the next tick tries again                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use quan_core::cancellation::{merge_items, RequestLine};
use quan_core::lifecycle::stale_cutoff;
use quan_core::{
    CancellationRequestDetail, OrderItem, OrderItemStatus, OrderStatus, RequestKind,
    RequestSource,
};
use quan_db::{CancellationRepository, Database, DbError, NewRequest, OrderRepository};

use crate::config::EscalationSettings;
use crate::error::{EngineError, EngineResult};
use crate::hub::{EventPayload, NotificationHub};

// =============================================================================
// Report
// =============================================================================

/// What one escalation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EscalationReport {
    /// Stale items found by the scan.
    pub scanned: usize,
    pub requests_created: usize,
    /// Items attached to a request, new or existing.
    pub items_merged: usize,
    /// Orders whose escalation failed and will be retried next tick.
    pub orders_failed: usize,
}

/// Result of escalating one order.
struct OrderEscalation {
    request: CancellationRequestDetail,
    created: bool,
    added: usize,
}

// =============================================================================
// Escalator
// =============================================================================

/// One escalation pass, independent of any timer.
#[derive(Clone)]
pub struct Escalator {
    db: Database,
    hub: NotificationHub,
    threshold: chrono::Duration,
    stale_statuses: Vec<OrderItemStatus>,
}

impl Escalator {
    pub fn new(db: Database, hub: NotificationHub, settings: &EscalationSettings) -> Self {
        Escalator {
            db,
            hub,
            threshold: chrono::Duration::seconds(settings.stale_threshold_secs as i64),
            stale_statuses: settings.stale_statuses.clone(),
        }
    }

    /// Escalates every item that is stale at `now`.
    pub async fn escalate_stale_items(&self, now: DateTime<Utc>) -> EngineResult<EscalationReport> {
        let cutoff = stale_cutoff(now, self.threshold);
        let stale = self
            .db
            .orders()
            .stale_items(cutoff, &self.stale_statuses)
            .await?;

        let mut report = EscalationReport {
            scanned: stale.len(),
            ..Default::default()
        };
        if stale.is_empty() {
            debug!("No stale items");
            return Ok(report);
        }

        // Keep scan order (oldest first) within and across orders.
        let mut order_ids: Vec<String> = Vec::new();
        let mut by_order: HashMap<String, Vec<OrderItem>> = HashMap::new();
        for item in stale {
            if !by_order.contains_key(&item.order_id) {
                order_ids.push(item.order_id.clone());
            }
            by_order.entry(item.order_id.clone()).or_default().push(item);
        }

        for order_id in order_ids {
            let items = by_order.remove(&order_id).unwrap_or_default();
            match self.escalate_order(&order_id, items, now).await {
                Ok(escalations) => {
                    for escalation in escalations {
                        if escalation.created {
                            report.requests_created += 1;
                        }
                        report.items_merged += escalation.added;
                        info!(
                            order_id = %order_id,
                            request_id = %escalation.request.request.id,
                            created = escalation.created,
                            added = escalation.added,
                            "Escalated stale items"
                        );
                        self.hub.publish(EventPayload::CancellationRequested {
                            created: escalation.created,
                            request: escalation.request,
                        });
                    }
                }
                Err(e) => {
                    report.orders_failed += 1;
                    if e.is_retryable() {
                        warn!(order_id = %order_id, error = %e, "Escalation deferred to next tick");
                    } else {
                        error!(order_id = %order_id, error = %e, "Escalation failed");
                    }
                }
            }
        }

        Ok(report)
    }

    async fn escalate_order(
        &self,
        order_id: &str,
        items: Vec<OrderItem>,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<OrderEscalation>> {
        let mut tx = self.db.begin().await?;

        let order = OrderRepository::require_in(&mut tx, order_id).await?;
        if order.status != OrderStatus::Open {
            return Ok(Vec::new());
        }

        // Items may have moved on, or been requested, since the scan.
        let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        let taken = CancellationRepository::items_in_pending_request_in(&mut tx, &ids).await?;

        let mut groups: Vec<(RequestKind, Vec<RequestLine>)> = Vec::new();
        for item in items {
            if taken.contains(&item.id) {
                continue;
            }
            let Some(current) = OrderRepository::get_item_in(&mut tx, &item.id).await? else {
                continue;
            };
            if !self.stale_statuses.contains(&current.status) {
                continue;
            }

            let kind = RequestKind::for_item_status(current.status);
            let line = RequestLine {
                order_item_id: current.id,
                item_name: current.name,
                quantity: current.quantity,
            };
            match groups.iter_mut().find(|(k, _)| *k == kind) {
                Some((_, lines)) => lines.push(line),
                None => groups.push((kind, vec![line])),
            }
        }

        let reason = self.reason();
        let mut escalations = Vec::new();
        for (kind, lines) in groups {
            let pending = CancellationRepository::find_pending_in(
                &mut tx,
                order_id,
                kind,
                RequestSource::AutoTimeout,
            )
            .await?;

            let escalation = match pending {
                Some(request) => {
                    let existing =
                        CancellationRepository::items_for_request_in(&mut tx, &request.id).await?;
                    let merged = merge_items(
                        existing.iter().map(|item| item.order_item_id.as_str()),
                        lines,
                    );
                    if merged.is_empty() {
                        continue;
                    }
                    CancellationRepository::add_items_in(&mut tx, &request.id, &merged, now)
                        .await?;
                    let detail = CancellationRepository::get_detail_in(&mut tx, &request.id)
                        .await?
                        .ok_or_else(|| EngineError::not_found("CancellationRequest", &request.id))?;
                    OrderEscalation {
                        request: detail,
                        created: false,
                        added: merged.len(),
                    }
                }
                None => {
                    let lines = merge_items(std::iter::empty(), lines);
                    let detail = CancellationRepository::create_in(
                        &mut tx,
                        NewRequest {
                            order_id,
                            table_id: &order.table_id,
                            kind,
                            source: RequestSource::AutoTimeout,
                            reason: &reason,
                            requested_by: None,
                        },
                        &lines,
                        now,
                    )
                    .await?;
                    OrderEscalation {
                        added: lines.len(),
                        request: detail,
                        created: true,
                    }
                }
            };
            escalations.push(escalation);
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(escalations)
    }

    fn reason(&self) -> String {
        format!(
            "Not served within {} minutes",
            (self.threshold.num_seconds() + 59) / 60
        )
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Runs an [`Escalator`] on a timer until shut down.
pub struct EscalationWorker {
    escalator: Escalator,
    poll_interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the escalation worker.
#[derive(Clone)]
pub struct EscalationHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl EscalationHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| EngineError::ChannelError("Shutdown channel closed".into()))
    }
}

impl EscalationWorker {
    /// Creates a worker and returns its handle.
    pub fn new(escalator: Escalator, poll_interval: Duration) -> (Self, EscalationHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let worker = EscalationWorker {
            escalator,
            poll_interval,
            shutdown_rx,
        };
        (worker, EscalationHandle { shutdown_tx })
    }

    /// Runs the loop. Spawn it as a background task.
    pub async fn run(mut self) {
        info!(
            poll_secs = self.poll_interval.as_secs(),
            "Escalation worker starting"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.escalator.escalate_stale_items(Utc::now()).await {
                        Ok(report) if report.scanned > 0 => {
                            info!(
                                scanned = report.scanned,
                                created = report.requests_created,
                                merged = report.items_merged,
                                failed = report.orders_failed,
                                "Escalation pass complete"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Escalation pass failed"),
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Escalation worker shutting down");
                    break;
                }
            }
        }

        info!("Escalation worker stopped");
    }
}
