//! # Offline Action Queue
//!
//! Actions taken while the back end is unreachable are queued on the
//! device and replayed in order once it is back. Each staff member owns a
//! separate queue, and actions are applied under that owner's identity.
//!
//! ## Flush Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  offline_actions WHERE owner = ? (FIFO by seq)                          │
//! │  seq | kind                      | payload | attempts | last_error      │
//! │  ────┼───────────────────────────┼─────────┼──────────┼──────────────── │
//! │  1   │ add_item                  │ {...}   │ 0        │ NULL            │
//! │  2   │ update_item_status        │ {...}   │ 0        │ NULL            │
//! │  3   │ acknowledge_notification  │ {...}   │ 0        │ NULL            │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │  flush lock held; for each action, oldest first:                        │
//! │     sink.apply(owner, action) ── Ok ──► delete, next                    │
//! │             │                                                           │
//! │             └──── Err ──► attempts += 1, last_error = e, STOP           │
//! │                                                                         │
//! │  Later actions may depend on earlier ones, so a failed action is never  │
//! │  skipped: it stays at the head until it applies or the owner discards   │
//! │  it. Other owners' queues keep flowing.                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use quan_core::{OfflineAction, OrderItemStatus};
use quan_db::OfflineQueueRepository;

use crate::error::EngineResult;
use crate::workflows::{CancellationService, OrderService, StockService};

// =============================================================================
// Actions
// =============================================================================

/// Everything a device can do while offline.
///
/// Payloads carry no staff identity; the queue owner acts. Unknown fields
/// in a payload are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum OfflineActionKind {
    AddItem {
        order_id: String,
        menu_item_id: String,
        quantity: i64,
        #[serde(default)]
        note: Option<String>,
    },
    UpdateItemStatus {
        item_id: String,
        status: OrderItemStatus,
    },
    RequestCancellation {
        order_id: String,
        item_ids: Vec<String>,
        reason: String,
    },
    AcknowledgeNotification {
        notification_id: String,
    },
}

impl OfflineActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            OfflineActionKind::AddItem { .. } => "add_item",
            OfflineActionKind::UpdateItemStatus { .. } => "update_item_status",
            OfflineActionKind::RequestCancellation { .. } => "request_cancellation",
            OfflineActionKind::AcknowledgeNotification { .. } => "acknowledge_notification",
        }
    }

    /// Splits the action into the stored `(kind, payload)` columns.
    fn to_columns(&self) -> EngineResult<(&'static str, String)> {
        let mut value = serde_json::to_value(self)?;
        let payload = value
            .get_mut("payload")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null);
        Ok((self.name(), serde_json::to_string(&payload)?))
    }

    /// Rebuilds the action from a stored row.
    pub fn from_action(action: &OfflineAction) -> EngineResult<Self> {
        let payload: serde_json::Value = serde_json::from_str(&action.payload)?;
        let tagged = serde_json::json!({ "kind": action.kind, "payload": payload });
        Ok(serde_json::from_value(tagged)?)
    }
}

// =============================================================================
// Sink
// =============================================================================

/// Where queued actions are replayed. `owner` is the staff member the
/// action is applied as.
#[async_trait]
pub trait ActionSink: Send + Sync {
    async fn apply(&self, owner: &str, action: &OfflineActionKind) -> EngineResult<()>;
}

/// Replays actions against this back end's own workflows.
#[derive(Clone)]
pub struct LocalSink {
    orders: OrderService,
    cancellations: CancellationService,
    stock: StockService,
}

impl LocalSink {
    pub fn new(orders: OrderService, cancellations: CancellationService, stock: StockService) -> Self {
        LocalSink {
            orders,
            cancellations,
            stock,
        }
    }
}

#[async_trait]
impl ActionSink for LocalSink {
    async fn apply(&self, owner: &str, action: &OfflineActionKind) -> EngineResult<()> {
        match action {
            OfflineActionKind::AddItem {
                order_id,
                menu_item_id,
                quantity,
                note,
            } => {
                self.orders
                    .add_item(order_id, menu_item_id, *quantity, note.as_deref())
                    .await?;
            }
            OfflineActionKind::UpdateItemStatus { item_id, status } => {
                self.orders.update_item_status(item_id, *status, owner).await?;
            }
            OfflineActionKind::RequestCancellation {
                order_id,
                item_ids,
                reason,
            } => {
                self.cancellations
                    .request(order_id, item_ids, reason, owner)
                    .await?;
            }
            OfflineActionKind::AcknowledgeNotification { notification_id } => {
                self.stock
                    .acknowledge_notification(notification_id, owner)
                    .await?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Queue
// =============================================================================

/// The action a flush stopped on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HaltedAction {
    pub action_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlushReport {
    pub applied: usize,
    /// Actions still queued for the owner after the flush.
    pub remaining: i64,
    pub halted_on: Option<HaltedAction>,
}

/// Per-owner FIFO queues over one table. Clones share the flush lock, so
/// only one flush runs at a time and no action is applied twice.
#[derive(Clone)]
pub struct OfflineQueue {
    repo: OfflineQueueRepository,
    batch_size: i64,
    flush_lock: Arc<Mutex<()>>,
}

impl OfflineQueue {
    pub fn new(repo: OfflineQueueRepository, batch_size: i64) -> Self {
        OfflineQueue {
            repo,
            batch_size: batch_size.max(1),
            flush_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Appends `action` to the tail of `owner`'s queue.
    pub async fn enqueue(&self, owner: &str, action: &OfflineActionKind) -> EngineResult<OfflineAction> {
        let (kind, payload) = action.to_columns()?;
        let queued = self.repo.enqueue(owner, kind, &payload, Utc::now()).await?;
        debug!(id = %queued.id, seq = queued.seq, owner, kind, "Action queued");
        Ok(queued)
    }

    /// Replays `owner`'s actions oldest first, stopping at the first failure.
    pub async fn flush(&self, owner: &str, sink: &dyn ActionSink) -> EngineResult<FlushReport> {
        let _serial = self.flush_lock.lock().await;
        let mut report = FlushReport::default();

        'batches: loop {
            let batch = self.repo.peek(owner, self.batch_size).await?;
            if batch.is_empty() {
                break;
            }

            for queued in batch {
                let outcome = match OfflineActionKind::from_action(&queued) {
                    Ok(action) => sink.apply(owner, &action).await,
                    Err(e) => Err(e),
                };

                match outcome {
                    Ok(()) => {
                        self.repo.delete(owner, &queued.id).await?;
                        report.applied += 1;
                    }
                    Err(e) => {
                        warn!(
                            id = %queued.id,
                            seq = queued.seq,
                            owner,
                            kind = %queued.kind,
                            attempts = queued.attempts + 1,
                            error = %e,
                            "Offline action failed; queue halted"
                        );
                        self.repo
                            .record_failure(&queued.id, &e.to_string(), Utc::now())
                            .await?;
                        report.halted_on = Some(HaltedAction {
                            action_id: queued.id,
                            error: e.to_string(),
                        });
                        break 'batches;
                    }
                }
            }
        }

        report.remaining = self.repo.count(owner).await?;
        if report.applied > 0 {
            info!(owner, applied = report.applied, remaining = report.remaining, "Offline queue flushed");
        }
        Ok(report)
    }

    pub async fn pending(&self, owner: &str) -> EngineResult<Vec<OfflineAction>> {
        Ok(self.repo.peek(owner, i64::MAX).await?)
    }

    pub async fn count(&self, owner: &str) -> EngineResult<i64> {
        Ok(self.repo.count(owner).await?)
    }

    /// Drops one of `owner`'s actions, typically a head that can never apply.
    pub async fn discard(&self, owner: &str, action_id: &str) -> EngineResult<()> {
        let _serial = self.flush_lock.lock().await;
        self.repo.delete(owner, action_id).await?;
        warn!(owner, id = %action_id, "Offline action discarded");
        Ok(())
    }

    pub async fn clear(&self, owner: &str) -> EngineResult<u64> {
        let _serial = self.flush_lock.lock().await;
        let removed = self.repo.clear(owner).await?;
        if removed > 0 {
            warn!(owner, removed, "Offline queue cleared");
        }
        Ok(removed)
    }
}
