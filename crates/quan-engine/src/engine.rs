//! # Engine
//!
//! Wires the services around one database and one hub, and owns the
//! background tasks.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Engine                                     │
//! │                                                                         │
//! │  Database ─┬─ OrderService ───────┐                                     │
//! │            ├─ CancellationService ├──► NotificationHub ──► subscribers   │
//! │            ├─ StockService ───────┤          ▲                          │
//! │            ├─ PaymentService ─────┘          │                          │
//! │            ├─ ReportService                  │                          │
//! │            ├─ AuthService                    │                          │
//! │            ├─ OfflineQueue ── LocalSink      │                          │
//! │            └─ Escalator ◄── EscalationWorker (poll) ── heartbeat task   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use quan_db::{Database, DbConfig};

use crate::auth::AuthService;
use crate::config::AppConfig;
use crate::error::{EngineError, EngineResult};
use crate::escalation::{EscalationHandle, EscalationWorker, Escalator};
use crate::hub::{HeartbeatHandle, NotificationHub};
use crate::offline::{LocalSink, OfflineQueue};
use crate::workflows::{
    CancellationService, OrderService, PaymentService, ReportService, StockService,
};

/// Every service of the back end, sharing one database and hub.
#[derive(Clone)]
pub struct Engine {
    db: Database,
    hub: NotificationHub,
    pub orders: OrderService,
    pub cancellations: CancellationService,
    pub stock: StockService,
    pub payments: PaymentService,
    pub reports: ReportService,
    pub auth: AuthService,
    pub offline: OfflineQueue,
    pub escalator: Escalator,
}

impl Engine {
    /// Opens the configured database (running migrations) and builds the
    /// services.
    pub async fn open(config: &AppConfig) -> EngineResult<Self> {
        let path = config.database.resolved_path();
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                EngineError::Internal(format!("Cannot create {}: {}", dir.display(), e))
            })?;
        }
        info!(path = %path.display(), "Opening database");

        let db = Database::new(
            DbConfig::new(path).max_connections(config.database.max_connections),
        )
        .await?;
        Ok(Self::new(db, config))
    }

    pub fn new(db: Database, config: &AppConfig) -> Self {
        let hub = NotificationHub::new(config.realtime.channel_capacity);

        Engine {
            orders: OrderService::new(db.clone(), hub.clone()),
            cancellations: CancellationService::new(db.clone(), hub.clone()),
            stock: StockService::new(db.clone(), hub.clone()),
            payments: PaymentService::new(db.clone(), hub.clone(), config.payments.clone()),
            reports: ReportService::new(db.clone(), &config.reports),
            auth: AuthService::new(db.clone(), &config.auth),
            offline: OfflineQueue::new(db.offline_queue(), config.offline.batch_size),
            escalator: Escalator::new(db.clone(), hub.clone(), &config.escalation),
            db,
            hub,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    /// Sink that replays offline actions against this engine.
    pub fn local_sink(&self) -> LocalSink {
        LocalSink::new(
            self.orders.clone(),
            self.cancellations.clone(),
            self.stock.clone(),
        )
    }

    /// Starts the escalation worker (if enabled) and the realtime heartbeat.
    pub fn spawn_background(&self, config: &AppConfig) -> BackgroundTasks {
        let escalation = if config.escalation.enabled {
            let (worker, handle) = EscalationWorker::new(
                self.escalator.clone(),
                Duration::from_secs(config.escalation.poll_interval_secs),
            );
            Some((handle, tokio::spawn(worker.run())))
        } else {
            info!("Escalation worker disabled");
            None
        };

        let heartbeat = self
            .hub
            .spawn_heartbeat(Duration::from_secs(config.realtime.heartbeat_interval_secs));

        BackgroundTasks {
            escalation,
            heartbeat,
        }
    }
}

/// Running background tasks.
pub struct BackgroundTasks {
    escalation: Option<(EscalationHandle, JoinHandle<()>)>,
    heartbeat: HeartbeatHandle,
}

impl BackgroundTasks {
    /// Signals every task and waits for the worker to finish its pass.
    pub async fn shutdown(self) {
        if let Err(e) = self.heartbeat.shutdown().await {
            warn!(error = %e, "Heartbeat already stopped");
        }

        if let Some((handle, task)) = self.escalation {
            if let Err(e) = handle.shutdown().await {
                warn!(error = %e, "Escalation worker already stopped");
            }
            if let Err(e) = task.await {
                warn!(error = %e, "Escalation worker panicked");
            }
        }
        info!("Background tasks stopped");
    }
}
