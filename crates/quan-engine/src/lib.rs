//! # quan-engine: Workflows and Background Services for Quan POS
//!
//! Everything between the HTTP surface and the database.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Engine Architecture                            │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      Engine (facade)                             │  │
//! │  │                                                                  │  │
//! │  │  Built once by the server, cloned into every request handler     │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │   Workflows    │  │NotificationHub │  │  EscalationWorker      │    │
//! │  │                │  │                │  │                        │    │
//! │  │ orders, stock, │─►│ broadcast of   │◄─│ every 30 s: items not  │    │
//! │  │ cancellations, │  │ RealtimeEvent  │  │ served within 5 min    │    │
//! │  │ payments,      │  │ + feedback cue │  │ → auto_timeout request │    │
//! │  │ reports        │  │ per role       │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  AuthService   │  │  OfflineQueue  │  │     AppConfig          │    │
//! │  │                │  │                │  │                        │    │
//! │  │ argon2 + JWT   │  │ FIFO replay,   │  │ defaults < TOML < env  │    │
//! │  │ role checks    │  │ halts on error │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`auth`] - Staff login, access tokens, role checks
//! - [`config`] - Application configuration
//! - [`engine`] - The [`Engine`] facade and background tasks
//! - [`error`] - Engine error types
//! - [`escalation`] - Auto-return worker for stuck items
//! - [`hub`] - Realtime event fan-out
//! - [`offline`] - Offline action queue
//! - [`workflows`] - Order, cancellation, stock, payment and report services
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quan_engine::{AppConfig, Engine};
//!
//! let config = AppConfig::load(None)?;
//! let engine = Engine::open(&config).await?;
//! let tasks = engine.spawn_background(&config);
//!
//! let order = engine.orders.open_table(&table_id, &staff_id, None).await?;
//! engine.orders.add_item(&order.id, &menu_item_id, 2, Some("ít cay")).await?;
//!
//! tasks.shutdown().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod hub;
pub mod offline;
pub mod workflows;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use auth::{extract_bearer_token, AuthService, Claims, JwtManager, TokenPair};
pub use config::AppConfig;
pub use engine::{BackgroundTasks, Engine};
pub use error::{EngineError, EngineResult};
pub use escalation::{EscalationHandle, EscalationReport, EscalationWorker, Escalator};
pub use hub::{
    feedback_for, topics_for_role, EventPayload, FeedbackCue, NotificationHub, RealtimeEvent,
    Subscription, SubscriptionFilter, Topic,
};
pub use offline::{ActionSink, FlushReport, LocalSink, OfflineActionKind, OfflineQueue};
pub use workflows::{
    CancellationService, OrderService, PaymentResolution, PaymentService, ReportService,
    StockService,
};
