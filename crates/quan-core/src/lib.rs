//! # quan-core: Pure Business Logic for Quan POS
//!
//! The rules every other crate relies on, as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Quan POS Architecture                            │
//! │                                                                         │
//! │   Mobile client (tables, kitchen display, cashier)                      │
//! │          │ HTTP / WebSocket                                             │
//! │          ▼                                                              │
//! │   apps/server ──► quan-engine (workflows, hub, escalation, offline)     │
//! │                         │                                               │
//! │                         ▼                                               │
//! │   ┌─────────────────────────────────────────────────────────────────┐  │
//! │   │               ★ quan-core (THIS CRATE) ★                        │  │
//! │   │                                                                 │  │
//! │   │  types   lifecycle   cancellation   money   payment   vietqr   │  │
//! │   │                                                                 │  │
//! │   │  NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS             │  │
//! │   └─────────────────────────────────────────────────────────────────┘  │
//! │                         ▲                                               │
//! │   quan-db (SQLite repositories) ─┘                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain entities (tables, orders, order items, requests, ...)
//! - [`lifecycle`] - Order-item state machine with enforced transitions
//! - [`cancellation`] - Cancellation/return reconciliation rules
//! - [`money`] - Integer VND amounts
//! - [`validation`] - Input rules
//! - [`payment`] - MoMo / ZaloPay / VietQR webhook payloads and signatures
//! - [`vietqr`] - EMVCo merchant-presented QR payload builder
//!
//! ## Example
//!
//! ```rust
//! use quan_core::lifecycle::OrderItemStatus;
//!
//! let next = OrderItemStatus::Waiting
//!     .transition(OrderItemStatus::InProgress)
//!     .unwrap();
//! assert_eq!(next, OrderItemStatus::InProgress);
//!
//! // The kitchen cannot serve something it never cooked.
//! assert!(OrderItemStatus::Waiting
//!     .transition(OrderItemStatus::Served)
//!     .is_err());
//! ```

pub mod cancellation;
pub mod error;
pub mod lifecycle;
pub mod money;
pub mod payment;
pub mod types;
pub mod validation;
pub mod vietqr;

pub use error::{CoreError, CoreResult, ValidationError};
pub use lifecycle::OrderItemStatus;
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Age after which a waiting / in-progress item is escalated to a
/// cancellation request.
pub const DEFAULT_STALE_THRESHOLD_SECS: u64 = 5 * 60;

/// How often the escalation worker scans for stale items.
pub const DEFAULT_ESCALATION_POLL_SECS: u64 = 30;

/// Maximum quantity of a single order line.
pub const MAX_ITEM_QUANTITY: i64 = 99;
