//! # Repository Module
//!
//! Database repository implementations for Quan POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Workflow / handler                                                     │
//! │       │                                                                 │
//! │       ├── db.orders().get(id)            pool-backed, one statement     │
//! │       │                                                                 │
//! │       └── let mut tx = db.begin()                                       │
//! │           OrderRepository::add_item_in(&mut tx, ..)                     │
//! │           OrderRepository::recompute_total_in(&mut tx, ..)              │
//! │           tx.commit()                    several statements, atomic     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Functions suffixed `_in` take a `&mut SqliteConnection` so they can run
//! inside a caller's transaction; the `&self` methods are thin wrappers that
//! borrow a pooled connection.
//!
//! ## Available Repositories
//!
//! - [`tables::TableRepository`] - Dining tables and occupancy
//! - [`menu::MenuRepository`] - Menu items, ingredients, recipes, purchase orders
//! - [`orders::OrderRepository`] - Orders, order items, kitchen queue, stale scan
//! - [`cancellations::CancellationRepository`] - Cancellation / return requests
//! - [`notifications::NotificationRepository`] - Return notifications for waiters
//! - [`offline_queue::OfflineQueueRepository`] - FIFO of offline actions
//! - [`staff::StaffRepository`] - Staff accounts
//! - [`reports::ReportRepository`] - Cashier aggregates

pub mod cancellations;
pub mod menu;
pub mod notifications;
pub mod offline_queue;
pub mod orders;
pub mod reports;
pub mod staff;
pub mod tables;

/// Builds `?, ?, ?` for an `IN (...)` list of `n` bound values.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
