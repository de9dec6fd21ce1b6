//! # quan-db: Database Layer for Quan POS
//!
//! SQLite persistence for the restaurant back end, using sqlx for async
//! access.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Quan POS Data Flow                               │
//! │                                                                         │
//! │  HTTP handler / escalation worker / offline flush                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  quan-engine workflow                                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     quan-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ TableRepo      │   │              │  │   │
//! │  │   │ SqlitePool    │◄───│ OrderRepo      │   │ 001_init.sql │  │   │
//! │  │   │ begin() → tx  │    │ CancellationRe │   │              │  │   │
//! │  │   │               │    │ ...            │   │              │  │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quan_db::{Database, DbConfig, OrderRepository};
//!
//! let db = Database::new(DbConfig::new("path/to/quan.db")).await?;
//!
//! // Single statement
//! let tables = db.tables().list().await?;
//!
//! // Several statements, atomically
//! let mut tx = db.begin().await?;
//! OrderRepository::add_item_in(&mut tx, &item).await?;
//! OrderRepository::recompute_total_in(&mut tx, &item.order_id, now).await?;
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::cancellations::{CancellationRepository, NewRequest};
pub use repository::menu::MenuRepository;
pub use repository::notifications::NotificationRepository;
pub use repository::offline_queue::OfflineQueueRepository;
pub use repository::orders::OrderRepository;
pub use repository::reports::ReportRepository;
pub use repository::staff::StaffRepository;
pub use repository::tables::TableRepository;

/// Re-exported so callers can name transactions and connections without a
/// direct sqlx dependency.
pub use sqlx::{SqliteConnection, Transaction};
