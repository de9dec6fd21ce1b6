//! # Engine Error Types
//!
//! Error types for workflows and background services.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Business     │  │     Access              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Core(..)       │  │  Unauthorized           │ │
//! │  │  ConfigLoad     │  │  NotFound       │  │  Forbidden              │ │
//! │  │  ConfigSave     │  │  Conflict       │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Database     │  │  Offline sink   │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Database(..)   │  │  SinkUnavailable│  │  Serialization          │ │
//! │  │  (busy = retry) │  │  (retry)        │  │  ChannelError, Internal │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use quan_core::{CoreError, ValidationError};
use quan_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type covering workflow and background-service failures.
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Business Errors
    // =========================================================================
    /// A domain rule was violated (bad transition, validation, signature).
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The request is valid but clashes with current state.
    ///
    /// ## When This Occurs
    /// - Seating a table that is occupied
    /// - Requesting cancellation of an item already on a pending request
    /// - Closing an unpaid order
    #[error("Conflict: {0}")]
    Conflict(String),

    // =========================================================================
    // Access Errors
    // =========================================================================
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    #[error("Database error: {0}")]
    Database(DbError),

    /// The offline sink could not reach its destination.
    #[error("Sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        EngineError::Conflict(message.into())
    }

    /// Returns true if the same operation may succeed when tried again.
    ///
    /// ## Retryable Errors
    /// - Database busy / pool exhausted
    /// - Offline sink unreachable
    /// - Channel hiccups
    ///
    /// ## Non-Retryable Errors
    /// - Validation, transitions, conflicts: the input has to change
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Database(e) => e.is_transient(),
            EngineError::SinkUnavailable(_) | EngineError::ChannelError(_) => true,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfig(_)
                | EngineError::ConfigLoadFailed(_)
                | EngineError::ConfigSaveFailed(_)
        )
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            DbError::UniqueViolation { field, value } => {
                EngineError::Conflict(format!("{} '{}' already exists", field, value))
            }
            other => EngineError::Database(other),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quan_core::OrderItemStatus;

    #[test]
    fn test_retryable_errors() {
        assert!(EngineError::Database(DbError::Busy("database is locked".into())).is_retryable());
        assert!(EngineError::SinkUnavailable("offline".into()).is_retryable());

        assert!(!EngineError::Database(DbError::Internal("x".into())).is_retryable());
        assert!(!EngineError::conflict("occupied").is_retryable());
        assert!(!EngineError::Core(CoreError::InvalidTransition {
            from: OrderItemStatus::Served,
            to: OrderItemStatus::Waiting,
        })
        .is_retryable());
    }

    #[test]
    fn test_db_not_found_maps_to_not_found() {
        let err: EngineError = DbError::not_found("Order", "o-1").into();
        assert!(matches!(err, EngineError::NotFound { ref entity, .. } if entity == "Order"));
        assert_eq!(err.to_string(), "Order not found: o-1");
    }

    #[test]
    fn test_validation_flows_through_core() {
        let err: EngineError = ValidationError::Required {
            field: "reason".into(),
        }
        .into();
        assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));
    }
}
