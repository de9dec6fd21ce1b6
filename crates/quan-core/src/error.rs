//! # Error Types
//!
//! Domain-specific error types for quan-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  quan-core     CoreError, ValidationError     (this file)              │
//! │  quan-db       DbError                                                  │
//! │  quan-engine   EngineError                                              │
//! │  apps/server   ApiError  ──► { "code": "...", "message": "..." }        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → ApiError → client   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::lifecycle::OrderItemStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An order item was asked to move along an edge the state machine
    /// does not have.
    ///
    /// ## When This Occurs
    /// - Kitchen marks a `waiting` item as `served`
    /// - Anyone touches a `cancelled` or `returned` item
    #[error("Cannot move order item from {from} to {to}")]
    InvalidTransition {
        from: OrderItemStatus,
        to: OrderItemStatus,
    },

    /// Decision applied to a request item that was already decided.
    #[error("Request item {item_id} was already {decision}")]
    AlreadyDecided { item_id: String, decision: String },

    /// The cancellation request is no longer pending.
    #[error("Cancellation request {request_id} is {status}, cannot modify")]
    RequestClosed { request_id: String, status: String },

    /// A payment notification did not carry a valid signature.
    #[error("Invalid {provider} signature")]
    InvalidSignature { provider: String },

    /// A payment notification body could not be parsed.
    #[error("Malformed {provider} payload: {reason}")]
    MalformedPayload { provider: String, reason: String },

    /// Amount paid does not cover the order.
    #[error("Payment of {paid} does not cover order total {total}")]
    Underpaid { paid: i64, total: i64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Shorthand for an invalid signature error.
    pub fn invalid_signature(provider: impl Into<String>) -> Self {
        CoreError::InvalidSignature {
            provider: provider.into(),
        }
    }

    /// Shorthand for a malformed payload error.
    pub fn malformed(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::MalformedPayload {
            provider: provider.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_message_uses_wire_names() {
        let err = CoreError::InvalidTransition {
            from: OrderItemStatus::Waiting,
            to: OrderItemStatus::Served,
        };
        assert_eq!(err.to_string(), "Cannot move order item from waiting to served");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "reason".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.to_string(), "Validation error: reason is required");
    }
}
