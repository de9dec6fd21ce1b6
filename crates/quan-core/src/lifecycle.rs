//! # Order-Item Lifecycle
//!
//! The state machine every order line moves through, from the moment a
//! waiter rings it in until it is served, cancelled or returned.
//!
//! ## State Diagram
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   waiting ──────► in_progress ──────► ready ──────► served              │
//! │     │  ▲              │                 │              │                │
//! │     │  │ restock      │                 │              ▼                │
//! │     ▼  │              ▼                 │          returned ■           │
//! │   out_of_stock ◄──────┘                 │                               │
//! │     │                                   │                               │
//! │     ▼                                   ▼                               │
//! │   cancelled ■ ◄──── (waiting, in_progress, ready, out_of_stock)         │
//! │                                                                         │
//! │   ■ = terminal                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every status write in the system goes through [`OrderItemStatus::transition`];
//! repositories additionally guard the UPDATE on the expected current status
//! so two terminals racing on the same item cannot both succeed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::OrderItem;

/// Status of a single order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum OrderItemStatus {
    /// Rung in, not yet picked up by the kitchen.
    Waiting,
    /// Being prepared.
    InProgress,
    /// Plated, waiting for a runner.
    Ready,
    /// On the table.
    Served,
    /// Kitchen cannot make it; waiter has to talk to the guest.
    OutOfStock,
    /// Voided before it reached the guest.
    Cancelled,
    /// Sent back after being served.
    Returned,
}

impl OrderItemStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [OrderItemStatus; 7] = [
        OrderItemStatus::Waiting,
        OrderItemStatus::InProgress,
        OrderItemStatus::Ready,
        OrderItemStatus::Served,
        OrderItemStatus::OutOfStock,
        OrderItemStatus::Cancelled,
        OrderItemStatus::Returned,
    ];

    /// Wire / column name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderItemStatus::Waiting => "waiting",
            OrderItemStatus::InProgress => "in_progress",
            OrderItemStatus::Ready => "ready",
            OrderItemStatus::Served => "served",
            OrderItemStatus::OutOfStock => "out_of_stock",
            OrderItemStatus::Cancelled => "cancelled",
            OrderItemStatus::Returned => "returned",
        }
    }

    /// Returns true if the state machine has an edge `self → to`.
    pub fn can_transition(&self, to: OrderItemStatus) -> bool {
        use OrderItemStatus::*;
        matches!(
            (self, to),
            (Waiting, InProgress)
                | (Waiting, OutOfStock)
                | (Waiting, Cancelled)
                | (InProgress, Ready)
                | (InProgress, OutOfStock)
                | (InProgress, Cancelled)
                | (Ready, Served)
                | (Ready, Cancelled)
                | (Served, Returned)
                | (OutOfStock, Waiting)
                | (OutOfStock, Cancelled)
        )
    }

    /// Validates and performs a transition.
    pub fn transition(self, to: OrderItemStatus) -> CoreResult<OrderItemStatus> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(CoreError::InvalidTransition { from: self, to })
        }
    }

    /// No further transitions are possible.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, OrderItemStatus::Cancelled | OrderItemStatus::Returned)
    }

    /// Counts toward the order total.
    pub const fn is_billable(&self) -> bool {
        !self.is_terminal()
    }

    /// Shown on the kitchen display.
    pub const fn is_kitchen_active(&self) -> bool {
        matches!(self, OrderItemStatus::Waiting | OrderItemStatus::InProgress)
    }

    /// Has left the kitchen pass: the waiter has to physically collect it
    /// when it is voided.
    pub const fn has_left_kitchen(&self) -> bool {
        matches!(self, OrderItemStatus::Ready | OrderItemStatus::Served)
    }

    /// Where an approved cancellation / return moves an item in this status.
    ///
    /// ## Mapping
    /// ```text
    /// served                                   → returned
    /// waiting, in_progress, ready, out_of_stock → cancelled
    /// cancelled, returned                       → error
    /// ```
    pub fn resolution_target(self) -> CoreResult<OrderItemStatus> {
        let target = match self {
            OrderItemStatus::Served => OrderItemStatus::Returned,
            _ => OrderItemStatus::Cancelled,
        };
        self.transition(target)
    }
}

impl fmt::Display for OrderItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderItemStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderItemStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "status".to_string(),
                reason: format!("unknown order item status '{}'", s),
            })
    }
}

// =============================================================================
// Staleness
// =============================================================================

/// Returns true if an item created at `created_at` in `status` should be
/// escalated at `now`.
///
/// An item is stale when its status is one of `stale_statuses` and it is at
/// least `threshold` old.
pub fn is_stale(
    status: OrderItemStatus,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    threshold: Duration,
    stale_statuses: &[OrderItemStatus],
) -> bool {
    stale_statuses.contains(&status) && now - created_at >= threshold
}

/// Cut-off timestamp: items created at or before it are old enough.
pub fn stale_cutoff(now: DateTime<Utc>, threshold: Duration) -> DateTime<Utc> {
    now - threshold
}

// =============================================================================
// Totals
// =============================================================================

/// Sum of `unit_price × quantity` over billable items.
pub fn order_total(items: &[OrderItem]) -> Money {
    items
        .iter()
        .filter(|item| item.status.is_billable())
        .map(|item| item.line_total())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderItemStatus::*;

    fn item(status: OrderItemStatus, price: i64, qty: i64) -> OrderItem {
        let now = Utc::now();
        OrderItem {
            id: uuid::Uuid::new_v4().to_string(),
            order_id: "order-1".to_string(),
            menu_item_id: "menu-1".to_string(),
            name: "Phở bò".to_string(),
            unit_price: price,
            quantity: qty,
            status,
            note: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_happy_path() {
        let s = Waiting.transition(InProgress).unwrap();
        let s = s.transition(Ready).unwrap();
        let s = s.transition(Served).unwrap();
        assert_eq!(s, Served);
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for to in OrderItemStatus::ALL {
            assert!(!Cancelled.can_transition(to), "cancelled -> {}", to);
            assert!(!Returned.can_transition(to), "returned -> {}", to);
        }
    }

    #[test]
    fn test_cannot_skip_kitchen() {
        let err = Waiting.transition(Served).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidTransition {
                from: Waiting,
                to: Served
            }
        ));
        assert!(!Waiting.can_transition(Ready));
    }

    #[test]
    fn test_served_items_are_returned_not_cancelled() {
        assert!(!Served.can_transition(Cancelled));
        assert_eq!(Served.resolution_target().unwrap(), Returned);
    }

    #[test]
    fn test_resolution_targets() {
        assert_eq!(Waiting.resolution_target().unwrap(), Cancelled);
        assert_eq!(InProgress.resolution_target().unwrap(), Cancelled);
        assert_eq!(Ready.resolution_target().unwrap(), Cancelled);
        assert_eq!(OutOfStock.resolution_target().unwrap(), Cancelled);
        assert!(Cancelled.resolution_target().is_err());
        assert!(Returned.resolution_target().is_err());
    }

    #[test]
    fn test_restock_returns_item_to_queue() {
        assert_eq!(OutOfStock.transition(Waiting).unwrap(), Waiting);
    }

    #[test]
    fn test_parse_round_trips_wire_names() {
        for status in OrderItemStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderItemStatus>().unwrap(), status);
        }
        assert!("done".parse::<OrderItemStatus>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn test_staleness_boundary() {
        let now = Utc::now();
        let threshold = Duration::minutes(5);
        let statuses = [Waiting, InProgress];

        assert!(is_stale(Waiting, now - Duration::minutes(5), now, threshold, &statuses));
        assert!(is_stale(InProgress, now - Duration::minutes(9), now, threshold, &statuses));
        assert!(!is_stale(Waiting, now - Duration::seconds(299), now, threshold, &statuses));
        assert!(!is_stale(Ready, now - Duration::hours(1), now, threshold, &statuses));
    }

    #[test]
    fn test_order_total_skips_voided_lines() {
        let items = vec![
            item(Served, 65_000, 2),
            item(Cancelled, 30_000, 1),
            item(Returned, 45_000, 1),
            item(Waiting, 20_000, 3),
        ];
        assert_eq!(order_total(&items).dong(), 190_000);
    }
}
