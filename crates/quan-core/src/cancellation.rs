//! # Cancellation & Return Reconciliation
//!
//! Rules for building and resolving cancellation requests.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  waiter / escalation                 kitchen                            │
//! │        │                                │                               │
//! │        ▼                                ▼                               │
//! │  request(items) ──► pending ──► decide(item → approved | rejected)      │
//! │        ▲               │                │                               │
//! │        │ merge_items   │                ▼                               │
//! │        └───────────────┘        resolve_status(decisions)               │
//! │                                  ├── any pending   → pending            │
//! │                                  ├── all approved  → approved           │
//! │                                  ├── all rejected  → rejected           │
//! │                                  └── otherwise     → partially_approved │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult};
use crate::lifecycle::OrderItemStatus;
use crate::types::{CancellationRequest, ItemDecision, RequestKind, RequestStatus};

impl RequestKind {
    /// Served items come back as returns; anything else is cancelled.
    pub fn for_item_status(status: OrderItemStatus) -> RequestKind {
        match status {
            OrderItemStatus::Served => RequestKind::Return,
            _ => RequestKind::Cancel,
        }
    }
}

/// A line that may be added to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub order_item_id: String,
    pub item_name: String,
    pub quantity: i64,
}

/// Drops candidates already on the request, and duplicates among the
/// candidates themselves.
///
/// `existing` holds the `order_item_id`s already attached to the request.
pub fn merge_items<'a, I>(existing: I, candidates: Vec<RequestLine>) -> Vec<RequestLine>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: std::collections::HashSet<String> =
        existing.into_iter().map(str::to_string).collect();

    candidates
        .into_iter()
        .filter(|line| seen.insert(line.order_item_id.clone()))
        .collect()
}

/// Overall request status derived from its item decisions.
///
/// An empty request stays pending.
pub fn resolve_status(decisions: &[ItemDecision]) -> RequestStatus {
    if decisions.is_empty() || decisions.contains(&ItemDecision::Pending) {
        return RequestStatus::Pending;
    }
    if decisions.iter().all(|d| *d == ItemDecision::Approved) {
        RequestStatus::Approved
    } else if decisions.iter().all(|d| *d == ItemDecision::Rejected) {
        RequestStatus::Rejected
    } else {
        RequestStatus::PartiallyApproved
    }
}

/// Fails unless the request is still open for changes.
pub fn ensure_open(request: &CancellationRequest) -> CoreResult<()> {
    if request.status == RequestStatus::Pending {
        Ok(())
    } else {
        Err(CoreError::RequestClosed {
            request_id: request.id.clone(),
            status: request.status.as_str().to_string(),
        })
    }
}

/// Validates a decision against the item's current decision.
///
/// Only `pending` items can be decided, and only to approved / rejected.
pub fn apply_decision(
    item_id: &str,
    current: ItemDecision,
    decision: ItemDecision,
) -> CoreResult<ItemDecision> {
    if current != ItemDecision::Pending {
        return Err(CoreError::AlreadyDecided {
            item_id: item_id.to_string(),
            decision: current.as_str().to_string(),
        });
    }
    if decision == ItemDecision::Pending {
        return Err(crate::error::ValidationError::InvalidFormat {
            field: "decision".to_string(),
            reason: "must be approved or rejected".to_string(),
        }
        .into());
    }
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequestSource;
    use chrono::Utc;
    use ItemDecision::*;

    fn line(id: &str) -> RequestLine {
        RequestLine {
            order_item_id: id.to_string(),
            item_name: format!("item {}", id),
            quantity: 1,
        }
    }

    fn request(status: RequestStatus) -> CancellationRequest {
        let now = Utc::now();
        CancellationRequest {
            id: "req-1".into(),
            order_id: "order-1".into(),
            table_id: "table-1".into(),
            kind: RequestKind::Cancel,
            source: RequestSource::Staff,
            status,
            reason: "Khách đổi món".into(),
            requested_by: None,
            resolved_by: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    #[test]
    fn test_kind_for_item_status() {
        assert_eq!(
            RequestKind::for_item_status(OrderItemStatus::Served),
            RequestKind::Return
        );
        assert_eq!(
            RequestKind::for_item_status(OrderItemStatus::Waiting),
            RequestKind::Cancel
        );
        assert_eq!(
            RequestKind::for_item_status(OrderItemStatus::Ready),
            RequestKind::Cancel
        );
    }

    #[test]
    fn test_merge_skips_existing_and_duplicates() {
        let merged = merge_items(
            ["a", "b"],
            vec![line("b"), line("c"), line("c"), line("d")],
        );
        let ids: Vec<_> = merged.iter().map(|l| l.order_item_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let first = merge_items(Vec::<&str>::new(), vec![line("a"), line("b")]);
        let again = merge_items(
            first.iter().map(|l| l.order_item_id.as_str()),
            first.clone(),
        );
        assert!(again.is_empty());
    }

    #[test]
    fn test_resolve_status() {
        assert_eq!(resolve_status(&[]), RequestStatus::Pending);
        assert_eq!(resolve_status(&[Approved, Pending]), RequestStatus::Pending);
        assert_eq!(resolve_status(&[Approved, Approved]), RequestStatus::Approved);
        assert_eq!(resolve_status(&[Rejected]), RequestStatus::Rejected);
        assert_eq!(
            resolve_status(&[Approved, Rejected]),
            RequestStatus::PartiallyApproved
        );
    }

    #[test]
    fn test_closed_request_cannot_change() {
        assert!(ensure_open(&request(RequestStatus::Pending)).is_ok());
        let err = ensure_open(&request(RequestStatus::Approved)).unwrap_err();
        assert!(matches!(err, CoreError::RequestClosed { .. }));
    }

    #[test]
    fn test_decision_only_once() {
        assert_eq!(apply_decision("i1", Pending, Approved).unwrap(), Approved);
        let err = apply_decision("i1", Rejected, Approved).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyDecided { .. }));
        assert!(apply_decision("i1", Pending, Pending).is_err());
    }
}
