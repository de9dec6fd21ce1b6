//! # Realtime WebSocket
//!
//! `GET /realtime?topics=order_items,tables&token=<jwt>`
//!
//! ```text
//! ┌──────────┐  upgrade (token checked first)  ┌──────────────────────────┐
//! │  Device  │ ◄────────────────────────────── │  handle_socket           │
//! │          │                                 │                          │
//! │          │ ◄── {"event": .., "feedback"} ──│  forward task            │
//! │          │                                 │   Subscription (role +   │
//! │          │ ◄── ping every 30 s ────────────│   topics) → feedback_for │
//! │          │ ─── pong / close ─────────────► │  receive loop            │
//! └──────────┘                                 └──────────────────────────┘
//! ```

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use quan_core::Role;
use quan_engine::{
    extract_bearer_token, feedback_for, Claims, FeedbackCue, RealtimeEvent, SubscriptionFilter,
    Topic,
};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum WebSocket message size accepted from clients.
const MAX_MESSAGE_SIZE: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct RealtimeQuery {
    /// Comma-separated topic names; defaults to everything the role sees.
    #[serde(default)]
    pub topics: Option<String>,
    /// Browsers cannot set headers on WebSocket requests.
    #[serde(default)]
    pub token: Option<String>,
}

/// What a subscriber receives for each event.
#[derive(Debug, Serialize)]
pub struct OutboundEvent<'a> {
    pub event: &'a RealtimeEvent,
    pub feedback: FeedbackCue,
}

/// Builds the filter from the query string.
pub fn parse_filter(role: Role, topics: Option<&str>) -> ApiResult<SubscriptionFilter> {
    let filter = SubscriptionFilter::for_role(role);
    let Some(raw) = topics.filter(|raw| !raw.trim().is_empty()) else {
        return Ok(filter);
    };

    let topics = raw
        .split(',')
        .map(str::parse::<Topic>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(filter.with_topics(topics))
}

pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<RealtimeQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let token = query
        .token
        .as_deref()
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(extract_bearer_token)
        })
        .ok_or_else(|| ApiError::unauthorized("Missing token"))?;

    let claims = state.engine.auth.verify(token)?;
    let filter = parse_filter(claims.role, query.topics.as_deref())?;

    info!(user = %claims.username, role = ?claims.role, "Realtime connection");
    Ok(ws
        .max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state, claims, filter)))
}

/// Handles a WebSocket connection.
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    claims: Claims,
    filter: SubscriptionFilter,
) {
    let (mut sender, mut receiver) = socket.split();
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Message>(64);

    // Outgoing message task
    let outgoing_handle = tokio::spawn(async move {
        while let Some(msg) = outgoing_rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Event forwarding task
    let mut subscription = state.engine.hub().subscribe(filter);
    let role = claims.role;
    let forward_tx = outgoing_tx.clone();
    let forward_handle = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            let outbound = OutboundEvent {
                feedback: feedback_for(role, &event.payload),
                event: &event,
            };
            match serde_json::to_string(&outbound) {
                Ok(json) => {
                    if forward_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(?e, "Failed to encode realtime event"),
            }
        }
    });

    // Ping task
    let ping_tx = outgoing_tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_interval = interval(PING_INTERVAL);
        loop {
            ping_interval.tick().await;
            if ping_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                break;
            }
        }
    });

    // Main receive loop; clients only talk to keep the connection alive.
    loop {
        match receiver.next().await {
            Some(Ok(Message::Ping(data))) => {
                let _ = outgoing_tx.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Close(_))) => {
                info!(user = %claims.username, "Client requested close");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(user = %claims.username, ?e, "WebSocket error");
                break;
            }
            None => {
                info!(user = %claims.username, "Client disconnected");
                break;
            }
        }
    }

    ping_handle.abort();
    forward_handle.abort();
    outgoing_handle.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use quan_engine::EventPayload;

    #[test]
    fn test_parse_filter() {
        let filter = parse_filter(Role::Waiter, None).unwrap();
        assert!(filter.topics.is_none());
        assert_eq!(filter.role, Some(Role::Waiter));

        let filter = parse_filter(Role::Waiter, Some("tables, heartbeat")).unwrap();
        let topics = filter.topics.unwrap();
        assert!(topics.contains(&Topic::Tables));
        assert!(topics.contains(&Topic::Heartbeat));
        assert_eq!(topics.len(), 2);

        assert!(parse_filter(Role::Waiter, Some("tables,bogus")).is_err());
    }

    #[test]
    fn test_outbound_shape() {
        let event = RealtimeEvent::new(EventPayload::Heartbeat);
        let json = serde_json::to_value(OutboundEvent {
            event: &event,
            feedback: FeedbackCue::None,
        })
        .unwrap();
        assert_eq!(json["event"]["topic"], "heartbeat");
        assert_eq!(json["event"]["payload"]["type"], "heartbeat");
        assert_eq!(json["feedback"], "none");
    }
}
