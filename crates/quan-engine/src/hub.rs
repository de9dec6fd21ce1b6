//! # Notification Hub
//!
//! In-process fan-out of realtime events to connected clients.
//!
//! ## Event Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Notification Hub Flow                             │
//! │                                                                         │
//! │  Workflow commits ──► hub.publish(payload)                              │
//! │                            │                                            │
//! │                            ▼                                            │
//! │               broadcast::channel(capacity)                              │
//! │             ┌──────────────┼───────────────┐                            │
//! │             ▼              ▼               ▼                            │
//! │      Subscription    Subscription    Subscription                       │
//! │      (kitchen,       (waiter,        (cashier,                          │
//! │       order_items)    all topics)     orders)                           │
//! │             │              │               │                            │
//! │             ▼              ▼               ▼                            │
//! │      WebSocket + feedback_for(role, event) → sound / vibrate            │
//! │                                                                         │
//! │  • Publishing with no subscribers is not an error                      │
//! │  • A lagging subscriber skips what it missed and keeps going           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use quan_core::{
    CancellationRequestDetail, DiningTable, OrderItem, OrderItemStatus, PaymentMethod,
    ReturnNotification, Role,
};

// =============================================================================
// Topics
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    OrderItems,
    CancellationRequests,
    ReturnNotifications,
    Orders,
    Tables,
    Heartbeat,
}

impl Topic {
    pub const ALL: [Topic; 6] = [
        Topic::OrderItems,
        Topic::CancellationRequests,
        Topic::ReturnNotifications,
        Topic::Orders,
        Topic::Tables,
        Topic::Heartbeat,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Topic::OrderItems => "order_items",
            Topic::CancellationRequests => "cancellation_requests",
            Topic::ReturnNotifications => "return_notifications",
            Topic::Orders => "orders",
            Topic::Tables => "tables",
            Topic::Heartbeat => "heartbeat",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| EngineError::InvalidConfig(format!("Unknown topic: '{}'", s)))
    }
}

// =============================================================================
// Events
// =============================================================================

/// What happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// An item was added (`previous` is `None`) or moved to a new status.
    ItemStatusChanged {
        table_id: String,
        previous: Option<OrderItemStatus>,
        item: OrderItem,
    },
    /// A request was created, or an auto-escalation request grew.
    CancellationRequested {
        created: bool,
        request: CancellationRequestDetail,
    },
    CancellationResolved {
        request: CancellationRequestDetail,
    },
    ReturnNotificationCreated {
        notification: ReturnNotification,
    },
    OrderPaid {
        order_id: String,
        table_id: String,
        amount: i64,
        method: PaymentMethod,
    },
    TableChanged {
        table: DiningTable,
    },
    Heartbeat,
}

impl EventPayload {
    pub fn topic(&self) -> Topic {
        match self {
            EventPayload::ItemStatusChanged { .. } => Topic::OrderItems,
            EventPayload::CancellationRequested { .. }
            | EventPayload::CancellationResolved { .. } => Topic::CancellationRequests,
            EventPayload::ReturnNotificationCreated { .. } => Topic::ReturnNotifications,
            EventPayload::OrderPaid { .. } => Topic::Orders,
            EventPayload::TableChanged { .. } => Topic::Tables,
            EventPayload::Heartbeat => Topic::Heartbeat,
        }
    }
}

/// Envelope sent to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub id: String,
    pub topic: Topic,
    pub occurred_at: DateTime<Utc>,
    pub payload: EventPayload,
}

impl RealtimeEvent {
    pub fn new(payload: EventPayload) -> Self {
        RealtimeEvent {
            id: Uuid::new_v4().to_string(),
            topic: payload.topic(),
            occurred_at: Utc::now(),
            payload,
        }
    }
}

// =============================================================================
// Feedback
// =============================================================================

/// Cue a client plays when it receives an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackCue {
    None,
    Sound,
    Vibrate,
    SoundAndVibrate,
}

/// Which cue `role` should play for `event`.
///
/// ## Rules
/// ```text
/// kitchen  new cancellation request, new item            → sound
/// waiter   return notification                           → sound + vibrate
///          item became ready                             → vibrate
/// cashier  order paid                                    → sound
/// ```
pub fn feedback_for(role: Role, event: &EventPayload) -> FeedbackCue {
    match (role, event) {
        (Role::Kitchen, EventPayload::CancellationRequested { .. }) => FeedbackCue::Sound,
        (Role::Kitchen, EventPayload::ItemStatusChanged { previous: None, .. }) => {
            FeedbackCue::Sound
        }
        (Role::Waiter, EventPayload::ReturnNotificationCreated { .. }) => {
            FeedbackCue::SoundAndVibrate
        }
        (Role::Waiter, EventPayload::ItemStatusChanged { item, .. })
            if item.status == OrderItemStatus::Ready =>
        {
            FeedbackCue::Vibrate
        }
        (Role::Cashier, EventPayload::OrderPaid { .. }) => FeedbackCue::Sound,
        _ => FeedbackCue::None,
    }
}

/// Topics a role receives unless it narrows them further.
pub fn topics_for_role(role: Role) -> &'static [Topic] {
    match role {
        Role::Admin => &Topic::ALL,
        Role::Kitchen => &[
            Topic::OrderItems,
            Topic::CancellationRequests,
            Topic::Heartbeat,
        ],
        Role::Waiter => &[
            Topic::OrderItems,
            Topic::CancellationRequests,
            Topic::ReturnNotifications,
            Topic::Tables,
            Topic::Heartbeat,
        ],
        Role::Cashier => &[Topic::Orders, Topic::Tables, Topic::Heartbeat],
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Which events a subscriber wants.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    /// `None` means every topic the role allows.
    pub topics: Option<HashSet<Topic>>,
    /// `None` means no role restriction.
    pub role: Option<Role>,
}

impl SubscriptionFilter {
    pub fn for_role(role: Role) -> Self {
        SubscriptionFilter {
            topics: None,
            role: Some(role),
        }
    }

    pub fn with_topics(mut self, topics: impl IntoIterator<Item = Topic>) -> Self {
        self.topics = Some(topics.into_iter().collect());
        self
    }

    pub fn accepts(&self, event: &RealtimeEvent) -> bool {
        let topic_ok = self
            .topics
            .as_ref()
            .map_or(true, |topics| topics.contains(&event.topic));
        let role_ok = self
            .role
            .map_or(true, |role| topics_for_role(role).contains(&event.topic));
        topic_ok && role_ok
    }
}

/// A filtered receiver.
pub struct Subscription {
    rx: broadcast::Receiver<RealtimeEvent>,
    filter: SubscriptionFilter,
}

impl Subscription {
    /// Next accepted event, or `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<RealtimeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Realtime subscriber lagged, skipping missed events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn filter(&self) -> &SubscriptionFilter {
        &self.filter
    }
}

// =============================================================================
// Hub
// =============================================================================

/// Cloneable handle to the broadcast channel.
#[derive(Debug, Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<RealtimeEvent>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        NotificationHub { tx }
    }

    /// Wraps `payload` in an event and sends it to every subscriber.
    pub fn publish(&self, payload: EventPayload) -> RealtimeEvent {
        let event = RealtimeEvent::new(payload);
        match self.tx.send(event.clone()) {
            Ok(receivers) => debug!(topic = %event.topic, receivers, "Published event"),
            // No subscribers
            Err(_) => debug!(topic = %event.topic, "Published event with no subscribers"),
        }
        event
    }

    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publishes a heartbeat every `period` until the returned handle shuts
    /// it down.
    pub fn spawn_heartbeat(&self, period: Duration) -> HeartbeatHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let hub = self.clone();

        tokio::spawn(async move {
            info!(period_secs = period.as_secs(), "Heartbeat starting");
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        hub.publish(EventPayload::Heartbeat);
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            info!("Heartbeat stopped");
        });

        HeartbeatHandle { shutdown_tx }
    }
}

/// Stops a heartbeat task.
#[derive(Clone)]
pub struct HeartbeatHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl HeartbeatHandle {
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| EngineError::ChannelError("Heartbeat channel closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quan_core::{NotificationStatus, TableStatus};

    fn item(status: OrderItemStatus) -> OrderItem {
        let now = Utc::now();
        OrderItem {
            id: "item-1".into(),
            order_id: "order-1".into(),
            menu_item_id: "menu-1".into(),
            name: "Phở bò".into(),
            unit_price: 65_000,
            quantity: 1,
            status,
            note: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn table() -> DiningTable {
        DiningTable {
            id: "t-1".into(),
            name: "B1".into(),
            area: None,
            capacity: 4,
            status: TableStatus::Occupied,
            current_order_id: Some("order-1".into()),
            updated_at: Utc::now(),
        }
    }

    fn notification() -> ReturnNotification {
        ReturnNotification {
            id: "n-1".into(),
            order_id: "order-1".into(),
            table_id: "t-1".into(),
            order_item_id: "item-1".into(),
            item_name: "Phở bò".into(),
            quantity: 1,
            reason: "Hết hàng".into(),
            status: NotificationStatus::Pending,
            created_at: Utc::now(),
            acknowledged_at: None,
            acknowledged_by: None,
        }
    }

    #[test]
    fn test_feedback_rules() {
        let new_item = EventPayload::ItemStatusChanged {
            table_id: "t-1".into(),
            previous: None,
            item: item(OrderItemStatus::Waiting),
        };
        let ready = EventPayload::ItemStatusChanged {
            table_id: "t-1".into(),
            previous: Some(OrderItemStatus::InProgress),
            item: item(OrderItemStatus::Ready),
        };
        let returned = EventPayload::ReturnNotificationCreated {
            notification: notification(),
        };
        let paid = EventPayload::OrderPaid {
            order_id: "order-1".into(),
            table_id: "t-1".into(),
            amount: 65_000,
            method: PaymentMethod::Momo,
        };

        assert_eq!(feedback_for(Role::Kitchen, &new_item), FeedbackCue::Sound);
        assert_eq!(feedback_for(Role::Kitchen, &ready), FeedbackCue::None);
        assert_eq!(feedback_for(Role::Waiter, &ready), FeedbackCue::Vibrate);
        assert_eq!(feedback_for(Role::Waiter, &new_item), FeedbackCue::None);
        assert_eq!(feedback_for(Role::Waiter, &returned), FeedbackCue::SoundAndVibrate);
        assert_eq!(feedback_for(Role::Cashier, &paid), FeedbackCue::Sound);
        assert_eq!(feedback_for(Role::Kitchen, &paid), FeedbackCue::None);
        assert_eq!(feedback_for(Role::Admin, &returned), FeedbackCue::None);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = NotificationHub::new(8);
        let event = hub.publish(EventPayload::Heartbeat);
        assert_eq!(event.topic, Topic::Heartbeat);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscription_filters_by_topic_and_role() {
        let hub = NotificationHub::new(16);
        let mut kitchen = hub.subscribe(SubscriptionFilter::for_role(Role::Kitchen));
        let mut tables_only = hub.subscribe(SubscriptionFilter::default().with_topics([Topic::Tables]));

        hub.publish(EventPayload::TableChanged { table: table() });
        hub.publish(EventPayload::ItemStatusChanged {
            table_id: "t-1".into(),
            previous: None,
            item: item(OrderItemStatus::Waiting),
        });

        let first = kitchen.recv().await.unwrap();
        assert_eq!(first.topic, Topic::OrderItems);

        let first = tables_only.recv().await.unwrap();
        assert_eq!(first.topic, Topic::Tables);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_keeps_receiving() {
        let hub = NotificationHub::new(2);
        let mut sub = hub.subscribe(SubscriptionFilter::default());

        for _ in 0..5 {
            hub.publish(EventPayload::Heartbeat);
        }
        hub.publish(EventPayload::TableChanged { table: table() });

        // Oldest events were dropped; the subscriber resumes at what is left.
        let mut topics = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(50), sub.recv()).await
        {
            topics.push(event.topic);
        }
        assert_eq!(topics.last(), Some(&Topic::Tables));
        assert!(topics.len() <= 2);
    }

    #[tokio::test]
    async fn test_recv_ends_when_hub_dropped() {
        let hub = NotificationHub::new(4);
        let mut sub = hub.subscribe(SubscriptionFilter::default());
        drop(hub);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_topic_parsing() {
        assert_eq!("order_items".parse::<Topic>().unwrap(), Topic::OrderItems);
        assert_eq!(" tables ".parse::<Topic>().unwrap(), Topic::Tables);
        assert!("sales".parse::<Topic>().is_err());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = RealtimeEvent::new(EventPayload::Heartbeat);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["topic"], "heartbeat");
        assert_eq!(json["payload"]["type"], "heartbeat");
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_publishes_until_shutdown() {
        let hub = NotificationHub::new(8);
        let mut sub = hub.subscribe(SubscriptionFilter::default().with_topics([Topic::Heartbeat]));
        let handle = hub.spawn_heartbeat(Duration::from_secs(20));

        let event = sub.recv().await.unwrap();
        assert!(matches!(event.payload, EventPayload::Heartbeat));

        handle.shutdown().await.unwrap();
    }
}
