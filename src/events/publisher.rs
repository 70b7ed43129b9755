//! Broadcast bus for gateway lifecycle events.
//!
//! Components publish fire-and-forget notifications (service registered,
//! health changed, circuit transitioned, job finished) that observers such
//! as the gateway event log or tests can subscribe to. Delivery is
//! best-effort: events published with no subscribers are dropped, and a
//! subscriber that falls behind the channel capacity loses the oldest
//! events rather than blocking publishers.

use serde_json::Value;
use tokio::sync::broadcast;

/// Fan-out channel carrying [`GatewayEvent`]s to all current subscribers
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GatewayEvent>,
}

/// One lifecycle notification, stamped at publish time
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub event_type: String,
    pub data: Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl EventBus {
    /// Create a bus whose subscribers buffer up to `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to every current subscriber
    ///
    /// Returns how many subscribers received it. Zero is a normal outcome,
    /// not an error: lifecycle events are emitted whether or not anything
    /// is listening.
    pub fn publish(&self, event_type: impl Into<String>, data: Value) -> usize {
        let event = GatewayEvent {
            event_type: event_type.into(),
            data,
            timestamp: chrono::Utc::now(),
        };
        self.sender.send(event).unwrap_or(0)
    }

    /// Open a new subscription starting from the next published event
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_publish_without_subscribers_reports_zero() {
        let bus = EventBus::new(16);
        let delivered = bus.publish("service.registered", json!({"name": "svc-a"}));
        assert_eq!(delivered, 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let delivered = bus.publish("job.enqueued", json!({"job_id": "abc"}));
        assert_eq!(delivered, 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "job.enqueued");
        assert_eq!(event.data["job_id"], "abc");
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_receive_events() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.publish("gateway.started", json!({})), 2);

        assert_eq!(rx1.recv().await.unwrap().event_type, "gateway.started");
        assert_eq!(rx2.recv().await.unwrap().event_type, "gateway.started");
    }

    #[tokio::test]
    async fn test_events_carry_timestamps_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish("first", json!({}));
        bus.publish("second", json!({}));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(first.timestamp <= second.timestamp);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_drops_oldest_events() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for i in 0..4 {
            bus.publish("tick", json!({"n": i}));
        }

        // The two oldest events were overwritten
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        assert_eq!(rx.recv().await.unwrap().data["n"], 2);
    }
}
