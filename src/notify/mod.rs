use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Routing target of an outbound event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "id")]
pub enum Channel {
    Courier(Uuid),
    Order(Uuid),
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub channel: Channel,
    pub event: String,
    pub payload: Value,
    pub emitted_at: DateTime<Utc>,
}

/// Fan-out of state-change events to couriers, order subscribers, and
/// admins. Fire-and-forget: a failed publish degrades visibility, never
/// correctness, so it is logged and swallowed and no transition rolls
/// back because of it.
#[derive(Clone)]
pub struct NotificationSink {
    tx: broadcast::Sender<Notification>,
}

impl NotificationSink {
    pub fn new(buffer: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer);
        Self { tx }
    }

    pub fn publish(&self, channel: Channel, event: &str, payload: Value) {
        let notification = Notification {
            channel,
            event: event.to_string(),
            payload,
            emitted_at: Utc::now(),
        };

        if let Err(err) = self.tx.send(notification) {
            // No subscribers right now; normal for a broadcast sink.
            debug!(event, error = %err, "notification dropped");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::{Channel, NotificationSink};

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let sink = NotificationSink::new(16);
        let mut rx = sink.subscribe();

        let courier = Uuid::from_u128(1);
        sink.publish(Channel::Courier(courier), "assignment_offered", json!({"x": 1}));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.channel, Channel::Courier(courier));
        assert_eq!(received.event, "assignment_offered");
        assert_eq!(received.payload["x"], 1);
    }

    #[test]
    fn publish_without_subscribers_is_swallowed() {
        let sink = NotificationSink::new(16);
        // Must not panic or error out.
        sink.publish(Channel::Admin, "order_unassigned", json!({}));
    }
}
