//! Cross-instance publish/subscribe.
//!
//! Every instance receives every envelope on a single local broadcast hub;
//! gateway sessions filter by the topics they subscribed to. Delivery is
//! at-most-once: nothing is replayed to late subscribers and a failed
//! publish is reported to the caller, which decides whether to care.

pub mod pubsub;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use crate::error::ApiError;

pub use self::pubsub::RedisBroker;

/// Capacity of the local hub. Receivers that fall behind skip envelopes
/// (`RecvError::Lagged`).
const HUB_CAPACITY: usize = 4096;

const CHAT_ROOM_PREFIX: &str = "chatRoom:";
const USER_NOTIFICATION_PREFIX: &str = "userNotification:";
const USER_KICK: &str = "user-kick";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Chat messages and room events of one room.
    ChatRoom(String),
    /// Forced-disconnect signal; the payload is the raw user id.
    UserKick,
    /// Private notifications for one user.
    UserNotification(String),
}

impl Topic {
    pub fn chat_room(room_id: &str) -> Self {
        Self::ChatRoom(room_id.to_string())
    }

    pub fn user_notification(user_id: &str) -> Self {
        Self::UserNotification(user_id.to_string())
    }

    pub fn parse(channel: &str) -> Option<Self> {
        if channel == USER_KICK {
            return Some(Self::UserKick);
        }
        if let Some(room_id) = channel.strip_prefix(CHAT_ROOM_PREFIX) {
            return (!room_id.is_empty()).then(|| Self::ChatRoom(room_id.to_string()));
        }
        if let Some(user_id) = channel.strip_prefix(USER_NOTIFICATION_PREFIX) {
            return (!user_id.is_empty()).then(|| Self::UserNotification(user_id.to_string()));
        }
        None
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChatRoom(room_id) => write!(f, "{CHAT_ROOM_PREFIX}{room_id}"),
            Self::UserKick => f.write_str(USER_KICK),
            Self::UserNotification(user_id) => write!(f, "{USER_NOTIFICATION_PREFIX}{user_id}"),
        }
    }
}

/// One message as seen by every instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub topic: Topic,
    pub payload: String,
}

/// Payload carried on chat room and user notification topics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicEvent {
    pub event: String,
    pub data: Value,
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, topic: &Topic, payload: &str) -> Result<(), ApiError>;

    /// Receiver for every envelope this instance sees.
    fn subscribe(&self) -> broadcast::Receiver<Arc<Envelope>>;

    /// Channel of payloads for a single topic. The forwarding task ends once
    /// the returned receiver is dropped.
    fn subscribe_topic(&self, topic: Topic) -> mpsc::UnboundedReceiver<String> {
        let mut rx = self.subscribe();
        let (tx, out) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    result = rx.recv() => match result {
                        Ok(envelope) if envelope.topic == topic => {
                            if tx.send(envelope.payload.clone()).is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(%topic, skipped = n, "topic subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
        out
    }
}

/// Publish a `{event, data}` payload, logging instead of failing.
///
/// Used after the state change has already been committed: the write stands
/// whether or not anyone hears about it.
pub async fn publish_event<T: Serialize>(broker: &dyn Broker, topic: &Topic, event: &str, data: &T) {
    let payload = match serde_json::to_value(data)
        .and_then(|data| serde_json::to_string(&TopicEvent { event: event.to_string(), data }))
    {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(?e, %topic, event, "failed to encode broker event");
            return;
        }
    };

    if let Err(e) = broker.publish(topic, &payload).await {
        tracing::warn!(error = %e, %topic, event, "broker publish failed");
    }
}

/// The in-process fan-out every broker delivers into.
#[derive(Clone)]
pub struct LocalHub {
    sender: broadcast::Sender<Arc<Envelope>>,
}

impl LocalHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(HUB_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Envelope>> {
        self.sender.subscribe()
    }

    pub fn deliver(&self, envelope: Envelope) {
        // Err only means nobody is listening on this instance.
        let _ = self.sender.send(Arc::new(envelope));
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-process broker. Instances sharing one `MemoryBroker` behave like
/// instances sharing one Redis.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    hub: LocalHub,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, topic: &Topic, payload: &str) -> Result<(), ApiError> {
        self.hub.deliver(Envelope {
            topic: topic.clone(),
            payload: payload.to_string(),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Arc<Envelope>> {
        self.hub.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_names() {
        assert_eq!(Topic::chat_room("room_1").to_string(), "chatRoom:room_1");
        assert_eq!(Topic::UserKick.to_string(), "user-kick");
        assert_eq!(
            Topic::user_notification("usr_1").to_string(),
            "userNotification:usr_1"
        );
        assert_eq!(Topic::parse("chatRoom:room_1"), Some(Topic::chat_room("room_1")));
        assert_eq!(Topic::parse("user-kick"), Some(Topic::UserKick));
        assert_eq!(Topic::parse("chatRoom:"), None);
        assert_eq!(Topic::parse("something-else"), None);
    }

    #[tokio::test]
    async fn topic_subscription_filters_other_topics() {
        let broker = MemoryBroker::new();
        let mut rx = broker.subscribe_topic(Topic::chat_room("a"));

        broker.publish(&Topic::chat_room("b"), "for b").await.unwrap();
        broker.publish(&Topic::chat_room("a"), "for a").await.unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("for a"));
    }

    #[tokio::test]
    async fn events_are_wrapped_with_their_name() {
        let broker = MemoryBroker::new();
        let mut rx = broker.subscribe();

        publish_event(&broker, &Topic::UserKick, "PING", &serde_json::json!({ "n": 1 })).await;

        let envelope = rx.recv().await.unwrap();
        let event: TopicEvent = serde_json::from_str(&envelope.payload).unwrap();
        assert_eq!(event.event, "PING");
        assert_eq!(event.data["n"], 1);
    }
}
