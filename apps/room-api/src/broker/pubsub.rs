//! Redis PUBLISH / PSUBSCRIBE broker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::broadcast;

use super::{Broker, Envelope, LocalHub, Topic};
use crate::error::ApiError;

/// Channel patterns every instance listens to.
const PATTERNS: [&str; 3] = ["chatRoom:*", "userNotification:*", "user-kick"];

const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct RedisBroker {
    conn: ConnectionManager,
    hub: LocalHub,
}

impl RedisBroker {
    /// Connect the publishing side and spawn the listener that forwards every
    /// matching Redis message into this instance's hub.
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        let hub = LocalHub::new();

        tokio::spawn(listen(client, hub.clone()));

        tracing::info!("redis broker connected");
        Ok(Self { conn, hub })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, topic: &Topic, payload: &str) -> Result<(), ApiError> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(topic.to_string(), payload)
            .await
            .map_err(|e| {
                tracing::error!(?e, %topic, "redis publish failed");
                ApiError::from(e)
            })
    }

    fn subscribe(&self) -> broadcast::Receiver<Arc<Envelope>> {
        self.hub.subscribe()
    }
}

/// Forward Redis messages into the hub for the lifetime of the process,
/// resubscribing whenever the connection drops.
async fn listen(client: redis::Client, hub: LocalHub) {
    loop {
        match forward(&client, &hub).await {
            Ok(()) => tracing::warn!("redis subscription stream ended"),
            Err(e) => tracing::error!(?e, "redis subscription failed"),
        }
        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
    }
}

async fn forward(client: &redis::Client, hub: &LocalHub) -> Result<(), redis::RedisError> {
    let mut pubsub = client.get_async_pubsub().await?;
    for pattern in PATTERNS {
        pubsub.psubscribe(pattern).await?;
    }
    tracing::info!(patterns = ?PATTERNS, "redis broker subscribed");

    let mut messages = pubsub.into_on_message();
    while let Some(msg) = messages.next().await {
        let channel = msg.get_channel_name();
        let Some(topic) = Topic::parse(channel) else {
            tracing::debug!(%channel, "ignoring message on unknown channel");
            continue;
        };
        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(?e, %channel, "non-text broker payload");
                continue;
            }
        };
        hub.deliver(Envelope { topic, payload });
    }
    Ok(())
}
