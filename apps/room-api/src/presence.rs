//! Per-user presence shared by every instance.
//!
//! Presence is per **user**, not per socket. Each live gateway session adds
//! its id to `presence:sessions:{user}`; the user only goes OFFLINE when that
//! set is empty. Both keys expire after 24h so a crashed instance cannot leave
//! a user online forever.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::broker::{publish_event, Broker, Topic};
use crate::db::kv::KeyValueStore;
use crate::directory::ParticipantRepository;
use crate::error::ApiError;
use crate::external::UserDirectory;
use crate::gateway::events::EventName;

pub const PRESENCE_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresenceStatus {
    Online,
    Offline,
    Reading,
}

impl PresenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "ONLINE",
            Self::Offline => "OFFLINE",
            Self::Reading => "READING",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ONLINE" => Some(Self::Online),
            "OFFLINE" => Some(Self::Offline),
            "READING" => Some(Self::Reading),
            _ => None,
        }
    }
}

/// Pushed to each friend's notification topic on every status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PresenceUpdate {
    pub user_id: String,
    pub nickname: String,
    pub status: PresenceStatus,
}

fn status_key(user_id: &str) -> String {
    format!("presence:status:{user_id}")
}

fn sessions_key(user_id: &str) -> String {
    format!("presence:sessions:{user_id}")
}

#[derive(Clone)]
pub struct PresenceStore {
    kv: Arc<dyn KeyValueStore>,
    broker: Arc<dyn Broker>,
    accounts: Arc<dyn UserDirectory>,
    participants: Arc<dyn ParticipantRepository>,
}

impl PresenceStore {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        broker: Arc<dyn Broker>,
        accounts: Arc<dyn UserDirectory>,
        participants: Arc<dyn ParticipantRepository>,
    ) -> Self {
        Self {
            kv,
            broker,
            accounts,
            participants,
        }
    }

    /// Register a live session and mark the user ONLINE.
    pub async fn connect(&self, user_id: &str, session_id: &str) -> Result<PresenceStatus, ApiError> {
        let sessions = self
            .kv
            .sadd(&sessions_key(user_id), session_id, PRESENCE_TTL_SECS)
            .await?;
        tracing::debug!(%user_id, %session_id, sessions, "presence session added");

        self.set_status(user_id, PresenceStatus::Online).await?;
        Ok(PresenceStatus::Online)
    }

    /// Drop a session. Only the last one flips the user OFFLINE, which also
    /// marks every ACTIVE participant row of theirs DISCONNECTED.
    pub async fn disconnect(&self, user_id: &str, session_id: &str) -> Result<PresenceStatus, ApiError> {
        let sessions = sessions_key(user_id);
        let remaining = self
            .kv
            .srem_clearing(&sessions, session_id, &status_key(user_id))
            .await?;
        if remaining > 0 {
            tracing::debug!(%user_id, %session_id, remaining, "presence session removed");
            return self.get_status(user_id).await;
        }

        // A session opened elsewhere since the removal owns the status now.
        if self.kv.scard(&sessions).await? > 0 {
            tracing::debug!(%user_id, %session_id, "session reopened during disconnect");
            return self.get_status(user_id).await;
        }

        self.notify_friends(user_id, PresenceStatus::Offline).await;

        let rows = self.participants.disconnect_user(user_id, Utc::now()).await?;
        for row in &rows {
            publish_event(
                self.broker.as_ref(),
                &Topic::chat_room(&row.room_id),
                EventName::PARTICIPANT_UPDATE,
                row,
            )
            .await;
        }

        tracing::info!(%user_id, rooms = rows.len(), "user went offline");
        Ok(PresenceStatus::Offline)
    }

    /// OFFLINE when nothing is cached, the entry expired, or it is unreadable.
    pub async fn get_status(&self, user_id: &str) -> Result<PresenceStatus, ApiError> {
        let raw = self.kv.get(&status_key(user_id)).await?;
        Ok(raw
            .as_deref()
            .and_then(PresenceStatus::parse)
            .unwrap_or(PresenceStatus::Offline))
    }

    /// The user is in a room. No-op for users without a live session.
    pub async fn mark_reading(&self, user_id: &str) -> Result<(), ApiError> {
        self.set_if_connected(user_id, PresenceStatus::Reading).await
    }

    /// The user left a room. No-op for users without a live session.
    pub async fn mark_online(&self, user_id: &str) -> Result<(), ApiError> {
        self.set_if_connected(user_id, PresenceStatus::Online).await
    }

    async fn set_if_connected(&self, user_id: &str, status: PresenceStatus) -> Result<(), ApiError> {
        if self.get_status(user_id).await? == status {
            return Ok(());
        }
        let written = self
            .kv
            .set_ex_if_members(
                &status_key(user_id),
                status.as_str(),
                PRESENCE_TTL_SECS,
                &sessions_key(user_id),
            )
            .await?;
        if written {
            self.notify_friends(user_id, status).await;
        }
        Ok(())
    }

    async fn set_status(&self, user_id: &str, status: PresenceStatus) -> Result<(), ApiError> {
        self.kv
            .set_ex(&status_key(user_id), status.as_str(), PRESENCE_TTL_SECS)
            .await?;
        self.notify_friends(user_id, status).await;
        Ok(())
    }

    /// Best effort: a failed lookup or publish only costs the notification.
    async fn notify_friends(&self, user_id: &str, status: PresenceStatus) {
        let friends = match self.accounts.friend_ids(user_id).await {
            Ok(friends) => friends,
            Err(e) => {
                tracing::warn!(error = %e, %user_id, "friend lookup failed; skipping presence fan-out");
                return;
            }
        };
        if friends.is_empty() {
            return;
        }

        let nickname = match self.accounts.profile(user_id).await {
            Ok(Some(profile)) => profile.nickname,
            Ok(None) => user_id.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, %user_id, "profile lookup failed");
                user_id.to_string()
            }
        };

        let update = PresenceUpdate {
            user_id: user_id.to_string(),
            nickname,
            status,
        };
        for friend_id in &friends {
            publish_event(
                self.broker.as_ref(),
                &Topic::user_notification(friend_id),
                EventName::STATUS_UPDATE,
                &update,
            )
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::broker::{MemoryBroker, TopicEvent};
    use crate::db::kv::MemoryStore;
    use crate::directory::memory::MemoryDirectory;
    use crate::directory::RoomRepository;
    use crate::external::MemoryAccounts;
    use crate::models::participant::ConnectionStatus;
    use crate::models::room::NewRoom;

    /// Runs another instance's `connect` for `s2` around the first
    /// `srem_clearing` call.
    struct InterleavedStore {
        inner: MemoryStore,
        before_removal: bool,
        fired: AtomicBool,
    }

    impl InterleavedStore {
        async fn other_instance_connects(&self) -> Result<(), ApiError> {
            if self.fired.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            self.inner.sadd(&sessions_key("u1"), "s2", PRESENCE_TTL_SECS).await?;
            self.inner
                .set_ex(&status_key("u1"), PresenceStatus::Online.as_str(), PRESENCE_TTL_SECS)
                .await
        }
    }

    #[async_trait]
    impl KeyValueStore for InterleavedStore {
        async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ApiError> {
            self.inner.set_ex(key, value, ttl_secs).await
        }

        async fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
            self.inner.get(key).await
        }

        async fn sadd(&self, key: &str, member: &str, ttl_secs: u64) -> Result<u64, ApiError> {
            self.inner.sadd(key, member, ttl_secs).await
        }

        async fn srem_clearing(&self, key: &str, member: &str, clear_key: &str) -> Result<u64, ApiError> {
            if self.before_removal {
                self.other_instance_connects().await?;
            }
            let remaining = self.inner.srem_clearing(key, member, clear_key).await?;
            if !self.before_removal {
                self.other_instance_connects().await?;
            }
            Ok(remaining)
        }

        async fn set_ex_if_members(
            &self,
            key: &str,
            value: &str,
            ttl_secs: u64,
            guard_key: &str,
        ) -> Result<bool, ApiError> {
            self.inner.set_ex_if_members(key, value, ttl_secs, guard_key).await
        }

        async fn scard(&self, key: &str) -> Result<u64, ApiError> {
            self.inner.scard(key).await
        }
    }

    struct Fixture {
        presence: PresenceStore,
        broker: Arc<MemoryBroker>,
        accounts: Arc<MemoryAccounts>,
        directory: Arc<MemoryDirectory>,
    }

    fn fixture() -> Fixture {
        fixture_on(Arc::new(MemoryStore::new()))
    }

    fn fixture_on(kv: Arc<dyn KeyValueStore>) -> Fixture {
        let broker = Arc::new(MemoryBroker::new());
        let accounts = Arc::new(MemoryAccounts::new());
        let directory = Arc::new(MemoryDirectory::new());
        let presence = PresenceStore::new(
            kv,
            broker.clone(),
            accounts.clone(),
            directory.clone(),
        );
        Fixture {
            presence,
            broker,
            accounts,
            directory,
        }
    }

    #[tokio::test]
    async fn unknown_user_is_offline() {
        let f = fixture();
        assert_eq!(f.presence.get_status("nobody").await.unwrap(), PresenceStatus::Offline);
    }

    #[tokio::test]
    async fn offline_only_after_every_session_closes() {
        let f = fixture();
        let sessions = ["s1", "s2", "s3"];
        for s in sessions {
            f.presence.connect("u1", s).await.unwrap();
        }

        for s in &sessions[..2] {
            assert_eq!(
                f.presence.disconnect("u1", s).await.unwrap(),
                PresenceStatus::Online
            );
            assert_eq!(f.presence.get_status("u1").await.unwrap(), PresenceStatus::Online);
        }

        assert_eq!(
            f.presence.disconnect("u1", "s3").await.unwrap(),
            PresenceStatus::Offline
        );
        assert_eq!(f.presence.get_status("u1").await.unwrap(), PresenceStatus::Offline);
    }

    #[tokio::test]
    async fn duplicate_disconnect_is_harmless() {
        let f = fixture();
        f.presence.connect("u1", "s1").await.unwrap();
        f.presence.connect("u1", "s2").await.unwrap();

        f.presence.disconnect("u1", "s1").await.unwrap();
        f.presence.disconnect("u1", "s1").await.unwrap();
        assert_eq!(f.presence.get_status("u1").await.unwrap(), PresenceStatus::Online);
    }

    #[tokio::test]
    async fn friends_hear_status_changes() {
        let f = fixture();
        f.accounts.add_user("u1", "Mina");
        f.accounts.add_friendship("u1", "u2");
        let mut rx = f.broker.subscribe_topic(Topic::user_notification("u2"));

        f.presence.connect("u1", "s1").await.unwrap();
        let event: TopicEvent = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(event.event, EventName::STATUS_UPDATE);
        assert_eq!(event.data["nickname"], "Mina");
        assert_eq!(event.data["status"], "ONLINE");

        f.presence.disconnect("u1", "s1").await.unwrap();
        let event: TopicEvent = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(event.data["status"], "OFFLINE");
    }

    #[tokio::test]
    async fn reading_requires_a_live_session() {
        let f = fixture();
        f.presence.mark_reading("u1").await.unwrap();
        assert_eq!(f.presence.get_status("u1").await.unwrap(), PresenceStatus::Offline);

        f.presence.connect("u1", "s1").await.unwrap();
        f.presence.mark_reading("u1").await.unwrap();
        assert_eq!(f.presence.get_status("u1").await.unwrap(), PresenceStatus::Reading);

        f.presence.mark_online("u1").await.unwrap();
        assert_eq!(f.presence.get_status("u1").await.unwrap(), PresenceStatus::Online);
    }

    #[tokio::test]
    async fn going_offline_disconnects_participation() {
        let f = fixture();
        let (room, _) = f
            .directory
            .create_room_with_host(
                NewRoom {
                    host_id: "u1".into(),
                    library_id: "lib_1".into(),
                    book_id: "book_1".into(),
                    name: "Room".into(),
                    voice: "default".into(),
                    play_speed: 1.0,
                    max_capacity: 8,
                    current_chapter_id: None,
                },
                Utc::now(),
            )
            .await
            .unwrap();

        f.presence.connect("u1", "s1").await.unwrap();
        f.presence.disconnect("u1", "s1").await.unwrap();

        let row = f
            .directory
            .find_participant(&room.id, "u1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.connection_status, ConnectionStatus::Disconnected);
    }

    async fn room_with_member(directory: &MemoryDirectory, user_id: &str) -> String {
        let (room, _) = directory
            .create_room_with_host(
                NewRoom {
                    host_id: user_id.into(),
                    library_id: "lib_1".into(),
                    book_id: "book_1".into(),
                    name: "Room".into(),
                    voice: "default".into(),
                    play_speed: 1.0,
                    max_capacity: 8,
                    current_chapter_id: None,
                },
                Utc::now(),
            )
            .await
            .unwrap();
        room.id
    }

    #[tokio::test]
    async fn connect_racing_the_last_disconnect_stays_online() {
        for before_removal in [true, false] {
            let kv = Arc::new(InterleavedStore {
                inner: MemoryStore::new(),
                before_removal,
                fired: AtomicBool::new(false),
            });
            let f = fixture_on(kv.clone());
            let room_id = room_with_member(&f.directory, "u1").await;

            f.presence.connect("u1", "s1").await.unwrap();
            f.presence.disconnect("u1", "s1").await.unwrap();

            assert_eq!(kv.scard(&sessions_key("u1")).await.unwrap(), 1);
            assert_eq!(
                f.presence.get_status("u1").await.unwrap(),
                PresenceStatus::Online,
                "before_removal={before_removal}"
            );
            let row = f.directory.find_participant(&room_id, "u1").await.unwrap().unwrap();
            assert_eq!(row.connection_status, ConnectionStatus::Active);
        }
    }
}
