//! In-process directory used by tests and single-instance dev runs.
//!
//! All state sits behind one `parking_lot::Mutex`, so every repository call
//! is atomic with respect to every other one.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use readalong_common::id::{prefix, prefixed_ulid};

use super::{ChatLogRepository, InvitationRepository, ParticipantRepository, RoomRepository};
use crate::error::{ApiError, ErrorKind};
use crate::models::chat_message::ChatMessage;
use crate::models::invitation::{Invitation, InvitationStatus};
use crate::models::outbox::RoomFinished;
use crate::models::participant::{Admission, ConnectionStatus, Participant};
use crate::models::room::{NewRoom, Room, RoomStatus};

#[derive(Default)]
pub(crate) struct MemoryState {
    pub(crate) rooms: HashMap<String, Room>,
    /// Keyed by (room_id, user_id).
    pub(crate) participants: HashMap<(String, String), Participant>,
    pub(crate) invitations: HashMap<String, Invitation>,
    /// room_id → id-ordered messages.
    pub(crate) messages: HashMap<String, BTreeMap<i64, ChatMessage>>,
    pub(crate) outbox: Vec<RoomFinished>,
}

#[derive(Default)]
pub struct MemoryDirectory {
    pub(crate) state: Mutex<MemoryState>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reward outbox entries recorded so far.
    pub fn finished_rooms(&self) -> Vec<RoomFinished> {
        self.state.lock().outbox.clone()
    }
}

fn seated_count(state: &MemoryState, room_id: &str) -> i64 {
    state
        .participants
        .values()
        .filter(|p| p.room_id == room_id && p.holds_seat())
        .count() as i64
}

fn key(room_id: &str, user_id: &str) -> (String, String) {
    (room_id.to_string(), user_id.to_string())
}

#[async_trait]
impl RoomRepository for MemoryDirectory {
    async fn find_room(&self, room_id: &str) -> Result<Option<Room>, ApiError> {
        Ok(self.state.lock().rooms.get(room_id).cloned())
    }

    async fn find_open_room_by_host(&self, host_id: &str) -> Result<Option<Room>, ApiError> {
        Ok(self
            .state
            .lock()
            .rooms
            .values()
            .find(|r| r.host_id == host_id && !r.is_finished())
            .cloned())
    }

    async fn list_open_rooms(&self) -> Result<Vec<Room>, ApiError> {
        let mut rooms: Vec<Room> = self
            .state
            .lock()
            .rooms
            .values()
            .filter(|r| !r.is_finished())
            .cloned()
            .collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(rooms)
    }

    async fn create_room_with_host(
        &self,
        new_room: NewRoom,
        now: DateTime<Utc>,
    ) -> Result<(Room, Participant), ApiError> {
        let mut state = self.state.lock();

        if state
            .rooms
            .values()
            .any(|r| r.host_id == new_room.host_id && !r.is_finished())
        {
            return Err(ErrorKind::RoomAlreadyExists.into());
        }

        let room = Room {
            id: prefixed_ulid(prefix::ROOM),
            host_id: new_room.host_id,
            library_id: new_room.library_id,
            book_id: new_room.book_id,
            name: new_room.name,
            voice: new_room.voice,
            play_speed: new_room.play_speed,
            max_capacity: new_room.max_capacity,
            status: RoomStatus::Waiting,
            current_chapter_id: new_room.current_chapter_id,
            last_read_position: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let host = Participant {
            id: prefixed_ulid(prefix::PARTICIPANT),
            room_id: room.id.clone(),
            user_id: room.host_id.clone(),
            joined_at: now,
            is_kicked: false,
            connection_status: ConnectionStatus::Active,
            updated_at: now,
        };

        state.rooms.insert(room.id.clone(), room.clone());
        state
            .participants
            .insert(key(&room.id, &host.user_id), host.clone());
        Ok((room, host))
    }

    async fn update_play_speed(
        &self,
        room_id: &str,
        play_speed: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<Room>, ApiError> {
        let mut state = self.state.lock();
        Ok(state
            .rooms
            .get_mut(room_id)
            .filter(|r| !r.is_finished())
            .map(|room| {
                room.play_speed = play_speed;
                room.updated_at = now;
                room.clone()
            }))
    }

    async fn update_progress(
        &self,
        room_id: &str,
        chapter_id: Option<&str>,
        position: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Room>, ApiError> {
        let mut state = self.state.lock();
        Ok(state
            .rooms
            .get_mut(room_id)
            .filter(|r| !r.is_finished())
            .map(|room| {
                if let Some(chapter_id) = chapter_id {
                    room.current_chapter_id = Some(chapter_id.to_string());
                }
                room.last_read_position = position;
                room.updated_at = now;
                room.clone()
            }))
    }

    async fn transition_room(
        &self,
        room_id: &str,
        from: &[RoomStatus],
        to: RoomStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Room>, ApiError> {
        let mut state = self.state.lock();
        Ok(state
            .rooms
            .get_mut(room_id)
            .filter(|r| from.contains(&r.status) && r.deleted_at.is_none())
            .map(|room| {
                room.status = to;
                if to == RoomStatus::Finished {
                    room.deleted_at = Some(now);
                }
                room.updated_at = now;
                room.clone()
            }))
    }

    async fn finish_room(&self, room_id: &str, now: DateTime<Utc>) -> Result<Option<Room>, ApiError> {
        let mut state = self.state.lock();

        let Some(room) = state.rooms.get_mut(room_id).filter(|r| !r.is_finished()) else {
            return Ok(None);
        };
        room.status = RoomStatus::Finished;
        room.deleted_at = Some(now);
        room.updated_at = now;
        let room = room.clone();

        let mut participant_ids: Vec<String> = state
            .participants
            .values()
            .filter(|p| p.room_id == room.id && !p.is_kicked)
            .map(|p| p.user_id.clone())
            .collect();
        participant_ids.sort();

        state.outbox.push(RoomFinished {
            room_id: room.id.clone(),
            host_id: room.host_id.clone(),
            book_id: room.book_id.clone(),
            participant_ids,
            finished_at: now,
        });
        Ok(Some(room))
    }
}

#[async_trait]
impl ParticipantRepository for MemoryDirectory {
    async fn find_participant(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<Participant>, ApiError> {
        Ok(self.state.lock().participants.get(&key(room_id, user_id)).cloned())
    }

    async fn list_participants(&self, room_id: &str) -> Result<Vec<Participant>, ApiError> {
        let mut list: Vec<Participant> = self
            .state
            .lock()
            .participants
            .values()
            .filter(|p| p.room_id == room_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn count_seated(&self, room_id: &str) -> Result<i64, ApiError> {
        Ok(seated_count(&self.state.lock(), room_id))
    }

    async fn admit_participant(
        &self,
        room_id: &str,
        user_id: &str,
        max_capacity: i32,
        now: DateTime<Utc>,
    ) -> Result<Admission, ApiError> {
        let mut state = self.state.lock();
        let k = key(room_id, user_id);

        let Some(room) = state.rooms.get(room_id) else {
            return Err(ErrorKind::RoomNotFound.into());
        };
        if room.is_finished() {
            return Ok(Admission::Finished);
        }
        let playing = room.status == RoomStatus::Playing;

        let existing = state.participants.get(&k);
        match existing {
            Some(p) if p.is_kicked => return Ok(Admission::Kicked),
            Some(p) if p.is_active() => return Ok(Admission::Admitted(p.clone())),
            None if playing => return Ok(Admission::Playing),
            _ => {}
        }

        let reclaiming = existing.is_some_and(Participant::holds_seat);
        if !reclaiming && seated_count(&state, room_id) >= i64::from(max_capacity) {
            return Ok(Admission::Full);
        }

        let participant = state
            .participants
            .entry(k)
            .and_modify(|p| {
                p.connection_status = ConnectionStatus::Active;
                p.updated_at = now;
            })
            .or_insert_with(|| Participant {
                id: prefixed_ulid(prefix::PARTICIPANT),
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
                joined_at: now,
                is_kicked: false,
                connection_status: ConnectionStatus::Active,
                updated_at: now,
            })
            .clone();
        Ok(Admission::Admitted(participant))
    }

    async fn exit_participant(
        &self,
        room_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Participant>, ApiError> {
        let mut state = self.state.lock();
        Ok(state.participants.get_mut(&key(room_id, user_id)).map(|p| {
            p.connection_status = ConnectionStatus::Exited;
            p.updated_at = now;
            p.clone()
        }))
    }

    async fn kick_participant(
        &self,
        room_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Participant>, ApiError> {
        let mut state = self.state.lock();
        Ok(state.participants.get_mut(&key(room_id, user_id)).map(|p| {
            p.is_kicked = true;
            p.connection_status = ConnectionStatus::Exited;
            p.updated_at = now;
            p.clone()
        }))
    }

    async fn disconnect_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Participant>, ApiError> {
        let mut state = self.state.lock();
        Ok(state
            .participants
            .values_mut()
            .filter(|p| p.user_id == user_id && p.is_active())
            .map(|p| {
                p.connection_status = ConnectionStatus::Disconnected;
                p.updated_at = now;
                p.clone()
            })
            .collect())
    }
}

#[async_trait]
impl InvitationRepository for MemoryDirectory {
    async fn find_invitation(&self, invitation_id: &str) -> Result<Option<Invitation>, ApiError> {
        Ok(self.state.lock().invitations.get(invitation_id).cloned())
    }

    async fn find_pending_invitation(
        &self,
        room_id: &str,
        receiver_id: &str,
    ) -> Result<Option<Invitation>, ApiError> {
        Ok(self
            .state
            .lock()
            .invitations
            .values()
            .find(|inv| {
                inv.room_id == room_id
                    && inv.receiver_id == receiver_id
                    && inv.status == InvitationStatus::Pending
            })
            .cloned())
    }

    async fn create_invitation(
        &self,
        room_id: &str,
        sender_id: &str,
        receiver_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Invitation, ApiError> {
        let mut state = self.state.lock();

        if state.invitations.values().any(|inv| {
            inv.room_id == room_id
                && inv.receiver_id == receiver_id
                && inv.status == InvitationStatus::Pending
        }) {
            return Err(ErrorKind::AlreadyInvited.into());
        }

        let invitation = Invitation {
            id: prefixed_ulid(prefix::INVITATION),
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            status: InvitationStatus::Pending,
            sent_at: now,
            responded_at: None,
        };
        state
            .invitations
            .insert(invitation.id.clone(), invitation.clone());
        Ok(invitation)
    }

    async fn resolve_invitation(
        &self,
        invitation_id: &str,
        to: InvitationStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, ApiError> {
        let mut state = self.state.lock();
        Ok(state
            .invitations
            .get_mut(invitation_id)
            .filter(|inv| inv.status == InvitationStatus::Pending)
            .map(|inv| {
                inv.status = to;
                inv.responded_at = Some(now);
                inv.clone()
            }))
    }

    async fn list_received(&self, receiver_id: &str) -> Result<Vec<Invitation>, ApiError> {
        let mut list: Vec<Invitation> = self
            .state
            .lock()
            .invitations
            .values()
            .filter(|inv| inv.receiver_id == receiver_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(list)
    }

    async fn list_sent(&self, sender_id: &str) -> Result<Vec<Invitation>, ApiError> {
        let mut list: Vec<Invitation> = self
            .state
            .lock()
            .invitations
            .values()
            .filter(|inv| inv.sender_id == sender_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(list)
    }
}

#[async_trait]
impl ChatLogRepository for MemoryDirectory {
    async fn insert_message(&self, message: ChatMessage) -> Result<ChatMessage, ApiError> {
        self.state
            .lock()
            .messages
            .entry(message.room_id.clone())
            .or_default()
            .insert(message.id, message.clone());
        Ok(message)
    }

    async fn recent_messages(&self, room_id: &str, limit: i64) -> Result<Vec<ChatMessage>, ApiError> {
        let state = self.state.lock();
        let Some(log) = state.messages.get(room_id) else {
            return Ok(Vec::new());
        };
        let mut page: Vec<ChatMessage> = log.values().rev().take(limit.max(0) as usize).cloned().collect();
        page.reverse();
        Ok(page)
    }

    async fn messages_before(
        &self,
        room_id: &str,
        before_id: i64,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let state = self.state.lock();
        let Some(log) = state.messages.get(room_id) else {
            return Ok(Vec::new());
        };
        let mut page: Vec<ChatMessage> = log
            .range(..before_id)
            .rev()
            .take(limit.max(0) as usize)
            .map(|(_, m)| m.clone())
            .collect();
        page.reverse();
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat_message::ChatMessageType;
    use crate::models::room::{DEFAULT_PLAY_SPEED, DEFAULT_VOICE};

    fn new_room(host: &str, capacity: i32) -> NewRoom {
        NewRoom {
            host_id: host.to_string(),
            library_id: "lib_1".into(),
            book_id: "book_1".into(),
            name: "Room".into(),
            voice: DEFAULT_VOICE.into(),
            play_speed: DEFAULT_PLAY_SPEED,
            max_capacity: capacity,
            current_chapter_id: None,
        }
    }

    #[tokio::test]
    async fn second_open_room_for_host_is_rejected() {
        let dir = MemoryDirectory::new();
        dir.create_room_with_host(new_room("host", 4), Utc::now()).await.unwrap();
        let err = dir
            .create_room_with_host(new_room("host", 4), Utc::now())
            .await
            .unwrap_err();
        assert!(err.is(ErrorKind::RoomAlreadyExists));
    }

    #[tokio::test]
    async fn admission_respects_capacity_and_kicks() {
        let dir = MemoryDirectory::new();
        let (room, _) = dir.create_room_with_host(new_room("host", 2), Utc::now()).await.unwrap();

        assert!(matches!(
            dir.admit_participant(&room.id, "b", 2, Utc::now()).await.unwrap(),
            Admission::Admitted(_)
        ));
        assert_eq!(
            dir.admit_participant(&room.id, "c", 2, Utc::now()).await.unwrap(),
            Admission::Full
        );

        dir.kick_participant(&room.id, "b", Utc::now()).await.unwrap();
        assert_eq!(
            dir.admit_participant(&room.id, "b", 2, Utc::now()).await.unwrap(),
            Admission::Kicked
        );
        assert_eq!(dir.count_seated(&room.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn disconnected_member_keeps_their_seat() {
        let dir = MemoryDirectory::new();
        let (room, _) = dir.create_room_with_host(new_room("host", 2), Utc::now()).await.unwrap();
        dir.admit_participant(&room.id, "b", 2, Utc::now()).await.unwrap();
        dir.disconnect_user("b", Utc::now()).await.unwrap();

        assert_eq!(dir.count_seated(&room.id).await.unwrap(), 2);
        assert_eq!(
            dir.admit_participant(&room.id, "c", 2, Utc::now()).await.unwrap(),
            Admission::Full
        );
        assert!(matches!(
            dir.admit_participant(&room.id, "b", 2, Utc::now()).await.unwrap(),
            Admission::Admitted(p) if p.is_active()
        ));
    }

    #[tokio::test]
    async fn exited_member_needs_a_free_seat() {
        let dir = MemoryDirectory::new();
        let (room, _) = dir.create_room_with_host(new_room("host", 2), Utc::now()).await.unwrap();
        dir.admit_participant(&room.id, "b", 2, Utc::now()).await.unwrap();
        dir.exit_participant(&room.id, "b", Utc::now()).await.unwrap();
        dir.admit_participant(&room.id, "c", 2, Utc::now()).await.unwrap();

        assert_eq!(
            dir.admit_participant(&room.id, "b", 2, Utc::now()).await.unwrap(),
            Admission::Full
        );
    }

    #[tokio::test]
    async fn admission_rereads_room_status() {
        let dir = MemoryDirectory::new();
        let (room, _) = dir.create_room_with_host(new_room("host", 4), Utc::now()).await.unwrap();
        dir.admit_participant(&room.id, "b", 4, Utc::now()).await.unwrap();
        dir.disconnect_user("b", Utc::now()).await.unwrap();
        dir.transition_room(&room.id, &[RoomStatus::Waiting], RoomStatus::Playing, Utc::now())
            .await
            .unwrap();

        assert_eq!(
            dir.admit_participant(&room.id, "late", 4, Utc::now()).await.unwrap(),
            Admission::Playing
        );
        assert!(matches!(
            dir.admit_participant(&room.id, "b", 4, Utc::now()).await.unwrap(),
            Admission::Admitted(_)
        ));

        dir.finish_room(&room.id, Utc::now()).await.unwrap();
        assert_eq!(
            dir.admit_participant(&room.id, "b", 4, Utc::now()).await.unwrap(),
            Admission::Finished
        );
        assert!(dir
            .admit_participant("room_missing", "b", 4, Utc::now())
            .await
            .unwrap_err()
            .is(ErrorKind::RoomNotFound));
    }

    #[tokio::test]
    async fn transition_is_guarded_by_source_state() {
        let dir = MemoryDirectory::new();
        let (room, _) = dir.create_room_with_host(new_room("host", 2), Utc::now()).await.unwrap();

        let paused = dir
            .transition_room(&room.id, &[RoomStatus::Playing], RoomStatus::Paused, Utc::now())
            .await
            .unwrap();
        assert!(paused.is_none());

        let playing = dir
            .transition_room(&room.id, &[RoomStatus::Waiting], RoomStatus::Playing, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(playing.status, RoomStatus::Playing);
    }

    #[tokio::test]
    async fn finish_records_outbox_once() {
        let dir = MemoryDirectory::new();
        let (room, _) = dir.create_room_with_host(new_room("host", 4), Utc::now()).await.unwrap();
        dir.admit_participant(&room.id, "b", 4, Utc::now()).await.unwrap();
        dir.admit_participant(&room.id, "c", 4, Utc::now()).await.unwrap();
        dir.kick_participant(&room.id, "c", Utc::now()).await.unwrap();

        let finished = dir.finish_room(&room.id, Utc::now()).await.unwrap().unwrap();
        assert_eq!(finished.status, RoomStatus::Finished);
        assert!(finished.deleted_at.is_some());
        assert!(dir.finish_room(&room.id, Utc::now()).await.unwrap().is_none());

        let outbox = dir.finished_rooms();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].participant_ids, vec!["b".to_string(), "host".to_string()]);
    }

    #[tokio::test]
    async fn history_pages_are_oldest_first() {
        let dir = MemoryDirectory::new();
        for id in 1..=5 {
            dir.insert_message(ChatMessage {
                id,
                room_id: "room".into(),
                sender_id: "u".into(),
                message_type: ChatMessageType::Text,
                content: format!("m{id}"),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }

        let recent: Vec<i64> = dir.recent_messages("room", 2).await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(recent, vec![4, 5]);

        let older: Vec<i64> = dir.messages_before("room", 4, 2).await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(older, vec![2, 3]);

        assert!(dir.messages_before("room", 1, 50).await.unwrap().is_empty());
        assert!(dir.recent_messages("other", 50).await.unwrap().is_empty());
    }
}
