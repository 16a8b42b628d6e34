//! PostgreSQL directory on diesel-async.
//!
//! Invariants that must survive several instances writing at once are
//! backed by the schema: a partial unique index keeps one open room per
//! host, another keeps one PENDING invitation per (room, receiver), and
//! admissions lock the room row so capacity and status checks are
//! serialised.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, OptionalExtension};
use diesel_async::AsyncConnection;
use readalong_common::id::{prefix, prefixed_ulid};
use scoped_futures::ScopedFutureExt;

use super::{ChatLogRepository, InvitationRepository, ParticipantRepository, RoomRepository};
use crate::db::pool::DbPool;
use crate::db::schema::{
    books, chat_messages, friendships, invitations, libraries, participants, reward_outbox, rooms,
    users,
};
use crate::error::{ApiError, ErrorKind};
use crate::external::{LibraryCatalog, UserDirectory};
use crate::models::chat_message::{ChatMessage, ChatMessageRow};
use crate::models::invitation::{Invitation, InvitationRow, InvitationStatus};
use crate::models::outbox::{OutboxRow, RoomFinished, ROOM_FINISHED_EVENT};
use crate::models::participant::{Admission, ConnectionStatus, Participant, ParticipantRow};
use crate::models::room::{NewRoom, Room, RoomRow, RoomStatus};
use crate::models::user::{LibraryBook, UserProfile};

const ACTIVE: &str = "ACTIVE";
const DISCONNECTED: &str = "DISCONNECTED";
const ACCEPTED_FRIENDSHIP: &str = "ACCEPTED";

#[derive(Clone)]
pub struct PgDirectory {
    pool: DbPool,
}

impl PgDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &diesel::result::Error) -> bool {
    matches!(
        err,
        diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

fn rooms_from(rows: Vec<RoomRow>) -> Result<Vec<Room>, ApiError> {
    rows.into_iter().map(Room::try_from).collect()
}

fn participants_from(rows: Vec<ParticipantRow>) -> Result<Vec<Participant>, ApiError> {
    rows.into_iter().map(Participant::try_from).collect()
}

fn invitations_from(rows: Vec<InvitationRow>) -> Result<Vec<Invitation>, ApiError> {
    rows.into_iter().map(Invitation::try_from).collect()
}

fn messages_from(rows: Vec<ChatMessageRow>) -> Result<Vec<ChatMessage>, ApiError> {
    rows.into_iter().map(ChatMessage::try_from).collect()
}

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

#[async_trait]
impl RoomRepository for PgDirectory {
    async fn find_room(&self, room_id: &str) -> Result<Option<Room>, ApiError> {
        let mut conn = self.pool.get().await?;
        let row: Option<RoomRow> = diesel_async::RunQueryDsl::get_result(
            rooms::table.find(room_id).select(RoomRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(Room::try_from).transpose()
    }

    async fn find_open_room_by_host(&self, host_id: &str) -> Result<Option<Room>, ApiError> {
        let mut conn = self.pool.get().await?;
        let row: Option<RoomRow> = diesel_async::RunQueryDsl::get_result(
            rooms::table
                .filter(rooms::host_id.eq(host_id))
                .filter(rooms::deleted_at.is_null())
                .select(RoomRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(Room::try_from).transpose()
    }

    async fn list_open_rooms(&self) -> Result<Vec<Room>, ApiError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<RoomRow> = diesel_async::RunQueryDsl::load(
            rooms::table
                .filter(rooms::deleted_at.is_null())
                .order((rooms::created_at.desc(), rooms::id.desc()))
                .select(RoomRow::as_select()),
            &mut conn,
        )
        .await?;
        rooms_from(rows)
    }

    async fn create_room_with_host(
        &self,
        new_room: NewRoom,
        now: DateTime<Utc>,
    ) -> Result<(Room, Participant), ApiError> {
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

        let room_row = RoomRow::from(&room);
        let host_row = ParticipantRow::from(&host);

        let mut conn = self.pool.get().await?;
        let result = conn
            .transaction::<_, diesel::result::Error, _>(move |conn| {
                async move {
                    diesel_async::RunQueryDsl::execute(
                        diesel::insert_into(rooms::table).values(&room_row),
                        conn,
                    )
                    .await?;
                    diesel_async::RunQueryDsl::execute(
                        diesel::insert_into(participants::table).values(&host_row),
                        conn,
                    )
                    .await?;
                    Ok(())
                }
                .scope_boxed()
            })
            .await;

        match result {
            Ok(()) => Ok((room, host)),
            Err(err) if is_unique_violation(&err) => Err(ErrorKind::RoomAlreadyExists.into()),
            Err(err) => Err(err.into()),
        }
    }

    async fn update_play_speed(
        &self,
        room_id: &str,
        play_speed: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<Room>, ApiError> {
        let mut conn = self.pool.get().await?;
        let row: Option<RoomRow> = diesel_async::RunQueryDsl::get_result(
            diesel::update(
                rooms::table
                    .filter(rooms::id.eq(room_id))
                    .filter(rooms::deleted_at.is_null()),
            )
            .set((rooms::play_speed.eq(play_speed), rooms::updated_at.eq(now)))
            .returning(RoomRow::as_returning()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(Room::try_from).transpose()
    }

    async fn update_progress(
        &self,
        room_id: &str,
        chapter_id: Option<&str>,
        position: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Room>, ApiError> {
        let mut conn = self.pool.get().await?;
        let target = rooms::table
            .filter(rooms::id.eq(room_id))
            .filter(rooms::deleted_at.is_null());

        let row: Option<RoomRow> = match chapter_id {
            Some(chapter_id) => diesel_async::RunQueryDsl::get_result(
                diesel::update(target)
                    .set((
                        rooms::current_chapter_id.eq(chapter_id),
                        rooms::last_read_position.eq(position),
                        rooms::updated_at.eq(now),
                    ))
                    .returning(RoomRow::as_returning()),
                &mut conn,
            )
            .await
            .optional()?,
            None => diesel_async::RunQueryDsl::get_result(
                diesel::update(target)
                    .set((
                        rooms::last_read_position.eq(position),
                        rooms::updated_at.eq(now),
                    ))
                    .returning(RoomRow::as_returning()),
                &mut conn,
            )
            .await
            .optional()?,
        };
        row.map(Room::try_from).transpose()
    }

    async fn transition_room(
        &self,
        room_id: &str,
        from: &[RoomStatus],
        to: RoomStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Room>, ApiError> {
        let from: Vec<&'static str> = from.iter().map(|s| s.as_str()).collect();
        let deleted_at = (to == RoomStatus::Finished).then_some(now);

        let mut conn = self.pool.get().await?;
        let row: Option<RoomRow> = diesel_async::RunQueryDsl::get_result(
            diesel::update(
                rooms::table
                    .filter(rooms::id.eq(room_id))
                    .filter(rooms::deleted_at.is_null())
                    .filter(rooms::status.eq_any(from)),
            )
            .set((
                rooms::status.eq(to.as_str()),
                rooms::deleted_at.eq(deleted_at),
                rooms::updated_at.eq(now),
            ))
            .returning(RoomRow::as_returning()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(Room::try_from).transpose()
    }

    async fn finish_room(&self, room_id: &str, now: DateTime<Utc>) -> Result<Option<Room>, ApiError> {
        let room_id = room_id.to_string();
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, ApiError, _>(move |conn| {
            async move {
                let row: Option<RoomRow> = diesel_async::RunQueryDsl::get_result(
                    diesel::update(
                        rooms::table
                            .filter(rooms::id.eq(&room_id))
                            .filter(rooms::deleted_at.is_null()),
                    )
                    .set((
                        rooms::status.eq(RoomStatus::Finished.as_str()),
                        rooms::deleted_at.eq(Some(now)),
                        rooms::updated_at.eq(now),
                    ))
                    .returning(RoomRow::as_returning()),
                    conn,
                )
                .await
                .optional()?;

                let Some(row) = row else {
                    return Ok(None);
                };
                let room = Room::try_from(row)?;

                let participant_ids: Vec<String> = diesel_async::RunQueryDsl::load(
                    participants::table
                        .filter(participants::room_id.eq(&room_id))
                        .filter(participants::is_kicked.eq(false))
                        .order(participants::user_id.asc())
                        .select(participants::user_id),
                    conn,
                )
                .await?;

                let event = RoomFinished {
                    room_id: room.id.clone(),
                    host_id: room.host_id.clone(),
                    book_id: room.book_id.clone(),
                    participant_ids,
                    finished_at: now,
                };
                diesel_async::RunQueryDsl::execute(
                    diesel::insert_into(reward_outbox::table).values(OutboxRow {
                        id: prefixed_ulid(prefix::OUTBOX),
                        room_id: room.id.clone(),
                        event_type: ROOM_FINISHED_EVENT.to_string(),
                        payload: serde_json::to_value(&event)?,
                        created_at: now,
                        dispatched_at: None,
                    }),
                    conn,
                )
                .await?;

                Ok(Some(room))
            }
            .scope_boxed()
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Participants
// ---------------------------------------------------------------------------

#[async_trait]
impl ParticipantRepository for PgDirectory {
    async fn find_participant(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<Participant>, ApiError> {
        let mut conn = self.pool.get().await?;
        let row: Option<ParticipantRow> = diesel_async::RunQueryDsl::get_result(
            participants::table
                .filter(participants::room_id.eq(room_id))
                .filter(participants::user_id.eq(user_id))
                .select(ParticipantRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(Participant::try_from).transpose()
    }

    async fn list_participants(&self, room_id: &str) -> Result<Vec<Participant>, ApiError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<ParticipantRow> = diesel_async::RunQueryDsl::load(
            participants::table
                .filter(participants::room_id.eq(room_id))
                .order((participants::joined_at.asc(), participants::id.asc()))
                .select(ParticipantRow::as_select()),
            &mut conn,
        )
        .await?;
        participants_from(rows)
    }

    async fn count_seated(&self, room_id: &str) -> Result<i64, ApiError> {
        let mut conn = self.pool.get().await?;
        let count: i64 = diesel_async::RunQueryDsl::get_result(
            participants::table
                .filter(participants::room_id.eq(room_id))
                .filter(participants::connection_status.eq_any([ACTIVE, DISCONNECTED]))
                .filter(participants::is_kicked.eq(false))
                .count(),
            &mut conn,
        )
        .await?;
        Ok(count)
    }

    async fn admit_participant(
        &self,
        room_id: &str,
        user_id: &str,
        max_capacity: i32,
        now: DateTime<Utc>,
    ) -> Result<Admission, ApiError> {
        let room_id = room_id.to_string();
        let user_id = user_id.to_string();
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, ApiError, _>(move |conn| {
            async move {
                // Row lock on the room serialises admissions into it and
                // against status changes.
                let locked: Option<(String, Option<DateTime<Utc>>)> = diesel_async::RunQueryDsl::get_result(
                    rooms::table
                        .find(&room_id)
                        .select((rooms::status, rooms::deleted_at))
                        .for_update(),
                    conn,
                )
                .await
                .optional()?;
                let Some((status, deleted_at)) = locked else {
                    return Err(ErrorKind::RoomNotFound.into());
                };
                if status == RoomStatus::Finished.as_str() || deleted_at.is_some() {
                    return Ok(Admission::Finished);
                }

                let existing: Option<ParticipantRow> = diesel_async::RunQueryDsl::get_result(
                    participants::table
                        .filter(participants::room_id.eq(&room_id))
                        .filter(participants::user_id.eq(&user_id))
                        .select(ParticipantRow::as_select()),
                    conn,
                )
                .await
                .optional()?;

                match &existing {
                    Some(row) if row.is_kicked => return Ok(Admission::Kicked),
                    Some(row) if row.connection_status == ACTIVE => {
                        return Ok(Admission::Admitted(Participant::try_from(row.clone())?));
                    }
                    None if status == RoomStatus::Playing.as_str() => return Ok(Admission::Playing),
                    _ => {}
                }

                let reclaiming = existing
                    .as_ref()
                    .is_some_and(|row| row.connection_status == DISCONNECTED);
                if !reclaiming {
                    let seated: i64 = diesel_async::RunQueryDsl::get_result(
                        participants::table
                            .filter(participants::room_id.eq(&room_id))
                            .filter(participants::connection_status.eq_any([ACTIVE, DISCONNECTED]))
                            .filter(participants::is_kicked.eq(false))
                            .count(),
                        conn,
                    )
                    .await?;
                    if seated >= i64::from(max_capacity) {
                        return Ok(Admission::Full);
                    }
                }

                let row: ParticipantRow = match existing {
                    Some(row) => {
                        let reactivated: Option<ParticipantRow> = diesel_async::RunQueryDsl::get_result(
                            diesel::update(
                                participants::table
                                    .find(&row.id)
                                    .filter(participants::is_kicked.eq(false)),
                            )
                            .set((
                                participants::connection_status.eq(ACTIVE),
                                participants::updated_at.eq(now),
                            ))
                            .returning(ParticipantRow::as_returning()),
                            conn,
                        )
                        .await
                        .optional()?;
                        // Kicks take the row, not the room lock.
                        match reactivated {
                            Some(row) => row,
                            None => return Ok(Admission::Kicked),
                        }
                    }
                    None => {
                        diesel_async::RunQueryDsl::get_result(
                            diesel::insert_into(participants::table)
                                .values(ParticipantRow {
                                    id: prefixed_ulid(prefix::PARTICIPANT),
                                    room_id: room_id.clone(),
                                    user_id: user_id.clone(),
                                    joined_at: now,
                                    is_kicked: false,
                                    connection_status: ACTIVE.to_string(),
                                    updated_at: now,
                                })
                                .returning(ParticipantRow::as_returning()),
                            conn,
                        )
                        .await?
                    }
                };

                Ok(Admission::Admitted(Participant::try_from(row)?))
            }
            .scope_boxed()
        })
        .await
    }

    async fn exit_participant(
        &self,
        room_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Participant>, ApiError> {
        let mut conn = self.pool.get().await?;
        let row: Option<ParticipantRow> = diesel_async::RunQueryDsl::get_result(
            diesel::update(
                participants::table
                    .filter(participants::room_id.eq(room_id))
                    .filter(participants::user_id.eq(user_id)),
            )
            .set((
                participants::connection_status.eq(ConnectionStatus::Exited.as_str()),
                participants::updated_at.eq(now),
            ))
            .returning(ParticipantRow::as_returning()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(Participant::try_from).transpose()
    }

    async fn kick_participant(
        &self,
        room_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Participant>, ApiError> {
        let mut conn = self.pool.get().await?;
        let row: Option<ParticipantRow> = diesel_async::RunQueryDsl::get_result(
            diesel::update(
                participants::table
                    .filter(participants::room_id.eq(room_id))
                    .filter(participants::user_id.eq(user_id)),
            )
            .set((
                participants::is_kicked.eq(true),
                participants::connection_status.eq(ConnectionStatus::Exited.as_str()),
                participants::updated_at.eq(now),
            ))
            .returning(ParticipantRow::as_returning()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(Participant::try_from).transpose()
    }

    async fn disconnect_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Participant>, ApiError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<ParticipantRow> = diesel_async::RunQueryDsl::get_results(
            diesel::update(
                participants::table
                    .filter(participants::user_id.eq(user_id))
                    .filter(participants::connection_status.eq(ACTIVE)),
            )
            .set((
                participants::connection_status.eq(ConnectionStatus::Disconnected.as_str()),
                participants::updated_at.eq(now),
            ))
            .returning(ParticipantRow::as_returning()),
            &mut conn,
        )
        .await?;
        participants_from(rows)
    }
}

// ---------------------------------------------------------------------------
// Invitations
// ---------------------------------------------------------------------------

#[async_trait]
impl InvitationRepository for PgDirectory {
    async fn find_invitation(&self, invitation_id: &str) -> Result<Option<Invitation>, ApiError> {
        let mut conn = self.pool.get().await?;
        let row: Option<InvitationRow> = diesel_async::RunQueryDsl::get_result(
            invitations::table
                .find(invitation_id)
                .select(InvitationRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(Invitation::try_from).transpose()
    }

    async fn find_pending_invitation(
        &self,
        room_id: &str,
        receiver_id: &str,
    ) -> Result<Option<Invitation>, ApiError> {
        let mut conn = self.pool.get().await?;
        let row: Option<InvitationRow> = diesel_async::RunQueryDsl::get_result(
            invitations::table
                .filter(invitations::room_id.eq(room_id))
                .filter(invitations::receiver_id.eq(receiver_id))
                .filter(invitations::status.eq(InvitationStatus::Pending.as_str()))
                .select(InvitationRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(Invitation::try_from).transpose()
    }

    async fn create_invitation(
        &self,
        room_id: &str,
        sender_id: &str,
        receiver_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Invitation, ApiError> {
        let mut conn = self.pool.get().await?;
        let result: Result<InvitationRow, diesel::result::Error> =
            diesel_async::RunQueryDsl::get_result(
                diesel::insert_into(invitations::table)
                    .values(InvitationRow {
                        id: prefixed_ulid(prefix::INVITATION),
                        room_id: room_id.to_string(),
                        sender_id: sender_id.to_string(),
                        receiver_id: receiver_id.to_string(),
                        status: InvitationStatus::Pending.as_str().to_string(),
                        sent_at: now,
                        responded_at: None,
                    })
                    .returning(InvitationRow::as_returning()),
                &mut conn,
            )
            .await;

        match result {
            Ok(row) => Invitation::try_from(row),
            Err(err) if is_unique_violation(&err) => Err(ErrorKind::AlreadyInvited.into()),
            Err(err) => Err(err.into()),
        }
    }

    async fn resolve_invitation(
        &self,
        invitation_id: &str,
        to: InvitationStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, ApiError> {
        let mut conn = self.pool.get().await?;
        let row: Option<InvitationRow> = diesel_async::RunQueryDsl::get_result(
            diesel::update(
                invitations::table
                    .filter(invitations::id.eq(invitation_id))
                    .filter(invitations::status.eq(InvitationStatus::Pending.as_str())),
            )
            .set((
                invitations::status.eq(to.as_str()),
                invitations::responded_at.eq(Some(now)),
            ))
            .returning(InvitationRow::as_returning()),
            &mut conn,
        )
        .await
        .optional()?;
        row.map(Invitation::try_from).transpose()
    }

    async fn list_received(&self, receiver_id: &str) -> Result<Vec<Invitation>, ApiError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<InvitationRow> = diesel_async::RunQueryDsl::load(
            invitations::table
                .filter(invitations::receiver_id.eq(receiver_id))
                .order(invitations::sent_at.desc())
                .select(InvitationRow::as_select()),
            &mut conn,
        )
        .await?;
        invitations_from(rows)
    }

    async fn list_sent(&self, sender_id: &str) -> Result<Vec<Invitation>, ApiError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<InvitationRow> = diesel_async::RunQueryDsl::load(
            invitations::table
                .filter(invitations::sender_id.eq(sender_id))
                .order(invitations::sent_at.desc())
                .select(InvitationRow::as_select()),
            &mut conn,
        )
        .await?;
        invitations_from(rows)
    }
}

// ---------------------------------------------------------------------------
// Chat log
// ---------------------------------------------------------------------------

#[async_trait]
impl ChatLogRepository for PgDirectory {
    async fn insert_message(&self, message: ChatMessage) -> Result<ChatMessage, ApiError> {
        let mut conn = self.pool.get().await?;
        let row: ChatMessageRow = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(chat_messages::table)
                .values(ChatMessageRow::from(&message))
                .returning(ChatMessageRow::as_returning()),
            &mut conn,
        )
        .await?;
        ChatMessage::try_from(row)
    }

    async fn recent_messages(&self, room_id: &str, limit: i64) -> Result<Vec<ChatMessage>, ApiError> {
        let mut conn = self.pool.get().await?;
        let mut rows: Vec<ChatMessageRow> = diesel_async::RunQueryDsl::load(
            chat_messages::table
                .filter(chat_messages::room_id.eq(room_id))
                .order(chat_messages::id.desc())
                .limit(limit)
                .select(ChatMessageRow::as_select()),
            &mut conn,
        )
        .await?;
        rows.reverse();
        messages_from(rows)
    }

    async fn messages_before(
        &self,
        room_id: &str,
        before_id: i64,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let mut conn = self.pool.get().await?;
        let mut rows: Vec<ChatMessageRow> = diesel_async::RunQueryDsl::load(
            chat_messages::table
                .filter(chat_messages::room_id.eq(room_id))
                .filter(chat_messages::id.lt(before_id))
                .order(chat_messages::id.desc())
                .limit(limit)
                .select(ChatMessageRow::as_select()),
            &mut conn,
        )
        .await?;
        rows.reverse();
        messages_from(rows)
    }
}

// ---------------------------------------------------------------------------
// External collaborators backed by tables owned by other services
// ---------------------------------------------------------------------------

#[async_trait]
impl UserDirectory for PgDirectory {
    async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>, ApiError> {
        let mut conn = self.pool.get().await?;
        let profile = diesel_async::RunQueryDsl::get_result(
            users::table.find(user_id).select(UserProfile::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(profile)
    }

    async fn friend_ids(&self, user_id: &str) -> Result<Vec<String>, ApiError> {
        let mut conn = self.pool.get().await?;

        let mut ids: Vec<String> = diesel_async::RunQueryDsl::load(
            friendships::table
                .filter(friendships::user_id.eq(user_id))
                .filter(friendships::status.eq(ACCEPTED_FRIENDSHIP))
                .select(friendships::friend_id),
            &mut conn,
        )
        .await?;

        let reverse: Vec<String> = diesel_async::RunQueryDsl::load(
            friendships::table
                .filter(friendships::friend_id.eq(user_id))
                .filter(friendships::status.eq(ACCEPTED_FRIENDSHIP))
                .select(friendships::user_id),
            &mut conn,
        )
        .await?;

        ids.extend(reverse);
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

#[async_trait]
impl LibraryCatalog for PgDirectory {
    async fn find_library_book(&self, library_id: &str) -> Result<Option<LibraryBook>, ApiError> {
        let mut conn = self.pool.get().await?;
        let row: Option<(String, String, String, String, String)> =
            diesel_async::RunQueryDsl::get_result(
                libraries::table
                    .inner_join(books::table)
                    .filter(libraries::id.eq(library_id))
                    .select((
                        libraries::id,
                        libraries::user_id,
                        books::id,
                        books::title,
                        books::author,
                    )),
                &mut conn,
            )
            .await
            .optional()?;

        Ok(row.map(|(library_id, owner_id, book_id, title, author)| LibraryBook {
            library_id,
            owner_id,
            book_id,
            title,
            author,
        }))
    }
}
