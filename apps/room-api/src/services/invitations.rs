//! Time-boxed room invitations.
//!
//! Expiry is lazy: an invitation older than 24h stays PENDING in storage
//! until someone acts on it, at which point it is marked EXPIRED.

use std::sync::Arc;

use chrono::Utc;

use crate::broker::{publish_event, Broker, Topic};
use crate::directory::Directory;
use crate::error::{ApiError, ErrorKind};
use crate::gateway::events::EventName;
use crate::guards;
use crate::models::invitation::{Invitation, InvitationStatus};
use crate::models::participant::Participant;
use crate::models::room::RoomStatus;

use super::rooms::RoomService;

#[derive(Clone)]
pub struct InvitationService {
    directory: Directory,
    rooms: RoomService,
    broker: Arc<dyn Broker>,
}

impl InvitationService {
    pub fn new(directory: Directory, rooms: RoomService, broker: Arc<dyn Broker>) -> Self {
        Self {
            directory,
            rooms,
            broker,
        }
    }

    pub async fn invite(&self, room_id: &str, host_id: &str, target_id: &str) -> Result<Invitation, ApiError> {
        let room = guards::load_hosted_room(self.directory.rooms.as_ref(), room_id, host_id).await?;
        if target_id == host_id {
            return Err(ApiError::bad_request("The host cannot invite themselves"));
        }
        if room.status == RoomStatus::Playing {
            return Err(ErrorKind::InvitationNotAllowedPlaying.into());
        }
        if self.directory.participants.count_seated(room_id).await? >= i64::from(room.max_capacity) {
            return Err(ErrorKind::InvitationNotAllowedFull.into());
        }

        let now = Utc::now();
        if let Some(pending) = self
            .directory
            .invitations
            .find_pending_invitation(room_id, target_id)
            .await?
        {
            if !pending.is_expired_at(now) {
                return Err(ErrorKind::AlreadyInvited.into());
            }
            // A stale invitation must not block a fresh one.
            self.directory
                .invitations
                .resolve_invitation(&pending.id, InvitationStatus::Expired, now)
                .await?;
        }

        let invitation = self
            .directory
            .invitations
            .create_invitation(room_id, host_id, target_id, now)
            .await?;

        tracing::info!(invitation_id = %invitation.id, %room_id, %target_id, "invitation sent");
        publish_event(
            self.broker.as_ref(),
            &Topic::user_notification(target_id),
            EventName::INVITATION_RECEIVED,
            &invitation,
        )
        .await;
        Ok(invitation)
    }

    /// Accept, then enter the room through the normal entry rules.
    pub async fn accept(&self, invitation_id: &str, user_id: &str) -> Result<Participant, ApiError> {
        let invitation = self.claim(invitation_id, user_id, InvitationStatus::Accepted).await?;
        tracing::info!(%invitation_id, room_id = %invitation.room_id, %user_id, "invitation accepted");
        self.rooms.enter_room(&invitation.room_id, user_id).await
    }

    pub async fn reject(&self, invitation_id: &str, user_id: &str) -> Result<Invitation, ApiError> {
        let invitation = self.claim(invitation_id, user_id, InvitationStatus::Rejected).await?;
        tracing::info!(%invitation_id, %user_id, "invitation rejected");
        Ok(invitation)
    }

    pub async fn list_received(&self, user_id: &str) -> Result<Vec<Invitation>, ApiError> {
        self.directory.invitations.list_received(user_id).await
    }

    pub async fn list_sent(&self, user_id: &str) -> Result<Vec<Invitation>, ApiError> {
        self.directory.invitations.list_sent(user_id).await
    }

    /// Ownership, then PENDING-and-fresh, then a guarded move to `to`.
    async fn claim(&self, invitation_id: &str, user_id: &str, to: InvitationStatus) -> Result<Invitation, ApiError> {
        let invitation = self
            .directory
            .invitations
            .find_invitation(invitation_id)
            .await?
            .ok_or(ErrorKind::InvitationNotFound)?;

        if invitation.receiver_id != user_id {
            return Err(ErrorKind::NotYourInvitation.into());
        }
        if invitation.status != InvitationStatus::Pending {
            return Err(ErrorKind::InvitationExpired.into());
        }

        let now = Utc::now();
        if invitation.is_expired_at(now) {
            self.directory
                .invitations
                .resolve_invitation(invitation_id, InvitationStatus::Expired, now)
                .await?;
            return Err(ErrorKind::InvitationExpired.into());
        }

        // Someone else may have consumed it since we read it.
        self.directory
            .invitations
            .resolve_invitation(invitation_id, to, now)
            .await?
            .ok_or_else(|| ErrorKind::InvitationExpired.into())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::services::testing::Fixture;

    #[tokio::test]
    async fn invitation_older_than_a_day_cannot_be_accepted() {
        let f = Fixture::new();
        let room = f.room_hosted_by("host").await;
        let invitation = f
            .invitations
            .invite(&room.id, "host", "guest")
            .await
            .unwrap();

        f.memory
            .state
            .lock()
            .invitations
            .get_mut(&invitation.id)
            .unwrap()
            .sent_at = Utc::now() - Duration::hours(25);

        let err = f.invitations.accept(&invitation.id, "guest").await.unwrap_err();
        assert!(err.is(ErrorKind::InvitationExpired));

        let stored = f
            .directory
            .invitations
            .find_invitation(&invitation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, InvitationStatus::Expired);
        assert!(f
            .directory
            .participants
            .find_participant(&room.id, "guest")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn stale_pending_invitation_does_not_block_a_new_one() {
        let f = Fixture::new();
        let room = f.room_hosted_by("host").await;
        let first = f.invitations.invite(&room.id, "host", "guest").await.unwrap();

        let err = f.invitations.invite(&room.id, "host", "guest").await.unwrap_err();
        assert!(err.is(ErrorKind::AlreadyInvited));

        f.memory
            .state
            .lock()
            .invitations
            .get_mut(&first.id)
            .unwrap()
            .sent_at = Utc::now() - Duration::hours(25);

        let second = f.invitations.invite(&room.id, "host", "guest").await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn only_the_receiver_may_answer() {
        let f = Fixture::new();
        let room = f.room_hosted_by("host").await;
        let invitation = f.invitations.invite(&room.id, "host", "guest").await.unwrap();

        let err = f.invitations.reject(&invitation.id, "stranger").await.unwrap_err();
        assert!(err.is(ErrorKind::NotYourInvitation));

        f.invitations.reject(&invitation.id, "guest").await.unwrap();
        let err = f.invitations.accept(&invitation.id, "guest").await.unwrap_err();
        assert!(err.is(ErrorKind::InvitationExpired));
    }

    #[tokio::test]
    async fn accepting_goes_through_entry_rules() {
        let f = Fixture::new();
        let room = f.room_hosted_by("host").await;
        let invitation = f.invitations.invite(&room.id, "host", "guest").await.unwrap();

        f.rooms.start_reading(&room.id, "host").await.unwrap();

        let err = f.invitations.accept(&invitation.id, "guest").await.unwrap_err();
        assert!(err.is(ErrorKind::RoomIsPlaying));
    }

    #[tokio::test]
    async fn no_invitations_while_playing_or_full() {
        let f = Fixture::new();
        let room = f.room_with_capacity("host", 2).await;

        f.rooms.enter_room(&room.id, "u2").await.unwrap();
        let err = f.invitations.invite(&room.id, "host", "u3").await.unwrap_err();
        assert!(err.is(ErrorKind::InvitationNotAllowedFull));

        f.rooms.leave_room(&room.id, "u2").await.unwrap();
        f.rooms.start_reading(&room.id, "host").await.unwrap();
        let err = f.invitations.invite(&room.id, "host", "u3").await.unwrap_err();
        assert!(err.is(ErrorKind::InvitationNotAllowedPlaying));

        let err = f.invitations.invite(&room.id, "u2", "u3").await.unwrap_err();
        assert!(err.is(ErrorKind::NotHost));
    }
}
