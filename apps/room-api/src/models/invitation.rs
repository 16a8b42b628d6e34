use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::schema::invitations;
use crate::error::ApiError;

/// How long an invitation stays answerable.
pub const INVITATION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "ACCEPTED" => Some(Self::Accepted),
            "REJECTED" => Some(Self::Rejected),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Invitation {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: InvitationStatus,
    pub sent_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl Invitation {
    /// Expiry is only ever evaluated when someone acts on the invitation.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.sent_at + Duration::hours(INVITATION_TTL_HOURS)
    }
}

// ---------------------------------------------------------------------------
// Database row
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = invitations)]
pub struct InvitationRow {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: String,
    pub sent_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl TryFrom<InvitationRow> for Invitation {
    type Error = ApiError;

    fn try_from(row: InvitationRow) -> Result<Self, Self::Error> {
        let status = InvitationStatus::parse(&row.status).ok_or_else(|| {
            tracing::error!(invitation_id = %row.id, status = %row.status, "unknown invitation status");
            ApiError::internal("Corrupt invitation status")
        })?;
        Ok(Invitation {
            id: row.id,
            room_id: row.room_id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            status,
            sent_at: row.sent_at,
            responded_at: row.responded_at,
        })
    }
}

impl From<&Invitation> for InvitationRow {
    fn from(inv: &Invitation) -> Self {
        InvitationRow {
            id: inv.id.clone(),
            room_id: inv.room_id.clone(),
            sender_id: inv.sender_id.clone(),
            receiver_id: inv.receiver_id.clone(),
            status: inv.status.as_str().to_string(),
            sent_at: inv.sent_at,
            responded_at: inv.responded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invitation(sent_at: DateTime<Utc>) -> Invitation {
        Invitation {
            id: "inv_1".into(),
            room_id: "room_1".into(),
            sender_id: "host".into(),
            receiver_id: "guest".into(),
            status: InvitationStatus::Pending,
            sent_at,
            responded_at: None,
        }
    }

    #[test]
    fn expiry_is_strictly_after_ttl() {
        let t0 = Utc::now();
        let inv = invitation(t0);
        assert!(!inv.is_expired_at(t0 + Duration::hours(23)));
        assert!(!inv.is_expired_at(t0 + Duration::hours(24)));
        assert!(inv.is_expired_at(t0 + Duration::hours(24) + Duration::seconds(1)));
        assert!(inv.is_expired_at(t0 + Duration::hours(25)));
    }
}
