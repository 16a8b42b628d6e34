use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::schema::reward_outbox;

pub const ROOM_FINISHED_EVENT: &str = "room_finished";

/// Payload recorded when a room finishes; the external credit service reads
/// it to distribute reading rewards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomFinished {
    pub room_id: String,
    pub host_id: String,
    pub book_id: String,
    pub participant_ids: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = reward_outbox)]
pub struct OutboxRow {
    pub id: String,
    pub room_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}
