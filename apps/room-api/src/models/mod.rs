pub mod chat_message;
pub mod invitation;
pub mod outbox;
pub mod participant;
pub mod room;
pub mod user;

use serde::Serializer;

/// Serialize 64-bit snowflake ids as strings so browser clients keep full
/// precision when reconciling messages by id.
pub fn serialize_id_str<S: Serializer>(id: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(id)
}
