use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = readalong_common::id::prefixed_ulid("room");
/// assert!(id.starts_with("room_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const USER: &str = "usr";
    pub const ROOM: &str = "room";
    pub const PARTICIPANT: &str = "part";
    pub const INVITATION: &str = "inv";
    pub const GATEWAY_SESSION: &str = "gw";
    pub const OUTBOX: &str = "obx";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_ulid_format() {
        let id = prefixed_ulid(prefix::ROOM);
        assert!(id.starts_with("room_"));
        assert_eq!(id.len(), "room_".len() + 26);
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(prefixed_ulid("inv"), prefixed_ulid("inv"));
    }
}
