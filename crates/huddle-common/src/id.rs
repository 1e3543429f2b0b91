/// A fresh user id, as assigned by the relay to each connection.
///
/// Ids are lowercase hyphenated UUIDs, so two of them always differ and
/// compare consistently byte by byte on every client. Voice peers rely on
/// that ordering to pick which side of a pair yields on offer collision.
pub fn new_user_id() -> String {
    uuid::Uuid::new_v4().hyphenated().to_string()
}
