//! Identity types for STRATA owners

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Owner identifier. Generated ids are UUIDv4 strings; caller-supplied ids
/// may be any non-empty text.
pub type OwnerId = String;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new random owner id.
pub fn new_owner_id() -> OwnerId {
    Uuid::new_v4().to_string()
}

/// Source of candidate owner ids for the create handler.
///
/// Candidates are not assumed unique; the create handler checks each one
/// against the Registry and the ids already claimed in the same call.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> OwnerId;
}

/// Default generator backed by UUIDv4.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self) -> OwnerId {
        new_owner_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_ids_parse_as_uuid() {
        let id = RandomIdGenerator.next_id();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_ne!(id, RandomIdGenerator.next_id());
    }
}
