//! Record identifier generation.

use crate::RecordId;
use std::fmt::Debug;
use uuid::Uuid;

/// Produces identifiers for records created without one.
pub trait IdGenerator: Debug + Send + Sync {
    /// Generate a new unique identifier.
    fn generate(&self) -> RecordId;
}

/// Random UUIDv4 identifiers in hyphenated form.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> RecordId {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_distinct_uuids() {
        let generator = UuidGenerator;
        let a = generator.generate();
        let b = generator.generate();

        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
        assert!(Uuid::parse_str(&b).is_ok());
    }

    #[test]
    fn generates_hyphenated_v4() {
        let id = UuidGenerator.generate();
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);

        let parsed = Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }
}
