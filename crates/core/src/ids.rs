//! Typed identifiers for every NWD entity.
//!
//! All identifiers wrap a canonical [`ShardableUuid`], so they serialise as 32 lowercase hex
//! characters and can derive sharded storage paths. Distinct types keep a `RequestId` from being
//! passed where an `EnrollmentId` is expected.

use crate::error::{CoreError, CoreResult};
use nwd_uuid::ShardableUuid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(ShardableUuid);

        impl $name {
            /// Allocates a fresh random identifier.
            pub fn new() -> Self {
                Self(ShardableUuid::new())
            }

            /// Parses a canonical (32 lowercase hex) identifier.
            ///
            /// # Errors
            ///
            /// Returns [`CoreError::InvalidInput`] naming the identifier kind when `input` is
            /// not canonical.
            pub fn parse(input: &str) -> CoreResult<Self> {
                ShardableUuid::parse(input.trim())
                    .map(Self)
                    .map_err(|e| CoreError::InvalidInput(format!("{} id: {}", $label, e)))
            }

            pub fn shardable(&self) -> &ShardableUuid {
                &self.0
            }

            pub const fn label() -> &'static str {
                $label
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<ShardableUuid> for $name {
            fn from(value: ShardableUuid) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

entity_id!(
    /// A person: candidate, student, learning coach, assessor or administrator.
    PersonId,
    "person"
);
entity_id!(CurriculumId, "curriculum");
entity_id!(ModuleId, "module");
entity_id!(CompetencyId, "competency");
entity_id!(
    /// Equipment variant (boat type) a student is enrolled for.
    GearTypeId,
    "gear type"
);
entity_id!(
    /// A student's binding to one curriculum and gear type.
    EnrollmentId,
    "enrollment"
);
entity_id!(
    /// A competency-assessment (PvB) request.
    RequestId,
    "request"
);
entity_id!(
    /// A kerntaak-onderdeel: an assessable sub-component of a request.
    TaskUnitId,
    "task unit"
);
entity_id!(CertificateId, "certificate");
entity_id!(QualificationId, "qualification");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names_the_identifier_kind() {
        let err = RequestId::parse("not-an-id").unwrap_err();
        match err {
            CoreError::InvalidInput(msg) => assert!(msg.starts_with("request id:")),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn parse_trims_surrounding_whitespace() {
        let id = EnrollmentId::parse(" 550e8400e29b41d4a716446655440000 ").unwrap();
        assert_eq!(id.to_string(), "550e8400e29b41d4a716446655440000");
    }

    #[test]
    fn serialises_transparently() {
        let id = CertificateId::parse("550e8400e29b41d4a716446655440000").unwrap();
        let yaml = serde_yaml::to_string(&id).unwrap();
        assert!(yaml.contains("550e8400e29b41d4a716446655440000"));
        let back: CertificateId = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, id);
    }
}
