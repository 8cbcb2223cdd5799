//! Issued certificates (diplomas).

use crate::ids::{CertificateId, CompetencyId, CurriculumId, EnrollmentId, GearTypeId, PersonId};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    /// Globally unique, immutable once assigned.
    pub handle: String,
    pub enrollment: EnrollmentId,
    pub person: PersonId,
    pub curriculum: CurriculumId,
    pub gear_type: GearTypeId,
    pub issued_at: DateTime<Utc>,
    /// `None` means visible immediately.
    #[serde(default)]
    pub visible_from: Option<DateTime<Utc>>,
    pub verification_code: String,
    /// Competencies completed at the moment of issuance.
    #[serde(default)]
    pub completed_competencies: BTreeSet<CompetencyId>,
}

impl Certificate {
    /// Student-facing visibility. Verification ignores this.
    pub fn is_visible_at(&self, now: DateTime<Utc>) -> bool {
        self.visible_from.is_none_or(|from| from <= now)
    }

    /// Whether `code` matches this certificate's verification code (case-insensitive hex).
    pub fn matches_code(&self, code: &str) -> bool {
        self.verification_code.eq_ignore_ascii_case(code.trim())
    }
}

/// SHA-256 over the certificate's identity, hex encoded.
///
/// The code binds the handle to the holder and issuance moment; any change to those fields
/// yields a different code.
pub fn verification_code(
    id: CertificateId,
    handle: &str,
    enrollment: EnrollmentId,
    person: PersonId,
    issued_at: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"nwd-certificate:v1\n");
    for part in [
        id.to_string(),
        handle.to_string(),
        enrollment.to_string(),
        person.to_string(),
        issued_at.to_rfc3339_opts(SecondsFormat::Micros, true),
    ] {
        hasher.update(part.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn certificate(visible_from: Option<DateTime<Utc>>) -> Certificate {
        let id = CertificateId::new();
        let enrollment = EnrollmentId::new();
        let person = PersonId::new();
        let issued_at = Utc::now();
        Certificate {
            id,
            handle: "ABCDEFGH23".into(),
            enrollment,
            person,
            curriculum: CurriculumId::new(),
            gear_type: GearTypeId::new(),
            issued_at,
            visible_from,
            verification_code: verification_code(id, "ABCDEFGH23", enrollment, person, issued_at),
            completed_competencies: BTreeSet::new(),
        }
    }

    #[test]
    fn verification_code_is_sha256_hex() {
        let c = certificate(None);
        assert_eq!(c.verification_code.len(), 64);
        assert!(c.matches_code(&c.verification_code.to_uppercase()));
    }

    #[test]
    fn code_changes_with_handle() {
        let c = certificate(None);
        let other = verification_code(c.id, "ABCDEFGH24", c.enrollment, c.person, c.issued_at);
        assert_ne!(c.verification_code, other);
    }

    #[test]
    fn delayed_visibility() {
        let now = Utc::now();
        let c = certificate(Some(now + Duration::hours(2)));
        assert!(!c.is_visible_at(now));
        assert!(c.is_visible_at(now + Duration::hours(2)));
        assert!(certificate(None).is_visible_at(now));
    }
}
