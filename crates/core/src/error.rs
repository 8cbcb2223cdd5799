use crate::guards::GuardError;
use crate::ids::{CertificateId, EnrollmentId, PersonId, RequestId, TaskUnitId};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;

/// Why an enrollment cannot receive a certificate (besides already holding one).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnrollmentIneligibility {
    /// The enrollment was terminated without a certificate.
    Terminated,
    /// Not a single module of the curriculum is fully completed.
    NoCompletedModule,
}

impl fmt::Display for EnrollmentIneligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminated => f.write_str("the enrollment is no longer active"),
            Self::NoCompletedModule => f.write_str("at least one module must be fully completed"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error("not all selected enrollments are eligible for a certificate: {reason}")]
    EnrollmentNotEligible {
        enrollments: Vec<EnrollmentId>,
        reason: EnrollmentIneligibility,
    },

    #[error("a certificate has already been issued for {} of the selected enrollments", enrollments.len())]
    AlreadyCertified { enrollments: Vec<EnrollmentId> },

    #[error("certificate handle {0} is already in use")]
    DuplicateHandle(String),

    #[error("person {person} already holds a qualification for task unit {task_unit}")]
    DuplicateQualification {
        person: PersonId,
        task_unit: TaskUnitId,
    },

    #[error(
        "certificate {certificate} was issued at {issued_at} and can no longer be withdrawn (window is {window_hours} hours)"
    )]
    WithdrawalWindowExpired {
        certificate: CertificateId,
        issued_at: DateTime<Utc>,
        window_hours: i64,
    },

    #[error("request {request} was modified concurrently (expected version {expected}, found {found})")]
    VersionConflict {
        request: RequestId,
        expected: u64,
        found: u64,
    },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to read record: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write record: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("record schema mismatch in {path} at {field}: {message}", path = path.display())]
    RecordSchema {
        path: PathBuf,
        field: String,
        message: String,
    },

    #[error("failed to initialise git repository: {0}")]
    GitInit(git2::Error),
    #[error("failed to open git repository: {0}")]
    GitOpen(git2::Error),
    #[error("failed to access git index: {0}")]
    GitIndex(git2::Error),
    #[error("failed to add file to git index: {0}")]
    GitAdd(git2::Error),
    #[error("failed to remove file from git index: {0}")]
    GitRemove(git2::Error),
    #[error("failed to write git tree: {0}")]
    GitWriteTree(git2::Error),
    #[error("failed to find git tree: {0}")]
    GitFindTree(git2::Error),
    #[error("failed to create git signature: {0}")]
    GitSignature(git2::Error),
    #[error("failed to create git commit: {0}")]
    GitCommit(git2::Error),
    #[error("failed to get git head: {0}")]
    GitHead(git2::Error),
    #[error("failed to set git head: {0}")]
    GitSetHead(git2::Error),
    #[error("failed to peel git commit: {0}")]
    GitPeel(git2::Error),

    #[error("store lock poisoned")]
    LockPoisoned,
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Caller-facing classification of a [`CoreError`].
///
/// Transports map each kind to one response class; only `Infrastructure` hides its detail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Guard,
    Uniqueness,
    WindowExpired,
    Conflict,
    NotFound,
    Permission,
    Infrastructure,
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::Validation,
            Self::Guard(_) | Self::EnrollmentNotEligible { .. } => ErrorKind::Guard,
            Self::AlreadyCertified { .. }
            | Self::DuplicateHandle(_)
            | Self::DuplicateQualification { .. } => ErrorKind::Uniqueness,
            Self::WithdrawalWindowExpired { .. } => ErrorKind::WindowExpired,
            Self::VersionConflict { .. } => ErrorKind::Conflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::PermissionDenied(_) => ErrorKind::Permission,
            _ => ErrorKind::Infrastructure,
        }
    }

    /// Message safe to show to the acting person.
    ///
    /// Infrastructure failures collapse to a generic message; their detail belongs in logs.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::WindowExpired => format!(
                "{self}. Please contact the secretariat to have this certificate withdrawn."
            ),
            ErrorKind::Conflict => format!("{self}. Reload the requests and try again."),
            ErrorKind::Infrastructure => "Internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<nwd_types::TextError> for CoreError {
    fn from(value: nwd_types::TextError) -> Self {
        Self::InvalidInput(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infrastructure_errors_hide_detail() {
        let err = CoreError::FileRead(std::io::Error::other("disk on fire"));
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert_eq!(err.user_message(), "Internal error");
    }

    #[test]
    fn window_expired_points_to_secretariat() {
        let err = CoreError::WithdrawalWindowExpired {
            certificate: CertificateId::new(),
            issued_at: Utc::now(),
            window_hours: 24,
        };
        assert_eq!(err.kind(), ErrorKind::WindowExpired);
        assert!(err.user_message().contains("secretariat"));
    }

    #[test]
    fn already_certified_is_a_uniqueness_signal() {
        let err = CoreError::AlreadyCertified {
            enrollments: vec![EnrollmentId::new()],
        };
        assert_eq!(err.kind(), ErrorKind::Uniqueness);
    }
}
