//! Constants used throughout the NWD core crate.

/// Default directory for record storage when none is configured.
pub const DEFAULT_DATA_DIR: &str = "nwd_data";

/// Hours after issuance during which a certificate may still be withdrawn.
pub const WITHDRAWAL_WINDOW_HOURS: i64 = 24;

/// Maximum delay between issuance and student-facing visibility.
pub const MAX_VISIBILITY_DELAY_HOURS: i64 = 72;

/// Length of a certificate handle.
pub const CERTIFICATE_HANDLE_LENGTH: usize = 10;

/// Prefix of assessment request handles, e.g. `PVB-7KQ2MX9A`.
pub const REQUEST_HANDLE_PREFIX: &str = "PVB-";

/// Length of the random part of an assessment request handle.
pub const REQUEST_HANDLE_LENGTH: usize = 8;

/// Attempts at generating a collision-free handle before giving up.
pub const HANDLE_ATTEMPTS: usize = 5;

/// Progress value at which a competency counts as completed.
pub const COMPLETED_PROGRESS: u8 = 100;

/// File extension for stored records.
pub const RECORD_EXTENSION: &str = "yaml";

/// Directory names of the versioned record store.
pub const CURRICULA_DIR_NAME: &str = "curricula";
pub const ENROLLMENTS_DIR_NAME: &str = "enrollments";
pub const REQUESTS_DIR_NAME: &str = "requests";
pub const CERTIFICATES_DIR_NAME: &str = "certificates";
pub const QUALIFICATIONS_DIR_NAME: &str = "qualifications";
pub const INDEXES_DIR_NAME: &str = "indexes";

/// Commit email used when the acting person has none on record.
pub const FALLBACK_COMMIT_EMAIL: &str = "noreply@nwd.invalid";
