//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services as an
//! `Arc<CoreConfig>`. Services never read process-wide environment variables while handling an
//! operation.

use crate::constants::{
    CERTIFICATE_HANDLE_LENGTH, CERTIFICATES_DIR_NAME, CURRICULA_DIR_NAME, ENROLLMENTS_DIR_NAME,
    INDEXES_DIR_NAME, MAX_VISIBILITY_DELAY_HOURS, QUALIFICATIONS_DIR_NAME, REQUESTS_DIR_NAME,
    WITHDRAWAL_WINDOW_HOURS,
};
use crate::error::{CoreError, CoreResult};
use chrono::Duration;
use nwd_types::NonEmptyText;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which [`Store`](crate::store::Store) implementation a binary should construct.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoreKind {
    #[default]
    Memory,
    Git,
}

impl FromStr for StoreKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "memory" => Ok(Self::Memory),
            "git" => Ok(Self::Git),
            other => Err(CoreError::InvalidInput(format!(
                "unknown store kind '{other}' (expected 'memory' or 'git')"
            ))),
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    location: NonEmptyText,
    withdrawal_window: Duration,
    max_visibility_delay: Duration,
    handle_length: usize,
}

impl CoreConfig {
    /// Create a configuration with the default certification rules (24 h withdrawal window,
    /// 72 h visibility cap, 10-character handles).
    pub fn new(data_dir: PathBuf, location: &str) -> CoreResult<Self> {
        let location = NonEmptyText::new(location)
            .map_err(|e| CoreError::InvalidInput(format!("location: {e}")))?;

        Ok(Self {
            data_dir,
            location,
            withdrawal_window: Duration::hours(WITHDRAWAL_WINDOW_HOURS),
            max_visibility_delay: Duration::hours(MAX_VISIBILITY_DELAY_HOURS),
            handle_length: CERTIFICATE_HANDLE_LENGTH,
        })
    }

    pub fn with_handle_length(mut self, handle_length: usize) -> CoreResult<Self> {
        if !(6..=32).contains(&handle_length) {
            return Err(CoreError::InvalidInput(
                "handle length must be between 6 and 32 characters".into(),
            ));
        }
        self.handle_length = handle_length;
        Ok(self)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Name of the sailing location this process acts for; recorded on requests and commits.
    pub fn location(&self) -> &NonEmptyText {
        &self.location
    }

    pub fn withdrawal_window(&self) -> Duration {
        self.withdrawal_window
    }

    pub fn max_visibility_delay(&self) -> Duration {
        self.max_visibility_delay
    }

    pub fn handle_length(&self) -> usize {
        self.handle_length
    }

    pub fn curricula_dir(&self) -> PathBuf {
        self.data_dir.join(CURRICULA_DIR_NAME)
    }

    pub fn enrollments_dir(&self) -> PathBuf {
        self.data_dir.join(ENROLLMENTS_DIR_NAME)
    }

    pub fn requests_dir(&self) -> PathBuf {
        self.data_dir.join(REQUESTS_DIR_NAME)
    }

    pub fn certificates_dir(&self) -> PathBuf {
        self.data_dir.join(CERTIFICATES_DIR_NAME)
    }

    pub fn qualifications_dir(&self) -> PathBuf {
        self.data_dir.join(QUALIFICATIONS_DIR_NAME)
    }

    pub fn indexes_dir(&self) -> PathBuf {
        self.data_dir.join(INDEXES_DIR_NAME)
    }
}

/// Parse the store kind from an optional environment value. Absent or blank means memory.
pub fn store_kind_from_env_value(value: Option<String>) -> CoreResult<StoreKind> {
    value.as_deref().unwrap_or_default().parse()
}
