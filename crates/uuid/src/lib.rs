//! UUID and sharded-path utilities.
//!
//! NWD stores its records under sharded directories derived from a UUID.
//!
//! To keep path derivation deterministic and consistent across the codebase, NWD uses a
//! *canonical* UUID representation for storage identifiers: **32 lowercase hexadecimal
//! characters** (no hyphens).
//!
//! This crate provides:
//! - A small wrapper type ([`ShardableUuid`]) that *guarantees* the canonical format once
//!   constructed.
//! - Shared sharding logic to derive record locations from an identifier.
//!
//! ## Canonical UUID form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Canonical form is *required* for externally supplied identifiers (CLI/API inputs). Use
//! [`ShardableUuid::parse`] to validate an input string; uppercase, hyphenated, wrong-length and
//! non-hex values are rejected.
//!
//! ## Sharded layout
//! For a canonical UUID `u`, records live under:
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>`
//!
//! Example:
//! `nwd_data/requests/55/0e/550e8400e29b41d4a716446655440000.yaml`

mod service;

pub use service::{ShardableUuid, Uuid};

/// Error type for UUID operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for UUID operations.
pub type UuidResult<T> = Result<T, UuidError>;
