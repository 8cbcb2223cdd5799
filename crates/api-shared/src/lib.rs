//! # API Shared
//!
//! Shared utilities and definitions for NWD APIs.
//!
//! Contains:
//! - Wire types (`dto` module), serialisable and documented for OpenAPI
//! - Shared services like `HealthService`
//! - Authentication utilities (API key and acting-person headers)
//!
//! Used by `api-rest` and the CLI for common functionality.

pub mod auth;
pub mod dto;
pub mod health;

pub use auth::AuthError;
pub use dto::*;
pub use health::HealthService;
