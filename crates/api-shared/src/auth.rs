//! Request authentication shared by the transports.
//!
//! Identity resolution happens outside this system. Callers present the API key and the result
//! of that resolution in three headers; the transport turns those into a core `Actor`.

use std::env;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";
pub const ACTOR_PRIVILEGE_HEADER: &str = "x-actor-privilege";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("API_KEY not set in environment")]
    ApiKeyNotConfigured,
    #[error("invalid API key")]
    InvalidApiKey,
    #[error("missing header {0}")]
    MissingHeader(&'static str),
    #[error("invalid header {header}: {message}")]
    InvalidHeader {
        header: &'static str,
        message: String,
    },
}

impl AuthError {
    /// True when the caller, not the server, is at fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::ApiKeyNotConfigured)
    }
}

/// Reads the expected API key from the environment.
pub fn api_key_from_env() -> Result<String, AuthError> {
    env::var("API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
        .ok_or(AuthError::ApiKeyNotConfigured)
}

/// Validates the provided API key against the expected one.
///
/// Returns `Ok(())` if the key is valid, or an error if invalid or missing.
pub fn validate_api_key(provided_key: Option<&str>, expected_key: &str) -> Result<(), AuthError> {
    match provided_key {
        None => Err(AuthError::MissingHeader(API_KEY_HEADER)),
        Some(key) if key == expected_key => Ok(()),
        Some(_) => Err(AuthError::InvalidApiKey),
    }
}

/// Returns the header value or the error naming the missing header.
pub fn required_header<'a>(
    value: Option<&'a str>,
    header: &'static str,
) -> Result<&'a str, AuthError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingHeader(header))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_must_match() {
        assert_eq!(validate_api_key(Some("secret"), "secret"), Ok(()));
        assert_eq!(
            validate_api_key(Some("guess"), "secret"),
            Err(AuthError::InvalidApiKey)
        );
        assert_eq!(
            validate_api_key(None, "secret"),
            Err(AuthError::MissingHeader(API_KEY_HEADER))
        );
    }

    #[test]
    fn blank_headers_count_as_missing() {
        assert_eq!(
            required_header(Some("   "), ACTOR_NAME_HEADER),
            Err(AuthError::MissingHeader(ACTOR_NAME_HEADER))
        );
        assert_eq!(required_header(Some(" Anke "), ACTOR_NAME_HEADER), Ok("Anke"));
    }

    #[test]
    fn unconfigured_key_is_a_server_error() {
        assert!(!AuthError::ApiKeyNotConfigured.is_client_error());
        assert!(AuthError::InvalidApiKey.is_client_error());
    }
}
