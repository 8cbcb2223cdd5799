//! Human-readable handles for certificates and assessment requests.
//!
//! Handles use an alphabet without look-alike characters (no `0/O`, `1/I`) so they can be read
//! off a printed diploma and typed back in.

use crate::constants::{REQUEST_HANDLE_LENGTH, REQUEST_HANDLE_PREFIX};
use rand::Rng;

pub const HANDLE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

fn random_chars<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| HANDLE_ALPHABET[rng.gen_range(0..HANDLE_ALPHABET.len())] as char)
        .collect()
}

pub fn certificate_handle<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    random_chars(rng, len)
}

pub fn request_handle<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!(
        "{REQUEST_HANDLE_PREFIX}{}",
        random_chars(rng, REQUEST_HANDLE_LENGTH)
    )
}

/// Uppercases and trims a handle typed in by a person.
pub fn normalise(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

pub fn is_well_formed(handle: &str, len: usize) -> bool {
    handle.len() == len && handle.bytes().all(|b| HANDLE_ALPHABET.contains(&b))
}
