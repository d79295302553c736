//! Tracking hash linking a KHQR payload to its settlement record.

use md5::{Digest, Md5};

/// Length of a tracking hash in hex characters.
pub const TRACKING_HASH_LEN: usize = 32;

/// MD5 of the raw payload as lowercase hex.
#[must_use]
pub fn tracking_hash(raw: &str) -> String {
    hex::encode(Md5::digest(raw.as_bytes()))
}

/// Check that `hash` looks like a tracking hash (32 lowercase hex chars).
#[must_use]
pub fn is_tracking_hash(hash: &str) -> bool {
    hash.len() == TRACKING_HASH_LEN
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
