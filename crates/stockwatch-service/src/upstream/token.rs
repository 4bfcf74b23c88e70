//! Rotating `tid` request token.
//!
//! Every upstream request carries `tid = "{ts}:{nonce}:{digest}"` where
//! `digest` is the hex SHA-256 of `"{store_id}:{ts}:{nonce}:{session_tid}"`.

use rand::Rng;
use sha2::{Digest, Sha256};

/// Nonces are drawn from `0..NONCE_RANGE`.
pub const NONCE_RANGE: u32 = 1000;

#[must_use]
pub fn compute_tid(store_id: &str, session_tid: &str, timestamp_ms: i64, nonce: u32) -> String {
    let digest = Sha256::digest(format!("{store_id}:{timestamp_ms}:{nonce}:{session_tid}"));
    format!("{timestamp_ms}:{nonce}:{}", hex::encode(digest))
}

/// Builds a token for the current instant with a fresh nonce.
#[must_use]
pub fn fresh_tid(store_id: &str, session_tid: &str) -> String {
    let nonce = rand::thread_rng().gen_range(0..NONCE_RANGE);
    compute_tid(
        store_id,
        session_tid,
        chrono::Utc::now().timestamp_millis(),
        nonce,
    )
}
