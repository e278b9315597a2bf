//! Cache key conventions shared with downstream consumers.

use std::time::Duration;

pub const LOCK_PREFIX: &str = "lock-sync-check-";
pub const RESULT_PREFIX: &str = "sync-check-";
pub const FAILURE_SUFFIX: &str = "-failure";

pub const LOCK_TTL: Duration = Duration::from_secs(60);
pub const RESULT_TTL: Duration = Duration::from_secs(300);
pub const EMPTY_RESULT_TTL: Duration = Duration::from_secs(30);
pub const FAILURE_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 30);

/// Presence means a check is in flight for the session
pub fn lock_key(session_key: &str) -> String {
    format!("{}{}", LOCK_PREFIX, session_key)
}

/// JSON array of in-sync node public keys for the session
pub fn result_key(session_key: &str) -> String {
    format!("{}{}", RESULT_PREFIX, session_key)
}

/// Penalty flag for a node on a chain
pub fn failure_key(chain_id: &str, public_key: &str) -> String {
    format!("{}-{}{}", chain_id, public_key, FAILURE_SUFFIX)
}
