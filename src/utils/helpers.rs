//! Small helpers shared by the wire formats and the session layer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Process-unique identifier such as `call-18f3a2c41b0-0007`.
///
/// Millisecond timestamp plus a monotonic counter, both in hex, so ids sort
/// by creation time within one process.
pub fn generate_unique_id(prefix: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    let millis = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{prefix}-{millis:x}-{count:04x}")
}

/// Standard-alphabet base64, as used in Twilio and Gemini payloads.
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode standard-alphabet base64, ignoring surrounding whitespace.
///
/// Returns `None` on invalid input.
pub fn decode_base64(data: &str) -> Option<Vec<u8>> {
    STANDARD.decode(data.trim()).ok()
}
