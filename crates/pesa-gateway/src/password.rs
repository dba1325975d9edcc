//! STK push password derivation.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Gateway timestamp (`YYYYMMDDHHMMSS`, local time).
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%d%H%M%S").to_string()
}

/// `base64(short_code + passkey + timestamp)`.
pub fn stk_password(short_code: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{short_code}{passkey}{timestamp}"))
}
