//! MSISDN normalization.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{GatewayError, Result};

// ASCII classes only: `\d` would also admit non-ASCII Unicode digits.
static NON_DIAL_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9+]").unwrap());
static KENYAN_MSISDN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^254[0-9]{9}$").unwrap());

/// Normalize a Kenyan phone number to `254XXXXXXXXX`.
///
/// Accepts local (`07..`), international (`+254..`) and bare subscriber
/// (`7..`) forms, with any separators.
pub fn format_phone_number(input: &str) -> Result<String> {
    let cleaned = NON_DIAL_CHARS.replace_all(input, "");
    let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);

    let normalized = if let Some(rest) = cleaned.strip_prefix('0') {
        format!("254{rest}")
    } else if cleaned.len() >= 9 && !cleaned.starts_with("254") {
        format!("254{cleaned}")
    } else {
        cleaned.to_owned()
    };

    if KENYAN_MSISDN.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(GatewayError::InvalidPhone(input.to_owned()))
    }
}
