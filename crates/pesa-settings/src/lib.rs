//! # pesa-settings
//!
//! Configuration for the payment-status relay, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`PesaSettings::default()`]
//! 2. **Settings file**: `~/.pesa/settings.json` or an explicit path,
//!    deep-merged over defaults
//! 3. **Environment variables**: highest priority. The deployment names
//!    (`CONSUMER_KEY`, `PORT`, ...) plus `PESA_*` tuning knobs
//!
//! Settings are constructed once by the binary and passed down explicitly.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path,
};
pub use types::*;
