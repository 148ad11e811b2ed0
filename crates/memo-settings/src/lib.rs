//! # memo-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** ([`MemoSettings::default()`])
//! 2. **User file** at `~/.memo/settings.json`, deep-merged over defaults
//! 3. **Environment variables** (`MEMO_*`)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
