//! # streamfan-settings
//!
//! Configuration with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`FanoutSettings::default()`]
//! 2. **Settings file**: `$STREAMFAN_CONFIG`, else `~/.streamfan/settings.json`
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `STREAMFAN_*` overrides (highest priority)
//!
//! There is no global instance. Load once at startup and pass the value to
//! whatever builds the registry.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_overrides_with, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{
    AutoRespond, DEFAULT_EVENT_BUFFER, DEFAULT_POLL_INTERVAL_MS, EndpointSettings, FanoutSettings,
    TlsSettings,
};
