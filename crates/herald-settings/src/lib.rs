//! # herald-settings
//!
//! Layered configuration for the herald server: compiled defaults, then
//! `~/.herald/settings.json`, then `HERALD_*` environment variables.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_aws_fallbacks, load_settings, load_settings_from_path, settings_path};
pub use types::{DatabaseSettings, HeraldSettings, PresignSettings, ServerSettings};

pub use herald_relay::{DispatchPolicy, Retention};
pub use herald_telemetry::LogSettings;
