//! Settings loading.
//!
//! Layers, lowest priority first:
//! 1. Compiled [`HeraldSettings::default()`]
//! 2. The JSON settings file (`~/.herald/settings.json` unless a path is given)
//! 3. `HERALD_*` environment variables, nested with `__`
//!    (`HERALD_SERVER__PORT=9000` sets `server.port`)
//!
//! Presign credentials left unset after that fall back to the standard
//! `AWS_*` variables.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use secrecy::SecretString;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{HeraldSettings, PresignSettings};

/// `~/.herald`, or `/tmp/.herald` without a home directory.
pub fn herald_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".herald")
}

/// Resolve the path to the settings file (`~/.herald/settings.json`).
pub fn settings_path() -> PathBuf {
    herald_dir().join("settings.json")
}

/// Load from the default path. A missing file means defaults.
pub fn load_settings() -> Result<HeraldSettings> {
    load_layers(&settings_path())
}

/// Load from an explicit path, which must exist.
pub fn load_settings_from_path(path: &Path) -> Result<HeraldSettings> {
    if !path.exists() {
        return Err(SettingsError::InvalidValue(format!(
            "settings file {} does not exist",
            path.display()
        )));
    }
    load_layers(path)
}

/// The layered figment, before extraction.
pub fn figment(path: &Path) -> Figment {
    Figment::from(Serialized::defaults(HeraldSettings::default()))
        .merge(Json::file(path))
        .merge(Env::prefixed("HERALD_").split("__"))
}

fn load_layers(path: &Path) -> Result<HeraldSettings> {
    debug!(?path, "loading settings");
    let mut settings: HeraldSettings = figment(path).extract()?;
    apply_aws_fallbacks(&mut settings.presign, |name| {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    });
    settings.validate()?;
    Ok(settings)
}

/// Fill unset presign fields from `AWS_*` variables.
pub fn apply_aws_fallbacks(presign: &mut PresignSettings, lookup: impl Fn(&str) -> Option<String>) {
    let fill = |slot: &mut Option<String>, names: &[&str]| {
        if slot.is_none() {
            *slot = names.iter().find_map(|&name| lookup(name));
        }
    };
    fill(&mut presign.region, &["AWS_REGION", "AWS_DEFAULT_REGION"]);
    fill(&mut presign.endpoint, &["AWS_ENDPOINT_URL_S3", "AWS_ENDPOINT_URL"]);
    fill(&mut presign.access_key_id, &["AWS_ACCESS_KEY_ID"]);

    let fill_secret = |slot: &mut Option<SecretString>, name: &str| {
        if slot.is_none() {
            *slot = lookup(name).map(SecretString::from);
        }
    };
    fill_secret(&mut presign.secret_access_key, "AWS_SECRET_ACCESS_KEY");
    fill_secret(&mut presign.session_token, "AWS_SESSION_TOKEN");
}
