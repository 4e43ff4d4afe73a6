//! Settings sections.

use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use herald_presign::{Credentials, PresignError, SigV4Signer, DEFAULT_EXPIRY_SECS};
use herald_relay::DispatchPolicy;
use herald_telemetry::LogSettings;

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeraldSettings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub logging: LogSettings,
    pub dispatch: DispatchPolicy,
    pub presign: PresignSettings,
}

impl HeraldSettings {
    /// Reject values that deserialize fine but cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.server.max_send_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "server.max_send_queue must be at least 1".into(),
            ));
        }
        if self.server.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeat_interval_secs must be at least 1".into(),
            ));
        }
        if self.server.client_timeout_secs <= self.server.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(
                "server.client_timeout_secs must exceed the heartbeat interval".into(),
            ));
        }
        if self.server.sweep_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sweep_interval_secs must be at least 1".into(),
            ));
        }
        if let Some(endpoint) = &self.presign.endpoint {
            let _ = Url::parse(endpoint)
                .map_err(|e| SettingsError::InvalidValue(format!("presign.endpoint: {e}")))?;
        }
        Ok(())
    }
}

/// HTTP and WebSocket listener settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. 0 picks a free one.
    pub port: u16,
    /// Frames buffered per socket before pushes report backpressure.
    pub max_send_queue: usize,
    /// Seconds between pings.
    pub heartbeat_interval_secs: u64,
    /// A socket silent for this long is treated as disconnected.
    pub client_timeout_secs: u64,
    /// Seconds between dead-socket sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_send_queue: 256,
            heartbeat_interval_secs: 30,
            client_timeout_secs: 90,
            sweep_interval_secs: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: crate::loader::herald_dir().join("herald.db"),
        }
    }
}

/// Storage credentials and link lifetime for the presigner.
///
/// Secrets are read from the file or environment but never written back
/// out when the settings are serialized.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PresignSettings {
    pub region: Option<String>,
    /// Alternate S3-compatible endpoint; switches to path-style URLs.
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    #[serde(skip_serializing)]
    pub secret_access_key: Option<SecretString>,
    #[serde(skip_serializing)]
    pub session_token: Option<SecretString>,
    pub default_expiry_secs: Option<u64>,
}

impl PresignSettings {
    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or("us-east-1")
    }

    pub fn default_expiry_secs(&self) -> u64 {
        self.default_expiry_secs.unwrap_or(DEFAULT_EXPIRY_SECS)
    }

    /// Build a signer from the configured credentials.
    pub fn signer(&self) -> std::result::Result<SigV4Signer, PresignError> {
        let (Some(access_key_id), Some(secret_access_key)) =
            (self.access_key_id.clone(), self.secret_access_key.clone())
        else {
            return Err(PresignError::MissingCredentials);
        };
        let signer = SigV4Signer::new(
            self.region(),
            Credentials {
                access_key_id,
                secret_access_key,
                session_token: self.session_token.clone(),
            },
        );
        match &self.endpoint {
            Some(endpoint) => {
                let endpoint =
                    Url::parse(endpoint).map_err(|e| PresignError::InvalidEndpoint(e.to_string()))?;
                Ok(signer.with_endpoint(endpoint))
            }
            None => Ok(signer),
        }
    }
}
