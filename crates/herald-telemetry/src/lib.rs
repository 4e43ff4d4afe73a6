use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log level `{0}`")]
    InvalidLevel(String),

    #[error("failed to install subscriber: {0}")]
    Init(String),
}

/// Logging section of the settings file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Default level. `RUST_LOG` wins when set.
    pub level: String,
    /// Emit one JSON object per line instead of human-readable output.
    pub json: bool,
    /// Per-module overrides, e.g. `herald_relay = "debug"`.
    pub module_levels: BTreeMap<String, String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: true,
            module_levels: BTreeMap::new(),
        }
    }
}

impl LogSettings {
    /// Filter directives built from the configured levels.
    pub fn directives(&self) -> Result<String, TelemetryError> {
        let mut out = parse_level(&self.level)?.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            let level = parse_level(level)?;
            out.push_str(&format!(",{module}={}", level.to_string().to_lowercase()));
        }
        Ok(out)
    }
}

fn parse_level(raw: &str) -> Result<Level, TelemetryError> {
    Level::from_str(raw.trim()).map_err(|_| TelemetryError::InvalidLevel(raw.to_string()))
}

/// Install the global subscriber. Call once at startup.
pub fn init_telemetry(settings: &LogSettings) -> Result<(), TelemetryError> {
    let directives = settings.directives()?;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    let fmt_layer = if settings.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives() {
        assert_eq!(LogSettings::default().directives().unwrap(), "info");
    }

    #[test]
    fn module_overrides_are_appended_in_order() {
        let mut settings = LogSettings {
            level: "WARN".into(),
            ..Default::default()
        };
        settings.module_levels.insert("herald_store".into(), "trace".into());
        settings.module_levels.insert("herald_relay".into(), "debug".into());
        assert_eq!(
            settings.directives().unwrap(),
            "warn,herald_relay=debug,herald_store=trace"
        );
    }

    #[test]
    fn bad_level_is_rejected() {
        let settings = LogSettings {
            level: "loud".into(),
            ..Default::default()
        };
        assert!(matches!(
            settings.directives(),
            Err(TelemetryError::InvalidLevel(l)) if l == "loud"
        ));
    }

    #[test]
    fn partial_section_fills_defaults() {
        let settings: LogSettings = serde_json::from_str(r#"{"json": false}"#).unwrap();
        assert!(!settings.json);
        assert_eq!(settings.level, "info");
    }
}
