//! Time-limited download links for objects named by an `s3://bucket/key` URI.

pub mod sigv4;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use herald_core::ValidationError;

pub use sigv4::{Credentials, SigV4Signer};

/// Lifetime used when the caller gives none.
pub const DEFAULT_EXPIRY_SECS: u64 = 900;

/// SigV4 refuses anything longer than seven days.
pub const MAX_EXPIRY_SECS: u64 = 604_800;

#[derive(Debug, thiserror::Error)]
pub enum PresignError {
    #[error("invalid inputUri: {0}")]
    InvalidInputUri(String),

    #[error("no credentials available for signing")]
    MissingCredentials,

    #[error("invalid storage endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

impl PresignError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidInputUri(_) => "invalid_input_uri",
            Self::MissingCredentials => "missing_credentials",
            Self::InvalidEndpoint(_) => "invalid_endpoint",
            Self::Signing(_) => "signing",
        }
    }

    /// True when the caller sent a bad request rather than the server being misconfigured.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInputUri(_))
    }
}

impl From<ValidationError> for PresignError {
    fn from(e: ValidationError) -> Self {
        Self::InvalidInputUri(e.to_string())
    }
}

/// Inbound presign event.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PresignEvent {
    #[serde(rename = "inputUri", default)]
    pub input_uri: Option<String>,
    #[serde(default)]
    pub link_expiry: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignResponse {
    pub signed_s3_link: String,
}

/// An object location parsed from a storage URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    /// Parse `scheme://host/<bucket>/<key...>`.
    ///
    /// The bucket is the first path segment and the key is everything after
    /// it, so nested keys survive intact.
    pub fn parse(uri: &str) -> Result<Self, PresignError> {
        let url =
            Url::parse(uri).map_err(|e| PresignError::InvalidInputUri(format!("{uri}: {e}")))?;
        let path = url.path().trim_start_matches('/');
        let (bucket, key) = path.split_once('/').ok_or_else(|| {
            PresignError::InvalidInputUri(format!("{uri}: expected /<bucket>/<key>"))
        })?;

        let bucket = decode(bucket);
        let key = decode(key);
        if bucket.is_empty() || key.is_empty() {
            return Err(PresignError::InvalidInputUri(format!(
                "{uri}: expected /<bucket>/<key>"
            )));
        }
        Ok(Self { bucket, key })
    }
}

fn decode(segment: &str) -> String {
    percent_encoding::percent_decode_str(segment)
        .decode_utf8_lossy()
        .into_owned()
}

/// Anything that can mint a GET link for an object.
pub trait LinkSigner: Send + Sync {
    fn presign_get(
        &self,
        location: &ObjectLocation,
        expires_secs: u64,
    ) -> Result<String, PresignError>;
}

impl LinkSigner for SigV4Signer {
    fn presign_get(
        &self,
        location: &ObjectLocation,
        expires_secs: u64,
    ) -> Result<String, PresignError> {
        self.presign_get_at(&location.bucket, &location.key, expires_secs, Utc::now())
    }
}

/// Clamp a requested lifetime into what the signer accepts.
pub fn effective_expiry(requested: Option<u64>, default_secs: u64) -> u64 {
    requested.unwrap_or(default_secs).clamp(1, MAX_EXPIRY_SECS)
}

/// Handle one presign event.
#[instrument(skip(signer, event), fields(input_uri = event.input_uri.as_deref().unwrap_or("")))]
pub fn presign(
    signer: &dyn LinkSigner,
    event: &PresignEvent,
    default_expiry_secs: u64,
) -> Result<PresignResponse, PresignError> {
    let uri = match event.input_uri.as_deref() {
        Some(uri) if !uri.trim().is_empty() => uri,
        Some(_) => return Err(ValidationError::empty("inputUri").into()),
        None => return Err(ValidationError::missing("inputUri").into()),
    };
    let location = ObjectLocation::parse(uri)?;
    let expiry = effective_expiry(event.link_expiry, default_expiry_secs);
    let signed_s3_link = signer.presign_get(&location, expiry)?;
    debug!(bucket = %location.bucket, expiry, "presigned link");
    Ok(PresignResponse { signed_s3_link })
}
