//! AWS Signature Version 4 query-string presigning for S3 `GET`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use url::Url;

use crate::PresignError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

/// RFC 3986 unreserved characters stay as-is; everything else is encoded.
const URI_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Static credentials. The secret parts are zeroized on drop and redacted
/// in `Debug`.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
    pub session_token: Option<SecretString>,
}

/// Signs S3 object URLs with SigV4.
///
/// Without an endpoint the virtual-hosted AWS host is used. With one (MinIO,
/// LocalStack) the request is path-style against that endpoint.
#[derive(Clone, Debug)]
pub struct SigV4Signer {
    region: String,
    credentials: Credentials,
    endpoint: Option<Url>,
}

impl SigV4Signer {
    pub fn new(region: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            region: region.into(),
            credentials,
            endpoint: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Presign as of `now`. Exposed for deterministic signing.
    pub fn presign_get_at(
        &self,
        bucket: &str,
        key: &str,
        expires_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<String, PresignError> {
        let encoded_key = key
            .split('/')
            .map(|segment| utf8_percent_encode(segment, URI_ENCODE).to_string())
            .collect::<Vec<_>>()
            .join("/");

        let (scheme, host, canonical_uri) = match &self.endpoint {
            Some(endpoint) => {
                let host = endpoint
                    .host_str()
                    .ok_or_else(|| PresignError::InvalidEndpoint(endpoint.to_string()))?;
                let host = match endpoint.port() {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_string(),
                };
                let base = endpoint.path().trim_end_matches('/');
                let bucket = utf8_percent_encode(bucket, URI_ENCODE);
                (endpoint.scheme().to_string(), host, format!("{base}/{bucket}/{encoded_key}"))
            }
            None => {
                let host = if self.region == "us-east-1" {
                    format!("{bucket}.s3.amazonaws.com")
                } else {
                    format!("{bucket}.s3.{}.amazonaws.com", self.region)
                };
                ("https".to_string(), host, format!("/{encoded_key}"))
            }
        };

        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let scope = format!("{date_stamp}/{}/{SERVICE}/aws4_request", self.region);
        let credential = format!("{}/{scope}", self.credentials.access_key_id);

        let mut params = vec![
            ("X-Amz-Algorithm", ALGORITHM.to_string()),
            ("X-Amz-Credential", credential),
            ("X-Amz-Date", amz_date.clone()),
            ("X-Amz-Expires", expires_secs.to_string()),
        ];
        if let Some(token) = &self.credentials.session_token {
            params.push(("X-Amz-Security-Token", token.expose_secret().to_string()));
        }
        params.push(("X-Amz-SignedHeaders", "host".to_string()));
        params.sort_by(|a, b| a.0.cmp(b.0));

        let canonical_query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", utf8_percent_encode(v, URI_ENCODE)))
            .collect::<Vec<_>>()
            .join("&");

        let canonical_request = format!(
            "GET\n{canonical_uri}\n{canonical_query}\nhost:{host}\n\nhost\nUNSIGNED-PAYLOAD"
        );
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = self.signing_key(&date_stamp)?;
        let signature = hex::encode(hmac(&signing_key, string_to_sign.as_bytes())?);

        Ok(format!(
            "{scheme}://{host}{canonical_uri}?{canonical_query}&X-Amz-Signature={signature}"
        ))
    }

    fn signing_key(&self, date_stamp: &str) -> Result<Vec<u8>, PresignError> {
        let secret = format!("AWS4{}", self.credentials.secret_access_key.expose_secret());
        let k_date = hmac(secret.as_bytes(), date_stamp.as_bytes())?;
        let k_region = hmac(&k_date, self.region.as_bytes())?;
        let k_service = hmac(&k_region, SERVICE.as_bytes())?;
        hmac(&k_service, b"aws4_request")
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, PresignError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| PresignError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
