//! AWS Signature Version 4 request signing, shared by the S3 and Glue clients.

use crate::config::{ConfigError, load_env};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::macros::format_description;

type HmacSha256 = Hmac<Sha256>;

/// Credentials read from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, and optionally
/// `AWS_SESSION_TOKEN`.
#[derive(Clone)]
pub struct AwsCredentials {
    pub(crate) access_key_id: String,
    pub(crate) secret_access_key: String,
    pub(crate) session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("has_session_token", &self.session_token.is_some())
            .finish_non_exhaustive()
    }
}

impl AwsCredentials {
    /// Load credentials from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            access_key_id: load_env("AWS_ACCESS_KEY_ID")?,
            secret_access_key: load_env("AWS_SECRET_ACCESS_KEY")?,
            session_token: std::env::var("AWS_SESSION_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
        })
    }

    /// Static credentials.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }
}

/// Split an endpoint override such as `http://localhost:4566` into scheme and host.
pub(crate) fn split_endpoint(url: &str) -> (String, String) {
    let (scheme, rest) = url.split_once("://").unwrap_or(("https", url));
    (scheme.to_string(), rest.trim_end_matches('/').to_string())
}

/// The parts of a request covered by the signature.
pub(crate) struct RequestParts<'a> {
    pub(crate) method: &'a str,
    pub(crate) host: &'a str,
    /// Already URI-encoded absolute path.
    pub(crate) canonical_uri: &'a str,
    pub(crate) query: &'a [(String, String)],
    /// Lower-case header names to sign in addition to host and x-amz-*.
    pub(crate) headers: &'a [(String, String)],
    pub(crate) payload: &'a [u8],
}

/// Signs requests for one region and service.
#[derive(Debug, Clone)]
pub(crate) struct SigV4Signer {
    pub(crate) credentials: AwsCredentials,
    pub(crate) region: String,
    pub(crate) service: &'static str,
}

impl SigV4Signer {
    /// Return the headers to attach: `Authorization`, `x-amz-content-sha256`, `x-amz-date`,
    /// and `x-amz-security-token` when a session token is present.
    pub(crate) fn sign(
        &self,
        parts: &RequestParts<'_>,
        now: OffsetDateTime,
    ) -> Vec<(String, String)> {
        let date_stamp = now
            .format(format_description!("[year][month][day]"))
            .unwrap_or_default();
        let amz_date = now
            .format(format_description!("[year][month][day]T[hour][minute][second]Z"))
            .unwrap_or_default();
        let payload_hash = hex_sha256(parts.payload);

        let mut headers: Vec<(String, String)> = vec![
            ("host".to_string(), parts.host.to_string()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(token) = &self.credentials.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.extend(
            parts
                .headers
                .iter()
                .map(|(name, value)| (name.to_lowercase(), value.trim().to_string())),
        );
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers = headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{name}:{value}\n"))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            parts.method,
            parts.canonical_uri,
            canonical_query(parts.query),
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!(
            "{date_stamp}/{}/{}/aws4_request",
            self.region, self.service
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
            hex_sha256(canonical_request.as_bytes())
        );
        let signing_key = derive_signing_key(
            &self.credentials.secret_access_key,
            &date_stamp,
            &self.region,
            self.service,
        );
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let mut out = vec![
            (
                "authorization".to_string(),
                format!(
                    "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
                    self.credentials.access_key_id
                ),
            ),
            ("x-amz-content-sha256".to_string(), payload_hash),
            ("x-amz-date".to_string(), amz_date),
        ];
        if let Some(token) = &self.credentials.session_token {
            out.push(("x-amz-security-token".to_string(), token.clone()));
        }
        out
    }
}

/// Sorted, encoded query string.
pub(crate) fn canonical_query(query: &[(String, String)]) -> String {
    let mut sorted = query.to_vec();
    sorted.sort();
    sorted
        .iter()
        .map(|(key, value)| format!("{}={}", uri_encode(key), uri_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Encode an object key segment by segment, keeping `/`.
pub(crate) fn encode_key(key: &str) -> String {
    key.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

pub(crate) fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding of everything but `A-Z a-z 0-9 - _ . ~`.
pub(crate) fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{byte:02X}")),
        }
    }
    result
}
