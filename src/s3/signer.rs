//! Request signing
//!
//! [`Signer`] is selected by the configured [`SignatureMethod`] and produces
//! the `Authorization` header value or a pre-signed URL for a [`Request`].
//!
//! The SigV4 signer keeps:
//! - Pre-computed AWS4+secret_key bytes
//! - Daily signing key cache (avoids 4 HMAC operations per request)
//! - Fixed-size [u8; 32] arrays instead of Vec<u8> for HMAC results

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::config::{Configuration, SignatureMethod};
use crate::s3::error::{Result, S3Error};
use crate::s3::request::{uri_encode, Request, AMZ_DATE_FORMAT};
use crate::s3::signer_v2::SignerV2;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

/// Longest validity SigV4 accepts for a pre-signed URL (7 days)
pub const MAX_PRESIGN_EXPIRES: u64 = 604_800;

/// Signature engine for one configuration
#[derive(Debug)]
pub enum Signer {
    V2(SignerV2),
    V4(SignerV4),
}

impl Signer {
    pub fn new(config: &Configuration) -> Self {
        match config.signature_method() {
            SignatureMethod::V2 => Signer::V2(SignerV2::new(config.access_key(), config.secret_key())),
            SignatureMethod::V4 => Signer::V4(SignerV4::new(
                config.access_key(),
                config.secret_key(),
                config.region(),
            )),
        }
    }

    /// `Authorization` header value for a prepared request
    pub fn authorize(&self, request: &Request) -> String {
        match self {
            Signer::V2(signer) => signer.authorize(request),
            Signer::V4(signer) => signer.authorize(request),
        }
    }

    /// Absolute URL granting access to the request for `expires_secs` seconds
    pub fn presign(&self, request: &Request, expires_secs: u64) -> Result<String> {
        match self {
            Signer::V2(signer) => Ok(signer.presign(request, expires_secs)),
            Signer::V4(signer) => signer.presign(request, expires_secs),
        }
    }
}

/// AWS Signature Version 4 signer
pub struct SignerV4 {
    access_key: String,
    region: String,
    /// Pre-computed "AWS4" + secret_key as bytes
    aws4_key: Vec<u8>,
    /// Cached signing key per day: (date_stamp, derived_key)
    cached_signing_key: Mutex<Option<(String, [u8; 32])>>,
}

impl std::fmt::Debug for SignerV4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerV4")
            .field("access_key", &self.access_key)
            .field("region", &self.region)
            .finish()
    }
}

impl Clone for SignerV4 {
    fn clone(&self) -> Self {
        Self {
            access_key: self.access_key.clone(),
            region: self.region.clone(),
            aws4_key: self.aws4_key.clone(),
            // Each clone gets its own cache (populated on first use)
            cached_signing_key: Mutex::new(None),
        }
    }
}

impl SignerV4 {
    pub fn new(access_key: &str, secret_key: &str, region: &str) -> Self {
        Self {
            access_key: access_key.to_string(),
            region: region.to_string(),
            aws4_key: format!("AWS4{}", secret_key).into_bytes(),
            cached_signing_key: Mutex::new(None),
        }
    }

    fn credential_scope(&self, date: &DateTime<Utc>) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            date.format("%Y%m%d"),
            self.region,
            SERVICE
        )
    }

    /// Authorization header value for a request whose payload hash is set
    pub fn authorize(&self, request: &Request) -> String {
        let date = request.date();
        let headers = canonical_header_map(request);
        let canonical_headers = create_canonical_headers(&headers);
        let signed_headers = create_signed_headers(&headers);
        let canonical_query = create_canonical_query_string(request.params());

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            request.method(),
            request.canonical_uri(),
            canonical_query,
            canonical_headers,
            signed_headers,
            request.payload_hash()
        );

        let credential_scope = self.credential_scope(&date);
        let signature = self.sign(&date, &credential_scope, &canonical_request);

        format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.access_key, credential_scope, signed_headers, signature
        )
    }

    /// Query-string authenticated URL (X-Amz-* parameters, unsigned payload)
    pub fn presign(&self, request: &Request, expires_secs: u64) -> Result<String> {
        if expires_secs == 0 || expires_secs > MAX_PRESIGN_EXPIRES {
            return Err(S3Error::invalid_input(format!(
                "pre-signed URL expiry must be between 1 and {} seconds, got {}",
                MAX_PRESIGN_EXPIRES, expires_secs
            )));
        }

        let date = request.date();
        let credential_scope = self.credential_scope(&date);

        let mut params = request.params().clone();
        params.insert("X-Amz-Algorithm".to_string(), ALGORITHM.to_string());
        params.insert(
            "X-Amz-Credential".to_string(),
            format!("{}/{}", self.access_key, credential_scope),
        );
        params.insert(
            "X-Amz-Date".to_string(),
            date.format(AMZ_DATE_FORMAT).to_string(),
        );
        params.insert("X-Amz-Expires".to_string(), expires_secs.to_string());
        params.insert("X-Amz-SignedHeaders".to_string(), "host".to_string());

        let canonical_query = create_canonical_query_string(&params);
        let canonical_request = format!(
            "{}\n{}\n{}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
            request.method(),
            request.canonical_uri(),
            canonical_query,
            request.host()
        );

        let signature = self.sign(&date, &credential_scope, &canonical_request);

        Ok(format!(
            "{}://{}{}?{}&X-Amz-Signature={}",
            request.config().scheme(),
            request.host(),
            request.canonical_uri(),
            canonical_query,
            signature
        ))
    }

    fn sign(&self, date: &DateTime<Utc>, credential_scope: &str, canonical_request: &str) -> String {
        let canonical_request_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            date.format(AMZ_DATE_FORMAT),
            credential_scope,
            canonical_request_hash
        );

        tracing::trace!(
            canonical_request = %canonical_request,
            string_to_sign = %string_to_sign,
            "SigV4"
        );

        let date_stamp = date.format("%Y%m%d").to_string();
        self.calculate_signature(&date_stamp, &string_to_sign)
    }

    /// Calculate the signature with daily signing key cache
    fn calculate_signature(&self, date_stamp: &str, string_to_sign: &str) -> String {
        let signing_key = match self.cached_signing_key.lock() {
            Ok(mut cache) => match cache.as_ref() {
                Some((cached_date, cached_key)) if cached_date == date_stamp => *cached_key,
                _ => {
                    let key = self.derive_signing_key(date_stamp);
                    *cache = Some((date_stamp.to_string(), key));
                    key
                }
            },
            // A poisoned cache only loses the memoised key
            Err(_) => self.derive_signing_key(date_stamp),
        };

        hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()))
    }

    fn derive_signing_key(&self, date_stamp: &str) -> [u8; 32] {
        derive_key_from(&self.aws4_key, date_stamp, &self.region, SERVICE)
    }
}

/// Derive a SigV4 signing key (4 chained HMAC operations)
pub fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> [u8; 32] {
    derive_key_from(format!("AWS4{}", secret_key).as_bytes(), date_stamp, region, service)
}

fn derive_key_from(aws4_key: &[u8], date_stamp: &str, region: &str, service: &str) -> [u8; 32] {
    let k_date = hmac_sha256(aws4_key, date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// HMAC-SHA256 returning fixed-size array
fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(msg);
    let result = mac.finalize().into_bytes();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Headers covered by the signature: standard and `x-amz-*`, lower-cased,
/// empty values skipped.
fn canonical_header_map(request: &Request) -> BTreeMap<String, String> {
    request
        .headers()
        .iter()
        .chain(request.amz_headers())
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
        .collect()
}

/// Create canonical headers - keys are lowercase and sorted by BTreeMap
fn create_canonical_headers(headers: &BTreeMap<String, String>) -> String {
    let mut result = String::with_capacity(headers.len() * 64);
    for (k, v) in headers {
        result.push_str(k);
        result.push(':');
        result.push_str(v);
        result.push('\n');
    }
    result
}

/// Create signed headers list
fn create_signed_headers(headers: &BTreeMap<String, String>) -> String {
    headers.keys().map(String::as_str).collect::<Vec<_>>().join(";")
}

/// Canonical query string: RFC 3986 encoded, sorted by encoded key, `key=` for empty values
fn create_canonical_query_string(params: &BTreeMap<String, String>) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    encoded.sort_unstable();

    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}
