//! A single S3 operation before signing
//!
//! [`Request`] collects everything that goes into the canonical form of an
//! operation: verb, addressing, query parameters, headers and the payload.
//! The signer reads it, the executor consumes it.

use chrono::{DateTime, Utc};
use http::Method;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::{Configuration, SignatureMethod};
use crate::s3::error::Result;
use crate::s3::input::Input;
use crate::s3::types::PutOptions;

/// SHA-256 of the empty string, the payload hash of bodiless requests
pub const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Hex lookup table for percent encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

pub(crate) const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
pub(crate) const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S +0000";

/// URI encode a string (RFC 3986): everything except unreserved characters
/// (and `/` unless `encode_slash`) is percent-encoded with uppercase hex.
pub fn uri_encode(s: &str, encode_slash: bool) -> String {
    let mut result = String::with_capacity(s.len() + 16);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            b'/' if !encode_slash => {
                result.push('/');
            }
            _ => {
                result.push('%');
                result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
            }
        }
    }
    result
}

/// One S3 operation: addressing, parameters, headers and optional payload
#[derive(Debug)]
pub struct Request {
    method: Method,
    bucket: String,
    key: String,
    /// Encoded object path, always starting with `/`
    uri: String,
    params: BTreeMap<String, String>,
    /// Standard headers, keyed by lower-cased name
    headers: BTreeMap<String, String>,
    /// `x-amz-*` headers, keyed by lower-cased name
    amz_headers: BTreeMap<String, String>,
    input: Option<Input>,
    date: DateTime<Utc>,
    config: Arc<Configuration>,
}

impl Request {
    /// Address `key` in `bucket` (either may be empty) and stamp the current time
    pub fn new(method: Method, bucket: &str, key: &str, config: Arc<Configuration>) -> Self {
        let uri = format!("/{}", uri_encode(key, false));

        let host = if bucket.is_empty() || config.use_path_style(bucket) {
            config.endpoint().to_string()
        } else {
            format!("{}.{}", bucket, config.endpoint())
        };

        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), host);

        let mut request = Self {
            method,
            bucket: bucket.to_string(),
            key: key.to_string(),
            uri,
            params: BTreeMap::new(),
            headers,
            amz_headers: BTreeMap::new(),
            input: None,
            date: Utc::now(),
            config,
        };
        request.stamp_date();
        request
    }

    fn stamp_date(&mut self) {
        match self.config.signature_method() {
            SignatureMethod::V4 => {
                self.amz_headers.insert(
                    "x-amz-date".to_string(),
                    self.date.format(AMZ_DATE_FORMAT).to_string(),
                );
            }
            SignatureMethod::V2 => {
                self.headers.insert(
                    "date".to_string(),
                    self.date.format(HTTP_DATE_FORMAT).to_string(),
                );
            }
        }
    }

    /// Override the request timestamp (reproducible signatures, pre-signed URLs)
    pub fn set_date(&mut self, date: DateTime<Utc>) {
        self.date = date;
        self.stamp_date();
    }

    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.insert(name.into(), value.into());
    }

    /// Set a header; `x-amz-*` names are routed to the amz set
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        if name.starts_with("x-amz-") {
            self.amz_headers.insert(name, value.into());
        } else {
            self.headers.insert(name, value.into());
        }
    }

    pub fn set_amz_header(&mut self, name: &str, value: impl Into<String>) {
        self.amz_headers
            .insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn set_input(&mut self, input: Input) {
        self.input = Some(input);
    }

    /// Content type, canned ACL, storage class and user metadata headers
    pub fn set_put_options(&mut self, options: &PutOptions) {
        let content_type = options
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        self.set_header("content-type", content_type);
        if let Some(acl) = options.acl {
            self.set_amz_header("x-amz-acl", acl.as_str());
        }
        if let Some(storage_class) = options.storage_class {
            self.set_amz_header("x-amz-storage-class", storage_class.as_str());
        }
        for (name, value) in &options.metadata {
            self.set_amz_header(&format!("x-amz-meta-{}", name), value.as_str());
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Encoded object path (`/` for the bucket root)
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn amz_headers(&self) -> &BTreeMap<String, String> {
        &self.amz_headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .get(&name)
            .or_else(|| self.amz_headers.get(&name))
            .map(String::as_str)
    }

    pub fn host(&self) -> &str {
        self.headers.get("host").map(String::as_str).unwrap_or_default()
    }

    pub fn input(&self) -> Option<&Input> {
        self.input.as_ref()
    }

    pub(crate) fn take_input(&mut self) -> Option<Input> {
        self.input.take()
    }

    /// Payload size sent as Content-Length
    pub fn content_length(&self) -> u64 {
        self.input.as_ref().map(Input::size).unwrap_or(0)
    }

    pub fn uses_path_style(&self) -> bool {
        !self.bucket.is_empty() && self.config.use_path_style(&self.bucket)
    }

    /// `/bucket/uri` for buckets, `/` for service-level requests
    pub fn resource(&self) -> String {
        if self.bucket.is_empty() {
            self.uri.clone()
        } else {
            format!("/{}{}", self.bucket, self.uri)
        }
    }

    /// Path as sent on the wire and signed: the bucket segment only appears
    /// for path-style addressing.
    pub fn canonical_uri(&self) -> String {
        if self.uses_path_style() {
            self.resource()
        } else {
            self.uri.clone()
        }
    }

    /// Query string for the URL: sorted, bare `key` when the value is empty
    pub fn wire_query(&self) -> String {
        let mut result = String::new();
        for (name, value) in &self.params {
            if !result.is_empty() {
                result.push('&');
            }
            result.push_str(&uri_encode(name, true));
            if !value.is_empty() {
                result.push('=');
                result.push_str(&uri_encode(value, true));
            }
        }
        result
    }

    /// Path and query as they appear in the request line
    pub fn path_and_query(&self) -> String {
        let query = self.wire_query();
        if query.is_empty() {
            self.canonical_uri()
        } else {
            format!("{}?{}", self.canonical_uri(), query)
        }
    }

    pub fn url(&self) -> String {
        format!(
            "{}://{}{}",
            self.config.scheme(),
            self.host(),
            self.path_and_query()
        )
    }

    /// Whether the `Date` header is left off the wire: a SigV2 GET with an
    /// `Expires` parameter signs the expiry instead.
    pub fn omits_date(&self) -> bool {
        self.config.signature_method() == SignatureMethod::V2
            && self.method == Method::GET
            && self.params.contains_key("Expires")
    }

    /// Hash declared in `x-amz-content-sha256`, or the empty-payload hash
    pub fn payload_hash(&self) -> &str {
        self.amz_headers
            .get("x-amz-content-sha256")
            .map(String::as_str)
            .unwrap_or(EMPTY_SHA256)
    }

    fn is_bodiless(&self) -> bool {
        matches!(self.method, Method::GET | Method::HEAD | Method::DELETE)
            || self.input.as_ref().map_or(true, Input::is_empty)
    }

    /// Compute payload digests and add the headers derived from them.
    ///
    /// Reading an unreadable file fails here with `InvalidInput`, before
    /// anything is sent.
    pub async fn prepare(&mut self) -> Result<()> {
        let bodiless = self.is_bodiless();

        let (sha256, md5) = match self.input.as_mut() {
            Some(input) if !bodiless => {
                let sha256 = input.content_hash().await?.to_string();
                let md5 = input.content_md5().await?.to_string();
                (sha256, Some(md5))
            }
            _ => (EMPTY_SHA256.to_string(), None),
        };

        if self.config.signature_method() == SignatureMethod::V4 {
            self.amz_headers
                .insert("x-amz-content-sha256".to_string(), sha256);
        }
        if let Some(md5) = md5 {
            self.headers
                .entry("content-md5".to_string())
                .or_insert(md5);
        }
        Ok(())
    }
}
