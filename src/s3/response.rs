//! Normalised outcome of one executed request

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, StatusCode};
use std::collections::BTreeMap;
use std::fmt;

use crate::s3::error::{Result, S3Error};
use crate::s3::xml::parse_error_document;

const META_PREFIX: &str = "x-amz-meta-";

/// Failure before any HTTP response arrived (DNS, connect, TLS, reset)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// User metadata value; numeric strings are coerced to integers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaValue {
    Int(i64),
    Text(String),
}

impl MetaValue {
    fn parse(value: &str) -> Self {
        match value.parse::<i64>() {
            Ok(n) => MetaValue::Int(n),
            Err(_) => MetaValue::Text(value.to_string()),
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Int(n) => write!(f, "{}", n),
            MetaValue::Text(s) => f.write_str(s),
        }
    }
}

/// Well-known response headers pulled out of the raw map
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaders {
    /// Content-Length
    pub size: Option<u64>,
    /// Last-Modified in UTC
    pub time: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    /// ETag without quotes
    pub hash: Option<String>,
    /// `x-amz-meta-*` values keyed by the name after the prefix
    pub meta: BTreeMap<String, MetaValue>,
    /// Every header as received
    pub raw: HeaderMap,
}

impl ResponseHeaders {
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let text = |name: http::header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let meta = headers
            .iter()
            .filter_map(|(name, value)| {
                let suffix = name.as_str().strip_prefix(META_PREFIX)?;
                let value = value.to_str().ok()?;
                Some((suffix.to_string(), MetaValue::parse(value.trim())))
            })
            .collect();

        Self {
            size: text(http::header::CONTENT_LENGTH).and_then(|v| v.trim().parse().ok()),
            time: text(http::header::LAST_MODIFIED)
                .and_then(|v| DateTime::parse_from_rfc2822(v.trim()).ok())
                .map(|t| t.with_timezone(&Utc)),
            content_type: text(http::header::CONTENT_TYPE),
            hash: text(http::header::ETAG).map(|v| v.trim().trim_matches('"').to_string()),
            meta,
            raw: headers.clone(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.raw.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Object attributes reported by GET and HEAD
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectInfo {
    pub size: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub metadata: BTreeMap<String, MetaValue>,
}

impl From<ResponseHeaders> for ObjectInfo {
    fn from(headers: ResponseHeaders) -> Self {
        Self {
            size: headers.size,
            last_modified: headers.time,
            content_type: headers.content_type,
            etag: headers.hash,
            metadata: headers.meta,
        }
    }
}

/// Result of [`Executor::execute`](crate::s3::executor::Executor::execute).
///
/// `status` is absent when no response head arrived; `error` is set for any
/// transport failure, including one while reading the body.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: Option<StatusCode>,
    pub headers: ResponseHeaders,
    /// Buffered body; empty when the body was streamed to a sink
    pub body: Bytes,
    pub error: Option<TransportError>,
}

impl Response {
    pub fn from_transport_error(error: TransportError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status.is_some_and(|s| s.is_success())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Map a transport failure or a non-2xx status onto the error taxonomy
    pub fn error_for_status(self, resource: &str) -> Result<Self> {
        if let Some(error) = &self.error {
            return Err(S3Error::Transport {
                resource: resource.to_string(),
                message: error.message.clone(),
            });
        }

        match self.status {
            Some(status) if status.is_success() => Ok(self),
            Some(status) => Err(self.protocol_error(status, resource)),
            None => Err(S3Error::Transport {
                resource: resource.to_string(),
                message: "no response".to_string(),
            }),
        }
    }

    /// Protocol error from the `<Error>` document in the body, if any
    pub(crate) fn protocol_error(&self, status: StatusCode, resource: &str) -> S3Error {
        let document = parse_error_document(&self.body).unwrap_or_default();
        let message = if !document.message.is_empty() {
            document.message
        } else if !self.body.is_empty() && document.code.is_empty() {
            self.body_text()
        } else {
            status.canonical_reason().unwrap_or_default().to_string()
        };
        S3Error::Protocol {
            status,
            code: document.code,
            message,
            resource: resource.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_header_normalisation() {
        let mut headers = HeaderMap::new();
        headers.insert("content-length", HeaderValue::from_static("1024"));
        headers.insert("etag", HeaderValue::from_static("\"d41d8cd98f00b204e9800998ecf8427e\""));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        headers.insert(
            "last-modified",
            HeaderValue::from_static("Mon, 12 Oct 2009 17:50:00 GMT"),
        );
        headers.insert("x-amz-meta-count", HeaderValue::from_static("42"));
        headers.insert("x-amz-meta-owner", HeaderValue::from_static("alice"));

        let parsed = ResponseHeaders::from_header_map(&headers);
        assert_eq!(parsed.size, Some(1024));
        assert_eq!(parsed.hash.as_deref(), Some("d41d8cd98f00b204e9800998ecf8427e"));
        assert_eq!(parsed.content_type.as_deref(), Some("text/plain"));
        assert_eq!(
            parsed.time.map(|t| t.timestamp()),
            Some(1255369800)
        );
        assert_eq!(parsed.meta.get("count"), Some(&MetaValue::Int(42)));
        assert_eq!(
            parsed.meta.get("owner"),
            Some(&MetaValue::Text("alice".to_string()))
        );
        assert_eq!(parsed.get("x-amz-meta-owner"), Some("alice"));
    }

    #[test]
    fn test_transport_failure_is_not_success() {
        let response = Response::from_transport_error(TransportError::new("connection refused"));
        assert!(!response.is_success());
        assert_eq!(response.status, None);

        let ok = Response {
            status: Some(StatusCode::NO_CONTENT),
            ..Response::default()
        };
        assert!(ok.is_success());
    }

    #[test]
    fn test_error_for_status_mapping() {
        let transport = Response::from_transport_error(TransportError::new("reset"));
        assert!(matches!(
            transport.error_for_status("/b/k"),
            Err(S3Error::Transport { .. })
        ));

        let denied = Response {
            status: Some(StatusCode::FORBIDDEN),
            body: Bytes::from_static(
                b"<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>",
            ),
            ..Response::default()
        };
        match denied.error_for_status("/b/k") {
            Err(S3Error::Protocol {
                status,
                code,
                message,
                resource,
            }) => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(code, "AccessDenied");
                assert_eq!(message, "Access Denied");
                assert_eq!(resource, "/b/k");
            }
            other => panic!("unexpected {:?}", other),
        }

        // HEAD responses carry no body
        let missing = Response {
            status: Some(StatusCode::NOT_FOUND),
            ..Response::default()
        };
        let err = missing.error_for_status("/b/k").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Not Found"));
    }
}
