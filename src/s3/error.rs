//! Error taxonomy for the protocol layer

use hyper::StatusCode;
use thiserror::Error;

/// S3 client errors
#[derive(Error, Debug)]
pub enum S3Error {
    /// Network or TLS failure before any HTTP response was received
    #[error("transport error on {resource}: {message}")]
    Transport { resource: String, message: String },

    /// The server answered with a non-2xx status
    #[error("S3 error on {resource}: {status} {code} - {message}")]
    Protocol {
        status: StatusCode,
        /// S3 error code from the `<Error>` document (empty when absent)
        code: String,
        message: String,
        resource: String,
    },

    /// Invalid or missing credentials, region, endpoint or signature method
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unreadable local payload source
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A part upload failed; the session was aborted
    #[error("multipart upload {upload_id} failed at part {part_number}: {source}")]
    MultipartFailure {
        upload_id: String,
        part_number: u32,
        #[source]
        source: Box<S3Error>,
    },

    /// Malformed XML document in a response body
    #[error("XML parse error: {0}")]
    Xml(String),

    /// Local I/O failure while writing a response body
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for S3Error {
    fn from(err: quick_xml::Error) -> Self {
        S3Error::Xml(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, S3Error>;

impl S3Error {
    /// HTTP status of a protocol error
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            S3Error::Protocol { status, .. } => Some(*status),
            S3Error::MultipartFailure { source, .. } => source.status(),
            _ => None,
        }
    }

    /// True for a 404 protocol error (missing key or bucket)
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        S3Error::InvalidInput(message.into())
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        S3Error::Configuration(message.into())
    }
}
