//! S3 value types: listing entries, multipart bookkeeping, upload options

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Smallest part size S3 accepts for any part but the last
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Most parts a single multipart upload may have
pub const MAX_PARTS: u64 = 10_000;

/// S3 Object metadata from a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Object {
    /// Object key
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Last modified timestamp (ISO-8601 as returned by S3)
    pub last_modified: Option<String>,
    /// ETag without surrounding quotes
    pub etag: Option<String>,
    /// Storage class (STANDARD, STANDARD_IA, GLACIER, etc.)
    pub storage_class: Option<String>,
}

impl S3Object {
    /// Create a new S3Object
    pub fn new(key: String, size: u64) -> Self {
        Self {
            key,
            size,
            last_modified: None,
            etag: None,
            storage_class: None,
        }
    }
}

/// Parameters of one ListObjects page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListObjectsRequest {
    /// Only keys starting with this prefix
    pub prefix: Option<String>,
    /// Start listing after this key
    pub marker: Option<String>,
    /// Page size (S3 caps it at 1000)
    pub max_keys: Option<u32>,
    /// Group keys sharing a prefix up to this delimiter into common prefixes
    pub delimiter: Option<String>,
}

impl Default for ListObjectsRequest {
    fn default() -> Self {
        Self {
            prefix: None,
            marker: None,
            max_keys: None,
            delimiter: Some("/".to_string()),
        }
    }
}

impl ListObjectsRequest {
    /// List the flat "directory" under `prefix`: nested keys are folded into
    /// common prefixes by the `/` delimiter.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    /// Drop the delimiter so nested keys are listed too
    pub fn recursive(mut self) -> Self {
        self.delimiter = None;
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn with_max_keys(mut self, max_keys: u32) -> Self {
        self.max_keys = Some(max_keys);
        self
    }
}

/// One page of a ListObjects response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListObjectsPage {
    /// Objects in key order
    pub contents: Vec<S3Object>,
    /// Common prefixes (subdirectories when using delimiter)
    pub common_prefixes: Vec<String>,
    /// Whether more results follow
    pub is_truncated: bool,
    /// Marker to submit for the next page; set only when truncated
    pub next_marker: Option<String>,
    /// Prefix used in the request
    pub prefix: Option<String>,
    /// Max keys requested
    pub max_keys: Option<u32>,
}

impl ListObjectsPage {
    /// Create a new empty page
    pub fn new() -> Self {
        Self::default()
    }
}

/// Bucket entry from ListAllMyBuckets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    pub creation_date: Option<String>,
}

// =============================================================================
// Multipart Upload Types
// =============================================================================

/// Response from InitiateMultipartUpload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateMultipartUploadResponse {
    /// Bucket name
    pub bucket: String,
    /// Object key
    pub key: String,
    /// Upload ID for subsequent part, complete and abort requests
    pub upload_id: String,
}

impl InitiateMultipartUploadResponse {
    /// Create a new response
    pub fn new(bucket: String, key: String, upload_id: String) -> Self {
        Self { bucket, key, upload_id }
    }
}

/// Part information for CompleteMultipartUpload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    /// Part number (1-10000)
    pub part_number: u32,
    /// ETag returned from UploadPart, without quotes
    pub etag: String,
}

impl CompletedPart {
    /// Create a new completed part
    pub fn new(part_number: u32, etag: String) -> Self {
        Self { part_number, etag }
    }
}

/// Response from CompleteMultipartUpload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteMultipartUploadResponse {
    /// Location URL of the completed object
    pub location: Option<String>,
    /// Bucket name
    pub bucket: String,
    /// Object key
    pub key: String,
    /// ETag of the completed object
    pub etag: String,
}

impl CompleteMultipartUploadResponse {
    /// Create a new response
    pub fn new(bucket: String, key: String, etag: String) -> Self {
        Self {
            location: None,
            bucket,
            key,
            etag,
        }
    }
}

/// Configuration for multipart uploads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartConfig {
    /// Part size in bytes (default and minimum: 5 MiB)
    pub part_size: usize,
    /// Maximum concurrent part uploads (default: 4)
    pub concurrency: usize,
    /// Inputs strictly larger than this use multipart (default: 5 MiB)
    pub threshold: u64,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            part_size: MIN_PART_SIZE,
            concurrency: 4,
            threshold: MIN_PART_SIZE as u64,
        }
    }
}

impl MultipartConfig {
    /// Create a new config with custom part size
    pub fn with_part_size(mut self, size: usize) -> Self {
        // Enforce S3 minimum of 5MB (except for last part)
        self.part_size = size.max(MIN_PART_SIZE);
        self
    }

    /// Create a new config with custom concurrency
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Create a new config with custom threshold
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }
}

// =============================================================================
// Upload options
// =============================================================================

/// Canned ACLs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Acl {
    Private,
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
    BucketOwnerRead,
    BucketOwnerFullControl,
}

impl Acl {
    pub fn as_str(&self) -> &'static str {
        match self {
            Acl::Private => "private",
            Acl::PublicRead => "public-read",
            Acl::PublicReadWrite => "public-read-write",
            Acl::AuthenticatedRead => "authenticated-read",
            Acl::BucketOwnerRead => "bucket-owner-read",
            Acl::BucketOwnerFullControl => "bucket-owner-full-control",
        }
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Acl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Acl::Private,
            Acl::PublicRead,
            Acl::PublicReadWrite,
            Acl::AuthenticatedRead,
            Acl::BucketOwnerRead,
            Acl::BucketOwnerFullControl,
        ]
        .into_iter()
        .find(|acl| acl.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| format!("unknown canned ACL '{}'", s))
    }
}

/// Storage classes accepted by `x-amz-storage-class`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageClass {
    Standard,
    ReducedRedundancy,
    StandardIa,
    OnezoneIa,
    IntelligentTiering,
    Glacier,
    DeepArchive,
}

impl StorageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageClass::Standard => "STANDARD",
            StorageClass::ReducedRedundancy => "REDUCED_REDUNDANCY",
            StorageClass::StandardIa => "STANDARD_IA",
            StorageClass::OnezoneIa => "ONEZONE_IA",
            StorageClass::IntelligentTiering => "INTELLIGENT_TIERING",
            StorageClass::Glacier => "GLACIER",
            StorageClass::DeepArchive => "DEEP_ARCHIVE",
        }
    }
}

impl FromStr for StorageClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        [
            StorageClass::Standard,
            StorageClass::ReducedRedundancy,
            StorageClass::StandardIa,
            StorageClass::OnezoneIa,
            StorageClass::IntelligentTiering,
            StorageClass::Glacier,
            StorageClass::DeepArchive,
        ]
        .into_iter()
        .find(|class| class.as_str().eq_ignore_ascii_case(&wanted))
        .ok_or_else(|| format!("unknown storage class '{}'", s))
    }
}

/// Optional headers for object uploads
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Content-Type (default: application/octet-stream)
    pub content_type: Option<String>,
    pub acl: Option<Acl>,
    pub storage_class: Option<StorageClass>,
    /// User metadata, sent as `x-amz-meta-<name>`
    pub metadata: BTreeMap<String, String>,
}

impl PutOptions {
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_acl(mut self, acl: Acl) -> Self {
        self.acl = Some(acl);
        self
    }

    pub fn with_storage_class(mut self, storage_class: StorageClass) -> Self {
        self.storage_class = Some(storage_class);
        self
    }

    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_config_enforces_minimum() {
        let config = MultipartConfig::default().with_part_size(1024);
        assert_eq!(config.part_size, MIN_PART_SIZE);

        let config = MultipartConfig::default().with_concurrency(0);
        assert_eq!(config.concurrency, 1);

        let config = MultipartConfig::default().with_part_size(8 * 1024 * 1024);
        assert_eq!(config.part_size, 8 * 1024 * 1024);
    }

    #[test]
    fn test_parse_acl_and_storage_class() {
        assert_eq!("public-read".parse::<Acl>(), Ok(Acl::PublicRead));
        assert_eq!(
            "BUCKET-OWNER-FULL-CONTROL".parse::<Acl>(),
            Ok(Acl::BucketOwnerFullControl)
        );
        assert!("world-writable".parse::<Acl>().is_err());

        assert_eq!("standard_ia".parse::<StorageClass>(), Ok(StorageClass::StandardIa));
        assert_eq!("deep-archive".parse::<StorageClass>(), Ok(StorageClass::DeepArchive));
        assert!("COLD".parse::<StorageClass>().is_err());
    }

    #[test]
    fn test_list_request_defaults_to_flat_listing() {
        let request = ListObjectsRequest::with_prefix("photos/");
        assert_eq!(request.delimiter.as_deref(), Some("/"));
        assert_eq!(request.prefix.as_deref(), Some("photos/"));

        let request = request.recursive().with_max_keys(10);
        assert_eq!(request.delimiter, None);
        assert_eq!(request.max_keys, Some(10));
    }

    #[test]
    fn test_canned_acl_names() {
        assert_eq!(Acl::PublicRead.as_str(), "public-read");
        assert_eq!(Acl::BucketOwnerFullControl.to_string(), "bucket-owner-full-control");
        assert_eq!(StorageClass::StandardIa.as_str(), "STANDARD_IA");
    }
}
