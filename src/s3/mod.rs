//! S3 protocol layer
//!
//! This module provides:
//! - Payload sources with lazy SHA-256/MD5 digests
//! - AWS Signature Version 4 and legacy Version 2 signing, pre-signed URLs
//! - A request executor over a pluggable HTTP transport
//! - Concurrent multipart uploads
//! - The [`S3Client`] façade with typed errors

pub mod client;
pub mod error;
pub mod executor;
pub mod input;
pub mod multipart;
pub mod request;
pub mod response;
pub mod signer;
pub mod signer_v2;
pub mod types;
pub mod xml;

// Re-export main types for convenience
pub use client::S3Client;
pub use error::{Result, S3Error};
pub use executor::{Executor, HyperTransport, Sink, Transport};
pub use input::Input;
pub use multipart::{MultipartUpload, MultipartUploader, UploadState};
pub use request::Request;
pub use response::{MetaValue, ObjectInfo, Response, ResponseHeaders, TransportError};
pub use signer::{Signer, SignerV4};
pub use signer_v2::SignerV2;
pub use types::{
    Acl, Bucket, CompleteMultipartUploadResponse, CompletedPart, InitiateMultipartUploadResponse,
    ListObjectsPage, ListObjectsRequest, MultipartConfig, PutOptions, S3Object, StorageClass,
};
