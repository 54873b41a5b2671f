//! s3link - S3 REST client over raw HTTP

pub mod config;
pub mod s3;

pub use config::{Configuration, SignatureMethod};
pub use s3::{Input, S3Client, S3Error};
