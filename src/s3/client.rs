//! High-level S3 operations
//!
//! [`S3Client`] maps each operation onto one or more executed requests and
//! turns outcomes into [`S3Error`]s: transport failures become
//! `Transport`, non-2xx answers become `Protocol` with the code and message
//! of the S3 `<Error>` document.

use bytes::Bytes;
use http::Method;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Configuration;
use crate::s3::error::{Result, S3Error};
use crate::s3::executor::{Executor, HyperTransport, Sink, Transport};
use crate::s3::input::Input;
use crate::s3::multipart::MultipartUploader;
use crate::s3::request::Request;
use crate::s3::response::{ObjectInfo, Response};
use crate::s3::types::{
    Bucket, CompleteMultipartUploadResponse, ListObjectsPage, ListObjectsRequest,
    MultipartConfig, PutOptions,
};
use crate::s3::xml;

/// S3 client for one configuration
pub struct S3Client<T: Transport = HyperTransport> {
    executor: Executor<T>,
    multipart: MultipartConfig,
}

impl S3Client<HyperTransport> {
    /// Create a client on the production HTTP transport
    pub fn new(config: Configuration) -> Result<Self> {
        let executor = Executor::new(Arc::new(config))?;
        Ok(Self {
            executor,
            multipart: MultipartConfig::default(),
        })
    }
}

impl<T: Transport> S3Client<T> {
    pub fn with_transport(config: Configuration, transport: T) -> Self {
        Self {
            executor: Executor::with_transport(Arc::new(config), transport),
            multipart: MultipartConfig::default(),
        }
    }

    /// Override part size, concurrency and threshold of [`S3Client::upload`]
    pub fn with_multipart_config(mut self, config: MultipartConfig) -> Self {
        self.multipart = config;
        self
    }

    pub fn config(&self) -> &Configuration {
        self.executor.config()
    }

    pub fn multipart_config(&self) -> &MultipartConfig {
        &self.multipart
    }

    pub fn executor(&self) -> &Executor<T> {
        &self.executor
    }

    fn request(&self, method: Method, bucket: &str, key: &str) -> Request {
        self.executor.request(method, bucket, key)
    }

    async fn send(&self, request: Request, sink: Option<Sink<'_>>) -> Result<Response> {
        let resource = request.resource();
        self.executor
            .execute(request, sink)
            .await?
            .error_for_status(&resource)
    }

    /// Store `input` as one object; returns its ETag
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        input: Input,
        options: &PutOptions,
    ) -> Result<String> {
        let mut request = self.request(Method::PUT, bucket, key);
        request.set_put_options(options);
        request.set_input(input);

        let response = self.send(request, None).await?;
        Ok(response.headers.hash.unwrap_or_default())
    }

    /// Read a whole object into memory
    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let request = self.request(Method::GET, bucket, key);
        Ok(self.send(request, None).await?.body)
    }

    /// Read `length` bytes starting at `offset`
    pub async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
    ) -> Result<Bytes> {
        if length == 0 {
            return Err(S3Error::invalid_input("range length must be positive"));
        }
        let last = offset.checked_add(length - 1).ok_or_else(|| {
            S3Error::invalid_input(format!(
                "range {}+{} runs past the largest object offset",
                offset, length
            ))
        })?;
        let mut request = self.request(Method::GET, bucket, key);
        request.set_header("range", format!("bytes={}-{}", offset, last));
        Ok(self.send(request, None).await?.body)
    }

    /// Stream an object into `sink`
    pub async fn get_object_to_writer(
        &self,
        bucket: &str,
        key: &str,
        sink: Sink<'_>,
    ) -> Result<ObjectInfo> {
        let request = self.request(Method::GET, bucket, key);
        let response = self.send(request, Some(sink)).await?;
        Ok(response.headers.into())
    }

    /// Stream an object into a local file.
    ///
    /// The file is removed again when the download fails.
    pub async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        path: impl AsRef<Path>,
    ) -> Result<ObjectInfo> {
        let path = path.as_ref();
        let mut file = tokio::fs::File::create(path).await?;

        match self.get_object_to_writer(bucket, key, &mut file).await {
            Ok(info) => Ok(info),
            Err(e) => {
                drop(file);
                if let Err(remove_err) = tokio::fs::remove_file(path).await {
                    tracing::warn!(path = %path.display(), error = %remove_err, "failed to remove partial download");
                }
                Err(e)
            }
        }
    }

    /// Object attributes without the body
    pub async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo> {
        let request = self.request(Method::HEAD, bucket, key);
        Ok(self.send(request, None).await?.headers.into())
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let request = self.request(Method::DELETE, bucket, key);
        self.send(request, None).await?;
        Ok(())
    }

    /// One page of ListObjects
    pub async fn list_objects(
        &self,
        bucket: &str,
        list: &ListObjectsRequest,
    ) -> Result<ListObjectsPage> {
        let mut request = self.request(Method::GET, bucket, "");
        if let Some(prefix) = &list.prefix {
            request.set_parameter("prefix", prefix.as_str());
        }
        if let Some(marker) = &list.marker {
            request.set_parameter("marker", marker.as_str());
        }
        if let Some(max_keys) = list.max_keys {
            request.set_parameter("max-keys", max_keys.to_string());
        }
        if let Some(delimiter) = &list.delimiter {
            request.set_parameter("delimiter", delimiter.as_str());
        }

        let response = self.send(request, None).await?;
        xml::parse_list_objects(&response.body)
    }

    /// Follow continuation markers until the listing is complete
    pub async fn list_all_objects(
        &self,
        bucket: &str,
        list: ListObjectsRequest,
    ) -> Result<ListObjectsPage> {
        let mut list = list;
        let mut all = ListObjectsPage {
            prefix: list.prefix.clone(),
            max_keys: list.max_keys,
            ..ListObjectsPage::new()
        };

        loop {
            let page = self.list_objects(bucket, &list).await?;
            all.contents.extend(page.contents);
            all.common_prefixes.extend(page.common_prefixes);

            if !page.is_truncated {
                break;
            }
            match page.next_marker {
                Some(marker) if list.marker.as_deref() != Some(marker.as_str()) => {
                    tracing::debug!(bucket = %bucket, marker = %marker, "fetching next listing page");
                    list.marker = Some(marker);
                }
                _ => {
                    return Err(S3Error::Xml(
                        "truncated listing without a new continuation marker".to_string(),
                    ))
                }
            }
        }

        Ok(all)
    }

    pub async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        let request = self.request(Method::GET, "", "");
        let response = self.send(request, None).await?;
        xml::parse_list_buckets(&response.body)
    }

    /// Region the bucket lives in
    pub async fn get_bucket_location(&self, bucket: &str) -> Result<String> {
        let mut request = self.request(Method::GET, bucket, "");
        request.set_parameter("location", "");
        let response = self.send(request, None).await?;
        xml::parse_location(&response.body)
    }

    /// Store `input`, switching to multipart above the configured threshold.
    /// Returns the object's ETag.
    pub async fn upload(
        &self,
        bucket: &str,
        key: &str,
        input: Input,
        options: &PutOptions,
    ) -> Result<String> {
        if input.size() > self.multipart.threshold {
            let completed = self.upload_multipart(bucket, key, input, options).await?;
            Ok(completed.etag)
        } else {
            self.put_object(bucket, key, input, options).await
        }
    }

    pub async fn upload_multipart(
        &self,
        bucket: &str,
        key: &str,
        input: Input,
        options: &PutOptions,
    ) -> Result<CompleteMultipartUploadResponse> {
        MultipartUploader::new(&self.executor, self.multipart.clone())
            .upload(input, bucket, key, options)
            .await
    }

    /// URL granting `method` on the object for `expires`
    pub fn presigned_url(
        &self,
        method: Method,
        bucket: &str,
        key: &str,
        expires: Duration,
    ) -> Result<String> {
        let request = self.request(method, bucket, key);
        self.executor.signer().presign(&request, expires.as_secs())
    }
}
