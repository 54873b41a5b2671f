//! Multipart uploads
//!
//! A [`MultipartUpload`] is one server-side session:
//!
//! ```text
//! NotStarted -> Initiated -> UploadingParts -> Completed
//!                    \              \
//!                     `--------------`-----> Aborted
//! ```
//!
//! [`MultipartUploader`] drives a whole input through a session with bounded
//! part concurrency. The first failed part stops dispatching, cancels the
//! parts still in flight and aborts the session.

use futures::stream::{self, StreamExt};
use http::{Method, StatusCode};
use std::collections::BTreeMap;

use crate::s3::error::{Result, S3Error};
use crate::s3::executor::{Executor, HyperTransport, Transport};
use crate::s3::input::Input;
use crate::s3::types::{
    CompleteMultipartUploadResponse, CompletedPart, MultipartConfig, PutOptions, MAX_PARTS,
};
use crate::s3::xml;

/// Lifecycle of a multipart session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    NotStarted,
    Initiated,
    UploadingParts,
    Completed,
    Aborted,
}

/// Byte range of one part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    /// 1-based part number
    pub number: u32,
    pub offset: u64,
    pub length: u64,
}

/// Split `size` bytes into `ceil(size / part_size)` parts, the last one
/// carrying the remainder. An empty input is a single empty part.
pub fn plan_parts(size: u64, part_size: u64) -> Result<Vec<PartPlan>> {
    if part_size == 0 {
        return Err(S3Error::configuration("part size must be positive"));
    }

    let count = size.div_ceil(part_size).max(1);
    if count > MAX_PARTS {
        return Err(S3Error::configuration(format!(
            "{} bytes in parts of {} bytes needs {} parts; at most {} are allowed",
            size, part_size, count, MAX_PARTS
        )));
    }

    Ok((0..count)
        .map(|index| {
            let offset = index * part_size;
            PartPlan {
                number: index as u32 + 1,
                offset,
                length: part_size.min(size - offset.min(size)),
            }
        })
        .collect())
}

/// Upload one part of an open session. Safe to run concurrently.
async fn send_part<T: Transport>(
    executor: &Executor<T>,
    bucket: &str,
    key: &str,
    upload_id: &str,
    part_number: u32,
    input: Input,
) -> Result<CompletedPart> {
    let mut request = executor.request(Method::PUT, bucket, key);
    request.set_parameter("partNumber", part_number.to_string());
    request.set_parameter("uploadId", upload_id);
    request.set_input(input);
    let resource = request.resource();

    let response = executor
        .execute(request, None)
        .await?
        .error_for_status(&resource)?;

    let status = response.status.unwrap_or(StatusCode::OK);
    let etag = response.headers.hash.clone().ok_or_else(|| S3Error::Protocol {
        status,
        code: String::new(),
        message: format!("part {} response carries no ETag", part_number),
        resource: resource.clone(),
    })?;

    tracing::debug!(upload_id = %upload_id, part_number, etag = %etag, "part uploaded");
    Ok(CompletedPart::new(part_number, etag))
}

/// One server-side multipart session
pub struct MultipartUpload<'a, T: Transport = HyperTransport> {
    executor: &'a Executor<T>,
    bucket: String,
    key: String,
    upload_id: String,
    state: UploadState,
    /// Part number -> ETag, ascending
    parts: BTreeMap<u32, String>,
}

impl<'a, T: Transport> MultipartUpload<'a, T> {
    /// Open a session; `options` become the headers of the final object
    pub async fn initiate(
        executor: &'a Executor<T>,
        bucket: &str,
        key: &str,
        options: &PutOptions,
    ) -> Result<Self> {
        let mut request = executor.request(Method::POST, bucket, key);
        request.set_parameter("uploads", "");
        request.set_put_options(options);
        let resource = request.resource();

        let response = executor
            .execute(request, None)
            .await?
            .error_for_status(&resource)?;
        let initiated = xml::parse_initiate_multipart(&response.body)?;

        tracing::info!(
            bucket = %bucket,
            key = %key,
            upload_id = %initiated.upload_id,
            "multipart upload initiated"
        );

        Ok(Self {
            executor,
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: initiated.upload_id,
            state: UploadState::Initiated,
            parts: BTreeMap::new(),
        })
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Recorded parts in ascending part-number order
    pub fn parts(&self) -> Vec<CompletedPart> {
        self.parts
            .iter()
            .map(|(number, etag)| CompletedPart::new(*number, etag.clone()))
            .collect()
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        match self.state {
            UploadState::Initiated | UploadState::UploadingParts => Ok(()),
            state => Err(S3Error::invalid_input(format!(
                "cannot {} multipart upload {} in state {:?}",
                operation, self.upload_id, state
            ))),
        }
    }

    fn record_part(&mut self, part: CompletedPart) {
        self.state = UploadState::UploadingParts;
        self.parts.insert(part.part_number, part.etag);
    }

    /// Upload and record a single part
    pub async fn upload_part(&mut self, part_number: u32, input: Input) -> Result<CompletedPart> {
        self.ensure_open("upload a part to")?;
        if part_number == 0 || u64::from(part_number) > MAX_PARTS {
            return Err(S3Error::invalid_input(format!(
                "part number {} is outside 1..={}",
                part_number, MAX_PARTS
            )));
        }
        self.state = UploadState::UploadingParts;

        let part = send_part(
            self.executor,
            &self.bucket,
            &self.key,
            &self.upload_id,
            part_number,
            input,
        )
        .await?;
        self.record_part(part.clone());
        Ok(part)
    }

    /// Send the manifest of recorded parts and finish the object
    pub async fn complete(&mut self) -> Result<CompleteMultipartUploadResponse> {
        self.ensure_open("complete")?;
        if self.parts.is_empty() {
            return Err(S3Error::invalid_input(format!(
                "multipart upload {} has no parts",
                self.upload_id
            )));
        }

        let mut request = self.executor.request(Method::POST, &self.bucket, &self.key);
        request.set_parameter("uploadId", self.upload_id.as_str());
        request.set_header("content-type", "application/xml");
        request.set_input(Input::from_bytes(xml::complete_multipart_body(&self.parts())));
        let resource = request.resource();

        let response = self
            .executor
            .execute(request, None)
            .await?
            .error_for_status(&resource)?;

        // S3 may report a failed completion inside a 200 response
        if xml::parse_error_document(&response.body).is_some() {
            let status = response.status.unwrap_or(StatusCode::OK);
            return Err(response.protocol_error(status, &resource));
        }

        let completed = xml::parse_complete_multipart(&response.body)?;
        self.state = UploadState::Completed;

        tracing::info!(
            bucket = %self.bucket,
            key = %self.key,
            upload_id = %self.upload_id,
            parts = self.parts.len(),
            etag = %completed.etag,
            "multipart upload completed"
        );
        Ok(completed)
    }

    /// Discard the session and every uploaded part
    pub async fn abort(&mut self) -> Result<()> {
        self.ensure_open("abort")?;

        let mut request = self.executor.request(Method::DELETE, &self.bucket, &self.key);
        request.set_parameter("uploadId", self.upload_id.as_str());
        let resource = request.resource();

        self.executor
            .execute(request, None)
            .await?
            .error_for_status(&resource)?;
        self.state = UploadState::Aborted;

        tracing::info!(upload_id = %self.upload_id, "multipart upload aborted");
        Ok(())
    }
}

/// Uploads whole inputs through multipart sessions
pub struct MultipartUploader<'a, T: Transport = HyperTransport> {
    executor: &'a Executor<T>,
    config: MultipartConfig,
}

impl<'a, T: Transport> MultipartUploader<'a, T> {
    pub fn new(executor: &'a Executor<T>, config: MultipartConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &MultipartConfig {
        &self.config
    }

    /// Upload `input` as `bucket/key` in parts of `config.part_size`.
    ///
    /// Parts run `config.concurrency` at a time. On the first part failure the
    /// remaining parts are cancelled, the session is aborted (an abort failure
    /// is only logged) and [`S3Error::MultipartFailure`] is returned.
    pub async fn upload(
        &self,
        mut input: Input,
        bucket: &str,
        key: &str,
        options: &PutOptions,
    ) -> Result<CompleteMultipartUploadResponse> {
        input.buffer_if_unseekable().await?;
        let plan = plan_parts(input.size(), self.config.part_size as u64)?;

        let mut session = MultipartUpload::initiate(self.executor, bucket, key, options).await?;
        let upload_id = session.upload_id().to_string();

        tracing::debug!(
            upload_id = %upload_id,
            size = input.size(),
            parts = plan.len(),
            concurrency = self.config.concurrency,
            "uploading parts"
        );

        let mut failure = None;
        {
            let input = &input;
            let upload_id = upload_id.as_str();
            let mut results = stream::iter(plan)
                .map(|part| async move {
                    let slice = input.slice(part.offset, part.length);
                    let result = match slice {
                        Ok(slice) => {
                            send_part(self.executor, bucket, key, upload_id, part.number, slice).await
                        }
                        Err(e) => Err(e),
                    };
                    result.map_err(|e| (part.number, e))
                })
                .buffer_unordered(self.config.concurrency.max(1));

            while let Some(result) = results.next().await {
                match result {
                    Ok(part) => session.record_part(part),
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
            // Dropping the stream cancels the parts still in flight
        }

        if let Some((part_number, source)) = failure {
            tracing::warn!(
                upload_id = %upload_id,
                part_number,
                error = %source,
                "part upload failed, aborting"
            );
            if let Err(abort_err) = session.abort().await {
                tracing::warn!(
                    upload_id = %upload_id,
                    error = %abort_err,
                    "failed to abort multipart upload"
                );
            }
            return Err(S3Error::MultipartFailure {
                upload_id,
                part_number,
                source: Box::new(source),
            });
        }

        session.complete().await
    }
}
