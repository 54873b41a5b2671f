//! Request payload sources
//!
//! An [`Input`] is either inline bytes, a byte range of a file, or a
//! non-seekable async reader. Digests (SHA-256 for SigV4, MD5 for
//! `Content-MD5`) are computed lazily in a single pass over bounded 1 MiB
//! chunks and memoised.
//!
//! Non-seekable readers cannot be read twice, so hashing one buffers the
//! whole stream in memory and turns the input into an inline source. The
//! bounded-memory guarantee therefore does not hold for large readers.

use base64::Engine;
use bytes::Bytes;
use futures::stream::{self, TryStreamExt};
use http_body::Frame;
use http_body_util::{BodyExt, Full, StreamBody};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};

use crate::s3::error::{Result, S3Error};
use crate::s3::executor::{BodyError, RequestBody};

/// Chunk size for hashing and streaming bodies
pub const CHUNK_SIZE: usize = 1024 * 1024;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

enum Source {
    Inline(Bytes),
    File {
        path: PathBuf,
        file: tokio::fs::File,
        offset: u64,
        length: u64,
    },
    Reader {
        reader: BoxedReader,
        length: u64,
    },
    /// A reader that could not be buffered. Every later use repeats the error.
    Failed {
        message: String,
        length: u64,
    },
}

#[derive(Debug, Clone)]
struct Digests {
    sha256: String,
    md5: String,
}

impl Digests {
    fn of(data: &[u8]) -> Self {
        let mut hasher = DigestPair::new();
        hasher.update(data);
        hasher.finish()
    }
}

/// SHA-256 and MD5 computed side by side
struct DigestPair {
    sha256: Sha256,
    md5: md5::Context,
}

impl DigestPair {
    fn new() -> Self {
        Self {
            sha256: Sha256::new(),
            md5: md5::Context::new(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.sha256.update(data);
        self.md5.consume(data);
    }

    fn finish(self) -> Digests {
        let md5 = self.md5.compute();
        Digests {
            sha256: hex::encode(self.sha256.finalize()),
            md5: base64::engine::general_purpose::STANDARD.encode(&md5[..]),
        }
    }
}

/// Payload source for a single request
pub struct Input {
    source: Source,
    digests: Option<Digests>,
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.source {
            Source::Inline(_) => "inline",
            Source::File { .. } => "file",
            Source::Reader { .. } => "reader",
            Source::Failed { .. } => "failed",
        };
        f.debug_struct("Input")
            .field("kind", &kind)
            .field("size", &self.size())
            .field("hashed", &self.digests.is_some())
            .finish()
    }
}

fn read_error(path: &Path, err: std::io::Error) -> S3Error {
    S3Error::invalid_input(format!("cannot read {}: {}", path.display(), err))
}

impl Input {
    /// In-memory payload
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self {
            source: Source::Inline(data.into()),
            digests: None,
        }
    }

    /// Whole file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| read_error(path, e))?;
        let length = file.metadata().map_err(|e| read_error(path, e))?.len();
        Ok(Self::file_source(path, file, 0, length))
    }

    /// `length` bytes of a file starting at `offset`
    pub fn from_file_range(path: impl AsRef<Path>, offset: u64, length: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| read_error(path, e))?;
        let file_len = file.metadata().map_err(|e| read_error(path, e))?.len();
        let end = offset.checked_add(length).ok_or_else(|| {
            S3Error::invalid_input(format!("range overflow for {}", path.display()))
        })?;
        if end > file_len {
            return Err(S3Error::invalid_input(format!(
                "range {}..{} is past the end of {} ({} bytes)",
                offset,
                end,
                path.display(),
                file_len
            )));
        }
        Ok(Self::file_source(path, file, offset, length))
    }

    /// Non-seekable stream of exactly `length` bytes
    pub fn from_reader<R>(reader: R, length: u64) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            source: Source::Reader {
                reader: Box::new(reader),
                length,
            },
            digests: None,
        }
    }

    fn file_source(path: &Path, file: std::fs::File, offset: u64, length: u64) -> Self {
        Self {
            source: Source::File {
                path: path.to_path_buf(),
                file: tokio::fs::File::from_std(file),
                offset,
                length,
            },
            digests: None,
        }
    }

    /// Byte length of the designated range
    pub fn size(&self) -> u64 {
        match &self.source {
            Source::Inline(bytes) => bytes.len() as u64,
            Source::File { length, .. } => *length,
            Source::Reader { length, .. } => *length,
            Source::Failed { length, .. } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Whether the source can be read more than once
    pub fn is_seekable(&self) -> bool {
        !matches!(self.source, Source::Reader { .. } | Source::Failed { .. })
    }

    /// Lowercase hex SHA-256 of the range, computed once
    pub async fn content_hash(&mut self) -> Result<&str> {
        Ok(&self.digests().await?.sha256)
    }

    /// Base64 MD5 of the range, for `Content-MD5`
    pub async fn content_md5(&mut self) -> Result<&str> {
        Ok(&self.digests().await?.md5)
    }

    async fn digests(&mut self) -> Result<&Digests> {
        let digests = match self.digests.take() {
            Some(digests) => digests,
            None => self.compute_digests().await?,
        };
        Ok(self.digests.insert(digests))
    }

    async fn compute_digests(&mut self) -> Result<Digests> {
        self.buffer_if_unseekable().await?;

        match &mut self.source {
            Source::Inline(bytes) => Ok(Digests::of(bytes)),
            Source::File {
                path,
                file,
                offset,
                length,
            } => {
                file.seek(SeekFrom::Start(*offset))
                    .await
                    .map_err(|e| read_error(path, e))?;

                let mut hasher = DigestPair::new();
                let mut remaining = *length;
                let mut buf = vec![0u8; CHUNK_SIZE.min(remaining as usize)];

                while remaining > 0 {
                    let want = buf.len().min(remaining as usize);
                    let n = file
                        .read(&mut buf[..want])
                        .await
                        .map_err(|e| read_error(path, e))?;
                    if n == 0 {
                        return Err(S3Error::invalid_input(format!(
                            "{} ended {} bytes before the expected range end",
                            path.display(),
                            remaining
                        )));
                    }
                    hasher.update(&buf[..n]);
                    remaining -= n as u64;
                }

                // Rewind so the transfer reads the same bytes
                file.seek(SeekFrom::Start(*offset))
                    .await
                    .map_err(|e| read_error(path, e))?;

                Ok(hasher.finish())
            }
            Source::Reader { .. } => Err(S3Error::invalid_input("reader was not buffered")),
            Source::Failed { message, .. } => Err(S3Error::invalid_input(message.clone())),
        }
    }

    /// Read a non-seekable source fully into memory. No-op for other sources.
    pub async fn buffer_if_unseekable(&mut self) -> Result<()> {
        if self.is_seekable() {
            return Ok(());
        }

        let length = self.size();
        let source = std::mem::replace(
            &mut self.source,
            Source::Failed {
                message: "stream was consumed by an interrupted read".to_string(),
                length,
            },
        );
        let reader = match source {
            Source::Reader { reader, .. } => reader,
            Source::Failed { message, length } => {
                self.source = Source::Failed {
                    message: message.clone(),
                    length,
                };
                return Err(S3Error::invalid_input(message));
            }
            other => {
                self.source = other;
                return Ok(());
            }
        };

        let mut data = Vec::with_capacity(length.min(64 * CHUNK_SIZE as u64) as usize);
        let outcome = match reader.take(length).read_to_end(&mut data).await {
            Err(e) => Err(format!("cannot read stream: {}", e)),
            Ok(_) if data.len() as u64 != length => Err(format!(
                "stream ended after {} of {} bytes",
                data.len(),
                length
            )),
            Ok(_) => Ok(()),
        };

        match outcome {
            Ok(()) => {
                tracing::debug!(bytes = length, "buffered non-seekable input in memory");
                self.source = Source::Inline(Bytes::from(data));
                Ok(())
            }
            Err(message) => {
                // Later calls repeat this failure
                self.source = Source::Failed {
                    message: message.clone(),
                    length,
                };
                Err(S3Error::invalid_input(message))
            }
        }
    }

    /// Independent view of `length` bytes starting at `offset` within this input
    pub fn slice(&self, offset: u64, length: u64) -> Result<Input> {
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= self.size())
            .ok_or_else(|| {
                S3Error::invalid_input(format!(
                    "slice {}+{} is outside an input of {} bytes",
                    offset,
                    length,
                    self.size()
                ))
            })?;

        match &self.source {
            Source::Inline(bytes) => Ok(Input::from_bytes(
                bytes.slice(offset as usize..end as usize),
            )),
            Source::File {
                path,
                offset: base,
                ..
            } => Input::from_file_range(path, base + offset, length),
            Source::Reader { .. } => Err(S3Error::invalid_input(
                "cannot slice a non-seekable source; buffer it first",
            )),
            Source::Failed { message, .. } => Err(S3Error::invalid_input(message.clone())),
        }
    }

    /// Convert into a request body. Files and readers stream in 1 MiB chunks.
    pub fn into_body(self) -> RequestBody {
        match self.source {
            Source::Inline(bytes) => Full::new(bytes)
                .map_err(|never| match never {})
                .boxed_unsync(),
            Source::File {
                file,
                offset,
                length,
                ..
            } => chunked_body(file, Some(offset), length),
            Source::Reader { reader, length } => chunked_body(reader, None, length),
            Source::Failed { message, .. } => {
                let failure = stream::once(async move {
                    Err::<Frame<Bytes>, BodyError>(Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        message,
                    )))
                });
                StreamBody::new(failure).boxed_unsync()
            }
        }
    }
}

/// Stream `length` bytes of `reader` as body frames, seeking to `start` first when given
fn chunked_body<R>(reader: R, start: Option<u64>, length: u64) -> RequestBody
where
    R: AsyncRead + AsyncSeekMaybe + Send + Unpin + 'static,
{
    let chunks = stream::try_unfold(
        (reader, start, length),
        |(mut reader, start, remaining)| async move {
            if let Some(offset) = start {
                reader.seek_to(offset).await?;
            }
            if remaining == 0 {
                return Ok(None);
            }
            let mut buf = vec![0u8; CHUNK_SIZE.min(remaining as usize)];
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "payload source ended early",
                ));
            }
            buf.truncate(n);
            Ok(Some((
                Frame::data(Bytes::from(buf)),
                (reader, None, remaining - n as u64),
            )))
        },
    )
    .map_err(|e| -> BodyError { Box::new(e) });

    StreamBody::new(chunks).boxed_unsync()
}

/// Seek support that readers without it can opt out of
trait AsyncSeekMaybe {
    fn seek_to(
        &mut self,
        offset: u64,
    ) -> impl std::future::Future<Output = std::io::Result<()>> + Send;
}

impl AsyncSeekMaybe for tokio::fs::File {
    async fn seek_to(&mut self, offset: u64) -> std::io::Result<()> {
        self.seek(SeekFrom::Start(offset)).await.map(|_| ())
    }
}

impl AsyncSeekMaybe for BoxedReader {
    async fn seek_to(&mut self, _offset: u64) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "stream is not seekable",
        ))
    }
}
