use anyhow::{bail, Context, Result};
use http::Method;
use std::fmt::Write as FmtWrite;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use s3link::s3::{Input, ListObjectsRequest, PutOptions, S3Client};

use super::args::S3Path;

// ============================================================================
// Utility functions
// ============================================================================

/// Format bytes in human-readable form (B, KB, MB, GB, TB) - verbose
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let exponent = (bytes_f64.ln() / 1024_f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);

    let value = bytes_f64 / 1024_f64.powi(exponent as i32);

    if exponent == 0 {
        format!("{} {}", bytes, UNITS[exponent])
    } else {
        format!("{:.2} {}", value, UNITS[exponent])
    }
}

/// Write file size in mc-compatible compact form (0B, 1.0KiB, 10MiB, etc.)
fn write_bytes_compact(w: &mut dyn std::fmt::Write, bytes: u64) {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

    if bytes == 0 {
        let _ = w.write_str("0B");
        return;
    }

    let bytes_f64 = bytes as f64;
    let exponent = (bytes_f64.ln() / 1024_f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);

    let value = bytes_f64 / 1024_f64.powi(exponent as i32);

    if exponent == 0 {
        let _ = write!(w, "{}B", bytes);
    } else if value >= 10.0 {
        let _ = write!(w, "{:.0}{}", value, UNITS[exponent]);
    } else {
        let _ = write!(w, "{:.1}{}", value, UNITS[exponent]);
    }
}

/// Format a listing timestamp ("2026-01-22T20:44:33.219Z") as "2026-01-22 20:44:33 UTC"
pub fn format_s3_date(date_str: Option<&str>) -> String {
    match date_str {
        Some(s) => match s.split_once('T') {
            Some((date, rest)) => {
                let time = rest.get(..8).unwrap_or_else(|| rest.trim_end_matches('Z'));
                format!("{} {} UTC", date, time)
            }
            None => s.to_string(),
        },
        // blank placeholder matching width
        None => " ".repeat(23),
    }
}

// ============================================================================
// Commands
// ============================================================================

/// List objects and common prefixes, one page at a time
pub async fn cmd_ls(client: &S3Client, path: &S3Path, recursive: bool, max_keys: usize) -> Result<()> {
    let mut request = match &path.key {
        Some(prefix) => ListObjectsRequest::with_prefix(prefix.as_str()),
        None => ListObjectsRequest::default(),
    };
    if recursive {
        request = request.recursive();
    }

    let limit = if max_keys == 0 { usize::MAX } else { max_keys };
    let mut out = std::io::BufWriter::with_capacity(64 * 1024, std::io::stdout());
    let mut line = String::with_capacity(256);
    let mut size = String::with_capacity(16);
    let mut printed = 0usize;

    // mc shows directories with the current time
    let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

    'pages: loop {
        let page = client.list_objects(&path.bucket, &request).await?;
        debug!(
            objects = page.contents.len(),
            prefixes = page.common_prefixes.len(),
            truncated = page.is_truncated,
            "listing page"
        );

        for prefix in &page.common_prefixes {
            if printed >= limit {
                break 'pages;
            }
            line.clear();
            let _ = write!(line, "[{}] {:>7} {}", now, "0B", prefix);
            writeln!(out, "{}", line)?;
            printed += 1;
        }

        for object in &page.contents {
            if printed >= limit {
                break 'pages;
            }
            size.clear();
            write_bytes_compact(&mut size, object.size);
            line.clear();
            let _ = write!(
                line,
                "[{}] {:>7} {}",
                format_s3_date(object.last_modified.as_deref()),
                size,
                object.key
            );
            writeln!(out, "{}", line)?;
            printed += 1;
        }

        if !page.is_truncated {
            break;
        }
        match page.next_marker {
            Some(marker) if request.marker.as_deref() != Some(marker.as_str()) => {
                request.marker = Some(marker);
            }
            _ => bail!("Listing is truncated but returned no new continuation marker"),
        }
    }

    out.flush()?;
    Ok(())
}

/// Download an object to a file, or to stdout when `dest` is `-` or absent
pub async fn cmd_get(client: &S3Client, source: &S3Path, dest: Option<&str>) -> Result<()> {
    let key = source.require_key()?;

    match dest {
        None | Some("-") => {
            let mut stdout = tokio::io::stdout();
            client
                .get_object_to_writer(&source.bucket, key, &mut stdout)
                .await?;
            stdout.flush().await?;
        }
        Some(dest) => {
            let mut target = PathBuf::from(dest);
            if target.is_dir() {
                let file_name = key.rsplit('/').next().unwrap_or(key);
                target.push(file_name);
            }
            let object = client
                .get_object_to_file(&source.bucket, key, &target)
                .await?;
            info!(
                "{} -> {} ({})",
                source.display(),
                target.display(),
                format_bytes(object.size.unwrap_or(0))
            );
        }
    }

    Ok(())
}

/// Upload a local file, or stdin when `source` is `-`
pub async fn cmd_put(
    client: &S3Client,
    source: &str,
    dest: &S3Path,
    options: &PutOptions,
) -> Result<()> {
    let (input, key) = if source == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut buf)
            .await
            .context("Failed to read stdin")?;
        let key = dest.require_key()?.to_string();
        (Input::from_bytes(buf), key)
    } else {
        let path = Path::new(source);
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Not a file: {}", source))?;
        (Input::from_file(path)?, dest.key_for_upload(file_name))
    };

    let size = input.size();
    let etag = client.upload(&dest.bucket, &key, input, options).await?;

    println!(
        "{} -> s3://{}/{} ({}, ETag {})",
        source,
        dest.bucket,
        key,
        format_bytes(size),
        etag
    );
    Ok(())
}

/// Delete one object
pub async fn cmd_rm(client: &S3Client, path: &S3Path) -> Result<()> {
    let key = path.require_key()?;
    client.delete_object(&path.bucket, key).await?;
    println!("Removed {}", path.display());
    Ok(())
}

/// Stat command
pub async fn cmd_stat(client: &S3Client, path: &S3Path) -> Result<()> {
    let key = path.require_key()?;
    let info = client.head_object(&path.bucket, key).await?;

    println!("Object: {}", path.display());
    if let Some(size) = info.size {
        println!("Size: {} ({})", format_bytes(size), size);
    }
    match info.last_modified {
        Some(time) => println!("Last Modified: {}", time.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("Last Modified: Unknown"),
    }
    if let Some(content_type) = &info.content_type {
        println!("Content-Type: {}", content_type);
    }
    if let Some(etag) = &info.etag {
        println!("ETag: {}", etag);
    }
    for (name, value) in &info.metadata {
        println!("Meta {}: {}", name, value);
    }

    Ok(())
}

/// Print a pre-signed URL
pub fn cmd_presign(client: &S3Client, path: &S3Path, method: Method, expires: u64) -> Result<()> {
    let key = path.require_key()?;
    let url = client.presigned_url(method, &path.bucket, key, Duration::from_secs(expires))?;
    println!("{}", url);
    Ok(())
}

pub async fn cmd_location(client: &S3Client, bucket: &str) -> Result<()> {
    let region = client.get_bucket_location(bucket).await?;
    println!("{}", region);
    Ok(())
}

pub async fn cmd_buckets(client: &S3Client) -> Result<()> {
    let buckets = client.list_buckets().await?;
    let mut out = std::io::BufWriter::new(std::io::stdout());
    for bucket in &buckets {
        writeln!(
            out,
            "[{}] {}/",
            format_s3_date(bucket.creation_date.as_deref()),
            bucket.name
        )?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
        assert_eq!(format_bytes(1073741824), "1.00 GB");
    }

    #[test]
    fn test_write_bytes_compact() {
        let compact = |n| {
            let mut s = String::new();
            write_bytes_compact(&mut s, n);
            s
        };
        assert_eq!(compact(0), "0B");
        assert_eq!(compact(999), "999B");
        assert_eq!(compact(1536), "1.5KiB");
        assert_eq!(compact(50 * 1024 * 1024), "50MiB");
    }

    #[test]
    fn test_format_s3_date() {
        assert_eq!(
            format_s3_date(Some("2026-01-22T20:44:33.219Z")),
            "2026-01-22 20:44:33 UTC"
        );
        assert_eq!(format_s3_date(Some("yesterday")), "yesterday");
        assert_eq!(format_s3_date(None).len(), 23);
    }
}
