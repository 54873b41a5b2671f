use anyhow::{bail, Result};

/// Bucket and optional key named on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Path {
    pub bucket: String,
    pub key: Option<String>,
}

impl S3Path {
    pub fn require_key(&self) -> Result<&str> {
        match self.key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => bail!("Object key is required: s3://{}/<key>", self.bucket),
        }
    }

    /// Key to write under when the path names a "directory"
    pub fn key_for_upload(&self, file_name: &str) -> String {
        match self.key.as_deref() {
            None | Some("") => file_name.to_string(),
            Some(key) if key.ends_with('/') => format!("{}{}", key, file_name),
            Some(key) => key.to_string(),
        }
    }

    pub fn display(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key.as_deref().unwrap_or(""))
    }
}

/// Parse S3 path into bucket and key components
///
/// Accepts both mc-compatible `s3/bucket/key` and URI-style `s3://bucket/key`.
/// Anything else is taken as a key in `default_bucket`, when one is configured.
pub fn parse_s3_path(path: &str, default_bucket: Option<&str>) -> Result<S3Path> {
    let path = path.trim();

    let stripped = if let Some(p) = path.strip_prefix("s3://") {
        p
    } else if let Some(p) = path.strip_prefix("s3/") {
        p
    } else if let Some(bucket) = default_bucket {
        return Ok(S3Path {
            bucket: bucket.to_string(),
            key: Some(path.to_string()).filter(|k| !k.is_empty()),
        });
    } else {
        bail!("Invalid S3 path format. Expected: s3://bucket/key");
    };

    let (bucket, key) = match stripped.split_once('/') {
        Some((bucket, key)) => (bucket, Some(key).filter(|k| !k.is_empty())),
        None => (stripped, None),
    };

    if bucket.is_empty() {
        bail!("Bucket name cannot be empty");
    }

    Ok(S3Path {
        bucket: bucket.to_string(),
        key: key.map(str::to_string),
    })
}

/// Parse a `name=value` metadata pair
pub fn parse_metadata(pair: &str) -> Result<(String, String), String> {
    match pair.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_ascii_lowercase(), value.to_string()))
        }
        _ => Err(format!("expected name=value, got '{}'", pair)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(bucket: &str, key: Option<&str>) -> S3Path {
        S3Path {
            bucket: bucket.to_string(),
            key: key.map(str::to_string),
        }
    }

    #[test]
    fn test_parse_s3_path() {
        // mc-compatible format: s3/bucket/key
        assert_eq!(parse_s3_path("s3/mybucket", None).unwrap(), path("mybucket", None));
        assert_eq!(
            parse_s3_path("s3/mybucket/path/to/object.txt", None).unwrap(),
            path("mybucket", Some("path/to/object.txt"))
        );

        // URI format
        assert_eq!(parse_s3_path("s3://mybucket/", None).unwrap(), path("mybucket", None));
        assert_eq!(
            parse_s3_path("s3://mybucket/mykey", None).unwrap(),
            path("mybucket", Some("mykey"))
        );

        // Invalid paths
        assert!(parse_s3_path("mybucket", None).is_err());
        assert!(parse_s3_path("s3://", None).is_err());
        assert!(parse_s3_path("http://mybucket", None).is_err());
    }

    #[test]
    fn test_bare_key_uses_default_bucket() {
        assert_eq!(
            parse_s3_path("logs/today.txt", Some("archive")).unwrap(),
            path("archive", Some("logs/today.txt"))
        );
        assert_eq!(
            parse_s3_path("s3://other/k", Some("archive")).unwrap(),
            path("other", Some("k"))
        );
    }

    #[test]
    fn test_upload_key() {
        assert_eq!(path("b", None).key_for_upload("a.txt"), "a.txt");
        assert_eq!(path("b", Some("dir/")).key_for_upload("a.txt"), "dir/a.txt");
        assert_eq!(path("b", Some("exact")).key_for_upload("a.txt"), "exact");
        assert!(path("b", None).require_key().is_err());
    }

    #[test]
    fn test_parse_metadata() {
        assert_eq!(
            parse_metadata("Owner=alice").unwrap(),
            ("owner".to_string(), "alice".to_string())
        );
        assert_eq!(parse_metadata("empty=").unwrap().1, "");
        assert!(parse_metadata("novalue").is_err());
        assert!(parse_metadata("=x").is_err());
    }
}
