use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::s3::error::S3Error;
use crate::s3::types::MultipartConfig;

/// Request signing algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureMethod {
    /// Legacy HMAC-SHA1 signatures, for S3-compatible services without SigV4
    V2,
    /// AWS Signature Version 4
    #[default]
    V4,
}

impl FromStr for SignatureMethod {
    type Err = S3Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v2" => Ok(SignatureMethod::V2),
            "v4" => Ok(SignatureMethod::V4),
            other => Err(S3Error::configuration(format!(
                "unknown signature method '{}' (expected v2 or v4)",
                other
            ))),
        }
    }
}

impl fmt::Display for SignatureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureMethod::V2 => f.write_str("v2"),
            SignatureMethod::V4 => f.write_str("v4"),
        }
    }
}

/// Immutable connection policy: credentials, region and resolved endpoint.
///
/// Built once through [`ConfigurationBuilder`]; the endpoint host is derived
/// from region, dualstack and explicit overrides at build time and never
/// changes afterwards.
#[derive(Clone)]
pub struct Configuration {
    access_key: String,
    secret_key: String,
    signature_method: SignatureMethod,
    region: String,
    endpoint: String,
    dualstack: bool,
    path_style: bool,
    ssl: bool,
    ca_bundle: Option<PathBuf>,
}

// Keeps the secret key out of logs
impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("access_key", &self.access_key)
            .field("signature_method", &self.signature_method)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("dualstack", &self.dualstack)
            .field("path_style", &self.path_style)
            .field("ssl", &self.ssl)
            .field("ca_bundle", &self.ca_bundle)
            .finish()
    }
}

impl Configuration {
    /// Start building a configuration for the given credentials
    pub fn builder(access_key: impl Into<String>, secret_key: impl Into<String>) -> ConfigurationBuilder {
        ConfigurationBuilder::new(access_key.into(), secret_key.into())
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn signature_method(&self) -> SignatureMethod {
        self.signature_method
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Resolved endpoint host (no scheme, no trailing slash)
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_dualstack(&self) -> bool {
        self.dualstack
    }

    pub fn is_ssl(&self) -> bool {
        self.ssl
    }

    /// CA bundle used to verify the server certificate.
    ///
    /// `None` (the default) means the platform trust store.
    pub fn ca_bundle(&self) -> Option<&Path> {
        self.ca_bundle.as_deref()
    }

    pub fn scheme(&self) -> &'static str {
        if self.ssl {
            "https"
        } else {
            "http"
        }
    }

    /// Whether requests for `bucket` put the bucket in the path instead of the host.
    ///
    /// Dotted bucket names over TLS always use path style: the wildcard
    /// certificate of the endpoint cannot match `a.b.s3.amazonaws.com`.
    pub fn use_path_style(&self, bucket: &str) -> bool {
        self.path_style || (self.ssl && bucket.contains('.'))
    }
}

/// Builder for [`Configuration`]
#[derive(Debug, Clone)]
pub struct ConfigurationBuilder {
    access_key: String,
    secret_key: String,
    signature_method: SignatureMethod,
    region: String,
    endpoint: Option<String>,
    dualstack: bool,
    path_style: bool,
    ssl: bool,
    ca_bundle: Option<PathBuf>,
}

impl ConfigurationBuilder {
    fn new(access_key: String, secret_key: String) -> Self {
        Self {
            access_key,
            secret_key,
            signature_method: SignatureMethod::V4,
            region: default_region(),
            endpoint: None,
            dualstack: false,
            path_style: false,
            ssl: true,
            ca_bundle: None,
        }
    }

    pub fn signature_method(mut self, method: SignatureMethod) -> Self {
        self.signature_method = method;
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Custom endpoint for S3-compatible services.
    ///
    /// A leading `http://` or `https://` also sets the TLS flag.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn dualstack(mut self, dualstack: bool) -> Self {
        self.dualstack = dualstack;
        self
    }

    pub fn path_style(mut self, path_style: bool) -> Self {
        self.path_style = path_style;
        self
    }

    pub fn ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    pub fn ca_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle = Some(path.into());
        self
    }

    /// Validate credentials and resolve the endpoint
    pub fn build(self) -> std::result::Result<Configuration, S3Error> {
        if self.access_key.trim().is_empty() {
            return Err(S3Error::configuration("access key must not be empty"));
        }
        if self.secret_key.is_empty() {
            return Err(S3Error::configuration("secret key must not be empty"));
        }

        let region = self.region.trim().to_string();
        if region.is_empty() && self.signature_method == SignatureMethod::V4 {
            return Err(S3Error::configuration(
                "a region is required for v4 signatures",
            ));
        }

        let mut ssl = self.ssl;
        let endpoint = match self.endpoint.as_deref().map(str::trim) {
            Some(custom) if !custom.is_empty() => {
                let host = if let Some(rest) = custom.strip_prefix("https://") {
                    ssl = true;
                    rest
                } else if let Some(rest) = custom.strip_prefix("http://") {
                    ssl = false;
                    rest
                } else {
                    custom
                };
                let host = host.trim_end_matches('/');
                if host.is_empty() || host.contains('/') {
                    return Err(S3Error::configuration(format!(
                        "invalid endpoint '{}'",
                        custom
                    )));
                }
                host.to_string()
            }
            _ => aws_endpoint(&region, self.dualstack),
        };

        if let Some(path) = &self.ca_bundle {
            if !path.exists() {
                return Err(S3Error::configuration(format!(
                    "CA bundle {} does not exist",
                    path.display()
                )));
            }
        }

        Ok(Configuration {
            access_key: self.access_key,
            secret_key: self.secret_key,
            signature_method: self.signature_method,
            region,
            endpoint,
            dualstack: self.dualstack,
            path_style: self.path_style,
            ssl,
            ca_bundle: self.ca_bundle,
        })
    }
}

/// Amazon endpoint host for a region
fn aws_endpoint(region: &str, dualstack: bool) -> String {
    if dualstack {
        let region = if region.is_empty() { "us-east-1" } else { region };
        return format!("s3.dualstack.{}.amazonaws.com", region);
    }
    match region {
        "" | "us-east-1" => "s3.amazonaws.com".to_string(),
        other => format!("s3.{}.amazonaws.com", other),
    }
}

// =============================================================================
// Profile files
// =============================================================================

/// Named S3 profile as stored in a YAML config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// AWS access key ID
    pub access_key: String,

    /// AWS secret access key
    pub secret_key: String,

    /// AWS region (default: us-east-1)
    #[serde(default = "default_region")]
    pub region: String,

    /// Signature method: v2 or v4 (default: v4)
    #[serde(default)]
    pub signature: SignatureMethod,

    /// Custom endpoint for S3-compatible services
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub dualstack: bool,

    /// Put the bucket in the path instead of the host name
    #[serde(default)]
    pub path_style: bool,

    #[serde(default = "default_ssl")]
    pub ssl: bool,

    /// CA certificate file or directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<PathBuf>,

    /// Default bucket for CLI commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_ssl() -> bool {
    true
}

impl Profile {
    /// Resolve this profile into an immutable [`Configuration`]
    pub fn to_configuration(&self) -> std::result::Result<Configuration, S3Error> {
        let mut builder = Configuration::builder(&self.access_key, &self.secret_key)
            .signature_method(self.signature)
            .region(&self.region)
            .dualstack(self.dualstack)
            .path_style(self.path_style)
            .ssl(self.ssl);
        if let Some(endpoint) = &self.endpoint {
            builder = builder.endpoint(endpoint);
        }
        if let Some(ca_bundle) = &self.ca_bundle {
            builder = builder.ca_bundle(ca_bundle);
        }
        builder.build()
    }
}

/// Multipart settings section of a config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultipartSettings {
    /// Part size in MiB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_size_mb: Option<usize>,

    /// Parallel part uploads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Inputs larger than this many MiB use multipart
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_mb: Option<u64>,
}

impl MultipartSettings {
    pub fn to_multipart_config(&self) -> Result<MultipartConfig> {
        let mut config = MultipartConfig::default();
        if let Some(mb) = self.part_size_mb {
            let bytes = mb
                .checked_mul(1024 * 1024)
                .with_context(|| format!("part_size_mb {} is too large", mb))?;
            config = config.with_part_size(bytes);
        }
        if let Some(concurrency) = self.concurrency {
            config = config.with_concurrency(concurrency);
        }
        if let Some(mb) = self.threshold_mb {
            let bytes = mb
                .checked_mul(1024 * 1024)
                .with_context(|| format!("threshold_mb {} is too large", mb))?;
            config = config.with_threshold(bytes);
        }
        Ok(config)
    }
}

/// Main configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileFile {
    /// Named profiles
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,

    /// Profile used when none is named
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,

    #[serde(default)]
    pub multipart: MultipartSettings,
}

impl ProfileFile {
    /// Get a profile by name, or the default profile if not specified
    pub fn get_profile(&self, name: Option<&str>) -> Option<&Profile> {
        if let Some(name) = name {
            self.profiles.get(name)
        } else if let Some(default) = &self.default_profile {
            self.profiles.get(default)
        } else {
            self.profiles.values().next()
        }
    }
}

/// Load a profile file from YAML
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<ProfileFile> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let file: ProfileFile =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    Ok(file)
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Load a single `default` profile from environment variables
///
/// - AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY (required)
/// - AWS_REGION (optional, defaults to us-east-1)
/// - S3_ENDPOINT, S3_SIGNATURE, S3_PATH_STYLE, S3_DUALSTACK, S3_SSL, S3_CA_BUNDLE, S3_BUCKET (optional)
pub fn load_from_env() -> Result<ProfileFile> {
    // Try to load .env file if it exists (don't fail if it doesn't)
    let _ = dotenvy::dotenv();

    let access_key = std::env::var("AWS_ACCESS_KEY_ID")
        .context("AWS_ACCESS_KEY_ID environment variable is not set")?;
    let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .context("AWS_SECRET_ACCESS_KEY environment variable is not set")?;

    let signature = match std::env::var("S3_SIGNATURE") {
        Ok(value) => value.parse::<SignatureMethod>()?,
        Err(_) => SignatureMethod::default(),
    };

    let profile = Profile {
        access_key,
        secret_key,
        region: std::env::var("AWS_REGION").unwrap_or_else(|_| default_region()),
        signature,
        endpoint: std::env::var("S3_ENDPOINT").ok(),
        dualstack: env_flag("S3_DUALSTACK").unwrap_or(false),
        path_style: env_flag("S3_PATH_STYLE").unwrap_or(false),
        ssl: env_flag("S3_SSL").unwrap_or(true),
        ca_bundle: std::env::var("S3_CA_BUNDLE").ok().map(PathBuf::from),
        bucket: std::env::var("S3_BUCKET").ok(),
    };

    let mut file = ProfileFile::default();
    file.profiles.insert("default".to_string(), profile);
    file.default_profile = Some("default".to_string());
    Ok(file)
}

/// Load configuration from file or environment
///
/// Reads the YAML file when one is given, otherwise falls back to environment
/// variables. A named profile must exist in the file.
pub fn load_config(config_path: Option<&str>, profile_name: Option<&str>) -> Result<ProfileFile> {
    if let Some(path) = config_path {
        let mut file = load_from_yaml(path)?;

        if let Some(name) = profile_name {
            if !file.profiles.contains_key(name) {
                anyhow::bail!("Profile '{}' not found in config file", name);
            }
            file.default_profile = Some(name.to_string());
        }

        Ok(file)
    } else {
        load_from_env()
    }
}
