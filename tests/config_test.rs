use std::env;
use std::fs;
use tempfile::TempDir;

use s3link::config::{load_config, load_from_env, load_from_yaml};
use s3link::{S3Error, SignatureMethod};

/// Test loading configuration from YAML file
#[test]
fn test_load_yaml_config() {
    let yaml = r#"
profiles:
  test:
    access_key: AKIATEST
    secret_key: secrettest
    region: us-west-2
    endpoint: http://minio.local:9000
    path_style: true
    bucket: test-bucket
  legacy:
    access_key: AKIALEGACY
    secret_key: legacysecret
    signature: v2

default_profile: test

multipart:
  part_size_mb: 16
  concurrency: 8
  threshold_mb: 64
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let file = load_from_yaml(&config_path).unwrap();
    assert_eq!(file.profiles.len(), 2);

    let profile = file.get_profile(None).unwrap();
    assert_eq!(profile.access_key, "AKIATEST");
    assert_eq!(profile.region, "us-west-2");
    assert_eq!(profile.bucket, Some("test-bucket".to_string()));

    let config = profile.to_configuration().unwrap();
    assert_eq!(config.endpoint(), "minio.local:9000");
    assert!(!config.is_ssl());
    assert_eq!(config.scheme(), "http");
    assert!(config.use_path_style("test-bucket"));
    assert_eq!(config.signature_method(), SignatureMethod::V4);

    let legacy = file.get_profile(Some("legacy")).unwrap().to_configuration().unwrap();
    assert_eq!(legacy.signature_method(), SignatureMethod::V2);
    assert_eq!(legacy.endpoint(), "s3.amazonaws.com");

    let multipart = file.multipart.to_multipart_config().unwrap();
    assert_eq!(multipart.part_size, 16 * 1024 * 1024);
    assert_eq!(multipart.concurrency, 8);
    assert_eq!(multipart.threshold, 64 * 1024 * 1024);
}

/// Test default values
#[test]
fn test_default_values() {
    let yaml = r#"
profiles:
  minimal:
    access_key: key
    secret_key: secret
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();

    let file = load_from_yaml(&config_path).unwrap();

    let profile = file.profiles.get("minimal").unwrap();
    // Should default to us-east-1
    assert_eq!(profile.region, "us-east-1");
    assert_eq!(profile.bucket, None);
    assert!(profile.ssl);
    assert!(!profile.path_style);

    let config = profile.to_configuration().unwrap();
    assert_eq!(config.endpoint(), "s3.amazonaws.com");
    assert_eq!(config.scheme(), "https");
    assert!(!config.use_path_style("minimal-bucket"));

    let multipart = file.multipart.to_multipart_config().unwrap();
    assert_eq!(multipart.part_size, 5 * 1024 * 1024);
    assert_eq!(multipart.concurrency, 4);
}

/// Test get_profile and named profile lookup
#[test]
fn test_get_profile() {
    let yaml = r#"
profiles:
  prod:
    access_key: prod_key
    secret_key: prod_secret
  dev:
    access_key: dev_key
    secret_key: dev_secret

default_profile: prod
"#;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, yaml).unwrap();
    let path = config_path.to_str().unwrap();

    let file = load_config(Some(path), None).unwrap();
    assert_eq!(file.get_profile(Some("dev")).unwrap().access_key, "dev_key");
    assert_eq!(file.get_profile(None).unwrap().access_key, "prod_key");
    assert!(file.get_profile(Some("nonexistent")).is_none());

    // Naming a profile makes it the default
    let file = load_config(Some(path), Some("dev")).unwrap();
    assert_eq!(file.get_profile(None).unwrap().access_key, "dev_key");

    assert!(load_config(Some(path), Some("staging")).is_err());
}

#[test]
fn test_invalid_profiles_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");

    fs::write(
        &config_path,
        "profiles:\n  bad:\n    access_key: k\n    secret_key: s\n    signature: v3\n",
    )
    .unwrap();
    assert!(load_from_yaml(&config_path).is_err());

    fs::write(
        &config_path,
        "profiles:\n  bad:\n    access_key: k\n    secret_key: s\n    ca_bundle: /nonexistent/ca.pem\n",
    )
    .unwrap();
    let file = load_from_yaml(&config_path).unwrap();
    let err = file.get_profile(None).unwrap().to_configuration().unwrap_err();
    assert!(matches!(err, S3Error::Configuration(_)));

    assert!(load_from_yaml(temp_dir.path().join("missing.yaml")).is_err());
}

/// Environment variables are process-wide, so every env case runs in this one test
#[test]
fn test_load_env_config() {
    let names = [
        "AWS_ACCESS_KEY_ID",
        "AWS_SECRET_ACCESS_KEY",
        "AWS_REGION",
        "S3_ENDPOINT",
        "S3_SIGNATURE",
        "S3_PATH_STYLE",
        "S3_BUCKET",
    ];
    let saved: Vec<_> = names.iter().map(|n| (*n, env::var(n).ok())).collect();

    env::set_var("AWS_ACCESS_KEY_ID", "test_key");
    env::set_var("AWS_SECRET_ACCESS_KEY", "test_secret");
    env::set_var("AWS_REGION", "eu-west-1");
    env::set_var("S3_ENDPOINT", "https://storage.test.com/");
    env::set_var("S3_SIGNATURE", "v2");
    env::set_var("S3_PATH_STYLE", "true");
    env::set_var("S3_BUCKET", "test-bucket");

    let file = load_from_env().unwrap();
    assert_eq!(file.profiles.len(), 1);
    assert_eq!(file.default_profile, Some("default".to_string()));

    let profile = file.get_profile(None).unwrap();
    assert_eq!(profile.access_key, "test_key");
    assert_eq!(profile.secret_key, "test_secret");
    assert_eq!(profile.region, "eu-west-1");
    assert_eq!(profile.bucket, Some("test-bucket".to_string()));
    assert!(profile.path_style);

    let config = profile.to_configuration().unwrap();
    assert_eq!(config.endpoint(), "storage.test.com");
    assert_eq!(config.scheme(), "https");
    assert_eq!(config.signature_method(), SignatureMethod::V2);

    // No config file means the environment is used
    let file = load_config(None, None).unwrap();
    assert_eq!(file.get_profile(None).unwrap().access_key, "test_key");

    env::set_var("S3_SIGNATURE", "v5");
    assert!(load_from_env().is_err());

    for (name, value) in saved {
        cleanup_env(name, value);
    }
}

/// Helper function to cleanup environment variables
fn cleanup_env(key: &str, orig_val: Option<String>) {
    match orig_val {
        Some(val) => env::set_var(key, val),
        None => env::remove_var(key),
    }
}
