use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Multipart upload tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Payload size in bytes at or above which uploads switch to multipart
    #[serde(default = "default_threshold")]
    pub threshold: u64,

    /// Multipart part size in bytes
    #[serde(default = "default_part_size")]
    pub part_size: usize,
}

fn default_threshold() -> u64 {
    10 * 1024 * 1024
}

fn default_part_size() -> usize {
    1024 * 1024
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            part_size: default_part_size(),
        }
    }
}

/// Client configuration.
///
/// All fields are read once at construction; credentials and the endpoint
/// selection are immutable for the lifetime of a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bucket (service) name
    pub bucket: String,

    /// Operator account name
    pub operator: String,

    /// Operator password (shared secret)
    pub password: String,

    /// API endpoint selection: auto, telecom, cnc or ctt
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Public host for download URLs
    #[serde(default)]
    pub host: String,

    /// Folder prefix for all keys
    #[serde(default)]
    pub folder: String,

    /// Separator between a URL and its processing directive
    #[serde(default = "default_identifier")]
    pub identifier: String,

    /// Signing scheme: digest (legacy, with content digest) or simplified
    #[serde(default = "default_signing")]
    pub signing: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Verbose per-request logging
    #[serde(default)]
    pub debug: bool,

    /// Multipart upload settings
    #[serde(default)]
    pub upload: UploadConfig,
}

fn default_endpoint() -> String {
    "auto".to_string()
}

fn default_identifier() -> String {
    "!".to_string()
}

fn default_signing() -> String {
    "digest".to_string()
}

fn default_timeout() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            operator: String::new(),
            password: String::new(),
            endpoint: default_endpoint(),
            host: String::new(),
            folder: String::new(),
            identifier: default_identifier(),
            signing: default_signing(),
            timeout: default_timeout(),
            debug: false,
            upload: UploadConfig::default(),
        }
    }
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: Config =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    Ok(config)
}

/// Load configuration from environment variables
///
/// - UPYUN_BUCKET, UPYUN_OPERATOR, UPYUN_PASSWORD (required)
/// - UPYUN_HOST, UPYUN_FOLDER, UPYUN_ENDPOINT (optional)
/// - UPYUN_SIGNING, UPYUN_TIMEOUT, UPYUN_DEBUG (optional)
/// - UPYUN_MULTIPART_THRESHOLD, UPYUN_PART_SIZE (optional)
pub fn load_from_env() -> Result<Config> {
    // Try to load .env file if it exists (don't fail if it doesn't)
    let _ = dotenvy::dotenv();

    let mut config = Config {
        bucket: std::env::var("UPYUN_BUCKET")
            .context("UPYUN_BUCKET environment variable not set")?,
        operator: std::env::var("UPYUN_OPERATOR")
            .context("UPYUN_OPERATOR environment variable not set")?,
        password: std::env::var("UPYUN_PASSWORD")
            .context("UPYUN_PASSWORD environment variable not set")?,
        ..Config::default()
    };

    if let Ok(host) = std::env::var("UPYUN_HOST") {
        config.host = host;
    }

    if let Ok(folder) = std::env::var("UPYUN_FOLDER") {
        config.folder = folder;
    }

    if let Ok(endpoint) = std::env::var("UPYUN_ENDPOINT") {
        config.endpoint = endpoint;
    }

    if let Ok(signing) = std::env::var("UPYUN_SIGNING") {
        config.signing = signing;
    }

    if let Ok(timeout) = std::env::var("UPYUN_TIMEOUT") {
        if let Ok(val) = timeout.parse() {
            config.timeout = val;
        }
    }

    if let Ok(debug) = std::env::var("UPYUN_DEBUG") {
        config.debug = debug == "true" || debug == "1";
    }

    if let Ok(threshold) = std::env::var("UPYUN_MULTIPART_THRESHOLD") {
        if let Ok(val) = threshold.parse() {
            config.upload.threshold = val;
        }
    }

    if let Ok(part_size) = std::env::var("UPYUN_PART_SIZE") {
        if let Ok(val) = part_size.parse() {
            config.upload.part_size = val;
        }
    }

    Ok(config)
}

/// Load configuration from a file when a path is given, otherwise from
/// environment variables
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    match config_path {
        Some(path) => load_from_yaml(path),
        None => load_from_env(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_yaml_str() {
        let yaml = r#"
bucket: my-bucket
operator: my-operator
password: my-secret
endpoint: telecom
host: https://cdn.example.com
folder: uploads
debug: true

upload:
  threshold: 20971520
  part_size: 2097152
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.bucket, "my-bucket");
        assert_eq!(config.operator, "my-operator");
        assert_eq!(config.endpoint, "telecom");
        assert_eq!(config.folder, "uploads");
        assert!(config.debug);
        assert_eq!(config.upload.threshold, 20 * 1024 * 1024);
        assert_eq!(config.upload.part_size, 2 * 1024 * 1024);
    }

    #[test]
    fn test_default_values() {
        let yaml = r#"
bucket: minimal
operator: op
password: secret
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.endpoint, "auto");
        assert_eq!(config.identifier, "!");
        assert_eq!(config.signing, "digest");
        assert_eq!(config.timeout, 60);
        assert!(!config.debug);
        assert_eq!(config.upload.threshold, 10 * 1024 * 1024);
        assert_eq!(config.upload.part_size, 1024 * 1024);
    }
}
