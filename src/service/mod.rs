//! Storage adapter for a generic file-attachment subsystem
//!
//! `BlobService` is the fixed operation set an attachment framework consumes;
//! `UpyunService` implements it over the REST client, choosing single-shot or
//! multipart upload by payload size.

use crate::config::Config;
use crate::rest::{
    Endpoint, Error, HttpTransport, HyperTransport, MultipartConfig, Payload, Result, RestClient,
    Signer, SigningScheme,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

/// API origin used for client-side direct uploads
const DIRECT_UPLOAD_ENDPOINT: &str = "https://v0.api.upyun.com";

/// Default separator joining a URL and its processing directive
const DEFAULT_IDENTIFIER: &str = "!";

/// Storage backend operation set consumed by the attachment framework.
///
/// Every operation returns a typed result; a provider-side failure such as
/// "not found" surfaces as `Error::Upstream`, never a panic.
#[async_trait]
pub trait BlobService: Send + Sync {
    /// Store a payload under `key`. Single-shot below the configured
    /// threshold, multipart at or above it.
    async fn upload(
        &self,
        key: &str,
        payload: Payload,
        checksum: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<()>;

    /// Fetch the full object
    async fn download(&self, key: &str) -> Result<Bytes>;

    /// Fetch a byte range. `range` is end-exclusive and converted to the
    /// inclusive form HTTP `Range` headers use.
    async fn download_chunk(&self, key: &str, range: Range<u64>) -> Result<Bytes>;

    /// Delete the object
    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every entry under `prefix`, then the prefix path itself.
    /// Per-entry deletes are independent; a failure part-way through leaves
    /// the remaining entries undeleted.
    async fn delete_prefixed(&self, prefix: &str) -> Result<()>;

    /// Whether the object exists (a stat call; existence is the absence of
    /// an upstream error)
    async fn exist(&self, key: &str) -> Result<bool>;

    /// Public URL for the object, with an optional processing directive
    fn url(&self, key: &str, process: Option<&str>) -> String;

    /// URL an end-user agent uploads to directly
    fn url_for_direct_upload(&self, key: &str) -> String;

    /// Pre-signed headers for a client-side direct upload
    fn headers_for_direct_upload(&self, key: &str, content_type: &str)
        -> HashMap<String, String>;
}

/// UPYUN-backed implementation of `BlobService`.
///
/// Construction resolves the endpoint and signing scheme once and fails fast
/// on invalid selections, before any request is made.
pub struct UpyunService {
    client: RestClient,
    bucket: String,
    host: String,
    folder: String,
    identifier: String,
    multipart: MultipartConfig,
}

impl UpyunService {
    /// Build a service with the default hyper transport
    pub fn new(config: &Config) -> Result<Self> {
        let transport = Arc::new(HyperTransport::new(Duration::from_secs(config.timeout)));
        Self::with_transport(config, transport)
    }

    /// Build a service over an externally supplied transport
    pub fn with_transport(config: &Config, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let endpoint: Endpoint = config.endpoint.parse().map_err(Error::Config)?;
        let scheme: SigningScheme = config.signing.parse().map_err(Error::Config)?;

        let signer = Signer::new(config.operator.clone(), &config.password, scheme);
        let client = RestClient::new(transport, signer, config.bucket.clone(), endpoint)
            .with_debug(config.debug);

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            host: config.host.trim_end_matches('/').to_string(),
            folder: config.folder.trim_matches('/').to_string(),
            identifier: if config.identifier.is_empty() {
                DEFAULT_IDENTIFIER.to_string()
            } else {
                config.identifier.clone()
            },
            multipart: MultipartConfig::default()
                .with_part_size(config.upload.part_size)
                .with_threshold(config.upload.threshold),
        })
    }

    /// Replace the multipart tuning with explicit values, bypassing the
    /// part-size bounds enforced on configuration input
    pub fn with_multipart(mut self, multipart: MultipartConfig) -> Self {
        self.multipart = multipart;
        self
    }

    /// Bucket-relative path for a user key, prefixed with the folder segment
    fn path_for(&self, key: &str) -> String {
        if self.folder.is_empty() {
            format!("/{}", key)
        } else {
            format!("/{}/{}", self.folder, key)
        }
    }
}

#[async_trait]
impl BlobService for UpyunService {
    async fn upload(
        &self,
        key: &str,
        payload: Payload,
        checksum: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<()> {
        let size = payload.len();
        tracing::debug!(key, checksum, size, "service upload");
        let path = self.path_for(key);

        if size >= self.multipart.threshold {
            self.client
                .put_multipart(&path, payload, content_type, &self.multipart)
                .await
        } else {
            let mut headers = HashMap::new();
            if let Some(ct) = content_type {
                headers.insert("Content-Type".to_string(), ct.to_string());
            }
            self.client.put(&path, payload, headers).await.map(|_| ())
        }
    }

    async fn download(&self, key: &str) -> Result<Bytes> {
        tracing::debug!(key, "service download");
        self.client.get(&self.path_for(key)).await
    }

    async fn download_chunk(&self, key: &str, range: Range<u64>) -> Result<Bytes> {
        tracing::debug!(key, start = range.start, end = range.end, "service download_chunk");
        if range.start >= range.end {
            return Ok(Bytes::new());
        }
        let mut headers = HashMap::new();
        headers.insert("Range".to_string(), range_header(&range));
        self.client
            .get_with_headers(&self.path_for(key), headers)
            .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        tracing::debug!(key, "service delete");
        self.client.delete(&self.path_for(key)).await
    }

    async fn delete_prefixed(&self, prefix: &str) -> Result<()> {
        tracing::debug!(prefix, "service delete_prefixed");
        let base = self.path_for(prefix);

        // A failed listing (e.g. the prefix never existed) skips the
        // per-entry loop; the prefix path delete below still runs, matching
        // the delete-then-cleanup contract.
        match self.client.getlist(&base).await {
            Ok(entries) => {
                for entry in entries {
                    self.client.delete(&format!("{}{}", base, entry.name)).await?;
                }
            }
            Err(Error::Upstream(_)) => {}
            Err(e) => return Err(e),
        }

        self.client.delete(&base).await
    }

    async fn exist(&self, key: &str) -> Result<bool> {
        let result = match self.client.getinfo(&self.path_for(key)).await {
            Ok(_) => true,
            Err(Error::Upstream(_)) => false,
            Err(e) => return Err(e),
        };
        tracing::debug!(key, exist = result, "service exist");
        Ok(result)
    }

    fn url(&self, key: &str, process: Option<&str>) -> String {
        let mut url = String::with_capacity(
            self.host.len() + self.folder.len() + key.len() + 2,
        );
        url.push_str(&self.host);
        if !self.folder.is_empty() {
            url.push('/');
            url.push_str(&self.folder);
        }
        url.push('/');
        url.push_str(key);
        if let Some(process) = process {
            url.push_str(&self.identifier);
            url.push_str(process);
        }
        url
    }

    fn url_for_direct_upload(&self, key: &str) -> String {
        let mut url = format!("{}/{}", DIRECT_UPLOAD_ENDPOINT, self.bucket);
        if !self.folder.is_empty() {
            url.push('/');
            url.push_str(&self.folder);
        }
        url.push('/');
        url.push_str(key);
        url
    }

    fn headers_for_direct_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> HashMap<String, String> {
        let uri = format!("/{}{}", self.bucket, self.path_for(key));
        let date = Signer::http_date(Utc::now());
        // The agent supplies the body itself later, so this is always the
        // digest-free signing string regardless of the configured scheme.
        let authorization = self.client.signer().authorization("PUT", &uri, &date, None);

        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        headers.insert("Authorization".to_string(), authorization);
        headers.insert("X-Date".to_string(), date);
        headers
    }
}

/// Convert an end-exclusive byte range into the inclusive `Range` header
/// form: the exclusive end minus one. The range must be non-empty;
/// `download_chunk` short-circuits empty ranges before reaching here.
fn range_header(range: &Range<u64>) -> String {
    debug_assert!(range.start < range.end);
    format!("bytes={}-{}", range.start, range.end.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            bucket: "demo".to_string(),
            operator: "op".to_string(),
            password: "secret".to_string(),
            endpoint: "auto".to_string(),
            host: "https://cdn.example.com".to_string(),
            folder: "attachments".to_string(),
            ..Config::default()
        }
    }

    fn service() -> UpyunService {
        UpyunService::new(&test_config()).unwrap()
    }

    #[test]
    fn test_range_header_exclusive_end() {
        assert_eq!(range_header(&(0..10)), "bytes=0-9");
        assert_eq!(range_header(&(5..6)), "bytes=5-5");
        assert_eq!(range_header(&(100..200)), "bytes=100-199");
    }

    #[test]
    fn test_path_for() {
        let svc = service();
        assert_eq!(svc.path_for("a/b.txt"), "/attachments/a/b.txt");

        let mut config = test_config();
        config.folder = String::new();
        let svc = UpyunService::new(&config).unwrap();
        assert_eq!(svc.path_for("a.txt"), "/a.txt");
    }

    #[test]
    fn test_url() {
        let svc = service();
        assert_eq!(
            svc.url("photo.jpg", None),
            "https://cdn.example.com/attachments/photo.jpg"
        );
        assert_eq!(
            svc.url("photo.jpg", Some("/fw/300")),
            "https://cdn.example.com/attachments/photo.jpg!/fw/300"
        );
    }

    #[test]
    fn test_url_for_direct_upload() {
        let svc = service();
        assert_eq!(
            svc.url_for_direct_upload("photo.jpg"),
            "https://v0.api.upyun.com/demo/attachments/photo.jpg"
        );
    }

    #[test]
    fn test_headers_for_direct_upload() {
        let svc = service();
        let headers = svc.headers_for_direct_upload("photo.jpg", "image/jpeg");

        assert_eq!(headers.get("Content-Type").unwrap(), "image/jpeg");
        assert!(headers.get("Authorization").unwrap().starts_with("UPYUN op:"));
        assert!(headers.get("X-Date").unwrap().ends_with("GMT"));
    }

    #[test]
    fn test_multipart_tuning_from_config_is_clamped() {
        let mut config = test_config();
        config.upload.part_size = 100;
        let svc = UpyunService::new(&config).unwrap();
        assert_eq!(svc.multipart.part_size, crate::rest::types::MIN_PART_SIZE);
    }

    #[test]
    fn test_invalid_endpoint_fails_fast() {
        let mut config = test_config();
        config.endpoint = "eu-central".to_string();
        assert!(matches!(
            UpyunService::new(&config),
            Err(Error::Config(_))
        ));
    }
}
