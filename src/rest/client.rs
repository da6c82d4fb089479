//! UPYUN REST client
//!
//! One method per protocol operation, all built on a single request executor
//! that signs, dispatches and classifies. Non-2xx responses become typed
//! `ErrorResult` values carried in `Error::Upstream`; transport faults are a
//! distinct variant and are never folded into a zero-code upstream error.

use crate::rest::signer::{Signer, SigningScheme};
use crate::rest::transport::{HttpTransport, TransportResponse};
use crate::rest::types::{
    parse_listing, Endpoint, ErrorResult, ListingEntry, MultipartConfig, ObjectMetadata, Payload,
    UploadSession,
};
use bytes::Bytes;
use chrono::Utc;
use http_body_util::Full;
use hyper::{Method, Request, StatusCode};
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use thiserror::Error;

/// Hex lookup table for URI encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Multipart protocol headers. These names are part of the wire protocol and
/// must be reproduced exactly.
const H_MULTI_DISORDER: &str = "X-Upyun-Multi-Disorder";
const H_MULTI_STAGE: &str = "X-Upyun-Multi-Stage";
const H_MULTI_LENGTH: &str = "X-Upyun-Multi-Length";
const H_MULTI_PART_SIZE: &str = "X-Upyun-Multi-Part-Size";
const H_MULTI_TYPE: &str = "X-Upyun-Multi-Type";
const H_MULTI_UUID: &str = "X-Upyun-Multi-Uuid";
const H_PART_ID: &str = "X-Upyun-Part-Id";

/// REST client errors
#[derive(Error, Debug)]
pub enum Error {
    /// Non-2xx upstream response, carried as a typed value
    #[error("upstream error: {0}")]
    Upstream(ErrorResult),

    /// Connection, DNS or timeout failure before a response existed
    #[error("transport fault: {0}")]
    Transport(String),

    /// A 2xx response that violates the protocol contract
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid endpoint or scheme selection at construction time
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The upstream error payload, when this is a protocol error
    pub fn as_upstream(&self) -> Option<&ErrorResult> {
        match self {
            Error::Upstream(e) => Some(e),
            _ => None,
        }
    }
}

/// JSON shape of a listing response
#[derive(Deserialize)]
struct JsonListing {
    #[serde(default)]
    files: Vec<ListingEntry>,
}

/// UPYUN REST client for one bucket.
///
/// Credentials and endpoint are immutable after construction. The transport
/// is an owned connection pool, safe for sequential reuse across calls.
pub struct RestClient {
    transport: Arc<dyn HttpTransport>,
    signer: Signer,
    bucket: String,
    endpoint: Endpoint,
    debug: bool,
}

impl RestClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        signer: Signer,
        bucket: String,
        endpoint: Endpoint,
    ) -> Self {
        Self {
            transport,
            signer,
            bucket,
            endpoint,
            debug: false,
        }
    }

    /// Enable per-request debug logging
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload a complete object body in one request.
    ///
    /// A stream payload is drained fully into memory first: the protocol
    /// requires a known `Content-Length` up front. Image buckets may answer
    /// with `x-upyun-*` metadata headers; when none are present this returns
    /// `Ok(None)`. The payload's resource is released on every exit path.
    pub async fn put(
        &self,
        path: &str,
        payload: Payload,
        headers: HashMap<String, String>,
    ) -> Result<Option<ObjectMetadata>> {
        let body = payload.into_bytes()?;
        let response = self
            .request(Method::PUT, path, headers, Some(body), None)
            .await?;
        let meta = ObjectMetadata::from_put_headers(&response.headers);
        Ok(if meta.is_empty() { None } else { Some(meta) })
    }

    /// Download an object
    pub async fn get(&self, path: &str) -> Result<Bytes> {
        self.get_with_headers(path, HashMap::new()).await
    }

    /// Download an object with extra request headers (e.g. `Range`)
    pub async fn get_with_headers(
        &self,
        path: &str,
        headers: HashMap<String, String>,
    ) -> Result<Bytes> {
        let response = self.request(Method::GET, path, headers, None, None).await?;
        Ok(response.body)
    }

    /// Stat an object: HEAD request, metadata from `x-upyun-file-*` headers
    pub async fn getinfo(&self, path: &str) -> Result<ObjectMetadata> {
        let response = self
            .request(Method::HEAD, path, HashMap::new(), None, None)
            .await?;
        Ok(ObjectMetadata::from_stat_headers(&response.headers))
    }

    /// Delete an object or an empty folder
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.request(Method::DELETE, path, HashMap::new(), None, None)
            .await?;
        Ok(())
    }

    /// Create a folder
    pub async fn mkdir(&self, path: &str) -> Result<()> {
        let mut headers = HashMap::new();
        headers.insert("folder".to_string(), "true".to_string());
        self.request(Method::POST, path, headers, None, None).await?;
        Ok(())
    }

    /// List entries under a path.
    ///
    /// The body is either the tab-separated line listing or, when the
    /// response content type says so, a JSON document with a `files` array.
    pub async fn getlist(&self, path: &str) -> Result<Vec<ListingEntry>> {
        let response = self.request(Method::GET, path, HashMap::new(), None, None).await?;

        let is_json = response
            .headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("json"))
            .unwrap_or(false);

        if is_json {
            let listing: JsonListing = serde_json::from_slice(&response.body)
                .map_err(|e| Error::InvalidResponse(format!("listing JSON parse error: {}", e)))?;
            Ok(listing.files)
        } else {
            Ok(parse_listing(&String::from_utf8_lossy(&response.body)))
        }
    }

    /// Bucket usage in bytes
    pub async fn usage(&self) -> Result<u64> {
        let response = self
            .request(Method::GET, "/", HashMap::new(), None, Some("usage"))
            .await?;
        let text = String::from_utf8_lossy(&response.body);
        text.trim()
            .parse()
            .map_err(|_| Error::InvalidResponse(format!("unexpected usage body: {}", text)))
    }

    // =========================================================================
    // Multipart upload
    // =========================================================================

    /// Upload a large payload with the serial three-stage multipart protocol.
    ///
    /// Stages run strictly in sequence: initiate, then each part in issuing
    /// order, then complete. The completion call is issued unconditionally
    /// once a session uuid exists - including after a part failure - so the
    /// upstream session is never left dangling. A part failure wins over a
    /// completion failure; the latter is logged as secondary information.
    pub async fn put_multipart(
        &self,
        path: &str,
        payload: Payload,
        content_type: Option<&str>,
        config: &MultipartConfig,
    ) -> Result<()> {
        let total_size = payload.len();
        let mut reader = payload.into_reader();

        // Initiate failure is fatal for the whole upload: no session exists
        // upstream, nothing to clean up.
        let mut session = self
            .initiate_multipart(path, total_size, content_type, config.part_size)
            .await?;

        let mut part_error: Option<Error> = None;
        loop {
            let chunk = match read_part(reader.as_mut(), config.part_size) {
                Ok(chunk) => chunk,
                Err(e) => {
                    part_error = Some(e.into());
                    break;
                }
            };
            if chunk.is_empty() {
                break;
            }
            if let Err(e) = self.upload_part(path, &mut session, Bytes::from(chunk)).await {
                part_error = Some(e);
                break;
            }
        }

        let completion = self.complete_multipart(path, &session).await;

        // Reader dropped here on every path, releasing the payload resource.
        match part_error {
            Some(e) => {
                if let Err(completion_err) = completion {
                    tracing::warn!(
                        error = %completion_err,
                        uuid = %session.uuid,
                        "multipart completion after failed part also failed"
                    );
                }
                Err(e)
            }
            None => completion,
        }
    }

    /// Initiate stage: zero-length request announcing size, part size and
    /// content type. The protocol requires exactly 204 plus a session uuid
    /// response header.
    async fn initiate_multipart(
        &self,
        path: &str,
        total_size: u64,
        content_type: Option<&str>,
        part_size: usize,
    ) -> Result<UploadSession> {
        let mut headers = HashMap::new();
        headers.insert(H_MULTI_DISORDER.to_string(), "true".to_string());
        headers.insert(H_MULTI_STAGE.to_string(), "initiate".to_string());
        headers.insert(H_MULTI_LENGTH.to_string(), total_size.to_string());
        headers.insert(H_MULTI_PART_SIZE.to_string(), part_size.to_string());
        if let Some(ct) = content_type {
            headers.insert(H_MULTI_TYPE.to_string(), ct.to_string());
        }

        let response = self
            .request(Method::PUT, path, headers, Some(Bytes::new()), None)
            .await?;

        if response.status != StatusCode::NO_CONTENT {
            return Err(Error::InvalidResponse(format!(
                "expected 204 from multipart initiate, got {}",
                response.status
            )));
        }

        let uuid = response
            .headers
            .get("x-upyun-multi-uuid")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::InvalidResponse("multipart initiate response missing session uuid".to_string())
            })?;

        Ok(UploadSession {
            uuid,
            part_size,
            total_size,
            next_part_id: 0,
        })
    }

    /// Upload one part. The part id increments once per successful part;
    /// ids start at 0.
    async fn upload_part(
        &self,
        path: &str,
        session: &mut UploadSession,
        chunk: Bytes,
    ) -> Result<()> {
        let mut headers = HashMap::new();
        headers.insert(H_MULTI_STAGE.to_string(), "upload".to_string());
        headers.insert(H_MULTI_UUID.to_string(), session.uuid.clone());
        headers.insert(H_PART_ID.to_string(), session.next_part_id.to_string());

        self.request(Method::PUT, path, headers, Some(chunk), None)
            .await?;
        session.next_part_id += 1;
        Ok(())
    }

    /// Complete stage: zero-length request closing the session
    async fn complete_multipart(&self, path: &str, session: &UploadSession) -> Result<()> {
        let mut headers = HashMap::new();
        headers.insert(H_MULTI_STAGE.to_string(), "complete".to_string());
        headers.insert(H_MULTI_UUID.to_string(), session.uuid.clone());

        self.request(Method::PUT, path, headers, Some(Bytes::new()), None)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Request executor
    // =========================================================================

    /// Build, sign, dispatch and classify one request.
    ///
    /// The Date header and the signature are computed from one captured
    /// instant; the signed path is the bucket-prefixed path without the query
    /// string, byte-identical to what is transmitted.
    async fn request(
        &self,
        method: Method,
        path: &str,
        headers: HashMap<String, String>,
        body: Option<Bytes>,
        query: Option<&str>,
    ) -> Result<TransportResponse> {
        let fullpath = join_bucket_path(&self.bucket, path);
        let mut url = format!("https://{}{}", self.endpoint.host(), fullpath);
        if let Some(q) = query {
            url.push('?');
            url.push_str(q);
        }

        let date = Signer::http_date(Utc::now());
        let content_md5 = match (&body, self.signer.scheme()) {
            (Some(b), SigningScheme::Digest) if !b.is_empty() => Some(Signer::content_md5(b)),
            _ => None,
        };
        let authorization =
            self.signer
                .authorization(method.as_str(), &fullpath, &date, content_md5.as_deref());

        let mut builder = Request::builder().method(method.clone()).uri(&url);
        for (key, value) in &headers {
            builder = builder.header(&*canonical_header_key(key), value);
        }
        builder = builder
            .header("Date", &date)
            .header("Authorization", &authorization);
        if let Some(md5) = &content_md5 {
            builder = builder.header("Content-MD5", md5);
        }

        // Body-carrying verbs always send Content-Length, even for a
        // zero-length body (multipart initiate/complete).
        let carries_body =
            method == Method::PUT || method == Method::POST || method == Method::PATCH;
        let body_bytes = if carries_body {
            body.unwrap_or_default()
        } else {
            Bytes::new()
        };
        if carries_body {
            builder = builder.header("Content-Length", body_bytes.len().to_string());
        }

        if self.debug {
            tracing::debug!(method = %method, path = %fullpath, "dispatching request");
        }

        let request = builder.body(Full::new(body_bytes))?;
        let response = self.transport.dispatch(request).await?;

        if self.debug {
            tracing::debug!(status = %response.status, path = %fullpath, "response");
        }

        if response.status.is_success() {
            Ok(response)
        } else {
            let request_id = response
                .headers
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Err(Error::Upstream(ErrorResult {
                request_id,
                code: response.status.as_u16(),
                message: String::from_utf8_lossy(&response.body).to_string(),
            }))
        }
    }
}

/// Prefix a path with the bucket segment, normalizing the leading slash.
///
/// The resulting string is both signed and transmitted.
fn join_bucket_path(bucket: &str, path: &str) -> String {
    let encoded = encode_path(path);
    let mut full = String::with_capacity(1 + bucket.len() + 1 + encoded.len());
    full.push('/');
    full.push_str(bucket);
    if !encoded.starts_with('/') {
        full.push('/');
    }
    full.push_str(&encoded);
    full
}

/// Percent-encode a path, preserving forward slashes.
/// Returns Cow::Borrowed when no encoding is needed (common case).
fn encode_path(path: &str) -> Cow<str> {
    let needs_encoding = path
        .bytes()
        .any(|b| !matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/'));

    if !needs_encoding {
        return Cow::Borrowed(path);
    }

    let mut result = String::with_capacity(path.len() + 32);
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                result.push(byte as char);
            }
            _ => {
                result.push('%');
                result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
            }
        }
    }
    Cow::Owned(result)
}

/// Canonicalize a caller-supplied header key: lowercase, underscores to
/// hyphens. Applied once before signing and transmission, independent of the
/// caller's casing.
fn canonical_header_key(key: &str) -> Cow<str> {
    if key
        .bytes()
        .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'-'))
    {
        return Cow::Borrowed(key);
    }
    Cow::Owned(
        key.chars()
            .map(|c| match c {
                '_' => '-',
                c => c.to_ascii_lowercase(),
            })
            .collect(),
    )
}

/// Read up to `part_size` bytes from the source.
///
/// Returns a short (possibly empty) chunk only at end of input; the multipart
/// loop terminates on an empty chunk.
fn read_part(reader: &mut (dyn Read + Send), part_size: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; part_size];
    let mut filled = 0;

    while filled < part_size {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    buf.truncate(filled);
    Ok(buf)
}
