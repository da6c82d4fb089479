//! UPYUN types and response structures

use bytes::Bytes;
use hyper::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Cursor, Read};
use std::str::FromStr;

/// Header prefix the provider uses for object metadata on put/stat responses
pub const METADATA_PREFIX: &str = "x-upyun-";

/// Header prefix carrying file info on stat (HEAD) responses
pub const FILE_INFO_PREFIX: &str = "x-upyun-file-";

/// Selected upstream API host, resolved once at client construction.
///
/// `Auto` lets the provider route to the nearest region; the others pin a
/// carrier-specific host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Auto,
    Telecom,
    Cnc,
    Ctt,
}

impl Endpoint {
    /// Hostname for this endpoint
    pub fn host(&self) -> &'static str {
        match self {
            Endpoint::Auto => "v0.api.upyun.com",
            Endpoint::Telecom => "v1.api.upyun.com",
            Endpoint::Cnc => "v2.api.upyun.com",
            Endpoint::Ctt => "v3.api.upyun.com",
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Auto
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" | "v0" => Ok(Endpoint::Auto),
            "telecom" | "v1" => Ok(Endpoint::Telecom),
            "cnc" | "v2" => Ok(Endpoint::Cnc),
            "ctt" | "v3" => Ok(Endpoint::Ctt),
            other => Err(format!(
                "invalid endpoint '{}' (valid: auto, telecom, cnc, ctt)",
                other
            )),
        }
    }
}

/// Object metadata parsed from `x-upyun-*` response headers.
///
/// Put responses for image buckets may carry width/height/frames; stat
/// responses carry the `file-*` fields. Numeric-looking values are parsed to
/// integers, others are passed through as strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub file_type: Option<String>,
    pub file_size: Option<u64>,
    pub file_date: Option<i64>,
    pub width: Option<u64>,
    pub height: Option<u64>,
    pub frames: Option<u64>,
}

impl ObjectMetadata {
    /// Extract metadata from a put response, accepting any `x-upyun-*` header
    pub fn from_put_headers(headers: &HeaderMap) -> Self {
        Self::extract(headers, METADATA_PREFIX)
    }

    /// Extract metadata from a stat response, accepting only the
    /// `x-upyun-file-*` headers
    pub fn from_stat_headers(headers: &HeaderMap) -> Self {
        Self::extract(headers, FILE_INFO_PREFIX)
    }

    // Field names are keyed on the header name with the vendor prefix
    // stripped, so `prefix` must extend `METADATA_PREFIX`.
    fn extract(headers: &HeaderMap, prefix: &str) -> Self {
        debug_assert!(prefix.starts_with(METADATA_PREFIX));
        let mut meta = ObjectMetadata::default();
        for (name, value) in headers {
            let name = name.as_str();
            if !name.starts_with(prefix) {
                continue;
            }
            let value = match value.to_str() {
                Ok(v) => v,
                Err(_) => continue,
            };
            match &name[METADATA_PREFIX.len()..] {
                "width" => meta.width = value.parse().ok(),
                "height" => meta.height = value.parse().ok(),
                "frames" => meta.frames = value.parse().ok(),
                "file-type" => meta.file_type = Some(value.to_string()),
                "file-size" => meta.file_size = value.parse().ok(),
                "file-date" => meta.file_date = value.parse().ok(),
                _ => {}
            }
        }
        meta
    }

    /// True when no metadata header was present on the response
    pub fn is_empty(&self) -> bool {
        *self == ObjectMetadata::default()
    }
}

/// Kind of a listing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingEntry {
    /// Entry name, relative to the listed path
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Size in bytes (0 for folders)
    pub length: u64,
    /// Unix timestamp of last modification
    pub last_modified: i64,
}

/// Parse the tab-separated listing body: one `name\ttype\tsize\tmtime` row
/// per line, type `N` marking a file and anything else a folder.
pub fn parse_listing(body: &str) -> Vec<ListingEntry> {
    body.lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            let mut attrs = line.split('\t');
            let name = attrs.next().unwrap_or_default().to_string();
            let kind = if attrs.next() == Some("N") {
                EntryKind::File
            } else {
                EntryKind::Folder
            };
            let length = attrs.next().and_then(|v| v.parse().ok()).unwrap_or(0);
            let last_modified = attrs.next().and_then(|v| v.parse().ok()).unwrap_or(0);
            ListingEntry {
                name,
                kind,
                length,
                last_modified,
            }
        })
        .collect()
}

/// Structured error for any non-2xx upstream response.
///
/// This is a typed value describing a normal protocol failure (not found,
/// forbidden, conflict); transport faults are reported separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResult {
    /// Provider-assigned request id, when the response carried one
    pub request_id: Option<String>,
    /// Upstream HTTP status code
    pub code: u16,
    /// Response body text
    pub message: String,
}

impl fmt::Display for ErrorResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.request_id {
            Some(id) => write!(f, "{} {} (request id {})", self.code, self.message, id),
            None => write!(f, "{} {}", self.code, self.message),
        }
    }
}

/// Server-side multipart session state, owned by exactly one upload call.
///
/// The uuid obtained from the initiate stage is reused unchanged for every
/// part and for the completion call, then discarded.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub uuid: String,
    pub part_size: usize,
    pub total_size: u64,
    pub next_part_id: u32,
}

/// Configuration for multipart uploads
#[derive(Debug, Clone)]
pub struct MultipartConfig {
    /// Part size in bytes (protocol bounds: 1MiB - 50MiB)
    pub part_size: usize,
    /// Payload size at or above which uploads switch to multipart
    pub threshold: u64,
}

/// Protocol minimum block size (1MiB)
pub const MIN_PART_SIZE: usize = 1024 * 1024;
/// Protocol maximum block size (50MiB)
pub const MAX_PART_SIZE: usize = 50 * 1024 * 1024;

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            part_size: MIN_PART_SIZE,      // 1MiB blocks
            threshold: 10 * 1024 * 1024,   // multipart for payloads >= 10MiB
        }
    }
}

impl MultipartConfig {
    /// Set the part size, clamped to the protocol bounds
    pub fn with_part_size(mut self, size: usize) -> Self {
        self.part_size = size.clamp(MIN_PART_SIZE, MAX_PART_SIZE);
        self
    }

    /// Set the single-shot/multipart threshold
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }
}

/// An upload payload: an in-memory buffer or a readable stream of known
/// length.
///
/// The underlying resource is released when the payload is dropped, which
/// happens on every exit path of the operations that consume one.
pub enum Payload {
    Buffer(Bytes),
    Stream {
        reader: Box<dyn Read + Send>,
        len: u64,
    },
}

impl Payload {
    /// Wrap a readable stream with a known total length
    pub fn from_reader(reader: Box<dyn Read + Send>, len: u64) -> Self {
        Payload::Stream { reader, len }
    }

    /// Total payload length in bytes
    pub fn len(&self) -> u64 {
        match self {
            Payload::Buffer(b) => b.len() as u64,
            Payload::Stream { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the payload fully into memory.
    ///
    /// Single-shot uploads need the whole body up front because the protocol
    /// requires a known `Content-Length` (chunked transfer is not supported).
    pub fn into_bytes(self) -> std::io::Result<Bytes> {
        match self {
            Payload::Buffer(b) => Ok(b),
            Payload::Stream { mut reader, len } => {
                let mut buf = Vec::with_capacity(len as usize);
                reader.read_to_end(&mut buf)?;
                Ok(Bytes::from(buf))
            }
        }
    }

    /// Turn the payload into a sequential reader (for chunked multipart reads)
    pub fn into_reader(self) -> Box<dyn Read + Send> {
        match self {
            Payload::Buffer(b) => Box::new(Cursor::new(b)),
            Payload::Stream { reader, .. } => reader,
        }
    }
}

impl From<Bytes> for Payload {
    fn from(b: Bytes) -> Self {
        Payload::Buffer(b)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(v: Vec<u8>) -> Self {
        Payload::Buffer(Bytes::from(v))
    }
}

impl From<&'static [u8]> for Payload {
    fn from(s: &'static [u8]) -> Self {
        Payload::Buffer(Bytes::from_static(s))
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Buffer(b) => write!(f, "Payload::Buffer({} bytes)", b.len()),
            Payload::Stream { len, .. } => write!(f, "Payload::Stream({} bytes)", len),
        }
    }
}
