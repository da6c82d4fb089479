//! UPYUN REST protocol module
//!
//! This module provides:
//! - Request signing (digest and simplified schemes)
//! - The request executor with typed error classification
//! - Single-shot and serial multipart uploads
//! - Stat, list, delete, mkdir and usage operations

pub mod client;
pub mod signer;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{Error, RestClient, Result};
pub use signer::{Signer, SigningScheme};
pub use transport::{HttpTransport, HyperTransport, TransportResponse};
pub use types::{
    parse_listing, Endpoint, EntryKind, ErrorResult, ListingEntry, MultipartConfig,
    ObjectMetadata, Payload, UploadSession,
};
