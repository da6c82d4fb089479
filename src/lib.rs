//! upyun - UPYUN REST storage client with an attachment-service adapter

pub mod config;
pub mod rest;
pub mod service;

pub use config::Config;
pub use rest::{Endpoint, Error, Payload, RestClient, Result, SigningScheme};
pub use service::{BlobService, UpyunService};
