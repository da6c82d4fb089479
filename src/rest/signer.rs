//! UPYUN request signer
//!
//! Computes the `Authorization` header for REST requests. Two wire-compatible
//! schemes exist and both are supported, selected at construction:
//!
//! - `Digest`: signs `METHOD&PATH&DATE&CONTENT_MD5`, with the MD5 segment
//!   omitted entirely (not empty-padded) when the request has no body.
//! - `Simplified`: signs `METHOD&PATH&DATE`, never a content digest.
//!
//! Both HMAC-SHA1 with the hex MD5 digest of the shared secret as key, and
//! base64-encode the result. The signed path is the upstream-relative path
//! without the query string and must match the transmitted path byte for
//! byte.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::str::FromStr;

type HmacSha1 = Hmac<Sha1>;

/// Scheme tag carried in the Authorization header value
const SCHEME_TAG: &str = "UPYUN";

/// Signing scheme capability, selected by client configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningScheme {
    /// Legacy scheme: content digest included in the signing string
    Digest,
    /// Simplified scheme: method, path and date only
    Simplified,
}

impl FromStr for SigningScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "digest" => Ok(SigningScheme::Digest),
            "simplified" => Ok(SigningScheme::Simplified),
            other => Err(format!(
                "invalid signing scheme '{}' (valid: digest, simplified)",
                other
            )),
        }
    }
}

/// Per-request authentication header computation.
///
/// The secret is hashed once at construction; the raw password is not
/// retained. Immutable for the lifetime of the client.
#[derive(Clone)]
pub struct Signer {
    operator: String,
    /// Hex MD5 of the password, used directly as the HMAC key
    hashed_password: String,
    scheme: SigningScheme,
}

impl Signer {
    pub fn new(operator: String, password: &str, scheme: SigningScheme) -> Self {
        let hashed_password = hex::encode(md5::compute(password.as_bytes()).0);
        Self {
            operator,
            hashed_password,
            scheme,
        }
    }

    /// The configured scheme
    pub fn scheme(&self) -> SigningScheme {
        self.scheme
    }

    /// RFC-1123 date string used for both the `Date` header and the signing
    /// string. Callers capture one instant and use it for both, so the
    /// transmitted header can never diverge from what was signed.
    pub fn http_date(now: DateTime<Utc>) -> String {
        now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    /// Hex MD5 digest of a request body (pure function of the body bytes)
    pub fn content_md5(body: &[u8]) -> String {
        hex::encode(md5::compute(body).0)
    }

    /// Compute the Authorization header value for one request
    pub fn authorization(
        &self,
        method: &str,
        path: &str,
        date: &str,
        content_md5: Option<&str>,
    ) -> String {
        let signing = Self::signing_string(self.scheme, method, path, date, content_md5);
        let mut mac = HmacSha1::new_from_slice(self.hashed_password.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());
        format!("{} {}:{}", SCHEME_TAG, self.operator, signature)
    }

    /// Build the signing string: `&`-joined segments, digest segment present
    /// only under the digest scheme and only when a body digest exists.
    fn signing_string(
        scheme: SigningScheme,
        method: &str,
        path: &str,
        date: &str,
        content_md5: Option<&str>,
    ) -> String {
        let mut segments = vec![method, path, date];
        if scheme == SigningScheme::Digest {
            if let Some(md5) = content_md5.filter(|m| !m.is_empty()) {
                segments.push(md5);
            }
        }
        segments.join("&")
    }
}
