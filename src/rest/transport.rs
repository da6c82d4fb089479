//! HTTP transport for the REST client
//!
//! The transport is an explicitly owned connection-pool object held by the
//! client instance - no process-wide singleton. It is a trait so the request
//! executor can be driven against a scripted transport in tests.

use crate::rest::client::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::HeaderMap;
use hyper::{Request, StatusCode};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use std::time::Duration;

/// A fully collected HTTP response
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// One-request-at-a-time HTTP dispatch.
///
/// A connection/DNS/timeout failure is reported as `Error::Transport`,
/// distinct from any upstream error response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn dispatch(&self, req: Request<Full<Bytes>>) -> Result<TransportResponse>;
}

/// Hyper-backed transport with a tuned connection pool.
///
/// HTTP/1.1 only, TCP_NODELAY, 90s idle connections, 10s connect timeout,
/// native-tls for TLS. The per-request timeout covers the whole exchange
/// including reading the body.
pub struct HyperTransport {
    client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Duration,
}

impl HyperTransport {
    pub fn new(timeout: Duration) -> Self {
        let insecure_tls = std::env::var("UPYUN_INSECURE_TLS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(Some(Duration::from_secs(10)));
        http.set_keepalive(Some(Duration::from_secs(90)));

        let tls = if insecure_tls {
            tracing::warn!("INSECURE TLS MODE ENABLED: Certificate verification is disabled!");
            TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .expect("Failed to build TLS connector")
        } else {
            TlsConnector::new().expect("Failed to build TLS connector")
        };

        let https = HttpsConnector::from((http, tls.into()));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(32)
            .retry_canceled_requests(true)
            .set_host(true)
            .build(https);

        Self { client, timeout }
    }

    async fn send(&self, req: Request<Full<Bytes>>) -> Result<TransportResponse> {
        let response = self
            .client
            .request(req)
            .await
            .map_err(|e| Error::Transport(format!("request failed: {}", e)))?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| Error::Transport(format!("response body error: {}", e)))?
            .to_bytes();

        Ok(TransportResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

#[async_trait]
impl HttpTransport for HyperTransport {
    async fn dispatch(&self, req: Request<Full<Bytes>>) -> Result<TransportResponse> {
        tokio::time::timeout(self.timeout, self.send(req))
            .await
            .map_err(|_| {
                Error::Transport(format!("request timed out after {:?}", self.timeout))
            })?
    }
}
