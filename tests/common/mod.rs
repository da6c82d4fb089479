//! Scripted transport for driving the client without a network

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::{Request, StatusCode};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use upyun::rest::{HttpTransport, Result, TransportResponse};

/// One request as the transport saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Transport that records every request and replays scripted responses in
/// order. When the script runs out it answers 200 with an empty body.
pub struct MockTransport {
    requests: Mutex<Vec<RecordedRequest>>,
    responses: Mutex<VecDeque<TransportResponse>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue the next response
    pub fn respond(&self, status: u16, headers: &[(&str, &str)], body: &[u8]) {
        let mut header_map = HeaderMap::new();
        for (k, v) in headers {
            header_map.insert(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        self.responses.lock().unwrap().push_back(TransportResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers: header_map,
            body: Bytes::copy_from_slice(body),
        });
    }

    /// Everything dispatched so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn dispatch(&self, req: Request<Full<Bytes>>) -> Result<TransportResponse> {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(str::to_string);
        let headers = req
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = req
            .into_body()
            .collect()
            .await
            .expect("infallible body")
            .to_bytes()
            .to_vec();

        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            path,
            query,
            headers,
            body,
        });

        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(TransportResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::new(),
            }))
    }
}
