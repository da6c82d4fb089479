//! REST-operation wire shapes against a scripted transport

mod common;

use common::MockTransport;
use std::sync::Arc;
use upyun::rest::{Endpoint, Error, RestClient, Signer, SigningScheme};

fn client(mock: &Arc<MockTransport>) -> RestClient {
    RestClient::new(
        mock.clone(),
        Signer::new("op".to_string(), "secret", SigningScheme::Digest),
        "demo".to_string(),
        Endpoint::Auto,
    )
}

#[tokio::test]
async fn test_mkdir_posts_folder_header() {
    let mock = Arc::new(MockTransport::new());
    let client = client(&mock);
    client.mkdir("/attachments/newdir").await.unwrap();

    let reqs = mock.requests();
    assert_eq!(reqs.len(), 1);
    assert_eq!(reqs[0].method, "POST");
    assert_eq!(reqs[0].path, "/demo/attachments/newdir");
    assert_eq!(reqs[0].query, None);
    assert_eq!(reqs[0].headers["folder"], "true");
    assert_eq!(reqs[0].headers["content-length"], "0");
    assert!(reqs[0].headers["authorization"].starts_with("UPYUN op:"));
}

#[tokio::test]
async fn test_usage_parses_integer_body() {
    let mock = Arc::new(MockTransport::new());
    mock.respond(200, &[], b"1638400");

    let client = client(&mock);
    assert_eq!(client.usage().await.unwrap(), 1638400);

    let reqs = mock.requests();
    assert_eq!(reqs[0].method, "GET");
    assert_eq!(reqs[0].path, "/demo/");
    assert_eq!(reqs[0].query.as_deref(), Some("usage"));
}

#[tokio::test]
async fn test_usage_rejects_non_numeric_body() {
    let mock = Arc::new(MockTransport::new());
    mock.respond(200, &[], b"<html>service busy</html>");

    let client = client(&mock);
    let err = client.usage().await.unwrap_err();
    assert!(matches!(err, Error::InvalidResponse(_)));
}
