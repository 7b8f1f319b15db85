use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::tests::test_support::StubHolder;
use crate::{Dispatcher, Error, Method, RequestDescriptor};

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Account {
    #[serde(rename = "Id")]
    id: String,
}

#[tokio::test]
async fn invalid_credentials_fail_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"Id":"001"}"#))
        .expect(0)
        .mount(&server)
        .await;

    let holder = Arc::new(StubHolder::new(server.uri(), ""));
    let dispatcher = Dispatcher::new(holder.clone());

    let res = dispatcher
        .get::<Account>("/services/data/v59.0/sobjects/Account/001", &[])
        .await;

    match res {
        Err(Error::Config(msg)) => assert!(msg.contains("No access token")),
        other => panic!("expected Error::Config, got {:?}", other),
    }
    assert_eq!(holder.authenticate_count(), 0);
}

#[tokio::test]
async fn unencodable_body_is_not_sent() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    // serde_json only accepts string-like map keys
    let mut body = BTreeMap::new();
    body.insert(vec![1u8, 2], 3u8);

    let dispatcher = Dispatcher::new(Arc::new(StubHolder::new(server.uri(), "tok")));
    let request = RequestDescriptor::new(Method::Post, "/services/data/v59.0/sobjects/Account")
        .with_body(body);

    match dispatcher.dispatch_discard(&request).await {
        Err(Error::Encode(err)) => assert!(err.to_string().contains("key must be a string")),
        other => panic!("expected Error::Encode, got {:?}", other),
    }
}

#[tokio::test]
async fn transport_failure_is_surfaced_without_retry() {
    // nothing listens on port 9 locally
    let holder = Arc::new(StubHolder::new("http://127.0.0.1:9", "tok"));
    let dispatcher = Dispatcher::new(holder.clone());

    match dispatcher.delete("/services/data/v59.0/sobjects/Account/001", &[]).await {
        Err(Error::Transport(err)) => assert!(err.is_connect() || err.is_request()),
        other => panic!("expected Error::Transport, got {:?}", other),
    }
    assert_eq!(holder.authenticate_count(), 0);
    assert_eq!(
        holder
            .validate_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}
