use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use crate::common::TestGateway;
use textclass_internal::endpoints::status::TEXTCLASS_VERSION;
use textclass_internal::gateway_util::VERSION_HEADER;

#[tokio::test]
async fn e2e_test_status() {
    let gateway = TestGateway::start().await;
    let response = Client::new()
        .get(gateway.url("/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(VERSION_HEADER).unwrap(),
        TEXTCLASS_VERSION
    );
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "ok", "version": TEXTCLASS_VERSION}));
}

#[tokio::test]
async fn e2e_test_health() {
    let gateway = TestGateway::start().await;
    let response = Client::new()
        .get(gateway.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"gateway": "ok", "classifier": "dummy (dummy)"}));
}

#[tokio::test]
async fn e2e_test_unknown_route() {
    let gateway = TestGateway::start().await;
    let response = Client::new()
        .get(gateway.url("/v1/chat/completions"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    // Error responses carry the version header too
    assert_eq!(
        response.headers().get(VERSION_HEADER).unwrap(),
        TEXTCLASS_VERSION
    );
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({"detail": "Route not found: GET /v1/chat/completions"})
    );
}

#[tokio::test]
async fn e2e_test_wrong_method() {
    let gateway = TestGateway::start().await;
    let response = Client::new()
        .get(gateway.url("/classify"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(gateway.classifier_calls(), 0);
}
