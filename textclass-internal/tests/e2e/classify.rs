use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use crate::common::{TestGateway, LABELS};

async fn post_json(gateway: &TestGateway, body: Value) -> (StatusCode, Value) {
    let response = Client::new()
        .post(gateway.url("/classify"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

/// Checks one result list: known labels, descending scores, at most `max_len` entries.
fn assert_scores(scores: &Value, max_len: usize) -> Vec<f64> {
    let entries = scores.as_array().unwrap();
    assert!(!entries.is_empty() && entries.len() <= max_len, "{scores}");
    let values: Vec<f64> = entries
        .iter()
        .map(|entry| {
            let label = entry["label"].as_str().unwrap();
            assert!(LABELS.contains(&label), "Unexpected label {label}");
            entry["score"].as_f64().unwrap()
        })
        .collect();
    assert!(
        values.windows(2).all(|w| w[0] >= w[1]),
        "Scores are not in descending order: {scores}"
    );
    values
}

#[tokio::test]
async fn e2e_test_classify_single_text() {
    let gateway = TestGateway::start().await;
    let (status, body) = post_json(&gateway, json!({"inputs": "I love this product"})).await;
    assert_eq!(status, StatusCode::OK);
    let scores = assert_scores(&body, 1);
    assert_eq!(scores.len(), 1);
    assert!((0.0..=1.0).contains(&scores[0]));
    assert_eq!(gateway.classifier_calls(), 1);
}

#[tokio::test]
async fn e2e_test_classify_text_list() {
    let gateway = TestGateway::start().await;
    let (status, body) = post_json(&gateway, json!({"inputs": ["good", "bad"], "top_k": 2})).await;
    assert_eq!(status, StatusCode::OK);
    let batch = body.as_array().unwrap();
    assert_eq!(batch.len(), 2);
    for scores in batch {
        assert_eq!(assert_scores(scores, 2).len(), 2);
    }

    // Each batch entry matches classifying that text on its own
    for (i, text) in ["good", "bad"].into_iter().enumerate() {
        let (_, single) = post_json(&gateway, json!({"inputs": text, "top_k": 2})).await;
        assert_eq!(single, batch[i]);
    }
}

#[tokio::test]
async fn e2e_test_classify_softmax_sums_to_one() {
    let gateway = TestGateway::start().await;
    let (status, body) = post_json(
        &gateway,
        json!({"inputs": "anything", "top_k": null, "function_to_apply": "softmax"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let scores = assert_scores(&body, LABELS.len());
    assert_eq!(scores.len(), LABELS.len());
    let sum: f64 = scores.iter().sum();
    assert!((sum - 1.0).abs() < 1e-5, "Softmax scores sum to {sum}");
}

#[tokio::test]
async fn e2e_test_classify_top_k_larger_than_labels() {
    let gateway = TestGateway::start().await;
    let (status, body) = post_json(&gateway, json!({"inputs": "anything", "top_k": 50})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assert_scores(&body, LABELS.len()).len(), LABELS.len());
}

#[tokio::test]
async fn e2e_test_classify_is_idempotent() {
    let gateway = TestGateway::start().await;
    let request = json!({
        "inputs": ["first", "second", "third"],
        "top_k": 3,
        "function_to_apply": "sigmoid"
    });
    let (_, first) = post_json(&gateway, request.clone()).await;
    let (_, second) = post_json(&gateway, request).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn e2e_test_classify_text_pairs() {
    let gateway = TestGateway::start().await;
    let (status, body) = post_json(
        &gateway,
        json!({"inputs": {"text": "The weather is nice", "text_pair": "It is sunny"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_scores(&body, 1);

    let (status, body) = post_json(
        &gateway,
        json!({
            "inputs": [{"text": "a"}, {"text": ["b"], "text_pair": ["c"]}],
            "function_to_apply": "none"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let batch = body.as_array().unwrap();
    assert_eq!(batch.len(), 2);
    for scores in batch {
        // Raw logits of the dummy classifier lie in [-4, 4]
        let values = assert_scores(scores, 1);
        assert!(values.iter().all(|v| (-4.0..=4.0).contains(v)));
    }
}

#[tokio::test]
async fn e2e_test_classify_empty_list() {
    let gateway = TestGateway::start().await;
    let (status, body) = post_json(&gateway, json!({"inputs": []})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn e2e_test_classify_invalid_content_type() {
    let gateway = TestGateway::start().await;
    let client = Client::new();

    for content_type in ["text/plain", "application/xml", "multipart/form-data"] {
        let response = client
            .post(gateway.url("/classify"))
            .header(CONTENT_TYPE, content_type)
            // A valid JSON body doesn't matter if the header is wrong
            .body(r#"{"inputs": "I love this product"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({"detail": "Invalid content type"}));
    }

    let response = client
        .post(gateway.url("/classify"))
        .body(r#"{"inputs": "no header"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(gateway.classifier_calls(), 0);
}

#[tokio::test]
async fn e2e_test_classify_json_content_type_variants() {
    let gateway = TestGateway::start().await;
    let response = Client::new()
        .post(gateway.url("/classify"))
        .header(CONTENT_TYPE, "application/json; charset=utf-8")
        .body(r#"{"inputs": "hello"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(gateway.classifier_calls(), 1);
}

#[tokio::test]
async fn e2e_test_classify_malformed_json() {
    let gateway = TestGateway::start().await;
    let response = Client::new()
        .post(gateway.url("/classify"))
        .header(CONTENT_TYPE, "application/json")
        .body(r#"{"inputs": "unterminated"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detail"][0]["loc"], json!(["body"]));
    assert_eq!(body["detail"][0]["type"], "json_invalid");
    assert_eq!(gateway.classifier_calls(), 0);
}

#[tokio::test]
async fn e2e_test_classify_schema_violations() {
    let gateway = TestGateway::start().await;
    for (request, loc) in [
        (json!({"top_k": 1}), json!(["body", "inputs"])),
        (json!({"inputs": 42}), json!(["body", "inputs"])),
        (json!({"inputs": ["a", {"text": "b"}]}), json!(["body", "inputs"])),
        (json!({"inputs": "x", "top_k": 0}), json!(["body", "top_k"])),
        (json!({"inputs": "x", "top_k": "two"}), json!(["body", "top_k"])),
        (
            json!({"inputs": "x", "function_to_apply": "relu"}),
            json!(["body", "function_to_apply"]),
        ),
        (json!("not an object"), json!(["body"])),
    ] {
        let (status, body) = post_json(&gateway, request.clone()).await;
        assert_eq!(
            status,
            StatusCode::UNPROCESSABLE_ENTITY,
            "Expected {request} to be rejected"
        );
        let detail = body["detail"].as_array().unwrap();
        assert_eq!(detail.len(), 1);
        assert_eq!(detail[0]["loc"], loc, "Unexpected location for {request}");
        assert!(detail[0]["msg"].is_string());
    }
    assert_eq!(gateway.classifier_calls(), 0);
}

#[tokio::test]
async fn e2e_test_classify_classifier_failure() {
    let gateway = TestGateway::start_with_model("error").await;
    let (status, body) = post_json(&gateway, json!({"inputs": "I love this product"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"detail": "Internal Server Error"}));
    assert_eq!(gateway.classifier_calls(), 1);
}

#[tokio::test]
async fn e2e_test_classify_unsupported_pair_key() {
    let gateway = TestGateway::start().await;
    let (status, body) = post_json(
        &gateway,
        json!({"inputs": {"question": "Who?", "context": "Me."}}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"detail": "Internal Server Error"}));
}

#[tokio::test]
async fn e2e_test_classify_body_too_large() {
    let gateway = TestGateway::start().await;
    let response = Client::new()
        .post(gateway.url("/classify"))
        .header(CONTENT_TYPE, "application/json")
        .body(vec![b' '; 100 * 1024 * 1024 + 1])
        .send()
        .await
        .unwrap();
    // The body limit keeps its own status rather than becoming a validation error
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = response.json().await.unwrap();
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("length limit exceeded"), "{detail}");
    assert_eq!(gateway.classifier_calls(), 0);
}
