//! Prediction payloads and mock endpoint builders

use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::config::TEST_TOKEN;

/// Body of a prediction in `status` with the given output
pub fn prediction(id: &str, status: &str, output: Value) -> Value {
    json!({
        "id": id,
        "status": status,
        "output": output,
        "error": null,
    })
}

/// Body of a failed prediction
pub fn failed_prediction(id: &str, error: &str) -> Value {
    json!({
        "id": id,
        "status": "failed",
        "output": null,
        "error": error,
    })
}

/// Deterministic pseudo-image payload of `len` bytes
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Accept every submission with `job_id`
pub async fn mount_submit(server: &MockServer, job_id: &str) {
    Mock::given(method("POST"))
        .and(path("/predictions"))
        .and(header("authorization", format!("Bearer {TEST_TOKEN}").as_str()))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(prediction(job_id, "starting", Value::Null)),
        )
        .mount(server)
        .await;
}

/// Answer status queries for `job_id` with `body`, at most `times` times if given
pub async fn mount_status(server: &MockServer, job_id: &str, body: Value, times: Option<u64>) {
    let mock = Mock::given(method("GET"))
        .and(path(format!("/predictions/{job_id}")))
        .and(header("authorization", format!("Bearer {TEST_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body));
    let mock = match times {
        Some(n) => mock.up_to_n_times(n),
        None => mock,
    };
    mock.mount(server).await;
}

/// Serve `bytes` at `file_path`
pub async fn mount_file(server: &MockServer, file_path: &str, bytes: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(file_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
        .mount(server)
        .await;
}

/// Number of status queries the server received for `job_id`
pub async fn status_query_count(server: &MockServer, job_id: &str) -> usize {
    let target = format!("/predictions/{job_id}");
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == "GET" && r.url.path() == target)
        .count()
}
