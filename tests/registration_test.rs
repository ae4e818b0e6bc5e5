// Scenarios 1 and 2 from spec.md §8: registration happy path and the SSRF
// block. The fake backend stands in for `https://example.com` since the
// scenario only cares that C1/C8 accept a reachable public-shaped URL and
// persist a healthy record.

mod support;

use support::{FakeBackend, TestGateway, ADMIN_API_KEY};

#[tokio::test]
async fn registration_happy_path() {
    let backend = FakeBackend::start_healthy().await;
    let gateway = TestGateway::start(vec![]).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/admin/register", gateway.base_url))
        .header("X-API-Key", ADMIN_API_KEY)
        .json(&serde_json::json!({"model_name": "m1", "endpoint_url": backend.url()}))
        .send()
        .await
        .expect("register request");

    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.expect("json body");
    assert_eq!(body["status"], "registered");
    assert_eq!(body["health_status"], "healthy");
    let id = body["registration_id"].as_str().expect("registration_id");
    assert!(
        regex_match_srv_id(id),
        "registration_id '{id}' does not match srv_<16 hex>"
    );

    gateway.stop().await;
    backend.close().await;
}

#[tokio::test]
async fn ssrf_block_rejects_private_endpoint() {
    let gateway = TestGateway::start(vec![]).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/admin/register", gateway.base_url))
        .header("X-API-Key", ADMIN_API_KEY)
        .json(&serde_json::json!({"model_name": "m1", "endpoint_url": "http://10.0.0.5:8000"}))
        .send()
        .await
        .expect("register request");

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.expect("json body");
    assert_eq!(body["error"]["type"], "InvalidURL");

    let servers = client
        .get(format!("{}/admin/servers", gateway.base_url))
        .header("X-API-Key", ADMIN_API_KEY)
        .send()
        .await
        .expect("list request")
        .json::<serde_json::Value>()
        .await
        .expect("json body");
    assert_eq!(servers.as_array().expect("array").len(), 0);

    gateway.stop().await;
}

fn regex_match_srv_id(id: &str) -> bool {
    let Some(hex) = id.strip_prefix("srv_") else { return false };
    hex.len() == 16 && hex.chars().all(|c| c.is_ascii_hexdigit())
}
