// Scenario 6 from spec.md §8: auto-deregistration after the consecutive
// failure threshold. Uses the floor interval (10s, the minimum
// `HEALTH_CHECK_INTERVAL_SECONDS` accepts) and a threshold of 2 so the
// monitor only needs to run for about one interval before deregistering.

mod support;

use support::{healthy_record, FakeBackend, TestGateway};
use std::time::Duration;

#[tokio::test]
async fn auto_deregisters_after_consecutive_failures() {
    let mut record = healthy_record("m1", &FakeBackend::unreachable_url());
    record.consecutive_failures = 0;
    let id = record.registration_id.clone();

    let gateway = TestGateway::start_with_max_failures(vec![record], 2).await;
    let client = reqwest::Client::new();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(25);
    let mut deregistered = false;
    while tokio::time::Instant::now() < deadline {
        let active: serde_json::Value = client
            .get(format!("{}/admin/servers?active=true", gateway.base_url))
            .header("X-API-Key", support::ADMIN_API_KEY)
            .send()
            .await
            .expect("list active")
            .json()
            .await
            .expect("json body");
        let still_active = active.as_array().unwrap().iter().any(|r| r["registration_id"] == id);
        if !still_active {
            deregistered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    assert!(deregistered, "server was not auto-deregistered within the deadline");

    let inactive: serde_json::Value = client
        .get(format!("{}/admin/servers?active=false", gateway.base_url))
        .header("X-API-Key", support::ADMIN_API_KEY)
        .send()
        .await
        .expect("list inactive")
        .json()
        .await
        .expect("json body");
    let entry = inactive
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["registration_id"] == id)
        .expect("deregistered server present in inactive listing");
    assert!(entry["consecutive_failures"].as_u64().unwrap() >= 2);

    gateway.stop().await;
}
