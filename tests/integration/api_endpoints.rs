//! Admin and query endpoints

use chrono::{Duration, Utc};
use netwatch::{protocol::ProbeResult, targets::Target};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::helpers::{TEST_TOKEN, spawn_hub};

#[tokio::test]
async fn test_health_endpoint() {
    let hub = spawn_hub(Some(TEST_TOKEN), "0.3.0").await;

    let body: Value = reqwest::get(hub.url("/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_admin_routes_require_token() {
    let hub = spawn_hub(Some(TEST_TOKEN), "0.3.0").await;
    let client = reqwest::Client::new();
    let payload = json!({"name": "dns", "address": "1.1.1.1"});

    let missing = client
        .post(hub.url("/api/probes"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = client
        .post(hub.url("/api/probes"))
        .bearer_auth("nope")
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

    let compact = client
        .post(hub.url("/api/maintenance/compact"))
        .send()
        .await
        .unwrap();
    assert_eq!(compact.status(), StatusCode::UNAUTHORIZED);

    // Listing and reporting stay open
    let list = client.get(hub.url("/api/probes")).send().await.unwrap();
    assert_eq!(list.status(), StatusCode::OK);

    assert!(hub.state.targets.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_probe_lifecycle() {
    let hub = spawn_hub(Some(TEST_TOKEN), "0.3.0").await;
    let client = reqwest::Client::new();

    let created = client
        .post(hub.url("/api/probes"))
        .bearer_auth(TEST_TOKEN)
        .json(&json!({"name": "dns", "address": "1.1.1.1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let dns: Target = created.json().await.unwrap();
    assert_eq!(dns.id, 1);
    assert_eq!(dns.interval_seconds, 5);
    assert!(dns.enabled);

    let web: Target = client
        .post(hub.url("/api/probes"))
        .bearer_auth(TEST_TOKEN)
        .json(&json!({"name": "web", "address": "example.com:443", "interval": 30}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(web.id, 2);
    assert_eq!(web.interval_seconds, 30);

    let listed: Value = client
        .get(hub.url("/api/probes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["version"], "1.2");
    assert_eq!(listed["count"], 2);

    let deleted = client
        .delete(hub.url("/api/probes/1"))
        .bearer_auth(TEST_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let listed: Value = client
        .get(hub.url("/api/probes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["version"], "2");

    // Disabled targets keep their row
    assert_eq!(hub.state.targets.all().await.unwrap().len(), 2);

    // A new target never reuses a disabled id
    let again: Target = client
        .post(hub.url("/api/probes"))
        .bearer_auth(TEST_TOKEN)
        .json(&json!({"name": "dns", "address": "1.0.0.1"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again.id, 3);
}

#[tokio::test]
async fn test_probe_validation_errors() {
    let hub = spawn_hub(None, "0.3.0").await;
    let client = reqwest::Client::new();
    let url = hub.url("/api/probes");

    let first = client
        .post(&url)
        .json(&json!({"name": "dns", "address": "1.1.1.1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let cases = [
        (json!({"name": "dns", "address": "8.8.8.8"}), StatusCode::CONFLICT),
        (json!({"name": "", "address": "8.8.8.8"}), StatusCode::BAD_REQUEST),
        (json!({"name": "other", "address": " "}), StatusCode::BAD_REQUEST),
        (
            json!({"name": "fast", "address": "8.8.8.8", "interval": 2}),
            StatusCode::BAD_REQUEST,
        ),
    ];

    for (payload, expected) in cases {
        let response = client.post(&url).json(&payload).send().await.unwrap();
        assert_eq!(response.status(), expected, "payload {payload}");
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].is_string());
    }

    assert_eq!(hub.state.targets.all().await.unwrap().len(), 1);

    let unknown = client
        .delete(hub.url("/api/probes/42"))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_server_series_endpoint() {
    let hub = spawn_hub(None, "0.3.0").await;
    hub.state
        .targets
        .create(crate::helpers::new_target("gateway", "10.0.0.1"))
        .await
        .unwrap();

    let now = Utc::now();
    hub.state
        .storage
        .insert_results(
            "edge-1",
            vec![
                ProbeResult::success(1, 12.0, now - Duration::hours(2)),
                ProbeResult::success(1, 30.0, now - Duration::hours(1)),
            ],
        )
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let body: Value = client
        .get(hub.url("/api/servers/edge-1?period=WEEK"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["nodeId"], "edge-1");
    assert_eq!(body["period"], "week");
    let series = body["series"].as_array().unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0]["targetName"], "gateway");
    assert_eq!(series[0]["points"].as_array().unwrap().len(), 2);

    let empty: Value = client
        .get(hub.url("/api/servers/unknown"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(empty["period"], "day");
    assert!(empty["series"].as_array().unwrap().is_empty());

    let invalid = client
        .get(hub.url("/api/servers/edge-1?period=decade"))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_manual_compaction_and_stats() {
    let hub = spawn_hub(Some(TEST_TOKEN), "0.3.0").await;
    let client = reqwest::Client::new();

    let compact = client
        .post(hub.url("/api/maintenance/compact"))
        .bearer_auth(TEST_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(compact.status(), StatusCode::OK);
    let body: Value = compact.json().await.unwrap();
    assert_eq!(body["status"], "completed");

    let stats: Value = client
        .get(hub.url("/api/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["storage"]["compaction"]["passes"], 1);
    assert!(stats["storage"]["compaction"]["lastCompaction"].is_string());
    assert_eq!(stats["enabledTargets"], 0);
    assert_eq!(stats["targetSetVersion"], "");
}

#[tokio::test]
async fn test_unknown_node_is_not_found() {
    let hub = spawn_hub(None, "0.3.0").await;

    let response = reqwest::get(hub.url("/api/nodes/ghost")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
