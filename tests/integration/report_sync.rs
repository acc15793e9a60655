//! Report ingestion and target-set synchronisation over HTTP

use chrono::{Duration, Utc};
use netwatch::{
    protocol::{
        AGENT_VERSION_HEADER, CONFIG_ACTION, NODE_ID_HEADER, PING_KIND, PingReport, ProbeResult,
        Report, ReportResponse, UPGRADE_ACTION,
    },
    storage::SampleQuery,
    targets::TargetSet,
};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::json;

use crate::helpers::{new_target, spawn_hub};

const AGENT_VERSION: &str = "0.3.0";

async fn post_report(
    client: &reqwest::Client,
    url: &str,
    node_id: Option<&str>,
    body: &serde_json::Value,
) -> reqwest::Response {
    let mut request = client
        .post(url)
        .header(AGENT_VERSION_HEADER, AGENT_VERSION)
        .json(body);
    if let Some(node_id) = node_id {
        request = request.header(NODE_ID_HEADER, node_id);
    }
    request.send().await.unwrap()
}

#[tokio::test]
async fn test_stale_agent_receives_current_target_set() {
    let hub = spawn_hub(None, AGENT_VERSION).await;
    for (name, address) in [("a", "10.0.0.1"), ("b", "10.0.0.2"), ("c", "10.0.0.3")] {
        hub.state.targets.create(new_target(name, address)).await.unwrap();
    }

    let client = reqwest::Client::new();
    let now = Utc::now();
    let body = json!({
        "ping": {
            "version": "1.3",
            "data": [
                {"targetId": 1, "latency": 12.5, "timestamp": now},
                {"targetId": 3, "latency": -1, "timestamp": now},
            ]
        }
    });

    let response = post_report(&client, &hub.url("/api/report"), Some("edge-1"), &body).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response: ReportResponse = response.json().await.unwrap();
    let actions = response.actions();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].name, CONFIG_ACTION);
    assert_eq!(actions[0].topic, PING_KIND);

    let set = TargetSet::from_json(&actions[0].data).unwrap();
    assert_eq!(set.version, "1.2.3");
    assert_eq!(set.ids(), vec![1, 2, 3]);

    let rows = hub
        .backend
        .query_samples(&SampleQuery::range(now - Duration::minutes(1), now + Duration::minutes(1)))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.node_id == "edge-1"));
    assert!(rows.iter().any(|r| r.target_id == 3 && r.latency.is_none()));
}

#[tokio::test]
async fn test_agent_in_sync_gets_message() {
    let hub = spawn_hub(None, AGENT_VERSION).await;
    hub.state.targets.create(new_target("a", "10.0.0.1")).await.unwrap();

    let client = reqwest::Client::new();
    let body = json!({ "ping": { "version": "1", "data": [] } });

    let response = post_report(&client, &hub.url("/api/report"), Some("edge-1"), &body).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response: ReportResponse = response.json().await.unwrap();
    assert!(response.actions().is_empty());
    assert!(matches!(response, ReportResponse::Message { .. }));

    let stats = hub.state.storage.get_stats().await.unwrap();
    assert_eq!(stats.backend.sample_rows, 0);
}

#[tokio::test]
async fn test_idle_agent_and_idle_hub_agree() {
    let hub = spawn_hub(None, AGENT_VERSION).await;

    let report = Report::new()
        .with_ping(&PingReport {
            data: vec![],
            version: String::new(),
        })
        .unwrap();

    let response: ReportResponse = reqwest::Client::new()
        .post(hub.url("/api/report"))
        .header(NODE_ID_HEADER, "edge-1")
        .header(AGENT_VERSION_HEADER, AGENT_VERSION)
        .json(&report)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(response.actions().is_empty());
}

#[tokio::test]
async fn test_outdated_agent_is_told_to_upgrade() {
    let hub = spawn_hub(None, "0.4.0").await;

    let client = reqwest::Client::new();
    let body = json!({ "ping": { "version": "", "data": [] } });

    let response: ReportResponse =
        post_report(&client, &hub.url("/api/report"), Some("edge-1"), &body)
            .await
            .json()
            .await
            .unwrap();

    let actions = response.actions();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].name, UPGRADE_ACTION);
    assert_eq!(actions[0].data, "0.4.0");
}

#[tokio::test]
async fn test_missing_node_header_is_rejected() {
    let hub = spawn_hub(None, AGENT_VERSION).await;

    let body = json!({
        "ping": {
            "version": "",
            "data": [{"targetId": 1, "latency": 3.0, "timestamp": Utc::now()}]
        }
    });
    let response = post_report(&reqwest::Client::new(), &hub.url("/api/report"), None, &body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let stats = hub.state.storage.get_stats().await.unwrap();
    assert_eq!(stats.backend.sample_rows, 0);
}

#[tokio::test]
async fn test_malformed_ping_section_is_rejected() {
    let hub = spawn_hub(None, AGENT_VERSION).await;

    let body = json!({ "ping": { "version": 7, "data": "nope" } });
    let response =
        post_report(&reqwest::Client::new(), &hub.url("/api/report"), Some("edge-1"), &body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_kinds_and_host_snapshot() {
    let hub = spawn_hub(None, AGENT_VERSION).await;

    let body = json!({
        "ping": { "version": "", "data": [] },
        "host": {
            "system": {
                "name": "Linux",
                "kernel_version": null,
                "os_version": null,
                "host_name": "edge"
            },
            "memory": {"total": 1024, "used": 512},
            "cpu": {"total": 4, "arch": "x86_64", "average_usage": 12.5}
        },
        "disk": { "free": 10 }
    });
    let response =
        post_report(&reqwest::Client::new(), &hub.url("/api/report"), Some("edge-1"), &body).await;
    assert_eq!(response.status(), StatusCode::OK);

    let node = hub.state.nodes.get("edge-1").await.unwrap();
    assert_eq!(node.agent_version.as_deref(), Some(AGENT_VERSION));
    assert_eq!(node.config_version.as_deref(), Some(""));

    let host = node.host.unwrap();
    assert_eq!(host.system.host_name.as_deref(), Some("edge"));
    assert_eq!(host.cpu.total, 4);
}

#[tokio::test]
async fn test_reports_from_many_nodes() {
    let hub = spawn_hub(None, AGENT_VERSION).await;
    hub.state.targets.create(new_target("a", "10.0.0.1")).await.unwrap();

    let client = reqwest::Client::new();
    let url = hub.url("/api/report");
    let now = Utc::now();

    let requests = (0..8).map(|i| {
        let client = client.clone();
        let url = url.clone();
        async move {
            let body = json!({
                "ping": {
                    "version": "1",
                    "data": [{"targetId": 1, "latency": i as f64, "timestamp": now}]
                }
            });
            post_report(&client, &url, Some(&format!("node-{i}")), &body)
                .await
                .status()
        }
    });

    let statuses = futures::future::join_all(requests).await;
    assert!(statuses.iter().all(|s| *s == StatusCode::OK));

    let nodes: serde_json::Value = client
        .get(hub.url("/api/nodes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(nodes["count"], 8);

    let stats = hub.state.storage.get_stats().await.unwrap();
    assert_eq!(stats.backend.sample_rows, 8);
    assert_eq!(stats.batches_ingested, 8);
}

#[tokio::test]
async fn test_report_roundtrip_through_typed_results() {
    let hub = spawn_hub(None, AGENT_VERSION).await;
    let now = Utc::now();

    let report = Report::new()
        .with_ping(&PingReport {
            data: vec![
                ProbeResult::success(1, 4.0, now - Duration::seconds(10)),
                ProbeResult::failure(1, now),
            ],
            version: String::new(),
        })
        .unwrap();

    let status = reqwest::Client::new()
        .post(hub.url("/api/report"))
        .header(NODE_ID_HEADER, "edge-1")
        .json(&report)
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, StatusCode::OK);

    let series = hub
        .state
        .storage
        .query_series("edge-1", netwatch::rollup::Period::Day)
        .await
        .unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].target_id, 1);
    assert!(series[0].points.iter().any(|p| p.latency == Some(4.0)));
}
