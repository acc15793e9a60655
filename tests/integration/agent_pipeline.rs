//! Agent side: scheduler, buffer and reporter working together

use std::sync::Arc;
use std::time::Duration;

use netwatch::{
    actors::{
        reporter::{Reporter, ReporterConfig},
        scheduler::ProbeScheduler,
    },
    buffer::ResultBuffer,
    protocol::{Action, NODE_ID_HEADER, ReportResponse},
    targets::TargetSet,
};
use pretty_assertions::assert_eq;
use serde_json::Value;
use tokio_test::assert_ok;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{EchoProber, target};

fn scheduler() -> Arc<ProbeScheduler> {
    Arc::new(ProbeScheduler::new(
        Arc::new(EchoProber),
        ResultBuffer::new(),
        Duration::from_secs(1),
    ))
}

fn reporter(url: &str, scheduler: &Arc<ProbeScheduler>) -> Reporter {
    Reporter::new(
        ReporterConfig {
            collector_url: url.to_string(),
            node_id: "edge-1".to_string(),
            agent_version: "0.3.0".to_string(),
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(5),
            include_host: false,
        },
        Arc::clone(scheduler),
    )
    .unwrap()
}

#[tokio::test]
async fn test_reporter_applies_config_action() {
    let hub = MockServer::start().await;
    let set = TargetSet::from_targets(vec![target(1, 5), target(4, 10)]);
    let response = ReportResponse::from_actions(vec![Action::config(
        serde_json::to_string(&set).unwrap(),
    )]);

    Mock::given(method("POST"))
        .and(path("/api/report"))
        .and(header(NODE_ID_HEADER, "edge-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&response))
        .expect(1)
        .mount(&hub)
        .await;

    let scheduler = scheduler();
    let mut reporter = reporter(&hub.uri(), &scheduler);

    assert_ok!(reporter.report_once().await);
    assert_eq!(scheduler.current_version().await, "1.4");

    scheduler.reconcile().await;
    assert_eq!(scheduler.running_targets().await, vec![1, 4]);

    scheduler.shutdown();
}

#[tokio::test]
async fn test_reporter_rejects_invalid_set() {
    let hub = MockServer::start().await;
    let bad = TargetSet::from_targets(vec![target(1, 1)]);
    let response = ReportResponse::from_actions(vec![Action::config(
        serde_json::to_string(&bad).unwrap(),
    )]);

    Mock::given(method("POST"))
        .and(path("/api/report"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&response))
        .mount(&hub)
        .await;

    let scheduler = scheduler();
    scheduler
        .update_config(TargetSet::from_targets(vec![target(2, 5)]))
        .await
        .unwrap();

    let mut reporter = reporter(&hub.uri(), &scheduler);
    assert_ok!(reporter.report_once().await);

    // Previous set stays in place
    assert_eq!(scheduler.current_version().await, "2");
}

#[tokio::test]
async fn test_report_carries_buffered_results() {
    let hub = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/report"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"message": "ok"})),
        )
        .mount(&hub)
        .await;

    let scheduler = scheduler();
    scheduler
        .update_config(TargetSet::from_targets(vec![target(7, 5)]))
        .await
        .unwrap();
    scheduler.reconcile().await;

    // The first tick of a new worker fires immediately
    tokio::time::timeout(Duration::from_secs(2), async {
        while scheduler.buffer().is_empty().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let mut reporter = reporter(&hub.uri(), &scheduler);
    reporter.report_once().await.unwrap();
    assert!(scheduler.buffer().is_empty().await);

    let requests = hub.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["ping"]["version"], "7");
    assert_eq!(body["ping"]["data"][0]["targetId"], 7);
    assert_eq!(body["ping"]["data"][0]["latency"], 7.0);
    assert!(body.get("host").is_none());

    scheduler.shutdown();
}

#[tokio::test]
async fn test_failed_report_drops_drained_results() {
    let hub = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/report"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&hub)
        .await;

    let scheduler = scheduler();
    scheduler
        .buffer()
        .push(netwatch::protocol::ProbeResult::failure(1, chrono::Utc::now()))
        .await;

    let mut reporter = reporter(&hub.uri(), &scheduler);
    assert!(reporter.report_once().await.is_err());
    assert!(scheduler.buffer().is_empty().await);
}

#[tokio::test]
async fn test_stop_signal_ends_agent_loops() {
    let hub = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"message": "ok"})),
        )
        .mount(&hub)
        .await;

    let scheduler = scheduler();
    scheduler
        .update_config(TargetSet::from_targets(vec![target(1, 5), target(2, 5)]))
        .await
        .unwrap();

    let scheduler_task = tokio::spawn(Arc::clone(&scheduler).run());
    let reporter_task = tokio::spawn(reporter(&hub.uri(), &scheduler).run(scheduler.stop_signal()));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(scheduler.running_targets().await, vec![1, 2]);

    scheduler.shutdown();
    scheduler.shutdown();

    tokio::time::timeout(Duration::from_secs(5), async {
        scheduler_task.await.unwrap();
        reporter_task.await.unwrap();
    })
    .await
    .unwrap();

    assert!(scheduler.running_targets().await.is_empty());
}

#[cfg(feature = "api")]
#[tokio::test]
async fn test_agent_converges_with_real_hub() {
    use crate::helpers::{new_target, spawn_hub};

    let hub = spawn_hub(None, "0.3.0").await;
    hub.state.targets.create(new_target("a", "192.0.2.1")).await.unwrap();
    hub.state.targets.create(new_target("b", "192.0.2.2")).await.unwrap();

    let scheduler = scheduler();
    let mut reporter = reporter(&format!("http://{}", hub.addr), &scheduler);

    let first = reporter.report_once().await.unwrap();
    assert_eq!(first.actions().len(), 1);
    assert_eq!(scheduler.current_version().await, "1.2");

    scheduler.reconcile().await;
    tokio::time::timeout(Duration::from_secs(2), async {
        while scheduler.buffer().len().await < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let second = reporter.report_once().await.unwrap();
    assert!(second.actions().is_empty());

    let stats = hub.state.storage.get_stats().await.unwrap();
    assert!(stats.backend.sample_rows >= 2);

    scheduler.shutdown();
}
