//! Test helpers shared by the integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use netwatch::{
    probe::{ProbeError, Prober},
    storage::{
        BackendStats, HealthStatus, SampleQuery, SampleRow, StorageBackend, StorageError,
        StorageResult, memory::MemoryBackend,
    },
    targets::{NewTarget, Target},
};

pub const TEST_TOKEN: &str = "test-token";

pub fn new_target(name: &str, address: &str) -> NewTarget {
    NewTarget {
        name: name.to_string(),
        address: address.to_string(),
        interval: None,
    }
}

pub fn target(id: u64, interval_seconds: u64) -> Target {
    Target {
        id,
        name: format!("target-{id}"),
        address: format!("192.0.2.{id}"),
        enabled: true,
        interval_seconds,
    }
}

pub fn sample(
    node: &str,
    target_id: u64,
    timestamp: DateTime<Utc>,
    latency: Option<f64>,
) -> SampleRow {
    SampleRow {
        node_id: node.to_string(),
        target_id,
        timestamp,
        latency,
    }
}

/// A fixed instant aligned to every tier's bucket width
pub fn aligned_now() -> DateTime<Utc> {
    // 1_700_006_400 is a multiple of 3600
    DateTime::from_timestamp(1_700_006_400, 0).unwrap() + Duration::days(1)
}

/// Prober answering with the target id as latency
pub struct EchoProber;

#[async_trait]
impl Prober for EchoProber {
    async fn probe(&self, target: &Target) -> Result<f64, ProbeError> {
        Ok(target.id as f64)
    }
}

/// Memory backend whose window rewrites fail while `fail_rewrites` is set
pub struct FlakyBackend {
    pub inner: MemoryBackend,
    pub fail_rewrites: AtomicBool,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            fail_rewrites: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    async fn list_targets(&self) -> StorageResult<Vec<Target>> {
        self.inner.list_targets().await
    }

    async fn insert_target(&self, new: &NewTarget) -> StorageResult<Target> {
        self.inner.insert_target(new).await
    }

    async fn disable_target(&self, id: u64) -> StorageResult<bool> {
        self.inner.disable_target(id).await
    }

    async fn insert_samples(&self, rows: Vec<SampleRow>) -> StorageResult<()> {
        self.inner.insert_samples(rows).await
    }

    async fn query_samples(&self, query: &SampleQuery) -> StorageResult<Vec<SampleRow>> {
        self.inner.query_samples(query).await
    }

    async fn latest_sequence(&self) -> StorageResult<i64> {
        self.inner.latest_sequence().await
    }

    async fn replace_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        through_sequence: i64,
        rows: Vec<SampleRow>,
    ) -> StorageResult<usize> {
        if self.fail_rewrites.load(Ordering::SeqCst) {
            return Err(StorageError::QueryFailed("disk full".to_string()));
        }
        self.inner
            .replace_window(start, end, through_sequence, rows)
            .await
    }

    async fn delete_before(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        self.inner.delete_before(before).await
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        self.inner.health_check().await
    }

    async fn get_stats(&self) -> StorageResult<BackendStats> {
        self.inner.get_stats().await
    }

    async fn close(&self) -> StorageResult<()> {
        self.inner.close().await
    }
}

#[cfg(feature = "api")]
pub struct TestHub {
    pub addr: SocketAddr,
    pub backend: Arc<dyn StorageBackend>,
    pub state: netwatch::api::ApiState,
}

#[cfg(feature = "api")]
impl TestHub {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Spawn a hub on a random port backed by memory storage
#[cfg(feature = "api")]
pub async fn spawn_hub(auth_token: Option<&str>, expected_agent_version: &str) -> TestHub {
    use netwatch::{
        actors::storage::StorageHandle,
        api::{ApiConfig, ApiState, spawn_api_server},
        registry::TargetRegistry,
    };

    let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let storage = StorageHandle::spawn(Arc::clone(&backend), Duration::hours(24));
    let state = ApiState::new(
        storage,
        TargetRegistry::new(Arc::clone(&backend)),
        expected_agent_version.to_string(),
    );

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        auth_token: auth_token.map(str::to_string),
        enable_cors: true,
    };

    let addr = spawn_api_server(config, state.clone()).await.unwrap();

    TestHub {
        addr,
        backend,
        state,
    }
}
