//! Agent-side accumulator for probe results
//!
//! Probe workers push into the buffer concurrently; the reporter drains it
//! once per report. A drained result is never re-sent, even if the report
//! that carried it fails.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::protocol::ProbeResult;

#[derive(Debug, Clone, Default)]
pub struct ResultBuffer {
    inner: Arc<Mutex<Vec<ProbeResult>>>,
}

impl ResultBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, result: ProbeResult) {
        self.inner.lock().await.push(result);
    }

    /// Take everything buffered so far, leaving the buffer empty
    pub async fn drain(&self) -> Vec<ProbeResult> {
        std::mem::take(&mut *self.inner.lock().await)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
