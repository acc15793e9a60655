//! Distributed latency monitoring
//!
//! Agents probe a shared set of network targets and push the results to a
//! hub. The hub stores them, hands out target-set updates in its report
//! responses, downsamples old history into coarser tiers and serves
//! max-latency series per node.

pub mod actors;
#[cfg(feature = "api")]
pub mod api;
pub mod buffer;
pub mod config;
pub mod host;
pub mod probe;
pub mod protocol;
pub mod registry;
pub mod retention;
pub mod rollup;
pub mod storage;
pub mod targets;
pub mod util;

/// Version of this build, reported by agents and expected by the hub
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
