//! Actor-based runtime for the agent and the hub
//!
//! Each actor runs as an independent tokio task and is driven through a
//! handle that wraps its command channel.
//!
//! ## Agent
//!
//! ```text
//!   ProbeScheduler ──spawns──► ProbeWorker (one per target) ──► ResultBuffer
//!         ▲                                                         │
//!         └──── update_config ◄──── Reporter ◄────── drain ─────────┘
//! ```
//!
//! ## Hub
//!
//! - **StorageActor**: persists reported results, answers series queries and
//!   triggers background compaction
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Stop signal**: Agent tasks observe one shared `watch` channel
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod messages;
pub mod prober;
pub mod reporter;
pub mod scheduler;
pub mod storage;
