//! Persistence for targets and latency samples
//!
//! The hub talks to storage through the `StorageBackend` trait so the SQLite
//! implementation can be swapped for the in-memory one in tests or when no
//! database path is configured.
//!
//! ## Backends
//!
//! - **SQLite** (default): WAL-mode database file, schema managed by sqlx migrations
//! - **In-Memory**: No persistence, everything is lost on restart

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{BackendStats, HealthStatus, SampleQuery, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use schema::SampleRow;
