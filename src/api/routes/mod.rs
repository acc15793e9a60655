//! Route handlers grouped by resource

pub mod health;
pub mod maintenance;
pub mod nodes;
pub mod probes;
pub mod report;
pub mod servers;
pub mod stats;
