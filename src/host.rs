//! Minimal host snapshot sent alongside probe results
//!
//! Full host telemetry is handled elsewhere; the agent only ships a small
//! summary so the hub can show which nodes are alive and what they run on.

use serde::{Deserialize, Serialize};
use sysinfo::System;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub system: SystemInformation,
    pub memory: MemoryInformation,
    pub cpu: CpuOverview,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInformation {
    pub name: Option<String>,
    pub kernel_version: Option<String>,
    pub os_version: Option<String>,
    pub host_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryInformation {
    pub total: u64,
    pub used: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuOverview {
    pub total: usize,
    pub arch: String,
    pub average_usage: f32,
}

/// Collects [`HostSnapshot`]s from a long-lived `sysinfo::System`
///
/// CPU usage is computed from the difference between two refreshes, so the
/// collector must be kept around between reports for the value to be useful.
pub struct HostCollector {
    sys: System,
}

impl HostCollector {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_usage();
        Self { sys }
    }

    pub fn snapshot(&mut self) -> HostSnapshot {
        self.sys.refresh_memory();
        self.sys.refresh_cpu_usage();

        let cpus = self.sys.cpus();
        let average_usage = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|cpu| cpu.cpu_usage()).sum::<f32>() / cpus.len() as f32
        };

        HostSnapshot {
            system: SystemInformation {
                name: System::name(),
                kernel_version: System::kernel_version(),
                os_version: System::os_version(),
                host_name: System::host_name(),
            },
            memory: MemoryInformation {
                total: self.sys.total_memory(),
                used: self.sys.used_memory(),
            },
            cpu: CpuOverview {
                total: cpus.len(),
                arch: System::cpu_arch(),
                average_usage,
            },
        }
    }
}

impl Default for HostCollector {
    fn default() -> Self {
        Self::new()
    }
}
