//! Probe targets and the versioned target set
//!
//! The hub owns the authoritative list of targets. Agents only ever see the
//! *enabled* subset, wrapped in a [`TargetSet`] whose `version` is derived from
//! the member ids. The version is a cheap drift detector: it changes whenever a
//! target is added or disabled, but not when an existing target is edited.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Timeout applied to a single probe attempt, in seconds
pub const PROBE_TIMEOUT_SECS: u64 = 2;

/// Interval assigned to targets created without an explicit one
pub const DEFAULT_INTERVAL_SECS: u64 = 5;

/// A monitored network endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: u64,
    pub name: String,
    pub address: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

/// Request payload for creating a target
#[derive(Debug, Clone, Deserialize)]
pub struct NewTarget {
    pub name: String,
    pub address: String,
    /// Probe interval in seconds (default: 5)
    #[serde(default)]
    pub interval: Option<u64>,
}

impl NewTarget {
    pub fn interval_seconds(&self) -> u64 {
        self.interval.unwrap_or(DEFAULT_INTERVAL_SECS)
    }
}

/// The enabled targets plus their derived version
///
/// Agents start out with [`TargetSet::default`], whose version is the empty
/// string. A hub without enabled targets computes the same version, so an idle
/// agent talking to an idle hub never receives a directive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSet {
    pub version: String,
    #[serde(default)]
    pub targets: Vec<Target>,
}

impl TargetSet {
    /// Build a set from arbitrary targets, keeping only enabled ones
    ///
    /// Targets are sorted by id so that two callers holding the same members
    /// in a different order end up with identical sets.
    pub fn from_targets(targets: impl IntoIterator<Item = Target>) -> Self {
        let mut targets: Vec<Target> = targets.into_iter().filter(|t| t.enabled).collect();
        targets.sort_by_key(|t| t.id);
        let version = version_of(targets.iter().map(|t| t.id));
        Self { version, targets }
    }

    /// Parse a set received from the hub and check it is usable
    pub fn from_json(raw: &str) -> Result<Self, TargetError> {
        let set: TargetSet =
            serde_json::from_str(raw).map_err(|e| TargetError::Malformed(e.to_string()))?;
        set.validate()?;
        Ok(set)
    }

    /// Ids of the member targets, ascending
    pub fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.targets.iter().map(|t| t.id).collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Check the set can be scheduled
    ///
    /// Every interval must exceed the probe timeout so that one probe always
    /// completes before the next tick of the same target.
    pub fn validate(&self) -> Result<(), TargetError> {
        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.id) {
                return Err(TargetError::DuplicateId(target.id));
            }
            validate_interval(target.interval_seconds)?;
        }
        Ok(())
    }
}

/// Derive the version string for a set of enabled ids
///
/// The ids are sorted ascending and joined with `.`, so `{3, 1, 2}` yields
/// `"1.2.3"` and the empty set yields `""`.
pub fn version_of(ids: impl IntoIterator<Item = u64>) -> String {
    let mut ids: Vec<u64> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Validate a creation request against the currently enabled targets
pub fn validate_new_target(enabled: &[Target], new: &NewTarget) -> Result<(), TargetError> {
    if new.name.trim().is_empty() {
        return Err(TargetError::EmptyField("name"));
    }
    if new.address.trim().is_empty() {
        return Err(TargetError::EmptyField("address"));
    }
    validate_interval(new.interval_seconds())?;

    if enabled.iter().any(|t| t.name == new.name) {
        return Err(TargetError::DuplicateName(new.name.clone()));
    }

    Ok(())
}

fn validate_interval(interval_seconds: u64) -> Result<(), TargetError> {
    if interval_seconds <= PROBE_TIMEOUT_SECS {
        return Err(TargetError::IntervalTooShort(interval_seconds));
    }
    Ok(())
}

/// Errors raised when a target or target set is rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    /// The payload could not be decoded
    Malformed(String),

    /// A required field was empty
    EmptyField(&'static str),

    /// Another enabled target already uses this name
    DuplicateName(String),

    /// The same id appears twice in a set
    DuplicateId(u64),

    /// Interval does not leave room for the probe timeout
    IntervalTooShort(u64),
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetError::Malformed(msg) => write!(f, "malformed target set: {}", msg),
            TargetError::EmptyField(field) => write!(f, "field '{}' must not be empty", field),
            TargetError::DuplicateName(name) => {
                write!(f, "an enabled target named '{}' already exists", name)
            }
            TargetError::DuplicateId(id) => write!(f, "target id {} appears more than once", id),
            TargetError::IntervalTooShort(secs) => write!(
                f,
                "interval of {}s must be longer than the {}s probe timeout",
                secs, PROBE_TIMEOUT_SECS
            ),
        }
    }
}

impl std::error::Error for TargetError {}
