//! Max-per-bucket reduction shared by compaction and queries
//!
//! Both the retention compactor and the dashboard query path collapse samples
//! into fixed-width buckets and keep the *worst* latency of each bucket along
//! with the moment it was measured. Averaging would hide spikes, and a spike on
//! the dashboard must still be there after the data has been compacted.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::schema::SampleRow;

/// A retention policy: data inside `window` (and outside the previous tier's
/// window) is kept at one row per `bucket`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionTier {
    pub window_secs: i64,
    pub bucket_secs: i64,
}

impl RetentionTier {
    const fn new(window_secs: i64, bucket_secs: i64) -> Self {
        Self {
            window_secs,
            bucket_secs,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_secs)
    }

    pub fn bucket(&self) -> Duration {
        Duration::seconds(self.bucket_secs)
    }
}

const HOUR: i64 = 60 * 60;
const DAY: i64 = 24 * HOUR;

/// Retention tiers, finest to coarsest
pub const RETENTION_TIERS: [RetentionTier; 5] = [
    RetentionTier::new(DAY, 5),
    RetentionTier::new(7 * DAY, 60),
    RetentionTier::new(30 * DAY, 5 * 60),
    RetentionTier::new(90 * DAY, 15 * 60),
    RetentionTier::new(365 * DAY, HOUR),
];

/// The time range a tier compacts during a pass started at `now`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierWindow {
    pub tier: RetentionTier,
    /// Inclusive lower bound
    pub start: DateTime<Utc>,
    /// Exclusive upper bound
    pub end: DateTime<Utc>,
}

/// Compute the disjoint windows of every tier for a pass at `now`
///
/// Tier `n` covers `[now - window_n, now - window_{n-1})`, so each sample is
/// reduced by exactly one tier per pass.
pub fn tier_windows(now: DateTime<Utc>) -> Vec<TierWindow> {
    let mut previous = Duration::zero();
    RETENTION_TIERS
        .iter()
        .map(|tier| {
            let window = TierWindow {
                tier: *tier,
                start: now - tier.window(),
                end: now - previous,
            };
            previous = tier.window();
            window
        })
        .collect()
}

/// Samples strictly older than this are deleted after a pass
pub fn expiry_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    let oldest = RETENTION_TIERS[RETENTION_TIERS.len() - 1];
    now - oldest.window()
}

/// Start of the bucket `timestamp` falls into, in unix milliseconds
///
/// Buckets are aligned to the unix epoch so repeated passes agree on the
/// boundaries.
pub fn bucket_start_millis(timestamp: DateTime<Utc>, bucket: Duration) -> i64 {
    let width = bucket.num_milliseconds().max(1);
    timestamp.timestamp_millis().div_euclid(width) * width
}

/// Collapse samples to one row per `(node, target, bucket)`
///
/// The surviving row is the one with the highest latency; ties go to the
/// earliest sample. Failed probes only survive when nothing in the bucket
/// succeeded, in which case the earliest failure is kept. The result is
/// ordered by node, target and bucket.
pub fn reduce_max_per_bucket(rows: &[SampleRow], bucket: Duration) -> Vec<SampleRow> {
    let mut buckets: BTreeMap<(&str, u64, i64), &SampleRow> = BTreeMap::new();

    for row in rows {
        let key = (
            row.node_id.as_str(),
            row.target_id,
            bucket_start_millis(row.timestamp, bucket),
        );

        buckets
            .entry(key)
            .and_modify(|kept| {
                if outranks(row, kept) {
                    *kept = row;
                }
            })
            .or_insert(row);
    }

    buckets.into_values().cloned().collect()
}

fn outranks(candidate: &SampleRow, kept: &SampleRow) -> bool {
    match (candidate.latency, kept.latency) {
        (Some(c), Some(k)) => c > k || (c == k && candidate.timestamp < kept.timestamp),
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => candidate.timestamp < kept.timestamp,
    }
}

/// Dashboard period selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Day,
    Week,
    Month,
    Year,
}

impl Period {
    /// How far back the query looks
    pub fn window(&self) -> Duration {
        match self {
            Period::Day => Duration::hours(24),
            Period::Week => Duration::days(7),
            Period::Month => Duration::days(30),
            Period::Year => Duration::days(365),
        }
    }

    /// Width of each returned point
    pub fn bucket(&self) -> Duration {
        match self {
            Period::Day => Duration::minutes(5),
            Period::Week => Duration::hours(1),
            Period::Month => Duration::hours(6),
            Period::Year => Duration::hours(24),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Day => write!(f, "day"),
            Period::Week => write!(f, "week"),
            Period::Month => write!(f, "month"),
            Period::Year => write!(f, "year"),
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "year" => Ok(Period::Year),
            other => Err(format!(
                "unknown period '{}' (expected day, week, month or year)",
                other
            )),
        }
    }
}

/// One point of a latency series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    /// `None` when every probe in the bucket failed
    pub latency: Option<f64>,
}

/// Reduced latency history of one target as seen from one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySeries {
    pub node_id: String,
    pub target_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    pub points: Vec<SeriesPoint>,
}

/// Reduce rows to per-series buckets, each series sorted by time
///
/// Series are ordered by node and target. Only series that have at least one
/// row appear in the output.
pub fn build_series(rows: &[SampleRow], bucket: Duration) -> Vec<LatencySeries> {
    let mut grouped: BTreeMap<(String, u64), Vec<SeriesPoint>> = BTreeMap::new();

    for row in reduce_max_per_bucket(rows, bucket) {
        grouped
            .entry((row.node_id, row.target_id))
            .or_default()
            .push(SeriesPoint {
                timestamp: row.timestamp,
                latency: row.latency,
            });
    }

    grouped
        .into_iter()
        .map(|((node_id, target_id), mut points)| {
            points.sort_by_key(|p| p.timestamp);
            LatencySeries {
                node_id,
                target_id,
                target_name: None,
                points,
            }
        })
        .collect()
}
