use crate::models::metric::MetricKey;
use crate::models::snapshot::MetricsSnapshot;
use serde::{Deserialize, Serialize};

/// Signed change of one metric between the two most recent snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Delta {
    /// Fewer than two snapshots exist for the directory.
    NoPriorData,
    /// One side of the comparison was not measured.
    Unavailable,
    Change(f64),
}

/// Slice of snapshots for one source directory in the order they were
/// recorded, oldest first. Capture timestamps are informational only.
#[derive(Debug, Clone, Default)]
pub struct HistorySeries {
    snapshots: Vec<MetricsSnapshot>,
}

impl HistorySeries {
    pub fn new(snapshots: Vec<MetricsSnapshot>) -> Self {
        Self { snapshots }
    }

    pub fn snapshots(&self) -> &[MetricsSnapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn latest(&self) -> Option<&MetricsSnapshot> {
        self.snapshots.last()
    }

    /// Appends a snapshot recorded after everything already in the series.
    pub fn push_latest(&mut self, snapshot: MetricsSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn delta(&self, key: MetricKey) -> Delta {
        let n = self.snapshots.len();
        if n < 2 {
            return Delta::NoPriorData;
        }
        match (self.snapshots[n - 1].value(key), self.snapshots[n - 2].value(key)) {
            (Some(current), Some(previous)) => Delta::Change(current - previous),
            _ => Delta::Unavailable,
        }
    }

    /// Last `window` values of one metric, oldest first. Gaps stay `None`.
    pub fn trend(&self, key: MetricKey, window: usize) -> Vec<Option<f64>> {
        let start = self.snapshots.len().saturating_sub(window);
        self.snapshots[start..].iter().map(|s| s.value(key)).collect()
    }
}
