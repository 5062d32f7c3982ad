use crate::models::metric::MetricKey;
use crate::models::tool::ToolKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One fully aggregated scan cycle. `None` marks a metric that was not
/// measured this cycle; it is never stored as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub captured_at_ms: i64,
    pub source_dir: String,
    pub avg_complexity: Option<f64>,
    pub max_complexity: Option<f64>,
    pub maintainability_index: Option<f64>,
    pub maintainability_density: Option<f64>,
    pub test_coverage: Option<f64>,
    pub code_duplication: Option<f64>,
    pub dead_code: Option<f64>,
    pub style_violations: Option<f64>,
    pub doc_coverage: Option<f64>,
    pub counts: ElementCounts,
    pub failed_tools: BTreeSet<ToolKind>,
    pub skipped_tools: BTreeSet<ToolKind>,
}

/// Integer side-counts shown under the metric table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementCounts {
    pub total_functions: Option<u64>,
    pub total_classes: Option<u64>,
    pub total_lines: Option<u64>,
    pub total_code_lines: Option<u64>,
    pub style_issues: Option<u64>,
    pub doc_issues: Option<u64>,
}

impl ElementCounts {
    /// Display label and value of every count, in dashboard order.
    pub fn entries(&self) -> [(&'static str, Option<u64>); 6] {
        [
            ("Functions", self.total_functions),
            ("Classes", self.total_classes),
            ("Lines", self.total_lines),
            ("Source lines", self.total_code_lines),
            ("Style issues", self.style_issues),
            ("Missing docstrings", self.doc_issues),
        ]
    }
}

impl MetricsSnapshot {
    pub fn empty(source_dir: impl Into<String>, captured_at_ms: i64) -> Self {
        Self {
            captured_at_ms,
            source_dir: source_dir.into(),
            avg_complexity: None,
            max_complexity: None,
            maintainability_index: None,
            maintainability_density: None,
            test_coverage: None,
            code_duplication: None,
            dead_code: None,
            style_violations: None,
            doc_coverage: None,
            counts: ElementCounts::default(),
            failed_tools: BTreeSet::new(),
            skipped_tools: BTreeSet::new(),
        }
    }

    pub fn value(&self, key: MetricKey) -> Option<f64> {
        match key {
            MetricKey::AvgComplexity => self.avg_complexity,
            MetricKey::MaxComplexity => self.max_complexity,
            MetricKey::MaintainabilityIndex => self.maintainability_index,
            MetricKey::MaintainabilityDensity => self.maintainability_density,
            MetricKey::TestCoverage => self.test_coverage,
            MetricKey::CodeDuplication => self.code_duplication,
            MetricKey::DeadCode => self.dead_code,
            MetricKey::StyleViolations => self.style_violations,
            MetricKey::DocCoverage => self.doc_coverage,
        }
    }

    pub(crate) fn slot_mut(&mut self, key: MetricKey) -> &mut Option<f64> {
        match key {
            MetricKey::AvgComplexity => &mut self.avg_complexity,
            MetricKey::MaxComplexity => &mut self.max_complexity,
            MetricKey::MaintainabilityIndex => &mut self.maintainability_index,
            MetricKey::MaintainabilityDensity => &mut self.maintainability_density,
            MetricKey::TestCoverage => &mut self.test_coverage,
            MetricKey::CodeDuplication => &mut self.code_duplication,
            MetricKey::DeadCode => &mut self.dead_code,
            MetricKey::StyleViolations => &mut self.style_violations,
            MetricKey::DocCoverage => &mut self.doc_coverage,
        }
    }

    pub fn captured_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(self.captured_at_ms)
    }

    /// True when the tool ran and failed, as opposed to being skipped.
    pub fn tool_failed(&self, kind: ToolKind) -> bool {
        self.failed_tools.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_has_every_metric_unavailable() {
        let snapshot = MetricsSnapshot::empty("src", 1_000);
        for key in MetricKey::ALL {
            assert_eq!(snapshot.value(key), None, "{key} should be unavailable");
        }
        assert!(snapshot.failed_tools.is_empty());
    }

    #[test]
    fn slot_mut_writes_through_to_value() {
        let mut snapshot = MetricsSnapshot::empty("src", 1_000);
        *snapshot.slot_mut(MetricKey::DeadCode) = Some(0.0);
        assert_eq!(snapshot.value(MetricKey::DeadCode), Some(0.0));
        assert_eq!(snapshot.value(MetricKey::StyleViolations), None);
    }

    #[test]
    fn json_keeps_unavailable_distinct_from_zero() {
        let mut snapshot = MetricsSnapshot::empty("src", 1_000);
        snapshot.code_duplication = Some(0.0);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["code_duplication"], serde_json::json!(0.0));
        assert!(json["test_coverage"].is_null());

        let back: MetricsSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }
}
