use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The metrics carried by every snapshot, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    AvgComplexity,
    MaxComplexity,
    MaintainabilityIndex,
    MaintainabilityDensity,
    TestCoverage,
    CodeDuplication,
    DeadCode,
    StyleViolations,
    DocCoverage,
}

/// Whether a larger value means healthier code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

impl MetricKey {
    pub const ALL: [MetricKey; 9] = [
        MetricKey::AvgComplexity,
        MetricKey::MaxComplexity,
        MetricKey::MaintainabilityIndex,
        MetricKey::MaintainabilityDensity,
        MetricKey::TestCoverage,
        MetricKey::CodeDuplication,
        MetricKey::DeadCode,
        MetricKey::StyleViolations,
        MetricKey::DocCoverage,
    ];

    /// Stable identifier used in configuration and in the history schema.
    pub fn name(self) -> &'static str {
        match self {
            MetricKey::AvgComplexity => "avg_complexity",
            MetricKey::MaxComplexity => "max_complexity",
            MetricKey::MaintainabilityIndex => "maintainability_index",
            MetricKey::MaintainabilityDensity => "maintainability_density",
            MetricKey::TestCoverage => "test_coverage",
            MetricKey::CodeDuplication => "code_duplication",
            MetricKey::DeadCode => "dead_code",
            MetricKey::StyleViolations => "style_violations",
            MetricKey::DocCoverage => "doc_coverage",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MetricKey::AvgComplexity => "Cyclomatic Complexity",
            MetricKey::MaxComplexity => "Max Complexity",
            MetricKey::MaintainabilityIndex => "Maintainability Index",
            MetricKey::MaintainabilityDensity => "Maintainability Density",
            MetricKey::TestCoverage => "Test Coverage",
            MetricKey::CodeDuplication => "Code Duplication",
            MetricKey::DeadCode => "Dead Code",
            MetricKey::StyleViolations => "Style Violations",
            MetricKey::DocCoverage => "Documentation Coverage",
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            MetricKey::MaintainabilityIndex
            | MetricKey::MaintainabilityDensity
            | MetricKey::TestCoverage
            | MetricKey::DocCoverage => Direction::HigherIsBetter,
            MetricKey::AvgComplexity
            | MetricKey::MaxComplexity
            | MetricKey::CodeDuplication
            | MetricKey::DeadCode
            | MetricKey::StyleViolations => Direction::LowerIsBetter,
        }
    }

    /// Percentage metrics render with a `%` suffix.
    pub fn is_percentage(self) -> bool {
        matches!(
            self,
            MetricKey::TestCoverage
                | MetricKey::CodeDuplication
                | MetricKey::DeadCode
                | MetricKey::StyleViolations
                | MetricKey::DocCoverage
        )
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetricKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "cyclomatic_complexity" is the historical key for the average.
        if s == "cyclomatic_complexity" {
            return Ok(MetricKey::AvgComplexity);
        }
        MetricKey::ALL
            .iter()
            .copied()
            .find(|key| key.name() == s)
            .ok_or_else(|| format!("unknown metric: {s}"))
    }
}
