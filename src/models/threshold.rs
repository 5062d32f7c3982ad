use crate::models::metric::{Direction, MetricKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSpec {
    pub good: f64,
    pub bad: f64,
    pub direction: Direction,
}

/// Qualitative classification of one metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Good,
    Warn,
    Bad,
    Unavailable,
}

impl Band {
    pub fn label(self) -> &'static str {
        match self {
            Band::Good => "✓ Good",
            Band::Warn => "~ OK",
            Band::Bad => "✗ Bad",
            Band::Unavailable => "? N/A",
        }
    }
}

impl ThresholdSpec {
    pub fn lower_is_better(good: f64, bad: f64) -> Self {
        Self { good, bad, direction: Direction::LowerIsBetter }
    }

    pub fn higher_is_better(good: f64, bad: f64) -> Self {
        Self { good, bad, direction: Direction::HigherIsBetter }
    }

    /// Bounds must be finite and `good` must sit on the healthy side of `bad`.
    pub fn validate(&self) -> Result<(), String> {
        if !self.good.is_finite() || !self.bad.is_finite() {
            return Err("threshold bounds must be finite numbers".to_string());
        }
        match self.direction {
            Direction::LowerIsBetter if self.good > self.bad => Err(format!(
                "good ({}) must not exceed bad ({}) for a lower-is-better metric",
                self.good, self.bad
            )),
            Direction::HigherIsBetter if self.good < self.bad => Err(format!(
                "good ({}) must not be below bad ({}) for a higher-is-better metric",
                self.good, self.bad
            )),
            _ => Ok(()),
        }
    }
}

/// Default bands per metric. Density is left unclassified unless configured.
pub fn default_thresholds() -> BTreeMap<MetricKey, ThresholdSpec> {
    let mut t = BTreeMap::new();
    t.insert(MetricKey::AvgComplexity, ThresholdSpec::lower_is_better(5.0, 10.0));
    t.insert(MetricKey::MaxComplexity, ThresholdSpec::lower_is_better(10.0, 20.0));
    t.insert(MetricKey::MaintainabilityIndex, ThresholdSpec::higher_is_better(85.0, 65.0));
    t.insert(MetricKey::TestCoverage, ThresholdSpec::higher_is_better(80.0, 60.0));
    t.insert(MetricKey::CodeDuplication, ThresholdSpec::lower_is_better(5.0, 15.0));
    t.insert(MetricKey::DeadCode, ThresholdSpec::lower_is_better(5.0, 15.0));
    t.insert(MetricKey::StyleViolations, ThresholdSpec::lower_is_better(10.0, 25.0));
    t.insert(MetricKey::DocCoverage, ThresholdSpec::higher_is_better(80.0, 60.0));
    t
}
