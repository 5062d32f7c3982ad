use crate::models::metric::MetricKey;
use crate::models::threshold::{default_thresholds, ThresholdSpec};
use crate::models::tool::ToolKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// How the maintainability index is normalised against code volume:
/// `density = mi / (sloc / reference_lines) ^ exponent`, and `mi` itself
/// when there are no source lines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityPolicy {
    pub reference_lines: f64,
    pub exponent: f64,
}

impl Default for DensityPolicy {
    fn default() -> Self {
        Self { reference_lines: 1000.0, exponent: 1.0 }
    }
}

impl DensityPolicy {
    pub fn density(&self, maintainability_index: f64, code_lines: u64) -> f64 {
        if code_lines == 0 {
            return maintainability_index;
        }
        let scale = (code_lines as f64 / self.reference_lines).powf(self.exponent);
        maintainability_index / scale
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub max_snapshots: usize,
    pub max_age_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { max_snapshots: 500, max_age_days: 30 }
    }
}

/// Per-tool override from the `[tools.<kind>]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolOverride {
    pub enabled: Option<bool>,
    pub command: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
}

/// Already-validated configuration handed to the core.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub source_dir: PathBuf,
    pub project_root: PathBuf,
    pub interval: Duration,
    pub exclude_patterns: Vec<String>,
    pub respect_gitignore: bool,
    pub thresholds: BTreeMap<MetricKey, ThresholdSpec>,
    pub dead_code_allow_list: Vec<String>,
    pub python: String,
    pub history_path: PathBuf,
    pub retention: RetentionPolicy,
    pub density: DensityPolicy,
    pub duplication_fallback_lines: u64,
    pub tool_timeout: Duration,
    pub coverage_timeout: Duration,
    pub tools: BTreeMap<ToolKind, ToolOverride>,
    pub test_command: Option<String>,
    pub trend_window: usize,
}

impl MonitorConfig {
    /// Defaults for a source directory analysed from `project_root`.
    pub fn new(source_dir: impl Into<PathBuf>, project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            source_dir: source_dir.into(),
            history_path: project_root.join(".viberdash").join("history.db"),
            project_root,
            interval: Duration::from_secs(180),
            exclude_patterns: Vec::new(),
            respect_gitignore: true,
            thresholds: default_thresholds(),
            dead_code_allow_list: Vec::new(),
            python: "python3".to_string(),
            retention: RetentionPolicy::default(),
            density: DensityPolicy::default(),
            duplication_fallback_lines: 5,
            tool_timeout: Duration::from_secs(60),
            coverage_timeout: Duration::from_secs(120),
            tools: BTreeMap::new(),
            test_command: None,
            trend_window: 20,
        }
    }

    pub fn tool_enabled(&self, kind: ToolKind) -> bool {
        self.tools
            .get(&kind)
            .and_then(|o| o.enabled)
            .unwrap_or(true)
    }

    pub fn source_dir_label(&self) -> String {
        self.source_dir.to_string_lossy().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_is_mi_per_thousand_lines_by_default() {
        let policy = DensityPolicy::default();
        assert!((policy.density(80.0, 2000) - 40.0).abs() < 1e-9);
        assert!((policy.density(80.0, 500) - 160.0).abs() < 1e-9);
    }

    #[test]
    fn density_falls_back_to_mi_without_code() {
        assert_eq!(DensityPolicy::default().density(72.5, 0), 72.5);
    }

    #[test]
    fn density_exponent_softens_size_penalty() {
        let policy = DensityPolicy { reference_lines: 1000.0, exponent: 0.5 };
        assert!((policy.density(80.0, 4000) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn tools_are_enabled_unless_overridden() {
        let mut config = MonitorConfig::new("/tmp/src", "/tmp");
        assert!(config.tool_enabled(ToolKind::Coverage));
        config.tools.insert(
            ToolKind::Coverage,
            ToolOverride { enabled: Some(false), ..ToolOverride::default() },
        );
        assert!(!config.tool_enabled(ToolKind::Coverage));
        assert_eq!(config.history_path, PathBuf::from("/tmp/.viberdash/history.db"));
    }
}
