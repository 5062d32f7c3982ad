use crate::error::{MonitorError, Result};
use crate::models::config::{DensityPolicy, MonitorConfig, RetentionPolicy, ToolOverride};
use crate::models::metric::MetricKey;
use crate::models::threshold::ThresholdSpec;
use crate::models::tool::ToolKind;
use glob::Pattern;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "viberdash.toml";
const PYPROJECT_FILE_NAME: &str = "pyproject.toml";

const DEFAULT_INTERVAL_SECS: u64 = 180;
const MIN_INTERVAL_SECS: u64 = 5;
const MAX_INTERVAL_SECS: u64 = 86_400;

/// Settings as written in a config file. Everything is optional; gaps are
/// filled from defaults by [`resolve`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub source_dir: Option<PathBuf>,
    pub interval: Option<u64>,
    pub exclude_patterns: Vec<String>,
    pub respect_gitignore: Option<bool>,
    pub thresholds: BTreeMap<String, ThresholdBounds>,
    pub dead_code_allow_list: Vec<String>,
    pub python: Option<String>,
    pub history_path: Option<PathBuf>,
    pub history_retention: Option<u64>,
    pub history_max_age_days: Option<u64>,
    pub density: Option<DensityPolicy>,
    pub duplication_fallback_lines: Option<u64>,
    pub tools: BTreeMap<String, ToolOverride>,
    pub test_command: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ThresholdBounds {
    pub good: f64,
    pub bad: f64,
}

/// Command-line values; each one wins over the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub source_dir: Option<PathBuf>,
    pub interval: Option<u64>,
    pub config: Option<PathBuf>,
}

pub fn load_monitor_config(project_root: &Path, cli: &CliOverrides) -> Result<MonitorConfig> {
    let file = load_file_settings(project_root, cli.config.as_deref())?;
    resolve(project_root, file, cli)
}

/// Lookup order: explicit file, `viberdash.toml`, the `[tool.viberdash]`
/// table of `pyproject.toml`, defaults.
pub fn load_file_settings(project_root: &Path, explicit: Option<&Path>) -> Result<FileSettings> {
    if let Some(path) = explicit {
        return read_settings_file(path);
    }

    let own = project_root.join(CONFIG_FILE_NAME);
    if own.is_file() {
        return read_settings_file(&own);
    }

    let pyproject = project_root.join(PYPROJECT_FILE_NAME);
    if pyproject.is_file() {
        // A broken pyproject belongs to the analysed project, not to us.
        return match read_settings_file(&pyproject) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                log::warn!("could not load config from {}: {e}", pyproject.display());
                Ok(FileSettings::default())
            }
        };
    }

    Ok(FileSettings::default())
}

fn read_settings_file(path: &Path) -> Result<FileSettings> {
    let raw = fs::read_to_string(path).map_err(|e| MonitorError::io(e, path))?;
    let document: toml::Value = toml::from_str(&raw)?;
    log::debug!("loaded settings from {}", path.display());
    settings_from_document(document)
}

/// Accepts either a bare settings table or a document carrying
/// `[tool.viberdash]`.
fn settings_from_document(document: toml::Value) -> Result<FileSettings> {
    let table = match document.get("tool").and_then(|tool| tool.get("viberdash")) {
        Some(section) => section.clone(),
        None if document.get("tool").is_some() => toml::Value::Table(Default::default()),
        None => document,
    };
    Ok(table.try_into()?)
}

/// Validates file settings and applies CLI overrides. Every error here is
/// fatal at startup.
pub fn resolve(project_root: &Path, file: FileSettings, cli: &CliOverrides) -> Result<MonitorConfig> {
    let source_dir = cli
        .source_dir
        .clone()
        .or(file.source_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    let source_dir = absolutize(project_root, &source_dir);

    let mut config = MonitorConfig::new(source_dir, project_root);

    let interval = cli.interval.or(file.interval).unwrap_or(DEFAULT_INTERVAL_SECS);
    let clamped = interval.clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS);
    if clamped != interval {
        log::warn!("interval {interval}s out of range; using {clamped}s");
    }
    config.interval = Duration::from_secs(clamped);

    for pattern in file.exclude_patterns.iter().chain(&file.dead_code_allow_list) {
        Pattern::new(pattern)?;
    }
    config.exclude_patterns = file.exclude_patterns;
    config.dead_code_allow_list = file.dead_code_allow_list;
    if let Some(respect) = file.respect_gitignore {
        config.respect_gitignore = respect;
    }

    for (name, bounds) in &file.thresholds {
        let key: MetricKey = name.parse().map_err(MonitorError::Config)?;
        let spec = ThresholdSpec {
            good: bounds.good,
            bad: bounds.bad,
            direction: key.direction(),
        };
        spec.validate()
            .map_err(|e| MonitorError::Config(format!("thresholds.{name}: {e}")))?;
        config.thresholds.insert(key, spec);
    }

    if let Some(python) = file.python {
        if python.trim().is_empty() {
            return Err(MonitorError::Config("python must not be empty".to_string()));
        }
        config.python = python;
    }

    if let Some(path) = file.history_path {
        config.history_path = absolutize(project_root, &path);
    }
    config.retention = RetentionPolicy {
        max_snapshots: file
            .history_retention
            .map_or(config.retention.max_snapshots, |n| n.clamp(1, 100_000) as usize),
        max_age_days: file
            .history_max_age_days
            .map_or(config.retention.max_age_days, |d| d.clamp(1, 3_650) as u32),
    };

    if let Some(density) = file.density {
        if !(density.reference_lines.is_finite() && density.reference_lines > 0.0)
            || !density.exponent.is_finite()
        {
            return Err(MonitorError::Config(
                "density.reference_lines must be positive and density.exponent finite".to_string(),
            ));
        }
        config.density = density;
    }
    if let Some(lines) = file.duplication_fallback_lines {
        config.duplication_fallback_lines = lines;
    }

    for (name, tool) in file.tools {
        let kind = ToolKind::from_name(&name)
            .ok_or_else(|| MonitorError::Config(format!("unknown tool: {name}")))?;
        if tool.command.as_ref().is_some_and(|command| command.is_empty()) {
            return Err(MonitorError::Config(format!("tools.{name}.command must not be empty")));
        }
        if tool.timeout_secs == Some(0) {
            return Err(MonitorError::Config(format!("tools.{name}.timeout_secs must be at least 1")));
        }
        config.tools.insert(kind, tool);
    }

    config.test_command = file.test_command.filter(|c| !c.trim().is_empty());
    Ok(config)
}

fn absolutize(project_root: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    };
    joined.canonicalize().unwrap_or(joined)
}
