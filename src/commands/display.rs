use crate::commands::thresholds::{badness, classify};
use crate::models::config::MonitorConfig;
use crate::models::history::{Delta, HistorySeries};
use crate::models::metric::{Direction, MetricKey};
use crate::models::snapshot::MetricsSnapshot;
use crate::models::threshold::{Band, ThresholdSpec};
use crate::models::tool::ToolKind;
use colored::{ColoredString, Colorize};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::io::IsTerminal;

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub key: MetricKey,
    pub value: Option<f64>,
    /// `None` when no threshold is configured for the metric.
    pub band: Option<Band>,
    pub threshold: Option<ThresholdSpec>,
    pub delta: Delta,
    /// Oldest first, ending with the current value.
    pub trend: Vec<Option<f64>>,
}

/// An integer side-count and its change since the previous cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CountRow {
    pub label: &'static str,
    pub value: Option<u64>,
    pub delta: Delta,
}

/// One published cycle: the snapshot plus everything derived from it.
#[derive(Debug, Clone)]
pub struct DashboardFrame {
    pub cycle: u64,
    pub snapshot: MetricsSnapshot,
    pub rows: Vec<MetricRow>,
    pub counts: Vec<CountRow>,
}

impl DashboardFrame {
    pub fn row(&self, key: MetricKey) -> Option<&MetricRow> {
        self.rows.iter().find(|row| row.key == key)
    }

    pub fn count(&self, label: &str) -> Option<&CountRow> {
        self.counts.iter().find(|count| count.label == label)
    }
}

/// `history` must already end with `snapshot`.
pub fn build_frame(
    cycle: u64,
    snapshot: &MetricsSnapshot,
    history: &HistorySeries,
    config: &MonitorConfig,
) -> DashboardFrame {
    let rows = MetricKey::ALL
        .iter()
        .map(|&key| {
            let value = snapshot.value(key);
            let threshold = config.thresholds.get(&key).copied();
            MetricRow {
                key,
                value,
                band: threshold.as_ref().map(|spec| classify(value, spec)),
                threshold,
                delta: history.delta(key),
                trend: history.trend(key, config.trend_window),
            }
        })
        .collect();

    let snapshots = history.snapshots();
    let previous = snapshots
        .len()
        .checked_sub(2)
        .map(|i| snapshots[i].counts.entries());
    let counts = snapshot
        .counts
        .entries()
        .iter()
        .enumerate()
        .map(|(i, &(label, value))| CountRow {
            label,
            value,
            delta: match previous {
                None => Delta::NoPriorData,
                Some(previous) => count_delta(value, previous[i].1),
            },
        })
        .collect();

    DashboardFrame {
        cycle,
        snapshot: snapshot.clone(),
        rows,
        counts,
    }
}

fn count_delta(current: Option<u64>, previous: Option<u64>) -> Delta {
    match (current, previous) {
        (Some(current), Some(previous)) => Delta::Change(current as f64 - previous as f64),
        _ => Delta::Unavailable,
    }
}

/// Receives every published cycle. Implementations must not block for long:
/// they run on the scan loop between cycles.
pub trait DashboardSink: Send {
    fn scanning(&mut self, _cycle: u64) {}

    fn publish(&mut self, frame: &DashboardFrame);

    fn history_unavailable(&mut self, _reason: &str) {}
}

pub struct TerminalDashboard {
    clear_screen: bool,
}

impl Default for TerminalDashboard {
    fn default() -> Self {
        Self {
            clear_screen: std::io::stdout().is_terminal(),
        }
    }
}

impl TerminalDashboard {
    pub fn new(clear_screen: bool) -> Self {
        Self { clear_screen }
    }

    pub fn render(&self, frame: &DashboardFrame) -> String {
        let mut out = String::new();
        let snapshot = &frame.snapshot;
        let captured = snapshot
            .captured_at()
            .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "?".to_string());

        let _ = writeln!(
            out,
            "{}  {}  {}",
            "VIBERDASH".bold().cyan(),
            snapshot.source_dir.bold(),
            format!("cycle {} · {captured}", frame.cycle).dimmed()
        );
        let _ = writeln!(
            out,
            "{:<26} {:>10} {:>10}  {:<20} {}",
            "Metric".bold(),
            "Value".bold(),
            "Change".bold(),
            "Trend".bold(),
            "Status".bold()
        );

        for row in &frame.rows {
            let _ = writeln!(
                out,
                "{:<26} {:>10} {:>10}  {:<20} {}",
                row.key.label(),
                format_value(row.key, row.value),
                format_delta(row.key, row.delta),
                sparkline(row),
                band_label(row.band)
            );
        }

        out.push('\n');
        for row in &frame.counts {
            let _ = writeln!(
                out,
                "{:<26} {:>10} {:>10}",
                row.label.dimmed(),
                count(row.value),
                format_count_delta(row.delta)
            );
        }

        if !snapshot.failed_tools.is_empty() {
            let _ = writeln!(out, "{} {}", "Failed:".red().bold(), tool_list(&snapshot.failed_tools));
        }
        if !snapshot.skipped_tools.is_empty() {
            let _ = writeln!(out, "{} {}", "Skipped:".dimmed(), tool_list(&snapshot.skipped_tools));
        }

        out
    }
}

impl DashboardSink for TerminalDashboard {
    fn scanning(&mut self, cycle: u64) {
        println!("{}", format!("Scanning (cycle {cycle})...").dimmed());
    }

    fn publish(&mut self, frame: &DashboardFrame) {
        if self.clear_screen {
            print!("\x1B[2J\x1B[H");
        }
        print!("{}", self.render(frame));
    }

    fn history_unavailable(&mut self, reason: &str) {
        eprintln!("{} {reason}", "history unavailable:".yellow().bold());
    }
}

fn format_value(key: MetricKey, value: Option<f64>) -> String {
    match value {
        None => "n/a".to_string(),
        Some(v) if key.is_percentage() => format!("{v:.1}%"),
        Some(v) => format!("{v:.2}"),
    }
}

fn format_delta(key: MetricKey, delta: Delta) -> ColoredString {
    match delta {
        Delta::NoPriorData => "-".dimmed(),
        Delta::Unavailable => "?".dimmed(),
        Delta::Change(change) if change.abs() < 0.005 => "→ 0".dimmed(),
        Delta::Change(change) => {
            let arrow = if change > 0.0 { "↑" } else { "↓" };
            let text = format!("{arrow} {:.2}", change.abs());
            let improved = match key.direction() {
                Direction::HigherIsBetter => change > 0.0,
                Direction::LowerIsBetter => change < 0.0,
            };
            if improved {
                text.green()
            } else {
                text.red()
            }
        }
    }
}

// Counts have no better direction, so changes stay neutral.
fn format_count_delta(delta: Delta) -> ColoredString {
    match delta {
        Delta::NoPriorData => "-".dimmed(),
        Delta::Unavailable => "?".dimmed(),
        Delta::Change(change) if change == 0.0 => "→ 0".dimmed(),
        Delta::Change(change) => {
            let arrow = if change > 0.0 { "↑" } else { "↓" };
            format!("{arrow} {}", change.abs()).yellow()
        }
    }
}

/// Bar height shows how unhealthy a value is: a healthy history stays low.
fn sparkline(row: &MetricRow) -> String {
    let heights: Vec<Option<f64>> = match &row.threshold {
        Some(spec) => row.trend.iter().map(|v| badness(*v, spec)).collect(),
        None => relative_heights(&row.trend, row.key.direction()),
    };

    heights
        .iter()
        .map(|height| match height {
            Some(h) => {
                let level = (h * (SPARK_LEVELS.len() - 1) as f64).round() as usize;
                SPARK_LEVELS[level.min(SPARK_LEVELS.len() - 1)]
            }
            None => '·',
        })
        .collect()
}

// Without bounds, scale against the window's own range.
fn relative_heights(trend: &[Option<f64>], direction: Direction) -> Vec<Option<f64>> {
    let known: Vec<f64> = trend.iter().flatten().copied().filter(|v| v.is_finite()).collect();
    let min = known.iter().copied().fold(f64::INFINITY, f64::min);
    let max = known.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    trend
        .iter()
        .map(|value| {
            let v = value.filter(|v| v.is_finite())?;
            let scaled = if span > 0.0 { (v - min) / span } else { 0.0 };
            Some(match direction {
                Direction::HigherIsBetter => 1.0 - scaled,
                Direction::LowerIsBetter => scaled,
            })
        })
        .collect()
}

fn band_label(band: Option<Band>) -> ColoredString {
    match band {
        Some(Band::Good) => Band::Good.label().green(),
        Some(Band::Warn) => Band::Warn.label().yellow(),
        Some(Band::Bad) => Band::Bad.label().red(),
        Some(Band::Unavailable) => Band::Unavailable.label().dimmed(),
        None => "-".dimmed(),
    }
}

fn count(value: Option<u64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| v.to_string())
}

fn tool_list(tools: &BTreeSet<ToolKind>) -> String {
    tools.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MonitorConfig {
        MonitorConfig::new("/tmp/pkg", "/tmp")
    }

    fn frame_for(values: &[(i64, Option<f64>)]) -> DashboardFrame {
        let snapshots: Vec<MetricsSnapshot> = values
            .iter()
            .map(|(ms, coverage)| {
                let mut s = MetricsSnapshot::empty("/tmp/pkg", *ms);
                s.test_coverage = *coverage;
                s.avg_complexity = Some(3.0);
                s
            })
            .collect();
        let current = snapshots.last().cloned().unwrap();
        build_frame(7, &current, &HistorySeries::new(snapshots), &config())
    }

    #[test]
    fn frame_carries_band_delta_and_trend_per_metric() {
        let frame = frame_for(&[(1, Some(70.0)), (2, Some(75.0))]);
        let coverage = frame.row(MetricKey::TestCoverage).unwrap();
        assert_eq!(coverage.value, Some(75.0));
        assert_eq!(coverage.band, Some(Band::Warn));
        assert_eq!(coverage.delta, Delta::Change(5.0));
        assert_eq!(coverage.trend, vec![Some(70.0), Some(75.0)]);

        let density = frame.row(MetricKey::MaintainabilityDensity).unwrap();
        assert_eq!(density.band, None);
        assert_eq!(frame.row(MetricKey::DeadCode).unwrap().band, Some(Band::Unavailable));
    }

    #[test]
    fn unavailable_renders_as_na_not_zero() {
        let mut frame = frame_for(&[(1, None)]);
        frame.snapshot.failed_tools.insert(ToolKind::Coverage);
        let text = TerminalDashboard::new(false).render(&frame);

        let coverage_line = text.lines().find(|l| l.contains("Test Coverage")).unwrap();
        assert!(coverage_line.contains("n/a"));
        assert!(!coverage_line.contains("0.0%"));
        assert!(text.contains("coverage"));
        assert!(text.contains("Failed"));
    }

    #[test]
    fn healthy_history_draws_low_bars() {
        let frame = frame_for(&[(1, Some(95.0)), (2, Some(70.0)), (3, None), (4, Some(10.0))]);
        let row = frame.row(MetricKey::TestCoverage).unwrap();
        assert_eq!(sparkline(row), "▁▅·█");
    }

    #[test]
    fn unbounded_metrics_scale_to_their_own_range() {
        let heights = relative_heights(&[Some(10.0), Some(20.0), None], Direction::HigherIsBetter);
        assert_eq!(heights, vec![Some(1.0), Some(0.0), None]);
        let flat = relative_heights(&[Some(4.0), Some(4.0)], Direction::LowerIsBetter);
        assert_eq!(flat, vec![Some(0.0), Some(0.0)]);
    }

    #[test]
    fn side_counts_change_against_previous_cycle() {
        let mut previous = MetricsSnapshot::empty("/tmp/pkg", 1);
        previous.counts.total_functions = Some(10);
        previous.counts.style_issues = Some(4);
        let mut current = MetricsSnapshot::empty("/tmp/pkg", 2);
        current.counts.total_functions = Some(12);
        current.counts.total_classes = Some(3);
        current.counts.style_issues = Some(4);

        let history = HistorySeries::new(vec![previous, current.clone()]);
        let frame = build_frame(2, &current, &history, &config());

        assert_eq!(frame.count("Functions").unwrap().delta, Delta::Change(2.0));
        assert_eq!(frame.count("Classes").unwrap().delta, Delta::Unavailable);
        assert_eq!(frame.count("Style issues").unwrap().delta, Delta::Change(0.0));

        let text = TerminalDashboard::new(false).render(&frame);
        let functions_line = text.lines().find(|l| l.contains("Functions")).unwrap();
        assert!(functions_line.contains("12"));
        assert!(functions_line.contains("↑ 2"));
    }

    #[test]
    fn first_cycle_counts_have_no_prior_data() {
        let mut current = MetricsSnapshot::empty("/tmp/pkg", 1);
        current.counts.total_lines = Some(120);
        let frame = build_frame(1, &current, &HistorySeries::new(vec![current.clone()]), &config());

        let lines = frame.count("Lines").unwrap();
        assert_eq!(lines.value, Some(120));
        assert_eq!(lines.delta, Delta::NoPriorData);
    }

    #[test]
    fn value_formatting_follows_metric_kind() {
        assert_eq!(format_value(MetricKey::TestCoverage, Some(92.345)), "92.3%");
        assert_eq!(format_value(MetricKey::AvgComplexity, Some(3.0)), "3.00");
        assert_eq!(format_value(MetricKey::DeadCode, None), "n/a");
    }
}
