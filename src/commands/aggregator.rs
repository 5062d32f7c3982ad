use crate::analysis::{parse, ParseContext, ParsedOutput};
use crate::commands::runner::run_tool;
use crate::commands::toolchain::build_toolchain;
use crate::commands::workspace::{scan_inventory, ExclusionFilter};
use crate::error::Result;
use crate::models::config::MonitorConfig;
use crate::models::snapshot::MetricsSnapshot;
use crate::models::tool::{ToolInvocation, ToolKind, ToolStatus};
use glob::Pattern;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Outcome of one cycle. The invocations are kept for diagnostics only and
/// are dropped with the report.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub snapshot: MetricsSnapshot,
    pub invocations: Vec<ToolInvocation>,
    pub elapsed: Duration,
}

/// Runs every enabled tool concurrently and waits for all of them (or their
/// timeouts) before building the snapshot. Tool failures are folded into the
/// snapshot; an `Err` here means the cycle itself could not be set up.
pub async fn run_cycle(config: Arc<MonitorConfig>) -> Result<CycleReport> {
    let start = Instant::now();
    let filter = Arc::new(ExclusionFilter::from_config(&config)?);
    let toolchain = build_toolchain(&config, &filter);

    let mut tools = JoinSet::new();
    for spec in toolchain.specs {
        log::debug!("running {}: {}", spec.kind, spec.display_command());
        tools.spawn(async move { run_tool(&spec).await });
    }

    let inventory_filter = Arc::clone(&filter);
    let inventory = tokio::task::spawn_blocking(move || scan_inventory(&inventory_filter));

    let mut invocations = Vec::new();
    while let Some(joined) = tools.join_next().await {
        invocations.push(joined?);
    }
    let inventory = inventory.await?;
    invocations.sort_by_key(|invocation| invocation.kind);

    let allow_list = compile_allow_list(&config.dead_code_allow_list);
    let snapshot = {
        let matcher = filter.matcher();
        let ctx = ParseContext {
            inventory: &inventory,
            exclusions: &matcher,
            allow_list: &allow_list,
            duplication_fallback_lines: config.duplication_fallback_lines,
        };
        assemble(&config, &toolchain.skipped, &mut invocations, &ctx)
    };

    let elapsed = start.elapsed();
    log::info!(
        "cycle finished in {}ms: {} tools ran, {} failed, {} skipped",
        elapsed.as_millis(),
        invocations.len(),
        snapshot.failed_tools.len(),
        snapshot.skipped_tools.len()
    );

    Ok(CycleReport {
        snapshot,
        invocations,
        elapsed,
    })
}

fn compile_allow_list(entries: &[String]) -> Vec<Pattern> {
    entries
        .iter()
        .filter_map(|entry| match Pattern::new(entry) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                log::warn!("ignoring allow-list entry {entry:?}: {e}");
                None
            }
        })
        .collect()
}

fn assemble(
    config: &MonitorConfig,
    skipped: &BTreeSet<ToolKind>,
    invocations: &mut [ToolInvocation],
    ctx: &ParseContext<'_>,
) -> MetricsSnapshot {
    let captured_at_ms = chrono::Utc::now().timestamp_millis();
    let mut snapshot = MetricsSnapshot::empty(config.source_dir_label(), captured_at_ms);
    snapshot.skipped_tools = skipped.clone();
    snapshot.counts.total_classes = Some(ctx.inventory.class_count);

    for invocation in invocations.iter_mut() {
        match interpret(invocation, ctx) {
            Some(parsed) => apply(&mut snapshot, parsed),
            None => {
                snapshot.failed_tools.insert(invocation.kind);
            }
        }
    }

    if let (Some(mi), Some(code_lines)) = (
        snapshot.maintainability_index,
        snapshot.counts.total_code_lines,
    ) {
        snapshot.maintainability_density = Some(config.density.density(mi, code_lines));
    }

    snapshot
}

/// Parses one invocation's output, downgrading its status to `ParseError`
/// when the output cannot be read.
fn interpret(invocation: &mut ToolInvocation, ctx: &ParseContext<'_>) -> Option<ParsedOutput> {
    let kind = invocation.kind;
    if !invocation.status.has_parseable_output() {
        log::warn!(
            "{kind} unavailable ({:?}): {}",
            invocation.status,
            invocation.stderr_excerpt()
        );
        return None;
    }

    if invocation.status == ToolStatus::NonZeroExit && invocation.stdout.trim().is_empty() {
        log::warn!(
            "{kind} exited with {:?} and no output: {}",
            invocation.exit_code,
            invocation.stderr_excerpt()
        );
        invocation.status = ToolStatus::ParseError;
        return None;
    }

    match parse(kind, &invocation.stdout, ctx) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            log::warn!("could not parse {kind} output: {e}");
            log::debug!("raw {kind} output:\n{}", invocation.stdout);
            invocation.status = ToolStatus::ParseError;
            None
        }
    }
}

fn apply(snapshot: &mut MetricsSnapshot, parsed: ParsedOutput) {
    match parsed {
        ParsedOutput::Complexity(stats) => {
            snapshot.avg_complexity = Some(stats.average);
            snapshot.max_complexity = Some(stats.max);
            snapshot.counts.total_functions = Some(stats.total_functions);
        }
        ParsedOutput::Maintainability(mi) => snapshot.maintainability_index = Some(mi),
        ParsedOutput::Raw(raw) => {
            snapshot.counts.total_lines = Some(raw.total_lines);
            snapshot.counts.total_code_lines = Some(raw.code_lines);
        }
        ParsedOutput::Duplication(stats) => snapshot.code_duplication = Some(stats.percentage),
        ParsedOutput::DeadCode(stats) => snapshot.dead_code = Some(stats.percentage),
        ParsedOutput::Lint(stats) => {
            snapshot.style_violations = Some(stats.style_percentage);
            snapshot.doc_coverage = Some(stats.doc_coverage);
            snapshot.counts.style_issues = Some(stats.style_issues);
            snapshot.counts.doc_issues = Some(stats.doc_issues);
        }
        ParsedOutput::Coverage(coverage) => snapshot.test_coverage = Some(coverage),
    }
}
