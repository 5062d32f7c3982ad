use crate::commands::workspace::{find_test_directory, ExclusionFilter};
use crate::models::config::MonitorConfig;
use crate::models::tool::{ToolKind, ToolSpec};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const VULTURE_WHITELIST: &str = ".vulture_whitelist";

/// Tools to launch this cycle plus the ones deliberately not run.
#[derive(Debug, Clone, Default)]
pub struct Toolchain {
    pub specs: Vec<ToolSpec>,
    pub skipped: BTreeSet<ToolKind>,
}

pub fn build_toolchain(config: &MonitorConfig, filter: &ExclusionFilter) -> Toolchain {
    let excludes = filter.tool_patterns();
    let mut toolchain = Toolchain::default();

    for kind in ToolKind::ALL {
        if !config.tool_enabled(kind) {
            log::debug!("{kind} disabled by configuration");
            toolchain.skipped.insert(kind);
            continue;
        }
        match tool_spec(config, kind, &excludes) {
            Some(spec) => toolchain.specs.push(spec),
            None => {
                toolchain.skipped.insert(kind);
            }
        }
    }

    toolchain
}

fn tool_spec(config: &MonitorConfig, kind: ToolKind, excludes: &[String]) -> Option<ToolSpec> {
    let overrides = config.tools.get(&kind);
    let default_timeout = match kind {
        ToolKind::Coverage => config.coverage_timeout,
        _ => config.tool_timeout,
    };
    let timeout = overrides
        .and_then(|o| o.timeout_secs)
        .map(std::time::Duration::from_secs)
        .unwrap_or(default_timeout);

    if let Some(command) = overrides.and_then(|o| o.command.as_ref()) {
        let (program, args) = command.split_first()?;
        return Some(ToolSpec {
            kind,
            program: program.clone(),
            args: args.to_vec(),
            working_dir: config.project_root.clone(),
            timeout,
        });
    }

    let source = config.source_dir.to_string_lossy().to_string();
    let (args, working_dir) = match kind {
        ToolKind::Complexity => (radon_args("cc", &source, &["-a"], excludes), config.project_root.clone()),
        ToolKind::Maintainability => (radon_args("mi", &source, &[], excludes), config.project_root.clone()),
        ToolKind::Raw => (radon_args("raw", &source, &[], excludes), config.project_root.clone()),
        ToolKind::Duplication => (pylint_args(&source, excludes), config.project_root.clone()),
        ToolKind::DeadCode => (
            vulture_args(&source, whitelist(config).as_deref(), excludes),
            config.project_root.clone(),
        ),
        ToolKind::Lint => (ruff_args(&source, excludes), config.project_root.clone()),
        ToolKind::Coverage => {
            let Some((_, test_root)) = find_test_directory(&config.source_dir) else {
                log::info!(
                    "no tests directory found near {}; skipping coverage",
                    config.source_dir.display()
                );
                return None;
            };
            (pytest_args(&config.source_dir), test_root)
        }
    };

    Some(ToolSpec {
        kind,
        program: config.python.clone(),
        args,
        working_dir,
        timeout,
    })
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

fn radon_args(subcommand: &str, source: &str, extra: &[&str], excludes: &[String]) -> Vec<String> {
    let mut args = strings(&["-m", "radon", subcommand, source, "-j"]);
    args.extend(strings(extra));
    if !excludes.is_empty() {
        args.push("--exclude".to_string());
        args.push(excludes.join(","));
    }
    args
}

fn pylint_args(source: &str, excludes: &[String]) -> Vec<String> {
    let mut args = strings(&[
        "-m",
        "pylint",
        source,
        "--disable=all",
        "--enable=duplicate-code",
        "--output-format=json",
    ]);
    if !excludes.is_empty() {
        let regexes: Vec<String> = excludes.iter().map(|p| glob_to_regex(p)).collect();
        args.push(format!("--ignore-patterns={}", regexes.join(",")));
    }
    args
}

fn vulture_args(source: &str, whitelist: Option<&Path>, excludes: &[String]) -> Vec<String> {
    let mut args = strings(&["-m", "vulture", source]);
    if let Some(path) = whitelist {
        args.push(path.to_string_lossy().to_string());
    }
    if !excludes.is_empty() {
        args.push("--exclude".to_string());
        args.push(excludes.join(","));
    }
    args
}

fn ruff_args(source: &str, excludes: &[String]) -> Vec<String> {
    let mut args = strings(&[
        "-m",
        "ruff",
        "check",
        "--output-format=json",
        "--extend-select",
        "D1",
        source,
    ]);
    if !excludes.is_empty() {
        args.push("--extend-exclude".to_string());
        args.push(excludes.join(","));
    }
    args
}

fn pytest_args(source_dir: &Path) -> Vec<String> {
    let module = source_dir
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| ".".to_string());
    vec![
        "-m".to_string(),
        "pytest".to_string(),
        "tests".to_string(),
        format!("--cov={module}"),
        "--cov-report=term".to_string(),
        "--no-header".to_string(),
        "--tb=no".to_string(),
        "-q".to_string(),
    ]
}

fn whitelist(config: &MonitorConfig) -> Option<PathBuf> {
    [config.project_root.join(VULTURE_WHITELIST), config.source_dir.join(VULTURE_WHITELIST)]
        .into_iter()
        .find(|path| path.is_file())
}

// pylint matches --ignore-patterns as regexes against base names.
fn glob_to_regex(pattern: &str) -> String {
    let mut regex = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '.' | '+' | '(' | ')' | '|' | '^' | '$' | '{' | '}' | '\\' => {
                regex.push('\\');
                regex.push(c);
            }
            _ => regex.push(c),
        }
    }
    regex.push('$');
    regex
}
