use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Closed set of tool categories. Each one selects exactly one parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Complexity,
    Maintainability,
    Raw,
    Duplication,
    DeadCode,
    Lint,
    Coverage,
}

impl ToolKind {
    pub const ALL: [ToolKind; 7] = [
        ToolKind::Complexity,
        ToolKind::Maintainability,
        ToolKind::Raw,
        ToolKind::Duplication,
        ToolKind::DeadCode,
        ToolKind::Lint,
        ToolKind::Coverage,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Complexity => "complexity",
            ToolKind::Maintainability => "maintainability",
            ToolKind::Raw => "raw",
            ToolKind::Duplication => "duplication",
            ToolKind::DeadCode => "dead_code",
            ToolKind::Lint => "lint",
            ToolKind::Coverage => "coverage",
        }
    }

    pub fn from_name(name: &str) -> Option<ToolKind> {
        ToolKind::ALL.iter().copied().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One external command to run for a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub kind: ToolKind,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

impl ToolSpec {
    pub fn display_command(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How a tool invocation ended. Parse failures are recorded by the aggregator
/// once the matching parser has looked at the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    NotFound,
    NonZeroExit,
    Timeout,
    ParseError,
}

impl ToolStatus {
    /// Whether the captured output is worth handing to a parser.
    pub fn has_parseable_output(self) -> bool {
        matches!(self, ToolStatus::Success | ToolStatus::NonZeroExit)
    }
}

/// Transient result of one tool run. Never persisted.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub kind: ToolKind,
    pub command: String,
    pub status: ToolStatus,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ToolInvocation {
    /// Short stderr excerpt for log lines.
    pub fn stderr_excerpt(&self) -> String {
        let trimmed = self.stderr.trim();
        match trimmed.char_indices().nth(200) {
            Some((idx, _)) => format!("{}...", &trimmed[..idx]),
            None => trimmed.to_string(),
        }
    }
}
