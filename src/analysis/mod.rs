pub mod complexity;
pub mod coverage;
pub mod dead_code;
pub mod duplication;
pub mod json;
pub mod lint;
pub mod maintainability;

use crate::commands::workspace::{PathMatcher, SourceInventory};
use crate::models::tool::ToolKind;
use glob::Pattern;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParseError(String);

impl ParseError {
    pub fn new(reason: impl Into<String>) -> Self {
        ParseError(reason.into())
    }
}

/// Typed output of one parser.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput {
    Complexity(complexity::ComplexityStats),
    Maintainability(f64),
    Raw(maintainability::RawCounts),
    Duplication(duplication::DuplicationStats),
    DeadCode(dead_code::DeadCodeStats),
    Lint(lint::LintStats),
    Coverage(f64),
}

/// What the parsers need to know about the scanned tree.
pub struct ParseContext<'a> {
    pub inventory: &'a SourceInventory,
    pub exclusions: &'a PathMatcher<'a>,
    pub allow_list: &'a [Pattern],
    pub duplication_fallback_lines: u64,
}

/// Selects the parser for a tool category. Parsers never panic on malformed
/// or truncated input; they return a [`ParseError`] instead.
pub fn parse(kind: ToolKind, output: &str, ctx: &ParseContext<'_>) -> Result<ParsedOutput, ParseError> {
    let excluded = |path: &str| ctx.exclusions.is_excluded_str(path);
    let inventory = ctx.inventory;

    match kind {
        ToolKind::Complexity => complexity::parse_complexity(output).map(ParsedOutput::Complexity),
        ToolKind::Maintainability => {
            maintainability::parse_maintainability(output).map(ParsedOutput::Maintainability)
        }
        ToolKind::Raw => maintainability::parse_raw(output).map(ParsedOutput::Raw),
        ToolKind::Duplication => duplication::parse_duplication(
            output,
            inventory.total_lines,
            ctx.duplication_fallback_lines,
            excluded,
        )
        .map(ParsedOutput::Duplication),
        ToolKind::DeadCode => dead_code::parse_dead_code(
            output,
            inventory.symbol_count(),
            ctx.allow_list,
            excluded,
        )
        .map(ParsedOutput::DeadCode),
        ToolKind::Lint => lint::parse_lint(
            output,
            inventory.total_lines,
            inventory.documentable_units(),
            excluded,
        )
        .map(ParsedOutput::Lint),
        ToolKind::Coverage => coverage::parse_coverage(output).map(ParsedOutput::Coverage),
    }
}

/// `count / total` as a percentage capped at 100; zero when there is nothing
/// to measure against.
pub fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64 * 100.0).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_handles_empty_totals_and_caps() {
        assert_eq!(percentage(3, 0), 0.0);
        assert_eq!(percentage(1, 4), 25.0);
        assert_eq!(percentage(9, 4), 100.0);
    }

    #[test]
    fn dispatch_selects_parser_by_tool_kind() {
        let inventory = SourceInventory {
            total_lines: 100,
            function_count: 8,
            class_count: 2,
            ..SourceInventory::default()
        };
        let filter = crate::commands::workspace::ExclusionFilter::default();
        let exclusions = filter.matcher();
        let ctx = ParseContext {
            inventory: &inventory,
            exclusions: &exclusions,
            allow_list: &[],
            duplication_fallback_lines: 5,
        };

        assert_eq!(
            parse(ToolKind::Coverage, "TOTAL 10 1 90%", &ctx).unwrap(),
            ParsedOutput::Coverage(90.0)
        );
        match parse(ToolKind::DeadCode, "a.py:1: unused function 'f' (60% confidence)", &ctx) {
            Ok(ParsedOutput::DeadCode(stats)) => assert!((stats.percentage - 10.0).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse(ToolKind::Maintainability, "TOTAL 10 1 90%", &ctx).is_err());
    }
}
