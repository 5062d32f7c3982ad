use crate::analysis::{json::last_json_document, percentage, ParseError};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct LintStats {
    pub style_issues: u64,
    pub doc_issues: u64,
    pub style_percentage: f64,
    pub doc_coverage: f64,
}

/// Style and documentation metrics from one `ruff check --output-format=json`
/// run that includes the `D1` (missing docstring) rules.
///
/// `D1xx` violations count against documentation coverage, everything else
/// against style. `documentable_units` is modules plus function and class
/// declarations; with none, coverage is reported as complete.
pub fn parse_lint<F>(
    output: &str,
    total_lines: u64,
    documentable_units: u64,
    is_excluded: F,
) -> Result<LintStats, ParseError>
where
    F: Fn(&str) -> bool,
{
    let data = last_json_document(output)
        .ok_or_else(|| ParseError::new("no ruff violation list in output"))?;
    let violations = data
        .as_array()
        .ok_or_else(|| ParseError::new("ruff output is not a violation list"))?;

    let mut style_issues = 0u64;
    let mut doc_issues = 0u64;

    for violation in violations {
        if violation
            .get("filename")
            .and_then(Value::as_str)
            .is_some_and(&is_excluded)
        {
            continue;
        }
        let code = violation.get("code").and_then(Value::as_str).unwrap_or("");
        if is_missing_docstring(code) {
            doc_issues += 1;
        } else {
            style_issues += 1;
        }
    }

    let doc_coverage = if documentable_units == 0 {
        100.0
    } else {
        (100.0 - doc_issues as f64 / documentable_units as f64 * 100.0).max(0.0)
    };

    Ok(LintStats {
        style_issues,
        doc_issues,
        style_percentage: percentage(style_issues, total_lines),
        doc_coverage,
    })
}

fn is_missing_docstring(code: &str) -> bool {
    code.strip_prefix("D1")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}
