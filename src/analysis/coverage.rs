use crate::analysis::ParseError;

/// Line coverage from a pytest-cov terminal report.
///
/// Scans from the end for the last `TOTAL ... NN%` row, so a report that was
/// cut short after the summary still parses and one cut short before it
/// does not.
pub fn parse_coverage(output: &str) -> Result<f64, ParseError> {
    output
        .lines()
        .rev()
        .filter(|line| line.trim_start().starts_with("TOTAL"))
        .find_map(total_percentage)
        .ok_or_else(|| ParseError::new("no TOTAL row in coverage report"))
}

// "TOTAL    454    36    92%"
fn total_percentage(line: &str) -> Option<f64> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }
    let value: f64 = parts.last()?.strip_suffix('%')?.parse().ok()?;
    (0.0..=100.0).contains(&value).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
........                                                    [100%]

---------- coverage: platform linux, python 3.12.1-final-0 -----------
Name                 Stmts   Miss  Cover
----------------------------------------
pkg/__init__.py          2      0   100%
pkg/core.py            452     36    92%
----------------------------------------
TOTAL                  454     36    92%

8 passed in 0.42s
";

    #[test]
    fn reads_total_row() {
        assert_eq!(parse_coverage(REPORT).unwrap(), 92.0);
    }

    #[test]
    fn reads_branch_coverage_layout() {
        let report = "TOTAL     454     36    120     10    91.5%\n";
        assert_eq!(parse_coverage(report).unwrap(), 91.5);
    }

    #[test]
    fn failing_tests_still_report_coverage() {
        let report = format!("{REPORT}\n2 failed, 6 passed in 0.51s\n");
        assert_eq!(parse_coverage(&report).unwrap(), 92.0);
    }

    #[test]
    fn report_cut_before_summary_is_unparseable() {
        let truncated = &REPORT[..REPORT.find("TOTAL").unwrap()];
        assert!(parse_coverage(truncated).is_err());
        assert!(parse_coverage("TOTAL 454 36 abc%").is_err());
        assert!(parse_coverage("").is_err());
    }

    #[test]
    fn parsing_is_idempotent() {
        assert_eq!(parse_coverage(REPORT).unwrap(), parse_coverage(REPORT).unwrap());
    }
}
