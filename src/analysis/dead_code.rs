use crate::analysis::{percentage, ParseError};
use glob::Pattern;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadCodeFinding {
    pub path: String,
    pub line: u64,
    pub kind: String,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeadCodeStats {
    pub findings: Vec<DeadCodeFinding>,
    pub suppressed: u64,
    pub percentage: f64,
}

/// Dead-code percentage from vulture's text report.
///
/// Vulture exits non-zero whenever it finds something, so any exit status is
/// accepted as long as the lines read as findings. Findings whose symbol
/// matches the allow-list, or whose path is excluded, do not count.
pub fn parse_dead_code<F>(
    output: &str,
    total_symbols: u64,
    allow_list: &[Pattern],
    is_excluded: F,
) -> Result<DeadCodeStats, ParseError>
where
    F: Fn(&str) -> bool,
{
    let mut findings = Vec::new();
    let mut suppressed = 0u64;
    let mut unreadable = 0usize;

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some(finding) = parse_finding(line) else {
            unreadable += 1;
            continue;
        };

        let allowed = finding
            .symbol
            .as_deref()
            .is_some_and(|name| allow_list.iter().any(|p| p.matches(name)));
        if allowed || is_excluded(&finding.path) {
            suppressed += 1;
            continue;
        }
        findings.push(finding);
    }

    if findings.is_empty() && suppressed == 0 && unreadable > 0 {
        return Err(ParseError::new("vulture output contains no findings"));
    }

    let percentage = percentage(findings.len() as u64, total_symbols.max(1));
    Ok(DeadCodeStats { findings, suppressed, percentage })
}

// "pkg/a.py:12: unused function 'bar' (60% confidence)"
fn parse_finding(line: &str) -> Option<DeadCodeFinding> {
    let mut parts = line.splitn(3, ':');
    let path = parts.next()?.trim();
    let line_no: u64 = parts.next()?.trim().parse().ok()?;
    let message = parts.next()?.trim();

    let kind = message
        .strip_prefix("unused ")
        .or_else(|| message.strip_prefix("unreachable "))
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or("code")
        .to_string();

    let symbol = message
        .split_once('\'')
        .and_then(|(_, rest)| rest.split_once('\''))
        .map(|(name, _)| name.to_string());

    Some(DeadCodeFinding {
        path: path.to_string(),
        line: line_no,
        kind,
        symbol,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
pkg/a.py:12: unused function 'helper' (60% confidence)
pkg/a.py:30: unused variable 'debug_flag' (60% confidence)
pkg/b.py:4: unused import 'os' (90% confidence)
pkg/b.py:40: unreachable code after 'return' (100% confidence)
";

    fn patterns(raw: &[&str]) -> Vec<Pattern> {
        raw.iter().map(|p| Pattern::new(p).unwrap()).collect()
    }

    #[test]
    fn counts_findings_relative_to_symbols() {
        let stats = parse_dead_code(REPORT, 40, &[], |_| false).unwrap();
        assert_eq!(stats.findings.len(), 4);
        assert!((stats.percentage - 10.0).abs() < 1e-9);
        assert_eq!(stats.findings[0].symbol.as_deref(), Some("helper"));
        assert_eq!(stats.findings[0].kind, "function");
        assert_eq!(stats.findings[3].kind, "code");
    }

    #[test]
    fn allow_list_suppresses_known_false_positives() {
        let stats = parse_dead_code(REPORT, 40, &patterns(&["debug_*", "os"]), |_| false).unwrap();
        assert_eq!(stats.findings.len(), 2);
        assert_eq!(stats.suppressed, 2);
    }

    #[test]
    fn excluded_paths_are_post_filtered() {
        let stats = parse_dead_code(REPORT, 40, &[], |p| p.ends_with("b.py")).unwrap();
        assert_eq!(stats.findings.len(), 2);
    }

    #[test]
    fn empty_output_means_no_dead_code() {
        let stats = parse_dead_code("", 0, &[], |_| false).unwrap();
        assert!(stats.findings.is_empty());
        assert_eq!(stats.percentage, 0.0);
    }

    #[test]
    fn garbage_output_is_a_parse_error() {
        assert!(parse_dead_code("usage: vulture [options] PATH", 10, &[], |_| false).is_err());
    }

    #[test]
    fn percentage_is_capped_at_hundred() {
        let stats = parse_dead_code(REPORT, 1, &[], |_| false).unwrap();
        assert_eq!(stats.percentage, 100.0);
    }

    #[test]
    fn parsing_is_idempotent() {
        let allow = patterns(&["debug_*"]);
        let first = parse_dead_code(REPORT, 40, &allow, |_| false).unwrap();
        let second = parse_dead_code(REPORT, 40, &allow, |_| false).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.suppressed, 1);
    }
}
