use crate::analysis::{json::last_json_document, ParseError};
use serde_json::Value;

/// Line counts summed over every file of a `radon raw -j` report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCounts {
    pub total_lines: u64,
    pub code_lines: u64,
}

/// Mean of the per-file maintainability index from `radon mi -j`.
pub fn parse_maintainability(output: &str) -> Result<f64, ParseError> {
    let data = last_json_document(output)
        .ok_or_else(|| ParseError::new("no maintainability report in output"))?;
    let files = data
        .as_object()
        .ok_or_else(|| ParseError::new("maintainability report is not a file map"))?;

    let values: Vec<f64> = files
        .values()
        .filter_map(|file| file.get("mi").and_then(Value::as_f64))
        .collect();

    if values.is_empty() {
        return Err(ParseError::new("maintainability report has no mi entries"));
    }

    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn parse_raw(output: &str) -> Result<RawCounts, ParseError> {
    let data = last_json_document(output)
        .ok_or_else(|| ParseError::new("no raw metrics report in output"))?;
    let files = data
        .as_object()
        .ok_or_else(|| ParseError::new("raw metrics report is not a file map"))?;

    let mut counts = RawCounts { total_lines: 0, code_lines: 0 };
    for file in files.values().filter(|f| f.is_object()) {
        counts.total_lines += file.get("loc").and_then(Value::as_u64).unwrap_or(0);
        counts.code_lines += file.get("sloc").and_then(Value::as_u64).unwrap_or(0);
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_mi_across_files() {
        let report = r#"{"a.py": {"mi": 80.0, "rank": "A"}, "b.py": {"mi": 60.0, "rank": "A"}}"#;
        assert!((parse_maintainability(report).unwrap() - 70.0).abs() < 1e-9);
    }

    #[test]
    fn report_without_mi_is_unparseable() {
        assert!(parse_maintainability(r#"{"a.py": {"error": "boom"}}"#).is_err());
        assert!(parse_maintainability("No module named radon").is_err());
    }

    #[test]
    fn sums_raw_line_counts() {
        let report = r#"{"a.py": {"loc": 120, "sloc": 90}, "b.py": {"loc": 30, "sloc": 10}, "c.py": {"error": "x"}}"#;
        assert_eq!(
            parse_raw(report).unwrap(),
            RawCounts { total_lines: 150, code_lines: 100 }
        );
    }

    #[test]
    fn parsing_is_idempotent() {
        let mi = r#"{"a.py": {"mi": 81.5}, "b.py": {"mi": 64.0}}"#;
        assert_eq!(parse_maintainability(mi).unwrap(), parse_maintainability(mi).unwrap());

        let raw = r#"{"a.py": {"loc": 12, "sloc": 9}}"#;
        assert_eq!(parse_raw(raw).unwrap(), parse_raw(raw).unwrap());
    }
}
