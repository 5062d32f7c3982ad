use crate::analysis::{json::last_json_document, ParseError};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ComplexityStats {
    pub average: f64,
    pub max: f64,
    pub total_functions: u64,
}

/// Mean and maximum cyclomatic complexity from `radon cc -j` output.
///
/// The report maps each file to its list of blocks. Files radon failed to
/// read map to an `{"error": ...}` object instead and are skipped. A tree
/// with no blocks at all is a valid measurement of zero functions.
pub fn parse_complexity(output: &str) -> Result<ComplexityStats, ParseError> {
    let data = last_json_document(output)
        .ok_or_else(|| ParseError::new("no complexity report in output"))?;
    let files = data
        .as_object()
        .ok_or_else(|| ParseError::new("complexity report is not a file map"))?;

    let scores: Vec<f64> = files
        .values()
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(|block| block.get("complexity").and_then(Value::as_f64))
        .collect();

    if scores.is_empty() {
        return Ok(ComplexityStats { average: 0.0, max: 0.0, total_functions: 0 });
    }

    let sum: f64 = scores.iter().sum();
    let max = scores.iter().copied().fold(f64::MIN, f64::max);

    Ok(ComplexityStats {
        average: sum / scores.len() as f64,
        max,
        total_functions: scores.len() as u64,
    })
}
