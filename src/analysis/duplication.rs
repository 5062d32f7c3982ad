use crate::analysis::{json::last_json_document, percentage, ParseError};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicationStats {
    pub duplicate_blocks: u64,
    pub duplicated_lines: u64,
    pub percentage: f64,
}

/// Estimates duplicated lines from pylint `duplicate-code` messages.
///
/// Each message lists the similar regions as `==module:[start:end]`. The
/// first region is the original; every further region is a copy. Messages
/// whose regions cannot be read count as `fallback_lines` lines.
pub fn parse_duplication<F>(
    output: &str,
    total_lines: u64,
    fallback_lines: u64,
    is_excluded: F,
) -> Result<DuplicationStats, ParseError>
where
    F: Fn(&str) -> bool,
{
    let data = last_json_document(output)
        .ok_or_else(|| ParseError::new("no pylint message list in output"))?;
    let messages = data
        .as_array()
        .ok_or_else(|| ParseError::new("pylint output is not a message list"))?;

    let mut duplicate_blocks = 0u64;
    let mut duplicated_lines = 0u64;

    for message in messages {
        if message.get("symbol").and_then(Value::as_str) != Some("duplicate-code") {
            continue;
        }
        if message
            .get("path")
            .and_then(Value::as_str)
            .is_some_and(&is_excluded)
        {
            continue;
        }

        duplicate_blocks += 1;
        let text = message.get("message").and_then(Value::as_str).unwrap_or("");
        duplicated_lines += copied_lines(text).unwrap_or(fallback_lines);
    }

    Ok(DuplicationStats {
        duplicate_blocks,
        duplicated_lines,
        percentage: percentage(duplicated_lines, total_lines),
    })
}

fn copied_lines(message: &str) -> Option<u64> {
    let lengths: Vec<u64> = message.lines().filter_map(region_length).collect();
    if lengths.len() < 2 {
        return None;
    }
    Some(lengths[1..].iter().sum())
}

// "==pkg.module:[12:30]" -> 18
fn region_length(line: &str) -> Option<u64> {
    let line = line.trim().strip_prefix("==")?;
    let range = line.rsplit_once(":[")?.1.strip_suffix(']')?;
    let (start, end) = range.split_once(':')?;
    let start: u64 = start.trim().parse().ok()?;
    let end: u64 = end.trim().parse().ok()?;
    end.checked_sub(start)
}
