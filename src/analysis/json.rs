use serde_json::Value;

/// Finds the last complete JSON document in captured tool output.
///
/// Only documents starting at column 0 are considered, so warnings printed
/// before the report and a report cut off mid-way both degrade gracefully:
/// the former are skipped, the latter yields `None`.
pub fn last_json_document(output: &str) -> Option<Value> {
    let mut found = None;
    let mut resume_at = 0usize;

    for start in line_starts(output) {
        if start < resume_at {
            continue;
        }
        let rest = &output[start..];
        if !(rest.starts_with('{') || rest.starts_with('[')) {
            continue;
        }

        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            resume_at = start + stream.byte_offset();
            found = Some(value);
        }
    }

    found
}

fn line_starts(output: &str) -> impl Iterator<Item = usize> + '_ {
    std::iter::once(0).chain(
        output
            .match_indices('\n')
            .map(|(idx, _)| idx + 1)
            .filter(move |idx| *idx < output.len()),
    )
}
