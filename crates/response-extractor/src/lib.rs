use analysis_core::{AnalysisError, AnalysisResult};

/// Locate the first balanced top-level `{...}` region in raw provider text.
///
/// Providers wrap the payload in prose and markdown fences, so the scan
/// starts at the first `{` and walks forward one character at a time,
/// tracking whether it is inside a quoted string and whether the next
/// character is escaped. Brace depth only changes outside strings, which
/// keeps braces inside field values intact. Returns the exact substring up
/// to the matching closing brace.
pub fn balanced_object_region(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Replace raw newlines, carriage returns and tabs with spaces and collapse
/// whitespace runs. Providers frequently emit literal line breaks inside
/// textual field values, which strict parsers reject; escaped sequences
/// (`\n` as two characters) pass through untouched.
fn normalize_whitespace(region: &str) -> String {
    let mut out = String::with_capacity(region.len());
    let mut last_was_space = false;
    for ch in region.chars() {
        let mapped = match ch {
            '\n' | '\r' | '\t' => ' ',
            other => other,
        };
        if mapped == ' ' {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(mapped);
            last_was_space = false;
        }
    }
    out
}

/// Recover a structured `AnalysisResult` from raw provider text.
///
/// Fails with `ExtractionError` when no balanced region exists or the
/// region is not valid JSON, and with `ValidationError` when the parsed
/// object has the wrong shape for the result type. Extraction failures are
/// terminal, never retried.
pub fn extract(raw_text: &str) -> Result<AnalysisResult, AnalysisError> {
    let region = balanced_object_region(raw_text).ok_or_else(|| {
        AnalysisError::ExtractionError("no balanced object region in provider text".into())
    })?;

    let normalized = normalize_whitespace(region);

    let value: serde_json::Value = serde_json::from_str(&normalized)
        .map_err(|e| AnalysisError::ExtractionError(format!("region does not parse: {}", e)))?;

    if !value.is_object() {
        return Err(AnalysisError::ValidationError(
            "top-level value is not a mapping".into(),
        ));
    }

    serde_json::from_value(value).map_err(|e| {
        tracing::debug!("Extracted object has wrong shape: {}", e);
        AnalysisError::ValidationError(format!("object has wrong shape: {}", e))
    })
}
