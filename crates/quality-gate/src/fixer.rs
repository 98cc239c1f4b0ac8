use analysis_core::AnalysisResult;

use crate::config::QualityConfig;

const LABEL_PREFIXES: [&str; 7] = [
    "summary:",
    "analysis:",
    "tl;dr:",
    "tldr:",
    "result:",
    "answer:",
    "here is the analysis:",
];

/// Deterministic, idempotent repair pass.
///
/// Strips label prefixes and filler phrases from the summary, truncates an
/// over-length summary at a sentence boundary, strips leading bullet and
/// enumeration markers from impact points, and nulls out enumerated fields
/// whose token is not in the allowed set (valid tokens are canonicalized).
/// Returns the repaired object and whether anything changed.
pub fn fix(result: &AnalysisResult, config: &QualityConfig) -> (AnalysisResult, bool) {
    let mut fixed = result.clone();

    fixed.summary_text = clean_summary(&fixed.summary_text, config);
    fixed.summary_text = truncate_at_sentence(&fixed.summary_text, config.summary_max_chars);

    fixed.impact_points = fixed
        .impact_points
        .iter()
        .map(|point| clean_point(point, config))
        .filter(|point| !point.is_empty())
        .collect();

    fixed.action = result.action().map(|a| a.as_str().to_string());
    fixed.risk_level = result.risk().map(|r| r.as_str().to_string());

    let changed = fixed != *result;
    (fixed, changed)
}

/// Prefix stripping, filler removal and whitespace cleanup, iterated to a
/// fixpoint so a second pass is always a no-op.
fn clean_summary(summary: &str, config: &QualityConfig) -> String {
    let mut current = summary.trim().to_string();
    loop {
        let mut next = strip_label_prefixes(&current);
        for phrase in &config.filler_phrases {
            next = remove_phrase(&next, phrase);
        }
        let next = tidy(&next);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn strip_label_prefixes(text: &str) -> String {
    let mut current = text.trim_start();
    loop {
        let lowered = current.to_lowercase();
        let matched = LABEL_PREFIXES
            .iter()
            .find(|prefix| lowered.starts_with(*prefix));
        match matched {
            Some(prefix) => current = current[prefix.len()..].trim_start(),
            None => return current.to_string(),
        }
    }
}

/// Remove every ASCII-case-insensitive occurrence of `phrase`.
fn remove_phrase(text: &str, phrase: &str) -> String {
    if phrase.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = find_ascii_ci(rest, phrase) {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + phrase.len()..];
    }
    out.push_str(rest);
    out
}

/// ASCII-case-insensitive substring search. The needle is ASCII, so byte
/// windows that match it always fall on character boundaries.
fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

/// Collapse whitespace runs and drop the punctuation orphans left behind by
/// phrase removal.
fn tidy(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            if matches!(ch, ',' | '.' | ';' | ':') && out.ends_with(' ') {
                out.pop();
            }
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim()
        .trim_start_matches([',', '.', ';', ':'])
        .trim_start()
        .to_string()
}

/// Cut an over-length text at the last sentence end that fits, falling back
/// to the last word boundary rather than cutting mid-word.
fn truncate_at_sentence(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let head = &text[..cut];

    if let Some(end) = head.rfind(['.', '!', '?']) {
        if end > 0 {
            return head[..=end].trim_end().to_string();
        }
    }
    match head.rfind(char::is_whitespace) {
        Some(end) => head[..end].trim_end().to_string(),
        None => head.to_string(),
    }
}

fn clean_point(point: &str, config: &QualityConfig) -> String {
    let mut current = point.trim().to_string();
    loop {
        let mut next = strip_bullet_marker(&current).to_string();
        for phrase in &config.filler_phrases {
            next = remove_phrase(&next, phrase);
        }
        let next = tidy(&next);
        if next == current {
            return next;
        }
        current = next;
    }
}

/// Strip one leading bullet or enumeration marker. Markers must be followed
/// by whitespace so that values like "-5% drop" or "3.5% yield" survive.
fn strip_bullet_marker(point: &str) -> &str {
    let trimmed = point.trim_start();
    for marker in ['-', '*', '•', '·'] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return rest.trim_start();
            }
        }
    }
    if let Some(rest) = strip_numeric_marker(trimmed) {
        return rest.trim_start();
    }
    trimmed
}

fn strip_numeric_marker(point: &str) -> Option<&str> {
    let digits = point
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(point.len());
    if digits == 0 {
        return None;
    }
    let rest = &point[digits..];
    rest.strip_prefix('.')
        .or_else(|| rest.strip_prefix(')'))
        .filter(|r| r.is_empty() || r.starts_with(char::is_whitespace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::validate;
    use std::collections::BTreeMap;

    fn base() -> AnalysisResult {
        AnalysisResult {
            summary_text: "Approval unlocks institutional inflows into the asset.".to_string(),
            impact_points: vec!["Raises demand".into(), "Improves liquidity".into()],
            action: Some("WATCH".into()),
            risk_level: Some("Medium".into()),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn clean_input_is_untouched() {
        let config = QualityConfig::default();
        let (fixed, changed) = fix(&base(), &config);
        assert!(!changed);
        assert_eq!(fixed, base());
    }

    #[test]
    fn label_prefixes_are_stripped() {
        let config = QualityConfig::default();
        let mut dirty = base();
        dirty.summary_text = format!("Summary: Analysis: {}", dirty.summary_text);
        let (fixed, changed) = fix(&dirty, &config);
        assert!(changed);
        assert!(fixed.summary_text.starts_with("Approval"));
    }

    #[test]
    fn bullet_and_enumeration_markers_are_stripped() {
        let config = QualityConfig::default();
        let mut dirty = base();
        dirty.impact_points = vec![
            "- Raises demand".into(),
            "* Improves liquidity".into(),
            "1. Attracts funds".into(),
            "2) Lowers friction".into(),
        ];
        let (fixed, _) = fix(&dirty, &config);
        assert_eq!(
            fixed.impact_points,
            vec![
                "Raises demand",
                "Improves liquidity",
                "Attracts funds",
                "Lowers friction"
            ]
        );
    }

    #[test]
    fn numeric_values_in_points_survive_marker_stripping() {
        let config = QualityConfig::default();
        let mut dirty = base();
        dirty.impact_points = vec!["- -5% drawdown risk".into(), "3.5% yield unchanged".into()];
        let (fixed, _) = fix(&dirty, &config);
        assert_eq!(
            fixed.impact_points,
            vec!["-5% drawdown risk", "3.5% yield unchanged"]
        );
    }

    #[test]
    fn empty_points_are_dropped() {
        let config = QualityConfig::default();
        let mut dirty = base();
        dirty.impact_points = vec!["- ".into(), "Raises demand".into(), "  ".into()];
        let (fixed, _) = fix(&dirty, &config);
        assert_eq!(fixed.impact_points, vec!["Raises demand"]);
    }

    #[test]
    fn invalid_enum_tokens_are_nulled_valid_ones_canonicalized() {
        let config = QualityConfig::default();
        let mut dirty = base();
        dirty.action = Some("MOON".into());
        dirty.risk_level = Some("medium".into());
        let (fixed, changed) = fix(&dirty, &config);
        assert!(changed);
        assert_eq!(fixed.action, None);
        assert_eq!(fixed.risk_level, Some("Medium".to_string()));
    }

    #[test]
    fn over_length_summary_is_cut_at_a_sentence_boundary() {
        let config = QualityConfig::default();
        let mut dirty = base();
        let sentence = "Institutional inflows keep building across venues. ";
        dirty.summary_text = sentence.repeat(20).trim_end().to_string();

        let (fixed, changed) = fix(&dirty, &config);
        assert!(changed);
        assert!(fixed.summary_text.chars().count() <= config.summary_max_chars);
        assert!(fixed.summary_text.ends_with('.'));
    }

    #[test]
    fn truncation_without_sentence_boundary_breaks_at_a_word() {
        let truncated = truncate_at_sentence("alpha beta gamma delta", 12);
        assert_eq!(truncated, "alpha beta");
    }

    #[test]
    fn filler_phrases_are_removed_and_issue_count_drops() {
        let config = QualityConfig::default();
        let mut dirty = base();
        dirty.summary_text = "It depends, but approval helps; hard to say more, and \
                              time will tell about institutional demand."
            .to_string();
        dirty.risk_level = None;

        let before = validate(&dirty, &config);
        let filler_issues_before = before
            .issues
            .iter()
            .filter(|i| i.starts_with("filler phrase"))
            .count();
        assert_eq!(filler_issues_before, 3);

        let (fixed, changed) = fix(&dirty, &config);
        assert!(changed);
        let after = validate(&fixed, &config);
        assert!(after.issues.len() < before.issues.len());
    }

    #[test]
    fn fix_is_idempotent() {
        let config = QualityConfig::default();
        let mut dirty = base();
        dirty.summary_text =
            "Summary: it depends, approval unlocks institutional inflows anyway.".to_string();
        dirty.impact_points = vec!["- Raises demand".into(), "2) Improves liquidity".into()];
        dirty.action = Some("hold".into());

        let (once, changed_once) = fix(&dirty, &config);
        assert!(changed_once);
        let (twice, changed_twice) = fix(&once, &config);
        assert!(!changed_twice);
        assert_eq!(once, twice);
    }
}
