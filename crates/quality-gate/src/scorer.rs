use analysis_core::{AnalysisResult, QualityScore, RiskLevel, TradeAction};

use crate::config::QualityConfig;

/// Score a structured result against the rubric. Pure and deterministic:
/// identical input always yields an identical QualityScore.
pub fn validate(result: &AnalysisResult, config: &QualityConfig) -> QualityScore {
    let mut score = config.baseline;
    let mut issues = Vec::new();

    let summary = result.summary_text.trim();
    if summary.is_empty() {
        score -= config.missing_field_penalty;
        issues.push("missing summary_text".to_string());
    } else {
        let chars = summary.chars().count();
        if chars < config.summary_min_chars {
            score -= config.length_penalty;
            issues.push(format!("summary_text too short ({} chars)", chars));
        } else if chars > config.summary_max_chars {
            score -= config.length_penalty;
            issues.push(format!("summary_text too long ({} chars)", chars));
        }
    }

    let points = &result.impact_points;
    if points.is_empty() {
        score -= config.missing_field_penalty;
        issues.push("missing impact_points".to_string());
    } else if (2..=5).contains(&points.len()) {
        score += config.impact_points_reward;
    } else {
        issues.push(format!(
            "impact_points count out of range ({} items)",
            points.len()
        ));
    }

    let haystack = phrase_haystack(result);
    for phrase in &config.filler_phrases {
        let hits = count_occurrences(&haystack, &phrase.to_lowercase());
        if hits > 0 {
            score -= config.filler_penalty * hits as f64;
            issues.push(format!("filler phrase: {}", phrase));
        }
    }
    for phrase in &config.analytical_phrases {
        let hits = count_occurrences(&haystack, &phrase.to_lowercase());
        score += config.analytical_reward * hits as f64;
    }

    if let Some(token) = result.action.as_deref() {
        if TradeAction::parse(token).is_some() {
            score += config.enum_reward;
        } else {
            issues.push(format!("invalid action token: {}", token));
        }
    }
    if let Some(token) = result.risk_level.as_deref() {
        if RiskLevel::parse(token).is_some() {
            score += config.enum_reward;
        } else {
            issues.push(format!("invalid risk_level token: {}", token));
        }
    }

    for key in result.extra.keys() {
        issues.push(format!("unexpected field: {}", key));
    }

    let score = score.clamp(0.0, 10.0);
    let is_valid = score >= config.validity_threshold && issues.len() < config.issue_limit;

    QualityScore {
        score,
        issues,
        is_valid,
        confidence: score / 10.0,
    }
}

fn phrase_haystack(result: &AnalysisResult) -> String {
    let mut haystack = result.summary_text.to_lowercase();
    for point in &result.impact_points {
        haystack.push(' ');
        haystack.push_str(&point.to_lowercase());
    }
    haystack
}

/// Non-overlapping occurrence count
fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut rest = haystack;
    while let Some(pos) = rest.find(needle) {
        count += 1;
        rest = &rest[pos + needle.len()..];
    }
    count
}
