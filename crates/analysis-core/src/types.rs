use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Analysis depth requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisMode {
    Quick,
    Deep,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Quick => "quick",
            AnalysisMode::Deep => "deep",
        }
    }
}

/// A single user request, immutable once created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub text: String,
    #[serde(default)]
    pub mode: Option<AnalysisMode>,
    #[serde(default)]
    pub language: Option<String>,
    pub user_id: String,
}

impl AnalysisRequest {
    pub fn new(text: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: None,
            language: None,
            user_id: user_id.into(),
        }
    }

    pub fn with_mode(mut self, mode: AnalysisMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Canonical form of the request text: lowercased, whitespace collapsed.
    /// Two requests with equal normalized content fingerprint identically.
    pub fn normalized_text(&self) -> String {
        self.text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// Trade action recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    Buy,
    Hold,
    Sell,
    Watch,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Hold => "HOLD",
            TradeAction::Sell => "SELL",
            TradeAction::Watch => "WATCH",
        }
    }

    /// Parse a provider token, case-insensitively. Unknown tokens are None.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_uppercase().as_str() {
            "BUY" => Some(TradeAction::Buy),
            "HOLD" => Some(TradeAction::Hold),
            "SELL" => Some(TradeAction::Sell),
            "WATCH" => Some(TradeAction::Watch),
            _ => None,
        }
    }
}

/// Risk assessment level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

/// Structured analysis produced by a provider.
///
/// `action` and `risk_level` keep the raw provider tokens; the quality gate
/// flags tokens outside the `TradeAction` / `RiskLevel` domains and the
/// fixer nulls them out. Unknown fields land in `extra` so they can be
/// flagged instead of silently passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub summary_text: String,
    #[serde(default)]
    pub impact_points: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl AnalysisResult {
    /// Typed view of `action`; None when absent or not a valid token.
    pub fn action(&self) -> Option<TradeAction> {
        self.action.as_deref().and_then(TradeAction::parse)
    }

    /// Typed view of `risk_level`; None when absent or not a valid token.
    pub fn risk(&self) -> Option<RiskLevel> {
        self.risk_level.as_deref().and_then(RiskLevel::parse)
    }
}

/// Raw provider output, discarded after extraction
#[derive(Debug, Clone)]
pub struct RawProviderResponse {
    pub provider: String,
    pub text: String,
    pub latency_ms: u64,
    pub received_at: DateTime<Utc>,
}

/// Rubric score for one AnalysisResult
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    /// 0.0 to 10.0
    pub score: f64,
    pub issues: Vec<String>,
    pub is_valid: bool,
    /// Score rescaled to 0.0 - 1.0
    pub confidence: f64,
}
