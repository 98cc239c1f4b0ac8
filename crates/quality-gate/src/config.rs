/// Rubric tunables.
///
/// The constants were tuned empirically against sample provider outputs;
/// only their direction is contractual (more filler scores lower, more
/// required-field completeness scores higher), so everything is exposed
/// here rather than hard-coded in the scorer.
#[derive(Debug, Clone)]
pub struct QualityConfig {
    /// Every result starts here before rules apply
    pub baseline: f64,
    /// Subtracted for each absent required field
    pub missing_field_penalty: f64,
    /// Subtracted when summary_text is outside the length bounds
    pub length_penalty: f64,
    /// Subtracted per detected filler phrase
    pub filler_penalty: f64,
    /// Added per detected analytical phrase
    pub analytical_reward: f64,
    /// Added when impact_points holds 2 to 5 items
    pub impact_points_reward: f64,
    /// Added per valid enumerated field
    pub enum_reward: f64,
    pub summary_min_chars: usize,
    pub summary_max_chars: usize,
    /// A result is valid when score >= threshold and issues < issue_limit
    pub validity_threshold: f64,
    pub issue_limit: usize,
    /// Below this score the pipeline attempts a repair pass
    pub fix_threshold: f64,
    /// Low-information phrasing, matched case-insensitively
    pub filler_phrases: Vec<String>,
    /// Concrete analytical phrasing, matched case-insensitively
    pub analytical_phrases: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            baseline: 5.0,
            missing_field_penalty: 3.0,
            length_penalty: 1.0,
            filler_penalty: 0.5,
            analytical_reward: 0.5,
            impact_points_reward: 1.0,
            enum_reward: 0.5,
            summary_min_chars: 20,
            summary_max_chars: 600,
            validity_threshold: 4.0,
            issue_limit: 4,
            fix_threshold: 6.0,
            filler_phrases: [
                "it depends",
                "hard to say",
                "time will tell",
                "do your own research",
                "not financial advice",
                "as an ai",
                "i cannot predict",
                "anything can happen",
                "generally speaking",
                "stay tuned",
                "remains to be seen",
            ]
            .map(String::from)
            .to_vec(),
            analytical_phrases: [
                "because",
                "driven by",
                "due to",
                "inflow",
                "outflow",
                "liquidity",
                "volume",
                "support level",
                "resistance",
                "volatility",
                "historically",
                "correlation",
                "basis points",
                "institutional",
                "regulatory",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

impl QualityConfig {
    /// Default rubric with the validity knobs taken from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(threshold) = std::env::var("QUALITY_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.validity_threshold = threshold;
        }
        if let Some(limit) = std::env::var("QUALITY_ISSUE_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.issue_limit = limit;
        }
        config
    }
}
