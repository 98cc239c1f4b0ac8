pub mod config;
pub mod fixer;
pub mod scorer;

pub use config::QualityConfig;
pub use fixer::fix;
pub use scorer::validate;

use analysis_core::{AnalysisResult, QualityScore};

/// A result together with its rubric verdict
#[derive(Debug, Clone)]
pub struct Assessment {
    pub result: AnalysisResult,
    pub quality: QualityScore,
    pub was_fixed: bool,
}

/// Scores a structured result against the rubric and repairs it when the
/// verdict warrants. A poorly scoring result is surfaced with its score,
/// never discarded; rejecting it is the caller's decision.
pub struct QualityGate {
    config: QualityConfig,
}

impl QualityGate {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn validate(&self, result: &AnalysisResult) -> QualityScore {
        validate(result, &self.config)
    }

    pub fn fix(&self, result: &AnalysisResult) -> (AnalysisResult, bool) {
        fix(result, &self.config)
    }

    /// Validate, repair when invalid or below the fix threshold, and
    /// re-score. The better-scoring shape is returned either way.
    pub fn assess(&self, result: AnalysisResult) -> Assessment {
        let quality = self.validate(&result);
        if quality.is_valid && quality.score >= self.config.fix_threshold {
            return Assessment {
                result,
                quality,
                was_fixed: false,
            };
        }

        let (fixed, changed) = self.fix(&result);
        if !changed {
            return Assessment {
                result,
                quality,
                was_fixed: false,
            };
        }

        let requality = self.validate(&fixed);
        tracing::debug!(
            "Quality fix applied: score {:.1} -> {:.1}, issues {} -> {}",
            quality.score,
            requality.score,
            quality.issues.len(),
            requality.issues.len()
        );
        Assessment {
            result: fixed,
            quality: requality,
            was_fixed: true,
        }
    }
}
