use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Rate limit exceeded, retry in {}s", retry_after.as_secs())]
    RateLimitExceeded { retry_after: Duration },

    #[error("All providers failed after {attempts} attempts: {last_error}")]
    AllProvidersFailed { attempts: usize, last_error: String },

    #[error("Extraction failed: {0}")]
    ExtractionError(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
