use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::AnalysisRequest;

/// Deterministic cache key derived from the normalized request content.
///
/// The user identity is deliberately excluded: equivalent questions from
/// different users share one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(request: &AnalysisRequest) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(request.normalized_text().as_bytes());
        hasher.update([0x1f]);
        hasher.update(request.mode.map(|m| m.as_str()).unwrap_or("").as_bytes());
        hasher.update([0x1f]);
        hasher.update(
            request
                .language
                .as_deref()
                .map(|l| l.trim().to_lowercase())
                .unwrap_or_default()
                .as_bytes(),
        );
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AnalysisMode;

    #[test]
    fn equal_normalized_content_yields_equal_fingerprints() {
        let a = AnalysisRequest::new("Bitcoin ETF approved", "alice");
        let b = AnalysisRequest::new("  bitcoin   etf APPROVED ", "bob");
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn mode_and_language_change_the_fingerprint() {
        let base = AnalysisRequest::new("bitcoin etf", "u1");
        let deep = AnalysisRequest::new("bitcoin etf", "u1").with_mode(AnalysisMode::Deep);
        let es = AnalysisRequest::new("bitcoin etf", "u1").with_language("es");
        assert_ne!(Fingerprint::of(&base), Fingerprint::of(&deep));
        assert_ne!(Fingerprint::of(&base), Fingerprint::of(&es));
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let req = AnalysisRequest::new("x", "u1");
        let fp = Fingerprint::of(&req);
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
