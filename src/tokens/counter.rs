//! Token estimation for providers that omit usage counters.

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> u64;
}

/// Character-based approximation (4 chars ≈ 1 token).
#[derive(Debug, Clone)]
pub struct CharacterEstimator {
    chars_per_token: f64,
}

impl CharacterEstimator {
    pub fn new() -> Self {
        Self::with_ratio(4.0)
    }
    pub fn with_ratio(r: f64) -> Self {
        Self { chars_per_token: r }
    }
}

impl Default for CharacterEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounter for CharacterEstimator {
    fn count(&self, text: &str) -> u64 {
        (text.chars().count() as f64 / self.chars_per_token).ceil() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_estimate() {
        let c = CharacterEstimator::new();
        assert_eq!(c.count(""), 0);
        assert_eq!(c.count("abcd"), 1);
        assert_eq!(c.count("abcde"), 2);
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        // "été!" is 4 chars but 6 bytes
        assert_eq!(CharacterEstimator::new().count("été!"), 1);
        assert_eq!(CharacterEstimator::new().count("élève"), 2);
    }
}
