//! Token estimation
//!
//! No tokenizer is mandated; any deterministic estimator roughly
//! proportional to text length will do.

/// Characters per token assumed by the default estimator
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;

/// Estimates how many tokens a piece of text costs
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

impl<F> TokenEstimator for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn estimate(&self, text: &str) -> usize {
        self(text)
    }
}

/// Fixed characters-per-token ratio, at least one token for non-empty text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharRatioEstimator {
    chars_per_token: f64,
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl CharRatioEstimator {
    /// Ratios that are not positive and finite fall back to the default
    pub fn new(chars_per_token: f64) -> Self {
        if chars_per_token.is_finite() && chars_per_token > 0.0 {
            Self { chars_per_token }
        } else {
            Self::default()
        }
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let chars = text.chars().count() as f64;
        ((chars / self.chars_per_token) as usize).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_ratio_is_four_chars() {
        let estimator = CharRatioEstimator::default();
        assert_eq!(estimator.estimate(""), 0);
        assert_eq!(estimator.estimate("abc"), 1);
        assert_eq!(estimator.estimate("abcdefgh"), 2);
        assert_eq!(estimator.estimate(&"x".repeat(400)), 100);
    }

    #[test]
    fn invalid_ratio_falls_back() {
        assert_eq!(CharRatioEstimator::new(0.0).chars_per_token(), DEFAULT_CHARS_PER_TOKEN);
        assert_eq!(CharRatioEstimator::new(f64::NAN).chars_per_token(), DEFAULT_CHARS_PER_TOKEN);
        assert_eq!(CharRatioEstimator::new(2.0).estimate("abcd"), 2);
    }

    #[test]
    fn closures_are_estimators() {
        let words = |text: &str| text.split_whitespace().count();
        assert_eq!(words.estimate("one two three"), 3);
    }

    proptest! {
        #[test]
        fn estimate_grows_with_length(a in "[a-z ]{0,200}", b in "[a-z ]{0,200}") {
            let estimator = CharRatioEstimator::default();
            let joined = format!("{a}{b}");
            prop_assert!(estimator.estimate(&joined) >= estimator.estimate(&a));
        }
    }
}
