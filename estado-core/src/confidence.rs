//! Confidence-scored values.
//!
//! Every extraction stage returns its value together with a confidence in
//! `[0, 1]`, and callers combine those scores upward instead of passing
//! loose floats around.

use serde::{Deserialize, Serialize};

/// A value paired with a confidence in `[0, 1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scored<T> {
    pub value: T,
    pub confidence: f64,
}

impl<T> Scored<T> {
    /// Confidence is clamped into `[0, 1]`; NaN becomes 0.
    pub fn new(value: T, confidence: f64) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self { value, confidence }
    }

    pub fn zero(value: T) -> Self {
        Self::new(value, 0.0)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Scored<U> {
        Scored {
            value: f(self.value),
            confidence: self.confidence,
        }
    }

    /// Lower the confidence to at most `cap`.
    pub fn capped(mut self, cap: f64) -> Self {
        self.confidence = self.confidence.min(cap);
        self
    }

    pub fn into_parts(self) -> (T, f64) {
        (self.value, self.confidence)
    }
}

/// `found / total`, or 0 when there is nothing to find.
pub fn ratio(found: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (found as f64 / total as f64).clamp(0.0, 1.0)
}

/// Arithmetic mean, 0 for an empty slice.
pub fn mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps() {
        assert_eq!(Scored::new((), 1.7).confidence, 1.0);
        assert_eq!(Scored::new((), -0.2).confidence, 0.0);
        assert_eq!(Scored::new((), f64::NAN).confidence, 0.0);
    }

    #[test]
    fn test_ratio() {
        assert_eq!(ratio(0, 6), 0.0);
        assert_eq!(ratio(6, 6), 1.0);
        assert!((ratio(4, 6) - 4.0 / 6.0).abs() < 1e-12);
        assert_eq!(ratio(3, 0), 0.0);
    }

    #[test]
    fn test_map_and_cap() {
        let s = Scored::new(vec![1, 2, 3], 0.9).map(|v| v.len()).capped(0.5);
        assert_eq!(s.value, 3);
        assert_eq!(s.confidence, 0.5);
        assert_eq!(mean(&[1.0, 0.5, 0.0]), 0.5);
        assert_eq!(mean(&[]), 0.0);
    }
}
