//! Entity-level confidence aggregation

use crate::Candidate;

/// Combines per-token scores into one clamped entity confidence
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceAggregator {
    /// Subtracted once when an entity's own tokens were dropped or split off
    penalty: f32,
}

impl ConfidenceAggregator {
    pub fn new(penalty: f32) -> Self {
        Self {
            penalty: penalty.max(0.0),
        }
    }

    /// Arithmetic mean of `scores`, 0.0 when empty
    pub fn mean(scores: &[f32]) -> f32 {
        if scores.is_empty() {
            return 0.0;
        }
        scores.iter().sum::<f32>() / scores.len() as f32
    }

    /// Final confidence for a normalized candidate, in [0, 1]
    pub fn aggregate(&self, candidate: &Candidate) -> f32 {
        let mut confidence = Self::mean(&candidate.scores);
        if candidate.penalized {
            confidence -= self.penalty;
        }
        if confidence.is_nan() {
            return 0.0;
        }
        confidence.clamp(0.0, 1.0)
    }

    pub fn penalty(&self) -> f32 {
        self.penalty
    }
}

impl Default for ConfidenceAggregator {
    fn default() -> Self {
        Self::new(0.05)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexicon_core::EntityType;

    fn candidate(scores: Vec<f32>, penalized: bool) -> Candidate {
        Candidate {
            entity_type: EntityType::Person,
            start: 0,
            end: 4,
            scores,
            penalized,
        }
    }

    #[test]
    fn test_mean() {
        assert_eq!(ConfidenceAggregator::mean(&[]), 0.0);
        assert!((ConfidenceAggregator::mean(&[0.8, 0.6]) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_penalty_applied_once() {
        let aggregator = ConfidenceAggregator::default();
        let plain = aggregator.aggregate(&candidate(vec![0.9, 0.9], false));
        let penalized = aggregator.aggregate(&candidate(vec![0.9, 0.9], true));

        assert!((plain - 0.9).abs() < 1e-6);
        assert!((penalized - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_clamped_to_unit_interval() {
        let aggregator = ConfidenceAggregator::new(0.5);
        assert_eq!(aggregator.aggregate(&candidate(vec![0.2], true)), 0.0);
        assert_eq!(aggregator.aggregate(&candidate(vec![1.4, 1.2], false)), 1.0);
        assert_eq!(aggregator.aggregate(&candidate(vec![f32::NAN], false)), 0.0);
    }
}
