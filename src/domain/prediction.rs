// ============================================================
// Layer 3 - Prediction Domain Types
// ============================================================
// ClassProbabilities  - one distribution over the two classes
// ModelVote           - what a single fold model said
// PredictionResult    - the aggregated ensemble answer
// ConfidenceBand      - human-readable reading of a confidence

use serde::{Deserialize, Serialize};

use crate::domain::label::Label;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub match_ready: f64,
    pub not_match_ready: f64,
}

impl ClassProbabilities {
    pub fn new(match_ready: f64, not_match_ready: f64) -> Self {
        Self {
            match_ready,
            not_match_ready,
        }
    }

    /// Build from a softmax row in logit-column order, renormalising so
    /// the two entries sum to exactly one in f64.
    pub fn from_softmax(row: &[f32]) -> Option<Self> {
        if row.len() != Label::COUNT {
            return None;
        }
        let a = f64::from(row[Label::MatchReady.class_index()]);
        let b = f64::from(row[Label::NotMatchReady.class_index()]);
        Self::new(a, b).normalised()
    }

    pub fn get(&self, label: Label) -> f64 {
        match label {
            Label::MatchReady => self.match_ready,
            Label::NotMatchReady => self.not_match_ready,
        }
    }

    /// Scale so the entries sum to one. None for non-finite or
    /// non-positive totals.
    pub fn normalised(self) -> Option<Self> {
        let total = self.match_ready + self.not_match_ready;
        if !total.is_finite() || total <= 0.0 {
            return None;
        }
        Some(Self::new(self.match_ready / total, self.not_match_ready / total))
    }

    /// The more probable class. Exact ties resolve to `not_match_ready`.
    pub fn argmax(&self) -> Label {
        if self.match_ready > self.not_match_ready {
            Label::MatchReady
        } else {
            Label::NotMatchReady
        }
    }

    pub fn is_tie(&self) -> bool {
        self.match_ready == self.not_match_ready
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVote {
    /// Fold whose checkpoint produced this vote
    pub fold_index: usize,

    /// The vote's own argmax
    pub label: Label,

    pub probabilities: ClassProbabilities,
}

impl ModelVote {
    pub fn new(fold_index: usize, probabilities: ClassProbabilities) -> Self {
        Self {
            fold_index,
            label: probabilities.argmax(),
            probabilities,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: Label,

    /// Averaged probability of `label`, always in [0, 1]
    pub confidence: f64,

    /// Averaged distribution across every model
    pub probabilities: ClassProbabilities,

    /// One entry per ensemble member, in fold order
    pub per_model_probabilities: Vec<ModelVote>,

    /// Set when both classes averaged to exactly the same probability
    pub low_confidence: bool,
}

impl PredictionResult {
    pub fn band(&self) -> ConfidenceBand {
        ConfidenceBand::from_confidence(self.confidence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    VeryConfident,
    Confident,
    Uncertain,
}

impl ConfidenceBand {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > 0.9 {
            ConfidenceBand::VeryConfident
        } else if confidence > 0.7 {
            ConfidenceBand::Confident
        } else {
            ConfidenceBand::Uncertain
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_softmax_renormalises() {
        let p = ClassProbabilities::from_softmax(&[0.3, 0.6]).unwrap();
        assert!((p.match_ready + p.not_match_ready - 1.0).abs() < 1e-12);
        assert!((p.not_match_ready - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_from_softmax_rejects_wrong_width() {
        assert!(ClassProbabilities::from_softmax(&[1.0]).is_none());
        assert!(ClassProbabilities::from_softmax(&[0.0, 0.0]).is_none());
    }

    #[test]
    fn test_tie_prefers_not_match_ready() {
        let p = ClassProbabilities::new(0.5, 0.5);
        assert!(p.is_tie());
        assert_eq!(p.argmax(), Label::NotMatchReady);
    }

    #[test]
    fn test_confidence_bands() {
        assert_eq!(ConfidenceBand::from_confidence(0.95), ConfidenceBand::VeryConfident);
        assert_eq!(ConfidenceBand::from_confidence(0.8), ConfidenceBand::Confident);
        assert_eq!(ConfidenceBand::from_confidence(0.7), ConfidenceBand::Uncertain);
    }
}
