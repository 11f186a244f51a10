// ============================================================
// Layer 3 - Label Domain Type
// ============================================================
// The classifier is a closed two-class system. The class index
// ordering follows the alphabetical ordering of the class
// directories (match_ready = 0, not_match_ready = 1), which is
// also the column order of every model's logits.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::domain::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    MatchReady,
    NotMatchReady,
}

impl Label {
    /// Every class in logit-column order.
    pub const ALL: [Label; 2] = [Label::MatchReady, Label::NotMatchReady];

    /// Number of output classes of every model in the ensemble.
    pub const COUNT: usize = 2;

    pub fn as_str(self) -> &'static str {
        match self {
            Label::MatchReady => "match_ready",
            Label::NotMatchReady => "not_match_ready",
        }
    }

    /// Column of this class in a model's output vector.
    pub fn class_index(self) -> usize {
        match self {
            Label::MatchReady => 0,
            Label::NotMatchReady => 1,
        }
    }

    pub fn from_class_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Directory name of this class inside the Sample Store.
    pub fn dir_name(self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the canonical snake_case names, case-insensitively, with
/// hyphens treated as underscores ("Match-Ready" parses).
impl FromStr for Label {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalised.as_str() {
            "match_ready" => Ok(Label::MatchReady),
            "not_match_ready" => Ok(Label::NotMatchReady),
            _ => Err(PipelineError::Validation(format!(
                "unrecognised label '{}', expected 'match_ready' or 'not_match_ready'",
                s.trim()
            ))),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_canonical_and_loose_forms() {
        assert_eq!("match_ready".parse::<Label>().unwrap(), Label::MatchReady);
        assert_eq!(" Not-Match-Ready ".parse::<Label>().unwrap(), Label::NotMatchReady);
    }

    #[test]
    fn test_rejects_unknown_label() {
        let err = "ball".parse::<Label>().unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[test]
    fn test_class_index_round_trips() {
        for label in Label::ALL {
            assert_eq!(Label::from_class_index(label.class_index()), Some(label));
        }
        assert_eq!(Label::from_class_index(2), None);
    }
}
