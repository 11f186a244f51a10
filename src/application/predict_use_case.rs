// ============================================================
// Layer 2 - PredictUseCase
// ============================================================
// Turns raw image bytes into the JSON-ready answer the relay
// forwards to the camera page:
//
//   bytes ──► ImageClassifier (the ensemble) ──► PredictionResult
//                                                   │
//               optional indeterminate threshold ◄──┘
//                                                   │
//                                                   ▼
//                                            PredictResponse
//
// The classifier itself is a closed two-class system. The
// "indeterminate" verdict (e.g. the photo is not a cricket ball
// at all) is purely a policy on the averaged confidence, and is
// off unless a threshold is configured.

use serde::{Deserialize, Serialize};

use crate::domain::{
    error::{PipelineError, PipelineResult},
    label::Label,
    prediction::{ClassProbabilities, ConfidenceBand, ModelVote, PredictionResult},
    traits::ImageClassifier,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    MatchReady,
    NotMatchReady,
    Indeterminate,
}

impl From<Label> for Verdict {
    fn from(label: Label) -> Self {
        match label {
            Label::MatchReady => Verdict::MatchReady,
            Label::NotMatchReady => Verdict::NotMatchReady,
        }
    }
}

/// Wire shape of one prediction. `prediction` and `confidence` are the
/// two fields the relay has always returned; the rest is detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: Verdict,
    pub confidence: f64,
    pub band: ConfidenceBand,
    pub low_confidence: bool,
    pub probabilities: ClassProbabilities,
    pub per_model: Vec<ModelVote>,
}

pub struct PredictUseCase<C: ImageClassifier> {
    classifier: C,
    indeterminate_below: Option<f64>,
}

impl<C: ImageClassifier> PredictUseCase<C> {
    pub fn new(classifier: C) -> Self {
        Self {
            classifier,
            indeterminate_below: None,
        }
    }

    /// Report `indeterminate` whenever the ensemble confidence is below
    /// `threshold`. Must lie in [0.5, 1]: a two-class winner is never
    /// below 0.5.
    pub fn with_indeterminate_below(mut self, threshold: f64) -> PipelineResult<Self> {
        if !(0.5..=1.0).contains(&threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "indeterminate threshold must be in [0.5, 1.0], got {threshold}"
            )));
        }
        self.indeterminate_below = Some(threshold);
        Ok(self)
    }

    pub fn predict(&self, image_bytes: &[u8]) -> PipelineResult<PredictResponse> {
        let result = self.classifier.classify(image_bytes)?;
        let response = self.respond(result);
        tracing::info!(
            "Prediction: {:?} ({:.2}%)",
            response.prediction,
            response.confidence * 100.0
        );
        Ok(response)
    }

    fn respond(&self, result: PredictionResult) -> PredictResponse {
        let band = result.band();
        let prediction = match self.indeterminate_below {
            Some(threshold) if result.confidence < threshold => Verdict::Indeterminate,
            _ => Verdict::from(result.label),
        };
        PredictResponse {
            prediction,
            confidence: result.confidence,
            band,
            low_confidence: result.low_confidence,
            probabilities: result.probabilities,
            per_model: result.per_model_probabilities,
        }
    }
}
