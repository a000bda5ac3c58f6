//! Track-level emotion scoring.
//!
//! The rule formula is the default. An external [`EmotionClassifier`] may
//! replace it, but its output always passes through the same validation so
//! callers only ever see scores in [0, 1] that sum to one.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ExpressionError, Result};
use crate::types::{EmotionLabel, EmotionScores};

const FAST_TEMPO: f64 = 120.0;
const SLOW_TEMPO: f64 = 80.0;
const LOUD_ENERGY: f64 = 0.1;
const BRIGHT_CENTROID_HZ: f64 = 3000.0;

/// Aggregate, un-normalized measurements of a whole track.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackSummary {
    pub tempo: f64,
    /// Mean frame RMS before peak normalization
    pub mean_energy: f64,
    /// Mean spectral centroid in Hz
    pub mean_spectral_centroid: f64,
    pub mean_zero_crossing_rate: f64,
}

/// External collaborator producing raw (unvalidated) emotion scores.
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, summary: &TrackSummary) -> anyhow::Result<EmotionScores>;
}

#[derive(Default)]
pub struct EmotionScorer {
    classifier: Option<Box<dyn EmotionClassifier>>,
}

impl EmotionScorer {
    pub fn rules() -> Self {
        Self::default()
    }

    pub fn with_classifier(classifier: Box<dyn EmotionClassifier>) -> Self {
        Self {
            classifier: Some(classifier),
        }
    }

    pub fn score(&self, summary: &TrackSummary) -> Result<EmotionScores> {
        let raw = match &self.classifier {
            Some(classifier) => classifier
                .classify(summary)
                .map_err(|err| ExpressionError::analysis("emotion", "classifier", format!("{err:#}")))?,
            None => rule_scores(summary),
        };
        let scores = normalize(raw);
        debug!(dominant = scores.dominant().as_str(), "emotion scores computed");
        Ok(scores)
    }
}

/// Raw rule-based scores before normalization.
pub fn rule_scores(summary: &TrackSummary) -> EmotionScores {
    let mut scores = EmotionScores::default();

    if summary.tempo > FAST_TEMPO {
        scores.happy += 0.3;
        scores.energetic += 0.4;
    } else if summary.tempo < SLOW_TEMPO {
        scores.sad += 0.3;
        scores.calm += 0.4;
    }

    if summary.mean_energy > LOUD_ENERGY {
        scores.energetic += 0.3;
        scores.angry += 0.2;
    } else {
        scores.calm += 0.3;
        scores.sad += 0.2;
    }

    if summary.mean_spectral_centroid > BRIGHT_CENTROID_HZ {
        scores.happy += 0.2;
        scores.energetic += 0.2;
    } else {
        scores.sad += 0.2;
        scores.calm += 0.2;
    }

    scores
}

/// Clamp each score to [0, 1] and rescale to sum to one.
///
/// Non-finite scores count as zero; an all-zero vector becomes uniform.
pub fn normalize(raw: EmotionScores) -> EmotionScores {
    let mut clamped = raw;
    for label in EmotionLabel::ALL {
        let value = clamped.get_mut(label);
        if !value.is_finite() {
            warn!(label = label.as_str(), "non-finite emotion score replaced with 0");
            *value = 0.0;
        }
        *value = value.clamp(0.0, 1.0);
    }

    let total = clamped.total();
    if total <= 0.0 {
        return EmotionScores::uniform();
    }
    for label in EmotionLabel::ALL {
        *clamped.get_mut(label) /= total;
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn summary(tempo: f64, mean_energy: f64, centroid: f64) -> TrackSummary {
        TrackSummary {
            tempo,
            mean_energy,
            mean_spectral_centroid: centroid,
            mean_zero_crossing_rate: 0.05,
        }
    }

    #[test]
    fn fast_loud_bright_track_is_energetic() {
        let scores = EmotionScorer::rules()
            .score(&summary(140.0, 0.3, 4000.0))
            .unwrap();
        // happy 0.5, energetic 0.9, angry 0.2 over a total of 1.6
        assert_abs_diff_eq!(scores.happy, 0.5 / 1.6, epsilon = 1e-12);
        assert_abs_diff_eq!(scores.energetic, 0.9 / 1.6, epsilon = 1e-12);
        assert_abs_diff_eq!(scores.angry, 0.2 / 1.6, epsilon = 1e-12);
        assert_eq!(scores.sad, 0.0);
        assert_eq!(scores.calm, 0.0);
    }

    #[test]
    fn slow_quiet_dark_track_is_calm() {
        let scores = EmotionScorer::rules()
            .score(&summary(70.0, 0.05, 1500.0))
            .unwrap();
        // sad 0.7, calm 0.9 over 1.6
        assert_abs_diff_eq!(scores.sad, 0.7 / 1.6, epsilon = 1e-12);
        assert_abs_diff_eq!(scores.calm, 0.9 / 1.6, epsilon = 1e-12);
        assert_eq!(scores.dominant(), EmotionLabel::Calm);
    }

    #[test]
    fn mid_tempo_only_applies_energy_and_brightness_rules() {
        let raw = rule_scores(&summary(100.0, 0.1, 3000.0));
        // thresholds are strict, so 0.1 and 3000 fall on the quiet/dark side
        assert_abs_diff_eq!(raw.calm, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(raw.sad, 0.4, epsilon = 1e-12);
        assert_eq!(raw.happy, 0.0);
    }

    #[test]
    fn all_zero_scores_become_uniform() {
        let scores = normalize(EmotionScores::default());
        assert_eq!(scores, EmotionScores::uniform());
    }

    #[test]
    fn normalization_clamps_and_sums_to_one() {
        let scores = normalize(EmotionScores {
            happy: 4.0,
            sad: -2.0,
            energetic: f64::NAN,
            calm: 0.5,
            angry: 0.5,
        });
        assert_abs_diff_eq!(scores.total(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(scores.happy, 0.5, epsilon = 1e-12);
        assert_eq!(scores.sad, 0.0);
        assert_eq!(scores.energetic, 0.0);
    }

    struct FixedClassifier(EmotionScores);

    impl EmotionClassifier for FixedClassifier {
        fn classify(&self, _summary: &TrackSummary) -> anyhow::Result<EmotionScores> {
            Ok(self.0)
        }
    }

    struct BrokenClassifier;

    impl EmotionClassifier for BrokenClassifier {
        fn classify(&self, _summary: &TrackSummary) -> anyhow::Result<EmotionScores> {
            anyhow::bail!("service unavailable")
        }
    }

    #[test]
    fn classifier_output_is_renormalized() {
        let raw = EmotionScores {
            happy: 2.0,
            sad: 0.0,
            energetic: 1.0,
            calm: 0.0,
            angry: 0.0,
        };
        let scorer = EmotionScorer::with_classifier(Box::new(FixedClassifier(raw)));
        let scores = scorer.score(&summary(100.0, 0.2, 2000.0)).unwrap();
        assert_abs_diff_eq!(scores.happy, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(scores.energetic, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn classifier_failure_is_an_analysis_error() {
        let scorer = EmotionScorer::with_classifier(Box::new(BrokenClassifier));
        let err = scorer.score(&summary(100.0, 0.2, 2000.0)).unwrap_err();
        assert_eq!(err.stage(), "emotion");
    }
}
