use super::ExpressionMapper;
use crate::error::Result;
use crate::types::{ExpressionParameters, TimelineSample};

const HIGH_ENERGY: f64 = 0.7;
const LOW_ENERGY: f64 = 0.3;
const STRONG_EMOTION: f64 = 0.5;
const FAST_TEMPO: f64 = 120.0;
/// Portion of each beat during which the eyes close.
const BLINK_PHASE: f64 = 0.1;
const SWAY: f64 = 0.1;

/// Deterministic local mapper driven by energy, emotion and beat phase.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleMapper;

impl RuleMapper {
    pub fn new() -> Self {
        Self
    }

    pub fn parameters_for(&self, sample: &TimelineSample) -> ExpressionParameters {
        let mut params = ExpressionParameters::neutral();
        let emotions = &sample.emotion_scores;

        if sample.energy > HIGH_ENERGY {
            params.eye_open = 1.0;
            params.eye_open_r = 1.0;
            params.mouth_open = 0.5 + (sample.energy - HIGH_ENERGY) * 0.5;
        } else if sample.energy < LOW_ENERGY {
            params.eye_open = 0.6;
            params.eye_open_r = 0.6;
            params.mouth_open = 0.1;
        }

        if emotions.happy > STRONG_EMOTION {
            params.mouth_form = 0.7;
            params.eyebrow_height = 0.6;
            params.eyebrow_height_r = 0.6;
            params.cheek = 0.3;
        }

        if emotions.sad > STRONG_EMOTION {
            params.eyebrow_height = 0.3;
            params.eyebrow_height_r = 0.3;
            params.mouth_form = 0.2;
            params.eye_open = 0.6;
            params.eye_open_r = 0.6;
        }

        if emotions.energetic > STRONG_EMOTION {
            // sway direction flips every half second
            let half_seconds = (sample.timestamp * 2.0).floor() as i64;
            params.body_angle_x = if half_seconds % 2 == 0 { SWAY } else { -SWAY };
            params.breath = 0.8;
        }

        if sample.tempo > FAST_TEMPO {
            let beat_phase = (sample.timestamp * sample.tempo / 60.0).rem_euclid(1.0);
            if beat_phase < BLINK_PHASE {
                params.eye_open = 0.2;
                params.eye_open_r = 0.2;
            }
        }

        params
    }
}

impl ExpressionMapper for RuleMapper {
    fn name(&self) -> &'static str {
        "rules"
    }

    fn map(&self, sample: &TimelineSample) -> Result<ExpressionParameters> {
        Ok(self.parameters_for(sample))
    }
}
