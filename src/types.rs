//! Core types for the songface expression pipeline

use serde::{Deserialize, Serialize};

/// Raw audio signal (mono, f32 samples)
#[derive(Debug, Clone)]
pub struct AudioSignal {
    /// Audio samples, normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g., 44100)
    pub sample_rate: u32,
}

impl AudioSignal {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Length of the signal in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// One analysis frame of a track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureFrame {
    pub index: usize,
    pub time: f64, // seconds
    pub tempo: f64,
    pub energy: f32,
    pub spectral_centroid: f32,
    pub pitch: f32, // Hz, 0 = unvoiced
    pub zero_crossing_rate: f32,
}

/// The five emotion labels scored per track, in serialization order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Happy,
    Sad,
    Energetic,
    Calm,
    Angry,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 5] = [
        EmotionLabel::Happy,
        EmotionLabel::Sad,
        EmotionLabel::Energetic,
        EmotionLabel::Calm,
        EmotionLabel::Angry,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EmotionLabel::Happy => "happy",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Energetic => "energetic",
            EmotionLabel::Calm => "calm",
            EmotionLabel::Angry => "angry",
        }
    }
}

/// Track-global emotion scores; validated instances sum to 1
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EmotionScores {
    pub happy: f64,
    pub sad: f64,
    pub energetic: f64,
    pub calm: f64,
    pub angry: f64,
}

impl EmotionScores {
    pub const fn uniform() -> Self {
        Self {
            happy: 0.2,
            sad: 0.2,
            energetic: 0.2,
            calm: 0.2,
            angry: 0.2,
        }
    }

    pub fn get(&self, label: EmotionLabel) -> f64 {
        match label {
            EmotionLabel::Happy => self.happy,
            EmotionLabel::Sad => self.sad,
            EmotionLabel::Energetic => self.energetic,
            EmotionLabel::Calm => self.calm,
            EmotionLabel::Angry => self.angry,
        }
    }

    pub fn get_mut(&mut self, label: EmotionLabel) -> &mut f64 {
        match label {
            EmotionLabel::Happy => &mut self.happy,
            EmotionLabel::Sad => &mut self.sad,
            EmotionLabel::Energetic => &mut self.energetic,
            EmotionLabel::Calm => &mut self.calm,
            EmotionLabel::Angry => &mut self.angry,
        }
    }

    pub fn total(&self) -> f64 {
        EmotionLabel::ALL.iter().map(|&label| self.get(label)).sum()
    }

    /// Highest scoring label; ties resolve to the earlier label.
    pub fn dominant(&self) -> EmotionLabel {
        let mut best = EmotionLabel::Happy;
        for label in EmotionLabel::ALL {
            if self.get(label) > self.get(best) {
                best = label;
            }
        }
        best
    }
}

/// A fixed-resolution instant handed to the expression mapper
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelineSample {
    pub timestamp: f64,
    pub tempo: f64,
    pub energy: f64,
    pub spectral_centroid: f64,
    pub pitch: f64,
    pub emotion_scores: EmotionScores,
}

/// Declared name, playback id and range of one expression parameter
#[derive(Debug, Clone, Copy)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub curve_id: &'static str,
    pub min: f64,
    pub max: f64,
    pub neutral: f64,
}

impl ParameterSpec {
    const fn unit(name: &'static str, curve_id: &'static str, neutral: f64) -> Self {
        Self {
            name,
            curve_id,
            min: 0.0,
            max: 1.0,
            neutral,
        }
    }

    const fn signed(name: &'static str, curve_id: &'static str) -> Self {
        Self {
            name,
            curve_id,
            min: -1.0,
            max: 1.0,
            neutral: 0.0,
        }
    }
}

pub const PARAMETER_COUNT: usize = 10;

/// Parameters in declaration order. Export order follows this table.
pub const PARAMETERS: [ParameterSpec; PARAMETER_COUNT] = [
    ParameterSpec::unit("eye_open", "ParamEyeLOpen", 0.8),
    ParameterSpec::unit("eye_open_r", "ParamEyeROpen", 0.8),
    ParameterSpec::unit("eyebrow_height", "ParamEyeBrowLY", 0.5),
    ParameterSpec::unit("eyebrow_height_r", "ParamEyeBrowRY", 0.5),
    ParameterSpec::unit("mouth_open", "ParamMouthOpenY", 0.2),
    ParameterSpec::unit("mouth_form", "ParamMouthForm", 0.3),
    ParameterSpec::unit("cheek", "ParamCheek", 0.0),
    ParameterSpec::signed("body_angle_x", "ParamBodyAngleX"),
    ParameterSpec::signed("body_angle_y", "ParamBodyAngleY"),
    ParameterSpec::unit("breath", "ParamBreath", 0.5),
];

/// Facial-animation parameters for one keyframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpressionParameters {
    pub eye_open: f64,
    pub eye_open_r: f64,
    pub eyebrow_height: f64,
    pub eyebrow_height_r: f64,
    pub mouth_open: f64,
    pub mouth_form: f64,
    pub cheek: f64,
    pub body_angle_x: f64,
    pub body_angle_y: f64,
    pub breath: f64,
}

impl Default for ExpressionParameters {
    fn default() -> Self {
        Self::neutral()
    }
}

impl ExpressionParameters {
    pub fn neutral() -> Self {
        let mut values = [0.0; PARAMETER_COUNT];
        for (value, spec) in values.iter_mut().zip(PARAMETERS.iter()) {
            *value = spec.neutral;
        }
        Self::from_values(values)
    }

    pub fn values(&self) -> [f64; PARAMETER_COUNT] {
        [
            self.eye_open,
            self.eye_open_r,
            self.eyebrow_height,
            self.eyebrow_height_r,
            self.mouth_open,
            self.mouth_form,
            self.cheek,
            self.body_angle_x,
            self.body_angle_y,
            self.breath,
        ]
    }

    pub fn from_values(values: [f64; PARAMETER_COUNT]) -> Self {
        Self {
            eye_open: values[0],
            eye_open_r: values[1],
            eyebrow_height: values[2],
            eyebrow_height_r: values[3],
            mouth_open: values[4],
            mouth_form: values[5],
            cheek: values[6],
            body_angle_x: values[7],
            body_angle_y: values[8],
            breath: values[9],
        }
    }

    /// Coerce every parameter into its declared range.
    ///
    /// Non-finite values fall back to the neutral value before clamping.
    /// Returns the corrected parameters and how many fields had to change.
    pub fn validated(&self) -> (Self, usize) {
        let mut corrected = 0;
        let mut values = self.values();
        for (value, spec) in values.iter_mut().zip(PARAMETERS.iter()) {
            let coerced = if value.is_finite() {
                value.clamp(spec.min, spec.max)
            } else {
                spec.neutral
            };
            if coerced != *value {
                corrected += 1;
                *value = coerced;
            }
        }
        (Self::from_values(values), corrected)
    }

    pub fn is_within_range(&self) -> bool {
        self.values()
            .iter()
            .zip(PARAMETERS.iter())
            .all(|(value, spec)| (spec.min..=spec.max).contains(value))
    }
}

/// One (timestamp, parameters) pair of the output timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub timestamp: f64,
    pub parameters: ExpressionParameters,
}

/// Generation settings recorded alongside the keyframes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceMetadata {
    pub time_resolution: f64,
    pub smoothing_enabled: bool,
    pub total_keyframes: usize,
}

/// Finished expression timeline for one track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionSequence {
    pub duration: f64,
    pub tempo: f64,
    pub emotion_scores: EmotionScores,
    pub expressions: Vec<Keyframe>,
    pub metadata: SequenceMetadata,
}

impl ExpressionSequence {
    pub fn new(
        duration: f64,
        tempo: f64,
        emotion_scores: EmotionScores,
        expressions: Vec<Keyframe>,
        time_resolution: f64,
        smoothing_enabled: bool,
    ) -> Self {
        let total_keyframes = expressions.len();
        Self {
            duration,
            tempo,
            emotion_scores,
            expressions,
            metadata: SequenceMetadata {
                time_resolution,
                smoothing_enabled,
                total_keyframes,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }
}
