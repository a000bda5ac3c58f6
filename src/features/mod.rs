mod frames;
mod spectral;
mod tempo;

use ndarray::Array2;
use tracing::{debug, info};

use crate::emotion::{EmotionScorer, TrackSummary};
use crate::error::{ExpressionError, Result};
use crate::types::{AudioSignal, EmotionScores, FeatureFrame};

pub use tempo::DEFAULT_TEMPO as DEFAULT_BPM;

const UNNAMED_INPUT: &str = "<in-memory signal>";

/// Framing parameters for feature extraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractorSettings {
    pub hop_length: usize,
    pub frame_length: usize,
    pub mfcc_count: usize,
    pub mel_bands: usize,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            hop_length: 512,
            frame_length: 2048,
            mfcc_count: 13,
            mel_bands: 128,
        }
    }
}

/// Everything extracted from one track. Per-frame vectors share indexing.
#[derive(Debug, Clone)]
pub struct AudioFeatures {
    pub duration: f64,
    pub tempo: f64,
    /// Beat positions in seconds
    pub beats: Vec<f64>,
    pub pitch: Vec<f32>,
    pub energy: Vec<f32>,
    pub spectral_centroid: Vec<f32>,
    pub zero_crossing_rate: Vec<f32>,
    /// frames x coefficients
    pub mfcc: Array2<f32>,
    pub timestamps: Vec<f64>,
    pub sample_rate: u32,
    pub hop_length: usize,
    pub summary: TrackSummary,
    pub emotion_scores: EmotionScores,
}

impl AudioFeatures {
    pub fn frame_count(&self) -> usize {
        self.energy.len()
    }

    /// Frames per second of the per-frame arrays.
    pub fn frame_rate(&self) -> f64 {
        self.sample_rate as f64 / self.hop_length.max(1) as f64
    }

    pub fn frame(&self, index: usize) -> Option<FeatureFrame> {
        if index >= self.frame_count() {
            return None;
        }
        Some(FeatureFrame {
            index,
            time: self.timestamps[index],
            tempo: self.tempo,
            energy: self.energy[index],
            spectral_centroid: self.spectral_centroid[index],
            pitch: self.pitch.get(index).copied().unwrap_or(0.0),
            zero_crossing_rate: self.zero_crossing_rate[index],
        })
    }

    pub fn frames(&self) -> impl Iterator<Item = FeatureFrame> + '_ {
        (0..self.frame_count()).filter_map(move |index| self.frame(index))
    }
}

/// Turns a waveform into framed acoustic features and track-level emotion scores.
#[derive(Default)]
pub struct FeatureExtractor {
    settings: ExtractorSettings,
    scorer: EmotionScorer,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: ExtractorSettings) -> Self {
        Self {
            settings,
            scorer: EmotionScorer::default(),
        }
    }

    pub fn with_scorer(mut self, scorer: EmotionScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    pub fn extract(&self, signal: &AudioSignal) -> Result<AudioFeatures> {
        self.extract_labeled(signal, UNNAMED_INPUT)
    }

    /// Extract features, naming `input` in any error raised.
    pub fn extract_labeled(&self, signal: &AudioSignal, input: &str) -> Result<AudioFeatures> {
        let fail = |reason: String| ExpressionError::analysis("features", input, reason);
        let ExtractorSettings {
            hop_length,
            frame_length,
            mfcc_count,
            mel_bands,
        } = self.settings;

        if signal.sample_rate == 0 {
            return Err(fail("sample rate must be positive".to_string()));
        }
        if signal.samples.is_empty() {
            return Err(fail("audio signal is empty".to_string()));
        }
        if hop_length == 0 || frame_length == 0 {
            return Err(fail("hop and frame length must be positive".to_string()));
        }
        if signal.samples.iter().any(|s| !s.is_finite()) {
            return Err(fail("audio signal contains non-finite samples".to_string()));
        }

        let spectrograms = spectral::compute_spectrograms(
            &signal.samples,
            signal.sample_rate,
            frame_length,
            hop_length,
            mel_bands,
        )
        .map_err(|err| fail(format!("{err:#}")))?;
        let frame_count = spectrograms.frame_count();

        let raw_energy = frames::rms(&signal.samples, frame_count, hop_length, frame_length);
        let zero_crossing_rate =
            frames::zero_crossing_rate(&signal.samples, frame_count, hop_length, frame_length);
        let raw_centroid =
            spectral::spectral_centroid(&spectrograms.magnitude, &spectrograms.freqs);
        let pitch = spectral::dominant_pitch(&spectrograms.magnitude, &spectrograms.freqs);
        let mfcc =
            spectral::mfcc(&spectrograms.mel, mfcc_count).map_err(|err| fail(format!("{err:#}")))?;

        let frame_rate = signal.sample_rate as f64 / hop_length as f64;
        let envelope = tempo::onset_envelope(&spectral::mel_to_db(&spectrograms.mel));
        let estimate = tempo::estimate(&envelope, frame_rate);
        let beats = estimate
            .beat_frames
            .iter()
            .map(|&frame| frame as f64 / frame_rate)
            .collect();

        let summary = TrackSummary {
            tempo: estimate.bpm,
            mean_energy: frames::mean(&raw_energy),
            mean_spectral_centroid: frames::mean(&raw_centroid),
            mean_zero_crossing_rate: frames::mean(&zero_crossing_rate),
        };
        let emotion_scores = self.scorer.score(&summary).map_err(|err| match err {
            ExpressionError::Analysis { stage, reason, .. } => {
                ExpressionError::analysis(stage, input, reason)
            }
            other => other,
        })?;

        let timestamps = (0..frame_count).map(|i| i as f64 / frame_rate).collect();
        let features = AudioFeatures {
            duration: signal.duration(),
            tempo: estimate.bpm,
            beats,
            pitch,
            energy: frames::normalize_by_max(&raw_energy),
            spectral_centroid: frames::normalize_by_max(&raw_centroid),
            zero_crossing_rate,
            mfcc,
            timestamps,
            sample_rate: signal.sample_rate,
            hop_length,
            summary,
            emotion_scores,
        };

        debug!(
            frames = frame_count,
            beats = features.beats.len(),
            mean_energy = summary.mean_energy,
            mean_centroid_hz = summary.mean_spectral_centroid,
            "feature extraction details"
        );
        info!(
            input,
            duration_secs = features.duration,
            tempo = features.tempo,
            "audio analysis complete"
        );
        Ok(features)
    }
}
