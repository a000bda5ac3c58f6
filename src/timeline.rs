use tracing::debug;

use crate::features::AudioFeatures;
use crate::types::TimelineSample;

/// Resample frame-indexed features onto a fixed `resolution` (seconds).
///
/// Produces `floor(duration / resolution)` samples at `i * resolution`, each
/// taking the per-frame values of frame `floor(t / (duration / frames))`.
/// Tempo and emotion scores are copied into every sample.
pub fn build_timeline(features: &AudioFeatures, resolution: f64) -> Vec<TimelineSample> {
    let frame_count = features.frame_count();
    let duration = features.duration;
    if frame_count == 0 || duration <= 0.0 || !(resolution > 0.0) || !resolution.is_finite() {
        return Vec::new();
    }

    let sample_count = (duration / resolution).floor() as usize;
    let seconds_per_frame = duration / frame_count as f64;

    let timeline: Vec<TimelineSample> = (0..sample_count)
        .map(|i| {
            let timestamp = i as f64 * resolution;
            let frame = ((timestamp / seconds_per_frame).floor() as usize).min(frame_count - 1);
            TimelineSample {
                timestamp,
                tempo: features.tempo,
                energy: features.energy[frame] as f64,
                spectral_centroid: features.spectral_centroid[frame] as f64,
                pitch: features.pitch.get(frame).copied().unwrap_or(0.0) as f64,
                emotion_scores: features.emotion_scores,
            }
        })
        .collect();

    debug!(
        samples = timeline.len(),
        resolution, frame_count, "built feature timeline"
    );
    timeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::TrackSummary;
    use crate::types::EmotionScores;
    use ndarray::Array2;

    fn features(duration: f64, energy: Vec<f32>) -> AudioFeatures {
        let frames = energy.len();
        AudioFeatures {
            duration,
            tempo: 128.0,
            beats: Vec::new(),
            pitch: vec![220.0; frames],
            spectral_centroid: vec![0.5; frames],
            zero_crossing_rate: vec![0.1; frames],
            mfcc: Array2::zeros((frames, 13)),
            timestamps: (0..frames).map(|i| i as f64 * duration / frames as f64).collect(),
            sample_rate: 44_100,
            hop_length: 512,
            summary: TrackSummary::default(),
            emotion_scores: EmotionScores::uniform(),
            energy,
        }
    }

    #[test]
    fn sample_count_is_floor_of_duration_over_resolution() {
        let energy: Vec<f32> = (0..173).map(|i| i as f32 / 172.0).collect();
        let timeline = build_timeline(&features(2.0, energy), 0.1);
        assert_eq!(timeline.len(), 20);
        for (i, sample) in timeline.iter().enumerate() {
            assert_eq!(sample.timestamp, i as f64 * 0.1);
            assert_eq!(sample.tempo, 128.0);
            assert_eq!(sample.emotion_scores, EmotionScores::uniform());
        }
    }

    #[test]
    fn picks_frame_by_proportional_index() {
        // 10 frames over 1 second: frame i covers [0.1 i, 0.1 (i + 1))
        let energy: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let timeline = build_timeline(&features(1.0, energy), 0.25);
        let picked: Vec<f64> = timeline.iter().map(|s| s.energy).collect();
        assert_eq!(picked, vec![0.0, 2.0, 5.0, 7.0]);
    }

    #[test]
    fn coarse_resolution_yields_at_most_one_sample() {
        let timeline = build_timeline(&features(1.0, vec![0.5; 10]), 1.0);
        assert_eq!(timeline.len(), 1);
        let empty = build_timeline(&features(1.0, vec![0.5; 10]), 2.5);
        assert!(empty.is_empty());
    }

    #[test]
    fn degenerate_inputs_give_empty_timeline() {
        assert!(build_timeline(&features(1.0, Vec::new()), 0.1).is_empty());
        assert!(build_timeline(&features(1.0, vec![0.5; 4]), 0.0).is_empty());
        assert!(build_timeline(&features(1.0, vec![0.5; 4]), f64::NAN).is_empty());
    }
}
