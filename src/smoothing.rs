use crate::types::{ExpressionParameters, Keyframe, PARAMETER_COUNT};

pub const DEFAULT_WINDOW: usize = 3;

/// Centered moving average over each parameter.
///
/// Keyframe `i` averages `[i - w/2, i + w/2]`, truncated at the sequence
/// edges rather than padded. Timestamps are left untouched. Sequences shorter
/// than the window are returned unchanged.
pub fn smooth(keyframes: &[Keyframe], window_size: usize) -> Vec<Keyframe> {
    if keyframes.len() < window_size || window_size < 2 {
        return keyframes.to_vec();
    }
    let radius = window_size / 2;
    let values: Vec<[f64; PARAMETER_COUNT]> =
        keyframes.iter().map(|k| k.parameters.values()).collect();

    keyframes
        .iter()
        .enumerate()
        .map(|(idx, keyframe)| {
            let start = idx.saturating_sub(radius);
            let end = (idx + radius + 1).min(keyframes.len());
            let count = (end - start) as f64;
            let mut averaged = [0.0; PARAMETER_COUNT];
            for row in &values[start..end] {
                for (sum, value) in averaged.iter_mut().zip(row.iter()) {
                    *sum += value;
                }
            }
            averaged.iter_mut().for_each(|sum| *sum /= count);
            Keyframe {
                timestamp: keyframe.timestamp,
                parameters: ExpressionParameters::from_values(averaged),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn keyframes(mouth: &[f64]) -> Vec<Keyframe> {
        mouth
            .iter()
            .enumerate()
            .map(|(i, &value)| Keyframe {
                timestamp: i as f64 * 0.1,
                parameters: ExpressionParameters {
                    mouth_open: value,
                    ..ExpressionParameters::neutral()
                },
            })
            .collect()
    }

    #[test]
    fn boundary_frames_use_truncated_window() {
        let input = keyframes(&[0.0, 0.3, 0.6, 0.9, 0.6, 0.3, 0.0]);
        let smoothed = smooth(&input, 3);
        assert_eq!(smoothed.len(), 7);
        // index 0 averages indices 0 and 1 only
        assert_abs_diff_eq!(smoothed[0].parameters.mouth_open, 0.15, epsilon = 1e-12);
        assert_abs_diff_eq!(smoothed[3].parameters.mouth_open, 0.7, epsilon = 1e-12);
        assert_abs_diff_eq!(smoothed[6].parameters.mouth_open, 0.15, epsilon = 1e-12);
    }

    #[test]
    fn timestamps_are_preserved() {
        let input = keyframes(&[0.1, 0.9, 0.1, 0.9, 0.1]);
        let smoothed = smooth(&input, 3);
        for (before, after) in input.iter().zip(smoothed.iter()) {
            assert_eq!(before.timestamp, after.timestamp);
        }
    }

    #[test]
    fn short_sequences_are_unchanged() {
        let input = keyframes(&[0.1, 0.9]);
        assert_eq!(smooth(&input, 3), input);
        assert_eq!(smooth(&input, 5), input);
    }

    #[test]
    fn repeated_smoothing_keeps_flattening_oscillation() {
        let input = keyframes(&[0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        let spread = |frames: &[Keyframe]| {
            let values: Vec<f64> = frames.iter().map(|k| k.parameters.mouth_open).collect();
            values[2..6].iter().cloned().fold(f64::MIN, f64::max)
                - values[2..6].iter().cloned().fold(f64::MAX, f64::min)
        };
        let once = smooth(&input, 3);
        let twice = smooth(&once, 3);
        assert!(spread(&once) < spread(&input));
        assert!(spread(&twice) < spread(&once));
    }

    #[test]
    fn constant_parameters_survive_smoothing() {
        let input = keyframes(&[0.4; 6]);
        let smoothed = smooth(&input, 3);
        for keyframe in smoothed {
            assert_abs_diff_eq!(keyframe.parameters.mouth_open, 0.4, epsilon = 1e-12);
            assert_abs_diff_eq!(keyframe.parameters.eye_open, 0.8, epsilon = 1e-12);
        }
    }
}
