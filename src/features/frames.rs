//! Time-domain per-frame measurements.

/// Analysis window for frame `index`, starting at `index * hop_length` and
/// zero-padded past the end of the signal.
fn frame_window(
    samples: &[f32],
    index: usize,
    hop_length: usize,
    frame_length: usize,
) -> impl Iterator<Item = f32> + '_ {
    let start = index * hop_length;
    (0..frame_length).map(move |offset| samples.get(start + offset).copied().unwrap_or(0.0))
}

/// Root-mean-square amplitude per frame.
pub(crate) fn rms(
    samples: &[f32],
    frame_count: usize,
    hop_length: usize,
    frame_length: usize,
) -> Vec<f32> {
    (0..frame_count)
        .map(|index| {
            let sum: f64 = frame_window(samples, index, hop_length, frame_length)
                .map(|s| (s as f64) * (s as f64))
                .sum();
            (sum / frame_length.max(1) as f64).sqrt() as f32
        })
        .collect()
}

/// Fraction of adjacent sample pairs that change sign, per frame.
pub(crate) fn zero_crossing_rate(
    samples: &[f32],
    frame_count: usize,
    hop_length: usize,
    frame_length: usize,
) -> Vec<f32> {
    (0..frame_count)
        .map(|index| {
            let window: Vec<f32> = frame_window(samples, index, hop_length, frame_length).collect();
            if window.len() < 2 {
                return 0.0;
            }
            let crossings = window
                .windows(2)
                .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
                .count();
            crossings as f32 / (window.len() - 1) as f32
        })
        .collect()
}

/// Divide by the series maximum so the peak becomes 1.0.
///
/// A series whose maximum is not positive is returned as zeros.
pub(crate) fn normalize_by_max(values: &[f32]) -> Vec<f32> {
    let peak = values.iter().copied().fold(0.0_f32, f32::max);
    if peak <= 0.0 || !peak.is_finite() {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| v / peak).collect()
}

pub(crate) fn mean(values: &[f32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}
