//! Global tempo estimation and beat tracking from an onset-strength envelope.

pub const DEFAULT_TEMPO: f64 = 120.0;
const MIN_BPM: f64 = 30.0;
const MAX_BPM: f64 = 300.0;
/// Width of the log-normal tempo prior, in octaves.
const PRIOR_STD_OCTAVES: f64 = 1.0;
/// Envelope peaks below this (mean dB rise across bands) carry no rhythm.
const MIN_ONSET_STRENGTH: f64 = 0.1;
/// Autocorrelation peak must reach this fraction of the zero-lag energy.
const PERIODICITY_FLOOR: f64 = 0.1;
const TIGHTNESS: f64 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TempoEstimate {
    pub bpm: f64,
    pub beat_frames: Vec<usize>,
}

impl TempoEstimate {
    fn fallback() -> Self {
        Self {
            bpm: DEFAULT_TEMPO,
            beat_frames: Vec::new(),
        }
    }
}

/// Half-wave rectified frame-to-frame rise of the dB mel spectrum, averaged over bands.
pub(crate) fn onset_envelope(mel_db: &[Vec<f64>]) -> Vec<f64> {
    let mut envelope = Vec::with_capacity(mel_db.len());
    if mel_db.is_empty() {
        return envelope;
    }
    envelope.push(0.0);
    for pair in mel_db.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        let bands = current.len().min(previous.len()).max(1);
        let rise: f64 = current
            .iter()
            .zip(previous.iter())
            .map(|(curr, prev)| (curr - prev).max(0.0))
            .sum();
        envelope.push(rise / bands as f64);
    }
    envelope
}

pub(crate) fn estimate(envelope: &[f64], frame_rate: f64) -> TempoEstimate {
    let peak = envelope.iter().copied().fold(0.0, f64::max);
    if envelope.len() < 2 || frame_rate <= 0.0 || peak < MIN_ONSET_STRENGTH {
        return TempoEstimate::fallback();
    }

    let min_lag = ((frame_rate * 60.0 / MAX_BPM).ceil() as usize).max(1);
    let max_lag = ((frame_rate * 60.0 / MIN_BPM).floor() as usize).min(envelope.len() - 1);
    if min_lag > max_lag {
        return TempoEstimate::fallback();
    }

    let energy = autocorrelation(envelope, 0);
    if energy <= 0.0 {
        return TempoEstimate::fallback();
    }

    let mut best: Option<(usize, f64, f64)> = None;
    for lag in min_lag..=max_lag {
        let correlation = autocorrelation(envelope, lag);
        let bpm = 60.0 * frame_rate / lag as f64;
        let weighted = correlation * tempo_prior(bpm);
        if best.map_or(true, |(_, _, score)| weighted > score) {
            best = Some((lag, correlation, weighted));
        }
    }

    match best {
        Some((lag, correlation, _)) if correlation >= PERIODICITY_FLOOR * energy => {
            let bpm = 60.0 * frame_rate / lag as f64;
            let beat_frames = track_beats(envelope, lag as f64);
            TempoEstimate { bpm, beat_frames }
        }
        _ => TempoEstimate::fallback(),
    }
}

fn autocorrelation(envelope: &[f64], lag: usize) -> f64 {
    envelope
        .iter()
        .zip(envelope.iter().skip(lag))
        .map(|(a, b)| a * b)
        .sum()
}

fn tempo_prior(bpm: f64) -> f64 {
    let octaves = (bpm.log2() - DEFAULT_TEMPO.log2()) / PRIOR_STD_OCTAVES;
    (-0.5 * octaves * octaves).exp()
}

/// Dynamic-programming beat tracker: each beat is rewarded by onset strength
/// and penalised by how far its spacing strays from `period` (in frames).
fn track_beats(envelope: &[f64], period: f64) -> Vec<usize> {
    let local = scale_by_std(envelope);
    let n = local.len();
    let mut cumulative = vec![0.0; n];
    let mut backlink: Vec<Option<usize>> = vec![None; n];

    let min_gap = ((period / 2.0).round() as usize).max(1);
    let max_gap = ((period * 2.0).round() as usize).max(min_gap);

    for i in 0..n {
        let mut best: Option<(usize, f64)> = None;
        if i >= min_gap {
            let earliest = i.saturating_sub(max_gap);
            for j in earliest..=(i - min_gap) {
                let spacing = ((i - j) as f64 / period).ln();
                let score = cumulative[j] - TIGHTNESS * spacing * spacing;
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((j, score));
                }
            }
        }
        match best {
            Some((j, score)) if score > 0.0 => {
                cumulative[i] = local[i] + score;
                backlink[i] = Some(j);
            }
            _ => cumulative[i] = local[i],
        }
    }

    let tail_start = n.saturating_sub(period.round().max(1.0) as usize);
    let mut last = tail_start;
    for i in tail_start..n {
        if cumulative[i] > cumulative[last] {
            last = i;
        }
    }

    let mut beats = vec![last];
    let mut cursor = last;
    while let Some(previous) = backlink[cursor] {
        beats.push(previous);
        cursor = previous;
    }
    beats.reverse();
    beats
}

/// Divide by the standard deviation without removing the mean, so onset
/// strengths stay non-negative for the beat score.
fn scale_by_std(envelope: &[f64]) -> Vec<f64> {
    let n = envelope.len().max(1) as f64;
    let mean = envelope.iter().sum::<f64>() / n;
    let variance = envelope.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    if std_dev <= f64::EPSILON {
        return envelope.to_vec();
    }
    envelope.iter().map(|v| v / std_dev).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click_envelope(frames: usize, period: usize) -> Vec<f64> {
        (0..frames)
            .map(|i| if i % period == 0 { 5.0 } else { 0.0 })
            .collect()
    }

    #[test]
    fn flat_envelope_falls_back_to_default() {
        let estimate = estimate(&vec![0.0; 400], 86.0);
        assert_eq!(estimate.bpm, DEFAULT_TEMPO);
        assert!(estimate.beat_frames.is_empty());
    }

    #[test]
    fn single_onset_has_no_periodicity() {
        let mut envelope = vec![0.0; 400];
        envelope[3] = 12.0;
        let estimate = estimate(&envelope, 86.0);
        assert_eq!(estimate.bpm, DEFAULT_TEMPO);
    }

    #[test]
    fn periodic_clicks_recover_tempo() {
        // 43 frames per beat at 86 frames/s is exactly 120 BPM
        let envelope = click_envelope(860, 43);
        let estimate = estimate(&envelope, 86.0);
        assert!((estimate.bpm - 120.0).abs() < 1.0, "bpm={}", estimate.bpm);
        assert!(estimate.beat_frames.len() >= 15);
        for pair in estimate.beat_frames.windows(2) {
            assert_eq!(pair[1] - pair[0], 43);
        }
    }

    #[test]
    fn onset_envelope_only_counts_rises() {
        let mel = vec![vec![0.0, 0.0], vec![10.0, -10.0], vec![0.0, 0.0]];
        let envelope = onset_envelope(&mel);
        assert_eq!(envelope, vec![0.0, 5.0, 5.0]);
    }

    #[test]
    fn scaling_keeps_offset_and_sign() {
        let scaled = scale_by_std(&[1.0, 3.0, 1.0, 3.0]);
        // std is 1, so values are unchanged rather than centred around zero
        assert_eq!(scaled, vec![1.0, 3.0, 1.0, 3.0]);

        let scaled = scale_by_std(&[2.0, 6.0]);
        assert_eq!(scaled, vec![1.0, 3.0]);
        assert!(scaled.iter().all(|&v| v >= 0.0));

        assert_eq!(scale_by_std(&[4.0; 5]), vec![4.0; 5]);
    }
}
