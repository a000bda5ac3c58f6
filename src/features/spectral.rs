use anyhow::{anyhow, ensure, Result};
use aus::analysis;
use aus::analysis::mel::MelFilterbank;
use aus::spectrum;
use aus::WindowType;
use ndarray::Array2;

const MIN_MEL_FREQ: f64 = 20.0;
const PITCH_FMIN: f64 = 150.0;
const PITCH_FMAX: f64 = 4000.0;
const POWER_FLOOR: f64 = 1e-10;
const TOP_DB: f64 = 80.0;

pub(crate) struct SpectrogramBundle {
    pub magnitude: Vec<Vec<f64>>,
    pub mel: Vec<Vec<f64>>,
    pub freqs: Vec<f64>,
}

impl SpectrogramBundle {
    pub fn frame_count(&self) -> usize {
        self.magnitude.len()
    }
}

pub(crate) fn compute_spectrograms(
    samples: &[f32],
    sample_rate: u32,
    fft_size: usize,
    hop_size: usize,
    mel_bands: usize,
) -> Result<SpectrogramBundle> {
    ensure!(fft_size > 0 && hop_size > 0, "fft and hop sizes must be positive");
    let mut audio: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
    if audio.len() < fft_size {
        audio.resize(fft_size, 0.0);
    }

    let stft = spectrum::rstft(&audio, fft_size, hop_size, WindowType::Hanning);
    let (magnitude, _) = spectrum::complex_to_polar_rstft(&stft);
    ensure!(!magnitude.is_empty(), "signal produced no analysis frames");
    let power = analysis::make_power_spectrogram(&magnitude);

    let freqs = spectrum::rfftfreq(fft_size, sample_rate);
    let filterbank = MelFilterbank::new(
        MIN_MEL_FREQ,
        sample_rate as f64 / 2.0,
        mel_bands,
        &freqs,
        true,
    );
    let mel = analysis::mel::make_mel_spectrogram(&power, &filterbank);

    Ok(SpectrogramBundle {
        magnitude,
        mel,
        freqs,
    })
}

/// Magnitude-weighted mean frequency per frame, in Hz.
pub(crate) fn spectral_centroid(magnitude: &[Vec<f64>], freqs: &[f64]) -> Vec<f32> {
    magnitude
        .iter()
        .map(|frame| {
            let (weighted, total) = frame
                .iter()
                .zip(freqs.iter())
                .fold((0.0, 0.0), |(weighted, total), (&mag, &freq)| {
                    (weighted + mag * freq, total + mag)
                });
            if total > 0.0 {
                (weighted / total) as f32
            } else {
                0.0
            }
        })
        .collect()
}

/// Frequency of the strongest bin inside the pitch band, 0 when unvoiced.
pub(crate) fn dominant_pitch(magnitude: &[Vec<f64>], freqs: &[f64]) -> Vec<f32> {
    let bin_width = match freqs {
        [first, second, ..] => second - first,
        _ => return vec![0.0; magnitude.len()],
    };
    let lower = freqs.iter().position(|&f| f >= PITCH_FMIN).unwrap_or(freqs.len());
    let upper = freqs
        .iter()
        .rposition(|&f| f <= PITCH_FMAX)
        .map_or(0, |idx| idx + 1);

    magnitude
        .iter()
        .map(|frame| {
            let end = upper.min(frame.len());
            if lower >= end {
                return 0.0;
            }
            let mut peak = lower;
            for bin in lower..end {
                if frame[bin] > frame[peak] {
                    peak = bin;
                }
            }
            if frame[peak] <= 0.0 {
                return 0.0;
            }
            let offset = parabolic_offset(frame, peak);
            ((freqs[peak] + offset * bin_width).max(0.0)) as f32
        })
        .collect()
}

fn parabolic_offset(frame: &[f64], peak: usize) -> f64 {
    if peak == 0 || peak + 1 >= frame.len() {
        return 0.0;
    }
    let (left, centre, right) = (frame[peak - 1], frame[peak], frame[peak + 1]);
    let denominator = left - 2.0 * centre + right;
    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }
    (0.5 * (left - right) / denominator).clamp(-0.5, 0.5)
}

/// Mel power converted to decibels relative to the loudest cell, floored at -80 dB.
pub(crate) fn mel_to_db(mel: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let to_db = |power: f64| 10.0 * power.max(POWER_FLOOR).log10();
    let reference = mel
        .iter()
        .flat_map(|frame| frame.iter())
        .copied()
        .fold(POWER_FLOOR, f64::max);
    let floor = to_db(reference) - TOP_DB;
    mel.iter()
        .map(|frame| frame.iter().map(|&p| to_db(p).max(floor)).collect())
        .collect()
}

pub(crate) fn mfcc(mel: &[Vec<f64>], count: usize) -> Result<Array2<f32>> {
    if mel.is_empty() || count == 0 {
        return Ok(Array2::zeros((mel.len(), count)));
    }
    // silent frames would otherwise hit log(0)
    let floored: Vec<Vec<f64>> = mel
        .iter()
        .map(|frame| frame.iter().map(|&p| p.max(POWER_FLOOR)).collect())
        .collect();
    let coefficients = analysis::mel::mfcc_spectrogram(&floored, count, None);
    array_from_rows(&coefficients)
}

fn array_from_rows(data: &[Vec<f64>]) -> Result<Array2<f32>> {
    let rows = data.len();
    let cols = data.first().map_or(0, Vec::len);
    let mut flat = Vec::with_capacity(rows * cols);
    for row in data {
        ensure!(row.len() == cols, "ragged coefficient matrix");
        flat.extend(row.iter().map(|v| *v as f32));
    }
    Array2::from_shape_vec((rows, cols), flat).map_err(|err| anyhow!(err))
}
