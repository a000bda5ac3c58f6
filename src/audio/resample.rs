use anyhow::{ensure, Result};

/// Linearly resample `samples` from `source_rate` to `target_rate`.
pub fn linear_resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    ensure!(source_rate > 0, "source sample rate must be positive");
    ensure!(target_rate > 0, "target sample rate must be positive");
    if samples.is_empty() || source_rate == target_rate {
        return Ok(samples.to_vec());
    }
    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = ((samples.len() as f64) * ratio).round().max(1.0) as usize;
    let last_index = samples.len() - 1;
    let output = (0..output_len)
        .map(|i| {
            let position = i as f64 / ratio;
            let left = (position.floor() as usize).min(last_index);
            let right = (left + 1).min(last_index);
            let t = (position - left as f64) as f32;
            samples[left] * (1.0 - t) + samples[right] * t
        })
        .collect();
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::linear_resample;

    #[test]
    fn preserves_constant_signal_after_resample() {
        let input = vec![0.5; 480];
        let resampled = linear_resample(&input, 48_000, 44_100).unwrap();
        assert_eq!(resampled.len(), 441);
        assert!(resampled.iter().all(|&sample| (sample - 0.5).abs() < 1e-6));
    }

    #[test]
    fn keeps_duration_when_upsampling() {
        let input: Vec<f32> = (0..22_050).map(|i| i as f32 / 22_050.0).collect();
        let resampled = linear_resample(&input, 22_050, 44_100).unwrap();
        assert_eq!(resampled.len(), 44_100);
        assert!((resampled[2] - input[1]).abs() < 1e-6);
    }

    #[test]
    fn rejects_zero_rates() {
        assert!(linear_resample(&[0.1, 0.2], 0, 44_100).is_err());
        assert!(linear_resample(&[0.1, 0.2], 44_100, 0).is_err());
    }
}
