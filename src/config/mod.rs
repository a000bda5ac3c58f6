use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::error::{ExpressionError, Result};
use crate::features::ExtractorSettings;
use crate::mapping::MapperConfig;
use crate::pipeline::MapperFailurePolicy;
use crate::smoothing::DEFAULT_WINDOW;

pub const MIN_TIME_RESOLUTION: f64 = 0.01;
pub const MAX_TIME_RESOLUTION: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub enabled: bool,
    pub window_size: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_size: DEFAULT_WINDOW,
        }
    }
}

/// Settings for one generation run. Every field has a default, so a config
/// file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sample_rate: u32,
    pub hop_length: usize,
    pub frame_length: usize,
    pub max_duration_secs: f64,
    pub time_resolution: f64,
    pub smoothing: SmoothingConfig,
    pub workers: usize,
    pub cache_capacity: Option<usize>,
    pub failure_policy: MapperFailurePolicy,
    pub mapper: MapperConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            hop_length: 512,
            frame_length: 2048,
            max_duration_secs: 300.0,
            time_resolution: 0.1,
            smoothing: SmoothingConfig::default(),
            workers: 4,
            cache_capacity: None,
            failure_policy: MapperFailurePolicy::default(),
            mapper: MapperConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| ExpressionError::Config(format!("failed to parse config JSON: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))
            .map_err(|err| ExpressionError::Config(format!("{err:#}")))?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        check(self.sample_rate > 0, "sample rate must be positive")?;
        check(
            self.hop_length > 0 && self.frame_length > 0,
            "hop and frame length must be positive",
        )?;
        check(
            self.max_duration_secs.is_finite() && self.max_duration_secs > 0.0,
            "max duration must be a positive number of seconds",
        )?;
        check(
            (MIN_TIME_RESOLUTION..=MAX_TIME_RESOLUTION).contains(&self.time_resolution),
            format!(
                "time resolution must be within [{MIN_TIME_RESOLUTION}, {MAX_TIME_RESOLUTION}] seconds, got {}",
                self.time_resolution
            ),
        )?;
        check(self.workers >= 1, "at least one worker is required")?;
        check(
            self.smoothing.window_size >= 1,
            "smoothing window must hold at least one keyframe",
        )?;
        check(
            self.cache_capacity != Some(0),
            "cache capacity must be positive when set",
        )?;
        self.mapper.validate()
    }

    pub fn extractor_settings(&self) -> ExtractorSettings {
        ExtractorSettings {
            hop_length: self.hop_length,
            frame_length: self.frame_length,
            ..ExtractorSettings::default()
        }
    }
}

fn check(condition: bool, message: impl Into<String>) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(ExpressionError::Config(message.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MapperKind;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.time_resolution, 0.1);
        assert_eq!(config.workers, 4);
        assert!(config.smoothing.enabled);
        assert_eq!(config.smoothing.window_size, 3);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json(
            r#"{"time_resolution": 0.25, "smoothing": {"enabled": false}}"#,
        )
        .unwrap();
        assert_eq!(config.time_resolution, 0.25);
        assert!(!config.smoothing.enabled);
        assert_eq!(config.smoothing.window_size, 3);
        assert_eq!(config.hop_length, 512);
        assert_eq!(config.mapper.kind, MapperKind::Rules);
    }

    #[test]
    fn rejects_resolution_out_of_range() {
        for resolution in [0.0, 0.001, 1.5, f64::NAN] {
            let config = PipelineConfig {
                time_resolution: resolution,
                ..PipelineConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(ExpressionError::Config(_))),
                "resolution {resolution} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_zero_workers_and_capacity() {
        let no_workers = PipelineConfig {
            workers: 0,
            ..PipelineConfig::default()
        };
        assert!(no_workers.validate().is_err());

        let empty_cache = PipelineConfig {
            cache_capacity: Some(0),
            ..PipelineConfig::default()
        };
        assert!(empty_cache.validate().is_err());
    }

    #[test]
    fn parses_failure_policy() {
        let config = PipelineConfig::from_json(r#"{"failure_policy": "neutral_per_sample"}"#)
            .unwrap();
        assert_eq!(config.failure_policy, MapperFailurePolicy::NeutralPerSample);
    }

    #[test]
    fn malformed_json_is_config_error() {
        assert!(matches!(
            PipelineConfig::from_json("{not json"),
            Err(ExpressionError::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = PipelineConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
