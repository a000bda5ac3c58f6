//! End-to-end generation: audio → features → timeline → mapped keyframes →
//! smoothed [`ExpressionSequence`].
//!
//! Each call owns its cache and report; nothing is retained between runs.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Deserialize;
use tracing::{info, warn};

use crate::audio;
use crate::cache::ExpressionCache;
use crate::config::PipelineConfig;
use crate::emotion::EmotionScorer;
use crate::error::{ExpressionError, Result};
use crate::features::{AudioFeatures, FeatureExtractor};
use crate::mapping::{build_mapper, ExpressionMapper};
use crate::smoothing::smooth;
use crate::timeline::build_timeline;
use crate::types::{
    AudioSignal, ExpressionParameters, ExpressionSequence, Keyframe, TimelineSample,
};

/// What to do when the expression mapper fails for a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapperFailurePolicy {
    /// Return the mapping error to the caller.
    #[default]
    Abort,
    /// Replace the whole sequence with a single neutral keyframe.
    NeutralSequence,
    /// Use neutral parameters for each failed sample only.
    NeutralPerSample,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Complete(ExpressionSequence),
    Degraded {
        sequence: ExpressionSequence,
        reason: String,
    },
}

impl GenerationOutcome {
    pub fn sequence(&self) -> &ExpressionSequence {
        match self {
            GenerationOutcome::Complete(sequence) => sequence,
            GenerationOutcome::Degraded { sequence, .. } => sequence,
        }
    }

    pub fn into_sequence(self) -> ExpressionSequence {
        match self {
            GenerationOutcome::Complete(sequence) => sequence,
            GenerationOutcome::Degraded { sequence, .. } => sequence,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, GenerationOutcome::Degraded { .. })
    }
}

/// Counters collected during one generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenerationReport {
    pub samples: usize,
    pub mapper_calls: u64,
    pub cache_hits: u64,
    /// Parameter fields coerced into range (or reset from non-finite).
    pub clamped_parameters: usize,
    pub failed_samples: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub outcome: GenerationOutcome,
    pub report: GenerationReport,
}

pub struct Pipeline {
    config: PipelineConfig,
    extractor: FeatureExtractor,
    mapper: Box<dyn ExpressionMapper>,
    pool: Option<ThreadPool>,
}

impl Pipeline {
    /// Validate `config` and build the mapper it selects.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let mapper = build_mapper(&config.mapper)?;
        Self::with_mapper(config, mapper)
    }

    /// Pipeline using a caller-provided mapper instead of `config.mapper`.
    pub fn with_mapper(config: PipelineConfig, mapper: Box<dyn ExpressionMapper>) -> Result<Self> {
        config.validate()?;
        let pool = if config.workers > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.workers)
                .thread_name(|index| format!("songface-mapper-{index}"))
                .build()
                .map_err(|err| {
                    ExpressionError::Config(format!("failed to start mapper workers: {err}"))
                })?;
            Some(pool)
        } else {
            None
        };
        Ok(Self {
            extractor: FeatureExtractor::with_settings(config.extractor_settings()),
            config,
            mapper,
            pool,
        })
    }

    pub fn with_scorer(mut self, scorer: EmotionScorer) -> Self {
        self.extractor = self.extractor.with_scorer(scorer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn generate_from_file<P: AsRef<Path>>(&self, path: P) -> Result<Generation> {
        let path = path.as_ref();
        let signal =
            audio::load_signal_within(path, self.config.sample_rate, self.config.max_duration_secs)?;
        self.generate_labeled(&signal, &path.display().to_string())
    }

    pub fn generate(&self, signal: &AudioSignal) -> Result<Generation> {
        self.generate_labeled(signal, "<in-memory signal>")
    }

    fn generate_labeled(&self, signal: &AudioSignal, input: &str) -> Result<Generation> {
        let duration = signal.duration();
        if duration > self.config.max_duration_secs {
            return Err(ExpressionError::analysis(
                "load",
                input,
                format!(
                    "track is {duration:.1}s long, limit is {:.1}s",
                    self.config.max_duration_secs
                ),
            ));
        }
        let features = self.extractor.extract_labeled(signal, input)?;
        self.generate_from_features(&features)
    }

    /// Map already-extracted features to a finished sequence.
    pub fn generate_from_features(&self, features: &AudioFeatures) -> Result<Generation> {
        let resolution = self.config.time_resolution;
        let timeline = build_timeline(features, resolution);
        let cache = match self.config.cache_capacity {
            Some(capacity) => ExpressionCache::with_capacity(capacity),
            None => ExpressionCache::new(),
        };
        let clamped = AtomicUsize::new(0);

        let map_sample = |sample: &TimelineSample| {
            cache.get_or_compute(sample, |sample| {
                let raw = self.mapper.map(sample)?;
                let (parameters, corrected) = raw.validated();
                if corrected > 0 {
                    warn!(
                        timestamp = sample.timestamp,
                        corrected,
                        mapper = self.mapper.name(),
                        "mapper output out of range; clamped"
                    );
                    clamped.fetch_add(corrected, Ordering::Relaxed);
                }
                Ok(parameters)
            })
        };
        let results: Vec<Result<ExpressionParameters>> =
            if self.config.failure_policy == MapperFailurePolicy::Abort {
                // stop at the first failure instead of mapping the rest
                let mapped: Result<Vec<ExpressionParameters>> = match &self.pool {
                    Some(pool) => pool.install(|| timeline.par_iter().map(map_sample).collect()),
                    None => timeline.iter().map(map_sample).collect(),
                };
                mapped?.into_iter().map(Ok).collect()
            } else {
                match &self.pool {
                    Some(pool) => pool.install(|| timeline.par_iter().map(map_sample).collect()),
                    None => timeline.iter().map(map_sample).collect(),
                }
            };

        let stats = cache.stats();
        let mut report = GenerationReport {
            samples: timeline.len(),
            mapper_calls: stats.misses,
            cache_hits: stats.hits,
            clamped_parameters: clamped.load(Ordering::Relaxed),
            failed_samples: 0,
        };

        let mut keyframes = Vec::with_capacity(results.len());
        let mut first_failure: Option<ExpressionError> = None;
        for (sample, result) in timeline.iter().zip(results) {
            let parameters = match result {
                Ok(parameters) => parameters,
                Err(err) => {
                    report.failed_samples += 1;
                    if self.config.failure_policy == MapperFailurePolicy::Abort {
                        return Err(err);
                    }
                    warn!(timestamp = sample.timestamp, error = %err, "expression mapping failed");
                    first_failure.get_or_insert(err);
                    ExpressionParameters::neutral()
                }
            };
            keyframes.push(Keyframe {
                timestamp: sample.timestamp,
                parameters,
            });
        }

        let smoothing = self.config.smoothing;
        let outcome = match (first_failure, self.config.failure_policy) {
            (None, _) => GenerationOutcome::Complete(self.sequence(features, keyframes)),
            (Some(err), MapperFailurePolicy::NeutralSequence) => {
                let neutral = vec![Keyframe {
                    timestamp: 0.0,
                    parameters: ExpressionParameters::neutral(),
                }];
                GenerationOutcome::Degraded {
                    sequence: ExpressionSequence::new(
                        features.duration,
                        features.tempo,
                        features.emotion_scores,
                        neutral,
                        resolution,
                        smoothing.enabled,
                    ),
                    reason: err.to_string(),
                }
            }
            (Some(err), _) => GenerationOutcome::Degraded {
                sequence: self.sequence(features, keyframes),
                reason: format!(
                    "{} of {} samples fell back to neutral parameters; first failure: {err}",
                    report.failed_samples, report.samples
                ),
            },
        };

        info!(
            keyframes = outcome.sequence().len(),
            mapper = self.mapper.name(),
            mapper_calls = report.mapper_calls,
            cache_hits = report.cache_hits,
            clamped = report.clamped_parameters,
            degraded = outcome.is_degraded(),
            "expression sequence generated"
        );
        Ok(Generation { outcome, report })
    }

    fn sequence(&self, features: &AudioFeatures, keyframes: Vec<Keyframe>) -> ExpressionSequence {
        let smoothing = self.config.smoothing;
        let keyframes = if smoothing.enabled {
            smooth(&keyframes, smoothing.window_size)
        } else {
            keyframes
        };
        ExpressionSequence::new(
            features.duration,
            features.tempo,
            features.emotion_scores,
            keyframes,
            self.config.time_resolution,
            smoothing.enabled,
        )
    }
}
