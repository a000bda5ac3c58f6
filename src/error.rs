use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for results returned by the generation pipeline.
pub type Result<T> = std::result::Result<T, ExpressionError>;

/// Failures surfaced by the expression pipeline.
///
/// Parameter range problems are not represented here: they are clamped where
/// they are detected and only counted in the generation report.
#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("unsupported audio input {path:?}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("audio analysis failed during {stage} of {input}: {reason}")]
    Analysis {
        stage: &'static str,
        input: String,
        reason: String,
    },

    #[error("expression mapping failed at {timestamp:.3}s: {reason}")]
    Mapping { timestamp: f64, reason: String },

    #[error("failed to export expression data to {path:?}")]
    Export {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ExpressionError {
    pub fn analysis(stage: &'static str, input: impl Into<String>, reason: impl ToString) -> Self {
        Self::Analysis {
            stage,
            input: input.into(),
            reason: reason.to_string(),
        }
    }

    pub fn mapping(timestamp: f64, reason: impl ToString) -> Self {
        Self::Mapping {
            timestamp,
            reason: reason.to_string(),
        }
    }

    /// Short stage label, useful for logs and retry decisions by callers.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat { .. } => "decode",
            Self::Analysis { stage, .. } => stage,
            Self::Mapping { .. } => "mapping",
            Self::Export { .. } => "export",
            Self::Config(_) => "config",
        }
    }
}
