//! songface: turns a music track into a timeline of avatar expression
//! keyframes.

pub mod audio;
pub mod cache;
pub mod config;
pub mod emotion;
pub mod error;
pub mod export;
pub mod features;
pub mod mapping;
pub mod pipeline;
pub mod smoothing;
pub mod timeline;
pub mod types;

pub use config::{PipelineConfig, SmoothingConfig};
pub use error::{ExpressionError, Result};
pub use export::{export_to_file, ExportFormat};
pub use pipeline::{Generation, GenerationOutcome, GenerationReport, MapperFailurePolicy, Pipeline};
pub use types::{
    AudioSignal, EmotionScores, ExpressionParameters, ExpressionSequence, Keyframe,
    TimelineSample,
};
