//! Serialization of finished expression sequences.
//!
//! Two documents are produced: the sequence document (the persisted form of
//! [`ExpressionSequence`]) and the animation-curve document consumed by
//! avatar playback. Both are built from structs and fixed-order vectors, so
//! identical input always yields byte-identical output.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ExpressionError, Result};
use crate::types::{ExpressionSequence, PARAMETERS};

pub const MOTION_VERSION: u32 = 3;
pub const MOTION_FPS: u32 = 30;
const CURVE_TARGET: &str = "Parameter";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Sequence,
    Motion,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Sequence => "json",
            ExportFormat::Motion => "motion3.json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MotionDocument {
    pub version: u32,
    pub meta: MotionMeta,
    pub curves: Vec<MotionCurve>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MotionMeta {
    pub duration: f64,
    pub fps: u32,
    pub r#loop: bool,
    pub are_beziers_restricted: bool,
    pub curve_count: usize,
    pub total_point_count: usize,
    pub total_segment_count: usize,
    pub user_data_count: usize,
    pub total_user_data_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MotionCurve {
    pub target: String,
    pub id: String,
    pub segments: Vec<CurvePoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CurvePoint {
    pub time: f64,
    pub value: f64,
}

/// Build the animation-curve document: one curve per parameter in
/// declaration order, one point per keyframe.
pub fn motion_document(sequence: &ExpressionSequence) -> MotionDocument {
    let keyframes = &sequence.expressions;
    let curves = PARAMETERS
        .iter()
        .enumerate()
        .map(|(index, spec)| MotionCurve {
            target: CURVE_TARGET.to_string(),
            id: spec.curve_id.to_string(),
            segments: keyframes
                .iter()
                .map(|keyframe| CurvePoint {
                    time: keyframe.timestamp,
                    value: keyframe.parameters.values()[index],
                })
                .collect(),
        })
        .collect::<Vec<_>>();

    MotionDocument {
        version: MOTION_VERSION,
        meta: MotionMeta {
            duration: keyframes.last().map_or(0.0, |k| k.timestamp),
            fps: MOTION_FPS,
            r#loop: false,
            are_beziers_restricted: true,
            curve_count: curves.len(),
            total_point_count: keyframes.len(),
            total_segment_count: keyframes.len().saturating_sub(1),
            user_data_count: 0,
            total_user_data_size: 0,
        },
        curves,
    }
}

pub fn export_sequence(sequence: &ExpressionSequence) -> anyhow::Result<String> {
    serde_json::to_string_pretty(sequence).context("failed to serialize expression sequence")
}

pub fn export_motion(sequence: &ExpressionSequence) -> anyhow::Result<String> {
    serde_json::to_string_pretty(&motion_document(sequence))
        .context("failed to serialize motion document")
}

pub fn parse_sequence(raw: &str) -> anyhow::Result<ExpressionSequence> {
    serde_json::from_str(raw).context("failed to parse expression sequence")
}

pub fn parse_motion(raw: &str) -> anyhow::Result<MotionDocument> {
    serde_json::from_str(raw).context("failed to parse motion document")
}

/// Write `sequence` to `path` in the requested format, creating parent
/// directories. The sequence itself is untouched on failure.
pub fn export_to_file<P: AsRef<Path>>(
    sequence: &ExpressionSequence,
    path: P,
    format: ExportFormat,
) -> Result<()> {
    let path = path.as_ref();
    let wrap = |source: anyhow::Error| ExpressionError::Export {
        path: path.to_path_buf(),
        source,
    };

    let document = match format {
        ExportFormat::Sequence => export_sequence(sequence),
        ExportFormat::Motion => export_motion(sequence),
    }
    .map_err(wrap)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory {:?}", parent))
            .map_err(wrap)?;
    }
    fs::write(path, document)
        .with_context(|| format!("failed to write {:?}", path))
        .map_err(wrap)?;

    info!(
        path = %path.display(),
        ?format,
        keyframes = sequence.len(),
        "exported expression data"
    );
    Ok(())
}
