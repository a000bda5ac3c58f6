use anyhow::{ensure, Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use songface::export::{export_to_file, ExportFormat};
use songface::{GenerationOutcome, Pipeline, PipelineConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Sequence,
    Motion,
    Both,
}

impl OutputFormat {
    fn export_formats(self) -> &'static [ExportFormat] {
        match self {
            OutputFormat::Sequence => &[ExportFormat::Sequence],
            OutputFormat::Motion => &[ExportFormat::Motion],
            OutputFormat::Both => &[ExportFormat::Sequence, ExportFormat::Motion],
        }
    }
}

/// Songface - music-driven avatar expression generator
///
/// Analyzes an audio track and writes a keyframe timeline of facial
/// expression parameters that follows the music.
#[derive(Parser, Debug)]
#[command(name = "songface")]
#[command(version = "0.1.0")]
#[command(about = "Generate avatar expression timelines from music", long_about = None)]
struct Args {
    /// Input audio file path (supports MP3, OGG, FLAC, WAV, etc.)
    #[arg(value_name = "INPUT")]
    input_file: PathBuf,

    /// Output directory for the exported expression files
    #[arg(value_name = "OUTPUT_DIR")]
    output_dir: PathBuf,

    /// JSON pipeline configuration; flags below override its values
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Keyframe spacing in seconds (0.01 - 1.0)
    #[arg(long, value_name = "SECONDS")]
    resolution: Option<f64>,

    /// Disable keyframe smoothing
    #[arg(long)]
    no_smoothing: bool,

    /// Number of parallel mapper workers
    #[arg(long)]
    workers: Option<usize>,

    /// Which documents to write
    #[arg(long, value_enum, default_value_t = OutputFormat::Both)]
    format: OutputFormat,
}

impl Args {
    /// Validate CLI arguments
    fn validate(&self) -> Result<()> {
        if !self.input_file.exists() {
            anyhow::bail!("Input file does not exist: {:?}", self.input_file);
        }

        if !self.input_file.is_file() {
            anyhow::bail!("Input path is not a file: {:?}", self.input_file);
        }

        if let Some(resolution) = self.resolution {
            ensure!(
                resolution > 0.0,
                "Resolution must be positive, got: {}",
                resolution
            );
        }

        if self.output_dir.exists() && !self.output_dir.is_dir() {
            anyhow::bail!("Output path must be a directory: {:?}", self.output_dir);
        }

        Ok(())
    }

    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)
                .with_context(|| format!("Failed to load configuration {:?}", path))?,
            None => PipelineConfig::default(),
        };
        if let Some(resolution) = self.resolution {
            config.time_resolution = resolution;
        }
        if self.no_smoothing {
            config.smoothing.enabled = false;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        config.validate().context("Configuration validation failed")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    args.validate()
        .context("Failed to validate command-line arguments")?;

    println!("Songface v0.1.0 - Music-driven Expression Generator");
    println!("Input:  {:?}", args.input_file);
    println!("Output dir: {:?}", args.output_dir);

    let config = args.pipeline_config()?;
    println!(
        "Resolution: {} seconds, smoothing {}",
        config.time_resolution,
        if config.smoothing.enabled { "on" } else { "off" }
    );

    println!("\n1. Preparing expression pipeline...");
    let pipeline = Pipeline::new(config).context("Failed to build pipeline")?;
    println!("   Mapper: {:?}", pipeline.config().mapper.kind);

    println!("\n2. Analyzing audio and generating keyframes...");
    let generation = pipeline
        .generate_from_file(&args.input_file)
        .context("Failed to generate expression sequence")?;
    let report = generation.report;
    let sequence = match &generation.outcome {
        GenerationOutcome::Complete(sequence) => sequence,
        GenerationOutcome::Degraded { sequence, reason } => {
            eprintln!("   Warning: output degraded: {}", reason);
            sequence
        }
    };
    println!(
        "   Duration {:.2}s, tempo {:.1} BPM, dominant emotion {}",
        sequence.duration,
        sequence.tempo,
        sequence.emotion_scores.dominant().as_str()
    );
    println!(
        "   {} keyframes ({} mapper calls, {} cache hits, {} clamped values)",
        sequence.len(),
        report.mapper_calls,
        report.cache_hits,
        report.clamped_parameters
    );

    println!("\n3. Writing outputs...");
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", args.output_dir))?;
    for &format in args.format.export_formats() {
        let path = output_path(&args.output_dir, &args.input_file, format);
        export_to_file(sequence, &path, format)
            .with_context(|| format!("Failed to export {:?}", path))?;
        println!("   Wrote {:?}", path);
    }

    println!("\n✓ Processing complete!");

    Ok(())
}

fn output_path(output_dir: &Path, input: &Path, format: ExportFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("expressions");
    output_dir.join(format!("{}.{}", stem, format.extension()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args {
            input_file: PathBuf::from("song.mp3"),
            output_dir: PathBuf::from("output"),
            config: None,
            resolution: None,
            no_smoothing: false,
            workers: None,
            format: OutputFormat::Both,
        }
    }

    #[test]
    fn flags_override_config_defaults() {
        let args = Args {
            resolution: Some(0.5),
            no_smoothing: true,
            workers: Some(1),
            ..args()
        };
        let config = args.pipeline_config().unwrap();
        assert_eq!(config.time_resolution, 0.5);
        assert!(!config.smoothing.enabled);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn out_of_range_resolution_fails_validation() {
        let args = Args {
            resolution: Some(2.0),
            ..args()
        };
        assert!(args.pipeline_config().is_err());
    }

    #[test]
    fn output_paths_follow_input_stem() {
        let dir = Path::new("out");
        assert_eq!(
            output_path(dir, Path::new("music/track.mp3"), ExportFormat::Sequence),
            PathBuf::from("out/track.json")
        );
        assert_eq!(
            output_path(dir, Path::new("track.wav"), ExportFormat::Motion),
            PathBuf::from("out/track.motion3.json")
        );
    }

    #[test]
    fn both_format_writes_two_documents() {
        assert_eq!(OutputFormat::Both.export_formats().len(), 2);
        assert_eq!(
            OutputFormat::Motion.export_formats(),
            &[ExportFormat::Motion]
        );
    }
}
