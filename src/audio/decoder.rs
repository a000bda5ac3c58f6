use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

use super::resample::linear_resample;
use crate::error::{ExpressionError, Result};
use crate::types::AudioSignal;

/// Decode an audio file to a mono signal at `target_sample_rate`.
///
/// Container or codec problems are reported as `UnsupportedFormat` before any
/// samples are produced; failures inside the packet stream abort the load.
pub fn load_signal<P: AsRef<Path>>(path: P, target_sample_rate: u32) -> Result<AudioSignal> {
    load_signal_within(path, target_sample_rate, f64::INFINITY)
}

/// Like [`load_signal`], but rejects tracks longer than `max_duration_secs`
/// with an `Analysis` error at stage "load". The container's frame count is
/// checked before decoding when it is known; otherwise decoding stops as soon
/// as the limit is passed.
pub fn load_signal_within<P: AsRef<Path>>(
    path: P,
    target_sample_rate: u32,
    max_duration_secs: f64,
) -> Result<AudioSignal> {
    let path = path.as_ref();
    let input = path.display().to_string();
    let unsupported = |reason: String| ExpressionError::UnsupportedFormat {
        path: path.to_path_buf(),
        reason,
    };

    let file = std::fs::File::open(path)
        .map_err(|err| ExpressionError::analysis("load", input.clone(), err))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probe_result = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| unsupported(format!("failed to probe container: {err}")))?;
    let mut format = probe_result.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| unsupported("no audio tracks found".to_string()))?;
    let track_id = track.id;
    let source_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| unsupported("sample rate not specified".to_string()))?;
    let too_long = |seconds: f64| {
        ExpressionError::analysis(
            "load",
            input.clone(),
            format!("track is {seconds:.1}s long, limit is {max_duration_secs:.1}s"),
        )
    };
    if let Some(frames) = track.codec_params.n_frames {
        let seconds = frames as f64 / source_rate as f64;
        if seconds > max_duration_secs {
            return Err(too_long(seconds));
        }
    }
    let max_samples = max_duration_secs * source_rate as f64;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| unsupported(format!("no decoder for codec: {err}")))?;

    let mut mono = Vec::new();
    let mut buffer: Option<SampleBuffer<f32>> = None;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(ExpressionError::analysis("decode", input.clone(), err)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|err| ExpressionError::analysis("decode", input.clone(), err))?;
        let channels = decoded.spec().channels.count().max(1);

        let needs_buffer = buffer
            .as_ref()
            .map_or(true, |b| b.capacity() < decoded.capacity() * channels);
        if needs_buffer {
            buffer = Some(SampleBuffer::new(
                decoded.capacity() as u64,
                *decoded.spec(),
            ));
        }
        if let Some(buf) = buffer.as_mut() {
            buf.copy_interleaved_ref(decoded);
            downmix_into(buf.samples(), channels, &mut mono);
        }
        if mono.len() as f64 > max_samples {
            return Err(too_long(mono.len() as f64 / source_rate as f64));
        }
    }

    debug!(
        path = %path.display(),
        samples = mono.len(),
        source_rate,
        "decoded audio stream"
    );

    let samples = if source_rate == target_sample_rate {
        mono
    } else {
        linear_resample(&mono, source_rate, target_sample_rate)
            .map_err(|err| ExpressionError::analysis("resample", input.clone(), err))?
    };
    let signal = AudioSignal::new(samples, target_sample_rate);
    info!(
        path = %path.display(),
        duration_secs = signal.duration(),
        sample_rate = target_sample_rate,
        "loaded audio signal"
    );
    Ok(signal)
}

/// Average interleaved frames into mono samples.
fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}
