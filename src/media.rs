//! Media file helpers: container-agnostic duration probing and WAV
//! rendering for the simulated capture path.

use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Read a media file's duration in seconds from its container metadata,
/// without decoding audio. Works for every format symphonia can probe
/// (M4A, MP3, WAV, FLAC, OGG).
pub fn probe_duration_secs(path: impl AsRef<Path>) -> Result<f64> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open media file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("Failed to probe media format: {}", path.display()))?;

    let track = probed
        .format
        .default_track()
        .ok_or_else(|| anyhow!("No audio track in {}", path.display()))?;
    let params = &track.codec_params;

    let duration = if let (Some(frames), Some(time_base)) = (params.n_frames, params.time_base) {
        let time = time_base.calc_time(frames);
        time.seconds as f64 + time.frac
    } else if let (Some(frames), Some(rate)) = (params.n_frames, params.sample_rate) {
        frames as f64 / rate as f64
    } else {
        anyhow::bail!("Track reports no length: {}", path.display());
    };

    debug!("Probed {}: {:.3}s", path.display(), duration);
    Ok(duration)
}

/// Write a sine tone WAV of the given length. Stand-in content for the
/// simulated recorder, so captured takes are playable real files.
pub fn write_tone_wav(
    path: impl AsRef<Path>,
    duration_millis: u64,
    sample_rate: u32,
    channels: u16,
) -> Result<()> {
    let path = path.as_ref();
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;

    let frames = (sample_rate as u64 * duration_millis / 1000) as usize;
    let amplitude = 0.4 * i16::MAX as f32;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let sample = (2.0 * std::f32::consts::PI * 440.0 * t).sin();
        let value = (sample * amplitude) as i16;
        for _ in 0..channels {
            writer.write_sample(value).context("Failed to write sample")?;
        }
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    debug!("Rendered {}ms tone to {}", duration_millis, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn probe_reads_back_rendered_duration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");

        write_tone_wav(&path, 1500, 44_100, 2).unwrap();
        let duration = probe_duration_secs(&path).unwrap();

        assert!(
            (duration - 1.5).abs() < 0.05,
            "expected ~1.5s, probed {duration}"
        );
    }

    #[test]
    fn probe_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = probe_duration_secs(dir.path().join("absent.wav"));
        assert!(result.is_err());
    }

    #[test]
    fn zero_length_tone_is_still_a_valid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.wav");

        write_tone_wav(&path, 0, 44_100, 1).unwrap();
        assert!(path.exists());
    }
}
