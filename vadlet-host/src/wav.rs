//! WAV input for the simulated host.
//!
//! Files are decoded with `hound`, downmixed to mono and converted to the
//! simulated context rate with a rubato `FastFixedIn` resampler. All of this
//! runs before rendering starts, where allocation is fine.

use std::path::Path;

use anyhow::{Context, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::info;

/// Mono clip at its native rate.
#[derive(Debug, Clone)]
pub struct Clip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Clip {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decode `path` and downmix every channel to mono f32 in [-1, 1].
pub fn load_mono(path: &Path) -> Result<Clip> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    let clip = Clip {
        samples: downmix(&interleaved, channels),
        sample_rate: spec.sample_rate,
    };
    info!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        channels,
        seconds = clip.duration_secs(),
        "clip loaded"
    );
    Ok(clip)
}

/// Average interleaved channels into one. A trailing partial frame is dropped.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Input block handed to rubato per call.
const CONVERT_CHUNK: usize = 1024;

/// Bring `clip` to `target_rate` in one offline pass.
///
/// Full blocks go through `process`, the remainder through `process_partial`.
/// The result is trimmed to the clip's duration at the target rate.
pub fn convert_clip(clip: &Clip, target_rate: u32) -> Result<Vec<f32>> {
    if clip.sample_rate == target_rate || clip.samples.is_empty() {
        return Ok(clip.samples.clone());
    }

    let ratio = f64::from(target_rate) / f64::from(clip.sample_rate);
    let mut resampler =
        FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, CONVERT_CHUNK, 1)
            .context("building resampler")?;
    let expected = (clip.samples.len() as f64 * ratio).round() as usize;
    let mut out = Vec::with_capacity(expected + resampler.output_frames_max());

    let mut blocks = clip.samples.chunks_exact(CONVERT_CHUNK);
    for block in &mut blocks {
        let converted = resampler.process(&[block][..], None).context("resampling")?;
        out.extend_from_slice(&converted[0]);
    }
    let tail = blocks.remainder();
    if !tail.is_empty() {
        let converted = resampler
            .process_partial(Some(&[tail][..]), None)
            .context("resampling tail")?;
        out.extend_from_slice(&converted[0]);
    }
    out.truncate(expected);

    info!(
        from_rate = clip.sample_rate,
        to_rate = target_rate,
        samples = out.len(),
        "clip converted"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(len: usize, sample_rate: u32) -> Clip {
        Clip {
            samples: (0..len).map(|i| (i as f32 * 0.01).sin() * 0.5).collect(),
            sample_rate,
        }
    }

    #[test]
    fn downmix_averages_frames() {
        let stereo = [0.5f32, -0.5, 1.0, 0.0, 0.25];
        assert_eq!(downmix(&stereo, 2), vec![0.0, 0.5]);
        assert_eq!(downmix(&[0.1, 0.2], 1), vec![0.1, 0.2]);
    }

    #[test]
    fn matching_rate_is_returned_unchanged() {
        let source = clip(480, 48_000);
        assert_eq!(convert_clip(&source, 48_000).expect("convert"), source.samples);
    }

    #[test]
    fn upsampling_keeps_the_duration() {
        let source = clip(16_000, 16_000);
        let out = convert_clip(&source, 48_000).expect("convert");
        assert!(
            out.len() <= 48_000 && out.len() >= 48_000 - 3_072,
            "got {} samples, expected about 48000",
            out.len()
        );
    }

    #[test]
    fn clip_shorter_than_a_block_is_converted() {
        let source = clip(500, 44_100);
        let out = convert_clip(&source, 48_000).expect("convert");
        assert!(!out.is_empty());
        assert!(out.len() <= 544);
    }

    #[test]
    fn clip_duration_follows_the_rate() {
        assert_eq!(clip(8_000, 16_000).duration_secs(), 0.5);
        assert_eq!(clip(10, 0).duration_secs(), 0.0);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_mono(Path::new("/nonexistent/clip.wav")).is_err());
    }
}
