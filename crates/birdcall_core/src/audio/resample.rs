//! Clip resampling to the output device rate with rubato.

use super::decode::DecodedClip;
use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

/// Convert `clip` to `target_rate` in one pass, keeping its duration.
///
/// The whole clip is fed as a single chunk, then flushed with silence so the
/// resampler's output delay can be trimmed off the front.
pub fn resample_clip(clip: DecodedClip, target_rate: u32) -> Result<DecodedClip> {
    if target_rate == 0 || clip.sample_rate == target_rate {
        return Ok(clip);
    }
    let channels = clip.channels;
    let frames = clip.frames();
    if frames == 0 || channels == 0 {
        return Ok(DecodedClip {
            sample_rate: target_rate,
            ..clip
        });
    }

    let ratio = f64::from(target_rate) / f64::from(clip.sample_rate);
    debug!(
        "Resampling {} frames from {} Hz to {} Hz ({} channel(s))",
        frames, clip.sample_rate, target_rate, channels
    );

    let mut resampler =
        FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Septic, frames, channels)
            .map_err(|e| Error::Playback(format!("cannot create resampler: {e}")))?;

    let planar = deinterleave(&clip.samples, channels);
    let mut output = resampler
        .process(&planar, None)
        .map_err(|e| Error::Playback(format!("resampling failed: {e}")))?;
    let tail = resampler
        .process_partial(None::<&[Vec<f32>]>, None)
        .map_err(|e| Error::Playback(format!("resampling failed: {e}")))?;
    for (out, rest) in output.iter_mut().zip(tail) {
        out.extend(rest);
    }

    let expected = (frames as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    for out in &mut output {
        out.drain(..delay.min(out.len()));
        out.truncate(expected);
    }

    Ok(DecodedClip {
        samples: interleave(&output),
        sample_rate: target_rate,
        channels,
    })
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let mut planar = vec![Vec::with_capacity(samples.len() / channels); channels];
    for frame in samples.chunks_exact(channels) {
        for (plane, &s) in planar.iter_mut().zip(frame) {
            plane.push(s);
        }
    }
    planar
}

fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let frames = planar.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(frames * planar.len());
    for i in 0..frames {
        out.extend(planar.iter().map(|plane| plane[i]));
    }
    out
}
