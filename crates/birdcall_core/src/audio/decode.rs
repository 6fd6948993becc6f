//! Whole-clip decoding with symphonia.

use crate::error::{Error, Result};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// A fully decoded clip: interleaved `f32` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl DecodedClip {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.frame_to_ms(self.frames() as f64)
    }

    pub fn frame_to_ms(&self, frame: f64) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (frame.max(0.0) * 1000.0 / f64::from(self.sample_rate)) as u64
    }

    pub fn ms_to_frame(&self, ms: u64) -> f64 {
        (ms as f64 * f64::from(self.sample_rate) / 1000.0).min(self.frames() as f64)
    }
}

pub fn decode_file(path: &Path) -> Result<DecodedClip> {
    let file = File::open(path)
        .map_err(|e| Error::Playback(format!("cannot open {}: {e}", path.display())))?;
    let ext = path.extension().and_then(|s| s.to_str());
    decode_source(file, ext)
}

/// Decode every packet of the first audio track in `file`.
pub fn decode_source(file: File, extension: Option<&str>) -> Result<DecodedClip> {
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Playback(format!("unsupported audio format: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Playback("no audio track found".to_string()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| Error::Playback(format!("unsupported codec: {e}")))?;

    let mut samples = Vec::new();
    let mut sample_rate = params.sample_rate;
    let mut channels = params.channels.map(|c| c.count());

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(Error::Playback(format!("cannot read packet: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count());
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {e}");
            }
            Err(e) => return Err(Error::Playback(format!("decode failed: {e}"))),
        }
    }

    let sample_rate =
        sample_rate.ok_or_else(|| Error::Playback("sample rate not found".to_string()))?;
    let channels = channels
        .filter(|&c| c > 0)
        .ok_or_else(|| Error::Playback("channel count not found".to_string()))?;
    let clip = DecodedClip {
        samples,
        sample_rate,
        channels,
    };
    debug!(
        "Decoded {} frames at {} Hz, {} channel(s)",
        clip.frames(),
        clip.sample_rate,
        clip.channels
    );
    Ok(clip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn write_wav(path: &Path, rate: u32, channels: u16, frames: usize) -> Result<()> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for i in 0..frames {
            for _ in 0..channels {
                writer.write_sample(((i % 100) as i16 - 50) * 200)?;
            }
        }
        writer.finalize()?;
        Ok(())
    }

    #[test]
    fn decodes_mono_wav_with_duration() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("call.wav");
        write_wav(&path, 8_000, 1, 4_000)?;

        let clip = decode_file(&path)?;
        assert_eq!(clip.sample_rate, 8_000);
        assert_eq!(clip.channels, 1);
        assert_eq!(clip.frames(), 4_000);
        assert_eq!(clip.duration_ms(), 500);
        assert!(clip.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
        Ok(())
    }

    #[test]
    fn decodes_stereo_wav_interleaved() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 16_000, 2, 16_000)?;

        let clip = decode_file(&path)?;
        assert_eq!(clip.channels, 2);
        assert_eq!(clip.samples.len(), 32_000);
        assert_eq!(clip.duration_ms(), 1_000);
        Ok(())
    }

    #[test]
    fn frame_and_ms_conversions_agree() {
        let clip = DecodedClip {
            samples: vec![0.0; 44_100 * 2],
            sample_rate: 44_100,
            channels: 2,
        };
        assert_eq!(clip.frames(), 44_100);
        assert_eq!(clip.duration_ms(), 1_000);
        assert_eq!(clip.frame_to_ms(clip.ms_to_frame(250)), 250);
        assert_eq!(clip.ms_to_frame(5_000), 44_100.0);
    }

    #[test]
    fn garbage_file_is_a_playback_error() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("noise.mp3");
        std::fs::write(&path, b"definitely not audio")?;
        assert!(matches!(decode_file(&path), Err(Error::Playback(_))));
        Ok(())
    }

    #[test]
    fn missing_file_is_a_playback_error() {
        let err = decode_file(&PathBuf::from("/nonexistent/call.mp3")).unwrap_err();
        assert!(matches!(err, Error::Playback(_)));
    }
}
