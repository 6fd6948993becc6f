//! Playback through the default cpal output device.
//!
//! ```text
//! ┌──────────────┐  load/play/   ┌──────────────┐  try_lock   ┌──────────────────┐
//! │ UI thread    │──pause/seek──►│ Shared       │◄────────────│ cpal callback    │
//! │ (controller) │   atomics     │ clip, cursor │   cursor    │ (writes frames)  │
//! └──────▲───────┘               └──────┬───────┘             └──────────────────┘
//!        │ EngineEvent                  │ reads every tick
//!        │                       ┌──────▼───────┐
//!        └───────────────────────│ ticker thread│
//!                                └──────────────┘
//! ```
//!
//! Clips are resampled to the device rate when they are decoded, so the
//! callback copies frames one to one.

use super::decode::{DecodedClip, decode_source};
use super::engine::{EngineEvent, PlaybackEngine, Stamp};
use super::resample::resample_clip;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam::channel::{self, Receiver, Sender};
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

struct Shared {
    clip: Mutex<Option<Arc<DecodedClip>>>,
    /// Next frame to play, in device-rate frames.
    cursor: AtomicU64,
    /// Output device sample rate; 0 until the stream is open.
    rate: AtomicU32,
    playing: AtomicBool,
    /// Set by the callback at end of clip, cleared only by the ticker or a reset.
    finished: AtomicBool,
    clip_id: AtomicU64,
    epoch: AtomicU64,
    shutdown: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            clip: Mutex::new(None),
            cursor: AtomicU64::new(0),
            rate: AtomicU32::new(0),
            playing: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            clip_id: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    fn stamp(&self) -> Stamp {
        Stamp {
            clip: self.clip_id.load(Ordering::Acquire),
            epoch: self.epoch.load(Ordering::Acquire),
        }
    }

    fn position_ms(&self) -> u64 {
        let rate = u64::from(self.rate.load(Ordering::Acquire));
        if rate == 0 {
            return 0;
        }
        self.cursor.load(Ordering::Acquire) * 1000 / rate
    }

    fn seek_to(&self, position_ms: u64) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let rate = u64::from(self.rate.load(Ordering::Acquire));
        self.cursor
            .store(position_ms * rate / 1000, Ordering::Release);
    }

    fn set_clip(&self, clip: Option<Arc<DecodedClip>>) {
        *self.clip.lock().unwrap_or_else(PoisonError::into_inner) = clip;
    }
}

/// [`PlaybackEngine`] that decodes whole clips with symphonia, resamples them
/// with rubato and plays them on the default output device.
pub struct CpalEngine {
    shared: Arc<Shared>,
    events: Sender<EngineEvent>,
    stream: Option<Stream>,
    ticker: Option<JoinHandle<()>>,
}

impl CpalEngine {
    /// Start the ticker thread. The output device is opened on first load.
    pub fn new(tick_interval: Duration) -> Result<(Self, Receiver<EngineEvent>)> {
        let (events, receiver) = channel::unbounded();
        let shared = Arc::new(Shared::new());
        let ticker_shared = shared.clone();
        let ticker_events = events.clone();
        let ticker = std::thread::Builder::new()
            .name("playback-ticker".into())
            .spawn(move || ticker_loop(&ticker_shared, &ticker_events, tick_interval))
            .map_err(|e| Error::Playback(format!("cannot start position ticker: {e}")))?;
        Ok((
            Self {
                shared,
                events,
                stream: None,
                ticker: Some(ticker),
            },
            receiver,
        ))
    }

    fn ensure_stream(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Playback("no default output device found".to_string()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| Error::Playback(format!("failed to get default config: {e}")))?;
        let sample_format = supported.sample_format();
        let config = supported.config();
        let stream = match sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(&device, &config)?,
            SampleFormat::I16 => self.build_stream::<i16>(&device, &config)?,
            SampleFormat::U16 => self.build_stream::<u16>(&device, &config)?,
            other => {
                return Err(Error::Playback(format!(
                    "unsupported sample format {other:?}"
                )));
            }
        };
        stream
            .play()
            .map_err(|e| Error::Playback(format!("cannot start output stream: {e}")))?;
        info!(
            "Audio output: {} ({} Hz, {} channel(s), {:?})",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate.0,
            config.channels,
            sample_format
        );
        self.shared
            .rate
            .store(config.sample_rate.0, Ordering::Release);
        self.stream = Some(stream);
        Ok(())
    }

    fn build_stream<T>(&self, device: &Device, config: &StreamConfig) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = usize::from(config.channels);
        let shared = self.shared.clone();
        let err_shared = self.shared.clone();
        let err_events = self.events.clone();
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    write_frames(data, channels, &shared);
                },
                move |err| {
                    error!("Audio stream error: {err}");
                    err_shared.playing.store(false, Ordering::Release);
                    let _ = err_events.send(EngineEvent::Failed {
                        stamp: err_shared.stamp(),
                        reason: err.to_string(),
                    });
                },
                None,
            )
            .map_err(|e| Error::Playback(format!("cannot open output stream: {e}")))
    }

    /// Silence, forget the clip, and invalidate everything in flight.
    fn reset(&self) {
        self.shared.playing.store(false, Ordering::Release);
        self.shared.finished.store(false, Ordering::Release);
        self.shared.set_clip(None);
        self.shared.cursor.store(0, Ordering::Release);
        self.shared.clip_id.fetch_add(1, Ordering::AcqRel);
        self.shared.epoch.fetch_add(1, Ordering::AcqRel);
    }
}

impl PlaybackEngine for CpalEngine {
    fn load(&mut self, path: &Path) -> Result<()> {
        self.ensure_stream()?;
        let file = File::open(path)
            .map_err(|e| Error::Playback(format!("cannot open {}: {e}", path.display())))?;
        self.reset();
        let stamp = self.shared.stamp();
        let device_rate = self.shared.rate.load(Ordering::Acquire);
        let shared = self.shared.clone();
        let events = self.events.clone();
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_string);
        info!("Loading clip {}", path.display());
        std::thread::Builder::new()
            .name("clip-decode".into())
            .spawn(move || {
                let outcome = decode_source(file, ext.as_deref())
                    .and_then(|clip| resample_clip(clip, device_rate));
                if shared.clip_id.load(Ordering::Acquire) != stamp.clip {
                    debug!("Discarding decode of abandoned clip {}", stamp.clip);
                    return;
                }
                let event = match outcome {
                    Ok(clip) => {
                        let total_ms = clip.duration_ms();
                        shared.set_clip(Some(Arc::new(clip)));
                        EngineEvent::Duration { stamp, total_ms }
                    }
                    Err(e) => {
                        shared.playing.store(false, Ordering::Release);
                        EngineEvent::Failed {
                            stamp,
                            reason: e.to_string(),
                        }
                    }
                };
                let _ = events.send(event);
            })
            .map_err(|e| Error::Playback(format!("cannot start decoder: {e}")))?;
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        if self.stream.is_none() || self.shared.clip_id.load(Ordering::Acquire) == 0 {
            return Err(Error::NoResource);
        }
        self.shared.playing.store(true, Ordering::Release);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.shared.playing.store(false, Ordering::Release);
        Ok(())
    }

    fn seek(&mut self, position_ms: u64) -> Result<()> {
        self.shared.seek_to(position_ms);
        Ok(())
    }

    fn stop(&mut self) {
        self.reset();
    }

    fn stamp(&self) -> Stamp {
        self.shared.stamp()
    }
}

impl Drop for CpalEngine {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.playing.store(false, Ordering::Release);
        self.stream.take();
        if let Some(ticker) = self.ticker.take()
            && ticker.join().is_err()
        {
            warn!("Position ticker panicked");
        }
    }
}

fn ticker_loop(shared: &Shared, events: &Sender<EngineEvent>, interval: Duration) {
    while !shared.shutdown.load(Ordering::Acquire) {
        std::thread::sleep(interval);
        // Stamp first: a seek racing this tick leaves it tagged stale.
        let stamp = shared.stamp();
        let event = if shared.finished.swap(false, Ordering::AcqRel) {
            EngineEvent::EndOfMedia { stamp }
        } else if shared.playing.load(Ordering::Acquire) {
            EngineEvent::Position {
                stamp,
                position_ms: shared.position_ms(),
            }
        } else {
            continue;
        };
        if events.send(event).is_err() {
            break;
        }
    }
}

/// Audio callback body: copy clip frames to the device, or silence.
fn write_frames<T>(data: &mut [T], channels: usize, shared: &Shared)
where
    T: SizedSample + FromSample<f32>,
{
    let silence = |buf: &mut [T]| buf.iter_mut().for_each(|s| *s = T::EQUILIBRIUM);
    if channels == 0 || !shared.playing.load(Ordering::Acquire) {
        silence(data);
        return;
    }
    let Ok(guard) = shared.clip.try_lock() else {
        silence(data);
        return;
    };
    let Some(clip) = guard.as_ref().filter(|c| c.channels > 0) else {
        silence(data);
        return;
    };

    let start = shared.cursor.load(Ordering::Acquire);
    let frames = clip.frames() as u64;
    let mut cursor = start;
    let mut reached_end = false;

    for frame in data.chunks_mut(channels) {
        if cursor >= frames {
            reached_end = true;
            silence(frame);
            continue;
        }
        let base = cursor as usize * clip.channels;
        for (ch, out) in frame.iter_mut().enumerate() {
            let src = ch.min(clip.channels - 1);
            *out = T::from_sample(clip.samples[base + src]);
        }
        cursor += 1;
    }
    drop(guard);

    // A failed exchange means a seek landed meanwhile; the seek wins.
    if reached_end {
        if shared
            .cursor
            .compare_exchange(start, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            shared.playing.store(false, Ordering::Release);
            shared.finished.store(true, Ordering::Release);
        }
    } else {
        let _ = shared
            .cursor
            .compare_exchange(start, cursor, Ordering::AcqRel, Ordering::Acquire);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared_with_clip(samples: Vec<f32>, rate: u32, channels: usize) -> Shared {
        let shared = Shared::new();
        shared.set_clip(Some(Arc::new(DecodedClip {
            samples,
            sample_rate: rate,
            channels,
        })));
        shared.rate.store(rate, Ordering::Release);
        shared.clip_id.store(1, Ordering::Release);
        shared
    }

    fn run_ticker(shared: &Arc<Shared>) -> (Receiver<EngineEvent>, JoinHandle<()>) {
        let (tx, rx) = channel::unbounded();
        let ticker_shared = shared.clone();
        let handle = std::thread::spawn(move || {
            ticker_loop(&ticker_shared, &tx, Duration::from_millis(5));
        });
        (rx, handle)
    }

    #[test]
    fn paused_output_is_silent_and_cursor_stays() {
        let shared = shared_with_clip(vec![0.5; 100], 10, 1);
        let mut out = [1.0f32; 8];
        write_frames(&mut out, 2, &shared);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(shared.position_ms(), 0);
    }

    #[test]
    fn mono_clip_fills_every_device_channel() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32 / 10.0).collect();
        let shared = shared_with_clip(samples, 10, 1);
        shared.playing.store(true, Ordering::Release);
        let mut out = [0.0f32; 6];
        write_frames(&mut out, 2, &shared);
        assert_eq!(out, [0.0, 0.0, 0.1, 0.1, 0.2, 0.2]);
        assert_eq!(shared.position_ms(), 300);
    }

    #[test]
    fn frames_are_copied_one_to_one() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let shared = shared_with_clip(samples, 10, 1);
        shared.playing.store(true, Ordering::Release);
        let mut out = [0.0f32; 4];
        write_frames(&mut out, 1, &shared);
        write_frames(&mut out, 1, &shared);
        assert_eq!(out, [4.0, 5.0, 6.0, 7.0]);
        assert_eq!(shared.position_ms(), 800);
    }

    #[test]
    fn seek_converts_ms_to_device_frames() {
        let shared = shared_with_clip(vec![0.0; 48_000], 48_000, 1);
        let before = shared.stamp();
        shared.seek_to(250);
        assert_eq!(shared.cursor.load(Ordering::Acquire), 12_000);
        assert_eq!(shared.position_ms(), 250);
        assert_eq!(shared.stamp().epoch, before.epoch + 1);
    }

    #[test]
    fn end_of_clip_rewinds_and_flags_finish() {
        let shared = shared_with_clip(vec![0.25; 4], 10, 1);
        shared.playing.store(true, Ordering::Release);
        let mut out = [1.0f32; 6];
        write_frames(&mut out, 1, &shared);
        assert_eq!(out, [0.25, 0.25, 0.25, 0.25, 0.0, 0.0]);
        assert!(shared.finished.load(Ordering::Acquire));
        assert!(!shared.playing.load(Ordering::Acquire));
        assert_eq!(shared.position_ms(), 0);
    }

    #[test]
    fn i16_output_converts_samples() {
        let shared = shared_with_clip(vec![1.0, -1.0], 10, 1);
        shared.playing.store(true, Ordering::Release);
        let mut out = [0i16; 2];
        write_frames(&mut out, 1, &shared);
        assert_eq!(out[0], i16::MAX);
        assert!(out[1] <= -i16::MAX);
    }

    #[test]
    fn ticker_reports_position_while_playing() {
        let shared = Arc::new(shared_with_clip(vec![0.0; 100], 10, 1));
        shared.cursor.store(5, Ordering::Release);
        shared.playing.store(true, Ordering::Release);
        let (rx, handle) = run_ticker(&shared);

        let event = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("position tick");
        assert_eq!(
            event,
            EngineEvent::Position {
                stamp: shared.stamp(),
                position_ms: 500,
            }
        );
        shared.shutdown.store(true, Ordering::Release);
        handle.join().expect("ticker exits");
    }

    #[test]
    fn end_of_clip_survives_a_seek_before_the_next_tick() {
        let shared = Arc::new(shared_with_clip(vec![0.25; 4], 10, 1));
        shared.playing.store(true, Ordering::Release);
        let mut out = [0.0f32; 6];
        write_frames(&mut out, 1, &shared);
        shared.seek_to(100);

        let (rx, handle) = run_ticker(&shared);
        let event = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("end of media");
        assert_eq!(
            event,
            EngineEvent::EndOfMedia {
                stamp: shared.stamp()
            }
        );
        assert!(!shared.finished.load(Ordering::Acquire));
        shared.shutdown.store(true, Ordering::Release);
        handle.join().expect("ticker exits");
        assert!(rx.try_recv().is_err());
    }
}
