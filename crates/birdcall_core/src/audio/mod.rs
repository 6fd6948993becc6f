//! Species clip lookup and playback.

mod controller;
#[cfg(feature = "playback")]
mod cpal_engine;
mod decode;
mod engine;
mod resample;
mod resource;

pub use controller::{AudioController, PlaybackEvent, PlaybackPosition, PlaybackState};
#[cfg(feature = "playback")]
pub use cpal_engine::CpalEngine;
pub use decode::{DecodedClip, decode_file};
pub use engine::{EngineEvent, PlaybackEngine, Stamp};
pub use resample::resample_clip;
pub use resource::{AudioLibrary, AudioResource, sanitize_label};
