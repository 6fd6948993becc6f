//! # birdcall_core
//!
//! Photograph in, species and call out.
//!
//! - [`Classifier`] runs a VGG16-style ONNX model over one image and returns the
//!   most likely of the species in its [`ClassLabelSet`].
//! - [`PredictionWorker`] moves that work off the UI thread; only the latest
//!   request is ever reported.
//! - [`AudioController`] resolves the species clip and drives play/pause/seek,
//!   reporting position through [`PlaybackEvent`]s.
//!
//! ```ignore
//! use birdcall_core::{AppConfig, AudioController, Classifier, PredictionWorker};
//! use std::sync::Arc;
//!
//! let cfg = AppConfig::load_or_default(None)?;
//! let mut classifier = Classifier::from_config(&cfg.classifier)?;
//! classifier.load(&cfg.classifier)?;
//! let mut worker = PredictionWorker::spawn(Arc::new(classifier))?;
//! worker.submit("robin.jpg");
//!
//! let mut audio = AudioController::with_default_output(&cfg.audio)?;
//! if let Some(event) = worker.recv_timeout(std::time::Duration::from_secs(5)) {
//!     let result = event.outcome?;
//!     if audio.select_label(&result.label) {
//!         audio.toggle()?;
//!     }
//! }
//! ```

pub mod audio;
mod classifier;
pub mod config;
mod error;
mod labels;
mod model;
mod prediction;
pub mod preprocess;
mod time;

pub use audio::{
    AudioController, AudioLibrary, AudioResource, PlaybackEngine, PlaybackEvent,
    PlaybackPosition, PlaybackState,
};
pub use classifier::{Classifier, PredictionResult};
pub use config::{AppConfig, AudioConfig, ClassifierConfig, TensorLayout};
pub use error::{Error, Result};
pub use labels::{BIRD_SPECIES, ClassLabelSet};
#[cfg(feature = "onnx")]
pub use model::OrtModel;
pub use model::ImageModel;
pub use prediction::{PredictionEvent, PredictionWorker, RequestId};
pub use time::format_ms;
