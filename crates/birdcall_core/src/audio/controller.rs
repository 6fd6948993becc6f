//! Play/pause/seek state machine on top of a [`PlaybackEngine`].

use super::engine::{EngineEvent, PlaybackEngine};
use super::resource::{AudioLibrary, AudioResource};
use crate::error::{Error, Result};
use crossbeam::channel::{self, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Nothing loaded for the current resource.
    #[default]
    Stopped,
    /// Clip loaded and idle at the start after playing to its end.
    Loaded,
    Playing,
    Paused,
}

/// Position of the current clip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackPosition {
    pub current_ms: u64,
    /// `None` until the engine has parsed the clip.
    pub total_ms: Option<u64>,
}

/// Notifications for the caller, drained from [`AudioController::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    DurationKnown(u64),
    PositionTick(u64),
    StateChanged(PlaybackState),
    Error(Error),
}

/// Manages playback of one species clip at a time.
///
/// `toggle` is the single user control: it loads and plays from `Stopped`,
/// pauses from `Playing` and resumes from `Paused` or `Loaded`. Setting a new
/// resource abandons the old clip and returns to `Stopped`.
pub struct AudioController<E: PlaybackEngine> {
    engine: E,
    engine_events: Receiver<EngineEvent>,
    library: AudioLibrary,
    resource: Option<AudioResource>,
    state: PlaybackState,
    position: PlaybackPosition,
    drag: Option<u64>,
    events_tx: Sender<PlaybackEvent>,
    events_rx: Receiver<PlaybackEvent>,
}

impl<E: PlaybackEngine> AudioController<E> {
    pub fn new(engine: E, engine_events: Receiver<EngineEvent>, library: AudioLibrary) -> Self {
        let (events_tx, events_rx) = channel::unbounded();
        Self {
            engine,
            engine_events,
            library,
            resource: None,
            state: PlaybackState::Stopped,
            position: PlaybackPosition::default(),
            drag: None,
            events_tx,
            events_rx,
        }
    }

    /// Receiver for [`PlaybackEvent`]s; events are produced by the controller's methods.
    pub fn subscribe(&self) -> Receiver<PlaybackEvent> {
        self.events_rx.clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn position(&self) -> PlaybackPosition {
        self.position
    }

    pub fn resource(&self) -> Option<&AudioResource> {
        self.resource.as_ref()
    }

    pub fn library(&self) -> &AudioLibrary {
        &self.library
    }

    /// Look up the clip for `label`. Does not touch playback.
    pub fn resolve_resource(&self, label: &str) -> Option<AudioResource> {
        self.library.resolve(label)
    }

    /// Play and seek controls should be enabled only when this is true.
    pub fn controls_enabled(&self) -> bool {
        self.resource.is_some()
    }

    /// Replace the current resource, abandoning whatever was loaded.
    pub fn set_resource(&mut self, resource: Option<AudioResource>) {
        self.engine.stop();
        match &resource {
            Some(res) => debug!("Audio resource set to {}", res.path.display()),
            None => debug!("Audio resource cleared"),
        }
        self.resource = resource;
        self.position = PlaybackPosition::default();
        self.drag = None;
        self.set_state(PlaybackState::Stopped);
    }

    /// Resolve `label` and make it the current resource. Returns whether a clip exists.
    pub fn select_label(&mut self, label: &str) -> bool {
        let resource = self.resolve_resource(label);
        let found = resource.is_some();
        self.set_resource(resource);
        found
    }

    pub fn toggle(&mut self) -> Result<PlaybackState> {
        match self.state {
            PlaybackState::Stopped => self.start(),
            PlaybackState::Playing => {
                if let Err(e) = self.engine.pause() {
                    return Err(self.fail(e));
                }
                self.set_state(PlaybackState::Paused);
                Ok(self.state)
            }
            PlaybackState::Paused | PlaybackState::Loaded => {
                if let Err(e) = self.engine.play() {
                    return Err(self.fail(e));
                }
                self.set_state(PlaybackState::Playing);
                Ok(self.state)
            }
        }
    }

    fn start(&mut self) -> Result<PlaybackState> {
        let resource = self.resource.as_ref().ok_or(Error::NoResource)?;
        if !resource.exists() {
            warn!("Audio file vanished: {}", resource.path.display());
            return Err(Error::ResourceMissing(resource.path.clone()));
        }
        let path = resource.path.clone();
        if let Err(e) = self.engine.load(&path).and_then(|()| self.engine.play()) {
            return Err(self.fail(e));
        }
        info!("Playing {}", path.display());
        self.position = PlaybackPosition::default();
        self.set_state(PlaybackState::Playing);
        Ok(self.state)
    }

    /// Jump to `target_ms`, clamped to the clip. Keeps Playing/Paused/Loaded as is.
    pub fn seek(&mut self, target_ms: i64) -> Result<u64> {
        if self.state == PlaybackState::Stopped {
            return Err(Error::NoResource);
        }
        let clamped = self.clamp(target_ms);
        if let Err(e) = self.engine.seek(clamped) {
            return Err(self.fail(e));
        }
        self.position.current_ms = clamped;
        self.emit(PlaybackEvent::PositionTick(clamped));
        Ok(clamped)
    }

    /// The user grabbed the seek control; position ticks stop until release.
    pub fn begin_seek_drag(&mut self) {
        self.drag = Some(self.position.current_ms);
    }

    /// Track the control while it is held. Nothing is sent to the engine.
    pub fn update_seek_drag(&mut self, target_ms: i64) {
        if self.drag.is_some() {
            self.drag = Some(self.clamp(target_ms));
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Release the control: exactly one seek to the dragged position.
    ///
    /// Returns `None` when no drag was active or nothing is loaded.
    pub fn end_seek_drag(&mut self) -> Result<Option<u64>> {
        let Some(target) = self.drag.take() else {
            return Ok(None);
        };
        if self.state == PlaybackState::Stopped {
            return Ok(None);
        }
        let target = i64::try_from(target).unwrap_or(i64::MAX);
        self.seek(target).map(Some)
    }

    /// Drain engine notifications into caller events.
    pub fn pump(&mut self) {
        while let Ok(event) = self.engine_events.try_recv() {
            self.handle_engine_event(event);
        }
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        let current = self.engine.stamp();
        let stamp = event.stamp();
        if stamp.clip != current.clip || self.state == PlaybackState::Stopped {
            debug!("Ignoring engine event for abandoned clip: {event:?}");
            return;
        }
        match event {
            EngineEvent::Duration { total_ms, .. } => {
                if self.position.total_ms.is_some() {
                    return;
                }
                self.position.total_ms = Some(total_ms);
                if total_ms > 0 {
                    self.position.current_ms = self.position.current_ms.min(total_ms);
                }
                self.emit(PlaybackEvent::DurationKnown(total_ms));
            }
            EngineEvent::Position { position_ms, .. } => {
                if stamp.epoch != current.epoch
                    || self.state != PlaybackState::Playing
                    || self.drag.is_some()
                {
                    return;
                }
                let position_ms = self.clamp_to_total(position_ms);
                if position_ms < self.position.current_ms {
                    return;
                }
                self.position.current_ms = position_ms;
                self.emit(PlaybackEvent::PositionTick(position_ms));
            }
            EngineEvent::EndOfMedia { .. } => {
                if !matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
                    return;
                }
                // Commands issued after the end but before this event may have moved
                // the engine again; put it back at the start, paused.
                if let Err(e) = self.engine.pause().and_then(|()| self.engine.seek(0)) {
                    let err = self.fail(e);
                    self.emit(PlaybackEvent::Error(err));
                    return;
                }
                self.position.current_ms = 0;
                self.set_state(PlaybackState::Loaded);
                if self.drag.is_none() {
                    self.emit(PlaybackEvent::PositionTick(0));
                }
            }
            EngineEvent::Failed { reason, .. } => {
                let err = self.fail(Error::Playback(reason));
                self.emit(PlaybackEvent::Error(err));
            }
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        warn!("Playback failed: {err}");
        self.engine.stop();
        self.drag = None;
        self.position = PlaybackPosition::default();
        self.set_state(PlaybackState::Stopped);
        err
    }

    fn clamp(&self, target_ms: i64) -> u64 {
        let lower = u64::try_from(target_ms).unwrap_or(0);
        self.clamp_to_total(lower)
    }

    fn clamp_to_total(&self, ms: u64) -> u64 {
        match self.position.total_ms {
            Some(total) => ms.min(total),
            None => ms,
        }
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            debug!("Playback state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.emit(PlaybackEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.events_tx.send(event);
    }
}

#[cfg(feature = "playback")]
impl AudioController<super::cpal_engine::CpalEngine> {
    /// Controller wired to the default output device.
    pub fn with_default_output(cfg: &crate::config::AudioConfig) -> Result<Self> {
        let (engine, events) = super::cpal_engine::CpalEngine::new(cfg.tick_interval())?;
        Ok(Self::new(engine, events, AudioLibrary::from_config(cfg)))
    }
}
