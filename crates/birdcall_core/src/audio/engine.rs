//! Seam between the controller and whatever actually produces sound.

use crate::error::Result;
use std::path::Path;

/// Identifies which clip and which seek generation an engine event belongs to.
///
/// `clip` changes on every load/stop, `epoch` on every load/stop/seek.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Stamp {
    pub clip: u64,
    pub epoch: u64,
}

/// Notifications pushed by an engine from its own threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Clip metadata is parsed; sent once per clip.
    Duration { stamp: Stamp, total_ms: u64 },
    /// Periodic position while playing.
    Position { stamp: Stamp, position_ms: u64 },
    /// Clip played to the end; the engine paused and rewound to 0.
    EndOfMedia { stamp: Stamp },
    /// Decode or device failure. The engine stops producing sound.
    Failed { stamp: Stamp, reason: String },
}

impl EngineEvent {
    pub fn stamp(&self) -> Stamp {
        match self {
            Self::Duration { stamp, .. }
            | Self::Position { stamp, .. }
            | Self::EndOfMedia { stamp }
            | Self::Failed { stamp, .. } => *stamp,
        }
    }
}

/// Playback primitives the controller sequences into its state machine.
///
/// Commands return quickly; slow work (decoding, duration parsing) happens in
/// the background and is reported through [`EngineEvent`]s.
pub trait PlaybackEngine {
    /// Abandon the current clip and start loading `path`. Playback stays paused.
    fn load(&mut self, path: &Path) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    /// Jump to `position_ms` from the start of the clip.
    fn seek(&mut self, position_ms: u64) -> Result<()>;

    /// Drop the current clip and go silent.
    fn stop(&mut self);

    /// Stamp that events must carry to be current.
    fn stamp(&self) -> Stamp;
}
