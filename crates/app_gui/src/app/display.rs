//! Off-thread decoding of the photo shown next to the prediction.

use birdcall_core::preprocess::decode_display_image;
use crossbeam::channel::{self, Receiver, Sender};
use eframe::egui;
use std::path::PathBuf;

struct Decoded {
    generation: u64,
    path: PathBuf,
    outcome: birdcall_core::Result<egui::ColorImage>,
}

/// Decodes display bitmaps on short-lived threads. Only the latest request is delivered.
pub struct DisplayLoader {
    max_side: u32,
    latest: u64,
    pending: bool,
    tx: Sender<Decoded>,
    rx: Receiver<Decoded>,
}

impl DisplayLoader {
    pub fn new(max_side: u32) -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            max_side,
            latest: 0,
            pending: false,
            tx,
            rx,
        }
    }

    pub fn request(&mut self, path: PathBuf) {
        self.latest += 1;
        self.pending = true;
        let generation = self.latest;
        let max_side = self.max_side;
        let tx = self.tx.clone();
        let spawned = std::thread::Builder::new()
            .name("display-decode".into())
            .spawn(move || {
                let outcome = decode_display_image(&path, max_side).map(|rgba| {
                    let size = [rgba.width() as usize, rgba.height() as usize];
                    egui::ColorImage::from_rgba_unmultiplied(size, &rgba.into_raw())
                });
                let _ = tx.send(Decoded {
                    generation,
                    path,
                    outcome,
                });
            });
        if let Err(e) = spawned {
            tracing::warn!("Cannot start display decode: {e}");
            self.pending = false;
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// The latest requested image, once decoded.
    pub fn try_recv(&mut self) -> Option<(PathBuf, birdcall_core::Result<egui::ColorImage>)> {
        while let Ok(msg) = self.rx.try_recv() {
            if let Some(done) = self.accept(msg) {
                return Some(done);
            }
        }
        None
    }

    #[cfg(test)]
    fn recv_timeout(
        &mut self,
        timeout: std::time::Duration,
    ) -> Option<(PathBuf, birdcall_core::Result<egui::ColorImage>)> {
        let deadline = std::time::Instant::now() + timeout;
        while let Ok(msg) = self
            .rx
            .recv_timeout(deadline.saturating_duration_since(std::time::Instant::now()))
        {
            if let Some(done) = self.accept(msg) {
                return Some(done);
            }
        }
        None
    }

    fn accept(
        &mut self,
        msg: Decoded,
    ) -> Option<(PathBuf, birdcall_core::Result<egui::ColorImage>)> {
        if msg.generation != self.latest {
            tracing::debug!("Dropping stale display image {}", msg.path.display());
            return None;
        }
        self.pending = false;
        Some((msg.path, msg.outcome))
    }
}
