//! Label → audio clip lookup.

use crate::config::AudioConfig;
use std::path::{Path, PathBuf};

/// A playable clip for one species.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioResource {
    pub label: String,
    pub path: PathBuf,
}

impl AudioResource {
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

/// Directory of one clip per species, named `<sanitized label>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioLibrary {
    dir: PathBuf,
    extension: String,
}

impl AudioLibrary {
    pub fn new(dir: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn from_config(cfg: &AudioConfig) -> Self {
        Self::new(&cfg.sounds_dir, &cfg.extension)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the clip for `label` would live, whether or not it exists.
    pub fn path_for(&self, label: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", sanitize_label(label), self.extension))
    }

    /// `None` when no clip is on disk; callers disable playback instead of erroring.
    pub fn resolve(&self, label: &str) -> Option<AudioResource> {
        let path = self.path_for(label);
        tracing::debug!("Audio path for {label}: {}", path.display());
        path.is_file().then(|| AudioResource {
            label: label.to_string(),
            path,
        })
    }
}

/// Make a label safe to use as a file stem.
pub fn sanitize_label(label: &str) -> String {
    let replaced: String = label
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    replaced.trim().trim_end_matches('.').trim_end().to_string()
}
