//! Class label table, index-aligned with the model output.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Species the bundled model was trained on, in output-index order.
pub const BIRD_SPECIES: [&str; 20] = [
    "ABBOTTS BABBLER",
    "ABBOTTS BOOBY",
    "ABYSSINIAN GROUND HORNBILL",
    "AFRICAN CROWNED CRANE",
    "AFRICAN EMERALD CUCKOO",
    "AFRICAN FIREFINCH",
    "AFRICAN OYSTER CATCHER",
    "AFRICAN PIED HORNBILL",
    "AFRICAN PYGMY GOOSE",
    "ALBATROSS",
    "ALBERTS TOWHEE",
    "ALEXANDRINE PARAKEET",
    "ALPINE CHOUGH",
    "ALTAMIRA YELLOWTHROAT",
    "AMERICAN AVOCET",
    "AMERICAN BITTERN",
    "AMERICAN COOT",
    "AMERICAN FLAMINGO",
    "AMERICAN GOLDFINCH",
    "AMERICAN KESTREL",
];

/// Helper struct for JSON object with "labels" key.
#[derive(serde::Deserialize)]
struct LabelsObject {
    labels: Vec<String>,
}

/// Ordered, immutable mapping from class index to species name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabelSet {
    names: Arc<[String]>,
}

impl ClassLabelSet {
    /// Table matching the bundled model artifact.
    pub fn builtin() -> Self {
        Self {
            names: BIRD_SPECIES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Build a table, rejecting empty input and duplicate names.
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(Error::LabelLoad {
                path: "<memory>".to_string(),
                reason: "label table is empty".to_string(),
            });
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(Error::LabelLoad {
                    path: "<memory>".to_string(),
                    reason: format!("duplicate label {name:?}"),
                });
            }
        }
        Ok(Self {
            names: names.into(),
        })
    }

    /// Load a table shipped next to the model: `.json` or one name per line.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::LabelLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let is_json = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let names = if is_json {
            parse_json_labels(&content)
        } else {
            Ok(parse_text_labels(&content))
        };
        names
            .and_then(Self::new)
            .map_err(|e| match e {
                Error::LabelLoad { reason, .. } => Error::LabelLoad {
                    path: path.display().to_string(),
                    reason,
                },
                other => other,
            })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

fn parse_text_labels(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

fn parse_json_labels(content: &str) -> Result<Vec<String>> {
    if let Ok(labels) = serde_json::from_str::<Vec<String>>(content) {
        return Ok(labels);
    }
    if let Ok(obj) = serde_json::from_str::<LabelsObject>(content) {
        return Ok(obj.labels);
    }
    Err(Error::LabelLoad {
        path: "<memory>".to_string(),
        reason: "expected a JSON array of strings or {\"labels\": [...]}".to_string(),
    })
}
