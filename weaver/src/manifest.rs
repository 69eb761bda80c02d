// manifest.rs — Batch manifest for change detection
//
// Records, per module path, whether the module takes part in weaving and the
// SHA-256 of the last output written for it. An input whose hash equals the
// recorded output hash is the weaver's own unchanged output and is skipped.
//
// Preconditions: none.
// Postconditions: `save` writes pretty JSON with entries sorted by path.
// Failure modes: I/O and JSON errors from `load` / `save`. A missing manifest
//   file loads as empty.
// Side effects: file reads and writes in `load` / `save`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::WeaveError;

fn active_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManifestEntry {
    #[serde(default = "active_by_default")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub woven_sha256: Option<String>,
}

impl Default for ManifestEntry {
    fn default() -> Self {
        ManifestEntry {
            active: true,
            woven_sha256: None,
        }
    }
}

/// Why a module was not woven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// The manifest marks the module inactive.
    Inactive,
    /// The input is the unchanged output of a previous weave.
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, WeaveError> {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| WeaveError::json(path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(WeaveError::io(path, e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), WeaveError> {
        let text = serde_json::to_string_pretty(self).map_err(|e| WeaveError::json(path, e))?;
        std::fs::write(path, text + "\n").map_err(|e| WeaveError::io(path, e))
    }

    pub fn skip_reason(&self, key: &str, input_sha256: &str) -> Option<SkipReason> {
        let entry = self.entries.get(key)?;
        if !entry.active {
            return Some(SkipReason::Inactive);
        }
        match &entry.woven_sha256 {
            Some(hash) if hash == input_sha256 => Some(SkipReason::Unchanged),
            _ => None,
        }
    }

    pub fn record(&mut self, key: &str, output_sha256: String) {
        self.entries.entry(key.to_string()).or_default().woven_sha256 = Some(output_sha256);
    }
}
