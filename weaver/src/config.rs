// config.rs — Weave options
//
// Options are read from an optional JSON settings file; every field has a
// default, so `{}` is a valid settings file. CLI flags are applied on top by
// the binary.
//
// Preconditions: none.
// Postconditions: `WeaveOptions::default()` weaves with the `AttributeInjector`
//   marker namespace, per-instance handles, verification on, and both
//   production components enabled.
// Failure modes: I/O and JSON errors from `load`; unknown keys are rejected.
// Side effects: `load` reads the settings file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::advice::MarkerNames;
use crate::error::WeaveError;

pub const DEFAULT_MARKER_NAMESPACE: &str = "AttributeInjector";

/// Where the hidden marker instance is stored on the marker type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandleStorage {
    /// Instance field, read through a receiver.
    #[default]
    PerInstance,
    /// Static field shared by every call site.
    Shared,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct WeaveOptions {
    pub marker_namespace: String,
    pub handle_storage: HandleStorage,
    pub verify: bool,
    /// Enabled walker components, in registration order.
    pub components: Vec<String>,
}

impl Default for WeaveOptions {
    fn default() -> Self {
        WeaveOptions {
            marker_namespace: DEFAULT_MARKER_NAMESPACE.to_string(),
            handle_storage: HandleStorage::default(),
            verify: true,
            components: vec![
                crate::component::INJECTION_WEAVER.to_string(),
                crate::component::ORPHAN_SWEEP.to_string(),
            ],
        }
    }
}

impl WeaveOptions {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Read options from a JSON settings file.
    pub fn load(path: &Path) -> Result<Self, WeaveError> {
        let text = std::fs::read_to_string(path).map_err(|e| WeaveError::io(path, e))?;
        Self::from_json(&text).map_err(|e| WeaveError::json(path, e))
    }

    pub fn markers(&self) -> MarkerNames {
        MarkerNames::in_namespace(&self.marker_namespace)
    }

    /// SHA-256 over the canonical JSON form, for build provenance.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        crate::pipeline::bytes_to_hex(&Sha256::digest(&canonical))
    }
}
