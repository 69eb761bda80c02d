// session.rs — Per-pass weaving context
//
// One `WeaveSession` exists per module weave. It owns the options, the
// synthesis caches (keyed by stable IDs) and the diagnostics collected by
// every component. It is handed explicitly to each component and dropped at
// the end of the pass, so no state leaks between modules.

use std::collections::HashMap;

use serde::Serialize;

use crate::advice::{MarkerDefinition, MarkerNames};
use crate::config::WeaveOptions;
use crate::diag::Diagnostic;
use crate::id::{MethodId, TypeId};
use crate::module::{FieldRef, MethodRef};

/// Counters reported at the end of a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WeaveStats {
    pub marker_types: usize,
    pub rejected_marker_types: usize,
    pub targets: usize,
    pub entry_sites: usize,
    pub exit_sites: usize,
    pub markers_stripped: usize,
}

impl WeaveStats {
    /// Number of inserted call sequences.
    pub fn injected(&self) -> usize {
        self.entry_sites + self.exit_sites
    }
}

/// The hidden handle synthesized for one marker type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenHandle {
    pub field: FieldRef,
    pub initializer: MethodRef,
}

#[derive(Debug)]
pub struct WeaveSession {
    pub options: WeaveOptions,
    pub markers: MarkerNames,
    pub(crate) handles: HashMap<TypeId, HiddenHandle>,
    pub(crate) return_slots: HashMap<MethodId, u16>,
    /// Index after the last prologue inserted into a target.
    pub(crate) entry_cursors: HashMap<MethodId, usize>,
    /// Marker types scanned during the pass, in visit order.
    pub definitions: Vec<MarkerDefinition>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: WeaveStats,
}

impl WeaveSession {
    pub fn new(options: WeaveOptions) -> Self {
        let markers = options.markers();
        WeaveSession {
            options,
            markers,
            handles: HashMap::new(),
            return_slots: HashMap::new(),
            entry_cursors: HashMap::new(),
            definitions: Vec::new(),
            diagnostics: Vec::new(),
            stats: WeaveStats::default(),
        }
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn handle(&self, marker: TypeId) -> Option<&HiddenHandle> {
        self.handles.get(&marker)
    }

    pub fn return_slot(&self, method: MethodId) -> Option<u16> {
        self.return_slots.get(&method).copied()
    }
}

impl Default for WeaveSession {
    fn default() -> Self {
        WeaveSession::new(WeaveOptions::default())
    }
}
