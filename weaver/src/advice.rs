// advice.rs — Structured advice model
//
// The typed form of the marker attributes found on an `Injection` type:
// one `AdviceUnit` per `Rise` method, with one `ParameterBinding` per
// declared parameter.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: `Timing::from_arg` / `ArgSource::from_arg` return `None`
//   for values outside the marker contract.
// Side effects: none.

use serde::Serialize;

use crate::id::{MethodId, TypeId};
use crate::module::{AttrArg, MethodRef, TypeRef};

// ── Marker names ────────────────────────────────────────────────────────────

/// Fully-qualified attribute type names of the three markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerNames {
    pub injection: String,
    pub rise: String,
    pub argument: String,
}

impl MarkerNames {
    pub fn in_namespace(namespace: &str) -> Self {
        let qualify = |name: &str| {
            if namespace.is_empty() {
                name.to_string()
            } else {
                format!("{}.{}", namespace, name)
            }
        };
        MarkerNames {
            injection: qualify("Injection"),
            rise: qualify("Rise"),
            argument: qualify("Argument"),
        }
    }
}

impl Default for MarkerNames {
    fn default() -> Self {
        MarkerNames::in_namespace(crate::config::DEFAULT_MARKER_NAMESPACE)
    }
}

/// Last segment of an enum path: `When.OnExit` -> `OnExit`.
fn enum_member(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

// ── Timing and argument sources ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Timing {
    OnEntry,
    OnExit,
}

impl Timing {
    /// Decode a `Rise` argument: `1` / `OnEntry`, `2` / `OnExit`.
    pub fn from_arg(arg: &AttrArg) -> Option<Timing> {
        match arg {
            AttrArg::Int(1) => Some(Timing::OnEntry),
            AttrArg::Int(2) => Some(Timing::OnExit),
            AttrArg::Enum(path) => match enum_member(path) {
                "OnEntry" => Some(Timing::OnEntry),
                "OnExit" => Some(Timing::OnExit),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgSource {
    TargetName,
    TargetReturnValue,
}

impl ArgSource {
    /// Decode an `Argument` value: `1` / `Name`, `2` / `ReturnValue`.
    pub fn from_arg(arg: &AttrArg) -> Option<ArgSource> {
        match arg {
            AttrArg::Int(1) => Some(ArgSource::TargetName),
            AttrArg::Int(2) => Some(ArgSource::TargetReturnValue),
            AttrArg::Enum(path) => match enum_member(path) {
                "Name" => Some(ArgSource::TargetName),
                "ReturnValue" => Some(ArgSource::TargetReturnValue),
                _ => None,
            },
            _ => None,
        }
    }
}

// ── Advice units ────────────────────────────────────────────────────────────

/// How one declared advice parameter is filled at the join point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterBinding {
    pub declared_type: TypeRef,
    pub parameter_name: String,
    /// `None` when the parameter carried no `Argument` marker.
    pub source: Option<ArgSource>,
}

/// One advice method of a marker type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdviceUnit {
    pub name: String,
    #[serde(skip)]
    pub method: MethodId,
    pub timing: Timing,
    pub bindings: Vec<ParameterBinding>,
    pub ret: TypeRef,
    pub is_static: bool,
    /// Call reference used by the emitted sequences.
    #[serde(skip)]
    pub call: MethodRef,
}

impl AdviceUnit {
    pub fn param_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn binds(&self, source: ArgSource) -> bool {
        self.bindings.iter().any(|b| b.source == Some(source))
    }
}

/// A type that declared itself a marker, with its advice in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkerDefinition {
    #[serde(skip)]
    pub owner: TypeId,
    pub owner_name: String,
    pub advice: Vec<AdviceUnit>,
}
