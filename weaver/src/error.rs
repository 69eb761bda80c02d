// error.rs — Error types
//
// `AdviceError` is a rule violation found while validating one marker type;
// it is reported as a diagnostic and abandons that marker type only.
// `WeaveError` is fatal for the module being woven.

use std::path::PathBuf;

use thiserror::Error;

use crate::diag::{codes, DiagCode, Diagnostic, Site};
use crate::module::TypeRef;

/// A violated advice rule. Each variant maps to a stable diagnostic code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdviceError {
    #[error("advice '{advice}' binds the return value but runs on entry")]
    BindingConflict { marker: String, advice: String },

    #[error("advice '{advice}' declares {count} parameters (at most 2 allowed)")]
    ArityViolation {
        marker: String,
        advice: String,
        count: usize,
    },

    #[error(
        "advice '{advice}' expects a return value of type '{expected}' but target '{target}' returns '{found}'"
    )]
    ReturnTypeMismatch {
        marker: String,
        advice: String,
        target: String,
        expected: TypeRef,
        found: TypeRef,
    },

    #[error("parameter '{parameter}' of advice '{advice}' has no Argument marker")]
    UnboundParameter {
        marker: String,
        advice: String,
        parameter: String,
    },

    #[error("advice '{advice}' binds the return value more than once")]
    DuplicateReturnBinding { marker: String, advice: String },

    #[error("parameter '{parameter}' of advice '{advice}' receives the method name but is '{found}', not 'string'")]
    NameTypeMismatch {
        marker: String,
        advice: String,
        parameter: String,
        found: TypeRef,
    },
}

impl AdviceError {
    pub fn code(&self) -> DiagCode {
        match self {
            AdviceError::BindingConflict { .. } => codes::E0101,
            AdviceError::ArityViolation { .. } => codes::E0102,
            AdviceError::ReturnTypeMismatch { .. } => codes::E0103,
            AdviceError::UnboundParameter { .. } => codes::E0104,
            AdviceError::DuplicateReturnBinding { .. } => codes::E0105,
            AdviceError::NameTypeMismatch { .. } => codes::E0106,
        }
    }

    fn site(&self) -> Site {
        match self {
            AdviceError::BindingConflict { marker, advice }
            | AdviceError::ArityViolation { marker, advice, .. }
            | AdviceError::ReturnTypeMismatch { marker, advice, .. }
            | AdviceError::UnboundParameter { marker, advice, .. }
            | AdviceError::DuplicateReturnBinding { marker, advice }
            | AdviceError::NameTypeMismatch { marker, advice, .. } => {
                Site::member(marker.clone(), advice.clone())
            }
        }
    }

    /// Render as an error diagnostic located at the advice method, with the
    /// target (`Type::Method`) that was being woven as a related site.
    pub fn to_diagnostic(&self, target: &str) -> Diagnostic {
        let (ty, member) = target.rsplit_once("::").unwrap_or((target, ""));
        let diag = Diagnostic::error(self.site(), self.to_string())
            .with_code(self.code())
            .with_related(Site::member(ty, member), "target declared here");
        match self {
            AdviceError::BindingConflict { .. } => {
                diag.with_hint("use When.OnExit, or bind Method.Name instead")
            }
            AdviceError::ArityViolation { .. } => {
                diag.with_hint("advice may take the method name and the return value only")
            }
            AdviceError::UnboundParameter { .. } => {
                diag.with_hint("mark the parameter with Argument(Method.Name) or Argument(Method.ReturnValue)")
            }
            _ => diag,
        }
    }
}

/// Errors that abort the weave of a module.
#[derive(Debug, Error)]
pub enum WeaveError {
    #[error("malformed marker on {site}: {message}")]
    MalformedMarker { site: Site, message: String },

    #[error("unknown type {0:?}")]
    UnknownType(crate::id::TypeId),

    #[error("unknown method {0:?}")]
    UnknownMethod(crate::id::MethodId),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {}", .path.display(), .messages.join("; "))]
    Parse { path: PathBuf, messages: Vec<String> },

    #[error("{}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown component '{0}'")]
    UnknownComponent(String),

    #[error("method {0:?} has no free local slot")]
    LocalsExhausted(crate::id::MethodId),
}

impl WeaveError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WeaveError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        WeaveError::Json {
            path: path.into(),
            source,
        }
    }
}
