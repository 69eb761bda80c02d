// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types reported by the scanner, the weaving
// engine, the components and the verifier. Diagnostics locate problems by
// site (type, optionally member) rather than by source span, since modules
// are not necessarily read from text.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::Serialize;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0101`, `W0201`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    // Advice rules (E01xx).
    pub const E0101: DiagCode = DiagCode("E0101"); // return value bound at entry
    pub const E0102: DiagCode = DiagCode("E0102"); // more than two advice parameters
    pub const E0103: DiagCode = DiagCode("E0103"); // target return type mismatch
    pub const E0104: DiagCode = DiagCode("E0104"); // parameter without Argument marker
    pub const E0105: DiagCode = DiagCode("E0105"); // return value bound twice
    pub const E0106: DiagCode = DiagCode("E0106"); // name bound to non-string parameter

    // Weaving notes (W02xx).
    pub const W0201: DiagCode = DiagCode("W0201"); // target has no body
    pub const W0202: DiagCode = DiagCode("W0202"); // advice marker outside an Injection type
    pub const W0203: DiagCode = DiagCode("W0203"); // marker type has no targets
    pub const W0204: DiagCode = DiagCode("W0204"); // static target under per-instance handle storage

    // Verification (E03xx).
    pub const E0300: DiagCode = DiagCode("E0300");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Site ─────────────────────────────────────────────────────────────────

/// Where a diagnostic applies: a type, or one of its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Site {
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
}

impl Site {
    pub fn ty(type_name: impl Into<String>) -> Self {
        Site {
            type_name: type_name.into(),
            member: None,
        }
    }

    pub fn member(type_name: impl Into<String>, member: impl Into<String>) -> Self {
        Site {
            type_name: type_name.into(),
            member: Some(member.into()),
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.member {
            Some(member) => write!(f, "{}::{}", self.type_name, member),
            None => write!(f, "{}", self.type_name),
        }
    }
}

/// A secondary site providing context for a diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedSite {
    pub site: Site,
    pub label: String,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any weaving phase.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub site: Site,
    pub message: String,
    pub hint: Option<String>,
    pub related: Vec<RelatedSite>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, or related sites.
    pub fn new(level: DiagLevel, site: Site, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            site,
            message: message.into(),
            hint: None,
            related: Vec::new(),
        }
    }

    pub fn error(site: Site, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, site, message)
    }

    pub fn warning(site: Site, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, site, message)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related site.
    pub fn with_related(mut self, site: Site, label: impl Into<String>) -> Self {
        self.related.push(RelatedSite {
            site,
            label: label.into(),
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}: {}", level, code, self.site, self.message)?;
        } else {
            write!(f, "{}: {}: {}", level, self.site, self.message)?;
        }
        for related in &self.related {
            write!(f, "\n  note: {}: {}", related.site, related.label)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// True if any diagnostic in the list is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}
