// pipeline.rs — Module I/O, weave orchestration and provenance
//
// Loads a module from its text or JSON encoding, runs the walker with the
// configured components, verifies the result, and writes it back. Batch mode
// weaves independent files in parallel; each module is owned by exactly one
// pass.
//
// Preconditions: none.
// Postconditions: `weave_module` leaves the module woven (or partially woven
//   where marker types were rejected) and returns every diagnostic produced.
// Failure modes: `WeaveError` for I/O, decoding, malformed markers and
//   unknown components; rule violations are diagnostics, not errors.
// Side effects: file reads/writes in the `*_file` functions.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::advice::MarkerDefinition;
use crate::config::WeaveOptions;
use crate::diag::{has_errors, Diagnostic};
use crate::error::WeaveError;
use crate::manifest::{Manifest, SkipReason};
use crate::module::Module;
use crate::session::{WeaveSession, WeaveStats};
use crate::verify::{verify_module, ModuleCert};
use crate::walker::ModuleWalker;

// ── Encodings ──────────────────────────────────────────────────────────────

/// On-disk encoding of a module, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleFormat {
    Text,
    Json,
}

impl ModuleFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ModuleFormat::Json,
            _ => ModuleFormat::Text,
        }
    }
}

/// Decode module source in the given encoding. `path` is used for errors only.
pub fn parse_module(source: &str, format: ModuleFormat, path: &Path) -> Result<Module, WeaveError> {
    match format {
        ModuleFormat::Json => Module::from_json(source).map_err(|e| WeaveError::json(path, e)),
        ModuleFormat::Text => {
            let result = crate::parser::parse(source);
            if !result.errors.is_empty() {
                let messages = result
                    .errors
                    .iter()
                    .map(|e| format!("{}..{}: {}", e.span().start, e.span().end, e))
                    .collect();
                return Err(WeaveError::Parse {
                    path: path.to_path_buf(),
                    messages,
                });
            }
            result.module.ok_or_else(|| WeaveError::Parse {
                path: path.to_path_buf(),
                messages: vec!["parse failed with no output".into()],
            })
        }
    }
}

pub fn render_module(module: &Module, format: ModuleFormat, path: &Path) -> Result<String, WeaveError> {
    match format {
        ModuleFormat::Text => Ok(crate::emit::print_module(module)),
        ModuleFormat::Json => module
            .to_json()
            .map(|s| s + "\n")
            .map_err(|e| WeaveError::json(path, e)),
    }
}

pub fn read_source(path: &Path) -> Result<String, WeaveError> {
    std::fs::read_to_string(path).map_err(|e| WeaveError::io(path, e))
}

pub fn load_module(path: &Path) -> Result<Module, WeaveError> {
    let source = read_source(path)?;
    parse_module(&source, ModuleFormat::from_path(path), path)
}

/// Write `module` to `path` in the encoding its extension selects.
/// Returns the SHA-256 of the bytes written.
pub fn write_module(path: &Path, module: &Module) -> Result<String, WeaveError> {
    let text = render_module(module, ModuleFormat::from_path(path), path)?;
    std::fs::write(path, &text).map_err(|e| WeaveError::io(path, e))?;
    Ok(sha256_hex(text.as_bytes()))
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for reproducible weaves and cache-key use.
///
/// `source_hash`: SHA-256 of the raw module source.
/// `settings_fingerprint`: SHA-256 of the canonical JSON of the options.
/// `weaver_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    pub source_hash: String,
    pub settings_fingerprint: String,
    pub weaver_version: &'static str,
}

impl Provenance {
    /// Serialize provenance as a JSON string for `--emit build-info`.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default() + "\n"
    }
}

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    bytes_to_hex(&Sha256::digest(bytes))
}

pub fn compute_provenance(source: &str, options: &WeaveOptions) -> Provenance {
    Provenance {
        source_hash: sha256_hex(source.as_bytes()),
        settings_fingerprint: options.fingerprint(),
        weaver_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Single module ──────────────────────────────────────────────────────────

/// Everything a weave pass produced besides the rewritten module.
#[derive(Debug, Clone)]
pub struct WeaveResult {
    pub diagnostics: Vec<Diagnostic>,
    pub stats: WeaveStats,
    pub definitions: Vec<MarkerDefinition>,
    /// `None` when verification is disabled.
    pub cert: Option<ModuleCert>,
}

impl WeaveResult {
    pub fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }
}

/// Run one weave pass over `module`.
pub fn weave_module(module: &mut Module, options: &WeaveOptions) -> Result<WeaveResult, WeaveError> {
    let start = Instant::now();
    let mut walker = ModuleWalker::from_options(options)?;
    let mut session = WeaveSession::new(options.clone());
    walker.visit(&mut session, module)?;
    debug!(
        module = %module.name,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "walk finished"
    );

    let cert = if options.verify {
        let start = Instant::now();
        let verified = verify_module(module);
        session.diagnostics.extend(verified.diagnostics);
        debug!(
            module = %module.name,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            all_pass = verified.cert.all_pass(),
            "verify finished"
        );
        Some(verified.cert)
    } else {
        None
    };

    let stats = session.stats;
    info!(
        module = %module.name,
        marker_types = stats.marker_types,
        rejected = stats.rejected_marker_types,
        targets = stats.targets,
        injected = stats.injected(),
        "woven"
    );
    Ok(WeaveResult {
        diagnostics: session.diagnostics,
        stats,
        definitions: session.definitions,
        cert,
    })
}

/// Scan without weaving: the advice model of every marker type in `module`.
pub fn scan_module(module: &Module, options: &WeaveOptions) -> Result<Vec<MarkerDefinition>, WeaveError> {
    let mut scratch = module.clone();
    let mut session = WeaveSession::new(options.clone());
    let mut definitions = Vec::new();
    for ty in &mut scratch.types {
        if let Some(def) = crate::scan::scan_type(&mut session, ty)? {
            definitions.push(def);
        }
    }
    Ok(definitions)
}

// ── Files and batches ──────────────────────────────────────────────────────

/// One file to weave: read `input`, write `output` (in place if equal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Job {
    pub fn in_place(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Job {
            input: path.clone(),
            output: path,
        }
    }

    fn key(&self) -> String {
        self.input.display().to_string()
    }
}

#[derive(Debug)]
pub enum FileStatus {
    Skipped(SkipReason),
    Woven {
        result: WeaveResult,
        output_sha256: String,
    },
    Failed(WeaveError),
}

#[derive(Debug)]
pub struct FileOutcome {
    pub job: Job,
    pub status: FileStatus,
}

impl FileOutcome {
    /// True for fatal errors and for error diagnostics.
    pub fn is_failure(&self) -> bool {
        match &self.status {
            FileStatus::Failed(_) => true,
            FileStatus::Woven { result, .. } => result.has_errors(),
            FileStatus::Skipped(_) => false,
        }
    }
}

/// Weave one file. The output is written even when some marker types were
/// rejected, since the markers are stripped either way.
pub fn weave_file(job: &Job, options: &WeaveOptions) -> Result<(WeaveResult, String), WeaveError> {
    let mut module = load_module(&job.input)?;
    let result = weave_module(&mut module, options)?;
    let output_sha256 = write_module(&job.output, &module)?;
    Ok((result, output_sha256))
}

/// Weave several files in parallel. With a manifest, inactive and unchanged
/// inputs are skipped and the manifest is updated with the new output hashes.
pub fn weave_batch(jobs: &[Job], options: &WeaveOptions, mut manifest: Option<&mut Manifest>) -> Vec<FileOutcome> {
    let plan: Vec<(Job, Option<SkipReason>)> = jobs
        .iter()
        .map(|job| {
            let reason = manifest.as_deref().and_then(|m| {
                let source = read_source(&job.input).ok()?;
                m.skip_reason(&job.key(), &sha256_hex(source.as_bytes()))
            });
            (job.clone(), reason)
        })
        .collect();

    let outcomes: Vec<FileOutcome> = plan
        .into_par_iter()
        .map(|(job, reason)| {
            let status = match reason {
                Some(reason) => {
                    debug!(input = %job.input.display(), ?reason, "skipped");
                    FileStatus::Skipped(reason)
                }
                None => match weave_file(&job, options) {
                    Ok((result, output_sha256)) => FileStatus::Woven {
                        result,
                        output_sha256,
                    },
                    Err(e) => {
                        warn!(input = %job.input.display(), error = %e, "weave failed");
                        FileStatus::Failed(e)
                    }
                },
            };
            FileOutcome { job, status }
        })
        .collect();

    if let Some(manifest) = manifest.as_deref_mut() {
        for outcome in &outcomes {
            if let FileStatus::Woven { output_sha256, .. } = &outcome.status {
                manifest.record(&outcome.job.output.display().to_string(), output_sha256.clone());
            }
        }
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
module demo
[AttributeInjector.Injection]
class Trace {
    [AttributeInjector.Rise(1)]
    public static method Enter([AttributeInjector.Argument(1)] name: string) -> void {
        ret
    }
}
class Worker {
    [Trace]
    public static method Run() -> void {
        ret
    }
}
"#;

    #[test]
    fn format_follows_extension() {
        assert_eq!(ModuleFormat::from_path(Path::new("a.JSON")), ModuleFormat::Json);
        assert_eq!(ModuleFormat::from_path(Path::new("a.wil")), ModuleFormat::Text);
        assert_eq!(ModuleFormat::from_path(Path::new("a")), ModuleFormat::Text);
    }

    #[test]
    fn parse_errors_carry_the_path() {
        let err = parse_module("module", ModuleFormat::Text, Path::new("bad.wil")).unwrap_err();
        assert!(matches!(err, WeaveError::Parse { .. }));
        assert!(err.to_string().starts_with("bad.wil: "));
    }

    #[test]
    fn static_advice_needs_no_handle() {
        let mut module = parse_module(SOURCE, ModuleFormat::Text, Path::new("m.wil")).unwrap();
        let result = weave_module(&mut module, &WeaveOptions::default()).unwrap();
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert_eq!(result.stats.entry_sites, 1);
        assert!(module.type_by_name("Trace").unwrap().fields.is_empty());
        assert_eq!(result.cert.map(|c| c.all_pass()), Some(true));
    }

    #[test]
    fn scan_module_leaves_input_untouched() {
        let module = parse_module(SOURCE, ModuleFormat::Text, Path::new("m.wil")).unwrap();
        let defs = scan_module(&module, &WeaveOptions::default()).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].owner_name, "Trace");
        assert_eq!(module.types[0].attributes.len(), 1);
    }

    #[test]
    fn provenance_is_deterministic() {
        let a = compute_provenance(SOURCE, &WeaveOptions::default());
        let b = compute_provenance(SOURCE, &WeaveOptions::default());
        assert_eq!(a.source_hash, b.source_hash);
        assert_eq!(a.source_hash.len(), 64);
        assert!(a.to_json().contains("\"weaver_version\""));
    }

    #[test]
    fn batch_skips_its_own_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.wil");
        std::fs::write(&path, SOURCE).unwrap();
        let jobs = vec![Job::in_place(&path)];
        let mut manifest = Manifest::default();

        let first = weave_batch(&jobs, &WeaveOptions::default(), Some(&mut manifest));
        assert!(matches!(first[0].status, FileStatus::Woven { .. }));

        let second = weave_batch(&jobs, &WeaveOptions::default(), Some(&mut manifest));
        assert!(matches!(
            second[0].status,
            FileStatus::Skipped(SkipReason::Unchanged)
        ));
    }
}
