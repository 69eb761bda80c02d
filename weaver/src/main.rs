use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use aiw::config::WeaveOptions;
use aiw::manifest::Manifest;
use aiw::pipeline::{self, FileStatus, Job, ModuleFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    /// Weave and write each module back (in place, or to --output)
    Module,
    /// Weave and print the woven module as JSON
    Json,
    /// Print the advice model of every marker type without weaving
    Advice,
    /// Print build provenance
    BuildInfo,
}

#[derive(Parser, Debug)]
#[command(
    name = "aiw",
    version,
    about = "Attribute Injection Weaver — injects marker-declared advice into module bytecode"
)]
struct Cli {
    /// Input modules (.wil text or .json)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output path (single input only; default: rewrite in place)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Module)]
    emit: EmitStage,

    /// JSON settings file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Marker namespace (overrides the settings file)
    #[arg(long)]
    marker_namespace: Option<String>,

    /// Batch manifest for change detection
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Skip post-weave verification
    #[arg(long)]
    no_verify: bool,

    /// Log at debug level (AIW_LOG overrides)
    #[arg(long)]
    verbose: bool,
}

/// Initialize tracing on stderr, filtered by AIW_LOG.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("AIW_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn load_options(cli: &Cli) -> Result<WeaveOptions, aiw::error::WeaveError> {
    let mut options = match &cli.settings {
        Some(path) => WeaveOptions::load(path)?,
        None => WeaveOptions::default(),
    };
    if let Some(ns) = &cli.marker_namespace {
        options.marker_namespace = ns.clone();
    }
    if cli.no_verify {
        options.verify = false;
    }
    Ok(options)
}

fn fail(message: impl std::fmt::Display) -> ExitCode {
    eprintln!("aiw: error: {}", message);
    ExitCode::from(2)
}

/// Modes that print to stdout operate on exactly one module.
fn single_input(cli: &Cli) -> Result<&Path, ExitCode> {
    match cli.inputs.as_slice() {
        [one] => Ok(one.as_path()),
        _ => Err(fail("this --emit stage takes exactly one input")),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = match load_options(&cli) {
        Ok(o) => o,
        Err(e) => return fail(e),
    };
    tracing::debug!(inputs = cli.inputs.len(), emit = ?cli.emit, ?options, "starting");

    match cli.emit {
        EmitStage::BuildInfo => {
            let input = match single_input(&cli) {
                Ok(p) => p,
                Err(code) => return code,
            };
            match pipeline::read_source(input) {
                Ok(source) => {
                    print!("{}", pipeline::compute_provenance(&source, &options).to_json());
                    ExitCode::SUCCESS
                }
                Err(e) => fail(e),
            }
        }
        EmitStage::Advice => {
            let input = match single_input(&cli) {
                Ok(p) => p,
                Err(code) => return code,
            };
            let definitions = pipeline::load_module(input)
                .and_then(|m| pipeline::scan_module(&m, &options));
            match definitions {
                Ok(defs) => match serde_json::to_string_pretty(&defs) {
                    Ok(json) => {
                        println!("{}", json);
                        ExitCode::SUCCESS
                    }
                    Err(e) => fail(e),
                },
                Err(e) => fail(e),
            }
        }
        EmitStage::Json => {
            let input = match single_input(&cli) {
                Ok(p) => p,
                Err(code) => return code,
            };
            let mut module = match pipeline::load_module(input) {
                Ok(m) => m,
                Err(e) => return fail(e),
            };
            let result = match pipeline::weave_module(&mut module, &options) {
                Ok(r) => r,
                Err(e) => return fail(e),
            };
            for diag in &result.diagnostics {
                eprintln!("aiw: {}", diag);
            }
            match pipeline::render_module(&module, ModuleFormat::Json, input) {
                Ok(json) => print!("{}", json),
                Err(e) => return fail(e),
            }
            if result.has_errors() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        EmitStage::Module => weave_files(&cli, &options),
    }
}

fn weave_files(cli: &Cli, options: &WeaveOptions) -> ExitCode {
    let jobs: Vec<Job> = match (&cli.output, cli.inputs.as_slice()) {
        (Some(output), [input]) => vec![Job {
            input: input.clone(),
            output: output.clone(),
        }],
        (Some(_), _) => return fail("--output requires exactly one input"),
        (None, inputs) => inputs.iter().map(Job::in_place).collect(),
    };

    let mut manifest = match &cli.manifest {
        Some(path) => match Manifest::load(path) {
            Ok(m) => Some(m),
            Err(e) => return fail(e),
        },
        None => None,
    };

    let outcomes = pipeline::weave_batch(&jobs, options, manifest.as_mut());

    let mut worst = 0u8;
    for outcome in &outcomes {
        let input = outcome.job.input.display();
        match &outcome.status {
            FileStatus::Skipped(reason) => {
                tracing::info!(%input, ?reason, "skipped");
            }
            FileStatus::Woven { result, .. } => {
                for diag in &result.diagnostics {
                    eprintln!("aiw: {}: {}", input, diag);
                }
                if result.has_errors() {
                    worst = worst.max(1);
                }
            }
            FileStatus::Failed(e) => {
                eprintln!("aiw: error: {}", e);
                worst = 2;
            }
        }
    }

    if let (Some(path), Some(manifest)) = (&cli.manifest, &manifest) {
        if let Err(e) = manifest.save(path) {
            return fail(e);
        }
    }
    ExitCode::from(worst)
}
