//! schema-acquire CLI
//!
//! Usage:
//!   schema-acquire [run]              Acquire schemas, then build/test/lint/doc
//!   schema-acquire acquire            Acquire schemas only
//!   schema-acquire clean              Remove schemas and build output
//!   schema-acquire status             Show completion markers
//!   schema-acquire invalidate <name>  Force re-acquisition of an artifact
//!   schema-acquire hash <file>        Print digests for pinning a bundle

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use schema_acquire::acquire::compute_hashes;
use schema_acquire::{ArtifactOutcome, Config, MarkerId, Orchestrator, RunReport, output};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "schema-acquire")]
#[command(about = "Pinned acquisition of Redfish and Swordfish CSDL schemas")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Project root containing the work and target directories
    #[arg(short = 'C', long, global = true, default_value = ".", env = "SCHEMA_PROJECT_ROOT")]
    project_root: PathBuf,

    /// Configuration file (defaults to <project-root>/schemas.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Acquire artifacts concurrently
    #[arg(long, global = true)]
    parallel: bool,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire all artifacts, then run build, test, lint and doc
    Run,

    /// Acquire all artifacts without running the toolchain
    Acquire,

    /// Remove the work directory and the toolchain target directory
    Clean,

    /// Show which completion markers are present
    Status,

    /// Clear artifact markers so the next run downloads them again
    Invalidate {
        /// Artifact names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Print SHA-256 and BLAKE3 digests of a downloaded bundle
    Hash {
        /// File to hash
        file: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "schema_acquire=debug"
    } else {
        "schema_acquire=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(&cli.project_root, cli.config.as_deref()).with_context(|| {
        format!(
            "Failed to load configuration for {}",
            cli.project_root.display()
        )
    })?;
    if cli.parallel {
        config.parallel = true;
    }
    Ok(config)
}

fn print_report(report: &RunReport) {
    for (name, outcome) in &report.artifacts {
        match outcome {
            ArtifactOutcome::Skipped => output::info(&format!("{}: up to date", name)),
            ArtifactOutcome::Acquired { files } => {
                output::info(&format!("{}: {} schema files acquired", name, files))
            }
        }
    }
}

fn print_status(config: &Config, orchestrator: &Orchestrator) {
    output::action(&format!("Markers in {}", config.work_dir.display()));
    for (id, present) in orchestrator.status() {
        let status = if present { "present" } else { "absent" };
        output::list_item(&id.to_string(), status, present);

        if let MarkerId::Artifact { name, .. } = &id
            && present
            && let Some(spec) = config.artifact(name)
            && !config.work_dir.join(&spec.destination).is_dir()
        {
            output::warning(&format!(
                "{} is marked but {} is missing; run `schema-acquire invalidate {}`",
                name,
                spec.destination.display(),
                name
            ));
        }
    }
}

fn print_hashes(file: &Path) -> Result<()> {
    let hashes =
        compute_hashes(file).with_context(|| format!("Failed to hash {}", file.display()))?;
    println!("sha256:{}", hashes.sha256);
    println!("blake3:{}", hashes.blake3);
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    match cli.command.as_ref().unwrap_or(&Commands::Run) {
        Commands::Run => {
            let report = Orchestrator::from_config(load_config(cli)?)
                .run()
                .context("Pipeline failed")?;
            print_report(&report);
            output::success("Schemas ready, all stages passed");
        }
        Commands::Acquire => {
            let report = Orchestrator::from_config(load_config(cli)?)
                .acquire()
                .context("Acquisition failed")?;
            print_report(&report);
            output::success("Schemas ready");
        }
        Commands::Clean => {
            schema_acquire::clean(&load_config(cli)?).context("Clean failed")?;
            output::success("Clean");
        }
        Commands::Status => {
            let config = load_config(cli)?;
            let orchestrator = Orchestrator::from_config(config.clone());
            print_status(&config, &orchestrator);
        }
        Commands::Invalidate { names } => {
            Orchestrator::from_config(load_config(cli)?)
                .invalidate(names)
                .context("Invalidate failed")?;
            output::success(&format!("Invalidated {}", names.join(", ")));
        }
        // No project configuration needed.
        Commands::Hash { file } => print_hashes(file)?,
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}
