//! gmxbench - multi-variant GROMACS benchmark orchestration CLI.
//!
//! ## Commands
//!
//! - `plan`: resolve build variants into a flat build plan (JSON on stdout)
//! - `run`: execute the convergence-driven benchmark sweep

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gmxbench_plan::{load_build_config, GitRefLister, PlanBuilder};
use gmxbench_run::{
    load_bench_params, FailurePolicy, ProfilingMode, RunError, SweepConfig, SweepRunner,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "gmxbench")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-variant GROMACS benchmark orchestrator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve build variants into a flat build plan
    Plan {
        /// Path to the build definition TOML file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Directory the preset trees are resolved against
        #[arg(long, default_value = ".")]
        base_dir: PathBuf,
    },

    /// Execute the benchmark sweep against installed variants
    Run {
        /// Path to the main build definition TOML file
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,

        /// Path to the benchmark-specific TOML file
        #[arg(long)]
        bench_config: PathBuf,

        /// Name for the root benchmark results directory
        #[arg(long)]
        dirname: String,

        /// Enable profiling mode
        #[arg(long)]
        profile: bool,

        /// Enable serialized profiling (implies --profile)
        #[arg(long)]
        profile_serialize: bool,

        /// Record failed run contexts and keep sweeping instead of aborting
        #[arg(long)]
        continue_on_failure: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Plan { config, base_dir } => cmd_plan(&config, &base_dir),
        Commands::Run {
            config,
            bench_config,
            dirname,
            profile,
            profile_serialize,
            continue_on_failure,
        } => cmd_run(
            &config,
            &bench_config,
            &dirname,
            profile,
            profile_serialize,
            continue_on_failure,
        ),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

/// Initialise the global tracing subscriber with an `EnvFilter` and optional
/// JSON formatting. Respects `RUST_LOG`; safe to call more than once.
fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

/// Solver failures propagate their exit code; everything else is a plain
/// validation/config failure.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<RunError>() {
        Some(RunError::ExternalCommandFailed { code, .. }) => (*code).clamp(1, 255) as u8,
        _ => 1,
    }
}

/// Resolve build variants and print the plan as JSON.
fn cmd_plan(config_path: &Path, base_dir: &Path) -> Result<()> {
    let config = load_build_config(config_path).context("failed to load build definitions")?;
    info!(config = %config_path.display(), "loaded build definitions");

    let lister = GitRefLister;
    let plan = PlanBuilder::new(&lister, base_dir)
        .build(&config)
        .context("build plan failed")?;

    info!(
        libraries = plan.libraries.len(),
        targets = plan.targets.len(),
        "build plan resolved"
    );
    println!("{}", plan.to_json()?);
    Ok(())
}

/// Load both configuration documents and execute the benchmark sweep.
fn cmd_run(
    config_path: &Path,
    bench_config_path: &Path,
    dirname: &str,
    profile: bool,
    profile_serialize: bool,
    continue_on_failure: bool,
) -> Result<()> {
    let profiling = if profile_serialize {
        ProfilingMode::ProfileSerialized
    } else if profile {
        ProfilingMode::Profile
    } else {
        ProfilingMode::Off
    };

    let build = load_build_config(config_path).context("failed to load build definitions")?;
    let params =
        load_bench_params(bench_config_path).context("failed to load benchmark parameters")?;
    params.validate()?;

    info!(config = %config_path.display(), "loaded build definitions");
    info!(bench_config = %bench_config_path.display(), "loaded benchmark parameters");

    let root = std::env::current_dir().context("failed to get current directory")?;
    let sweep_config = SweepConfig {
        results_root: root.join("benchmark_results").join(dirname),
        input_root: root.join(&params.water_box_source_dir),
        install_root: params.install_root.clone(),
        cache_dir: params.resolve_cache_dir(),
        profiling,
        on_failure: if continue_on_failure {
            FailurePolicy::Continue
        } else {
            FailurePolicy::Abort
        },
        base_environment: std::env::vars().collect(),
    };

    let variants = SweepRunner::select_variants(&build, &params)?;
    info!(
        variants = ?variants.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
        "will run the specified variants"
    );

    let runner = SweepRunner::new(params, sweep_config);
    let report = runner.run(variants).context("benchmark sweep failed")?;

    println!(
        "Sweep complete: {} runs ({} failed), {} contexts skipped",
        report.runs.len(),
        report.failed_count(),
        report.skipped
    );
    Ok(())
}
