//! Sequential benchmark sweep driver.
//!
//! Iterates the run matrix, applies the time-control policy, and runs each
//! context's convergence loop. One run context failing aborts the whole
//! sweep unless the continue-on-failure policy is selected.

use crate::convergence::{is_converged, run_logged, solver_command};
use crate::error::{Result, RunError};
use crate::matrix::{RunContext, RunMatrix, SelectedVariant};
use crate::params::BenchParams;
use crate::time_control::select_time_control;
use gmxbench_plan::BuildConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Environment overrides forcing synchronous kernel execution for
/// serialized profiling.
const SERIALIZE_OVERRIDES: [(&str, &str); 2] =
    [("AMD_SERIALIZE_COPY", "3"), ("AMD_SERIALIZE_KERNEL", "3")];

/// Profiling switches for a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilingMode {
    Off,
    Profile,
    /// Profile with kernel execution forced synchronous.
    ProfileSerialized,
}

impl ProfilingMode {
    pub fn enabled(&self) -> bool {
        !matches!(self, ProfilingMode::Off)
    }

    pub fn serialized(&self) -> bool {
        matches!(self, ProfilingMode::ProfileSerialized)
    }
}

/// What to do when a run context fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Abort the whole sweep on the first failure.
    #[default]
    Abort,
    /// Record the failure and keep sweeping.
    Continue,
}

/// Lifecycle of one run context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Converged,
    Profiling,
    Done,
    Failed,
}

/// Outcome of one run context.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub variant: String,
    pub level: Option<u32>,
    pub flavor: String,
    pub water_box: String,
    pub iteration: u32,
    pub state: RunState,
    pub convergence_runs: u32,
}

impl RunReport {
    fn new(context: &RunContext) -> Self {
        Self {
            variant: context.variant.name.clone(),
            level: context.level,
            flavor: context.flavor.clone(),
            water_box: context.water_box.clone(),
            iteration: context.iteration,
            state: RunState::Pending,
            convergence_runs: 0,
        }
    }
}

/// Outcome of a whole sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub runs: Vec<RunReport>,
    /// Contexts skipped by time-control rules or missing inputs.
    pub skipped: u32,
}

impl SweepReport {
    pub fn completed_count(&self) -> usize {
        self.runs
            .iter()
            .filter(|r| r.state == RunState::Done)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.runs
            .iter()
            .filter(|r| r.state == RunState::Failed)
            .count()
    }
}

/// Everything a sweep needs besides the benchmark parameters.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Root of the per-run results tree.
    pub results_root: PathBuf,

    /// Directory holding the per-box input trees.
    pub input_root: PathBuf,

    /// Root the variant install directories hang off.
    pub install_root: PathBuf,

    /// Adaptive compilation cache, deleted once at sweep start. Exactly one
    /// sweep may run against a given cache location at a time.
    pub cache_dir: PathBuf,

    pub profiling: ProfilingMode,

    pub on_failure: FailurePolicy,

    /// Base environment the per-run environment derives from.
    pub base_environment: BTreeMap<String, String>,
}

enum ContextOutcome {
    Completed,
    MissingInput,
}

/// Drives the benchmark sweep over the expanded run matrix.
pub struct SweepRunner {
    params: BenchParams,
    config: SweepConfig,
}

impl SweepRunner {
    pub fn new(params: BenchParams, config: SweepConfig) -> Self {
        Self { params, config }
    }

    /// Resolve the benchmark selections against the build definitions.
    pub fn select_variants(
        build: &BuildConfig,
        params: &BenchParams,
    ) -> Result<Vec<SelectedVariant>> {
        params
            .variants_to_run
            .iter()
            .map(|selection| {
                build
                    .target_variant(&selection.name)
                    .map(|variant| SelectedVariant::from_config(variant, selection))
                    .ok_or_else(|| {
                        RunError::Config(format!(
                            "variant '{}' from the benchmark config was not found in the build \
                             definitions",
                            selection.name
                        ))
                    })
            })
            .collect()
    }

    /// Run the full sweep for the given variants.
    pub fn run(&self, variants: Vec<SelectedVariant>) -> Result<SweepReport> {
        self.reset_cache()?;

        let matrix = RunMatrix {
            variants,
            adaptivity_levels: self.params.adaptivity_levels_to_check.clone(),
            flavors: self.params.flavors.clone(),
            water_boxes: self.params.water_boxes.clone(),
        };
        let overrides = self.params.environment_strings();
        let profiling = self.config.profiling.enabled();
        let iterations = self.params.effective_iterations(profiling);

        let mut report = SweepReport::default();
        for iteration in 1..=iterations {
            info!(iteration = iteration, total = iterations, "starting sweep iteration");

            for context in matrix.contexts(iteration) {
                let decision = select_time_control(
                    &context.water_box,
                    iteration,
                    profiling,
                    &self.params.time_control_rules,
                );
                if decision.skip {
                    info!(
                        water_box = %context.water_box,
                        iteration = iteration,
                        "skipping context per time control rules"
                    );
                    report.skipped += 1;
                    continue;
                }

                let mut run = RunReport::new(&context);
                match self.run_context(&context, &decision.args, &overrides, &mut run) {
                    Ok(ContextOutcome::Completed) => report.runs.push(run),
                    Ok(ContextOutcome::MissingInput) => report.skipped += 1,
                    Err(e) => {
                        run.state = RunState::Failed;
                        match self.config.on_failure {
                            FailurePolicy::Abort => return Err(e),
                            FailurePolicy::Continue => {
                                warn!(
                                    variant = %run.variant,
                                    water_box = %run.water_box,
                                    error = %e,
                                    "run context failed; continuing"
                                );
                                report.runs.push(run);
                            }
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    fn run_context(
        &self,
        context: &RunContext,
        time_args: &[String],
        overrides: &BTreeMap<String, String>,
        run: &mut RunReport,
    ) -> Result<ContextOutcome> {
        let out_dir = context.output_dir(&self.config.results_root);
        let tpr = context.input_file(&self.config.input_root);
        let executable = context.solver_executable(&self.config.install_root);
        let env = context.environment(&self.config.base_environment, overrides);

        info!(
            variant = %context.variant_dir_name(),
            flavor = %context.flavor,
            water_box = %context.water_box,
            "processing run context"
        );

        std::fs::create_dir_all(&out_dir)?;
        if !tpr.is_file() {
            warn!(tpr = %tpr.display(), "input file not found, skipping");
            return Ok(ContextOutcome::MissingInput);
        }

        run.state = RunState::Running;
        loop {
            run.convergence_runs += 1;
            info!(attempt = run.convergence_runs, "convergence run");

            let outfile = out_dir.join(format!("out_convergence_{}.log", run.convergence_runs));
            let command = solver_command(
                &executable,
                context.pme(),
                context.pmefft(),
                self.params.ncpu,
                &tpr,
                time_args,
                true,
            );
            run_logged(&command, &out_dir, &env, &outfile)?;

            if is_converged(&outfile) {
                info!("adaptive compilation cache stabilized");
                run.state = RunState::Converged;
                break;
            }

            info!("cache still populating, re-running");
            // Stale solver logs would poison the next convergence check.
            let solver_log = out_dir.join("md.log");
            if solver_log.exists() {
                std::fs::remove_file(&solver_log)?;
            }
        }

        if self.config.profiling.enabled() {
            run.state = RunState::Profiling;
            info!("running profiled benchmark");

            let outfile = out_dir.join(format!("out_final_iter_{}.log", context.iteration));
            let solver = solver_command(
                &executable,
                context.pme(),
                context.pmefft(),
                self.params.ncpu,
                &tpr,
                time_args,
                false,
            );
            let mut command = self.params.profiler_command.clone();
            command.extend(solver);

            let mut env = env.clone();
            if self.config.profiling.serialized() {
                for (key, value) in SERIALIZE_OVERRIDES {
                    env.insert(key.to_string(), value.to_string());
                }
            }
            run_logged(&command, &out_dir, &env, &outfile)?;
        }

        run.state = RunState::Done;
        Ok(ContextOutcome::Completed)
    }

    /// Delete the adaptive compilation cache so convergence detection starts
    /// from a cold state.
    fn reset_cache(&self) -> Result<()> {
        let cache = &self.config.cache_dir;
        if cache.exists() {
            info!(cache = %cache.display(), "removing adaptive compilation cache");
            std::fs::remove_dir_all(cache)?;
        }
        Ok(())
    }
}
