//! gmxbench benchmark execution.
//!
//! Expands the benchmark run matrix (variant × adaptivity level × flavor ×
//! water box), applies the rule-based time-control policy, and drives the
//! external solver until its adaptive compilation cache stabilizes.
//! Strictly sequential: every subprocess blocks until completion.

pub mod convergence;
pub mod error;
pub mod matrix;
pub mod params;
pub mod sweep;
pub mod time_control;

pub use convergence::{is_converged, run_logged, solver_command, CACHE_MARKER};
pub use error::{Result, RunError};
pub use matrix::{
    merge_environment, RunContext, RunMatrix, SelectedVariant, ADAPTIVITY_LEVEL_VAR,
    PREPEND_SUFFIX,
};
pub use params::{load_bench_params, BenchParams, RunSelection};
pub use sweep::{
    FailurePolicy, ProfilingMode, RunReport, RunState, SweepConfig, SweepReport, SweepRunner,
};
pub use time_control::{select_time_control, TimeControlDecision, TimeControlRule};
