//! Benchmark parameter configuration (the `[benchmark]` section).

use crate::error::{Result, RunError};
use crate::time_control::TimeControlRule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

fn default_ncpu() -> u32 {
    32
}

fn default_iterations() -> u32 {
    5
}

fn default_profile_iterations() -> u32 {
    1
}

fn default_water_box_source_dir() -> String {
    "grappa-1.5k-6.1M_rc0.9".to_string()
}

fn default_install_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_profiler_command() -> Vec<String> {
    [
        "/opt/rocm/bin/rocprofv2",
        "--kernel-trace",
        "--plugin",
        "file",
        "-o",
        "kernel_trace",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// One benchmark target selected to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSelection {
    /// Target variant name, as declared in the build definitions.
    pub name: String,

    /// Run PME FFTs on the GPU for this selection.
    #[serde(default)]
    pub run_fft: bool,
}

/// Benchmark parameters, immutable after load.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BenchParams {
    /// OpenMP threads per solver invocation.
    pub ncpu: u32,

    /// Sweep iterations in normal mode.
    pub iterations: u32,

    /// Sweep iterations in profiling mode.
    pub profile_iterations: u32,

    /// Electrostatics modes to benchmark.
    pub flavors: Vec<String>,

    /// Problem-size identifiers, smallest first.
    pub water_boxes: Vec<String>,

    /// Threshold table, ascending by `max_box_size`.
    pub time_control_rules: Vec<TimeControlRule>,

    /// Per-run environment overrides. Keys ending in `_PREFIX` are prepended
    /// to the inherited value of the stripped key instead of overwriting it.
    pub environment: BTreeMap<String, toml::Value>,

    /// Target variants to benchmark.
    pub variants_to_run: Vec<RunSelection>,

    /// Adaptivity levels swept for variants marked adaptive.
    pub adaptivity_levels_to_check: Vec<u32>,

    /// Directory holding the per-box input trees.
    pub water_box_source_dir: String,

    /// Root the variant install directories hang off.
    pub install_root: PathBuf,

    /// Adaptive compilation cache location; `$HOME/.acpp` when unset.
    pub cache_dir: Option<PathBuf>,

    /// Launcher the profiled run is wrapped with.
    pub profiler_command: Vec<String>,
}

impl Default for BenchParams {
    fn default() -> Self {
        Self {
            ncpu: default_ncpu(),
            iterations: default_iterations(),
            profile_iterations: default_profile_iterations(),
            flavors: Vec::new(),
            water_boxes: Vec::new(),
            time_control_rules: Vec::new(),
            environment: BTreeMap::new(),
            variants_to_run: Vec::new(),
            adaptivity_levels_to_check: Vec::new(),
            water_box_source_dir: default_water_box_source_dir(),
            install_root: default_install_root(),
            cache_dir: None,
            profiler_command: default_profiler_command(),
        }
    }
}

impl BenchParams {
    /// Check the keys a sweep cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.variants_to_run.is_empty() {
            return Err(RunError::Config(
                "'variants_to_run' cannot be empty; specify which variants to run".to_string(),
            ));
        }
        if self.adaptivity_levels_to_check.is_empty() {
            return Err(RunError::Config(
                "'adaptivity_levels_to_check' cannot be empty".to_string(),
            ));
        }
        if self.flavors.is_empty()
            || self.water_boxes.is_empty()
            || self.time_control_rules.is_empty()
            || self.environment.is_empty()
        {
            return Err(RunError::Config(
                "one or more required keys (flavors, water_boxes, time_control_rules, \
                 environment) are missing from the [benchmark] section"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Iteration count for the given mode.
    pub fn effective_iterations(&self, profiling: bool) -> u32 {
        if profiling {
            self.profile_iterations
        } else {
            self.iterations
        }
    }

    /// Environment overrides with TOML scalars rendered to strings.
    pub fn environment_strings(&self) -> BTreeMap<String, String> {
        self.environment
            .iter()
            .map(|(key, value)| {
                let rendered = match value {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), rendered)
            })
            .collect()
    }

    /// Cache directory, falling back to `$HOME/.acpp`.
    pub fn resolve_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".acpp")
        })
    }
}

/// Wrapper for the `[benchmark]` table of the benchmark config document.
#[derive(Debug, Clone, Default, Deserialize)]
struct BenchDocument {
    #[serde(default)]
    benchmark: BenchParams,
}

/// Load benchmark parameters from a TOML file.
pub fn load_bench_params(path: &Path) -> Result<BenchParams> {
    if !path.is_file() {
        return Err(RunError::Config(format!(
            "benchmark configuration file not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    let document: BenchDocument = toml::from_str(&content)?;
    Ok(document.benchmark)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[benchmark]
ncpu = 16
iterations = 3
flavors = ["rf", "pme"]
water_boxes = ["0001.5", "0012"]
variants_to_run = [{ name = "gmx-sycl", run_fft = true }, { name = "gmx-base" }]
adaptivity_levels_to_check = [0, 1, 2]

[[benchmark.time_control_rules]]
max_box_size = 2.0
nsteps = 100
resetstep = 50

[[benchmark.time_control_rules]]
max_box_size = 100.0
nsteps = 50
resetstep = 25
iteration_cutoff = 2

[benchmark.environment]
ACPP_JIT_COMPILE = 1
LD_LIBRARY_PATH_PREFIX = "/opt/acpp/lib:"
"#;

    #[test]
    fn parses_and_fills_defaults() {
        let document: BenchDocument = toml::from_str(SAMPLE).unwrap();
        let params = document.benchmark;

        assert_eq!(params.ncpu, 16);
        assert_eq!(params.iterations, 3);
        assert_eq!(params.profile_iterations, 1);
        assert_eq!(params.flavors, ["rf", "pme"]);
        assert_eq!(params.water_boxes.len(), 2);
        assert_eq!(params.time_control_rules.len(), 2);
        assert_eq!(params.time_control_rules[1].iteration_cutoff, Some(2));
        assert_eq!(params.variants_to_run.len(), 2);
        assert!(params.variants_to_run[0].run_fft);
        assert!(!params.variants_to_run[1].run_fft);
        assert_eq!(params.water_box_source_dir, "grappa-1.5k-6.1M_rc0.9");
        assert_eq!(params.install_root, PathBuf::from("/"));
        assert_eq!(params.profiler_command[0], "/opt/rocm/bin/rocprofv2");
        assert!(params.validate().is_ok());
    }

    #[test]
    fn environment_scalars_render_to_strings() {
        let document: BenchDocument = toml::from_str(SAMPLE).unwrap();
        let env = document.benchmark.environment_strings();

        assert_eq!(env.get("ACPP_JIT_COMPILE").map(String::as_str), Some("1"));
        assert_eq!(
            env.get("LD_LIBRARY_PATH_PREFIX").map(String::as_str),
            Some("/opt/acpp/lib:")
        );
    }

    #[test]
    fn empty_variants_to_run_fails_validation() {
        let mut params = toml::from_str::<BenchDocument>(SAMPLE).unwrap().benchmark;
        params.variants_to_run.clear();
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("variants_to_run"));
    }

    #[test]
    fn empty_adaptivity_levels_fails_validation() {
        let mut params = toml::from_str::<BenchDocument>(SAMPLE).unwrap().benchmark;
        params.adaptivity_levels_to_check.clear();
        assert!(params.validate().is_err());
    }

    #[test]
    fn missing_required_sections_fail_validation() {
        let mut params = toml::from_str::<BenchDocument>(SAMPLE).unwrap().benchmark;
        params.time_control_rules.clear();
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("time_control_rules"));
    }

    #[test]
    fn profiling_switches_the_iteration_count() {
        let params = toml::from_str::<BenchDocument>(SAMPLE).unwrap().benchmark;
        assert_eq!(params.effective_iterations(false), 3);
        assert_eq!(params.effective_iterations(true), 1);
    }

    #[test]
    fn explicit_cache_dir_wins_over_home_fallback() {
        let mut params = BenchParams::default();
        params.cache_dir = Some(PathBuf::from("/scratch/acpp-cache"));
        assert_eq!(
            params.resolve_cache_dir(),
            PathBuf::from("/scratch/acpp-cache")
        );
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_bench_params(&dir.path().join("bench.toml")).unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
    }
}
