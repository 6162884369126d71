//! Run-matrix expansion and per-run context derivation.
//!
//! The cross product of selected variants, adaptivity levels, flavors and
//! water boxes is an explicit lazy sequence of [`RunContext`] values, so the
//! matrix can be inspected and tested without executing anything.

use crate::params::RunSelection;
use gmxbench_plan::TargetVariantConfig;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment keys ending in this suffix are prepended to the inherited
/// value of the stripped key instead of overwriting it.
pub const PREPEND_SUFFIX: &str = "_PREFIX";

/// Environment variable selecting the adaptivity level for a run.
pub const ADAPTIVITY_LEVEL_VAR: &str = "ACPP_ADAPTIVITY_LEVEL";

/// Merge config overrides into a copy of the base environment. The base map
/// is never mutated, so sibling contexts cannot observe each other's
/// overrides.
pub fn merge_environment(
    base: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut env = base.clone();
    for (key, value) in overrides {
        if let Some(base_key) = key.strip_suffix(PREPEND_SUFFIX) {
            let existing = env.get(base_key).cloned().unwrap_or_default();
            env.insert(base_key.to_string(), format!("{value}{existing}"));
        } else {
            env.insert(key.clone(), value.clone());
        }
    }
    env
}

/// One benchmark target selected to run, with its per-run flags resolved.
/// The selection's `run_fft` wins over the build definition's.
#[derive(Debug, Clone)]
pub struct SelectedVariant {
    pub name: String,
    pub directory: String,
    pub adaptive: bool,
    pub run_fft: bool,
}

impl SelectedVariant {
    pub fn from_config(variant: &TargetVariantConfig, selection: &RunSelection) -> Self {
        Self {
            name: variant.name.clone(),
            directory: variant.directory.clone(),
            adaptive: variant.adaptive,
            run_fft: selection.run_fft,
        }
    }
}

/// One coordinate of the benchmark run matrix.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub variant: SelectedVariant,
    pub level: Option<u32>,
    pub flavor: String,
    pub water_box: String,
    pub iteration: u32,
}

impl RunContext {
    /// `rf` runs let the solver pick the PME placement; everything else pins
    /// it to the GPU.
    pub fn pme(&self) -> &'static str {
        if self.flavor == "rf" {
            "auto"
        } else {
            "gpu"
        }
    }

    pub fn pmefft(&self) -> &'static str {
        if self.variant.run_fft {
            "gpu"
        } else {
            "cpu"
        }
    }

    /// Results directory name for this variant, suffixed with the adaptivity
    /// level when one is set.
    pub fn variant_dir_name(&self) -> String {
        match self.level {
            Some(level) => format!("{}_al{}", self.variant.name, level),
            None => self.variant.name.clone(),
        }
    }

    pub fn output_dir(&self, results_root: &Path) -> PathBuf {
        results_root
            .join(self.variant_dir_name())
            .join(&self.water_box)
            .join(&self.flavor)
    }

    pub fn input_file(&self, input_root: &Path) -> PathBuf {
        input_root
            .join(&self.water_box)
            .join(&self.flavor)
            .join("water.tpr")
    }

    pub fn solver_executable(&self, install_root: &Path) -> PathBuf {
        install_root
            .join(&self.variant.directory)
            .join("build")
            .join("bin")
            .join("gmx")
    }

    /// Per-run environment: overrides merged into a copy of the base, plus
    /// the adaptivity level when one is set.
    pub fn environment(
        &self,
        base: &BTreeMap<String, String>,
        overrides: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        let mut env = merge_environment(base, overrides);
        if let Some(level) = self.level {
            env.insert(ADAPTIVITY_LEVEL_VAR.to_string(), level.to_string());
        }
        env
    }
}

/// Lazy cross product of variants × adaptivity levels × flavors × water
/// boxes.
#[derive(Debug, Clone)]
pub struct RunMatrix {
    pub variants: Vec<SelectedVariant>,
    pub adaptivity_levels: Vec<u32>,
    pub flavors: Vec<String>,
    pub water_boxes: Vec<String>,
}

impl RunMatrix {
    /// Contexts for one sweep iteration, in execution order. Non-adaptive
    /// variants appear once with no level; adaptive variants appear once per
    /// configured level.
    pub fn contexts(&self, iteration: u32) -> impl Iterator<Item = RunContext> + '_ {
        self.variants.iter().flat_map(move |variant| {
            let levels: Vec<Option<u32>> = if variant.adaptive {
                self.adaptivity_levels.iter().copied().map(Some).collect()
            } else {
                vec![None]
            };
            levels.into_iter().flat_map(move |level| {
                self.flavors.iter().flat_map(move |flavor| {
                    self.water_boxes.iter().map(move |water_box| RunContext {
                        variant: variant.clone(),
                        level,
                        flavor: flavor.clone(),
                        water_box: water_box.clone(),
                        iteration,
                    })
                })
            })
        })
    }
}
