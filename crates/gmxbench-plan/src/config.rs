//! Build-definition configuration records.
//!
//! Parsed once from a TOML document and immutable thereafter; resolution
//! results live in separate wrapper structs (see [`crate::plan`]), never
//! patched back into these records.

use crate::error::{PlanError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One candidate remote source for reference resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Repository {
    /// Short name used by variant `repo` selectors.
    pub name: String,

    /// Remote URL passed to the listing operation.
    pub url: String,
}

/// Candidate repositories keyed by tool kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryTable {
    /// Compute-library (AdaptiveCpp) repositories.
    #[serde(default)]
    pub acpp: Vec<Repository>,

    /// Target (GROMACS) repositories.
    #[serde(default)]
    pub gromacs: Vec<Repository>,
}

/// A compute-library build variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryVariantConfig {
    /// Unique variant name.
    pub name: String,

    /// Restrict resolution to the named repository; all candidates otherwise.
    #[serde(default)]
    pub repo: Option<String>,

    /// Branch or tag to resolve.
    pub branch: String,

    /// Unique install directory.
    pub directory: String,

    /// Root preset file name under the library preset tree.
    pub cmake_preset: String,
}

/// A target (solver) build variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetVariantConfig {
    /// Unique variant name.
    pub name: String,

    /// Restrict resolution to the named repository; all candidates otherwise.
    #[serde(default)]
    pub repo: Option<String>,

    /// Branch or tag to resolve.
    pub branch: String,

    /// Unique install directory.
    pub directory: String,

    /// Root preset file name under the target preset tree.
    pub cmake_preset: String,

    /// Library variant this build links against.
    pub acpp_variant: String,

    /// Alternate-accelerator build, excluded from the emitted plan.
    #[serde(default)]
    pub hip: bool,

    /// Sweep adaptivity levels for this variant at benchmark time.
    #[serde(default)]
    pub adaptive: bool,

    /// Run PME FFTs on the GPU.
    #[serde(default)]
    pub run_fft: bool,
}

/// Top-level build definitions document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default)]
    pub repositories: RepositoryTable,

    #[serde(default)]
    pub acpp_variants: Vec<LibraryVariantConfig>,

    #[serde(default)]
    pub gromacs_variants: Vec<TargetVariantConfig>,
}

impl BuildConfig {
    /// Look up a target variant by name.
    pub fn target_variant(&self, name: &str) -> Option<&TargetVariantConfig> {
        self.gromacs_variants.iter().find(|v| v.name == name)
    }
}

/// Load build definitions from a TOML file.
pub fn load_build_config(path: &Path) -> Result<BuildConfig> {
    if !path.is_file() {
        return Err(PlanError::Config(format!(
            "build configuration file not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}
