//! gmxbench build-plan resolution.
//!
//! Turns declarative build definitions (named library and target variants
//! referencing git branches/tags across candidate repositories, plus CMake
//! preset files that recursively include other preset files) into a flat,
//! deduplicated, dependency-ordered build plan ready for template rendering.

pub mod config;
pub mod error;
pub mod fakes;
pub mod plan;
pub mod preset;
pub mod resolve;

pub use config::{
    load_build_config, BuildConfig, LibraryVariantConfig, Repository, RepositoryTable,
    TargetVariantConfig,
};
pub use error::{PlanError, Result};
pub use plan::{BuildPlan, PlanBuilder, ResolvedLibraryVariant, ResolvedTargetVariant};
pub use preset::{flatten_presets, PresetCopy, PresetKind, ROOT_PRESET_DEST};
pub use resolve::{
    resolve_reference, GitRefLister, RefNamespace, RemoteRefLister, ResolvedReference,
};

/// gmxbench version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
