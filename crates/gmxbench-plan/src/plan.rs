//! Variant plan building.
//!
//! Composes reference resolution and preset flattening per declared variant:
//! library variants first, then target variants linking against them. Any
//! failure aborts the whole build; no partial plan is ever produced.

use crate::config::{BuildConfig, Repository};
use crate::error::{PlanError, Result};
use crate::preset::{flatten_presets, PresetCopy, PresetKind};
use crate::resolve::{resolve_reference, RemoteRefLister};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::info;

/// A library variant with its resolved commit and flattened preset set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedLibraryVariant {
    pub name: String,
    pub repo_url: String,
    pub branch: String,
    pub commit: String,
    pub directory: String,
    pub cmake_preset: String,
    pub presets: Vec<PresetCopy>,
}

/// A target variant with its resolved commit, flattened preset set, and the
/// install root inherited from the library variant it links against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedTargetVariant {
    pub name: String,
    pub repo_url: String,
    pub branch: String,
    pub commit: String,
    pub directory: String,
    pub cmake_preset: String,
    pub acpp_variant: String,
    pub acpp_install_root: String,
    pub adaptive: bool,
    pub run_fft: bool,
    pub presets: Vec<PresetCopy>,
}

/// Flat, dependency-ordered build plan: libraries first, then targets, both
/// in declaration order. Serializes to JSON for downstream template
/// rendering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildPlan {
    pub libraries: Vec<ResolvedLibraryVariant>,
    pub targets: Vec<ResolvedTargetVariant>,
}

impl BuildPlan {
    /// Total number of variants in the plan.
    pub fn len(&self) -> usize {
        self.libraries.len() + self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty() && self.targets.is_empty()
    }

    /// Pretty JSON rendering of the plan.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builds a [`BuildPlan`] from declarative variant definitions.
pub struct PlanBuilder<'a> {
    lister: &'a dyn RemoteRefLister,
    base_dir: PathBuf,
}

impl<'a> PlanBuilder<'a> {
    /// `base_dir` is the directory the preset trees are resolved against.
    pub fn new(lister: &'a dyn RemoteRefLister, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            lister,
            base_dir: base_dir.into(),
        }
    }

    pub fn build(&self, config: &BuildConfig) -> Result<BuildPlan> {
        let mut plan = BuildPlan::default();

        // Library variants first; targets link against them by name.
        let mut install_roots: HashMap<String, String> = HashMap::new();
        let mut names = HashSet::new();
        let mut directories = HashSet::new();
        for variant in &config.acpp_variants {
            ensure_unique(&mut names, "name", &variant.name, "library")?;
            ensure_unique(&mut directories, "directory", &variant.directory, "library")?;

            let repositories =
                select_repositories(&config.repositories.acpp, variant.repo.as_deref());
            let reference = resolve_reference(self.lister, &variant.branch, &repositories)?;
            let presets =
                flatten_presets(&self.base_dir, &variant.cmake_preset, PresetKind::Library)?;

            info!(
                variant = %variant.name,
                commit = %reference.commit,
                presets = presets.len(),
                "resolved library variant"
            );
            install_roots.insert(variant.name.clone(), variant.directory.clone());
            plan.libraries.push(ResolvedLibraryVariant {
                name: variant.name.clone(),
                repo_url: reference.repo_url,
                branch: variant.branch.clone(),
                commit: reference.commit,
                directory: variant.directory.clone(),
                cmake_preset: variant.cmake_preset.clone(),
                presets,
            });
        }

        let mut names = HashSet::new();
        let mut directories = HashSet::new();
        for variant in &config.gromacs_variants {
            ensure_unique(&mut names, "name", &variant.name, "target")?;
            ensure_unique(&mut directories, "directory", &variant.directory, "target")?;

            let install_root = install_roots.get(&variant.acpp_variant).ok_or_else(|| {
                PlanError::UnknownDependency {
                    variant: variant.name.clone(),
                    dependency: variant.acpp_variant.clone(),
                }
            })?;

            if variant.hip {
                info!(variant = %variant.name, "excluding alternate-accelerator variant");
                continue;
            }

            let repositories =
                select_repositories(&config.repositories.gromacs, variant.repo.as_deref());
            let reference = resolve_reference(self.lister, &variant.branch, &repositories)?;
            let presets =
                flatten_presets(&self.base_dir, &variant.cmake_preset, PresetKind::Target)?;

            info!(
                variant = %variant.name,
                commit = %reference.commit,
                install_root = %install_root,
                "resolved target variant"
            );
            plan.targets.push(ResolvedTargetVariant {
                name: variant.name.clone(),
                repo_url: reference.repo_url,
                branch: variant.branch.clone(),
                commit: reference.commit,
                directory: variant.directory.clone(),
                cmake_preset: variant.cmake_preset.clone(),
                acpp_variant: variant.acpp_variant.clone(),
                acpp_install_root: install_root.clone(),
                adaptive: variant.adaptive,
                run_fft: variant.run_fft,
                presets,
            });
        }

        Ok(plan)
    }
}

/// Repositories to search: the named one when a selector is present, all
/// candidates otherwise.
fn select_repositories(candidates: &[Repository], selector: Option<&str>) -> Vec<Repository> {
    match selector {
        Some(name) => candidates
            .iter()
            .filter(|r| r.name == name)
            .cloned()
            .collect(),
        None => candidates.to_vec(),
    }
}

fn ensure_unique(
    seen: &mut HashSet<String>,
    field: &'static str,
    value: &str,
    scope: &'static str,
) -> Result<()> {
    if !seen.insert(value.to_string()) {
        return Err(PlanError::DuplicateField {
            field,
            value: value.to_string(),
            scope,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LibraryVariantConfig, RepositoryTable, TargetVariantConfig};
    use crate::fakes::StaticRefLister;
    use crate::resolve::RefNamespace;
    use std::path::Path;

    const ACPP_URL: &str = "https://git.example.com/acpp.git";
    const GMX_URL: &str = "https://git.example.com/gromacs.git";

    fn write_preset(base: &Path, rel: &str) {
        let path = base.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{ "version": 6 }"#).unwrap();
    }

    fn preset_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write_preset(dir.path(), "presets/acpp/generic.json");
        write_preset(dir.path(), "presets/gromacs/sycl.json");
        dir
    }

    fn lister() -> StaticRefLister {
        StaticRefLister::new()
            .advertise(ACPP_URL, RefNamespace::Heads, "develop", "a1b2c3")
            .advertise(GMX_URL, RefNamespace::Heads, "release-2025", "d4e5f6")
    }

    fn library(name: &str, directory: &str) -> LibraryVariantConfig {
        LibraryVariantConfig {
            name: name.to_string(),
            repo: None,
            branch: "develop".to_string(),
            directory: directory.to_string(),
            cmake_preset: "generic.json".to_string(),
        }
    }

    fn target(name: &str, directory: &str, acpp_variant: &str) -> TargetVariantConfig {
        TargetVariantConfig {
            name: name.to_string(),
            repo: None,
            branch: "release-2025".to_string(),
            directory: directory.to_string(),
            cmake_preset: "sycl.json".to_string(),
            acpp_variant: acpp_variant.to_string(),
            hip: false,
            adaptive: false,
            run_fft: false,
        }
    }

    fn config(
        libraries: Vec<LibraryVariantConfig>,
        targets: Vec<TargetVariantConfig>,
    ) -> BuildConfig {
        BuildConfig {
            repositories: RepositoryTable {
                acpp: vec![Repository {
                    name: "upstream".to_string(),
                    url: ACPP_URL.to_string(),
                }],
                gromacs: vec![Repository {
                    name: "upstream".to_string(),
                    url: GMX_URL.to_string(),
                }],
            },
            acpp_variants: libraries,
            gromacs_variants: targets,
        }
    }

    #[test]
    fn target_inherits_library_install_root() {
        let tree = preset_tree();
        let lister = lister();
        let builder = PlanBuilder::new(&lister, tree.path());

        let plan = builder
            .build(&config(
                vec![library("acpp-main", "opt/acpp-main")],
                vec![target("gmx-sycl", "opt/gmx-sycl", "acpp-main")],
            ))
            .unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.libraries[0].commit, "a1b2c3");
        assert_eq!(plan.targets[0].commit, "d4e5f6");
        assert_eq!(plan.targets[0].acpp_install_root, "opt/acpp-main");
    }

    #[test]
    fn duplicate_library_name_fails_before_resolution() {
        let tree = preset_tree();
        let lister = StaticRefLister::new().advertise(
            ACPP_URL,
            RefNamespace::Heads,
            "develop",
            "a1b2c3",
        );
        let builder = PlanBuilder::new(&lister, tree.path());

        // The duplicate record's branch is unresolvable; seeing
        // DuplicateField rather than ReferenceNotFound proves the
        // uniqueness check fires before its network lookup.
        let mut duplicate = library("acpp-main", "opt/b");
        duplicate.branch = "ghost-branch".to_string();

        let err = builder
            .build(&config(
                vec![library("acpp-main", "opt/a"), duplicate],
                vec![],
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            PlanError::DuplicateField { field: "name", .. }
        ));
    }

    #[test]
    fn duplicate_library_directory_fails() {
        let tree = preset_tree();
        let lister = lister();
        let builder = PlanBuilder::new(&lister, tree.path());

        let err = builder
            .build(&config(
                vec![library("a", "opt/same"), library("b", "opt/same")],
                vec![],
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            PlanError::DuplicateField {
                field: "directory",
                ..
            }
        ));
    }

    #[test]
    fn unknown_library_dependency_fails() {
        let tree = preset_tree();
        let lister = lister();
        let builder = PlanBuilder::new(&lister, tree.path());

        let err = builder
            .build(&config(
                vec![library("acpp-main", "opt/acpp-main")],
                vec![target("gmx-sycl", "opt/gmx-sycl", "acpp-ghost")],
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            PlanError::UnknownDependency { dependency, .. } if dependency == "acpp-ghost"
        ));
    }

    #[test]
    fn hip_variant_is_excluded_but_still_checked_for_collisions() {
        let tree = preset_tree();
        let lister = lister();
        let builder = PlanBuilder::new(&lister, tree.path());

        let mut hip_variant = target("gmx-hip", "opt/gmx-hip", "acpp-main");
        hip_variant.hip = true;

        let plan = builder
            .build(&config(
                vec![library("acpp-main", "opt/acpp-main")],
                vec![
                    hip_variant.clone(),
                    target("gmx-sycl", "opt/gmx-sycl", "acpp-main"),
                ],
            ))
            .unwrap();
        assert_eq!(plan.targets.len(), 1);
        assert_eq!(plan.targets[0].name, "gmx-sycl");

        // The excluded variant still occupies its name in the uniqueness table.
        let mut duplicate = target("gmx-hip", "opt/gmx-other", "acpp-main");
        duplicate.hip = false;
        let err = builder
            .build(&config(
                vec![library("acpp-main", "opt/acpp-main")],
                vec![hip_variant, duplicate],
            ))
            .unwrap_err();
        assert!(matches!(err, PlanError::DuplicateField { .. }));
    }

    #[test]
    fn repo_selector_restricts_the_search() {
        let tree = preset_tree();
        // The branch exists in both repositories; unrestricted resolution
        // would be ambiguous.
        let lister = StaticRefLister::new()
            .advertise(ACPP_URL, RefNamespace::Heads, "develop", "a1b2c3")
            .advertise("https://other.example/acpp.git", RefNamespace::Heads, "develop", "ffff");
        let builder = PlanBuilder::new(&lister, tree.path());

        let mut config = config(vec![library("acpp-main", "opt/acpp-main")], vec![]);
        config.repositories.acpp.push(Repository {
            name: "other".to_string(),
            url: "https://other.example/acpp.git".to_string(),
        });

        let err = builder.build(&config).unwrap_err();
        assert!(matches!(err, PlanError::AmbiguousReference { .. }));

        config.acpp_variants[0].repo = Some("other".to_string());
        let plan = builder.build(&config).unwrap();
        assert_eq!(plan.libraries[0].commit, "ffff");
        assert_eq!(plan.libraries[0].repo_url, "https://other.example/acpp.git");
    }

    #[test]
    fn plan_serializes_to_json() {
        let tree = preset_tree();
        let lister = lister();
        let builder = PlanBuilder::new(&lister, tree.path());

        let plan = builder
            .build(&config(
                vec![library("acpp-main", "opt/acpp-main")],
                vec![target("gmx-sycl", "opt/gmx-sycl", "acpp-main")],
            ))
            .unwrap();

        let json = plan.to_json().unwrap();
        let parsed: BuildPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.targets[0].acpp_install_root, "opt/acpp-main");
    }
}
