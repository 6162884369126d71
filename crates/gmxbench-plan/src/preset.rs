//! CMake preset include-graph flattening.
//!
//! A variant's root preset file may declare an `include` array of further
//! preset files, each resolved relative to the including file's directory.
//! Flattening produces the ordered set of files to materialize into the
//! build tree: breadth-first, deduplicated by first discovery, with the root
//! always mapped to the fixed top-level preset name.

use crate::error::{PlanError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// Destination name every root preset maps to.
pub const ROOT_PRESET_DEST: &str = "CMakePresets.json";

/// Which preset tree a variant draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetKind {
    /// Compute-library presets.
    Library,
    /// Target (solver) presets.
    Target,
}

impl PresetKind {
    /// Preset root directory, relative to the configuration base directory.
    /// Include destinations are this prefix stripped from the source path.
    pub fn preset_root(&self) -> &'static str {
        match self {
            PresetKind::Library => "presets/acpp",
            PresetKind::Target => "presets/gromacs",
        }
    }
}

/// One flattened preset file: where it lives in the configuration tree and
/// where it materializes in the build tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresetCopy {
    pub source: PathBuf,
    pub dest: PathBuf,
}

/// The only field flattening cares about; everything else in a preset
/// document belongs to the build system.
#[derive(Debug, Deserialize)]
struct PresetDocument {
    #[serde(default)]
    include: Vec<String>,
}

struct QueueEntry {
    /// Canonical path of the preset file.
    path: PathBuf,
    /// Canonical discovery path from the root, excluding `path` itself.
    ancestors: Vec<PathBuf>,
}

fn read_preset(path: &Path) -> Result<PresetDocument> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn dest_for(path: &Path, preset_root: &Path) -> PathBuf {
    match path.strip_prefix(preset_root) {
        Ok(rel) => rel.to_path_buf(),
        // Includes reaching outside the kind's preset tree land flat.
        Err(_) => PathBuf::from(path.file_name().unwrap_or_default()),
    }
}

/// Flatten the include graph rooted at `<base_dir>/<preset root>/<root_id>`.
///
/// The result is breadth-first discovery order with the root first; a file
/// reachable through several include paths appears exactly once, at its
/// earliest discovered position. An include naming one of its own
/// discovery-path ancestors fails with [`PlanError::CyclicInclude`] instead
/// of expanding forever. No network I/O; flattening the same graph twice
/// yields identical output.
pub fn flatten_presets(base_dir: &Path, root_id: &str, kind: PresetKind) -> Result<Vec<PresetCopy>> {
    let preset_root = base_dir.join(kind.preset_root());
    let root_path = preset_root.join(root_id);
    if !root_path.is_file() {
        return Err(PlanError::PresetNotFound(root_path));
    }
    let preset_root = preset_root.canonicalize()?;
    let root_path = root_path.canonicalize()?;
    let base_dir = base_dir.canonicalize()?;

    let mut order: Vec<PathBuf> = Vec::new();
    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut queue: VecDeque<QueueEntry> = VecDeque::new();

    visited.insert(root_path.clone());
    queue.push_back(QueueEntry {
        path: root_path,
        ancestors: Vec::new(),
    });

    while let Some(entry) = queue.pop_front() {
        order.push(entry.path.clone());

        let document = read_preset(&entry.path)?;
        let dir = entry.path.parent().unwrap_or(Path::new("."));
        for include in &document.include {
            // Relative to the including file, not the root.
            let target = dir.join(include);
            if !target.is_file() {
                return Err(PlanError::PresetNotFound(target));
            }
            let target = target.canonicalize()?;

            let mut ancestry = entry.ancestors.clone();
            ancestry.push(entry.path.clone());
            if ancestry.contains(&target) {
                return Err(PlanError::CyclicInclude {
                    path: entry.path.clone(),
                    ancestor: target,
                });
            }

            if visited.insert(target.clone()) {
                queue.push_back(QueueEntry {
                    path: target,
                    ancestors: ancestry,
                });
            }
        }
    }

    let copies = order
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let dest = if i == 0 {
                PathBuf::from(ROOT_PRESET_DEST)
            } else {
                dest_for(path, &preset_root)
            };
            let source = path
                .strip_prefix(&base_dir)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.clone());
            PresetCopy { source, dest }
        })
        .collect();

    Ok(copies)
}
