//! Git reference resolution against remote repositories.
//!
//! A symbolic name (branch or tag) must designate exactly one commit across
//! the configured repository set. The remote listing operation sits behind
//! [`RemoteRefLister`] so plan building can be exercised without network
//! access (see [`crate::fakes`]).

use crate::config::Repository;
use crate::error::{PlanError, Result};
use serde::{Deserialize, Serialize};
use std::process::{Command, Stdio};
use tracing::debug;

/// Ref namespace to probe on a remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefNamespace {
    /// `refs/heads/` (branches).
    Heads,
    /// `refs/tags/` (tags).
    Tags,
}

impl RefNamespace {
    /// Probe order: branches first, then tags.
    pub const ALL: [RefNamespace; 2] = [RefNamespace::Heads, RefNamespace::Tags];

    /// Path segment under `refs/`.
    pub fn segment(&self) -> &'static str {
        match self {
            RefNamespace::Heads => "heads",
            RefNamespace::Tags => "tags",
        }
    }
}

/// Immutable result of resolving one symbolic name against a repository set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedReference {
    /// URL of the repository that advertised the reference.
    pub repo_url: String,

    /// Commit hash the reference designates.
    pub commit: String,
}

/// Seam to the remote listing operation.
///
/// Returns the commit hash when the remote advertises `refs/<ns>/<name>`.
/// A failed or empty query is reported as `None`: a transient failure counts
/// as "no match there", and only total absence across all repositories is
/// fatal to the caller. No retries are performed.
pub trait RemoteRefLister {
    fn lookup(&self, repo_url: &str, namespace: RefNamespace, name: &str) -> Option<String>;
}

/// Production lister backed by `git ls-remote`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitRefLister;

impl RemoteRefLister for GitRefLister {
    fn lookup(&self, repo_url: &str, namespace: RefNamespace, name: &str) -> Option<String> {
        let refspec = format!("refs/{}/{}", namespace.segment(), name);
        let output = Command::new("git")
            .args(["ls-remote", repo_url, &refspec])
            .stderr(Stdio::null())
            .output();

        let output = match output {
            Ok(o) if o.status.success() => o,
            Ok(o) => {
                debug!(
                    repo = %repo_url,
                    refspec = %refspec,
                    code = ?o.status.code(),
                    "ls-remote probe failed"
                );
                return None;
            }
            Err(e) => {
                debug!(repo = %repo_url, refspec = %refspec, error = %e, "could not run git");
                return None;
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout.trim();
        if line.is_empty() {
            return None;
        }
        line.split_whitespace().next().map(str::to_string)
    }
}

/// Resolve a branch or tag name to a unique commit across candidate
/// repositories.
///
/// Probes every repository's branch namespace, then its tag namespace
/// (worst case two remote calls per repository). Exactly one advertised
/// match must exist: zero is [`PlanError::ReferenceNotFound`], and two or
/// more, even when the hashes agree, is [`PlanError::AmbiguousReference`].
pub fn resolve_reference(
    lister: &dyn RemoteRefLister,
    name: &str,
    repositories: &[Repository],
) -> Result<ResolvedReference> {
    let mut found = Vec::new();
    for repo in repositories {
        for namespace in RefNamespace::ALL {
            if let Some(commit) = lister.lookup(&repo.url, namespace, name) {
                found.push(ResolvedReference {
                    repo_url: repo.url.clone(),
                    commit,
                });
            }
        }
    }

    match found.len() {
        0 => Err(PlanError::ReferenceNotFound(name.to_string())),
        1 => Ok(found.remove(0)),
        n => Err(PlanError::AmbiguousReference {
            name: name.to_string(),
            matches: n,
        }),
    }
}
