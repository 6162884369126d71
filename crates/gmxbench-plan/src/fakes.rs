//! In-memory fakes for exercising plan resolution without network access.

use crate::resolve::{RefNamespace, RemoteRefLister};
use std::collections::HashMap;

/// Ref lister backed by a static table of advertised references.
#[derive(Debug, Default, Clone)]
pub struct StaticRefLister {
    refs: HashMap<(String, RefNamespace, String), String>,
}

impl StaticRefLister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise `refs/<namespace>/<name>` at `commit` for `repo_url`.
    pub fn advertise(
        mut self,
        repo_url: &str,
        namespace: RefNamespace,
        name: &str,
        commit: &str,
    ) -> Self {
        self.refs.insert(
            (repo_url.to_string(), namespace, name.to_string()),
            commit.to_string(),
        );
        self
    }
}

impl RemoteRefLister for StaticRefLister {
    fn lookup(&self, repo_url: &str, namespace: RefNamespace, name: &str) -> Option<String> {
        self.refs
            .get(&(repo_url.to_string(), namespace, name.to_string()))
            .cloned()
    }
}
