//! Local cache loader artifact.
//!
//! Browsers keep an offline copy of the tree in local storage under
//! `orgData_{projectId}`. Server-side tooling cannot write there directly,
//! so the cache is populated by a generated script that the page loads:
//!
//! ```text
//! // Generated by orgsync. ...
//! (function () {
//!   var key = "orgData_p1";
//!   var payload = {"coordinators":[...],...};
//!   ...localStorage.setItem(key, JSON.stringify(payload))...
//! })();
//! ```
//!
//! The payload sits on a single line so the artifact can be read back.

use crate::backend::TreeStore;
use crate::error::{StoreError, StoreResult};
use orgsync_core::backup::write_atomic;
use orgsync_core::OrgTree;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const KEY_PREFIX: &str = "orgData_";
const KEY_LINE: &str = "var key = ";
const PAYLOAD_LINE: &str = "var payload = ";

/// Local storage key for a project's cached tree.
pub fn storage_key(project_id: &str) -> String {
    format!("{KEY_PREFIX}{project_id}")
}

/// The generated loader script that fills the browser-local cache.
#[derive(Debug, Clone)]
pub struct LocalCacheArtifact {
    path: PathBuf,
    project_id: String,
}

impl LocalCacheArtifact {
    /// Creates an adapter writing the loader to `path` for `project_id`.
    pub fn new(path: impl Into<PathBuf>, project_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            project_id: project_id.into(),
        }
    }

    /// Path of the loader script.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Local storage key the loader populates.
    pub fn storage_key(&self) -> String {
        storage_key(&self.project_id)
    }

    /// Renders the loader script for `tree`.
    pub fn render(&self, tree: &OrgTree) -> StoreResult<String> {
        let key = serde_json::to_string(&self.storage_key())?;
        let payload = serde_json::to_string(tree)?;
        Ok(format!(
            "// Generated by orgsync. Do not edit: regenerate with `orgsync export-cache`.\n\
             (function () {{\n  \
             {KEY_LINE}{key};\n  \
             {PAYLOAD_LINE}{payload};\n  \
             try {{\n    \
             window.localStorage.setItem(key, JSON.stringify(payload));\n  \
             }} catch (e) {{\n    \
             console.warn(\"orgsync: could not populate local cache\", e);\n  \
             }}\n\
             }})();\n"
        ))
    }

    /// Extracts the payload from a rendered script.
    fn parse(&self, script: &str) -> StoreResult<Value> {
        let field = |prefix: &str| {
            script
                .lines()
                .map(str::trim)
                .find_map(|line| line.strip_prefix(prefix))
                .and_then(|rest| rest.strip_suffix(';'))
                .ok_or_else(|| {
                    StoreError::Corrupted(format!(
                        "{}: missing `{}` line",
                        self.path.display(),
                        prefix.trim()
                    ))
                })
        };

        let key: String = serde_json::from_str(field(KEY_LINE)?)?;
        if key != self.storage_key() {
            return Err(StoreError::Corrupted(format!(
                "{}: loader targets {key}, expected {}",
                self.path.display(),
                self.storage_key()
            )));
        }
        Ok(serde_json::from_str(field(PAYLOAD_LINE)?)?)
    }
}

impl TreeStore for LocalCacheArtifact {
    fn describe(&self) -> String {
        format!("local cache {} ({})", self.path.display(), self.storage_key())
    }

    fn read_tree(&self) -> StoreResult<Option<Value>> {
        let script = match fs::read_to_string(&self.path) {
            Ok(script) => script,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.parse(&script).map(Some)
    }

    fn write_tree(&self, tree: &OrgTree) -> StoreResult<()> {
        let script = self.render(tree)?;
        write_atomic(&self.path, script.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgsync_core::{normalize, Unit};
    use tempfile::TempDir;

    fn tree() -> OrgTree {
        let mut tree = OrgTree::new();
        tree.coordinators.push(Unit::new("a", "Quote \"and\" newline\n"));
        tree
    }

    #[test]
    fn render_targets_project_key() {
        let cache = LocalCacheArtifact::new("loader.js", "p1");
        let script = cache.render(&tree()).unwrap();
        assert!(script.contains("var key = \"orgData_p1\";"));
        assert!(script.contains("localStorage.setItem(key"));
    }

    #[test]
    fn written_artifact_reads_back() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCacheArtifact::new(dir.path().join("public/loader.js"), "p1");
        assert!(cache.read_tree().unwrap().is_none());

        cache.write_tree(&tree()).unwrap();
        let back = normalize(cache.read_tree().unwrap().unwrap()).unwrap();
        assert_eq!(back, tree());
    }

    #[test]
    fn foreign_project_artifact_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loader.js");
        LocalCacheArtifact::new(&path, "p1").write_tree(&tree()).unwrap();

        let other = LocalCacheArtifact::new(&path, "p2");
        assert!(matches!(other.read_tree(), Err(StoreError::Corrupted(_))));
    }

    #[test]
    fn hand_edited_artifact_is_corrupted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loader.js");
        fs::write(&path, "console.log('hi');\n").unwrap();
        assert!(matches!(
            LocalCacheArtifact::new(path, "p1").read_tree(),
            Err(StoreError::Corrupted(_))
        ));
    }
}
