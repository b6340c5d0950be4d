//! Workspace description and package discovery via `cargo metadata`.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::Context;
use serde::Deserialize;

/// Target kinds whose artifacts are worth keeping in the cache.
const SAVE_TARGET_KINDS: &[&str] = &[
    "lib",
    "rlib",
    "dylib",
    "cdylib",
    "staticlib",
    "proc-macro",
    "bin",
];

/// One project to clean: its root and its build-output directory.
#[derive(Clone, Debug)]
pub struct Workspace {
    pub root: PathBuf,
    pub target: PathBuf,
}

/// A package and the target names it may leave in `deps`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub targets: Vec<String>,
}

impl Workspace {
    pub fn new(root: PathBuf, target: PathBuf) -> Self {
        Self { root, target }
    }

    /// All packages in the dependency graph of this workspace.
    pub fn packages(&self) -> anyhow::Result<Vec<Package>> {
        self.packages_matching(|_| true)
    }

    /// Packages whose manifest lives outside the workspace root, i.e.
    /// registry and git dependencies. Their artifacts are the ones worth
    /// carrying across CI runs; workspace crates rebuild anyway.
    pub fn packages_outside_root(&self) -> anyhow::Result<Vec<Package>> {
        self.packages_matching(|pkg| !pkg.manifest_path.starts_with(&self.root))
    }

    fn packages_matching<F>(&self, filter: F) -> anyhow::Result<Vec<Package>>
    where
        F: Fn(&MetadataPackage) -> bool,
    {
        let metadata = self.metadata()?;
        Ok(metadata
            .packages
            .into_iter()
            .filter(|pkg| filter(pkg))
            .map(|pkg| {
                let targets = pkg
                    .targets
                    .into_iter()
                    .filter(|target| target.kind.iter().any(|kind| save_target_kind(kind)))
                    .map(|target| target.name)
                    .collect();
                Package {
                    name: pkg.name,
                    targets,
                }
            })
            .collect())
    }

    fn metadata(&self) -> anyhow::Result<Metadata> {
        let output = Command::new("cargo")
            .args(["metadata", "--all-features", "--format-version", "1"])
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("failed to run `cargo metadata` in {:?}", self.root))?;
        if !output.status.success() {
            anyhow::bail!(
                "`cargo metadata` failed in {:?} ({}): {}",
                self.root,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim_end(),
            );
        }
        serde_json::from_slice(&output.stdout)
            .with_context(|| format!("failed to parse `cargo metadata` output for {:?}", self.root))
    }
}

fn save_target_kind(kind: &str) -> bool {
    SAVE_TARGET_KINDS.contains(&kind)
}

#[derive(Debug, Deserialize)]
struct Metadata {
    packages: Vec<MetadataPackage>,
}

#[derive(Debug, Deserialize)]
struct MetadataPackage {
    name: String,
    manifest_path: PathBuf,
    targets: Vec<MetadataTarget>,
}

#[derive(Debug, Deserialize)]
struct MetadataTarget {
    name: String,
    kind: Vec<String>,
}
