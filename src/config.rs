//! Settings loading and validation.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};

use crate::workspace::Workspace;

/// Configuration file looked up in the working directory when `--config`
/// is not given.
pub const DEFAULT_CONFIG_FILE: &str = "cachetrim.toml";

const ENV_PREFIX: &str = "CACHETRIM_";

/// Main cachetrim settings structure
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Workspaces to clean
    #[serde(default = "default_workspaces", rename = "workspace")]
    pub workspaces: Vec<WorkspaceConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Project root
    pub root: PathBuf,

    /// Build output directory, resolved relative to `root` unless
    /// absolute
    #[serde(default = "default_target_dir")]
    pub target: PathBuf,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen_targets = HashSet::new();
        for workspace in &self.workspaces {
            let target = workspace.resolve().target;
            if !seen_targets.insert(target.clone()) {
                anyhow::bail!("duplicate target directory in workspaces: {target:?}");
            }
        }
        Ok(())
    }
}

impl WorkspaceConfig {
    /// Parses a command line workspace spec: `ROOT` or `ROOT -> TARGET`.
    pub fn parse_spec(spec: &str) -> Self {
        let (root, target) = match spec.split_once("->") {
            Some((root, target)) => (root.trim(), target.trim()),
            None => (spec.trim(), "target"),
        };
        Self {
            root: PathBuf::from(root),
            target: PathBuf::from(target),
        }
    }

    pub fn resolve(&self) -> Workspace {
        let root = std::path::absolute(&self.root).unwrap_or_else(|_| self.root.clone());
        let target = root.join(&self.target);
        Workspace::new(root, target)
    }
}

pub fn load_config(path: &Option<PathBuf>) -> anyhow::Result<Config> {
    let figment = match path {
        // an explicitly named file must exist
        Some(path) => Figment::new().merge(Toml::file_exact(path)),
        None => Figment::new().merge(Toml::file(DEFAULT_CONFIG_FILE)),
    };
    let config: Config = figment
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()
        .context("failed to load configuration")?;
    config.validate()?;
    Ok(config)
}

pub fn display_config(config: &Config) -> anyhow::Result<String> {
    toml::to_string_pretty(config).context("failed to format configuration")
}

fn default_workspaces() -> Vec<WorkspaceConfig> {
    vec![WorkspaceConfig {
        root: PathBuf::from("."),
        target: default_target_dir(),
    }]
}

fn default_target_dir() -> PathBuf {
    PathBuf::from("target")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_without_arrow_defaults_to_target() {
        let workspace = WorkspaceConfig::parse_spec(" ./crates/app ");
        assert_eq!(workspace.root, PathBuf::from("./crates/app"));
        assert_eq!(workspace.target, PathBuf::from("target"));
    }

    #[test]
    fn spec_with_arrow_splits_root_and_target() {
        let workspace = WorkspaceConfig::parse_spec(". -> build/out");
        assert_eq!(workspace.root, PathBuf::from("."));
        assert_eq!(workspace.target, PathBuf::from("build/out"));
    }

    #[test]
    fn resolve_joins_relative_target_under_root() {
        let workspace = WorkspaceConfig {
            root: PathBuf::from("/proj"),
            target: PathBuf::from("target"),
        };
        let resolved = workspace.resolve();
        assert_eq!(resolved.root, PathBuf::from("/proj"));
        assert_eq!(resolved.target, PathBuf::from("/proj/target"));
    }

    #[test]
    fn resolve_keeps_absolute_target() {
        let workspace = WorkspaceConfig {
            root: PathBuf::from("/proj"),
            target: PathBuf::from("/var/cache/target"),
        };
        assert_eq!(workspace.resolve().target, PathBuf::from("/var/cache/target"));
    }

    #[test]
    fn duplicate_targets_are_rejected() {
        let config = Config {
            workspaces: vec![
                WorkspaceConfig {
                    root: PathBuf::from("/a"),
                    target: PathBuf::from("/shared/target"),
                },
                WorkspaceConfig {
                    root: PathBuf::from("/b"),
                    target: PathBuf::from("/shared/target"),
                },
            ],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_config_has_one_workspace() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.workspaces.len(), 1);
        assert_eq!(config.workspaces[0].root, PathBuf::from("."));
    }
}
