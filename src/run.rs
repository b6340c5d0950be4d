//! The per-workspace cleaning loop.

use crate::cleaner::clean_target_dir;
use crate::command::RunOptions;
use crate::config::{Config, WorkspaceConfig};
use crate::workspace::Workspace;

#[derive(Debug)]
pub struct RunContext {
    options: RunOptions,
    workspaces: Vec<Workspace>,
}

impl RunContext {
    pub fn new(options: RunOptions, config: Config) -> anyhow::Result<Self> {
        let workspace_configs: Vec<WorkspaceConfig> = if options.workspace.is_empty() {
            config.workspaces
        } else {
            options
                .workspace
                .iter()
                .map(|spec| WorkspaceConfig::parse_spec(spec))
                .collect()
        };
        let workspaces = workspace_configs
            .iter()
            .map(WorkspaceConfig::resolve)
            .collect();
        let context = Self {
            options,
            workspaces,
        };
        log::debug!("options: {:#?}", context.options);
        Ok(context)
    }

    /// Cleans every workspace in turn. A workspace whose packages cannot
    /// be discovered, or whose target directory cannot be opened, is
    /// logged and skipped; the loop always reaches the last workspace.
    pub fn run(&self) -> anyhow::Result<()> {
        for workspace in &self.workspaces {
            log::info!("cleaning {:?}", workspace.target);
            let packages = match workspace.packages_outside_root() {
                Ok(packages) => packages,
                Err(e) => {
                    log::warn!("skipping {:?}, package discovery failed: {e:#}", workspace.root);
                    continue;
                }
            };
            log::debug!("keeping artifacts of {} packages", packages.len());
            if let Err(e) =
                clean_target_dir(&workspace.target, &packages, self.options.check_timestamp)
            {
                log::debug!("failed to clean {:?}: {e:#}", workspace.target);
            }
        }
        Ok(())
    }
}
