//! Item change trigger
//!
//! Runs every active transform configuration of a changed file. Only files
//! below one of the folders listed in the repository root property
//! `cmsconfig:TransformPaths` are considered, and files that were
//! themselves generated by a transform never trigger another one.

use crate::config::load_transform_configs;
use crate::error::{Error, Result};
use crate::flows::{TRANSFORM_NAME_PROPERTY, TransformOrchestrator, TransformOutcome};
use crate::item::{Item, ItemPath};
use crate::repository::{ConfigSource, ItemLookup};
use log::{debug, error, info, warn};
use std::sync::Arc;

/// Root property listing the folders transforms are enabled for, one per line.
pub const TRANSFORM_PATHS_PROPERTY: &str = "cmsconfig:TransformPaths";

/// Result of running one configuration.
#[derive(Debug)]
pub struct ConfigRun {
    pub config: String,
    pub result: Result<TransformOutcome>,
}

/// What the listener did with a change event.
#[derive(Debug)]
pub enum ChangeOutcome {
    /// Folders never trigger transforms.
    NotAFile,
    /// The file is outside every enabled transform path.
    OutsideTransformPaths,
    /// The file was produced by a transform.
    GeneratedOutput,
    /// Active configurations were run, in configuration order.
    Processed(Vec<ConfigRun>),
}

/// Reacts to committed item changes.
pub struct ItemChangedListener {
    configs: Arc<dyn ConfigSource>,
    lookup: Arc<dyn ItemLookup>,
    orchestrator: Arc<TransformOrchestrator>,
}

impl ItemChangedListener {
    pub fn new(
        configs: Arc<dyn ConfigSource>,
        lookup: Arc<dyn ItemLookup>,
        orchestrator: Arc<TransformOrchestrator>,
    ) -> Self {
        Self {
            configs,
            lookup,
            orchestrator,
        }
    }

    /// Handle the change of `item`. The item id must carry the revision of
    /// the change. Failing configurations are logged and reported, they do
    /// not stop the remaining ones.
    pub fn on_item_change(&self, item: &Item) -> Result<ChangeOutcome> {
        debug!("Item change event with id: {}", item.id);
        if item.id.peg().is_none() {
            error!("Item requires a revision to be transformed: {}", item.id);
            return Err(Error::precondition(format!(
                "Item requires a revision to be transformed: {}",
                item.id
            )));
        }

        if !item.is_file() {
            return Ok(ChangeOutcome::NotAFile);
        }

        if !self.is_within_transform_paths(item)? {
            info!("Transform not enabled for path: {}", item.id.path());
            return Ok(ChangeOutcome::OutsideTransformPaths);
        }

        let configs = load_transform_configs(self.configs.as_ref(), &item.id)?;
        if !configs.is_empty() && item.property(TRANSFORM_NAME_PROPERTY).is_some() {
            debug!("Item is the result of a transform, suppressing: {}", item.id);
            return Ok(ChangeOutcome::GeneratedOutput);
        }

        let mut runs = Vec::new();
        for config in configs.iter().filter(|c| c.active) {
            debug!("Config: '{}' is active, transforming...", config.name);
            let result = self.orchestrator.transform(&item.id, config);
            match &result {
                Ok(outcome) => debug!(
                    "Transformed with config: '{}' (revision {:?})",
                    config.name, outcome.revision
                ),
                Err(e) => error!("Failed transform '{}': {}", config.name, e),
            }
            runs.push(ConfigRun {
                config: config.name.clone(),
                result,
            });
        }
        Ok(ChangeOutcome::Processed(runs))
    }

    fn is_within_transform_paths(&self, item: &Item) -> Result<bool> {
        let root = self.lookup.get_item(&item.id.repository().root_id())?;
        let Some(paths) = root.property(TRANSFORM_PATHS_PROPERTY) else {
            return Ok(false);
        };

        let mut enabled = Vec::new();
        for line in paths.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match ItemPath::new(line) {
                Ok(path) => enabled.push(path),
                Err(e) => warn!("Ignoring invalid transform path '{}': {}", line, e),
            }
        }
        debug!("Number of white listed paths: {}", enabled.len());
        Ok(enabled.iter().any(|p| p.is_ancestor_of(item.id.path())))
    }
}
