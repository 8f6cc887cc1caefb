//! Transform flow
//!
//! `ResolveConfig → ResolveSources → PerSourceTransform(×N) →
//! AggregateHistory → Commit`
//!
//! Nothing is locked and the engine is not invoked until the configuration,
//! the stylesheet and the output folder have been checked. Every document
//! produced for every source is staged into one pending change; the first
//! failure aborts the batch and releases all locks taken so far.

use crate::changeset::{ChangeSetBuilder, PendingChange};
use crate::config::{TransformConfig, TransformParams};
use crate::error::{Error, Result};
use crate::flows::provenance_properties;
use crate::history::aggregate_history;
use crate::item::{ItemId, ItemPath, Properties, Repository, Revision};
use crate::locking::{LockingCoordinator, TRANSFORM_LOCK_COMMENT};
use crate::path::{resolve_output_path, resolve_result_path};
use crate::repository::{
    Classifier, CommitBackend, ItemLookup, Stylesheet, TransformEngine, TransformRequest,
};
use log::{debug, error, info};
use std::sync::Arc;

/// Source items of one transform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSet {
    /// The triggering item is a file.
    Single(ItemId),
    /// The triggering item is a folder; its eligible immediate files.
    FolderExpanded(Vec<ItemId>),
}

impl SourceSet {
    pub fn items(&self) -> &[ItemId] {
        match self {
            SourceSet::Single(id) => std::slice::from_ref(id),
            SourceSet::FolderExpanded(ids) => ids,
        }
    }
}

/// Result of a transform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutcome {
    /// Committed revision, `None` when every produced document was empty.
    pub revision: Option<Revision>,
    /// Created or modified files, pinned to the committed revision.
    pub items: Vec<ItemId>,
    /// Paths whose documents were discarded as empty.
    pub discarded: Vec<ItemPath>,
}

/// Runs transform configurations against repository items.
pub struct TransformOrchestrator {
    backend: Arc<dyn CommitBackend>,
    lookup: Arc<dyn ItemLookup>,
    classifier: Arc<dyn Classifier>,
    engine: Arc<dyn TransformEngine>,
}

impl TransformOrchestrator {
    pub fn new(
        backend: Arc<dyn CommitBackend>,
        lookup: Arc<dyn ItemLookup>,
        classifier: Arc<dyn Classifier>,
        engine: Arc<dyn TransformEngine>,
    ) -> Self {
        Self {
            backend,
            lookup,
            classifier,
            engine,
        }
    }

    /// Transform `item` with `config` and commit the results.
    pub fn transform(&self, item: &ItemId, config: &TransformConfig) -> Result<TransformOutcome> {
        let params = config.validate()?;
        let repository = item.repository();
        // Everything below is read at head; base pins what head was.
        let base = self.backend.youngest_revision(repository)?;
        let stylesheet = self.resolve_stylesheet(repository, &params.stylesheet)?;
        let output_folder = resolve_output_path(item, params.output.as_deref())?;
        self.require_output_folder(repository, &output_folder)?;

        let sources = self.resolve_sources(item)?;
        debug!(
            "Transforming {} source(s) with '{}' at base revision {}",
            sources.items().len(),
            stylesheet.describe(),
            base
        );

        let locks = LockingCoordinator::new(self.backend.as_ref(), TRANSFORM_LOCK_COMMENT);
        let mut builder = ChangeSetBuilder::new(
            self.lookup.as_ref(),
            locks,
            PendingChange::new(repository.clone(), base),
        );

        let mut messages = Vec::new();
        for source in sources.items() {
            let staged = self.transform_source(
                &mut builder,
                source,
                &stylesheet,
                &output_folder,
                config,
                &params,
            );
            match staged {
                Ok(mut source_messages) => messages.append(&mut source_messages),
                Err(e) => {
                    error!("Transform of {} failed: {}", source, e);
                    builder.abort();
                    return Err(e);
                }
            }
        }

        let discarded = builder.discarded().to_vec();
        let (mut change, locks) = builder.finish();
        if !change.has_file_changes() {
            locks.release_all();
            info!("Transform of {} produced no documents, nothing to commit", item);
            return Ok(TransformOutcome {
                revision: None,
                items: Vec::new(),
                discarded,
            });
        }

        change.set_history_message(aggregate_history(params.comment.as_deref(), &messages));
        let paths = change.file_paths();

        // The backend releases handed-over locks, also when the commit fails.
        locks.hand_over();
        let revision = self.backend.commit(change)?;
        debug!("Transform complete, committed with rev: {}", revision);

        Ok(TransformOutcome {
            revision: Some(revision),
            items: paths
                .into_iter()
                .map(|p| repository.item_id(p).with_peg(revision))
                .collect(),
            discarded,
        })
    }

    /// Resolve the `stylesheet` param to a built-in or a repository document.
    pub fn resolve_stylesheet(&self, repository: &Repository, name: &str) -> Result<Stylesheet> {
        if name.starts_with('/') {
            let id = repository.item_id(ItemPath::new(name)?);
            let item = match self.lookup.get_item(&id) {
                Ok(item) => item,
                Err(e) if e.is_not_found() => {
                    return Err(Error::config(format!(
                        "Specified stylesheet does not exist at path: {}",
                        name
                    )));
                }
                Err(e) => return Err(e),
            };
            debug!(
                "Using stylesheet from repo: {} {:?}",
                id, item.revision_changed
            );
            let content = self.lookup.read_contents(&id)?;
            Ok(Stylesheet::Document { id, content })
        } else {
            debug!("Using built in stylesheet: {}", name);
            if !self.engine.has_builtin(name) {
                return Err(Error::config(format!(
                    "No built-in stylesheet named: {}",
                    name
                )));
            }
            Ok(Stylesheet::BuiltIn(name.to_string()))
        }
    }

    /// Determine the source items. Sources always refer to head.
    pub fn resolve_sources(&self, item: &ItemId) -> Result<SourceSet> {
        let head = item.without_peg();
        if !self.lookup.get_item(&head)?.is_folder() {
            return Ok(SourceSet::Single(head));
        }

        let files = self.lookup.immediate_files(&head)?;
        let total = files.len();
        let mut eligible = Vec::with_capacity(total);
        for file in files {
            if self.classifier.is_eligible_for_transform(&file)? {
                eligible.push(file.without_peg());
            }
        }
        if eligible.len() < total {
            debug!(
                "Skipped {} of {} file(s) in {}, not eligible for transform",
                total - eligible.len(),
                total,
                head.path()
            );
        }
        Ok(SourceSet::FolderExpanded(eligible))
    }

    fn require_output_folder(&self, repository: &Repository, output: &ItemPath) -> Result<()> {
        let missing = || {
            Error::precondition(format!(
                "Specified output must be an existing folder: {}",
                output
            ))
        };
        match self.lookup.get_item(&repository.item_id(output.clone())) {
            Ok(item) if item.is_folder() => Ok(()),
            Ok(_) => Err(missing()),
            Err(e) if e.is_not_found() => Err(missing()),
            Err(e) => Err(e),
        }
    }

    /// Run the engine for one source and stage every document it produced.
    /// Returns the engine's diagnostic messages.
    fn transform_source(
        &self,
        builder: &mut ChangeSetBuilder<'_>,
        source: &ItemId,
        stylesheet: &Stylesheet,
        output_folder: &ItemPath,
        config: &TransformConfig,
        params: &TransformParams,
    ) -> Result<Vec<String>> {
        let primary_path = output_folder.append(source.path().name())?;
        let request = TransformRequest {
            stylesheet,
            source,
            primary_output: &primary_path,
            params: &params.raw,
        };
        let mut output = self.engine.transform(&request)?;

        let properties = if params.suppress_properties {
            Properties::new()
        } else {
            provenance_properties(source, &config.name)
        };

        builder.add_result(
            &primary_path,
            &mut output.primary,
            params.overwrite,
            &properties,
        )?;
        for document in output.result_documents.iter_mut() {
            let path = resolve_result_path(output_folder, &document.href)?;
            builder.add_result(&path, &mut document.content, params.overwrite, &properties)?;
        }

        Ok(output.messages)
    }
}
