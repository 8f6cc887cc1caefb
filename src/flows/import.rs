//! Import flow
//!
//! `ResolveOptions → ValidateTarget → Fetch → ResolvePath → Stage → Commit`
//!
//! Imports always create a new file. Overwriting an existing item is
//! rejected while the options are resolved.

use crate::changeset::{ChangeSetBuilder, PendingChange, Staged};
use crate::config::{ImportOptions, ImportSource};
use crate::error::{Error, Result};
use crate::history::aggregate_history;
use crate::item::{ItemId, Revision};
use crate::locking::{LockingCoordinator, TRANSFORM_LOCK_COMMENT};
use crate::naming::resolve_import_path;
use crate::repository::{CommitBackend, FetchClient, FetchTimeouts, ItemLookup, NamingService};
use log::{debug, info, warn};
use std::sync::Arc;

/// Result of an import call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub revision: Revision,
    /// The imported items, pinned to `revision`.
    pub items: Vec<ItemId>,
}

/// Imports external content into repository folders.
pub struct ImportOrchestrator {
    backend: Arc<dyn CommitBackend>,
    lookup: Arc<dyn ItemLookup>,
    naming: Arc<dyn NamingService>,
    fetch: Arc<dyn FetchClient>,
    timeouts: FetchTimeouts,
}

impl ImportOrchestrator {
    pub fn new(
        backend: Arc<dyn CommitBackend>,
        lookup: Arc<dyn ItemLookup>,
        naming: Arc<dyn NamingService>,
        fetch: Arc<dyn FetchClient>,
    ) -> Self {
        Self {
            backend,
            lookup,
            naming,
            fetch,
            timeouts: FetchTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: FetchTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Import content into the folder `target`.
    pub fn import(&self, target: &ItemId, options: &ImportOptions) -> Result<ImportOutcome> {
        let params = options.validate()?;
        let folder = target.without_peg();
        self.require_folder(&folder)?;

        let content = self.fetch_content(&params.source)?;
        if content.is_empty() {
            return Err(Error::precondition(format!(
                "Import into {} has no content",
                folder.path()
            )));
        }

        let path = resolve_import_path(
            self.naming.as_ref(),
            &folder,
            params.pathnamebase.as_deref(),
            &params.pathext,
        )?;
        debug!("Import target resolved to {}", path);

        let repository = folder.repository();
        let base = self.backend.youngest_revision(repository)?;
        let locks = LockingCoordinator::new(self.backend.as_ref(), TRANSFORM_LOCK_COMMENT);
        let mut builder = ChangeSetBuilder::new(
            self.lookup.as_ref(),
            locks,
            PendingChange::new(repository.clone(), base),
        );

        match builder.add_result(&path, &mut content.as_slice(), false, &params.properties) {
            Ok(Staged::Discarded) => {
                builder.abort();
                return Err(Error::precondition(format!(
                    "Import into {} has no content beyond an XML declaration",
                    folder.path()
                )));
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Import into {} failed: {}", folder.path(), e);
                builder.abort();
                return Err(e);
            }
        }

        let (mut change, locks) = builder.finish();
        change.set_history_message(aggregate_history(params.comment.as_deref(), &[]));
        locks.hand_over();
        let revision = self.backend.commit(change)?;
        info!("Imported {} in revision {}", path, revision);

        Ok(ImportOutcome {
            revision,
            items: vec![repository.item_id(path).with_peg(revision)],
        })
    }

    fn require_folder(&self, folder: &ItemId) -> Result<()> {
        let missing = || {
            Error::precondition(format!(
                "Import target must be an existing folder: {}",
                folder.path()
            ))
        };
        match self.lookup.get_item(folder) {
            Ok(item) if item.is_folder() => Ok(()),
            Ok(_) => Err(missing()),
            Err(e) if e.is_not_found() => Err(missing()),
            Err(e) => Err(e),
        }
    }

    fn fetch_content(&self, source: &ImportSource) -> Result<Vec<u8>> {
        match source {
            ImportSource::Content(content) => Ok(content.clone()),
            ImportSource::Url(url) => {
                let response = self.fetch.get(url.as_str(), &self.timeouts)?;
                if !response.is_success() {
                    return Err(Error::Fetch {
                        url: url.to_string(),
                        message: format!("Download failed with HTTP status {}", response.status),
                    });
                }
                debug!(
                    "Downloaded {} bytes ({}) from {}",
                    response.body.len(),
                    response.content_type.as_deref().unwrap_or("unknown type"),
                    url
                );
                Ok(response.body)
            }
        }
    }
}
