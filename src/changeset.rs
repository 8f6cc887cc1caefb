//! # Change Set Staging
//!
//! A [`PendingChange`] is the ordered list of per-path operations that one
//! orchestration call submits as a single atomic commit. The
//! [`ChangeSetBuilder`] stages produced documents into it:
//!
//! 1. Documents with no meaningful content (empty, or an XML declaration
//!    followed by nothing) are discarded with a warning.
//! 2. A document whose path does not exist becomes a `Create`, preceded by
//!    a `DeclareFolder` for its parent unless that folder is already
//!    declared in this change.
//! 3. A document whose path exists becomes a `ModifyLocked` when overwrite
//!    is allowed, after locking the path.
//! 4. Otherwise staging fails with a conflict.
//!
//! The builder owns the batch's [`LockingCoordinator`]. Aborting the
//! builder releases every lock it took.

use crate::error::{Error, Result};
use crate::item::{ItemPath, Properties, Repository, Revision};
use crate::locking::{LockToken, LockingCoordinator};
use crate::path::path_exists;
use crate::repository::ItemLookup;
use log::{debug, warn};
use std::collections::HashSet;
use std::io::Read;

/// Number of leading bytes inspected when deciding whether a result is empty.
const PEEK_LIMIT: usize = 200;

/// Message used when a path exists and overwrite is not permitted.
pub const OVERWRITE_PROHIBITED: &str =
    "Item already exists, config prohibiting overwrite of existing items.";

/// One operation of a pending change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchItem {
    /// Add a new file.
    Create {
        path: ItemPath,
        content: Vec<u8>,
        properties: Properties,
    },
    /// Replace the content of an existing, locked file.
    ModifyLocked {
        path: ItemPath,
        content: Vec<u8>,
        properties: Properties,
        lock: LockToken,
    },
    /// The folder must be present once the change is committed.
    DeclareFolder { path: ItemPath },
}

impl PatchItem {
    pub fn path(&self) -> &ItemPath {
        match self {
            PatchItem::Create { path, .. }
            | PatchItem::ModifyLocked { path, .. }
            | PatchItem::DeclareFolder { path } => path,
        }
    }

    pub fn is_file_change(&self) -> bool {
        !matches!(self, PatchItem::DeclareFolder { .. })
    }
}

/// Operations accumulated for one atomic commit.
#[derive(Debug, Clone)]
pub struct PendingChange {
    repository: Repository,
    base: Revision,
    history_message: String,
    items: Vec<PatchItem>,
    declared_folders: HashSet<ItemPath>,
}

impl PendingChange {
    pub fn new(repository: Repository, base: Revision) -> Self {
        Self {
            repository,
            base,
            history_message: String::new(),
            items: Vec::new(),
            declared_folders: HashSet::new(),
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Revision the change is based on.
    pub fn base(&self) -> Revision {
        self.base
    }

    pub fn history_message(&self) -> &str {
        &self.history_message
    }

    pub fn set_history_message(&mut self, message: String) {
        self.history_message = message;
    }

    pub fn items(&self) -> &[PatchItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether at least one file is created or modified.
    pub fn has_file_changes(&self) -> bool {
        self.items.iter().any(PatchItem::is_file_change)
    }

    /// Paths of created or modified files, in staging order.
    pub fn file_paths(&self) -> Vec<ItemPath> {
        self.items
            .iter()
            .filter(|item| item.is_file_change())
            .map(|item| item.path().clone())
            .collect()
    }

    /// Lock tokens carried by `ModifyLocked` operations.
    pub fn locks(&self) -> Vec<&LockToken> {
        self.items
            .iter()
            .filter_map(|item| match item {
                PatchItem::ModifyLocked { lock, .. } => Some(lock),
                _ => None,
            })
            .collect()
    }

    /// Declare `path` present unless already declared. Returns whether an
    /// operation was added.
    pub fn declare_folder(&mut self, path: &ItemPath) -> bool {
        if !self.declared_folders.insert(path.clone()) {
            return false;
        }
        self.items.push(PatchItem::DeclareFolder { path: path.clone() });
        true
    }

    fn push(&mut self, item: PatchItem) {
        self.items.push(item);
    }
}

/// How a document ended up in the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staged {
    Created,
    Modified,
    Discarded,
}

/// Stages produced documents into a pending change.
pub struct ChangeSetBuilder<'a> {
    lookup: &'a dyn ItemLookup,
    locks: LockingCoordinator<'a>,
    change: PendingChange,
    staged_paths: HashSet<ItemPath>,
    discarded: Vec<ItemPath>,
}

impl<'a> ChangeSetBuilder<'a> {
    pub fn new(
        lookup: &'a dyn ItemLookup,
        locks: LockingCoordinator<'a>,
        change: PendingChange,
    ) -> Self {
        Self {
            lookup,
            locks,
            change,
            staged_paths: HashSet::new(),
            discarded: Vec::new(),
        }
    }

    /// Stage one produced document at `path`.
    pub fn add_result(
        &mut self,
        path: &ItemPath,
        content: &mut dyn Read,
        overwrite: bool,
        properties: &Properties,
    ) -> Result<Staged> {
        let content = match read_not_empty(content).map_err(|e| Error::Engine {
            source_id: path.to_string(),
            message: format!("Failed to read stream from transform: {}", e),
        })? {
            Some(content) => content,
            None => {
                warn!(
                    "Transform of item at path: '{}' resulted in empty document, will be discarded.",
                    path
                );
                self.discarded.push(path.clone());
                return Ok(Staged::Discarded);
            }
        };

        if !self.staged_paths.insert(path.clone()) {
            return Err(Error::Conflict {
                path: path.to_string(),
                message: "Path produced more than once in the same change".to_string(),
            });
        }

        let repository = self.change.repository().clone();
        if !path_exists(self.lookup, &repository.item_id(path.clone()))? {
            let parent = path.parent().unwrap_or_else(ItemPath::root);
            self.change.declare_folder(&parent);
            debug!("No file at path: '{}' will add new file.", path);
            self.change.push(PatchItem::Create {
                path: path.clone(),
                content,
                properties: properties.clone(),
            });
            Ok(Staged::Created)
        } else if overwrite {
            debug!(
                "Overwrite is allowed, existing file at path '{}' will be modified.",
                path
            );
            let base = self.change.base();
            let lock = self.locks.acquire_for_overwrite(&repository, path, base)?;
            self.change.push(PatchItem::ModifyLocked {
                path: path.clone(),
                content,
                properties: properties.clone(),
                lock,
            });
            Ok(Staged::Modified)
        } else {
            Err(Error::Conflict {
                path: path.to_string(),
                message: OVERWRITE_PROHIBITED.to_string(),
            })
        }
    }

    pub fn change(&self) -> &PendingChange {
        &self.change
    }

    pub fn change_mut(&mut self) -> &mut PendingChange {
        &mut self.change
    }

    /// Paths whose documents were discarded as empty.
    pub fn discarded(&self) -> &[ItemPath] {
        &self.discarded
    }

    /// Number of locks taken so far in this batch.
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Split into the finished change and the lock ownership.
    pub fn finish(self) -> (PendingChange, LockingCoordinator<'a>) {
        (self.change, self.locks)
    }

    /// Drop the staged change and release every lock taken for it.
    pub fn abort(self) {
        let count = self.locks.len();
        if count > 0 {
            debug!("Rolling back staged change, releasing {} lock(s)", count);
        }
        self.locks.release_all();
    }
}

/// Read a document, returning `None` when it carries no meaningful content.
fn read_not_empty(reader: &mut dyn Read) -> std::io::Result<Option<Vec<u8>>> {
    let mut head = Vec::with_capacity(PEEK_LIMIT);
    (&mut *reader).take(PEEK_LIMIT as u64).read_to_end(&mut head)?;

    if head.is_empty() || is_empty_except_declaration(&String::from_utf8_lossy(&head)) {
        return Ok(None);
    }

    reader.read_to_end(&mut head)?;
    Ok(Some(head))
}

/// True when `data` is blank or only an XML declaration followed by blanks.
pub fn is_empty_except_declaration(data: &str) -> bool {
    let data = data.trim_start_matches('\u{feff}').trim();
    let rest = if data.starts_with("<?xml") {
        match data.find("?>") {
            Some(idx) => &data[idx + 2..],
            None => return false,
        }
    } else {
        data
    };
    rest.trim().is_empty()
}
