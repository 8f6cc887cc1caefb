//! In-memory repository
//!
//! `MemoryRepository` keeps files, folders, properties, per-folder
//! configuration, naming configuration and locks of one repository in
//! memory, behind a single mutex. It implements every repository-side
//! collaborator (`CommitBackend`, `ItemLookup`, `ConfigSource` and
//! `NamingService`), which makes it the backend of the CLI and of the
//! integration tests.
//!
//! Commits are atomic: the whole change is validated and applied to a copy
//! of the tree, which replaces the live tree only once every operation
//! succeeded.
//!
//! ## Directory mapping
//!
//! [`MemoryRepository::load_dir`] reads a directory tree. Three kinds of
//! metadata files are recognised in any folder and never become items:
//!
//! - `.cms-config.yaml`: configuration options of the folder, as a mapping
//!   of option name (e.g. `cmsconfig-transform:import`) to value.
//! - `.cms-naming.yaml`: the folder's naming configuration.
//! - `.cms-properties.yaml`: properties of the folder's entries, keyed by
//!   entry name, `.` for the folder itself.
//!
//! [`MemoryRepository::write_dir`] writes files and properties back.

use crate::changeset::{PatchItem, PendingChange};
use crate::error::{Error, Result};
use crate::item::{Item, ItemId, ItemKind, ItemPath, Properties, Repository, Revision};
use crate::locking::LockToken;
use crate::naming::expand_sequential;
use crate::repository::{
    CommitBackend, ConfigOption, ConfigSource, FolderNaming, ItemLookup, NamingService,
};
use log::{debug, info};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Folder configuration options file.
pub const CONFIG_FILE: &str = ".cms-config.yaml";
/// Folder naming configuration file.
pub const NAMING_FILE: &str = ".cms-naming.yaml";
/// Entry properties file.
pub const PROPERTIES_FILE: &str = ".cms-properties.yaml";

/// Key of the folder's own properties in `.cms-properties.yaml`.
const SELF_KEY: &str = ".";

#[derive(Debug, Clone)]
struct Node {
    kind: ItemKind,
    content: Vec<u8>,
    properties: Properties,
    revision_changed: Revision,
}

impl Node {
    fn folder(revision: Revision) -> Self {
        Self {
            kind: ItemKind::Folder,
            content: Vec::new(),
            properties: Properties::new(),
            revision_changed: revision,
        }
    }

    fn file(content: Vec<u8>, properties: Properties, revision: Revision) -> Self {
        Self {
            kind: ItemKind::File,
            content,
            properties,
            revision_changed: revision,
        }
    }
}

/// One applied commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub revision: Revision,
    pub message: String,
    /// Created or modified files.
    pub paths: Vec<ItemPath>,
}

#[derive(Debug)]
struct State {
    youngest: Revision,
    nodes: BTreeMap<ItemPath, Node>,
    config: BTreeMap<ItemPath, Vec<ConfigOption>>,
    naming: BTreeMap<ItemPath, FolderNaming>,
    locks: BTreeMap<ItemPath, LockToken>,
    history: Vec<CommitRecord>,
    next_token: u64,
}

/// Repository kept entirely in memory.
#[derive(Debug)]
pub struct MemoryRepository {
    repository: Repository,
    state: Mutex<State>,
}

impl MemoryRepository {
    /// Create an empty repository holding only the root folder.
    pub fn new(repository: Repository) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(ItemPath::root(), Node::folder(Revision(0)));
        Self {
            repository,
            state: Mutex::new(State {
                youngest: Revision(0),
                nodes,
                config: BTreeMap::new(),
                naming: BTreeMap::new(),
                locks: BTreeMap::new(),
                history: Vec::new(),
                next_token: 1,
            }),
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Id of the item at `path`, at head.
    pub fn id(&self, path: &str) -> Result<ItemId> {
        Ok(self.repository.item_id(ItemPath::new(path)?))
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| Error::LockPoisoned {
            context: format!("memory repository {}", self.repository),
        })
    }

    /// Create a folder and any missing ancestors.
    pub fn add_folder(&self, path: &str) -> Result<ItemId> {
        let path = ItemPath::new(path)?;
        let mut state = self.state()?;
        let revision = state.youngest;
        ensure_folder(&mut state.nodes, &path, revision)?;
        Ok(self.repository.item_id(path))
    }

    /// Create or replace a file, creating missing parent folders.
    pub fn add_file(&self, path: &str, content: &[u8]) -> Result<ItemId> {
        let path = ItemPath::new(path)?;
        let parent = path
            .parent()
            .ok_or_else(|| Error::precondition("The repository root is not a file"))?;
        let mut state = self.state()?;
        let revision = state.youngest;
        ensure_folder(&mut state.nodes, &parent, revision)?;
        if let Some(Node {
            kind: ItemKind::Folder,
            ..
        }) = state.nodes.get(&path)
        {
            return Err(Error::precondition(format!("{} is a folder", path)));
        }
        let properties = state
            .nodes
            .get(&path)
            .map(|n| n.properties.clone())
            .unwrap_or_default();
        state
            .nodes
            .insert(path.clone(), Node::file(content.to_vec(), properties, revision));
        Ok(self.repository.item_id(path))
    }

    /// Set one property on an existing item.
    pub fn set_property(&self, path: &str, key: &str, value: &str) -> Result<()> {
        let path = ItemPath::new(path)?;
        let mut state = self.state()?;
        let node = state.nodes.get_mut(&path).ok_or_else(|| Error::NotFound {
            id: self.repository.item_id(path.clone()).logical_id(),
        })?;
        node.properties.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Add or replace a configuration option of a folder.
    pub fn set_config(&self, folder: &str, name: &str, value: &str) -> Result<()> {
        let folder = ItemPath::new(folder)?;
        let mut state = self.state()?;
        let options = state.config.entry(folder).or_default();
        match options.iter_mut().find(|o| o.name == name) {
            Some(option) => option.value = value.to_string(),
            None => options.push(ConfigOption::new(name, value)),
        }
        Ok(())
    }

    pub fn set_naming(&self, folder: &str, naming: FolderNaming) -> Result<()> {
        let folder = ItemPath::new(folder)?;
        self.state()?.naming.insert(folder, naming);
        Ok(())
    }

    /// Contents of a file at head, if it exists.
    pub fn contents(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let path = ItemPath::new(path)?;
        Ok(self
            .state()?
            .nodes
            .get(&path)
            .filter(|n| n.kind == ItemKind::File)
            .map(|n| n.content.clone()))
    }

    /// Properties of an item at head, if it exists.
    pub fn properties(&self, path: &str) -> Result<Option<Properties>> {
        let path = ItemPath::new(path)?;
        Ok(self.state()?.nodes.get(&path).map(|n| n.properties.clone()))
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        let path = ItemPath::new(path)?;
        Ok(self.state()?.nodes.contains_key(&path))
    }

    /// Commits applied so far, oldest first.
    pub fn history(&self) -> Result<Vec<CommitRecord>> {
        Ok(self.state()?.history.clone())
    }

    /// Locks currently held.
    pub fn held_locks(&self) -> Result<Vec<LockToken>> {
        Ok(self.state()?.locks.values().cloned().collect())
    }

    pub fn youngest(&self) -> Result<Revision> {
        Ok(self.state()?.youngest)
    }

    /// Load a directory tree as a repository.
    pub fn load_dir(root: &Path, repository: Repository) -> Result<Self> {
        let repo = Self::new(repository);
        if !root.is_dir() {
            return Err(Error::precondition(format!(
                "Repository directory does not exist: {}",
                root.display()
            )));
        }

        let mut pending_properties = Vec::new();
        for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Backend {
                operation: "load_dir".to_string(),
                message: e.to_string(),
            })?;
            let relative = entry.path().strip_prefix(root).map_err(|_| Error::Backend {
                operation: "load_dir".to_string(),
                message: format!("Failed to make path relative: {}", entry.path().display()),
            })?;
            let relative = relative.to_string_lossy().replace('\\', "/");
            let name = entry.file_name().to_string_lossy();

            if entry.file_type().is_dir() {
                repo.add_folder(&relative)?;
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            let folder = ItemPath::new(&relative)?
                .parent()
                .unwrap_or_else(ItemPath::root);
            match name.as_ref() {
                CONFIG_FILE => {
                    let mapping: serde_yaml::Mapping =
                        serde_yaml::from_str(&fs::read_to_string(entry.path())?)?;
                    for (key, value) in mapping {
                        let key = key.as_str().ok_or_else(|| {
                            Error::config(format!(
                                "Option names in {} must be strings",
                                entry.path().display()
                            ))
                        })?;
                        let json = serde_json::to_string(&value)?;
                        repo.set_config(folder.as_str(), key, &json)?;
                    }
                }
                NAMING_FILE => {
                    let naming: FolderNaming =
                        serde_yaml::from_str(&fs::read_to_string(entry.path())?)?;
                    repo.set_naming(folder.as_str(), naming)?;
                }
                PROPERTIES_FILE => {
                    let properties: BTreeMap<String, Properties> =
                        serde_yaml::from_str(&fs::read_to_string(entry.path())?)?;
                    pending_properties.push((folder, properties));
                }
                _ => {
                    repo.add_file(&relative, &fs::read(entry.path())?)?;
                }
            }
        }

        // Entries may appear after their folder's properties file.
        for (folder, entries) in pending_properties {
            for (name, properties) in entries {
                let path = if name == SELF_KEY {
                    folder.clone()
                } else {
                    folder.append(&name)?
                };
                for (key, value) in properties {
                    repo.set_property(path.as_str(), &key, &value)?;
                }
            }
        }

        info!(
            "Loaded repository {} from {}",
            repo.repository,
            root.display()
        );
        Ok(repo)
    }

    /// Write files and properties to a directory tree.
    pub fn write_dir(&self, root: &Path) -> Result<()> {
        let state = self.state()?;
        let mut properties: BTreeMap<ItemPath, BTreeMap<String, Properties>> = BTreeMap::new();

        for (path, node) in &state.nodes {
            let full_path = root.join(path.as_str().trim_start_matches('/'));
            match node.kind {
                ItemKind::Folder => fs::create_dir_all(&full_path)?,
                ItemKind::File => {
                    if let Some(parent) = full_path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&full_path, &node.content)?;
                }
            }
            if !node.properties.is_empty() {
                let (folder, key) = match (node.kind, path.parent()) {
                    (ItemKind::File, Some(parent)) => (parent, path.name().to_string()),
                    _ => (path.clone(), SELF_KEY.to_string()),
                };
                properties
                    .entry(folder)
                    .or_default()
                    .insert(key, node.properties.clone());
            }
        }

        for (folder, entries) in properties {
            let file = root
                .join(folder.as_str().trim_start_matches('/'))
                .join(PROPERTIES_FILE);
            fs::write(file, serde_yaml::to_string(&entries)?)?;
        }
        debug!("Wrote repository {} to {}", self.repository, root.display());
        Ok(())
    }

    fn check_repository(&self, repository: &Repository) -> Result<()> {
        if repository != &self.repository {
            return Err(Error::Backend {
                operation: "repository".to_string(),
                message: format!("Unknown repository: {}", repository),
            });
        }
        Ok(())
    }
}

fn ensure_folder(
    nodes: &mut BTreeMap<ItemPath, Node>,
    path: &ItemPath,
    revision: Revision,
) -> Result<()> {
    let mut missing = Vec::new();
    let mut current = Some(path.clone());
    while let Some(p) = current {
        match nodes.get(&p) {
            Some(node) if node.kind == ItemKind::Folder => break,
            Some(_) => {
                return Err(Error::precondition(format!(
                    "Cannot create folder {}, a file exists at {}",
                    path, p
                )));
            }
            None => {
                current = p.parent();
                missing.push(p);
            }
        }
    }
    for p in missing {
        nodes.insert(p, Node::folder(revision));
    }
    Ok(())
}

fn commit_error(message: String) -> Error {
    Error::Commit { message }
}

impl CommitBackend for MemoryRepository {
    fn youngest_revision(&self, repository: &Repository) -> Result<Revision> {
        self.check_repository(repository)?;
        self.youngest()
    }

    fn lock(
        &self,
        repository: &Repository,
        comment: &str,
        base: Revision,
        path: &ItemPath,
    ) -> Result<Vec<LockToken>> {
        self.check_repository(repository)?;
        let mut state = self.state()?;
        let lock_error = |message: String| Error::Lock {
            path: path.to_string(),
            message,
        };

        let node = state
            .nodes
            .get(path)
            .ok_or_else(|| lock_error("No such file".to_string()))?;
        if node.kind != ItemKind::File {
            return Err(lock_error("Only files can be locked".to_string()));
        }
        if node.revision_changed > base {
            return Err(lock_error(format!(
                "Item is out of date, changed in revision {} after base {}",
                node.revision_changed, base
            )));
        }
        if state.locks.contains_key(path) {
            return Err(lock_error("Item is already locked".to_string()));
        }

        let token = LockToken::new(
            repository.clone(),
            path.clone(),
            &format!("opaquelocktoken:{}", state.next_token),
            base,
        );
        state.next_token += 1;
        state.locks.insert(path.clone(), token.clone());
        debug!("Locked {} ({}): {}", path, token.token(), comment);
        Ok(vec![token])
    }

    fn unlock(&self, tokens: &[LockToken]) -> Result<()> {
        let mut state = self.state()?;
        for token in tokens {
            match state.locks.get(token.path()) {
                Some(held) if held.token() == token.token() => {
                    state.locks.remove(token.path());
                }
                _ => {
                    return Err(Error::Backend {
                        operation: "unlock".to_string(),
                        message: format!("{} is not locked by {}", token.path(), token.token()),
                    });
                }
            }
        }
        Ok(())
    }

    fn commit(&self, change: PendingChange) -> Result<Revision> {
        self.check_repository(change.repository())?;
        if change.is_empty() {
            return Err(commit_error("Refusing to commit an empty change".to_string()));
        }

        let mut state = self.state()?;
        let revision = Revision(state.youngest.number() + 1);
        let (nodes, released) = match apply_change(&state, &change, revision) {
            Ok(applied) => applied,
            Err(e) => {
                let count = release_change_locks(&mut state, &change);
                if count > 0 {
                    debug!("Commit failed, released {} lock(s)", count);
                }
                return Err(e);
            }
        };

        state.nodes = nodes;
        state.youngest = revision;
        for path in &released {
            state.locks.remove(path);
        }
        state.history.push(CommitRecord {
            revision,
            message: change.history_message().to_string(),
            paths: change.file_paths(),
        });
        debug!(
            "Committed {} operation(s) as revision {}",
            change.len(),
            revision
        );
        Ok(revision)
    }
}

/// Build the tree resulting from `change` without touching `state`.
/// Returns the new nodes and the paths whose locks the commit consumes.
fn apply_change(
    state: &State,
    change: &PendingChange,
    revision: Revision,
) -> Result<(BTreeMap<ItemPath, Node>, Vec<ItemPath>)> {
    if change.base() > state.youngest {
        return Err(commit_error(format!(
            "Base revision {} is newer than youngest revision {}",
            change.base(),
            state.youngest
        )));
    }

    let mut nodes = state.nodes.clone();
    let mut released = Vec::new();
    for item in change.items() {
        match item {
            PatchItem::DeclareFolder { path } => {
                ensure_folder(&mut nodes, path, revision)
                    .map_err(|e| commit_error(e.to_string()))?;
            }
            PatchItem::Create {
                path,
                content,
                properties,
            } => {
                if nodes.contains_key(path) {
                    return Err(commit_error(format!("Item already exists: {}", path)));
                }
                let parent_is_folder = path
                    .parent()
                    .and_then(|p| nodes.get(&p))
                    .map(|n| n.kind == ItemKind::Folder)
                    .unwrap_or(false);
                if !parent_is_folder {
                    return Err(commit_error(format!("Parent folder missing for {}", path)));
                }
                nodes.insert(
                    path.clone(),
                    Node::file(content.clone(), properties.clone(), revision),
                );
            }
            PatchItem::ModifyLocked {
                path,
                content,
                properties,
                lock,
            } => {
                let held = state.locks.get(path);
                if held.map(|h| h.token()) != Some(lock.token()) {
                    return Err(commit_error(format!(
                        "Lock token {} does not match the lock on {}",
                        lock.token(),
                        path
                    )));
                }
                let node = nodes
                    .get_mut(path)
                    .filter(|n| n.kind == ItemKind::File)
                    .ok_or_else(|| commit_error(format!("No file to modify at {}", path)))?;
                node.content = content.clone();
                node.properties.extend(properties.clone());
                node.revision_changed = revision;
                released.push(path.clone());
            }
        }
    }
    Ok((nodes, released))
}

/// Drop the held locks a rejected change carried. Tokens that do not match
/// the held lock are left alone.
fn release_change_locks(state: &mut State, change: &PendingChange) -> usize {
    let mut count = 0;
    for lock in change.locks() {
        let matches = state
            .locks
            .get(lock.path())
            .map(|held| held.token() == lock.token())
            .unwrap_or(false);
        if matches {
            state.locks.remove(lock.path());
            count += 1;
        }
    }
    count
}

impl ItemLookup for MemoryRepository {
    fn get_item(&self, id: &ItemId) -> Result<Item> {
        let state = self.state()?;
        let node = state
            .nodes
            .get(id.path())
            .filter(|_| id.repository() == &self.repository)
            .ok_or_else(|| Error::NotFound {
                id: id.logical_id(),
            })?;
        Ok(Item {
            id: id.clone(),
            kind: node.kind,
            properties: node.properties.clone(),
            revision_changed: Some(node.revision_changed),
        })
    }

    fn immediate_files(&self, folder: &ItemId) -> Result<Vec<ItemId>> {
        if !self.get_item(folder)?.is_folder() {
            return Err(Error::precondition(format!("{} is not a folder", folder.path())));
        }
        let state = self.state()?;
        Ok(state
            .nodes
            .iter()
            .filter(|(path, node)| {
                node.kind == ItemKind::File && path.parent().as_ref() == Some(folder.path())
            })
            .map(|(path, _)| folder.with_path(path.clone()))
            .collect())
    }

    fn read_contents(&self, id: &ItemId) -> Result<Vec<u8>> {
        let item = self.get_item(id)?;
        if !item.is_file() {
            return Err(Error::precondition(format!("{} is not a file", id.path())));
        }
        let state = self.state()?;
        Ok(state
            .nodes
            .get(id.path())
            .map(|n| n.content.clone())
            .unwrap_or_default())
    }
}

impl ConfigSource for MemoryRepository {
    /// Options of `folder` and its ancestors. An option set on a deeper
    /// folder replaces the same option of an ancestor.
    fn folder_config(&self, folder: &ItemId) -> Result<Vec<ConfigOption>> {
        let state = self.state()?;
        let mut chain = Vec::new();
        let mut current = Some(folder.path().clone());
        while let Some(path) = current {
            current = path.parent();
            chain.push(path);
        }

        let mut options: Vec<ConfigOption> = Vec::new();
        for path in chain.iter().rev() {
            for option in state.config.get(path).into_iter().flatten() {
                match options.iter_mut().find(|o| o.name == option.name) {
                    Some(existing) => existing.value = option.value.clone(),
                    None => options.push(option.clone()),
                }
            }
        }
        Ok(options)
    }
}

impl NamingService for MemoryRepository {
    fn folder_naming(&self, folder: &ItemId) -> Result<FolderNaming> {
        Ok(self
            .state()?
            .naming
            .get(folder.path())
            .cloned()
            .unwrap_or_default())
    }

    fn expand(&self, folder: &ItemId, pattern: &str, extension: &str) -> Result<String> {
        expand_sequential(self, folder, pattern, extension)
    }
}
