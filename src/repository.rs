//! # Collaborator Contracts
//!
//! The transform and import flows coordinate several independently failing
//! subsystems. Each of them sits behind a trait defined here so that the
//! orchestrators never depend on a concrete backend:
//!
//! - **`CommitBackend`**: revision numbering, locking and atomic multi-file
//!   commits.
//! - **`ItemLookup`**: item metadata, folder listings and file contents.
//! - **`Classifier`**: decides which files of a folder are transform input.
//! - **`TransformEngine`**: runs a stylesheet against one source item and
//!   captures the primary and secondary result documents.
//! - **`NamingService`**: folder naming configuration and shard name
//!   expansion for imports.
//! - **`FetchClient`**: downloads import payloads.
//! - **`ConfigSource`**: per-folder configuration options.
//!
//! `MemoryRepository` implements the repository-side traits for tests and
//! the CLI, `XmlClassifier` and `HttpFetchClient` are the default
//! classifier and fetch client. Tests substitute hand-written doubles.

use crate::changeset::PendingChange;
use crate::error::Result;
use crate::item::{Item, ItemId, ItemPath, Repository, Revision};
use crate::locking::LockToken;
use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

/// Version-control backend: revisions, locks and commits.
pub trait CommitBackend: Send + Sync {
    /// Latest revision of the repository.
    fn youngest_revision(&self, repository: &Repository) -> Result<Revision>;

    /// Lock `path` for modification. Returns the tokens the backend handed
    /// out, which for a single path is expected to be exactly one.
    fn lock(
        &self,
        repository: &Repository,
        comment: &str,
        base: Revision,
        path: &ItemPath,
    ) -> Result<Vec<LockToken>>;

    /// Release locks that will not be consumed by a commit.
    fn unlock(&self, tokens: &[LockToken]) -> Result<()>;

    /// Submit a pending change as one atomic commit.
    ///
    /// Callers hand the locks carried by `ModifyLocked` operations over to
    /// this call. They are released whether the commit succeeds or fails,
    /// and a failed commit leaves the repository unchanged.
    fn commit(&self, change: PendingChange) -> Result<Revision>;
}

/// Item metadata and content lookup.
pub trait ItemLookup: Send + Sync {
    /// Look up an item. A missing item yields `Error::NotFound`.
    fn get_item(&self, id: &ItemId) -> Result<Item>;

    /// Files directly inside a folder.
    fn immediate_files(&self, folder: &ItemId) -> Result<Vec<ItemId>>;

    /// Contents of a file.
    fn read_contents(&self, id: &ItemId) -> Result<Vec<u8>>;
}

/// Decides whether a file is input for a folder transform.
pub trait Classifier: Send + Sync {
    fn is_eligible_for_transform(&self, id: &ItemId) -> Result<bool>;
}

/// A stylesheet resolved before the engine runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stylesheet {
    /// A stylesheet shipped with the engine, addressed by name.
    BuiltIn(String),
    /// A stylesheet read from the repository.
    Document { id: ItemId, content: Vec<u8> },
}

impl Stylesheet {
    /// Human readable reference for logs and messages.
    pub fn describe(&self) -> String {
        match self {
            Stylesheet::BuiltIn(name) => name.clone(),
            Stylesheet::Document { id, .. } => id.path().to_string(),
        }
    }
}

/// One engine invocation.
#[derive(Debug)]
pub struct TransformRequest<'a> {
    pub stylesheet: &'a Stylesheet,
    /// Source item, always at head.
    pub source: &'a ItemId,
    /// Location the primary output is bound to. Secondary hrefs are
    /// relative to its folder.
    pub primary_output: &'a ItemPath,
    /// Config params, forwarded as stylesheet parameters.
    pub params: &'a BTreeMap<String, String>,
}

/// A secondary result document captured during one invocation.
pub struct ResultDocument {
    /// Relative reference, possibly percent-encoded.
    pub href: String,
    pub content: Box<dyn Read + Send>,
}

/// Everything one engine invocation produced.
pub struct TransformOutput {
    pub primary: Box<dyn Read + Send>,
    pub result_documents: Vec<ResultDocument>,
    /// Diagnostic messages emitted by the stylesheet.
    pub messages: Vec<String>,
}

/// Declarative document transformation engine.
pub trait TransformEngine: Send + Sync {
    /// Whether a built-in stylesheet with this name is available.
    fn has_builtin(&self, name: &str) -> bool;

    fn transform(&self, request: &TransformRequest<'_>) -> Result<TransformOutput>;
}

/// Naming configuration of a folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FolderNaming {
    /// New items get generated names below this folder.
    #[serde(default)]
    pub shard_parent: bool,
    /// Name pattern used for generated names.
    #[serde(default)]
    pub pattern: Option<String>,
}

/// Folder naming configuration and shard name expansion.
pub trait NamingService: Send + Sync {
    fn folder_naming(&self, folder: &ItemId) -> Result<FolderNaming>;

    /// Expand `pattern` into a fresh leaf name (without extension) that is
    /// unused in `folder` for files with `extension`.
    fn expand(&self, folder: &ItemId, pattern: &str, extension: &str) -> Result<String>;
}

/// Connect and read timeouts of one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTimeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Default for FetchTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(60),
        }
    }
}

/// Response of a fetch.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP(S) GET client used by imports.
pub trait FetchClient: Send + Sync {
    fn get(&self, url: &str, timeouts: &FetchTimeouts) -> Result<FetchResponse>;
}

/// One configuration option of a folder, e.g. `cmsconfig-transform:import`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigOption {
    /// Namespaced name, `<namespace>:<key>`.
    pub name: String,
    /// Raw JSON value.
    pub value: String,
}

impl ConfigOption {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        self.name.split_once(':').map(|(ns, _)| ns).unwrap_or(&self.name)
    }

    pub fn key(&self) -> &str {
        self.name.split_once(':').map(|(_, key)| key).unwrap_or("")
    }
}

/// Per-folder configuration options.
pub trait ConfigSource: Send + Sync {
    /// Options effective for `folder`, at head.
    fn folder_config(&self, folder: &ItemId) -> Result<Vec<ConfigOption>>;
}
