//! Repository item identity: repositories, paths, revisions and items
//!
//! An item is addressed by an [`ItemId`]: the repository it lives in, its
//! absolute [`ItemPath`] inside that repository and an optional pinned
//! ("peg") [`Revision`]. The logical id string form is
//! `<repository-url>^<path>[?p=<revision>]`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Property map attached to repository items.
pub type Properties = BTreeMap<String, String>;

/// A repository revision number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision(pub u64);

impl Revision {
    pub fn number(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A versioned content repository, identified by its URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Repository {
    url: String,
}

impl Repository {
    /// Create a repository handle, validating the URL.
    pub fn new(url: &str) -> Result<Self> {
        let trimmed = url.trim().trim_end_matches('/');
        Url::parse(trimmed)?;
        Ok(Self {
            url: trimmed.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Last segment of the repository URL.
    pub fn name(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or(&self.url)
    }

    /// Id of the repository root folder.
    pub fn root_id(&self) -> ItemId {
        ItemId::new(self.clone(), ItemPath::root())
    }

    /// Id of an item in this repository at head.
    pub fn item_id(&self, path: ItemPath) -> ItemId {
        ItemId::new(self.clone(), path)
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// An absolute, normalized path inside a repository.
///
/// Always starts with `/`, never ends with `/` (except the root), never
/// contains empty, `.` or `..` segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemPath(String);

impl ItemPath {
    /// Parse a path. A missing leading slash is tolerated, the path is
    /// always interpreted as absolute.
    pub fn new(path: &str) -> Result<Self> {
        let mut normalized = String::new();
        for segment in path.trim().split('/') {
            if segment.is_empty() {
                continue;
            }
            validate_segment(segment)?;
            normalized.push('/');
            normalized.push_str(segment);
        }
        if normalized.is_empty() {
            normalized.push('/');
        }
        Ok(Self(normalized))
    }

    /// The repository root `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Last path segment, empty for the root.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Extension of the last segment, if any.
    pub fn extension(&self) -> Option<&str> {
        let name = self.name();
        match name.rfind('.') {
            Some(idx) if idx > 0 => Some(&name[idx + 1..]),
            _ => None,
        }
    }

    /// Parent folder, `None` for the root.
    pub fn parent(&self) -> Option<ItemPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(ItemPath::root()),
            Some(idx) => Some(ItemPath(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Append a single segment.
    pub fn append(&self, segment: &str) -> Result<ItemPath> {
        if segment.contains('/') {
            return Err(Error::config(format!(
                "Path segment must not contain '/': {}",
                segment
            )));
        }
        if segment.is_empty() {
            return Err(Error::config("Path segment must not be empty"));
        }
        validate_segment(segment)?;
        Ok(self.append_unchecked(segment))
    }

    /// Append every segment of a relative path, ignoring empty segments.
    pub fn append_all<'a, I>(&self, segments: I) -> Result<ItemPath>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut path = self.clone();
        for segment in segments {
            if segment.is_empty() {
                continue;
            }
            path = path.append(segment)?;
        }
        Ok(path)
    }

    /// True if `other` lies strictly below this path.
    pub fn is_ancestor_of(&self, other: &ItemPath) -> bool {
        if self.is_root() {
            return !other.is_root();
        }
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }

    fn append_unchecked(&self, segment: &str) -> ItemPath {
        if self.is_root() {
            ItemPath(format!("/{}", segment))
        } else {
            ItemPath(format!("{}/{}", self.0, segment))
        }
    }
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment == "." || segment == ".." {
        return Err(Error::config(format!(
            "Path segment '{}' is not allowed",
            segment
        )));
    }
    Ok(())
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of an item: repository, path and optional pinned revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId {
    repository: Repository,
    path: ItemPath,
    peg: Option<Revision>,
}

impl ItemId {
    pub fn new(repository: Repository, path: ItemPath) -> Self {
        Self {
            repository,
            path,
            peg: None,
        }
    }

    /// Parse a logical id of the form `<repo-url>^<path>[?p=<rev>]`.
    pub fn parse(logical_id: &str) -> Result<Self> {
        let (repo, rest) = logical_id.split_once('^').ok_or_else(|| {
            Error::config(format!(
                "Item id must separate repository and path with '^': {}",
                logical_id
            ))
        })?;
        let (path, peg) = match rest.split_once("?p=") {
            Some((path, rev)) => {
                let number = rev.parse::<u64>().map_err(|_| {
                    Error::config(format!("Invalid revision '{}' in item id", rev))
                })?;
                (path, Some(Revision(number)))
            }
            None => (rest, None),
        };
        Ok(Self {
            repository: Repository::new(repo)?,
            path: ItemPath::new(path)?,
            peg,
        })
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn path(&self) -> &ItemPath {
        &self.path
    }

    pub fn peg(&self) -> Option<Revision> {
        self.peg
    }

    /// The same item pinned at `revision`.
    pub fn with_peg(&self, revision: Revision) -> Self {
        Self {
            peg: Some(revision),
            ..self.clone()
        }
    }

    /// The same item at head.
    pub fn without_peg(&self) -> Self {
        Self {
            peg: None,
            ..self.clone()
        }
    }

    /// Another item in the same repository.
    pub fn with_path(&self, path: ItemPath) -> Self {
        Self::new(self.repository.clone(), path)
    }

    /// String form of this id, including the pinned revision if any.
    pub fn logical_id(&self) -> String {
        match self.peg {
            Some(rev) => format!("{}^{}?p={}", self.repository, self.path, rev),
            None => format!("{}^{}", self.repository, self.path),
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.logical_id())
    }
}

impl Serialize for ItemId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.logical_id())
    }
}

/// Kind of a repository item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Folder,
}

/// Result of an item lookup.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: ItemId,
    pub kind: ItemKind,
    pub properties: Properties,
    /// Revision at which the item last changed.
    pub revision_changed: Option<Revision>,
}

impl Item {
    pub fn is_file(&self) -> bool {
        self.kind == ItemKind::File
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}
