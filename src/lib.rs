//! # CMS Transform Library
//!
//! Content transformation and import for a versioned CMS repository. Source
//! items are run through a stylesheet engine, or content is pulled from a URL,
//! and every resulting document is committed to the repository as a single
//! atomic change.
//!
//! ## Quick Example
//!
//! ```
//! use cms_transform::item::{ItemPath, Repository};
//! use cms_transform::memory::MemoryRepository;
//! use cms_transform::repository::ItemLookup;
//!
//! let repo = MemoryRepository::new(Repository::new("x-svn:///svn/demo1").unwrap());
//! repo.add_file("/in/a.xml", b"<doc/>").unwrap();
//!
//! let item = repo.get_item(&repo.id("/in/a.xml").unwrap()).unwrap();
//! assert!(item.is_file());
//! assert_eq!(item.id.path(), &ItemPath::new("/in/a.xml").unwrap());
//! ```
//!
//! ## Core Concepts
//!
//! - **Items (`item`)**: repository, path, peg revision and the logical id
//!   that ties them together.
//! - **Collaborators (`repository`)**: the traits the orchestrators are built
//!   on. Commit backend, item lookup, classifier, transform engine, folder
//!   naming, HTTP fetching and folder configuration.
//! - **Change sets (`changeset`, `locking`)**: staging of created and
//!   modified files, with locks taken for every overwrite and handed to the
//!   commit.
//! - **Flows (`flows`)**: the transform and import orchestrators.
//! - **Entry points (`event`, `command`)**: reacting to item changes and
//!   handling explicit transform or import requests.
//! - **In-memory repository (`memory`)**: a complete implementation of the
//!   backend traits, loadable from and writable to a directory.
//!
//! ## Transform Flow
//!
//! 1.  **Validate** the configuration before any side effect.
//! 2.  **Resolve** the stylesheet, output folder and source items.
//! 3.  **Run** the engine per source and stage each result document.
//! 4.  **Commit** all staged changes with the aggregated history message, or
//!     release every lock when nothing changed.

pub mod changeset;
pub mod classify;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod fetch;
pub mod flows;
pub mod history;
pub mod item;
pub mod locking;
pub mod memory;
pub mod naming;
pub mod output;
pub mod path;
pub mod repository;

mod history_proptest;

pub use error::{Error, Result};
