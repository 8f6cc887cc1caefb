//! Shared test utilities for integration and E2E tests.
//!
//! This module provides a document engine, fixtures over the in-memory
//! repository, and helpers for laying out repository directories on disk.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = RepoFixture::demo();
//!     // ... test code
//! }
//! ```

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use cms_transform::config::{TransformConfig, TransformConfigOptions};
use cms_transform::item::{ItemId, Repository};
use cms_transform::memory::MemoryRepository;
use cms_transform::repository::{
    FetchClient, FetchResponse, FetchTimeouts, ItemLookup, ResultDocument, TransformEngine,
    TransformOutput, TransformRequest,
};
use cms_transform::{Error, Result};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    #[allow(unused_imports)]
    pub use predicates::prelude::*;

    pub use super::{RepoFixture, StaticFetch, WrapEngine, xsl_config};
}

pub const DEMO_REPO: &str = "x-svn:///svn/demo1";

/// Engine wrapping each source document in `<out>` elements.
///
/// Param `split` lists comma separated hrefs; each one becomes a secondary
/// result document. Param `message` is emitted as a diagnostic message.
/// Sources named in `failing` make the engine fail.
pub struct WrapEngine {
    lookup: Arc<dyn ItemLookup>,
    failing: Vec<String>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl WrapEngine {
    pub fn new(lookup: Arc<dyn ItemLookup>) -> Self {
        Self {
            lookup,
            failing: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_on(mut self, source_name: &str) -> Self {
        self.failing.push(source_name.to_string());
        self
    }
}

impl TransformEngine for WrapEngine {
    fn has_builtin(&self, name: &str) -> bool {
        name == "wrap.xsl"
    }

    fn transform(&self, request: &TransformRequest<'_>) -> Result<TransformOutput> {
        self.calls.lock().unwrap().push(request.source.path().to_string());
        if self.failing.iter().any(|n| n == request.source.path().name()) {
            return Err(Error::Engine {
                source_id: request.source.logical_id(),
                message: "terminated by stylesheet".to_string(),
            });
        }

        let content = String::from_utf8(self.lookup.read_contents(request.source)?)
            .unwrap_or_default();
        let primary = format!("<out>{}</out>", content.trim());
        let result_documents = request
            .params
            .get("split")
            .map(|hrefs| {
                hrefs
                    .split(',')
                    .map(|href| ResultDocument {
                        href: href.trim().to_string(),
                        content: Box::new(Cursor::new(
                            format!("<part href=\"{}\"/>", href.trim()).into_bytes(),
                        )),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(TransformOutput {
            primary: Box::new(Cursor::new(primary.into_bytes())),
            result_documents,
            messages: request.params.get("message").cloned().into_iter().collect(),
        })
    }
}

/// Fetch client answering from a fixed table of URLs.
#[derive(Default)]
pub struct StaticFetch {
    responses: HashMap<String, (u16, Vec<u8>)>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl StaticFetch {
    pub fn with(mut self, url: &str, status: u16, body: &str) -> Self {
        self.responses
            .insert(url.to_string(), (status, body.as_bytes().to_vec()));
        self
    }
}

impl FetchClient for StaticFetch {
    fn get(&self, url: &str, _timeouts: &FetchTimeouts) -> Result<FetchResponse> {
        self.calls.lock().unwrap().push(url.to_string());
        let (status, body) = self.responses.get(url).cloned().ok_or_else(|| {
            Error::Fetch {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }
        })?;
        Ok(FetchResponse {
            status,
            content_type: Some("application/xml".to_string()),
            body,
        })
    }
}

/// A small demo repository.
///
/// ```text
/// /doc/a.xml        <doc>a</doc>
/// /doc/b.xml        <doc>b</doc>
/// /doc/notes.txt    plain text, not eligible
/// /xsl/wrap.xsl     repository stylesheet
/// /out/             output folder
/// /import/          import folder without naming
/// /import/shard/    import folder generating DOC-##### names
/// ```
pub struct RepoFixture {
    pub repo: Arc<MemoryRepository>,
}

impl RepoFixture {
    pub fn demo() -> Self {
        let repo = MemoryRepository::new(Repository::new(DEMO_REPO).unwrap());
        repo.add_file("/doc/a.xml", b"<doc>a</doc>").unwrap();
        repo.add_file("/doc/b.xml", b"<doc>b</doc>").unwrap();
        repo.add_file("/doc/notes.txt", b"plain < text").unwrap();
        repo.add_file("/xsl/wrap.xsl", b"<xsl:stylesheet version=\"2.0\"/>")
            .unwrap();
        repo.add_folder("/out").unwrap();
        repo.add_folder("/import/shard").unwrap();
        repo.set_naming(
            "/import/shard",
            cms_transform::repository::FolderNaming {
                shard_parent: true,
                pattern: Some("DOC-#####".to_string()),
            },
        )
        .unwrap();
        Self {
            repo: Arc::new(repo),
        }
    }

    pub fn id(&self, path: &str) -> ItemId {
        self.repo.id(path).unwrap()
    }

    pub fn text(&self, path: &str) -> String {
        String::from_utf8(self.repo.contents(path).unwrap().unwrap()).unwrap()
    }
}

/// An active xsl configuration with the given params.
pub fn xsl_config(name: &str, params: &[(&str, &str)]) -> TransformConfig {
    TransformConfig {
        name: name.to_string(),
        active: true,
        options: Some(TransformConfigOptions {
            kind: "xsl".to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }),
    }
}
