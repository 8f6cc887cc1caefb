//! # Orchestration Flows
//!
//! The two entry points of the crate:
//!
//! - [`TransformOrchestrator`]: applies a stylesheet to a file, or to the
//!   eligible files of a folder, and commits every produced document in one
//!   atomic change.
//! - [`ImportOrchestrator`]: downloads or accepts a payload and commits it
//!   as a new file below a target folder.
//!
//! Both run to completion sequentially. All locks taken during a call are
//! either handed to the commit or released before an error propagates.

pub mod import;
pub mod transform;

pub use import::{ImportOrchestrator, ImportOutcome};
pub use transform::{SourceSet, TransformOrchestrator, TransformOutcome};

use crate::item::{ItemId, Properties};

/// Property recording the source item a file was generated from.
pub const TRANSFORM_BASE_PROPERTY: &str = "abx:TransformBase";

/// Property recording the configuration a file was generated by.
pub const TRANSFORM_NAME_PROPERTY: &str = "abx:TransformName";

/// Provenance properties of a file generated from `source` by the
/// configuration `config_name`. The source is recorded without revision.
pub fn provenance_properties(source: &ItemId, config_name: &str) -> Properties {
    let mut properties = Properties::new();
    properties.insert(
        TRANSFORM_BASE_PROPERTY.to_string(),
        source.without_peg().logical_id(),
    );
    properties.insert(TRANSFORM_NAME_PROPERTY.to_string(), config_name.to_string());
    properties
}
