//! Import target naming
//!
//! Imports land either at an explicitly named leaf (`pathnamebase`) or, in
//! folders configured as shard parents, at a generated name expanded from
//! the folder's name pattern. The two are mutually exclusive:
//!
//! | shard parent | pattern | pathnamebase | result                         |
//! |--------------|---------|--------------|--------------------------------|
//! | yes          | yes     | no           | expanded pattern + `.pathext`  |
//! | yes          | yes     | yes          | error                          |
//! | yes          | no      | any          | error                          |
//! | no           | -       | yes          | `pathnamebase.pathext`         |
//! | no           | -       | no           | error                          |

use crate::error::{Error, Result};
use crate::item::{ItemId, ItemPath};
use crate::repository::{ItemLookup, NamingService};
use log::debug;
use regex::Regex;

/// Placeholder character for the sequence number in name patterns.
const COUNTER_PLACEHOLDER: char = '#';

/// Resolve the path of an imported item inside `target_folder`.
pub fn resolve_import_path(
    naming: &dyn NamingService,
    target_folder: &ItemId,
    pathnamebase: Option<&str>,
    pathext: &str,
) -> Result<ItemPath> {
    let pathnamebase = pathnamebase.map(str::trim).filter(|b| !b.is_empty());
    let pathext = pathext.trim().trim_start_matches('.');
    let config = naming.folder_naming(target_folder)?;
    let folder = target_folder.path();

    let base = match (config.shard_parent, config.pattern.as_deref(), pathnamebase) {
        (true, Some(pattern), None) => {
            let expanded = naming.expand(target_folder, pattern, pathext)?;
            debug!("Expanded name pattern '{}' to '{}' in {}", pattern, expanded, folder);
            expanded
        }
        (true, Some(_), Some(base)) => {
            return Err(Error::precondition(format!(
                "Folder {} generates names, parameter 'pathnamebase' is not allowed: {}",
                folder, base
            )));
        }
        (true, None, _) => {
            return Err(Error::precondition(format!(
                "Folder {} is a shard parent but has no name pattern configured",
                folder
            )));
        }
        (false, _, Some(base)) => base.to_string(),
        (false, _, None) => {
            return Err(Error::precondition(format!(
                "Folder {} does not generate names, parameter 'pathnamebase' is required",
                folder
            )));
        }
    };

    folder.append(&format!("{}.{}", base, pathext))
}

/// Expand a `#`-counter pattern (e.g. `DOC-#####`) into the next name not
/// yet used by a file with `extension` in `folder`.
pub fn expand_sequential(
    lookup: &dyn ItemLookup,
    folder: &ItemId,
    pattern: &str,
    extension: &str,
) -> Result<String> {
    let start = pattern.find(COUNTER_PLACEHOLDER).ok_or_else(|| Error::Config {
        message: format!("Name pattern has no counter placeholder: {}", pattern),
        hint: Some("use a run of '#' characters, e.g. DOC-######".to_string()),
    })?;
    let width = pattern[start..]
        .chars()
        .take_while(|c| *c == COUNTER_PLACEHOLDER)
        .count();
    let prefix = &pattern[..start];
    let suffix = &pattern[start + width..];
    if suffix.contains(COUNTER_PLACEHOLDER) {
        return Err(Error::config(format!(
            "Name pattern must contain a single counter placeholder: {}",
            pattern
        )));
    }

    let matcher = Regex::new(&format!(
        r"^{}(\d+){}\.{}$",
        regex::escape(prefix),
        regex::escape(suffix),
        regex::escape(extension)
    ))?;

    let mut highest = 0u64;
    for id in lookup.immediate_files(folder)? {
        let Some(counter) = matcher.captures(id.path().name()).and_then(|c| c.get(1)) else {
            continue;
        };
        let number = counter.as_str().parse::<u64>().map_err(|_| {
            Error::precondition(format!(
                "Existing name {} has a counter outside the supported range",
                id.path()
            ))
        })?;
        highest = highest.max(number);
    }

    let next = highest.checked_add(1).ok_or_else(|| {
        Error::precondition(format!(
            "Name pattern {} has no counter left in {}",
            pattern,
            folder.path()
        ))
    })?;
    Ok(format!("{}{:0width$}{}", prefix, next, suffix, width = width))
}
