//! Output location resolution for cms-transform

use crate::error::{Error, Result};
use crate::item::{ItemId, ItemPath};
use crate::repository::ItemLookup;
use log::debug;

/// Folder the outputs of a transform are written to.
///
/// An empty or missing `output` param defaults to the source item's parent
/// folder. Otherwise the param is an absolute path within the repository.
pub fn resolve_output_path(source: &ItemId, output: Option<&str>) -> Result<ItemPath> {
    match output.map(str::trim).filter(|o| !o.is_empty()) {
        None => {
            debug!("Output folder is not specified will default to items parent folder.");
            Ok(source.path().parent().unwrap_or_else(ItemPath::root))
        }
        Some(output) => {
            debug!("Output folder is specified: {}", output);
            ItemPath::new(output)
        }
    }
}

/// Existence probe. A lookup miss is `false`, any other failure propagates.
pub fn path_exists(lookup: &dyn ItemLookup, id: &ItemId) -> Result<bool> {
    match lookup.get_item(id) {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Location of a secondary result document below `output_folder`.
///
/// `href` is relative and may be percent-encoded; every segment is decoded
/// before use. A leading `/` is rejected, before and after decoding.
pub fn resolve_result_path(output_folder: &ItemPath, href: &str) -> Result<ItemPath> {
    if href.starts_with('/') {
        return Err(Error::config(format!(
            "Relative href must not start with slash: {}",
            href
        )));
    }

    let mut segments = Vec::new();
    for raw in href.split('/') {
        let decoded = urlencoding::decode(raw).map_err(|e| {
            Error::config(format!("Relative href is not valid UTF-8 when decoded: {} ({})", href, e))
        })?;
        segments.push(decoded.into_owned());
    }

    if segments.first().map(|s| s.starts_with('/')).unwrap_or(false) {
        return Err(Error::config(format!(
            "Relative href must not start with slash: {}",
            href
        )));
    }
    if segments.iter().all(|s| s.is_empty()) {
        return Err(Error::config(format!("Relative href is empty: '{}'", href)));
    }

    output_folder.append_all(segments.iter().map(String::as_str))
}
