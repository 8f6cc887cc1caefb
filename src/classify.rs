//! Default transform eligibility check for folder sources.

use crate::error::Result;
use crate::item::ItemId;
use crate::repository::{Classifier, ItemLookup};
use log::debug;
use std::sync::Arc;

/// Property holding the item's content class.
pub const CLASS_PROPERTY: &str = "cms:class";

/// Class of items extracted from binary documents into XHTML.
pub const EXTRACTED_CONTENT_CLASS: &str = "tikahtml";

/// Treats XML files, and items flagged as extracted content, as transform
/// input.
pub struct XmlClassifier {
    lookup: Arc<dyn ItemLookup>,
}

impl XmlClassifier {
    pub fn new(lookup: Arc<dyn ItemLookup>) -> Self {
        Self { lookup }
    }
}

impl Classifier for XmlClassifier {
    fn is_eligible_for_transform(&self, id: &ItemId) -> Result<bool> {
        let item = self.lookup.get_item(id)?;
        if !item.is_file() {
            return Ok(false);
        }

        let flagged = item
            .property(CLASS_PROPERTY)
            .map(|classes| {
                classes
                    .split_whitespace()
                    .any(|class| class == EXTRACTED_CONTENT_CLASS)
            })
            .unwrap_or(false);
        if flagged {
            return Ok(true);
        }

        let contents = self.lookup.read_contents(id)?;
        let eligible = match std::str::from_utf8(&contents) {
            Ok(text) => xot::Xot::new().parse(text).is_ok(),
            Err(_) => false,
        };
        if !eligible {
            debug!("Skipping {}, not an XML document", id.path());
        }
        Ok(eligible)
    }
}
