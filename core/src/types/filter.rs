use crate::error::{DicomItemError, Result};
use crate::extraction::tags::{hex_key, keyword, parse_hex_key, tag_by_keyword};
use crate::types::TagMap;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Allow-list of tags for file listings
///
/// Built from a comma-separated list. Each entry may be a dictionary
/// keyword (`Rows`), a hex key (`x00280010` or `00280010`) or a
/// parenthesized pair (`(0028,0010)`). Standard tags match under both
/// their keyword and their hex key, whichever form was given.
///
/// # Example
///
/// ```
/// use dicomitem_core::TagFilter;
///
/// let filter = TagFilter::parse("Rows, (0028,0011)").unwrap();
/// assert!(filter.allows("Rows"));
/// assert!(filter.allows("x00280010"));
/// assert!(filter.allows("Columns"));
/// assert!(!filter.allows("Modality"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    keys: BTreeSet<String>,
}

impl TagFilter {
    /// Parses a comma-separated allow-list
    ///
    /// # Errors
    ///
    /// Returns [`DicomItemError::InvalidFilter`] for entries that are neither
    /// a keyword nor a tag.
    pub fn parse(list: &str) -> Result<Self> {
        static REGEX: OnceLock<Regex> = OnceLock::new();
        let re = REGEX.get_or_init(|| {
            Regex::new(r"\s*\(\s*([0-9A-Fa-f]{4})\s*,\s*([0-9A-Fa-f]{4})\s*\)\s*|[^,]+")
                .expect("Failed to compile regex")
        });

        let mut filter = TagFilter::default();
        for caps in re.captures_iter(list) {
            if let (Some(group), Some(element)) = (caps.get(1), caps.get(2)) {
                filter.add_key(&format!("{}{}", group.as_str(), element.as_str()))?;
                continue;
            }
            let entry = caps[0].trim();
            if !entry.is_empty() {
                filter.add_key(entry)?;
            }
        }
        Ok(filter)
    }

    fn add_key(&mut self, entry: &str) -> Result<()> {
        if let Some(tag) = parse_hex_key(entry) {
            self.keys.insert(hex_key(tag));
            if let Some(name) = keyword(tag) {
                self.keys.insert(name.to_string());
            }
        } else if is_keyword(entry) {
            self.keys.insert(entry.to_string());
            if let Some(tag) = tag_by_keyword(entry) {
                self.keys.insert(hex_key(tag));
            }
        } else {
            return Err(DicomItemError::InvalidFilter(entry.to_string()));
        }
        Ok(())
    }

    /// Checks if a tag map key passes the filter
    pub fn allows(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Whether no entry was given
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Restricts a tag map to the allowed keys
    pub fn apply(&self, tags: &TagMap) -> TagMap {
        tags.select(self.keys.iter().map(String::as_str))
    }
}

fn is_keyword(entry: &str) -> bool {
    let mut chars = entry.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric())
}
