use dicom_core::dictionary::{DataDictionary, TagRange};
use dicom_core::Tag;
use dicom_dictionary_std::StandardDataDictionary;

// Ordering Tags
pub const SERIES_NUMBER: Tag = Tag(0x0020, 0x0011);
pub const INSTANCE_NUMBER: Tag = Tag(0x0020, 0x0013);
pub const SLICE_LOCATION: Tag = Tag(0x0020, 0x1041);

// Keyword keys of the ordering tags
pub const SERIES_NUMBER_KEY: &str = "SeriesNumber";
pub const INSTANCE_NUMBER_KEY: &str = "InstanceNumber";
pub const SLICE_LOCATION_KEY: &str = "SliceLocation";

// Reading stops at this tag
pub const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);

/// Formats a tag as its hex key, e.g. `x00200011`
pub fn hex_key(tag: Tag) -> String {
    format!("x{:04x}{:04x}", tag.group(), tag.element())
}

/// Parses a hex key back into a tag
///
/// Accepts `x00200011` and the bare `00200011` form, in either case.
pub fn parse_hex_key(key: &str) -> Option<Tag> {
    let digits = key
        .strip_prefix('x')
        .or_else(|| key.strip_prefix('X'))
        .unwrap_or(key);
    if digits.len() != 8 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let group = u16::from_str_radix(&digits[0..4], 16).ok()?;
    let element = u16::from_str_radix(&digits[4..8], 16).ok()?;
    Some(Tag(group, element))
}

/// Checks if a tag belongs to a private (odd) group
pub fn is_private(tag: Tag) -> bool {
    tag.group() % 2 == 1
}

/// Standard dictionary keyword of a public tag
///
/// Returns `None` for private tags and tags unknown to the dictionary.
pub fn keyword(tag: Tag) -> Option<&'static str> {
    if is_private(tag) {
        return None;
    }
    StandardDataDictionary.by_tag(tag).map(|entry| entry.alias)
}

/// Looks up a single tag by its standard dictionary keyword
///
/// Keywords that name a tag range (repeating groups) resolve to `None`.
pub fn tag_by_keyword(name: &str) -> Option<Tag> {
    StandardDataDictionary
        .by_name(name)
        .and_then(|entry| match entry.tag {
            TagRange::Single(tag) => Some(tag),
            _ => None,
        })
}
