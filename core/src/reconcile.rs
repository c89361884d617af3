//! Common-metadata reconciliation
//!
//! Reduces per-file tag maps to the tags whose values are identical in every
//! file. The fold is commutative and associative, so the incremental path
//! (one upload at a time, in arrival order) lands on the same result as a
//! full pass over the same files.

use crate::types::TagMap;

/// Returns the tags present in both maps with equal values
///
/// # Example
///
/// ```
/// use dicomitem_core::{reconcile, TagMap, TagValue};
///
/// let a: TagMap = [("key1", TagValue::text("v1")), ("key6", TagValue::text("commonVal"))]
///     .into_iter()
///     .collect();
/// let b: TagMap = [("key1", TagValue::text("v1")), ("key6", TagValue::text("uniqueVal"))]
///     .into_iter()
///     .collect();
///
/// let common = reconcile(&a, &b);
/// assert_eq!(common.len(), 1);
/// assert!(common.contains_key("key1"));
/// ```
pub fn reconcile(a: &TagMap, b: &TagMap) -> TagMap {
    // iterate the smaller side
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter(|(key, value)| large.get(key) == Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Narrows an accumulator in place with one more map
///
/// Returns the number of tags removed. The accumulator never gains keys.
pub fn reconcile_into(acc: &mut TagMap, other: &TagMap) -> usize {
    let before = acc.len();
    acc.retain(|key, value| other.get(key) == Some(value));
    before - acc.len()
}

/// Folds any number of maps into their common subset
///
/// Returns `None` for an empty input, so "no files" stays distinct from
/// "files with nothing in common".
pub fn reconcile_all<I>(maps: I) -> Option<TagMap>
where
    I: IntoIterator<Item = TagMap>,
{
    let mut maps = maps.into_iter();
    let mut acc = maps.next()?;
    for map in maps {
        if acc.is_empty() {
            break;
        }
        reconcile_into(&mut acc, &map);
    }
    Some(acc)
}
