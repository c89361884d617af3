use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A normalized DICOM tag value
///
/// Values are restricted to shapes that can be compared, hashed and stored
/// as JSON: integers, finite floats, text, and flat lists of those scalars.
/// Sequences and binary payloads never reach this type.
///
/// Equality is exact: `Int(1)` and `Float(1.0)` are different values, since
/// they come from different value representations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<TagValue>),
}

impl TagValue {
    /// Builds a float value, rejecting NaN and infinities
    ///
    /// Negative zero is folded into positive zero so that equality and
    /// hashing agree.
    ///
    /// ```
    /// use dicomitem_core::TagValue;
    ///
    /// assert_eq!(TagValue::float(-0.0), TagValue::float(0.0));
    /// assert!(TagValue::float(f64::NAN).is_none());
    /// ```
    pub fn float(value: f64) -> Option<TagValue> {
        if !value.is_finite() {
            return None;
        }
        Some(TagValue::Float(canonical_float(value)))
    }

    /// Creates a text value
    pub fn text(value: impl Into<String>) -> TagValue {
        TagValue::Text(value.into())
    }

    /// Returns the text content, if this is a text value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content, if this is an integer value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            TagValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a numeric view of scalar numbers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Int(v) => Some(*v as f64),
            TagValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Checks whether this is a list value
    pub fn is_list(&self) -> bool {
        matches!(self, TagValue::List(_))
    }

    fn rank(&self) -> u8 {
        match self {
            TagValue::Int(_) | TagValue::Float(_) => 0,
            TagValue::Text(_) => 1,
            TagValue::List(_) => 2,
        }
    }
}

fn canonical_float(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}

impl PartialEq for TagValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TagValue::Int(a), TagValue::Int(b)) => a == b,
            (TagValue::Float(a), TagValue::Float(b)) => {
                canonical_float(*a).to_bits() == canonical_float(*b).to_bits()
            }
            (TagValue::Text(a), TagValue::Text(b)) => a == b,
            (TagValue::List(a), TagValue::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for TagValue {}

impl Hash for TagValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            TagValue::Int(v) => v.hash(state),
            TagValue::Float(v) => canonical_float(*v).to_bits().hash(state),
            TagValue::Text(s) => s.hash(state),
            TagValue::List(items) => items.hash(state),
        }
    }
}

impl PartialOrd for TagValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Numbers before text before lists; numbers compare by magnitude with
/// `Int` ahead of an equal `Float`.
impl Ord for TagValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (TagValue::Int(a), TagValue::Int(b)) => a.cmp(b),
            (TagValue::Float(a), TagValue::Float(b)) => {
                canonical_float(*a).total_cmp(&canonical_float(*b))
            }
            (TagValue::Int(a), TagValue::Float(b)) => (*a as f64)
                .total_cmp(&canonical_float(*b))
                .then(Ordering::Less),
            (TagValue::Float(a), TagValue::Int(b)) => canonical_float(*a)
                .total_cmp(&(*b as f64))
                .then(Ordering::Greater),
            (TagValue::Text(a), TagValue::Text(b)) => a.cmp(b),
            (TagValue::List(a), TagValue::List(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Int(v) => write!(f, "{}", v),
            TagValue::Float(v) => write!(f, "{}", v),
            TagValue::Text(s) => write!(f, "{}", s),
            TagValue::List(items) => {
                // DICOM multi-value separator
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, "\\")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Int(value)
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Text(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Text(value)
    }
}
