use super::{FileDisplayRecord, TagMap};
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of an item document
    ItemId
);

string_id!(
    /// Identifier of a file document
    FileId
);

/// Reconciled DICOM data attached to an item
///
/// `meta` is `None` when no DICOM file has been folded in yet; an empty
/// map means DICOM files exist but share no tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DicomAggregate {
    #[serde(default)]
    pub meta: Option<TagMap>,

    #[serde(default)]
    pub files: Vec<FileDisplayRecord>,
}

impl DicomAggregate {
    /// Aggregate of an item without DICOM files
    pub fn empty() -> Self {
        Self {
            meta: None,
            files: Vec::new(),
        }
    }
}

/// Item document as held by the object store
///
/// Only `dicom` is owned by this crate; every other field is carried
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDocument {
    #[serde(rename = "_id")]
    pub id: ItemId,

    #[serde(default)]
    pub name: String,

    /// Compare-and-set token, bumped by every successful save
    #[serde(default)]
    pub revision: u64,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient"
    )]
    pub dicom: Option<DicomAggregate>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ItemDocument {
    pub fn new(id: ItemId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            revision: 0,
            dicom: None,
            fields: Map::new(),
        }
    }

    /// Common tags of the item, if any have been reconciled
    pub fn dicom_meta(&self) -> Option<&TagMap> {
        self.dicom.as_ref().and_then(|d| d.meta.as_ref())
    }
}

/// File document as held by the object store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDocument {
    #[serde(rename = "_id")]
    pub id: FileId,

    #[serde(rename = "itemId")]
    pub item_id: ItemId,

    pub name: String,

    #[serde(default)]
    pub size: u64,

    #[serde(default)]
    pub revision: u64,

    /// Cached tags of this file; `None` when not extracted or not DICOM
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient"
    )]
    pub dicom: Option<TagMap>,
}

impl FileDocument {
    pub fn new(id: FileId, item_id: ItemId, name: impl Into<String>, size: u64) -> Self {
        Self {
            id,
            item_id,
            name: name.into(),
            size,
            revision: 0,
            dicom: None,
        }
    }
}

/// Reads an optional field, dropping shapes that do not match the current
/// schema instead of failing the whole document
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("Ignoring unrecognized dicom field: {}", e);
            None
        }
    }))
}
