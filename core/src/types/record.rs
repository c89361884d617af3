use super::{FileDocument, FileId, TagMap, TagValue};
use crate::extraction::tags::{INSTANCE_NUMBER_KEY, SERIES_NUMBER_KEY, SLICE_LOCATION_KEY};
use serde::{Deserialize, Serialize};

/// Lightweight per-file projection used for listing and ordering
///
/// Created once when a file is extracted; stored in the item's aggregate.
/// The ordering tags keep whatever normalized shape the file carried.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileDisplayRecord {
    #[serde(rename = "_id")]
    pub id: FileId,

    pub name: String,

    #[serde(rename = "SeriesNumber", default, skip_serializing_if = "Option::is_none")]
    pub series_number: Option<TagValue>,

    #[serde(rename = "InstanceNumber", default, skip_serializing_if = "Option::is_none")]
    pub instance_number: Option<TagValue>,

    #[serde(rename = "SliceLocation", default, skip_serializing_if = "Option::is_none")]
    pub slice_location: Option<TagValue>,
}

impl FileDisplayRecord {
    /// Creates a record without ordering tags
    pub fn new(id: FileId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            series_number: None,
            instance_number: None,
            slice_location: None,
        }
    }

    /// Projects a file document and its extracted tags into a record
    pub fn from_tags(file: &FileDocument, tags: &TagMap) -> Self {
        Self {
            id: file.id.clone(),
            name: file.name.clone(),
            series_number: tags.get(SERIES_NUMBER_KEY).cloned(),
            instance_number: tags.get(INSTANCE_NUMBER_KEY).cloned(),
            slice_location: tags.get(SLICE_LOCATION_KEY).cloned(),
        }
    }

    /// Builder: set the ordering tags
    pub fn with_position(
        mut self,
        series_number: Option<TagValue>,
        instance_number: Option<TagValue>,
        slice_location: Option<TagValue>,
    ) -> Self {
        self.series_number = series_number;
        self.instance_number = instance_number;
        self.slice_location = slice_location;
        self
    }
}
