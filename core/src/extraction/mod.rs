pub mod extractor;
pub mod normalize;
pub mod tags;

pub use extractor::{tag_map_from_object, FileMetadata, MetadataExtractor};
pub use normalize::{normalize, normalize_primitive};
pub use tags::*;
