//! Object and blob store collaborators
//!
//! The reconciliation engine reads and writes documents through
//! [`ObjectStore`] and reads file bytes through [`BlobStore`]. Document
//! writes are single-document compare-and-set operations keyed on the
//! document's `revision`.

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::types::{FileDocument, FileId, ItemDocument, ItemId};
use std::io::Read;
use std::sync::Arc;

/// Document store holding items and files
pub trait ObjectStore: Send + Sync {
    /// Loads the current version of an item
    fn load_item(&self, id: &ItemId) -> Result<ItemDocument>;

    /// Writes an item if its stored revision still equals `item.revision`
    ///
    /// Returns the saved document with its revision bumped. A stale
    /// revision fails with [`DicomItemError::Conflict`](crate::DicomItemError::Conflict).
    fn save_item(&self, item: &ItemDocument) -> Result<ItemDocument>;

    /// Loads the current version of a file document
    fn load_file(&self, id: &FileId) -> Result<FileDocument>;

    /// Writes a file document with the same compare-and-set rule as items
    fn save_file(&self, file: &FileDocument) -> Result<FileDocument>;

    /// Lists the files of an item in a stable order
    fn child_files(&self, item: &ItemId) -> Result<Vec<FileDocument>>;
}

/// Byte storage behind file documents
pub trait BlobStore: Send + Sync {
    /// Opens the content of a file for reading
    ///
    /// The stream is closed when the returned reader is dropped.
    fn open(&self, file: &FileDocument) -> Result<Box<dyn Read + '_>>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    fn load_item(&self, id: &ItemId) -> Result<ItemDocument> {
        (**self).load_item(id)
    }

    fn save_item(&self, item: &ItemDocument) -> Result<ItemDocument> {
        (**self).save_item(item)
    }

    fn load_file(&self, id: &FileId) -> Result<FileDocument> {
        (**self).load_file(id)
    }

    fn save_file(&self, file: &FileDocument) -> Result<FileDocument> {
        (**self).save_file(file)
    }

    fn child_files(&self, item: &ItemId) -> Result<Vec<FileDocument>> {
        (**self).child_files(item)
    }
}

impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    fn open(&self, file: &FileDocument) -> Result<Box<dyn Read + '_>> {
        (**self).open(file)
    }
}
