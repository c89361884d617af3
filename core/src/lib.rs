//! DICOM metadata reconciliation for items that group uploaded files
//!
//! Each file of an item is read as a DICOM header, its tags normalized into
//! a [`TagMap`], and the maps of all DICOM files reduced to the tags they
//! share with identical values. The shared tags and a display-ordered file
//! list form the item's [`DicomAggregate`].

pub mod api;
pub mod cli;
pub mod error;
pub mod events;
pub mod extraction;
pub mod ordering;
pub mod orchestrator;
pub mod reconcile;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{AccessLevel, DicomItemApi};
pub use cli::report::TextReport;
pub use error::{DicomItemError, Result};
pub use events::{
    Delivery, UploadDispatcher, UploadEvent, UploadHandler, DEFAULT_DEDUP_WINDOW,
};
pub use extraction::{FileMetadata, MetadataExtractor};
pub use orchestrator::{
    FileListing, ItemReconciler, ListOptions, ReconcileReport, UploadOutcome, HANDLER_NAME,
};
pub use reconcile::{reconcile, reconcile_all, reconcile_into};
pub use store::{BlobStore, FsStore, MemoryStore, ObjectStore};
pub use types::*;
