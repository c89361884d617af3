//! Core type definitions for DICOM item reconciliation
//!
//! This module provides the fundamental types used throughout the library:
//! - [`TagValue`]: A normalized, comparable DICOM value
//! - [`TagMap`]: Flat tag key to value mapping extracted from one file
//! - [`FileDisplayRecord`]: Per-file projection used for listing and ordering
//! - [`DicomAggregate`]: Reconciled data persisted on an item
//! - [`ItemDocument`] / [`FileDocument`]: Documents held by the object store
//! - [`ReconcileConfig`]: Extraction and write settings
//! - [`TagFilter`]: Tag allow-list for listings

mod config;
mod document;
mod filter;
mod record;
mod tag_map;
mod value;

pub use config::{ReconcileConfig, DEFAULT_MAX_HEADER_BYTES, DEFAULT_MAX_WRITE_RETRIES};
pub use document::{DicomAggregate, FileDocument, FileId, ItemDocument, ItemId};
pub use filter::TagFilter;
pub use record::FileDisplayRecord;
pub use tag_map::TagMap;
pub use value::TagValue;
