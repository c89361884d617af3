use crate::error::{DicomItemError, Result};
use crate::orchestrator::{FileListing, ItemReconciler, ListOptions, ReconcileReport};
use crate::store::{BlobStore, ObjectStore};
use crate::types::{DicomAggregate, ItemId, TagFilter};
use std::fmt;
use std::sync::Arc;

/// Access level of a caller on an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessLevel {
    Read,
    Write,
    Admin,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
            AccessLevel::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// Access-checked entry points for item DICOM operations
///
/// Each call names the access level the caller holds on the item; the
/// operation is refused when that level is below what it needs.
///
/// # Example
///
/// ```
/// use dicomitem_core::{AccessLevel, DicomItemApi, ItemReconciler, MemoryStore, ReconcileConfig};
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryStore::new());
/// let item = store.create_item("scan");
/// store.add_file(&item.id, "notes.txt", b"not dicom".to_vec()).unwrap();
///
/// let reconciler = ItemReconciler::new(store.clone(), store.clone(), ReconcileConfig::default());
/// let api = DicomItemApi::new(Arc::new(reconciler));
///
/// assert!(api.parse_dicom(&item.id, AccessLevel::Read).is_err());
///
/// let report = api.parse_dicom(&item.id, AccessLevel::Write).unwrap();
/// assert_eq!(report.dicom_files, 0);
/// assert!(report.aggregate.meta.is_none());
/// ```
pub struct DicomItemApi<S, B> {
    reconciler: Arc<ItemReconciler<S, B>>,
}

impl<S: ObjectStore, B: BlobStore> DicomItemApi<S, B> {
    pub fn new(reconciler: Arc<ItemReconciler<S, B>>) -> Self {
        Self { reconciler }
    }

    pub fn reconciler(&self) -> &Arc<ItemReconciler<S, B>> {
        &self.reconciler
    }

    /// Rebuilds and stores the common metadata of an item
    ///
    /// # Errors
    ///
    /// Returns [`DicomItemError::AccessDenied`] below write access.
    pub fn parse_dicom(&self, item_id: &ItemId, access: AccessLevel) -> Result<ReconcileReport> {
        require(access, AccessLevel::Write, item_id)?;
        self.reconciler.reconcile_item(item_id)
    }

    /// Lists the DICOM files of an item with their tags
    ///
    /// `filters` is a comma-separated tag allow-list. `force` re-extracts
    /// every file and rewrites the cached tags, so it needs write access.
    pub fn get_dicom(
        &self,
        item_id: &ItemId,
        filters: Option<&str>,
        force: bool,
        access: AccessLevel,
    ) -> Result<Vec<FileListing>> {
        let needed = if force {
            AccessLevel::Write
        } else {
            AccessLevel::Read
        };
        require(access, needed, item_id)?;

        let filter = filters.map(TagFilter::parse).transpose()?;
        let options = ListOptions { filter, force };
        self.reconciler.list_files(item_id, &options)
    }

    /// The stored aggregate of an item, if it was ever reconciled
    pub fn item_aggregate(
        &self,
        item_id: &ItemId,
        access: AccessLevel,
    ) -> Result<Option<DicomAggregate>> {
        require(access, AccessLevel::Read, item_id)?;
        Ok(self.reconciler.store().load_item(item_id)?.dicom)
    }
}

fn require(held: AccessLevel, needed: AccessLevel, item_id: &ItemId) -> Result<()> {
    if held < needed {
        return Err(DicomItemError::AccessDenied(format!(
            "{} access required on item {}, caller has {}",
            needed, item_id, held
        )));
    }
    Ok(())
}
