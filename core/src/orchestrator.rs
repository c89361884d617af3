//! Item reconciliation
//!
//! [`ItemReconciler`] keeps the `dicom` aggregate of an item in step with its
//! files. A full pass rebuilds the aggregate from every file; an upload folds
//! one new file into the stored aggregate without reading the others. Both
//! write the item with compare-and-set and retry on conflict.

use crate::error::Result;
use crate::events::{UploadDispatcher, UploadEvent, UploadHandler};
use crate::extraction::{FileMetadata, MetadataExtractor};
use crate::ordering::{compare, insert_sorted, sort_records};
use crate::reconcile::{reconcile_all, reconcile_into};
use crate::store::{BlobStore, ObjectStore};
use crate::types::{
    DicomAggregate, FileDisplayRecord, FileDocument, FileId, ItemDocument, ItemId,
    ReconcileConfig, TagFilter, TagMap,
};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;

/// Name under which the reconciler binds to an [`UploadDispatcher`]
pub const HANDLER_NAME: &str = "dicomitem";

/// Summary of a full reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub item_id: ItemId,
    pub item_name: String,
    pub files_scanned: usize,
    pub dicom_files: usize,
    /// Names of files that were not DICOM
    pub skipped: Vec<String>,
    pub aggregate: DicomAggregate,
    /// Item revision after the run
    pub revision: u64,
}

/// Effect of one upload on its item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    /// The file is not DICOM; the item was left untouched
    NotDicom,
    /// First DICOM file of the item; its tags became the common set
    Initialized,
    /// Folded into the existing common set
    Folded { removed_tags: usize },
}

/// Options of [`ItemReconciler::list_files`]
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Restrict each listing to these tags
    pub filter: Option<TagFilter>,
    /// Re-extract files even when a cached tag map exists
    pub force: bool,
}

/// One DICOM file of an item with its tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileListing {
    #[serde(flatten)]
    pub record: FileDisplayRecord,
    pub dicom: TagMap,
}

pub struct ItemReconciler<S, B> {
    store: S,
    blobs: B,
    config: ReconcileConfig,
    extractor: MetadataExtractor,
}

impl<S: ObjectStore, B: BlobStore> ItemReconciler<S, B> {
    pub fn new(store: S, blobs: B, config: ReconcileConfig) -> Self {
        let extractor = MetadataExtractor::new(&config);
        Self {
            store,
            blobs,
            config,
            extractor,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Rebuilds the aggregate of an item from all of its files
    ///
    /// Non-DICOM files are skipped. The item is only written when the
    /// aggregate changed, so repeated runs are no-ops.
    ///
    /// # Errors
    ///
    /// Returns an error if the item is missing, a store operation fails, or
    /// the item write keeps conflicting after all retries.
    pub fn reconcile_item(&self, item_id: &ItemId) -> Result<ReconcileReport> {
        let files = self.store.child_files(item_id)?;
        info!("Reconciling item {} ({} files)", item_id, files.len());

        let mut tag_maps = Vec::new();
        let mut records = Vec::new();
        let mut skipped = Vec::new();

        for file in &files {
            let meta = self.extractor.extract_file(&self.blobs, file)?;
            if self.config.cache_file_metadata {
                self.cache_tags(file, meta.as_ref().map(|m| &m.tags))?;
            }
            match meta {
                Some(FileMetadata { tags, record }) => {
                    tag_maps.push(tags);
                    records.push(record);
                }
                None => {
                    debug!("Skipping non-DICOM file: {}", file.name);
                    skipped.push(file.name.clone());
                }
            }
        }

        let dicom_files = records.len();
        sort_records(&mut records);
        let aggregate = DicomAggregate {
            meta: reconcile_all(tag_maps),
            files: records,
        };

        let saved = self.update_item(item_id, |item| {
            if item.dicom.as_ref() == Some(&aggregate) {
                return false;
            }
            item.dicom = Some(aggregate.clone());
            true
        })?;

        info!(
            "Item {}: {} DICOM files, {} common tags",
            item_id,
            dicom_files,
            aggregate.meta.as_ref().map_or(0, TagMap::len)
        );

        Ok(ReconcileReport {
            item_id: saved.id,
            item_name: saved.name,
            files_scanned: files.len(),
            dicom_files,
            skipped,
            aggregate,
            revision: saved.revision,
        })
    }

    /// Folds one uploaded file into its item
    ///
    /// Only the uploaded file is read. On a write conflict the item is
    /// reloaded and the file folded into the fresh aggregate.
    pub fn handle_upload(&self, file_id: &FileId) -> Result<UploadOutcome> {
        let file = self.store.load_file(file_id)?;
        let Some(meta) = self.extractor.extract_file(&self.blobs, &file)? else {
            debug!("Upload {} is not DICOM", file.name);
            if self.config.cache_file_metadata {
                self.cache_tags(&file, None)?;
            }
            return Ok(UploadOutcome::NotDicom);
        };
        if self.config.cache_file_metadata {
            self.cache_tags(&file, Some(&meta.tags))?;
        }

        let mut outcome = UploadOutcome::Initialized;
        self.update_item(&file.item_id, |item| {
            outcome = fold_upload(item, &meta);
            true
        })?;

        info!("Upload {} into item {}: {:?}", file.name, file.item_id, outcome);
        Ok(outcome)
    }

    /// Lists the DICOM files of an item with their tags, in display order
    ///
    /// Cached tag maps are used unless `force` is set; files without a
    /// cache are extracted and, if caching is enabled, cached.
    pub fn list_files(&self, item_id: &ItemId, options: &ListOptions) -> Result<Vec<FileListing>> {
        let mut listings = Vec::new();

        for file in self.store.child_files(item_id)? {
            let tags = match (&file.dicom, options.force) {
                (Some(cached), false) => Some(cached.clone()),
                _ => {
                    let meta = self.extractor.extract_file(&self.blobs, &file)?;
                    if self.config.cache_file_metadata {
                        self.cache_tags(&file, meta.as_ref().map(|m| &m.tags))?;
                    }
                    meta.map(|m| m.tags)
                }
            };
            let Some(tags) = tags else {
                continue;
            };

            let record = FileDisplayRecord::from_tags(&file, &tags);
            let dicom = match &options.filter {
                Some(filter) => filter.apply(&tags),
                None => tags,
            };
            listings.push(FileListing { record, dicom });
        }

        listings.sort_by(|a, b| compare(&a.record, &b.record));
        Ok(listings)
    }

    /// Binds this reconciler to upload events
    pub fn register(self: &Arc<Self>, dispatcher: &UploadDispatcher)
    where
        S: 'static,
        B: 'static,
    {
        dispatcher.bind(HANDLER_NAME, self.clone());
    }

    /// Read-modify-write of an item with compare-and-set retries
    ///
    /// `apply` returns false to skip the write; the loaded document is
    /// returned unchanged in that case.
    fn update_item<F>(&self, item_id: &ItemId, mut apply: F) -> Result<ItemDocument>
    where
        F: FnMut(&mut ItemDocument) -> bool,
    {
        let mut retries = 0;
        loop {
            let mut item = self.store.load_item(item_id)?;
            if !apply(&mut item) {
                debug!("Item {} unchanged, skipping write", item_id);
                return Ok(item);
            }

            match self.store.save_item(&item) {
                Ok(saved) => return Ok(saved),
                Err(e) if e.is_conflict() && retries < self.config.max_write_retries => {
                    retries += 1;
                    warn!("{}; retrying ({}/{})", e, retries, self.config.max_write_retries);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Stores a file's tags on its document when they changed
    ///
    /// A lost race is not an error: the other writer cached the same file.
    fn cache_tags(&self, file: &FileDocument, tags: Option<&TagMap>) -> Result<()> {
        if file.dicom.as_ref() == tags {
            return Ok(());
        }
        let mut updated = file.clone();
        updated.dicom = tags.cloned();
        match self.store.save_file(&updated) {
            Ok(_) => Ok(()),
            Err(e) if e.is_conflict() => {
                warn!("Not caching tags of {}: {}", file.name, e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Folds one file's metadata into an item's aggregate
pub fn fold_upload(item: &mut ItemDocument, meta: &FileMetadata) -> UploadOutcome {
    let aggregate = item.dicom.get_or_insert_with(DicomAggregate::empty);
    let outcome = match aggregate.meta {
        Some(ref mut common) => UploadOutcome::Folded {
            removed_tags: reconcile_into(common, &meta.tags),
        },
        None => {
            aggregate.meta = Some(meta.tags.clone());
            UploadOutcome::Initialized
        }
    };
    insert_sorted(&mut aggregate.files, meta.record.clone());
    outcome
}

impl<S: ObjectStore, B: BlobStore> UploadHandler for ItemReconciler<S, B> {
    fn on_upload(&self, event: &UploadEvent) -> Result<()> {
        self.handle_upload(&event.file).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DicomItemError;
    use crate::store::{FsStore, MemoryStore};
    use crate::test_support::{dicom_bytes, slice_bytes, MODALITY, STUDY_DESCRIPTION};
    use crate::types::TagValue;
    use dicom_core::VR;
    use std::sync::Mutex;
    use tempfile::TempDir;

    type Reconciler = ItemReconciler<Arc<MemoryStore>, Arc<MemoryStore>>;

    fn setup() -> (Arc<MemoryStore>, Reconciler, ItemId) {
        let store = Arc::new(MemoryStore::new());
        let reconciler = ItemReconciler::new(store.clone(), store.clone(), ReconcileConfig::default());
        let item = store.create_item("series").id;
        (store, reconciler, item)
    }

    fn names(files: &[FileDisplayRecord]) -> Vec<&str> {
        files.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_incremental_narrowing() {
        let (store, reconciler, item) = setup();
        let first = store
            .add_file(
                &item,
                "first.dcm",
                dicom_bytes(&[(MODALITY, VR::CS, "CT"), (STUDY_DESCRIPTION, VR::LO, "Chest")]),
            )
            .unwrap();
        let second = store
            .add_file(&item, "second.dcm", dicom_bytes(&[(MODALITY, VR::CS, "CT")]))
            .unwrap();
        let text = store.add_file(&item, "notes.txt", b"hello".to_vec()).unwrap();

        assert_eq!(reconciler.handle_upload(&first.id).unwrap(), UploadOutcome::Initialized);
        let meta = store.load_item(&item).unwrap().dicom_meta().cloned().unwrap();
        assert_eq!(meta.len(), 4);

        assert_eq!(
            reconciler.handle_upload(&second.id).unwrap(),
            UploadOutcome::Folded { removed_tags: 2 }
        );
        let after = store.load_item(&item).unwrap();
        let expected: TagMap = [
            ("Modality", TagValue::text("CT")),
            ("x00080060", TagValue::text("CT")),
        ]
        .into_iter()
        .collect();
        assert_eq!(after.dicom_meta(), Some(&expected));

        assert_eq!(reconciler.handle_upload(&text.id).unwrap(), UploadOutcome::NotDicom);
        assert_eq!(store.load_item(&item).unwrap(), after);
    }

    #[test]
    fn test_full_matches_incremental() {
        let (store, reconciler, item) = setup();
        let files = [
            store.add_file(&item, "c.dcm", slice_bytes("1", "3", "10")).unwrap(),
            store.add_file(&item, "a.dcm", slice_bytes("1", "1", "0")).unwrap(),
            store.add_file(&item, "b.dcm", slice_bytes("1", "2", "5")).unwrap(),
        ];
        for file in &files {
            reconciler.handle_upload(&file.id).unwrap();
        }
        let incremental = store.load_item(&item).unwrap().dicom.unwrap();

        let report = reconciler.reconcile_item(&item).unwrap();
        assert_eq!(report.aggregate, incremental);
        assert_eq!(names(&report.aggregate.files), vec!["a.dcm", "b.dcm", "c.dcm"]);

        let meta = report.aggregate.meta.unwrap();
        assert_eq!(meta.get("SeriesNumber"), Some(&TagValue::Int(1)));
        assert!(!meta.contains_key("InstanceNumber"));
        assert!(!meta.contains_key("SliceLocation"));
    }

    #[test]
    fn test_full_reconcile_is_idempotent() {
        let (store, reconciler, item) = setup();
        store.add_file(&item, "a.dcm", slice_bytes("1", "1", "0")).unwrap();
        store.add_file(&item, "b.dcm", slice_bytes("2", "1", "0")).unwrap();

        let first = reconciler.reconcile_item(&item).unwrap();
        let second = reconciler.reconcile_item(&item).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.load_item(&item).unwrap().revision, 1);
    }

    #[test]
    fn test_item_without_dicom_files() {
        let (store, reconciler, item) = setup();
        store.add_file(&item, "readme.txt", b"text".to_vec()).unwrap();

        let report = reconciler.reconcile_item(&item).unwrap();
        assert_eq!(report.dicom_files, 0);
        assert_eq!(report.skipped, vec!["readme.txt"]);

        let stored = store.load_item(&item).unwrap();
        assert_eq!(stored.dicom, Some(DicomAggregate::empty()));
        assert_eq!(
            serde_json::to_value(&stored).unwrap()["dicom"],
            serde_json::json!({"meta": null, "files": []})
        );
    }

    #[test]
    fn test_upload_after_empty_aggregate_initializes() {
        let (store, reconciler, item) = setup();
        reconciler.reconcile_item(&item).unwrap();
        let file = store.add_file(&item, "a.dcm", slice_bytes("1", "1", "0")).unwrap();

        assert_eq!(reconciler.handle_upload(&file.id).unwrap(), UploadOutcome::Initialized);
        let aggregate = store.load_item(&item).unwrap().dicom.unwrap();
        assert!(aggregate.meta.is_some());
        assert_eq!(names(&aggregate.files), vec!["a.dcm"]);
    }

    #[test]
    fn test_cache_set_and_cleared() {
        let (store, reconciler, item) = setup();
        let dicom = store.add_file(&item, "a.dcm", slice_bytes("1", "1", "0")).unwrap();
        let text = store.add_file(&item, "b.txt", b"plain".to_vec()).unwrap();

        // stale cache from an earlier extraction
        let mut stale = store.load_file(&text.id).unwrap();
        stale.dicom = Some([("Modality", TagValue::text("CT"))].into_iter().collect());
        store.save_file(&stale).unwrap();

        reconciler.reconcile_item(&item).unwrap();
        assert!(store.load_file(&dicom.id).unwrap().dicom.is_some());
        assert_eq!(store.load_file(&text.id).unwrap().dicom, None);
    }

    #[test]
    fn test_upload_of_replaced_file_drops_old_tags() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FsStore::open(temp_dir.path()).unwrap());
        let reconciler =
            ItemReconciler::new(store.clone(), store.clone(), ReconcileConfig::default());
        let item = store.create_item("series").unwrap().id;

        let file = store.add_file(&item, "a.dcm", &slice_bytes("1", "1", "0")).unwrap();
        assert_eq!(reconciler.handle_upload(&file.id).unwrap(), UploadOutcome::Initialized);
        assert!(store.load_file(&file.id).unwrap().dicom.is_some());

        store.add_file(&item, "a.dcm", b"plain text now").unwrap();
        assert_eq!(reconciler.handle_upload(&file.id).unwrap(), UploadOutcome::NotDicom);

        let stored = store.load_file(&file.id).unwrap();
        assert_eq!(stored.size, 14);
        assert_eq!(stored.dicom, None);
        assert!(reconciler
            .list_files(&item, &ListOptions::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_not_dicom_upload_clears_stale_cache() {
        let (store, reconciler, item) = setup();
        let text = store.add_file(&item, "b.txt", b"plain".to_vec()).unwrap();
        let mut stale = store.load_file(&text.id).unwrap();
        stale.dicom = Some([("Modality", TagValue::text("CT"))].into_iter().collect());
        store.save_file(&stale).unwrap();

        assert_eq!(reconciler.handle_upload(&text.id).unwrap(), UploadOutcome::NotDicom);
        assert_eq!(store.load_file(&text.id).unwrap().dicom, None);
    }

    #[test]
    fn test_no_cache_config() {
        let store = Arc::new(MemoryStore::new());
        let config = ReconcileConfig::default().cache_file_metadata(false);
        let reconciler = ItemReconciler::new(store.clone(), store.clone(), config);
        let item = store.create_item("series").id;
        let file = store.add_file(&item, "a.dcm", slice_bytes("1", "1", "0")).unwrap();

        reconciler.reconcile_item(&item).unwrap();
        let stored = store.load_file(&file.id).unwrap();
        assert_eq!(stored.dicom, None);
        assert_eq!(stored.revision, 0);
    }

    #[test]
    fn test_list_files_filter_and_cache() {
        let (store, reconciler, item) = setup();
        store.add_file(&item, "b.dcm", slice_bytes("1", "2", "5")).unwrap();
        store.add_file(&item, "a.dcm", slice_bytes("1", "1", "0")).unwrap();
        store.add_file(&item, "c.txt", b"x".to_vec()).unwrap();

        let options = ListOptions {
            filter: Some(TagFilter::parse("Modality").unwrap()),
            force: false,
        };
        let listings = reconciler.list_files(&item, &options).unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].record.name, "a.dcm");
        assert_eq!(listings[0].dicom.len(), 2);
        assert_eq!(listings[0].record.instance_number, Some(TagValue::Int(1)));

        let json = serde_json::to_value(&listings[0]).unwrap();
        assert_eq!(json["name"], "a.dcm");
        assert_eq!(json["dicom"]["Modality"], "CT");

        // the listing cached the tags
        let cached = store.child_files(&item).unwrap();
        assert!(cached[0].dicom.is_some());

        let unfiltered = reconciler.list_files(&item, &ListOptions::default()).unwrap();
        assert!(unfiltered[0].dicom.contains_key("PatientName"));
    }

    #[test]
    fn test_list_files_force_reextracts() {
        let (store, reconciler, item) = setup();
        let file = store.add_file(&item, "a.dcm", slice_bytes("1", "1", "0")).unwrap();

        let mut fake = store.load_file(&file.id).unwrap();
        fake.dicom = Some([("Modality", TagValue::text("XX"))].into_iter().collect());
        store.save_file(&fake).unwrap();

        let cached = reconciler.list_files(&item, &ListOptions::default()).unwrap();
        assert_eq!(cached[0].dicom.get("Modality"), Some(&TagValue::text("XX")));

        let forced = ListOptions {
            force: true,
            ..ListOptions::default()
        };
        let fresh = reconciler.list_files(&item, &forced).unwrap();
        assert_eq!(fresh[0].dicom.get("Modality"), Some(&TagValue::text("CT")));
    }

    #[test]
    fn test_missing_documents() {
        let (_store, reconciler, _item) = setup();
        assert!(matches!(
            reconciler.handle_upload(&FileId::from("nope")),
            Err(DicomItemError::FileNotFound(_))
        ));
        assert!(matches!(
            reconciler.reconcile_item(&ItemId::from("nope")),
            Err(DicomItemError::ItemNotFound(_))
        ));
    }

    type Race = Box<dyn FnOnce(&Arc<MemoryStore>) + Send>;

    /// Runs a competing write right before the first item save
    struct RacingStore {
        inner: Arc<MemoryStore>,
        race: Mutex<Option<Race>>,
        always_conflict: bool,
    }

    impl ObjectStore for RacingStore {
        fn load_item(&self, id: &ItemId) -> Result<ItemDocument> {
            self.inner.load_item(id)
        }

        fn save_item(&self, item: &ItemDocument) -> Result<ItemDocument> {
            if self.always_conflict {
                return Err(DicomItemError::Conflict {
                    id: item.id.to_string(),
                    expected: item.revision,
                    found: item.revision + 1,
                });
            }
            let race = self.race.lock().unwrap().take();
            if let Some(race) = race {
                race(&self.inner);
            }
            self.inner.save_item(item)
        }

        fn load_file(&self, id: &FileId) -> Result<FileDocument> {
            self.inner.load_file(id)
        }

        fn save_file(&self, file: &FileDocument) -> Result<FileDocument> {
            self.inner.save_file(file)
        }

        fn child_files(&self, item: &ItemId) -> Result<Vec<FileDocument>> {
            self.inner.child_files(item)
        }
    }

    #[test]
    fn test_conflict_refolds_instead_of_losing_update() {
        let inner = Arc::new(MemoryStore::new());
        let item = inner.create_item("series").id;
        let first = inner
            .add_file(
                &item,
                "first.dcm",
                dicom_bytes(&[(MODALITY, VR::CS, "CT"), (STUDY_DESCRIPTION, VR::LO, "Chest")]),
            )
            .unwrap();
        let second = inner
            .add_file(
                &item,
                "second.dcm",
                dicom_bytes(&[(MODALITY, VR::CS, "CT"), (STUDY_DESCRIPTION, VR::LO, "Head")]),
            )
            .unwrap();

        let competing = second.id.clone();
        let race: Race = Box::new(move |inner: &Arc<MemoryStore>| {
            let other = ItemReconciler::new(inner.clone(), inner.clone(), ReconcileConfig::default());
            other.handle_upload(&competing).unwrap();
        });
        let store = RacingStore {
            inner: inner.clone(),
            race: Mutex::new(Some(race)),
            always_conflict: false,
        };
        let reconciler = ItemReconciler::new(store, inner.clone(), ReconcileConfig::default());

        // loses the race against the second upload, then refolds
        let outcome = reconciler.handle_upload(&first.id).unwrap();
        assert_eq!(outcome, UploadOutcome::Folded { removed_tags: 2 });

        let aggregate = inner.load_item(&item).unwrap().dicom.unwrap();
        assert_eq!(names(&aggregate.files), vec!["first.dcm", "second.dcm"]);
        let meta = aggregate.meta.unwrap();
        assert!(meta.contains_key("Modality"));
        assert!(!meta.contains_key("StudyDescription"));
    }

    #[test]
    fn test_conflict_retries_exhausted() {
        let inner = Arc::new(MemoryStore::new());
        let item = inner.create_item("series").id;
        let file = inner.add_file(&item, "a.dcm", slice_bytes("1", "1", "0")).unwrap();
        let store = RacingStore {
            inner: inner.clone(),
            race: Mutex::new(None),
            always_conflict: true,
        };
        let config = ReconcileConfig::default().max_write_retries(2);
        let reconciler = ItemReconciler::new(store, inner.clone(), config);

        assert!(reconciler.handle_upload(&file.id).unwrap_err().is_conflict());
        assert!(inner.load_item(&item).unwrap().dicom.is_none());
    }

    #[test]
    fn test_dispatch_folds_each_upload_once() {
        let (store, reconciler, item) = setup();
        let reconciler = Arc::new(reconciler);
        let dispatcher = UploadDispatcher::new();
        reconciler.register(&dispatcher);
        reconciler.register(&dispatcher);
        assert_eq!(dispatcher.handler_count(), 1);

        let file = store.add_file(&item, "a.dcm", slice_bytes("1", "1", "0")).unwrap();
        let event = UploadEvent::new("upload-1", file.id.clone());
        dispatcher.dispatch(&event).unwrap();
        dispatcher.dispatch(&event).unwrap();

        assert_eq!(store.load_item(&item).unwrap().revision, 1);
    }
}
