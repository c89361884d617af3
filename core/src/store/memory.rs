use super::{BlobStore, ObjectStore};
use crate::error::{DicomItemError, Result};
use crate::types::{FileDocument, FileId, ItemDocument, ItemId};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-process object and blob store
///
/// Keeps every document and blob in memory behind one lock. Files list in
/// insertion order. Useful for embedding and for tests.
///
/// # Example
///
/// ```
/// use dicomitem_core::{MemoryStore, ObjectStore};
///
/// let store = MemoryStore::new();
/// let item = store.create_item("scan");
/// let file = store.add_file(&item.id, "notes.txt", b"hello".to_vec()).unwrap();
///
/// assert_eq!(store.child_files(&item.id).unwrap(), vec![file]);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    items: HashMap<ItemId, ItemDocument>,
    files: Vec<FileDocument>,
    blobs: HashMap<FileId, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates an empty item with a generated id
    pub fn create_item(&self, name: &str) -> ItemDocument {
        let mut inner = self.write();
        inner.next_id += 1;
        let item = ItemDocument::new(ItemId::new(format!("item-{:06}", inner.next_id)), name);
        inner.items.insert(item.id.clone(), item.clone());
        item
    }

    /// Stores a blob and its file document under an item
    ///
    /// # Errors
    ///
    /// Returns an error if the item does not exist.
    pub fn add_file(&self, item: &ItemId, name: &str, bytes: Vec<u8>) -> Result<FileDocument> {
        let mut inner = self.write();
        if !inner.items.contains_key(item) {
            return Err(DicomItemError::ItemNotFound(item.to_string()));
        }
        inner.next_id += 1;
        let file = FileDocument::new(
            FileId::new(format!("file-{:06}", inner.next_id)),
            item.clone(),
            name,
            bytes.len() as u64,
        );
        inner.blobs.insert(file.id.clone(), bytes);
        inner.files.push(file.clone());
        Ok(file)
    }
}

fn check_revision(id: &str, stored: u64, given: u64) -> Result<()> {
    if stored != given {
        return Err(DicomItemError::Conflict {
            id: id.to_string(),
            expected: given,
            found: stored,
        });
    }
    Ok(())
}

impl ObjectStore for MemoryStore {
    fn load_item(&self, id: &ItemId) -> Result<ItemDocument> {
        self.read()
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| DicomItemError::ItemNotFound(id.to_string()))
    }

    fn save_item(&self, item: &ItemDocument) -> Result<ItemDocument> {
        let mut inner = self.write();
        let stored = inner
            .items
            .get(&item.id)
            .map(|current| current.revision)
            .unwrap_or(0);
        check_revision(item.id.as_str(), stored, item.revision)?;

        let mut saved = item.clone();
        saved.revision += 1;
        inner.items.insert(saved.id.clone(), saved.clone());
        Ok(saved)
    }

    fn load_file(&self, id: &FileId) -> Result<FileDocument> {
        self.read()
            .files
            .iter()
            .find(|file| &file.id == id)
            .cloned()
            .ok_or_else(|| DicomItemError::FileNotFound(id.to_string()))
    }

    fn save_file(&self, file: &FileDocument) -> Result<FileDocument> {
        let mut inner = self.write();
        let slot = inner
            .files
            .iter_mut()
            .find(|existing| existing.id == file.id)
            .ok_or_else(|| DicomItemError::FileNotFound(file.id.to_string()))?;
        check_revision(file.id.as_str(), slot.revision, file.revision)?;

        let mut saved = file.clone();
        saved.revision += 1;
        *slot = saved.clone();
        Ok(saved)
    }

    fn child_files(&self, item: &ItemId) -> Result<Vec<FileDocument>> {
        let inner = self.read();
        if !inner.items.contains_key(item) {
            return Err(DicomItemError::ItemNotFound(item.to_string()));
        }
        Ok(inner
            .files
            .iter()
            .filter(|file| &file.item_id == item)
            .cloned()
            .collect())
    }
}

impl BlobStore for MemoryStore {
    fn open(&self, file: &FileDocument) -> Result<Box<dyn Read + '_>> {
        // copy out so the lock is not held while the caller reads
        let bytes = self
            .read()
            .blobs
            .get(&file.id)
            .cloned()
            .ok_or_else(|| DicomItemError::FileNotFound(file.id.to_string()))?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_item_bumps_revision() {
        let store = MemoryStore::new();
        let item = store.create_item("item");
        assert_eq!(item.revision, 0);

        let saved = store.save_item(&item).unwrap();
        assert_eq!(saved.revision, 1);
        assert_eq!(store.load_item(&item.id).unwrap().revision, 1);
    }

    #[test]
    fn test_stale_item_write_conflicts() {
        let store = MemoryStore::new();
        let item = store.create_item("item");
        store.save_item(&item).unwrap();

        let err = store.save_item(&item).unwrap_err();
        assert!(matches!(
            err,
            DicomItemError::Conflict {
                expected: 0,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_stale_file_write_conflicts() {
        let store = MemoryStore::new();
        let item = store.create_item("item");
        let file = store.add_file(&item.id, "a.dcm", vec![1, 2]).unwrap();

        store.save_file(&file).unwrap();
        assert!(store.save_file(&file).unwrap_err().is_conflict());
    }

    #[test]
    fn test_child_files_scoped_to_item() {
        let store = MemoryStore::new();
        let first = store.create_item("first");
        let second = store.create_item("second");
        store.add_file(&first.id, "a", vec![]).unwrap();
        store.add_file(&second.id, "b", vec![]).unwrap();
        store.add_file(&first.id, "c", vec![]).unwrap();

        let names: Vec<String> = store
            .child_files(&first.id)
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_missing_documents() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.load_item(&ItemId::from("nope")),
            Err(DicomItemError::ItemNotFound(_))
        ));
        assert!(matches!(
            store.add_file(&ItemId::from("nope"), "a", vec![]),
            Err(DicomItemError::ItemNotFound(_))
        ));
        assert!(matches!(
            store.load_file(&FileId::from("nope")),
            Err(DicomItemError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_open_reads_blob() {
        let store = MemoryStore::new();
        let item = store.create_item("item");
        let file = store.add_file(&item.id, "a", b"bytes".to_vec()).unwrap();

        let mut content = String::new();
        store
            .open(&file)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "bytes");
    }
}
