use super::{BlobStore, ObjectStore};
use crate::error::{DicomItemError, Result};
use crate::types::{FileDocument, FileId, ItemDocument, ItemId};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;

const STATE_DIR: &str = ".dicomitem";
const ITEM_DOC: &str = "item.json";
const FILES_DIR: &str = "files";

/// Directory-backed object and blob store
///
/// Every directory under the root is an item and every regular, non-hidden
/// file inside it is one of its files. Documents are kept as JSON next to
/// the data:
///
/// ```text
/// <root>/<item>/.dicomitem/item.json
/// <root>/<item>/.dicomitem/files/<name>.json
/// ```
///
/// File ids have the form `<item>/<name>`. A document that was never saved
/// reads as a fresh one at revision 0. Compare-and-set holds within one
/// store instance; separate processes race last-writer-wins.
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsStore {
    /// Opens a store rooted at an existing directory
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not a directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(DicomItemError::Store(format!(
                "Not a directory: {}",
                root.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Opens the store holding one item directory
    ///
    /// Returns the store rooted at the parent directory and the id of the
    /// item.
    pub fn for_item_dir(path: impl AsRef<Path>) -> Result<(Self, ItemId)> {
        let path = path.as_ref().canonicalize()?;
        if !path.is_dir() {
            return Err(DicomItemError::ItemNotFound(path.display().to_string()));
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DicomItemError::Store(format!("Bad item path: {}", path.display())))?
            .to_string();
        let root = path
            .parent()
            .ok_or_else(|| DicomItemError::Store(format!("Bad item path: {}", path.display())))?;
        Ok((Self::open(root)?, ItemId::new(name)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates an item directory, or returns the existing one
    pub fn create_item(&self, name: &str) -> Result<ItemDocument> {
        check_name(name)?;
        fs::create_dir_all(self.root.join(name))?;
        self.load_item(&ItemId::from(name))
    }

    /// Writes a blob into an item directory and returns its document
    ///
    /// An existing file of the same name is replaced. Its stored document
    /// takes the new size, loses its cached tags and moves to the next
    /// revision, so a writer holding the old document conflicts.
    pub fn add_file(&self, item: &ItemId, name: &str, bytes: &[u8]) -> Result<FileDocument> {
        check_name(name)?;
        let dir = self.item_dir(item)?;
        let size = bytes.len() as u64;

        let _guard = self.lock();
        write_atomic(&dir, &dir.join(name), bytes)?;

        let doc_path = self.file_doc_path(item.as_str(), name);
        match read_json::<FileDocument>(&doc_path)? {
            Some(mut file) => {
                file.size = size;
                file.dicom = None;
                file.revision += 1;
                write_json(&doc_path, &file)?;
                debug!("Replaced {} at revision {}", file.id, file.revision);
                Ok(file)
            }
            None => Ok(FileDocument::new(
                file_id(item, name),
                item.clone(),
                name,
                size,
            )),
        }
    }

    /// Path of the data file behind a document
    pub fn blob_path(&self, file: &FileDocument) -> Result<PathBuf> {
        let (item, name) = split_file_id(&file.id)?;
        Ok(self.root.join(item).join(name))
    }

    fn item_dir(&self, item: &ItemId) -> Result<PathBuf> {
        check_name(item.as_str()).map_err(|_| DicomItemError::ItemNotFound(item.to_string()))?;
        let dir = self.root.join(item.as_str());
        if !dir.is_dir() {
            return Err(DicomItemError::ItemNotFound(item.to_string()));
        }
        Ok(dir)
    }

    fn item_doc_path(&self, item: &ItemId) -> PathBuf {
        self.root.join(item.as_str()).join(STATE_DIR).join(ITEM_DOC)
    }

    fn file_doc_path(&self, item: &str, name: &str) -> PathBuf {
        self.root
            .join(item)
            .join(STATE_DIR)
            .join(FILES_DIR)
            .join(format!("{}.json", name))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ObjectStore for FsStore {
    fn load_item(&self, id: &ItemId) -> Result<ItemDocument> {
        self.item_dir(id)?;
        let item = read_json::<ItemDocument>(&self.item_doc_path(id))?
            .unwrap_or_else(|| ItemDocument::new(id.clone(), id.as_str()));
        Ok(item)
    }

    fn save_item(&self, item: &ItemDocument) -> Result<ItemDocument> {
        let _guard = self.lock();
        let current = self.load_item(&item.id)?;
        check_revision(item.id.as_str(), current.revision, item.revision)?;

        let mut saved = item.clone();
        saved.revision += 1;
        let path = self.item_doc_path(&item.id);
        write_json(&path, &saved)?;
        debug!("Saved item {} at revision {}", saved.id, saved.revision);
        Ok(saved)
    }

    fn load_file(&self, id: &FileId) -> Result<FileDocument> {
        let (item, name) = split_file_id(id)?;
        let path = self.root.join(item).join(name);
        let metadata = fs::metadata(&path)
            .map_err(|_| DicomItemError::FileNotFound(id.to_string()))?;
        if !metadata.is_file() {
            return Err(DicomItemError::FileNotFound(id.to_string()));
        }

        let file = match read_json::<FileDocument>(&self.file_doc_path(item, name))? {
            // size follows the data even when it was replaced by hand
            Some(file) => FileDocument {
                size: metadata.len(),
                ..file
            },
            None => FileDocument::new(id.clone(), ItemId::from(item), name, metadata.len()),
        };
        Ok(file)
    }

    fn save_file(&self, file: &FileDocument) -> Result<FileDocument> {
        let _guard = self.lock();
        let current = self.load_file(&file.id)?;
        check_revision(file.id.as_str(), current.revision, file.revision)?;

        let (item, name) = split_file_id(&file.id)?;
        let mut saved = file.clone();
        saved.revision += 1;
        write_json(&self.file_doc_path(item, name), &saved)?;
        Ok(saved)
    }

    fn child_files(&self, item: &ItemId) -> Result<Vec<FileDocument>> {
        let dir = self.item_dir(item)?;
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();

        names
            .iter()
            .map(|name| self.load_file(&file_id(item, name)))
            .collect()
    }
}

impl BlobStore for FsStore {
    fn open(&self, file: &FileDocument) -> Result<Box<dyn Read + '_>> {
        let path = self.blob_path(file)?;
        let handle = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => DicomItemError::FileNotFound(file.id.to_string()),
            _ => DicomItemError::IoError(e),
        })?;
        Ok(Box::new(BufReader::new(handle)))
    }
}

fn file_id(item: &ItemId, name: &str) -> FileId {
    FileId::new(format!("{}/{}", item, name))
}

fn split_file_id(id: &FileId) -> Result<(&str, &str)> {
    id.as_str()
        .split_once('/')
        .filter(|(item, name)| check_name(item).is_ok() && check_name(name).is_ok())
        .ok_or_else(|| DicomItemError::FileNotFound(id.to_string()))
}

/// Rejects names that would escape the item directory or collide with the
/// state directory
fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(DicomItemError::Store(format!("Invalid name: {:?}", name)));
    }
    Ok(())
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

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| DicomItemError::Store(format!("Bad document path: {}", path.display())))?;
    fs::create_dir_all(dir)?;
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(dir, path, &bytes)
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
