//! Upload event dispatch
//!
//! Handlers are bound under a name; binding the same name again replaces
//! the previous handler. The dispatcher remembers a bounded window of recent
//! upload ids and drops an event whose id is still in it, so a redelivered
//! event does not fold the same file twice.

use crate::error::Result;
use crate::types::FileId;
use log::{debug, error};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// A file finished uploading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEvent {
    /// Unique id of the upload, used for deduplication
    pub upload_id: String,
    pub file: FileId,
}

impl UploadEvent {
    pub fn new(upload_id: impl Into<String>, file: FileId) -> Self {
        Self {
            upload_id: upload_id.into(),
            file,
        }
    }
}

/// Receiver of upload events
pub trait UploadHandler: Send + Sync {
    fn on_upload(&self, event: &UploadEvent) -> Result<()>;
}

/// Outcome of dispatching one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The upload id was seen before; no handler ran
    Duplicate,
}

/// Number of recent upload ids remembered for deduplication
pub const DEFAULT_DEDUP_WINDOW: usize = 4096;

type NamedHandler = (String, Arc<dyn UploadHandler>);

/// Most recent upload ids, oldest evicted first
#[derive(Debug)]
struct RecentUploads {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl RecentUploads {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            ids: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Records an id, returning false if it is already in the window
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.ids.insert(id.to_string());
        true
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

pub struct UploadDispatcher {
    handlers: RwLock<Vec<NamedHandler>>,
    delivered: Mutex<RecentUploads>,
}

impl Default for UploadDispatcher {
    fn default() -> Self {
        Self::with_dedup_window(DEFAULT_DEDUP_WINDOW)
    }
}

impl UploadDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dispatcher remembering the last `window` upload ids
    ///
    /// A window of zero is treated as one.
    pub fn with_dedup_window(window: usize) -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            delivered: Mutex::new(RecentUploads::new(window)),
        }
    }

    /// Binds a handler under a name, replacing any handler of that name
    pub fn bind(&self, name: &str, handler: Arc<dyn UploadHandler>) {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match handlers.iter_mut().find(|(bound, _)| bound == name) {
            Some(slot) => slot.1 = handler,
            None => handlers.push((name.to_string(), handler)),
        }
    }

    /// Removes a handler, returning whether one was bound
    pub fn unbind(&self, name: &str) -> bool {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(bound, _)| bound != name);
        handlers.len() != before
    }

    /// Number of upload ids currently remembered
    pub fn remembered_uploads(&self) -> usize {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers an event to every bound handler
    ///
    /// All handlers run even if one fails; the first failure is returned.
    /// A failed delivery still counts as delivered.
    pub fn dispatch(&self, event: &UploadEvent) -> Result<Delivery> {
        let first_delivery = self
            .delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(&event.upload_id);
        if !first_delivery {
            debug!("Skipping duplicate upload {}", event.upload_id);
            return Ok(Delivery::Duplicate);
        }

        // snapshot so handlers may bind or unbind while running
        let handlers: Vec<NamedHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut first_error = None;
        for (name, handler) in handlers {
            if let Err(e) = handler.on_upload(event) {
                error!("Upload handler {} failed on {}: {}", name, event.file, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(Delivery::Delivered),
        }
    }
}
