use serde::{Deserialize, Serialize};

/// Default cap on bytes read from one file while parsing its header
pub const DEFAULT_MAX_HEADER_BYTES: u64 = 64 * 1024 * 1024;

/// Default number of compare-and-set retries per item write
pub const DEFAULT_MAX_WRITE_RETRIES: u32 = 5;

/// Configuration for extraction and item reconciliation
///
/// # Example
///
/// ```
/// use dicomitem_core::ReconcileConfig;
///
/// let config = ReconcileConfig::default()
///     .max_header_bytes(1024 * 1024)
///     .cache_file_metadata(false);
///
/// assert_eq!(config.max_header_bytes, 1024 * 1024);
/// assert!(!config.cache_file_metadata);
/// assert_eq!(config.max_write_retries, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Upper bound on bytes consumed from a file stream before giving up
    ///
    /// Reading already stops at pixel data; this bounds pathological
    /// headers. A file whose header does not fit is treated as not DICOM.
    pub max_header_bytes: u64,

    /// Store each file's extracted tags on its file document
    pub cache_file_metadata: bool,

    /// Compare-and-set retries before a write conflict is reported
    pub max_write_retries: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            cache_file_metadata: true,
            max_write_retries: DEFAULT_MAX_WRITE_RETRIES,
        }
    }
}

impl ReconcileConfig {
    /// Builder: Set the header byte budget
    pub fn max_header_bytes(mut self, bytes: u64) -> Self {
        self.max_header_bytes = bytes;
        self
    }

    /// Builder: Enable or disable per-file tag caching
    pub fn cache_file_metadata(mut self, cache: bool) -> Self {
        self.cache_file_metadata = cache;
        self
    }

    /// Builder: Set compare-and-set retries
    pub fn max_write_retries(mut self, retries: u32) -> Self {
        self.max_write_retries = retries;
        self
    }
}
