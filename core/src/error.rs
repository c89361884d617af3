use thiserror::Error;

/// Result type for dicomitem operations
pub type Result<T> = std::result::Result<T, DicomItemError>;

/// Error types for dicomitem operations
///
/// A file that is not DICOM is never an error; extraction reports it as
/// `None`. These variants cover store, access and I/O failures.
#[derive(Error, Debug)]
pub enum DicomItemError {
    /// DICOM reading error
    #[error("DICOM error: {0}")]
    DicomError(String),

    /// Item document does not exist
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// File document does not exist
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Caller lacks the access level required by the operation
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Compare-and-set write lost against a concurrent writer
    #[error("Revision conflict on {id}: expected {expected}, found {found}")]
    Conflict { id: String, expected: u64, found: u64 },

    /// Generic object or blob store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Malformed tag allow-list
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Document (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DicomItemError {
    /// Whether this error is a lost compare-and-set race
    pub fn is_conflict(&self) -> bool {
        matches!(self, DicomItemError::Conflict { .. })
    }
}

// Helper conversions
impl From<String> for DicomItemError {
    fn from(s: String) -> Self {
        DicomItemError::Store(s)
    }
}

impl From<&str> for DicomItemError {
    fn from(s: &str) -> Self {
        DicomItemError::Store(s.to_string())
    }
}

// Convert dicom-object errors
impl From<dicom_object::ReadError> for DicomItemError {
    fn from(e: dicom_object::ReadError) -> Self {
        DicomItemError::DicomError(format!("{}", e))
    }
}
