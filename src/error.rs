//! Error types for the disk cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the disk cache.
///
/// Only configuration and structural problems are meant to reach callers of
/// `put`/`get`; entry-level failures are recovered inside the engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// No serializer is configured or registered for a key or value type
    #[error("No serializer found for the {0}")]
    NoSerializer(String),

    /// Entry does not fit within the per-entry size ceiling
    #[error("Entry too large: limit is {limit} bytes")]
    EntryTooLarge { limit: u64 },

    /// Key or value could not be (de)serialized
    #[error("Codec error: {0}")]
    Codec(String),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Encoded key is not valid base64
    #[error("Invalid encoded key: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Blob name does not follow `<encoded-key>.<extension>`
    #[error("Invalid blob name: {0}")]
    InvalidBlobName(String),

    /// The cache directory cannot be replaced through its parent
    #[error("Can not manipulate the parent container of '{0}'")]
    ParentNotManageable(String),

    /// Storage I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    // == Capacity Check ==
    /// Returns true if this error reports an entry over the size ceiling.
    pub fn is_too_large(&self) -> bool {
        matches!(self, CacheError::EntryTooLarge { .. })
    }
}

// == Result Type Alias ==
/// Convenience Result type for the disk cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CacheError::NoSerializer("key".to_string());
        assert_eq!(err.to_string(), "No serializer found for the key");

        let err = CacheError::EntryTooLarge { limit: 1024 };
        assert_eq!(err.to_string(), "Entry too large: limit is 1024 bytes");

        let err = CacheError::ParentNotManageable("images".to_string());
        assert!(err.to_string().contains("images"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CacheError = io.into();
        assert!(matches!(err, CacheError::Io(_)));
        assert!(!err.is_too_large());
    }

    #[test]
    fn test_is_too_large() {
        assert!(CacheError::EntryTooLarge { limit: 1 }.is_too_large());
        assert!(!CacheError::Codec("bad".to_string()).is_too_large());
    }
}
