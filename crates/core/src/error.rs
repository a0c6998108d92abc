//! Error types for Dejavu core functionality.

use thiserror::Error;

/// Main error type for Dejavu.
#[derive(Error, Debug)]
pub enum Error {
    /// Media bytes could not be fetched from the blob store.
    #[error("Blob fetch error: {0}")]
    Blob(String),
    /// Image or video bytes could not be decoded.
    #[error("Media decode error: {0}")]
    Decode(String),
    /// The frozen encoder or detector failed during inference.
    #[error("Inference error: {0}")]
    Inference(String),
    /// An external process (OCR, frame extraction) failed.
    #[error("External process error: {0}")]
    Process(String),
    /// An external process exceeded its time bound and was killed.
    #[error("Operation timeout: {0}")]
    Timeout(String),
    /// Post record store failure.
    #[error("Storage error: {0}")]
    Storage(String),
    /// A stored vector payload could not be decoded.
    #[error("Malformed stored data: {0}")]
    MalformedData(String),
}

/// Result type for Dejavu operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Convenience trait for converting foreign errors to the core Error type.
pub trait IntoCoreError<T> {
    /// Convert to a storage error with context
    fn storage_context(self, context: &str) -> Result<T>;
}

impl<T, E> IntoCoreError<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn storage_context(self, context: &str) -> Result<T> {
        self.map_err(|e| Error::Storage(format!("{}: {}", context, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_payload() {
        assert_eq!(
            Error::Blob("no such file id".to_string()).to_string(),
            "Blob fetch error: no such file id"
        );
        assert_eq!(
            Error::Timeout("tesseract exceeded 10s".to_string()).to_string(),
            "Operation timeout: tesseract exceeded 10s"
        );
    }

    #[test]
    fn test_storage_context_prefixes_source() {
        let failed: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "database locked",
        ));
        let err = failed.storage_context("open post store").unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(
            err.to_string(),
            "Storage error: open post store: database locked"
        );

        let passed: std::result::Result<u8, std::io::Error> = Ok(5);
        assert_eq!(passed.storage_context("open post store").unwrap(), 5);
    }
}
