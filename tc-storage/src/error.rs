use thiserror::Error;

/// Result alias for every storage contract operation.
pub type StorageResult<T> = Result<T, StorageError>;

/// Proxy error describing the two groups of failures a storage may surface.
///
/// Absence of a value is never an error: missing keys come back as `None`
/// (or `false` for existence checks) through the regular return path.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The storage is misconfigured.
    ///
    /// Always fatal. Adapters must never swallow this group, whatever their
    /// error policy says.
    #[error("{0}")]
    Configuration(String),
    /// The storage backend failed (connectivity, timeout, protocol).
    ///
    /// Holds the adapter's original error so callers can downcast it.
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl StorageError {
    /// Returns `true` for backend failures.
    pub fn is_backend(&self) -> bool {
        matches!(self, StorageError::Backend(_))
    }
}
