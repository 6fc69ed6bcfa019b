use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{Raw, StorageResult};

/// Storage for original images and their per-image metadata.
///
/// Paths are the raw request paths of the original images.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stores the original image bytes under `path`.
    async fn put(&self, path: &str, bytes: Raw) -> StorageResult<()>;

    /// Stores the process signing key for `path`, when per-image keys are enabled.
    async fn put_crypto(&self, path: &str) -> StorageResult<()>;

    /// Stores detector output for `path`.
    async fn put_detector_data(&self, path: &str, data: &Value) -> StorageResult<()>;

    /// Reads the original image bytes.
    async fn get(&self, path: &str) -> StorageResult<Option<Raw>>;

    /// Reads the signing key stored for `path`.
    async fn get_crypto(&self, path: &str) -> StorageResult<Option<String>>;

    /// Reads detector output stored for `path`.
    async fn get_detector_data(&self, path: &str) -> StorageResult<Option<Value>>;

    /// Checks whether an original image is stored under `path`.
    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Removes the image. Removing a missing image is not an error.
    async fn remove(&self, path: &str) -> StorageResult<()>;
}

/// Storage for processed results of the current request.
#[async_trait]
pub trait ResultStorage: Send + Sync {
    /// Stores the processed bytes, returning the key used.
    ///
    /// `None` means the adapter swallowed a failure and nothing was stored.
    async fn put(&self, bytes: Raw) -> StorageResult<Option<String>>;

    /// Reads the processed bytes for the current request.
    async fn get(&self) -> StorageResult<Option<Raw>>;

    /// When the stored result was last refreshed.
    async fn last_updated(&self) -> StorageResult<DateTime<Utc>>;
}

#[async_trait]
impl Storage for Box<dyn Storage> {
    async fn put(&self, path: &str, bytes: Raw) -> StorageResult<()> {
        (**self).put(path, bytes).await
    }

    async fn put_crypto(&self, path: &str) -> StorageResult<()> {
        (**self).put_crypto(path).await
    }

    async fn put_detector_data(&self, path: &str, data: &Value) -> StorageResult<()> {
        (**self).put_detector_data(path, data).await
    }

    async fn get(&self, path: &str) -> StorageResult<Option<Raw>> {
        (**self).get(path).await
    }

    async fn get_crypto(&self, path: &str) -> StorageResult<Option<String>> {
        (**self).get_crypto(path).await
    }

    async fn get_detector_data(&self, path: &str) -> StorageResult<Option<Value>> {
        (**self).get_detector_data(path).await
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        (**self).exists(path).await
    }

    async fn remove(&self, path: &str) -> StorageResult<()> {
        (**self).remove(path).await
    }
}

#[async_trait]
impl Storage for Arc<dyn Storage> {
    async fn put(&self, path: &str, bytes: Raw) -> StorageResult<()> {
        (**self).put(path, bytes).await
    }

    async fn put_crypto(&self, path: &str) -> StorageResult<()> {
        (**self).put_crypto(path).await
    }

    async fn put_detector_data(&self, path: &str, data: &Value) -> StorageResult<()> {
        (**self).put_detector_data(path, data).await
    }

    async fn get(&self, path: &str) -> StorageResult<Option<Raw>> {
        (**self).get(path).await
    }

    async fn get_crypto(&self, path: &str) -> StorageResult<Option<String>> {
        (**self).get_crypto(path).await
    }

    async fn get_detector_data(&self, path: &str) -> StorageResult<Option<Value>> {
        (**self).get_detector_data(path).await
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        (**self).exists(path).await
    }

    async fn remove(&self, path: &str) -> StorageResult<()> {
        (**self).remove(path).await
    }
}

#[async_trait]
impl ResultStorage for Box<dyn ResultStorage> {
    async fn put(&self, bytes: Raw) -> StorageResult<Option<String>> {
        (**self).put(bytes).await
    }

    async fn get(&self) -> StorageResult<Option<Raw>> {
        (**self).get().await
    }

    async fn last_updated(&self) -> StorageResult<DateTime<Utc>> {
        (**self).last_updated().await
    }
}

#[async_trait]
impl ResultStorage for Arc<dyn ResultStorage> {
    async fn put(&self, bytes: Raw) -> StorageResult<Option<String>> {
        (**self).put(bytes).await
    }

    async fn get(&self) -> StorageResult<Option<Raw>> {
        (**self).get().await
    }

    async fn last_updated(&self) -> StorageResult<DateTime<Utc>> {
        (**self).last_updated().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct SingleSlot {
        slot: Mutex<Option<Raw>>,
    }

    #[async_trait]
    impl ResultStorage for SingleSlot {
        async fn put(&self, bytes: Raw) -> StorageResult<Option<String>> {
            *self.slot.lock().unwrap() = Some(bytes);
            Ok(Some("slot".to_owned()))
        }

        async fn get(&self) -> StorageResult<Option<Raw>> {
            Ok(self.slot.lock().unwrap().clone())
        }

        async fn last_updated(&self) -> StorageResult<DateTime<Utc>> {
            Ok(Utc::now())
        }
    }

    #[tokio::test]
    async fn test_result_storage_trait_object() {
        let storage: Box<dyn ResultStorage> = Box::new(SingleSlot::default());

        assert_eq!(storage.get().await.unwrap(), None);
        let key = storage.put(Raw::from_static(b"bytes")).await.unwrap();
        assert_eq!(key.as_deref(), Some("slot"));
        assert_eq!(
            storage.get().await.unwrap(),
            Some(Raw::from_static(b"bytes"))
        );
    }
}
