//! Persistent key-value storage for the SDK.
//!
//! A store holds exactly one logical value under one key, JSON-encoded. A
//! null value is stored as the absence of the key, never as the literal
//! `"null"`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Error produced by a native storage primitive. Its message is all the
/// provider keeps.
pub type NativeStorageError = Box<dyn std::error::Error + Send + Sync>;

/// Minimal async key-value primitive offered by the host platform.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, NativeStorageError>;

    async fn set_item(&self, key: &str, value: &str) -> Result<(), NativeStorageError>;

    async fn remove_item(&self, key: &str) -> Result<(), NativeStorageError>;
}

/// Storage operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOperation {
    Get,
    Set,
    Clear,
}

impl fmt::Display for StorageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageOperation::Get => "get",
            StorageOperation::Set => "set",
            StorageOperation::Clear => "clear",
        };
        f.write_str(name)
    }
}

/// Failure of a persistent store operation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StorageError {
    pub key: String,
    pub operation: StorageOperation,
    pub message: String,
}

impl StorageError {
    pub fn new(message: impl Into<String>, key: impl Into<String>, operation: StorageOperation) -> Self {
        Self {
            key: key.into(),
            operation,
            message: message.into(),
        }
    }

    fn wrap(key: &str, operation: StorageOperation, cause: impl fmt::Display) -> Self {
        Self::new(
            format!("Failed to {} value for key \"{}\": {}", operation, key, cause),
            key,
            operation,
        )
    }
}

/// JSON-encoded single-value store over a [`KeyValueStore`].
#[derive(Clone)]
pub struct AsyncKeyValueStore {
    key: String,
    storage: Arc<dyn KeyValueStore>,
}

impl AsyncKeyValueStore {
    pub fn new(key: impl Into<String>, storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            key: key.into(),
            storage,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Store `value`, or remove the key when it is `None` or encodes to JSON null.
    pub async fn set<T: Serialize + ?Sized>(&self, value: Option<&T>) -> Result<(), StorageError> {
        let encoded = match value {
            Some(value) => serde_json::to_string(value)
                .map_err(|e| StorageError::wrap(&self.key, StorageOperation::Set, e))?,
            None => String::from("null"),
        };

        let result = if encoded == "null" {
            self.storage.remove_item(&self.key).await
        } else {
            self.storage.set_item(&self.key, &encoded).await
        };
        result.map_err(|e| StorageError::wrap(&self.key, StorageOperation::Set, e))
    }

    /// Load the stored value; an absent key yields `None`.
    pub async fn get<T: DeserializeOwned>(&self) -> Result<Option<T>, StorageError> {
        let raw = self
            .storage
            .get_item(&self.key)
            .await
            .map_err(|e| StorageError::wrap(&self.key, StorageOperation::Get, e))?;

        match raw {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StorageError::wrap(&self.key, StorageOperation::Get, e)),
        }
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        self.storage
            .remove_item(&self.key)
            .await
            .map_err(|e| StorageError::wrap(&self.key, StorageOperation::Clear, e))
    }
}

impl fmt::Debug for AsyncKeyValueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncKeyValueStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Creates one store per key for the SDK.
pub trait StorageFactory: Send + Sync {
    fn create(&self, key: &str) -> AsyncKeyValueStore;
}

/// Factory over a native key-value primitive.
pub struct AsyncStorageFactory {
    storage: Arc<dyn KeyValueStore>,
}

impl AsyncStorageFactory {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }
}

impl StorageFactory for AsyncStorageFactory {
    fn create(&self, key: &str) -> AsyncKeyValueStore {
        AsyncKeyValueStore::new(key, Arc::clone(&self.storage))
    }
}

/// Non-persistent key-value primitive.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    items: Mutex<HashMap<String, String>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored string, bypassing JSON decoding.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, NativeStorageError> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), NativeStorageError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), NativeStorageError> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Locates the platform's native key-value module.
///
/// `Ok(None)` means the module loaded but does not expose a usable store.
#[async_trait]
pub trait StorageProbe: Send + Sync {
    async fn probe(&self) -> Result<Option<Arc<dyn KeyValueStore>>, NativeStorageError>;
}

/// Outcome of probing for native storage.
pub enum StorageCapability {
    Available(Arc<dyn StorageFactory>),
    Unavailable,
}

impl StorageCapability {
    pub fn is_available(&self) -> bool {
        matches!(self, StorageCapability::Available(_))
    }
}

impl fmt::Debug for StorageCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageCapability::Available(_) => f.write_str("Available"),
            StorageCapability::Unavailable => f.write_str("Unavailable"),
        }
    }
}

/// Probe for native storage. Never fails: problems are logged and reported
/// as [`StorageCapability::Unavailable`].
pub async fn resolve_storage_capability(probe: &dyn StorageProbe) -> StorageCapability {
    match probe.probe().await {
        Ok(Some(storage)) => StorageCapability::Available(Arc::new(AsyncStorageFactory::new(storage))),
        Ok(None) => {
            tracing::debug!("Native key-value module has no usable store");
            StorageCapability::Unavailable
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Native key-value storage is not available. \
                 This likely means the native storage module is not installed or not properly linked. \
                 Add it as a dependency of the host application and rebuild the native project."
            );
            StorageCapability::Unavailable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FailingKeyValueStore, FailingProbe, MissingModuleProbe, WorkingProbe};
    use proptest::prelude::*;
    use serde::Deserialize;
    use serde_json::json;

    fn store_with(storage: Arc<InMemoryKeyValueStore>) -> AsyncKeyValueStore {
        AsyncKeyValueStore::new("test-key", storage)
    }

    #[test]
    fn test_storage_error_properties() {
        let err = StorageError::new("Test message", "test-key", StorageOperation::Set);
        assert_eq!(err.to_string(), "Test message");
        assert_eq!(err.key, "test-key");
        assert_eq!(err.operation, StorageOperation::Set);
    }

    #[tokio::test]
    async fn test_set_encodes_values_as_json() {
        let storage = Arc::new(InMemoryKeyValueStore::new());
        let store = store_with(Arc::clone(&storage));

        store.set(Some("test-value")).await.unwrap();
        assert_eq!(storage.raw("test-key").as_deref(), Some("\"test-value\""));

        store.set(Some(&42)).await.unwrap();
        assert_eq!(storage.raw("test-key").as_deref(), Some("42"));

        store.set(Some(&vec![1, 2, 3])).await.unwrap();
        assert_eq!(storage.raw("test-key").as_deref(), Some("[1,2,3]"));

        store.set(Some(&json!({"id": 1, "name": "test"}))).await.unwrap();
        assert_eq!(
            storage.raw("test-key").as_deref(),
            Some(r#"{"id":1,"name":"test"}"#)
        );
    }

    #[tokio::test]
    async fn test_set_none_removes_key() {
        let storage = Arc::new(InMemoryKeyValueStore::new());
        let store = store_with(Arc::clone(&storage));

        store.set(Some("value")).await.unwrap();
        store.set::<String>(None).await.unwrap();

        assert_eq!(storage.raw("test-key"), None);
        assert_eq!(store.get::<String>().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_json_null_removes_key() {
        let storage = Arc::new(InMemoryKeyValueStore::new());
        let store = store_with(Arc::clone(&storage));

        store.set(Some(&json!({"a": 1}))).await.unwrap();
        store.set(Some(&serde_json::Value::Null)).await.unwrap();

        assert_eq!(storage.raw("test-key"), None);
        assert_eq!(store.get::<serde_json::Value>().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_returns_none_for_missing_key() {
        let store = store_with(Arc::new(InMemoryKeyValueStore::new()));
        assert_eq!(store.get::<i64>().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_decodes_typed_values() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct User {
            id: u32,
            name: String,
            preferences: Vec<String>,
        }

        let storage = Arc::new(InMemoryKeyValueStore::new());
        let store = store_with(storage);
        let user = User {
            id: 1,
            name: "John".to_string(),
            preferences: vec!["dark-mode".to_string(), "notifications".to_string()],
        };

        store.set(Some(&user)).await.unwrap();
        assert_eq!(store.get::<User>().await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn test_get_wraps_parse_errors() {
        let storage = Arc::new(InMemoryKeyValueStore::new());
        storage.set_item("test-key", "{invalid json").await.unwrap();
        let store = store_with(storage);

        let err = store.get::<serde_json::Value>().await.unwrap_err();
        assert_eq!(err.key, "test-key");
        assert_eq!(err.operation, StorageOperation::Get);
        assert!(err.message.starts_with("Failed to get value for key \"test-key\": "));
        assert!(err.message.len() > "Failed to get value for key \"test-key\": ".len());
    }

    #[tokio::test]
    async fn test_native_failures_are_classified() {
        let store = AsyncKeyValueStore::new("test-key", Arc::new(FailingKeyValueStore::new("Storage full")));

        let err = store.set(Some("test-value")).await.unwrap_err();
        assert_eq!(err.operation, StorageOperation::Set);
        assert_eq!(err.key, "test-key");
        assert!(err.message.contains("Storage full"));

        let err = store.set::<String>(None).await.unwrap_err();
        assert_eq!(err.operation, StorageOperation::Set);
        assert!(err.message.contains("Storage full"));

        let err = store.get::<String>().await.unwrap_err();
        assert_eq!(err.operation, StorageOperation::Get);
        assert!(err.message.contains("Storage full"));

        let err = store.clear().await.unwrap_err();
        assert_eq!(err.operation, StorageOperation::Clear);
        assert!(err.message.contains("Storage full"));
    }

    #[tokio::test]
    async fn test_clear_removes_key() {
        let storage = Arc::new(InMemoryKeyValueStore::new());
        let store = store_with(Arc::clone(&storage));

        store.set(Some(&true)).await.unwrap();
        store.clear().await.unwrap();

        assert_eq!(storage.raw("test-key"), None);
    }

    #[tokio::test]
    async fn test_factory_creates_independent_stores() {
        let storage = Arc::new(InMemoryKeyValueStore::new());
        let factory = AsyncStorageFactory::new(storage);

        let first = factory.create("key1");
        let second = factory.create("key2");
        first.set(Some("one")).await.unwrap();
        second.set(Some("two")).await.unwrap();

        assert_eq!(first.key(), "key1");
        assert_eq!(first.get::<String>().await.unwrap().as_deref(), Some("one"));
        assert_eq!(second.get::<String>().await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_resolve_storage_capability() {
        assert!(resolve_storage_capability(&WorkingProbe::default())
            .await
            .is_available());
        assert!(!resolve_storage_capability(&MissingModuleProbe)
            .await
            .is_available());
        assert!(!resolve_storage_capability(&FailingProbe).await.is_available());
    }

    fn json_value() -> impl Strategy<Value = serde_json::Value> {
        let leaf = prop_oneof![
            any::<bool>().prop_map(serde_json::Value::from),
            any::<i64>().prop_map(serde_json::Value::from),
            "[a-zA-Z0-9 ]{0,12}".prop_map(serde_json::Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::from),
                prop::collection::hash_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn set_then_get_round_trips(value in json_value()) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let store = store_with(Arc::new(InMemoryKeyValueStore::new()));
            let loaded = runtime.block_on(async {
                store.set(Some(&value)).await.unwrap();
                store.get::<serde_json::Value>().await.unwrap()
            });
            prop_assert_eq!(loaded, Some(value));
        }
    }
}
