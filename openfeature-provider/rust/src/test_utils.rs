//! Test utilities for the FlagSdk OpenFeature provider.
//!
//! Hand-written fakes for the SDK seam and the native storage primitive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::backend::{BackendError, EvaluationDetails, FlagClient, FlagSdk, FlagUser};
use crate::config::{ProviderConfig, SdkConfig, WrapperSource};
use crate::storage::{InMemoryKeyValueStore, KeyValueStore, NativeStorageError, StorageProbe};

/// Test API key, redacted from debug output.
pub const TEST_API_KEY: &str = "test-api-key";

/// A config that passes validation with the base identity.
pub fn test_config() -> ProviderConfig {
    ProviderConfig::new(TEST_API_KEY, "https://api.example.com", "mobile", "1.0.0")
}

struct FakeFlag {
    value: JsonValue,
    variation_name: String,
    reason: String,
}

/// A fake SDK client backed by a fixed table of flags.
///
/// Unknown flags, and flags whose value does not fit the requested type,
/// evaluate to the caller's default with reason `CLIENT`.
#[derive(Default)]
pub struct FakeFlagClient {
    flags: Mutex<HashMap<String, FakeFlag>>,
    user: Mutex<Option<FlagUser>>,
    attribute_updates: Mutex<Vec<HashMap<String, String>>>,
}

impl FakeFlagClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flag(
        self,
        flag_key: &str,
        value: JsonValue,
        variation_name: &str,
        reason: &str,
    ) -> Self {
        self.flags.lock().unwrap().insert(
            flag_key.to_string(),
            FakeFlag {
                value,
                variation_name: variation_name.to_string(),
                reason: reason.to_string(),
            },
        );
        self
    }

    pub fn with_user(self, user: FlagUser) -> Self {
        self.set_user(Some(user));
        self
    }

    pub fn set_user(&self, user: Option<FlagUser>) {
        *self.user.lock().unwrap() = user;
    }

    /// Every attribute map passed to `update_user_attributes`, in call order.
    pub fn attribute_updates(&self) -> Vec<HashMap<String, String>> {
        self.attribute_updates.lock().unwrap().clone()
    }

    fn details<T>(
        &self,
        flag_key: &str,
        default_value: T,
        extract: impl Fn(&JsonValue) -> Option<T>,
    ) -> EvaluationDetails<T> {
        let user_id = self
            .user
            .lock()
            .unwrap()
            .as_ref()
            .map(|u| u.id.clone())
            .unwrap_or_default();
        let flags = self.flags.lock().unwrap();
        match flags
            .get(flag_key)
            .and_then(|flag| extract(&flag.value).map(|value| (flag, value)))
        {
            Some((flag, value)) => EvaluationDetails {
                feature_id: flag_key.to_string(),
                feature_version: 1,
                user_id,
                variation_id: format!("{}-{}", flag_key, flag.variation_name),
                variation_name: flag.variation_name.clone(),
                variation_value: value,
                reason: flag.reason.clone(),
            },
            None => EvaluationDetails {
                feature_id: flag_key.to_string(),
                feature_version: 0,
                user_id,
                variation_id: String::new(),
                variation_name: String::new(),
                variation_value: default_value,
                reason: "CLIENT".to_string(),
            },
        }
    }
}

impl FlagClient for FakeFlagClient {
    fn bool_variation_details(&self, flag_key: &str, default_value: bool) -> EvaluationDetails<bool> {
        self.details(flag_key, default_value, JsonValue::as_bool)
    }

    fn string_variation_details(
        &self,
        flag_key: &str,
        default_value: &str,
    ) -> EvaluationDetails<String> {
        self.details(flag_key, default_value.to_string(), |v| {
            v.as_str().map(str::to_string)
        })
    }

    fn number_variation_details(&self, flag_key: &str, default_value: f64) -> EvaluationDetails<f64> {
        self.details(flag_key, default_value, JsonValue::as_f64)
    }

    fn object_variation_details(
        &self,
        flag_key: &str,
        default_value: &JsonValue,
    ) -> EvaluationDetails<JsonValue> {
        self.details(flag_key, default_value.clone(), |v| Some(v.clone()))
    }

    fn current_user(&self) -> Option<FlagUser> {
        self.user.lock().unwrap().clone()
    }

    fn update_user_attributes(&self, attributes: HashMap<String, String>) {
        if let Some(user) = self.user.lock().unwrap().as_mut() {
            user.attributes = attributes.clone();
        }
        self.attribute_updates.lock().unwrap().push(attributes);
    }
}

/// Arguments of one `FlagSdk::initialize` call.
#[derive(Debug, Clone, PartialEq)]
pub struct InitializeCall {
    pub source_id: WrapperSource,
    pub sdk_version: String,
    pub user: FlagUser,
}

/// A fake SDK whose single client becomes live on a successful (or timed out)
/// initialize and goes away on destroy.
pub struct FakeFlagSdk {
    client: Arc<FakeFlagClient>,
    live: Mutex<bool>,
    init_error: Option<BackendError>,
    init_calls: Mutex<Vec<InitializeCall>>,
    destroy_calls: AtomicUsize,
}

impl FakeFlagSdk {
    pub fn new(client: FakeFlagClient) -> Self {
        Self {
            client: Arc::new(client),
            live: Mutex::new(false),
            init_error: None,
            init_calls: Mutex::new(Vec::new()),
            destroy_calls: AtomicUsize::new(0),
        }
    }

    /// Make `initialize` fail with the given error.
    pub fn failing_with(mut self, error: BackendError) -> Self {
        self.init_error = Some(error);
        self
    }

    /// Start with the client already live, as if initialized elsewhere.
    pub fn with_live_client(self) -> Self {
        *self.live.lock().unwrap() = true;
        self
    }

    pub fn fake_client(&self) -> Arc<FakeFlagClient> {
        Arc::clone(&self.client)
    }

    pub fn init_calls(&self) -> Vec<InitializeCall> {
        self.init_calls.lock().unwrap().clone()
    }

    pub fn destroy_count(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FlagSdk for FakeFlagSdk {
    async fn initialize(
        &self,
        config: &SdkConfig,
        user: FlagUser,
    ) -> std::result::Result<(), BackendError> {
        self.init_calls.lock().unwrap().push(InitializeCall {
            source_id: config.source_id(),
            sdk_version: config.sdk_version().to_string(),
            user: user.clone(),
        });

        match &self.init_error {
            Some(error @ BackendError::Failed(_)) => Err(error.clone()),
            Some(error @ BackendError::Timeout(_)) => {
                self.client.set_user(Some(user));
                *self.live.lock().unwrap() = true;
                Err(error.clone())
            }
            None => {
                self.client.set_user(Some(user));
                *self.live.lock().unwrap() = true;
                Ok(())
            }
        }
    }

    fn destroy(&self) {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        *self.live.lock().unwrap() = false;
    }

    fn client(&self) -> Option<Arc<dyn FlagClient>> {
        if *self.live.lock().unwrap() {
            Some(Arc::clone(&self.client) as Arc<dyn FlagClient>)
        } else {
            None
        }
    }
}

/// A native store where every operation fails with the same message.
pub struct FailingKeyValueStore {
    message: String,
}

impl FailingKeyValueStore {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn fail<T>(&self) -> std::result::Result<T, NativeStorageError> {
        Err(self.message.clone().into())
    }
}

#[async_trait]
impl KeyValueStore for FailingKeyValueStore {
    async fn get_item(&self, _key: &str) -> std::result::Result<Option<String>, NativeStorageError> {
        self.fail()
    }

    async fn set_item(&self, _key: &str, _value: &str) -> std::result::Result<(), NativeStorageError> {
        self.fail()
    }

    async fn remove_item(&self, _key: &str) -> std::result::Result<(), NativeStorageError> {
        self.fail()
    }
}

/// A probe that finds a working in-memory store.
#[derive(Default)]
pub struct WorkingProbe {
    pub storage: Arc<InMemoryKeyValueStore>,
}

#[async_trait]
impl StorageProbe for WorkingProbe {
    async fn probe(&self) -> std::result::Result<Option<Arc<dyn KeyValueStore>>, NativeStorageError> {
        Ok(Some(Arc::clone(&self.storage) as Arc<dyn KeyValueStore>))
    }
}

/// A probe where the native module loads but exposes no store.
pub struct MissingModuleProbe;

#[async_trait]
impl StorageProbe for MissingModuleProbe {
    async fn probe(&self) -> std::result::Result<Option<Arc<dyn KeyValueStore>>, NativeStorageError> {
        Ok(None)
    }
}

/// A probe where loading the native module fails.
pub struct FailingProbe;

#[async_trait]
impl StorageProbe for FailingProbe {
    async fn probe(&self) -> std::result::Result<Option<Arc<dyn KeyValueStore>>, NativeStorageError> {
        Err("native module not linked".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fake_client_falls_back_on_type_mismatch() {
        let client = FakeFlagClient::new().with_flag("flag", json!("text"), "v1", "TARGET");

        let details = client.bool_variation_details("flag", true);
        assert!(details.variation_value);
        assert_eq!(details.reason, "CLIENT");

        let details = client.string_variation_details("flag", "default");
        assert_eq!(details.variation_value, "text");
        assert_eq!(details.variation_name, "v1");
    }

    #[tokio::test]
    async fn test_fake_sdk_client_lifecycle() {
        let sdk = FakeFlagSdk::new(FakeFlagClient::new());
        assert!(sdk.client().is_none());

        let config = SdkConfig::resolve(&test_config()).unwrap();
        sdk.initialize(&config, FlagUser::new("u1")).await.unwrap();
        assert_eq!(sdk.client().unwrap().current_user().unwrap().id, "u1");

        sdk.destroy();
        assert!(sdk.client().is_none());
        assert_eq!(sdk.destroy_count(), 1);
    }
}
