//! Seam between the provider and the FlagSdk client SDK.
//!
//! The SDK owns network transport, polling, caching and event delivery. The
//! provider only needs the small surface described here, which keeps the
//! adapter testable with in-process fakes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::config::SdkConfig;

/// The subject flags are evaluated for, as the SDK understands it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlagUser {
    pub id: String,
    pub attributes: HashMap<String, String>,
}

impl FlagUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Evaluation record returned by the SDK's `*_variation_details` calls.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationDetails<T> {
    pub feature_id: String,
    pub feature_version: i32,
    pub user_id: String,
    pub variation_id: String,
    pub variation_name: String,
    pub variation_value: T,
    /// Raw SDK reason, e.g. `DEFAULT`, `TARGET`, `RULE`.
    pub reason: String,
}

/// Failure reported by the SDK's `initialize`.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The SDK gave up waiting for its first fetch. It keeps initializing in
    /// the background, so the client becomes usable later.
    #[error("initialization timed out: {0}")]
    Timeout(String),

    /// Any other initialization failure.
    #[error("{0}")]
    Failed(String),
}

impl BackendError {
    pub fn is_benign_timeout(&self) -> bool {
        matches!(self, BackendError::Timeout(_))
    }
}

/// A live SDK client.
pub trait FlagClient: Send + Sync {
    fn bool_variation_details(&self, flag_key: &str, default_value: bool)
        -> EvaluationDetails<bool>;

    fn string_variation_details(
        &self,
        flag_key: &str,
        default_value: &str,
    ) -> EvaluationDetails<String>;

    fn number_variation_details(&self, flag_key: &str, default_value: f64)
        -> EvaluationDetails<f64>;

    /// The returned value is untyped JSON; callers check its shape.
    fn object_variation_details(
        &self,
        flag_key: &str,
        default_value: &JsonValue,
    ) -> EvaluationDetails<JsonValue>;

    fn current_user(&self) -> Option<FlagUser>;

    fn update_user_attributes(&self, attributes: HashMap<String, String>);
}

/// Process-level entry points of the SDK.
///
/// `client` is the client-provider capability: it returns whatever client is
/// live right now, so a `destroy`/`initialize` cycle performed elsewhere is
/// always observed.
#[async_trait]
pub trait FlagSdk: Send + Sync {
    async fn initialize(
        &self,
        config: &SdkConfig,
        user: FlagUser,
    ) -> std::result::Result<(), BackendError>;

    fn destroy(&self);

    fn client(&self) -> Option<Arc<dyn FlagClient>>;
}

/// Generates ids for SDK-side bookkeeping (e.g. event ids).
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn new_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
