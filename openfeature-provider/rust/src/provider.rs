//! OpenFeature provider implementation for FlagSdk.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use open_feature::provider::{FeatureProvider, ProviderMetadata, ProviderStatus, ResolutionDetails};
use open_feature::{EvaluationContext, EvaluationError, EvaluationErrorCode, EvaluationResult, StructValue};
use serde_json::{Map, Value as JsonValue};
use tokio::sync::broadcast;

use crate::backend::{FlagClient, FlagSdk};
use crate::config::{ProviderConfig, ProviderFlavor, SdkConfig};
use crate::context::evaluation_context_to_user;
use crate::error::{Error, Result};
use crate::events::{EventEmitter, ProviderEvent};
use crate::resolution::{json_type_name, to_resolution, to_struct_resolution, wrong_type_result, Resolution};
use crate::VERSION;

/// Where a provider instance is in its lifecycle.
///
/// `Error` is not terminal: a later successful context change returns the
/// provider to `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotReady,
    Ready,
    Error,
    Closed,
}

/// Name and version a provider reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderInfo {
    pub name: &'static str,
    pub version: &'static str,
}

/// OpenFeature provider backed by the FlagSdk client SDK.
///
/// The provider never caches the SDK client; every call goes through
/// [`FlagSdk::client`] so that a client torn down or replaced elsewhere is
/// observed immediately.
pub struct FlagSdkProvider {
    flavor: ProviderFlavor,
    metadata: ProviderMetadata,
    config: SdkConfig,
    sdk: Arc<dyn FlagSdk>,
    state: ArcSwap<LifecycleState>,
    events: EventEmitter,
}

impl FlagSdkProvider {
    /// Create a base provider.
    pub fn new(config: ProviderConfig, sdk: Arc<dyn FlagSdk>) -> Result<Self> {
        Self::with_flavor(ProviderFlavor::Base, config, sdk)
    }

    /// Create a provider for a specific embedding. The flavor's identity and
    /// version are applied before validation.
    pub fn with_flavor(
        flavor: ProviderFlavor,
        config: ProviderConfig,
        sdk: Arc<dyn FlagSdk>,
    ) -> Result<Self> {
        let config = SdkConfig::resolve(&flavor.apply(&config))?;
        tracing::debug!(
            provider = flavor.provider_name(),
            source_id = config.source_id().id(),
            sdk_version = config.sdk_version(),
            "Created provider"
        );

        Ok(Self {
            flavor,
            metadata: ProviderMetadata::new(flavor.provider_name()),
            config,
            sdk,
            state: ArcSwap::from_pointee(LifecycleState::NotReady),
            events: EventEmitter::new(),
        })
    }

    /// Initialize the SDK for the subject described by `context`.
    ///
    /// A timed out initialization counts as success: the SDK keeps fetching in
    /// the background and serves defaults until then.
    pub async fn initialize(&self, context: Option<&EvaluationContext>) -> Result<()> {
        let context = context.ok_or(Error::MissingContext)?;
        let user = evaluation_context_to_user(context)?;

        match self.sdk.initialize(&self.config, user).await {
            Ok(()) => {
                self.mark_ready();
                Ok(())
            }
            Err(e) if e.is_benign_timeout() => {
                tracing::warn!(error = %e, "Backend initialization timed out, continuing in the background");
                self.mark_ready();
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize backend client");
                let err = Error::ProviderInitializationFatal(e);
                self.mark_error(&err);
                Err(err)
            }
        }
    }

    pub fn resolve_boolean_evaluation(
        &self,
        flag_key: &str,
        default_value: bool,
        _context: Option<&EvaluationContext>,
    ) -> Result<Resolution<bool>> {
        let client = self.required_client()?;
        Ok(to_resolution(client.bool_variation_details(flag_key, default_value)))
    }

    pub fn resolve_string_evaluation(
        &self,
        flag_key: &str,
        default_value: &str,
        _context: Option<&EvaluationContext>,
    ) -> Result<Resolution<String>> {
        let client = self.required_client()?;
        Ok(to_resolution(client.string_variation_details(flag_key, default_value)))
    }

    pub fn resolve_number_evaluation(
        &self,
        flag_key: &str,
        default_value: f64,
        _context: Option<&EvaluationContext>,
    ) -> Result<Resolution<f64>> {
        let client = self.required_client()?;
        Ok(to_resolution(client.number_variation_details(flag_key, default_value)))
    }

    /// Resolve a structured flag. Objects and arrays are accepted; any other
    /// value yields a type-mismatch resolution carrying `default_value`.
    pub fn resolve_object_evaluation(
        &self,
        flag_key: &str,
        default_value: JsonValue,
        _context: Option<&EvaluationContext>,
    ) -> Result<Resolution<JsonValue>> {
        let client = self.required_client()?;
        let details = client.object_variation_details(flag_key, &default_value);

        if details.variation_value.is_object() || details.variation_value.is_array() {
            return Ok(to_resolution(details));
        }

        let message = format!(
            "Expected object but got {}",
            json_type_name(&details.variation_value)
        );
        Ok(wrong_type_result(default_value, message))
    }

    /// Apply a new evaluation context.
    ///
    /// Only attribute changes are supported. Switching to a different
    /// targeting key is rejected; the provider must be reinitialized instead.
    pub async fn on_context_change(
        &self,
        _old_context: Option<&EvaluationContext>,
        new_context: &EvaluationContext,
    ) -> Result<()> {
        let user = evaluation_context_to_user(new_context)?;
        let client = self.required_client()?;

        let Some(current) = client.current_user() else {
            let err = Error::ProviderNotReady;
            self.mark_error(&err);
            return Err(err);
        };

        if current.id != user.id {
            tracing::warn!(
                current_id = %current.id,
                requested_id = %user.id,
                "Rejected targeting key change"
            );
            let err = Error::ContextIdentityChangeRejected;
            self.mark_error(&err);
            return Err(err);
        }

        client.update_user_attributes(user.attributes);
        self.mark_ready();
        Ok(())
    }

    /// Tear down the SDK client. Safe to call more than once.
    pub fn on_close(&self) {
        self.sdk.destroy();
        self.state.store(Arc::new(LifecycleState::Closed));
    }

    pub fn metadata(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.flavor.provider_name(),
            version: VERSION,
        }
    }

    pub fn status(&self) -> LifecycleState {
        **self.state.load()
    }

    pub fn flavor(&self) -> ProviderFlavor {
        self.flavor
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// Subscribe to provider events. Only events emitted after subscribing are delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    /// The live SDK client, or `ProviderNotReady` plus an error event.
    fn required_client(&self) -> Result<Arc<dyn FlagClient>> {
        match self.sdk.client() {
            Some(client) => Ok(client),
            None => {
                let err = Error::ProviderNotReady;
                self.mark_error(&err);
                Err(err)
            }
        }
    }

    fn mark_ready(&self) {
        self.state.store(Arc::new(LifecycleState::Ready));
        self.events.emit(ProviderEvent::ready());
    }

    fn mark_error(&self, err: &Error) {
        self.state.store(Arc::new(LifecycleState::Error));
        self.events.emit(ProviderEvent::error(err.to_string()));
    }
}

#[async_trait]
impl FeatureProvider for FlagSdkProvider {
    async fn initialize(&mut self, context: &EvaluationContext) {
        if let Err(e) = FlagSdkProvider::initialize(self, Some(context)).await {
            tracing::error!("Failed to initialize provider: {}", e);
        }
    }

    fn status(&self) -> ProviderStatus {
        match FlagSdkProvider::status(self) {
            LifecycleState::Ready => ProviderStatus::Ready,
            LifecycleState::Error => ProviderStatus::Error,
            LifecycleState::NotReady | LifecycleState::Closed => ProviderStatus::NotReady,
        }
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn resolve_bool_value(
        &self,
        flag_key: &str,
        evaluation_context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<bool>> {
        let resolution = self.resolve_boolean_evaluation(flag_key, false, Some(evaluation_context))?;
        matched_details(flag_key, resolution)
    }

    async fn resolve_int_value(
        &self,
        flag_key: &str,
        evaluation_context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<i64>> {
        let resolution = self.resolve_number_evaluation(flag_key, 0.0, Some(evaluation_context))?;
        let details = matched_details(flag_key, resolution)?;

        if !details.value.is_finite()
            || details.value.fract() != 0.0
            || !(i64::MIN as f64..i64::MAX as f64).contains(&details.value)
        {
            return Err(EvaluationError::builder()
                .code(EvaluationErrorCode::TypeMismatch)
                .message(format!("Expected integer but got {}", details.value))
                .build());
        }

        Ok(ResolutionDetails {
            value: details.value as i64,
            variant: details.variant,
            reason: details.reason,
            flag_metadata: None,
        })
    }

    async fn resolve_float_value(
        &self,
        flag_key: &str,
        evaluation_context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<f64>> {
        let resolution = self.resolve_number_evaluation(flag_key, 0.0, Some(evaluation_context))?;
        matched_details(flag_key, resolution)
    }

    async fn resolve_string_value(
        &self,
        flag_key: &str,
        evaluation_context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<String>> {
        let resolution = self.resolve_string_evaluation(flag_key, "", Some(evaluation_context))?;
        matched_details(flag_key, resolution)
    }

    async fn resolve_struct_value(
        &self,
        flag_key: &str,
        _evaluation_context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<StructValue>> {
        let client = self.required_client()?;
        let details = client.object_variation_details(flag_key, &JsonValue::Object(Map::new()));

        // Arrays are valid objects for the host contract but have no StructValue form.
        if !details.variation_value.is_object() {
            let message = format!(
                "Expected object but got {}",
                json_type_name(&details.variation_value)
            );
            return wrong_type_result(StructValue::default(), message).into_details();
        }

        matched_details(flag_key, to_struct_resolution(details))
    }
}

/// Details for a resolution that matched a variation.
///
/// The `FeatureProvider` methods ask the SDK with placeholder defaults, so an
/// SDK fallback must surface as an error for the host to apply the caller's
/// own default.
fn matched_details<T>(flag_key: &str, resolution: Resolution<T>) -> EvaluationResult<ResolutionDetails<T>> {
    if resolution.is_fallback() {
        return Err(EvaluationError::builder()
            .code(EvaluationErrorCode::FlagNotFound)
            .message(format!("Flag '{}' not found", flag_key))
            .build());
    }
    resolution.into_details()
}
