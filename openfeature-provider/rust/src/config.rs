//! Provider configuration and wrapper identity.
//!
//! Callers fill in a [`ProviderConfig`]. The provider validates it once at
//! construction and turns it into an immutable [`SdkConfig`], which is the only
//! configuration the SDK ever sees.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{IdGenerator, UuidIdGenerator};
use crate::error::{Error, Result};
use crate::storage::{resolve_storage_capability, StorageCapability, StorageFactory, StorageProbe};
use crate::VERSION;

/// Default interval between event flushes (30 seconds).
const DEFAULT_EVENTS_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Default maximum number of queued events.
const DEFAULT_EVENTS_MAX_QUEUE_SIZE: usize = 50;

/// Default interval between flag polls (10 minutes).
const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(600);

/// The embedding layer that issues calls to the SDK, reported for attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapperSource {
    /// The base OpenFeature provider.
    OpenFeature,
    /// The provider used by UI framework bindings.
    OpenFeatureFramework,
    /// The provider used by mobile embeddings with persistent storage.
    OpenFeatureMobile,
}

impl WrapperSource {
    pub const ALL: [WrapperSource; 3] = [
        WrapperSource::OpenFeature,
        WrapperSource::OpenFeatureFramework,
        WrapperSource::OpenFeatureMobile,
    ];

    /// Wire id understood by the SDK.
    pub const fn id(self) -> i32 {
        match self {
            WrapperSource::OpenFeature => 102,
            WrapperSource::OpenFeatureFramework => 104,
            WrapperSource::OpenFeatureMobile => 106,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|source| source.id() == id)
    }
}

impl TryFrom<i32> for WrapperSource {
    type Error = Error;

    fn try_from(id: i32) -> Result<Self> {
        Self::from_id(id).ok_or(Error::UnsupportedWrapperIdentity(id))
    }
}

/// Which embedding a provider instance represents.
///
/// Each flavor fixes the identity, version and metadata name it reports; the
/// base flavor leaves the identity to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderFlavor {
    #[default]
    Base,
    Framework,
    Mobile,
}

impl ProviderFlavor {
    pub fn provider_name(self) -> &'static str {
        match self {
            ProviderFlavor::Base => "FlagSdk Provider",
            ProviderFlavor::Framework => "FlagSdk Framework Provider",
            ProviderFlavor::Mobile => "FlagSdk Mobile Provider",
        }
    }

    /// Identity injected over the caller's configuration, if any.
    pub fn identity(self) -> Option<WrapperSource> {
        match self {
            ProviderFlavor::Base => None,
            ProviderFlavor::Framework => Some(WrapperSource::OpenFeatureFramework),
            ProviderFlavor::Mobile => Some(WrapperSource::OpenFeatureMobile),
        }
    }

    /// Returns a copy of `config` carrying this flavor's fixed fields.
    pub(crate) fn apply(self, config: &ProviderConfig) -> ProviderConfig {
        let mut config = config.clone();
        if let Some(source) = self.identity() {
            config.wrapper_sdk_source_id = Some(source.id());
            config.wrapper_sdk_version = Some(VERSION.to_string());
        }
        if self == ProviderFlavor::Mobile {
            config.user_agent = Some(self.provider_name().to_string());
        }
        config
    }
}

/// Configuration supplied by the caller.
#[derive(Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub api_endpoint: String,
    pub feature_tag: String,
    pub app_version: String,
    pub events_flush_interval: Duration,
    pub events_max_queue_size: usize,
    pub polling_interval: Duration,
    /// Transport the SDK uses for its requests. The SDK builds its own when unset.
    pub http_client: Option<reqwest::Client>,
    pub user_agent: Option<String>,
    pub wrapper_sdk_version: Option<String>,
    /// Raw wrapper source id; validated against [`WrapperSource`].
    pub wrapper_sdk_source_id: Option<i32>,
    /// Persistent storage for the SDK. In-memory storage is used when unset.
    pub storage_factory: Option<Arc<dyn StorageFactory>>,
    pub id_generator: Option<Arc<dyn IdGenerator>>,
}

impl ProviderConfig {
    /// Create a configuration with the required fields.
    pub fn new(
        api_key: impl Into<String>,
        api_endpoint: impl Into<String>,
        feature_tag: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_endpoint: api_endpoint.into(),
            feature_tag: feature_tag.into(),
            app_version: app_version.into(),
            events_flush_interval: DEFAULT_EVENTS_FLUSH_INTERVAL,
            events_max_queue_size: DEFAULT_EVENTS_MAX_QUEUE_SIZE,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            http_client: None,
            user_agent: None,
            wrapper_sdk_version: None,
            wrapper_sdk_source_id: None,
            storage_factory: None,
            id_generator: None,
        }
    }

    /// Set the event flush interval.
    pub fn with_events_flush_interval(mut self, interval: Duration) -> Self {
        self.events_flush_interval = interval;
        self
    }

    /// Set the maximum event queue size.
    pub fn with_events_max_queue_size(mut self, size: usize) -> Self {
        self.events_max_queue_size = size;
        self
    }

    /// Set the flag polling interval.
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Attribute calls to a wrapping layer.
    pub fn with_wrapper(mut self, source_id: i32, version: impl Into<String>) -> Self {
        self.wrapper_sdk_source_id = Some(source_id);
        self.wrapper_sdk_version = Some(version.into());
        self
    }

    pub fn with_storage_factory(mut self, factory: Arc<dyn StorageFactory>) -> Self {
        self.storage_factory = Some(factory);
        self
    }

    pub fn with_id_generator(mut self, generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(generator);
        self
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("api_endpoint", &self.api_endpoint)
            .field("feature_tag", &self.feature_tag)
            .field("app_version", &self.app_version)
            .field("user_agent", &self.user_agent)
            .field("wrapper_sdk_version", &self.wrapper_sdk_version)
            .field("wrapper_sdk_source_id", &self.wrapper_sdk_source_id)
            .field("storage_factory", &self.storage_factory.is_some())
            .field("id_generator", &self.id_generator.is_some())
            .finish_non_exhaustive()
    }
}

/// Validated, immutable configuration handed to the SDK.
#[derive(Clone)]
pub struct SdkConfig {
    inner: ProviderConfig,
    source_id: WrapperSource,
    sdk_version: String,
}

impl SdkConfig {
    /// Validate the wrapper identity and merge it into a new configuration.
    ///
    /// Without a source id the base identity is used and the version is
    /// always this crate's, so callers cannot report a different version for
    /// the base provider.
    pub fn resolve(config: &ProviderConfig) -> Result<Self> {
        let (source_id, sdk_version) = match config.wrapper_sdk_source_id {
            None => (WrapperSource::OpenFeature, VERSION.to_string()),
            Some(raw) => match WrapperSource::try_from(raw)? {
                WrapperSource::OpenFeature => (WrapperSource::OpenFeature, VERSION.to_string()),
                source => {
                    let version = config
                        .wrapper_sdk_version
                        .clone()
                        .filter(|v| !v.is_empty())
                        .ok_or(Error::MissingWrapperVersion(source))?;
                    (source, version)
                }
            },
        };

        Ok(Self {
            inner: config.clone(),
            source_id,
            sdk_version,
        })
    }

    pub fn source_id(&self) -> WrapperSource {
        self.source_id
    }

    pub fn sdk_version(&self) -> &str {
        &self.sdk_version
    }

    pub fn api_key(&self) -> &str {
        &self.inner.api_key
    }

    pub fn api_endpoint(&self) -> &str {
        &self.inner.api_endpoint
    }

    pub fn feature_tag(&self) -> &str {
        &self.inner.feature_tag
    }

    pub fn app_version(&self) -> &str {
        &self.inner.app_version
    }

    pub fn events_flush_interval(&self) -> Duration {
        self.inner.events_flush_interval
    }

    pub fn events_max_queue_size(&self) -> usize {
        self.inner.events_max_queue_size
    }

    pub fn polling_interval(&self) -> Duration {
        self.inner.polling_interval
    }

    pub fn http_client(&self) -> Option<&reqwest::Client> {
        self.inner.http_client.as_ref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.inner.user_agent.as_deref()
    }

    pub fn storage_factory(&self) -> Option<&Arc<dyn StorageFactory>> {
        self.inner.storage_factory.as_ref()
    }

    pub fn id_generator(&self) -> Option<&Arc<dyn IdGenerator>> {
        self.inner.id_generator.as_ref()
    }
}

impl fmt::Debug for SdkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkConfig")
            .field("source_id", &self.source_id)
            .field("sdk_version", &self.sdk_version)
            .field("config", &self.inner)
            .finish()
    }
}

/// Prepare a configuration for the mobile embedding.
///
/// Always installs an id generator. Persistent storage is wired in only when
/// the native key-value module is present; otherwise the SDK keeps its
/// in-memory storage.
pub async fn define_mobile_config(config: ProviderConfig, probe: &dyn StorageProbe) -> ProviderConfig {
    let mut config = config.with_id_generator(Arc::new(UuidIdGenerator));
    match resolve_storage_capability(probe).await {
        StorageCapability::Available(factory) => {
            config.storage_factory = Some(factory);
        }
        StorageCapability::Unavailable => {
            tracing::warn!(
                "Native key-value storage is not available. The SDK will use in-memory storage without persistence."
            );
        }
    }
    config
}
