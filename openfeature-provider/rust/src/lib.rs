pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod provider;
pub mod resolution;
pub mod storage;
mod version;

#[cfg(test)]
pub mod test_utils;

pub use backend::{BackendError, EvaluationDetails, FlagClient, FlagSdk, FlagUser, IdGenerator, UuidIdGenerator};
pub use config::{define_mobile_config, ProviderConfig, ProviderFlavor, SdkConfig, WrapperSource};
pub use error::{Error, Result};
pub use events::{ProviderEvent, ProviderEventKind};
pub use provider::{FlagSdkProvider, LifecycleState, ProviderInfo};
pub use resolution::Resolution;
pub use storage::{
    AsyncKeyValueStore, AsyncStorageFactory, InMemoryKeyValueStore, KeyValueStore, StorageCapability,
    StorageError, StorageFactory, StorageOperation, StorageProbe,
};
pub use version::VERSION;

// Re-export commonly used types from open-feature
pub use open_feature::{EvaluationContext, EvaluationError, EvaluationReason};
