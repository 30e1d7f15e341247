//! Error types for the FlagSdk OpenFeature provider.

use open_feature::{EvaluationError, EvaluationErrorCode};
use thiserror::Error;

use crate::backend::BackendError;
use crate::config::WrapperSource;
use crate::storage::StorageError;

/// Message carried by [`Error::ContextIdentityChangeRejected`] and the matching error event.
pub const IDENTITY_CHANGE_MESSAGE: &str =
    "Changing the targeting_id after initialization is not supported, please reinitialize the provider";

/// Errors that can occur in the FlagSdk OpenFeature provider.
#[derive(Debug, Error)]
pub enum Error {
    /// `initialize` was called without an evaluation context.
    #[error("context is required")]
    MissingContext,

    /// The evaluation context has no usable targeting key.
    #[error("targetingKey is required")]
    MissingTargetingKey,

    /// The configured wrapper source id is not one this provider knows about.
    #[error("unsupported wrapper sdk source id: {0}")]
    UnsupportedWrapperIdentity(i32),

    /// A non-default wrapper source was configured without a wrapper version.
    #[error("wrapper sdk version is required for source {0:?}")]
    MissingWrapperVersion(WrapperSource),

    /// No backend client is currently live.
    #[error("backend client is not initialized")]
    ProviderNotReady,

    /// The backend failed to initialize for a reason other than a timeout.
    #[error("Failed to initialize backend client: {0}")]
    ProviderInitializationFatal(#[source] BackendError),

    /// A context change tried to swap the subject identity.
    #[error("{}", IDENTITY_CHANGE_MESSAGE)]
    ContextIdentityChangeRejected,

    /// Persistent storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type alias for the provider.
pub type Result<T> = std::result::Result<T, Error>;

impl From<&Error> for EvaluationError {
    fn from(err: &Error) -> Self {
        let code = match err {
            Error::MissingContext | Error::ContextIdentityChangeRejected => {
                EvaluationErrorCode::InvalidContext
            }
            Error::MissingTargetingKey => EvaluationErrorCode::TargetingKeyMissing,
            Error::ProviderNotReady => EvaluationErrorCode::ProviderNotReady,
            Error::UnsupportedWrapperIdentity(_)
            | Error::MissingWrapperVersion(_)
            | Error::ProviderInitializationFatal(_)
            | Error::Storage(_) => EvaluationErrorCode::General(err.to_string()),
        };
        EvaluationError::builder()
            .code(code)
            .message(err.to_string())
            .build()
    }
}

impl From<Error> for EvaluationError {
    fn from(err: Error) -> Self {
        EvaluationError::from(&err)
    }
}
