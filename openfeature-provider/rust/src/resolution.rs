//! Mapping of SDK evaluation records onto OpenFeature resolutions.

use open_feature::provider::ResolutionDetails;
use open_feature::{EvaluationError, EvaluationErrorCode, EvaluationReason, EvaluationResult, StructValue};
use serde_json::Value as JsonValue;

use crate::backend::EvaluationDetails;
use crate::context::json_object_to_struct;

/// Reason the SDK reports when it served the caller's default because the
/// flag was unknown or its value had another type.
pub const CLIENT_FALLBACK_REASON: &str = "CLIENT";

/// Outcome of resolving one flag.
///
/// Errors that have an in-contract representation (type mismatch) are carried
/// here as data rather than raised.
#[derive(Debug, PartialEq)]
pub struct Resolution<T> {
    pub value: T,
    pub variant: Option<String>,
    pub reason: EvaluationReason,
    pub error_code: Option<EvaluationErrorCode>,
    pub error_message: Option<String>,
}

impl<T> Resolution<T> {
    pub fn is_error(&self) -> bool {
        self.error_code.is_some()
    }

    /// Whether the SDK served the caller's default instead of a variation.
    pub fn is_fallback(&self) -> bool {
        if self.is_error() {
            return false;
        }
        self.variant.is_none()
            || matches!(&self.reason, EvaluationReason::Other(r) if r == CLIENT_FALLBACK_REASON)
    }

    /// Convert into the OpenFeature SDK's result type. Error resolutions become
    /// `Err` so the SDK falls back to the caller's default.
    pub fn into_details(self) -> EvaluationResult<ResolutionDetails<T>> {
        if let Some(code) = self.error_code {
            let mut error = EvaluationError::builder().code(code).build();
            error.message = self.error_message;
            return Err(error);
        }

        Ok(ResolutionDetails {
            value: self.value,
            variant: self.variant,
            reason: Some(self.reason),
            flag_metadata: None,
        })
    }
}

/// Project an SDK record onto a resolution, dropping SDK bookkeeping
/// (feature id and version, variation id, user id).
pub fn to_resolution<T>(details: EvaluationDetails<T>) -> Resolution<T> {
    Resolution {
        value: details.variation_value,
        variant: variant_name(details.variation_name),
        reason: map_reason(&details.reason),
        error_code: None,
        error_message: None,
    }
}

/// Like [`to_resolution`], narrowing an untyped value to a struct.
///
/// The caller has already checked the value is a JSON object; anything else
/// narrows to an empty struct.
pub fn to_struct_resolution(details: EvaluationDetails<JsonValue>) -> Resolution<StructValue> {
    let value = match &details.variation_value {
        JsonValue::Object(map) => json_object_to_struct(map),
        _ => StructValue::default(),
    };
    Resolution {
        value,
        variant: variant_name(details.variation_name),
        reason: map_reason(&details.reason),
        error_code: None,
        error_message: None,
    }
}

fn variant_name(name: String) -> Option<String> {
    Some(name).filter(|name| !name.is_empty())
}

/// Error resolution carrying the caller's default and a type-mismatch code.
pub fn wrong_type_result<T>(default_value: T, message: impl Into<String>) -> Resolution<T> {
    Resolution {
        value: default_value,
        variant: None,
        reason: EvaluationReason::Error,
        error_code: Some(EvaluationErrorCode::TypeMismatch),
        error_message: Some(message.into()),
    }
}

/// Map an SDK reason string onto an OpenFeature reason.
pub fn map_reason(reason: &str) -> EvaluationReason {
    match reason {
        "DEFAULT" => EvaluationReason::Default,
        "TARGET" | "RULE" => EvaluationReason::TargetingMatch,
        "OFF_VARIATION" => EvaluationReason::Disabled,
        r if r.starts_with("ERROR") => EvaluationReason::Error,
        other => EvaluationReason::Other(other.to_string()),
    }
}

/// Name of a JSON value's type, as used in type-mismatch messages.
pub fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
