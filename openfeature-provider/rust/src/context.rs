//! Translation of OpenFeature evaluation contexts into SDK users.
//!
//! The SDK only accepts string attributes, so every context value is turned
//! into a string. The rules here are part of the contract with the SDK and
//! must stay deterministic.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, SecondsFormat, Utc};
use open_feature::{EvaluationContext, EvaluationContextFieldValue, StructValue, Value};
use serde_json::{Map, Number, Value as JsonValue};

use crate::backend::FlagUser;
use crate::error::{Error, Result};

/// Reserved attribute name of the subject identity.
pub const TARGETING_KEY: &str = "targetingKey";

/// Convert an evaluation context into the SDK user it describes.
///
/// The targeting key becomes the user id; every other field becomes a string
/// attribute.
pub fn evaluation_context_to_user(context: &EvaluationContext) -> Result<FlagUser> {
    let id = context
        .targeting_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or(Error::MissingTargetingKey)?;

    let attributes: HashMap<String, String> = context
        .custom_fields
        .iter()
        .filter(|(key, _)| key.as_str() != TARGETING_KEY)
        .map(|(key, value)| (key.clone(), context_value_to_string(Some(value))))
        .collect();

    Ok(FlagUser {
        id: id.to_string(),
        attributes,
    })
}

/// Stringify one context value.
///
/// Missing and null values become `""`, date-times become RFC 3339 UTC with
/// millisecond precision, lists and structures become JSON with sorted keys,
/// and scalars use their plain textual form.
pub fn context_value_to_string(value: Option<&EvaluationContextFieldValue>) -> String {
    let Some(value) = value else {
        return String::new();
    };

    match value {
        EvaluationContextFieldValue::Bool(b) => b.to_string(),
        EvaluationContextFieldValue::Int(i) => i.to_string(),
        EvaluationContextFieldValue::Float(f) => float_to_string(*f),
        EvaluationContextFieldValue::String(s) => s.clone(),
        EvaluationContextFieldValue::DateTime(dt) => {
            match DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond()) {
                Some(utc) => format_timestamp(&utc),
                None => String::new(),
            }
        }
        EvaluationContextFieldValue::Struct(payload) => {
            if let Some(json) = payload.downcast_ref::<JsonValue>() {
                json_to_string(json)
            } else if let Some(structure) = payload.downcast_ref::<StructValue>() {
                json_to_string(&struct_to_json(structure))
            } else if let Some(value) = payload.downcast_ref::<Value>() {
                json_to_string(&value_to_json(value))
            } else if let Some(list) = payload.downcast_ref::<Vec<Value>>() {
                json_to_string(&JsonValue::Array(list.iter().map(value_to_json).collect()))
            } else {
                tracing::debug!("Unsupported struct payload in evaluation context, using empty string");
                String::new()
            }
        }
    }
}

/// Canonical timestamp form: `2023-01-01T00:00:00.000Z`.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Shortest decimal form of a float.
///
/// Magnitudes are always written out in plain decimal (`1e21` becomes
/// `1000000000000000000000`), never in exponent notation, and negative zero
/// is written as `0`.
fn float_to_string(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        let text = if f > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if f == 0.0 {
        "0".to_string()
    } else {
        // Display never prints a trailing ".0".
        f.to_string()
    }
}

/// An integral float that fits an `i64`, as that integer.
fn integral_float(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(&f) {
        Some(f as i64)
    } else {
        None
    }
}

fn json_to_string(json: &JsonValue) -> String {
    match json {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => float_to_string(f),
            _ => n.to_string(),
        },
        JsonValue::Array(_) | JsonValue::Object(_) => canonical_json(json),
    }
}

/// JSON text with object keys sorted at every level. Integral floats are
/// written as integers, so `30.0` nested in a structure reads `30` just as it
/// does at the top level.
fn canonical_json(json: &JsonValue) -> String {
    fn sorted(json: &JsonValue) -> JsonValue {
        match json {
            JsonValue::Number(n) if n.is_f64() => match n.as_f64().and_then(integral_float) {
                Some(i) => JsonValue::Number(Number::from(i)),
                None => json.clone(),
            },
            JsonValue::Array(items) => JsonValue::Array(items.iter().map(sorted).collect()),
            JsonValue::Object(map) => {
                let ordered: BTreeMap<&String, JsonValue> =
                    map.iter().map(|(k, v)| (k, sorted(v))).collect();
                JsonValue::Object(ordered.into_iter().map(|(k, v)| (k.clone(), v)).collect())
            }
            other => other.clone(),
        }
    }
    sorted(json).to_string()
}

/// Convert an OpenFeature value into JSON.
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::Number(Number::from(*i)),
        Value::Float(f) => Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Array(items) => JsonValue::Array(items.iter().map(value_to_json).collect()),
        Value::Struct(structure) => struct_to_json(structure),
    }
}

/// Convert an OpenFeature struct into a JSON object.
pub fn struct_to_json(structure: &StructValue) -> JsonValue {
    let map: Map<String, JsonValue> = structure
        .fields
        .iter()
        .map(|(key, value)| (key.clone(), value_to_json(value)))
        .collect();
    JsonValue::Object(map)
}

/// Convert JSON into an OpenFeature value. JSON null has no counterpart and
/// yields `None`; null entries are dropped from lists and structures.
pub fn json_to_value(json: &JsonValue) -> Option<Value> {
    match json {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(Value::Bool(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Some(Value::Int(i)),
            None => n.as_f64().map(Value::Float),
        },
        JsonValue::String(s) => Some(Value::String(s.clone())),
        JsonValue::Array(items) => Some(Value::Array(items.iter().filter_map(json_to_value).collect())),
        JsonValue::Object(map) => Some(Value::Struct(json_object_to_struct(map))),
    }
}

/// Convert a JSON object into an OpenFeature struct.
pub fn json_object_to_struct(map: &Map<String, JsonValue>) -> StructValue {
    let fields = map
        .iter()
        .filter_map(|(key, value)| json_to_value(value).map(|v| (key.clone(), v)))
        .collect();
    StructValue { fields }
}
