//! C10 — Type conversions and dotted-path extraction between the engine's
//! JSON wire values and `open_feature`'s typed value model.

use crate::error::ResolverError;
use crate::types::ResolveReason;
use open_feature::{EvaluationContext, EvaluationContextFieldValue, EvaluationError, EvaluationErrorCode};
use open_feature::{EvaluationReason, StructValue, Value};

/// Maps an engine-emitted reason code onto `open_feature::EvaluationReason`.
pub fn map_resolve_reason(reason: ResolveReason) -> EvaluationReason {
    match reason {
        ResolveReason::Match => EvaluationReason::TargetingMatch,
        ResolveReason::NoSegmentMatch => EvaluationReason::Default,
        ResolveReason::FlagArchived => EvaluationReason::Disabled,
        ResolveReason::TargetingKeyError | ResolveReason::Error => EvaluationReason::Error,
        ResolveReason::Unknown => EvaluationReason::Other("UNKNOWN".to_string()),
    }
}

/// Converts an evaluation context into the JSON map the engine expects,
/// renaming `targetingKey` to `targeting_key` in the copy. Other
/// fields pass through unchanged.
pub fn context_to_json(context: &EvaluationContext) -> serde_json::Value {
    let mut fields = serde_json::Map::new();

    if let Some(targeting_key) = &context.targeting_key {
        fields.insert(
            "targeting_key".to_string(),
            serde_json::Value::String(targeting_key.clone()),
        );
    }

    for (key, value) in &context.custom_fields {
        let json_value = match value {
            EvaluationContextFieldValue::String(s) => serde_json::Value::String(s.clone()),
            EvaluationContextFieldValue::Bool(b) => serde_json::Value::Bool(*b),
            EvaluationContextFieldValue::Int(i) => serde_json::Value::Number((*i).into()),
            EvaluationContextFieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            EvaluationContextFieldValue::DateTime(dt) => serde_json::Value::String(dt.to_string()),
            EvaluationContextFieldValue::Struct(s) => serde_json::Value::String(format!("{s:?}")),
        };
        fields.insert(key.clone(), json_value);
    }

    serde_json::Value::Object(fields)
}

/// Splits `path` on `.` and walks `value` through nested objects. An empty
/// path returns the whole value. A present `null` is distinguished from a
/// missing key by the second element of the tuple.
pub fn get_value_at_path<'a>(path: &str, value: &'a serde_json::Value) -> (Option<&'a serde_json::Value>, bool) {
    if path.is_empty() {
        return (Some(value), true);
    }
    let mut current = value;
    for segment in path.split('.') {
        match current.as_object().and_then(|obj| obj.get(segment)) {
            Some(next) => current = next,
            None => return (None, false),
        }
    }
    (Some(current), true)
}

/// Converts a JSON wire value into an `open_feature::Value`. Total: every
/// JSON shape has a representation, so this never fails.
pub fn json_to_feature_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::Int(0)
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(arr) => {
            Value::Array(arr.into_iter().map(json_to_feature_value).collect())
        }
        serde_json::Value::Object(obj) => {
            let mut struct_value = StructValue::default();
            for (k, v) in obj {
                struct_value.add_field(k, json_to_feature_value(v));
            }
            Value::Struct(struct_value)
        }
        serde_json::Value::Null => Value::String(String::new()),
    }
}

/// Splits `flag` into `(flag_name, dotted_path)` at the first `.`.
pub fn split_flag_key(flag: &str) -> (&str, &str) {
    match flag.split_once('.') {
        Some((name, path)) => (name, path),
        None => (flag, ""),
    }
}

/// Type-checks a resolved `Value` against the primitive requested by the
/// `resolve_*_value` call, truncating numeric-to-integer where the engine
/// returned a float for an int request.
pub fn coerce_bool(value: &Value) -> Result<bool, ResolverError> {
    match value {
        Value::Bool(b) => Ok(*b),
        _ => Err(ResolverError::TypeMismatch("expected bool".into())),
    }
}

pub fn coerce_int(value: &Value) -> Result<i64, ResolverError> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Float(f) => Ok(*f as i64),
        _ => Err(ResolverError::TypeMismatch("expected int".into())),
    }
}

pub fn coerce_float(value: &Value) -> Result<f64, ResolverError> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Int(i) => Ok(*i as f64),
        _ => Err(ResolverError::TypeMismatch("expected float".into())),
    }
}

pub fn coerce_string(value: &Value) -> Result<String, ResolverError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        _ => Err(ResolverError::TypeMismatch("expected string".into())),
    }
}

pub fn coerce_struct(value: Value) -> Result<StructValue, ResolverError> {
    match value {
        Value::Struct(s) => Ok(s),
        _ => Err(ResolverError::TypeMismatch("expected struct".into())),
    }
}

/// Collapses the internal error taxonomy onto `open_feature`'s
/// `EvaluationError` at the provider boundary.
pub fn to_evaluation_error(error: ResolverError) -> EvaluationError {
    if let ResolverError::EngineCall(inner) = &error {
        let message = format!("resolve failed: {inner}");
        return EvaluationError {
            code: EvaluationErrorCode::General(message.clone()),
            message: Some(message),
        };
    }
    let message = error.to_string();
    let code = match &error {
        ResolverError::ProviderNotReady(_) | ResolverError::NotInitialized => {
            EvaluationErrorCode::ProviderNotReady
        }
        ResolverError::FlagNotFound(_) => EvaluationErrorCode::FlagNotFound,
        ResolverError::TypeMismatch(_) => EvaluationErrorCode::TypeMismatch,
        _ => EvaluationErrorCode::General(message.clone()),
    };
    EvaluationError {
        code,
        message: Some(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_lookup_distinguishes_missing_from_null() {
        let value = serde_json::json!({"a": {"b": null}});
        let (found, existed) = get_value_at_path("a.b", &value);
        assert_eq!(found, Some(&serde_json::Value::Null));
        assert!(existed);

        let (found, existed) = get_value_at_path("a.c", &value);
        assert_eq!(found, None);
        assert!(!existed);
    }

    #[test]
    fn empty_path_returns_whole_value() {
        let value = serde_json::json!({"a": 1});
        let (found, existed) = get_value_at_path("", &value);
        assert_eq!(found, Some(&value));
        assert!(existed);
    }

    #[test]
    fn split_flag_key_handles_dotted_and_bare() {
        assert_eq!(split_flag_key("my-flag.a.b"), ("my-flag", "a.b"));
        assert_eq!(split_flag_key("my-flag"), ("my-flag", ""));
    }

    #[test]
    fn coerce_int_truncates_float() {
        let v = Value::Float(3.9);
        assert_eq!(coerce_int(&v).unwrap(), 3);
    }
}
