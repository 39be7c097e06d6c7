//! JSON to Bolt parameter conversion.

use neo4rs::{BoltList, BoltMap, BoltNull, BoltType};
use serde_json::Value;

/// Convert a JSON value into the equivalent Bolt value.
///
/// Numbers that fit `i64` become integers; everything else numeric becomes
/// a float. JSON objects and arrays map to Bolt maps and lists recursively.
#[must_use]
pub fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(flag) => (*flag).into(),
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                integer.into()
            } else {
                number.as_f64().unwrap_or(f64::NAN).into()
            }
        }
        Value::String(text) => text.clone().into(),
        Value::Array(items) => {
            let mut list = BoltList::default();
            for item in items {
                list.push(json_to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(map) => {
            let mut bolt = BoltMap::default();
            for (key, item) in map {
                bolt.put(key.clone().into(), json_to_bolt(item));
            }
            BoltType::Map(bolt)
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null() {
        assert!(matches!(json_to_bolt(&Value::Null), BoltType::Null(_)));
    }

    #[test]
    fn test_bool() {
        assert!(matches!(json_to_bolt(&json!(true)), BoltType::Boolean(_)));
    }

    #[test]
    fn test_integer() {
        assert!(matches!(json_to_bolt(&json!(42)), BoltType::Integer(_)));
    }

    #[test]
    fn test_float() {
        assert!(matches!(json_to_bolt(&json!(0.5)), BoltType::Float(_)));
    }

    #[test]
    fn test_string() {
        assert!(matches!(json_to_bolt(&json!("x")), BoltType::String(_)));
    }

    #[test]
    fn test_array_recurses() {
        match json_to_bolt(&json!([1, "two", null])) {
            BoltType::List(list) => assert_eq!(list.len(), 3),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_object_recurses() {
        assert!(matches!(
            json_to_bolt(&json!({"a": 1, "b": {"c": true}})),
            BoltType::Map(_)
        ));
    }

    #[test]
    fn test_large_integer_stays_integer() {
        assert!(matches!(
            json_to_bolt(&json!(i64::MAX)),
            BoltType::Integer(_)
        ));
    }
}
