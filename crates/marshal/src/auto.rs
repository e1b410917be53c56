//! Permissive marshalling for untyped (Any / Collection / Hash) properties,
//! inferring the store tag from the runtime shape of the value.

use serde_json::Value;
use store::AttributeValue;

/// Marshal a value by its runtime shape. Untyped marshalling cannot produce
/// an absent result; values with no better representation become NULL.
pub fn auto_marshal(native: &Value) -> AttributeValue {
    match native {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) if s.is_empty() => AttributeValue::Null(true),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(elements) => AttributeValue::L(elements.iter().map(auto_marshal).collect()),
        Value::Object(fields) => AttributeValue::M(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), auto_marshal(value)))
                .collect(),
        ),
    }
}

/// The inverse of `auto_marshal`. Decimal strings recover native numbers
/// where they parse, and fall back to their string rendering where they
/// carry more precision than a native number can.
pub fn auto_unmarshal(attr: &AttributeValue) -> Value {
    match attr {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => parse_number(n),
        AttributeValue::B(b) => binary_value(b),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(elements) => Value::Array(elements.iter().map(auto_unmarshal).collect()),
        AttributeValue::M(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), auto_unmarshal(value)))
                .collect(),
        ),
        AttributeValue::SS(members) => Value::Array(
            members
                .iter()
                .map(|member| Value::String(member.clone()))
                .collect(),
        ),
        AttributeValue::NS(members) => {
            Value::Array(members.iter().map(|member| parse_number(member)).collect())
        }
        AttributeValue::BS(members) => {
            Value::Array(members.iter().map(|member| binary_value(member)).collect())
        }
    }
}

pub(crate) fn parse_number(n: &str) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        Value::Number(i.into())
    } else if let Ok(u) = n.parse::<u64>() {
        Value::Number(u.into())
    } else if let Some(number) = n
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
    {
        Value::Number(number)
    } else {
        Value::String(n.to_string())
    }
}

/// Byte strings which are valid UTF-8 recover as native strings; others
/// recover as byte arrays.
pub(crate) fn binary_value(b: &bytes::Bytes) -> Value {
    match std::str::from_utf8(b) {
        Ok(s) => Value::String(s.to_string()),
        Err(_) => Value::Array(b.iter().map(|byte| Value::Number((*byte).into())).collect()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shapes_round_trip() {
        let fixture = json!({
            "string": "hello",
            "int": 42,
            "float": 4.5,
            "bool": true,
            "null": null,
            "list": [1, "two", false],
            "nested": {"deep": [{"deeper": 1}]},
        });

        assert_eq!(auto_unmarshal(&auto_marshal(&fixture)), fixture);
    }

    #[test]
    fn test_numbers_survive_as_strings_when_unrepresentable() {
        // The store's decimal range exceeds a native float's. A magnitude
        // that no native number can hold survives as its string rendering.
        let attr = AttributeValue::N("1e999".to_string());
        assert_eq!(auto_unmarshal(&attr), json!("1e999".to_string()));

        // Integers beyond i64 but within u64 recover exactly.
        let attr = AttributeValue::N("18446744073709551615".to_string());
        assert_eq!(auto_unmarshal(&attr), json!(18446744073709551615u64));
    }

    #[test]
    fn test_empty_string_widens_to_null() {
        assert_eq!(auto_marshal(&json!("")), AttributeValue::Null(true));
        assert_eq!(auto_unmarshal(&AttributeValue::Null(true)), json!(null));
    }
}
