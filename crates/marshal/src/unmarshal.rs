use crate::auto;
use crate::schema::{Kind, Schema, SchemaType};
use crate::Error;
use serde_json::Value;
use store::{AttributeMap, AttributeValue};

/// Unmarshal a store item back into its native form, keyed by property name
/// (not physical attribute name). Attributes the schema does not declare are
/// ignored.
pub fn unmarshal_item(schema: &Schema, item: &AttributeMap) -> crate::Result<Value> {
    let mut out = serde_json::Map::new();
    for (property, ty) in schema.iter() {
        let Some(attr) = item.get(ty.physical_name(property)) else {
            continue;
        };
        if let Some(native) = unmarshal_value(ty, attr)? {
            out.insert(property.clone(), native);
        }
    }
    Ok(Value::Object(out))
}

/// Unmarshal one attribute value according to its SchemaType. Returns None
/// for values which have no native representation: a NULL standing in for an
/// empty string, binary, set, or absent date.
pub fn unmarshal_value(ty: &SchemaType, attr: &AttributeValue) -> crate::Result<Option<Value>> {
    // NULL unmarshals as absent for every kind except those which represent
    // null natively.
    if matches!(attr, AttributeValue::Null(_)) {
        return match ty.kind() {
            Kind::Null | Kind::Any => Ok(Some(Value::Null)),
            Kind::Custom { unmarshal, .. } => unmarshal(attr).map(Some),
            _ => Ok(None),
        };
    }

    let native = match ty.kind() {
        Kind::Binary => match attr {
            AttributeValue::B(b) => auto::binary_value(b),
            _ => return Err(mismatch("binary", attr)),
        },
        Kind::Boolean => match attr {
            AttributeValue::Bool(b) => Value::Bool(*b),
            _ => return Err(mismatch("boolean", attr)),
        },
        Kind::Number { .. } => match attr {
            AttributeValue::N(n) => auto::parse_number(n),
            _ => return Err(mismatch("number", attr)),
        },
        Kind::String => match attr {
            AttributeValue::S(s) => Value::String(s.clone()),
            _ => return Err(mismatch("string", attr)),
        },
        Kind::Date => match attr {
            // Epoch seconds recover to full date values, rendered RFC-3339.
            AttributeValue::N(n) => {
                let seconds: i64 = n.parse().map_err(|_| mismatch("date", attr))?;
                let parsed = time::OffsetDateTime::from_unix_timestamp(seconds)
                    .map_err(|_| mismatch("date", attr))?;
                Value::String(
                    parsed
                        .format(&time::format_description::well_known::Rfc3339)
                        .expect("rfc3339 format of a valid timestamp succeeds"),
                )
            }
            _ => return Err(mismatch("date", attr)),
        },
        Kind::Null => Value::Null,
        Kind::Document { members } => match attr {
            AttributeValue::M(fields) => unmarshal_item(members.as_ref(), fields)?,
            _ => return Err(mismatch("document", attr)),
        },
        Kind::Map { member } => match attr {
            AttributeValue::M(fields) => {
                let mut out = serde_json::Map::new();
                for (key, value) in fields {
                    if let Some(native) = unmarshal_value(member, value)? {
                        out.insert(key.clone(), native);
                    }
                }
                Value::Object(out)
            }
            _ => return Err(mismatch("map", attr)),
        },
        Kind::List { member } => match attr {
            AttributeValue::L(elements) => {
                let mut out = Vec::with_capacity(elements.len());
                for element in elements {
                    if let Some(native) = unmarshal_value(member, element)? {
                        out.push(native);
                    }
                }
                Value::Array(out)
            }
            _ => return Err(mismatch("list", attr)),
        },
        Kind::Tuple { members } => match attr {
            AttributeValue::L(elements) => {
                let mut out = Vec::with_capacity(members.len());
                for (member, element) in members.iter().zip(elements.iter()) {
                    if let Some(native) = unmarshal_value(member, element)? {
                        out.push(native);
                    }
                }
                Value::Array(out)
            }
            _ => return Err(mismatch("tuple", attr)),
        },
        Kind::Set { member } => match (member.kind(), attr) {
            (Kind::String, AttributeValue::SS(members)) => Value::Array(
                members
                    .iter()
                    .map(|member| Value::String(member.clone()))
                    .collect(),
            ),
            (Kind::Number { .. }, AttributeValue::NS(members)) => Value::Array(
                members.iter().map(|member| auto::parse_number(member)).collect(),
            ),
            (Kind::Binary, AttributeValue::BS(members)) => Value::Array(
                members.iter().map(|member| auto::binary_value(member)).collect(),
            ),
            (Kind::String | Kind::Number { .. } | Kind::Binary, _) => {
                return Err(mismatch("set", attr))
            }
            (other, _) => {
                return Err(Error::InvalidSchema(format!(
                    "sets may hold Binary, Number, or String members, not {other:?}"
                )))
            }
        },
        Kind::Collection | Kind::Hash | Kind::Any => auto::auto_unmarshal(attr),
        Kind::Custom { unmarshal, .. } => unmarshal(attr)?,
    };

    Ok(Some(native))
}

fn mismatch(expected: &'static str, attr: &AttributeValue) -> Error {
    Error::InvalidValue {
        expected,
        value: serde_json::to_value(attr).unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{marshal_item, marshal_value, SchemaType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_item_round_trip() {
        let schema = Schema::new()
            .with("id", SchemaType::string().hash_key())
            .with("count", SchemaType::number())
            .with("active", SchemaType::boolean())
            .with("tags", SchemaType::set(SchemaType::string()))
            .with("history", SchemaType::list(SchemaType::number()))
            .with(
                "address",
                SchemaType::document(
                    Schema::new()
                        .with("street", SchemaType::string())
                        .with("zip", SchemaType::number()),
                ),
            )
            .with("extra", SchemaType::any());

        let fixture = json!({
            "id": "thing-1",
            "count": 42,
            "active": false,
            "tags": ["a", "b"],
            "history": [1, 2, 3],
            "address": {"street": "Main St", "zip": 12345},
            "extra": {"anything": ["goes", 1]},
        });

        let round_tripped =
            unmarshal_item(&schema, &marshal_item(&schema, &fixture).unwrap()).unwrap();
        assert_eq!(round_tripped, fixture);
    }

    #[test]
    fn test_physical_names_recover_property_names() {
        let schema = Schema::new().with(
            "renamed",
            SchemaType::string().attribute_name("physical_name"),
        );

        let marshalled = marshal_item(&schema, &json!({"renamed": "value"})).unwrap();
        assert!(marshalled.contains_key("physical_name"));

        let native = unmarshal_item(&schema, &marshalled).unwrap();
        assert_eq!(native, json!({"renamed": "value"}));
    }

    #[test]
    fn test_date_recovers_rfc3339_truncated() {
        let ty = SchemaType::date();
        let attr = marshal_value(&ty, Some(&json!("2023-04-01T12:30:45.987Z")))
            .unwrap()
            .unwrap();
        assert_eq!(
            unmarshal_value(&ty, &attr).unwrap(),
            Some(json!("2023-04-01T12:30:45Z"))
        );

        // A NULL date is absent.
        assert_eq!(
            unmarshal_value(&ty, &AttributeValue::Null(true)).unwrap(),
            None
        );
    }

    #[test]
    fn test_empty_scalars_round_trip_to_absent() {
        let schema = Schema::new()
            .with("id", SchemaType::string().hash_key())
            .with("note", SchemaType::string());

        let marshalled = marshal_item(&schema, &json!({"id": "x", "note": ""})).unwrap();
        let native = unmarshal_item(&schema, &marshalled).unwrap();
        assert_eq!(native, json!({"id": "x"}));
    }

    #[test]
    fn test_mismatched_tags_are_rejected() {
        assert!(matches!(
            unmarshal_value(&SchemaType::number(), &AttributeValue::S("nope".to_string()))
                .unwrap_err(),
            Error::InvalidValue { expected: "number", .. }
        ));
        assert!(matches!(
            unmarshal_value(
                &SchemaType::set(SchemaType::number()),
                &AttributeValue::SS(vec!["a".to_string()])
            )
            .unwrap_err(),
            Error::InvalidValue { expected: "set", .. }
        ));
    }
}
