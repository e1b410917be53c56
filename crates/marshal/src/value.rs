use crate::schema::{Kind, Schema, SchemaType};
use crate::{auto, Error};
use serde_json::Value;
use std::collections::BTreeSet;
use store::{AttributeMap, AttributeValue};

/// Marshal a native item into its store representation, directed by `schema`.
/// Properties absent from the schema are ignored and never transmitted.
/// Properties absent from the item are omitted unless their type supplies a
/// default.
pub fn marshal_item(schema: &Schema, item: &Value) -> crate::Result<AttributeMap> {
    let Value::Object(fields) = item else {
        return Err(Error::invalid("item", item));
    };

    let mut out = AttributeMap::new();
    for (property, ty) in schema.iter() {
        if let Some(attr) = marshal_value(ty, fields.get(property))? {
            out.insert(ty.physical_name(property).to_string(), attr);
        }
    }
    Ok(out)
}

/// Marshal only the key properties of an item, for the (optionally named)
/// index. The result is always a subset of `marshal_item` over the same input.
pub fn marshal_key(
    schema: &Schema,
    item: &Value,
    index: Option<&str>,
) -> crate::Result<AttributeMap> {
    let Value::Object(fields) = item else {
        return Err(Error::invalid("item", item));
    };

    let mut out = AttributeMap::new();
    for (property, ty) in schema.key_schemas(index) {
        if let Some(attr) = marshal_value(ty, fields.get(property))? {
            out.insert(ty.physical_name(property).to_string(), attr);
        }
    }
    Ok(out)
}

/// Marshal one native value according to its SchemaType. Returns None when
/// the value is absent and no default applies.
pub fn marshal_value(
    ty: &SchemaType,
    native: Option<&Value>,
) -> crate::Result<Option<AttributeValue>> {
    // A JSON null is an absent property, except for types which represent
    // null itself.
    let native = match native {
        Some(Value::Null) if !matches!(ty.kind(), Kind::Null | Kind::Any | Kind::Custom { .. }) => {
            None
        }
        other => other,
    };

    let materialized;
    let native = match native {
        Some(value) => value,
        None => match ty.default_value() {
            Some(value) => {
                materialized = value;
                &materialized
            }
            None => return Ok(None),
        },
    };

    let attr = match ty.kind() {
        Kind::Binary => match bytes_from(native) {
            Some(b) if b.is_empty() => AttributeValue::Null(true),
            Some(b) => AttributeValue::B(b),
            None => return Err(Error::invalid("binary", native)),
        },
        Kind::Boolean => match bool_coerce(native) {
            Some(b) => AttributeValue::Bool(b),
            None => return Err(Error::invalid("boolean", native)),
        },
        Kind::Number { .. } => match number_string(native) {
            Some(n) => AttributeValue::N(n),
            None => return Err(Error::invalid("number", native)),
        },
        Kind::String => match string_coerce(native) {
            Some(s) if s.is_empty() => AttributeValue::Null(true),
            Some(s) => AttributeValue::S(s),
            None => return Err(Error::invalid("string", native)),
        },
        Kind::Date => AttributeValue::N(date_epoch_seconds(native)?.to_string()),
        Kind::Null => AttributeValue::Null(true),
        Kind::Document { members } => {
            AttributeValue::M(marshal_item(members.as_ref(), native)?)
        }
        Kind::Map { member } => {
            let mut out = AttributeMap::new();
            for (key, value) in map_entries(native)? {
                if let Some(attr) = marshal_value(member, Some(value))? {
                    out.insert(key, attr);
                }
            }
            AttributeValue::M(out)
        }
        Kind::List { member } => {
            let Value::Array(elements) = native else {
                return Err(Error::invalid("list", native));
            };
            let mut out = Vec::with_capacity(elements.len());
            for element in elements {
                if let Some(attr) = marshal_value(member, Some(element))? {
                    out.push(attr);
                }
            }
            AttributeValue::L(out)
        }
        Kind::Tuple { members } => {
            let Value::Array(elements) = native else {
                return Err(Error::invalid("tuple", native));
            };
            // Positional marshalling. A length mismatch in either direction
            // simply produces absent values which are filtered.
            let mut out = Vec::with_capacity(members.len());
            for (member, element) in members.iter().zip(elements.iter()) {
                if let Some(attr) = marshal_value(member, Some(element))? {
                    out.push(attr);
                }
            }
            AttributeValue::L(out)
        }
        Kind::Set { member } => return marshal_set(member, native).map(Some),
        Kind::Collection => {
            let Value::Array(elements) = native else {
                return Err(Error::invalid("collection", native));
            };
            AttributeValue::L(elements.iter().map(auto::auto_marshal).collect())
        }
        Kind::Hash => {
            let Value::Object(fields) = native else {
                return Err(Error::invalid("hash", native));
            };
            AttributeValue::M(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), auto::auto_marshal(value)))
                    .collect(),
            )
        }
        Kind::Any => auto::auto_marshal(native),
        Kind::Custom { marshal, .. } => return marshal(native),
    };

    Ok(Some(attr))
}

fn marshal_set(member: &SchemaType, native: &Value) -> crate::Result<AttributeValue> {
    let Value::Array(elements) = native else {
        return Err(Error::invalid("set", native));
    };

    // Members deduplicate via their scalar wire encoding, and empty scalars
    // are dropped. An empty set has no store representation and maps to NULL.
    match member.kind() {
        Kind::String => {
            let mut set = BTreeSet::new();
            for element in elements {
                match string_coerce(element) {
                    Some(s) if s.is_empty() => (),
                    Some(s) => {
                        set.insert(s);
                    }
                    None => return Err(Error::invalid("string set member", element)),
                }
            }
            if set.is_empty() {
                Ok(AttributeValue::Null(true))
            } else {
                Ok(AttributeValue::SS(set.into_iter().collect()))
            }
        }
        Kind::Number { .. } => {
            let mut set = BTreeSet::new();
            for element in elements {
                match number_string(element) {
                    Some(n) => {
                        set.insert(n);
                    }
                    None => return Err(Error::invalid("number set member", element)),
                }
            }
            if set.is_empty() {
                Ok(AttributeValue::Null(true))
            } else {
                Ok(AttributeValue::NS(set.into_iter().collect()))
            }
        }
        Kind::Binary => {
            let mut set = BTreeSet::new();
            for element in elements {
                match bytes_from(element) {
                    Some(b) if b.is_empty() => (),
                    Some(b) => {
                        set.insert(b);
                    }
                    None => return Err(Error::invalid("binary set member", element)),
                }
            }
            if set.is_empty() {
                Ok(AttributeValue::Null(true))
            } else {
                Ok(AttributeValue::BS(set.into_iter().collect()))
            }
        }
        other => Err(Error::InvalidSchema(format!(
            "sets may hold Binary, Number, or String members, not {other:?}"
        ))),
    }
}

/// Map inputs are either a native object or a sequence of [key, value] pairs.
fn map_entries(native: &Value) -> crate::Result<Vec<(String, &Value)>> {
    match native {
        Value::Object(fields) => Ok(fields.iter().map(|(k, v)| (k.clone(), v)).collect()),
        Value::Array(pairs) => pairs
            .iter()
            .map(|pair| match pair.as_array().map(Vec::as_slice) {
                Some([Value::String(key), value]) => Ok((key.clone(), value)),
                _ => Err(Error::invalid("map entry", pair)),
            })
            .collect(),
        other => Err(Error::invalid("map", other)),
    }
}

pub(crate) fn bytes_from(native: &Value) -> Option<bytes::Bytes> {
    match native {
        Value::String(s) => Some(bytes::Bytes::copy_from_slice(s.as_bytes())),
        Value::Array(elements) => {
            let mut buf = Vec::with_capacity(elements.len());
            for element in elements {
                buf.push(u8::try_from(element.as_u64()?).ok()?);
            }
            Some(bytes::Bytes::from(buf))
        }
        _ => None,
    }
}

pub(crate) fn number_string(native: &Value) -> Option<String> {
    match native {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<f64>().ok().filter(|n| n.is_finite())?;
            Some(s.to_string())
        }
        _ => None,
    }
}

pub(crate) fn string_coerce(native: &Value) -> Option<String> {
    match native {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn bool_coerce(native: &Value) -> Option<bool> {
    match native {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64() != Some(0.0)),
        Value::String(s) => Some(!s.is_empty()),
        Value::Array(_) | Value::Object(_) => Some(true),
        Value::Null => None,
    }
}

pub(crate) fn date_epoch_seconds(native: &Value) -> crate::Result<i64> {
    match native {
        Value::String(s) => {
            let parsed =
                time::OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339)
                    .map_err(|_| Error::invalid("date", native))?;
            Ok(parsed.unix_timestamp())
        }
        // Epoch seconds; sub-second precision is truncated.
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64() {
                Ok(f.trunc() as i64)
            } else {
                Err(Error::invalid("date", native))
            }
        }
        other => Err(Error::invalid("date", other)),
    }
}
