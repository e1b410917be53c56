//! Synthesis of optimistic-locking conditions from a schema's version
//! attribute.

use expressions::{AttributePath, Condition, Operand};
use marshal::Schema;
use store::AttributeValue;

/// The version attribute of an item: its property name, physical name, and
/// the item's current value (None for an item never written).
pub(crate) struct Version<'s> {
    pub property: &'s str,
    pub physical: &'s str,
    pub current: Option<i64>,
}

pub(crate) fn version_of<'s>(
    schema: &'s Schema,
    value: &serde_json::Value,
) -> Option<Version<'s>> {
    let (property, ty) = schema.version_property()?;
    let current = value
        .get(property)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.trunc() as i64)));

    Some(Version {
        property,
        physical: ty.physical_name(property),
        current,
    })
}

impl<'s> Version<'s> {
    /// The stored version after this write: initialized to zero for a new
    /// item, and incremented otherwise (unless the check is skipped, which
    /// suppresses the increment but not the initialization).
    pub fn next(&self, skip_check: bool) -> i64 {
        match self.current {
            None => 0,
            Some(current) if skip_check => current,
            Some(current) => current + 1,
        }
    }

    /// The synthesized condition: `attribute_not_exists(version)` for a new
    /// item, or `version = <current>` otherwise.
    pub fn condition(&self) -> Condition {
        let path = AttributePath::new(self.property);
        match self.current {
            None => Condition::attribute_not_exists(path),
            Some(current) => Condition::equals(
                Operand::Path(path),
                Operand::Attribute(AttributeValue::N(current.to_string())),
            ),
        }
    }
}

/// Compose an optional caller condition with an optional synthesized version
/// check. Both present renders as `(caller) AND (version)`.
pub(crate) fn merge_conditions(
    caller: Option<Condition>,
    version: Option<Condition>,
) -> Option<Condition> {
    match (caller, version) {
        (Some(caller), Some(version)) => Some(Condition::And(vec![caller, version])),
        (Some(condition), None) | (None, Some(condition)) => Some(condition),
        (None, None) => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use expressions::ExpressionAttributes;
    use marshal::SchemaType;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .with("id", SchemaType::string().hash_key())
            .with("version", SchemaType::number().version())
    }

    #[test]
    fn test_new_item() {
        let schema = schema();
        let version = version_of(&schema, &json!({"id": "k"})).unwrap();

        assert_eq!(version.current, None);
        assert_eq!(version.next(false), 0);
        assert_eq!(version.next(true), 0);

        let mut attrs = ExpressionAttributes::new();
        let rendered = version.condition().normalize(&schema).unwrap().serialize(&mut attrs);
        assert_eq!(rendered, "attribute_not_exists(#attr0)");
        assert_eq!(attrs.names()["#attr0"], "version");
    }

    #[test]
    fn test_existing_item() {
        let schema = schema();
        let version = version_of(&schema, &json!({"id": "k", "version": 10})).unwrap();

        assert_eq!(version.current, Some(10));
        assert_eq!(version.next(false), 11);
        assert_eq!(version.next(true), 10);

        let mut attrs = ExpressionAttributes::new();
        let rendered = version.condition().normalize(&schema).unwrap().serialize(&mut attrs);
        assert_eq!(rendered, "#attr0 = :val1");
        assert_eq!(attrs.values()[":val1"], AttributeValue::N("10".to_string()));
    }

    #[test]
    fn test_merge_renders_conjunction() {
        let schema = schema();
        let merged = merge_conditions(
            Some(Condition::attribute_exists(AttributePath::new("id"))),
            Some(version_of(&schema, &json!({"id": "k"})).unwrap().condition()),
        )
        .unwrap();

        let mut attrs = ExpressionAttributes::new();
        let rendered = merged.normalize(&schema).unwrap().serialize(&mut attrs);
        assert_eq!(
            rendered,
            "(attribute_exists(#attr0)) AND (attribute_not_exists(#attr1))"
        );
    }

    #[test]
    fn test_schema_without_version() {
        let schema = Schema::new().with("id", SchemaType::string().hash_key());
        assert!(version_of(&schema, &json!({"id": "k"})).is_none());
    }
}
