use crate::{AttributePath, ExpressionAttributes};
use marshal::Schema;

/// Serialize a projection: the comma-joined rendering of its normalized
/// attribute paths. Serializing the same projection twice against the same
/// ExpressionAttributes is idempotent, since name tokens deduplicate.
pub fn serialize_projection(
    projection: &[AttributePath],
    schema: &Schema,
    attrs: &mut ExpressionAttributes,
) -> String {
    projection
        .iter()
        .map(|path| attrs.add_path(&path.normalize(schema).0))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod test {
    use super::*;
    use marshal::SchemaType;

    #[test]
    fn test_projection_serialization_is_idempotent() {
        let schema = Schema::new()
            .with("id", SchemaType::string().hash_key())
            .with("note", SchemaType::string().attribute_name("note_text"));

        let projection: Vec<AttributePath> =
            vec!["id".into(), "note".into(), "unknown.member[3]".into()];

        let mut attrs = ExpressionAttributes::new();
        let first = serialize_projection(&projection, &schema, &mut attrs);
        let second = serialize_projection(&projection, &schema, &mut attrs);

        assert_eq!(first, "#attr0, #attr1, #attr2.#attr3[3]");
        assert_eq!(first, second);
        assert_eq!(attrs.names()["#attr1"], "note_text");
        assert_eq!(attrs.values().len(), 0);
    }
}
