use crate::Error;
use store::AttributeMap;

/// Derive the stable identifier of a marshalled item from its key attributes.
///
/// Each key attribute contributes a `name=scalar` component, joined with `:`
/// in `key_properties` order. Identifiers correlate a batched request element
/// with its response or retry entry, so within one batch operation they must
/// be unique per table; a schema whose keys collide here is malformed.
pub fn item_identifier(item: &AttributeMap, key_properties: &[String]) -> crate::Result<String> {
    let mut parts = Vec::with_capacity(key_properties.len());

    for name in key_properties {
        let Some(value) = item.get(name) else {
            return Err(Error::InvalidSchema(format!(
                "key attribute '{name}' is absent from the marshalled item"
            )));
        };
        let Some(scalar) = value.key_scalar() else {
            return Err(Error::InvalidSchema(format!(
                "key attribute '{name}' does not hold a scalar value"
            )));
        };
        parts.push(format!("{name}={scalar}"));
    }

    Ok(parts.join(":"))
}
