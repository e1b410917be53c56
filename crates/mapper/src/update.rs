use crate::version::{merge_conditions, version_of};
use crate::{Error, Mapper};
use expressions::{AttributePath, Condition, ExpressionAttributes, Math, Operand, Update};
use marshal::{Model, Object};
use store::AttributeValue;

/// How an Update treats schema properties absent from the item.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum OnMissing {
    /// Remove the stored attribute.
    #[default]
    Remove,
    /// Leave the stored attribute as it is.
    Skip,
}

#[derive(Clone, Default)]
pub struct UpdateOptions {
    /// A caller condition, combined with any synthesized version check.
    pub condition: Option<Condition>,
    pub skip_version_check: Option<bool>,
    pub on_missing: OnMissing,
}

impl Mapper {
    /// Synthesize and apply an update bringing the stored item to `item`'s
    /// state: present attributes are SET, absent ones REMOVEd (per
    /// `on_missing`), and a version attribute is checked and incremented
    /// server-side. Returns the post-update item.
    pub async fn update(&self, item: &Object, options: UpdateOptions) -> crate::Result<Object> {
        let schema = item.schema().clone();
        let marshalled = marshal::marshal_item(&schema, item.value())?;

        let skip_check = self.skip_version_check(options.skip_version_check);
        let version = version_of(&schema, item.value());
        let mut version_condition = None;

        let mut update = Update::new();
        for (property, ty) in schema.iter() {
            if ty.is_key(None) {
                continue;
            }
            let path = AttributePath::new(property.clone());

            // The version attribute is initialized for a new item and
            // incremented server-side for an existing one; skipping the
            // check suppresses the increment but not the initialization.
            if let Some(version) = version.as_ref().filter(|v| v.property == property.as_str()) {
                if !skip_check {
                    version_condition = Some(version.condition());
                }
                match (version.current, skip_check) {
                    (None, _) => {
                        update = update.set(
                            path,
                            Operand::Attribute(AttributeValue::N("0".to_string())),
                        );
                        continue;
                    }
                    (Some(_), false) => {
                        update = update.set(
                            path.clone(),
                            Math::add(
                                Operand::Path(path),
                                Operand::Attribute(AttributeValue::N("1".to_string())),
                            ),
                        );
                        continue;
                    }
                    // Skipped check with a present version: fall through and
                    // write it like any other attribute.
                    (Some(_), true) => {}
                }
            }

            match marshalled.get(ty.physical_name(property)) {
                Some(value) => {
                    update = update.set(path, Operand::Attribute(value.clone()));
                }
                None if options.on_missing == OnMissing::Remove => {
                    update = update.remove(path);
                }
                None => {}
            }
        }

        // Expressions share one allocator, so the version path's token is
        // common to the condition and update texts.
        let mut attrs = ExpressionAttributes::new();
        let condition_expression = match merge_conditions(options.condition, version_condition) {
            Some(condition) => Some(condition.normalize(&schema)?.serialize(&mut attrs)),
            None => None,
        };
        let update_expression = match update.is_empty() {
            true => None,
            false => Some(update.normalize(&schema)?.serialize(&mut attrs)),
        };
        let (names, values) = attrs.into_parts();

        let request = store::UpdateItemRequest {
            table_name: self.table_name(item),
            key: marshal::marshal_key(&schema, item.value(), None)?,
            update_expression,
            condition_expression,
            expression_attribute_names: names,
            expression_attribute_values: values,
            return_values: Some("ALL_NEW".to_string()),
            ..Default::default()
        };

        tracing::debug!(table = %request.table_name, "updating item");
        let response = self.client().update_item(request).await?;

        match response.attributes {
            Some(attributes) => {
                Ok(item.with_value(marshal::unmarshal_item(&schema, &attributes)?))
            }
            None => Err(Error::NoReturnedAttributes),
        }
    }

    /// Typed convenience: update `model`'s stored counterpart.
    pub async fn apply<M: Model>(&self, model: &M) -> crate::Result<M> {
        let updated = self
            .update(&Object::of(model)?, UpdateOptions::default())
            .await?;
        Ok(updated.typed::<M>()?)
    }
}
