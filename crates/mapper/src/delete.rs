use crate::version::{merge_conditions, version_of};
use crate::Mapper;
use expressions::{Condition, ExpressionAttributes};
use marshal::{Model, Object};

#[derive(Clone, Default)]
pub struct DeleteOptions {
    /// A caller condition, combined with any synthesized version check.
    pub condition: Option<Condition>,
    pub skip_version_check: Option<bool>,
}

impl Mapper {
    /// Delete the item with `item`'s key. Returns the previous stored item
    /// when the store reports one.
    pub async fn delete(
        &self,
        item: &Object,
        options: DeleteOptions,
    ) -> crate::Result<Option<Object>> {
        let schema = item.schema().clone();
        let key = marshal::marshal_key(&schema, item.value(), None)?;

        // A version check guards the delete, but nothing is incremented.
        let version_condition = match self.skip_version_check(options.skip_version_check) {
            true => None,
            false => version_of(&schema, item.value()).map(|version| version.condition()),
        };

        let mut attrs = ExpressionAttributes::new();
        let condition_expression = match merge_conditions(options.condition, version_condition) {
            Some(condition) => Some(condition.normalize(&schema)?.serialize(&mut attrs)),
            None => None,
        };
        let (names, values) = attrs.into_parts();

        let request = store::DeleteItemRequest {
            table_name: self.table_name(item),
            key,
            condition_expression,
            expression_attribute_names: names,
            expression_attribute_values: values,
            return_values: Some("ALL_OLD".to_string()),
            ..Default::default()
        };

        tracing::debug!(table = %request.table_name, "deleting item");
        let response = self.client().delete_item(request).await?;

        match response.attributes {
            Some(attributes) => Ok(Some(
                item.with_value(marshal::unmarshal_item(&schema, &attributes)?),
            )),
            None => Ok(None),
        }
    }

    /// Typed convenience: delete `model`'s stored counterpart.
    pub async fn remove<M: Model>(&self, model: &M) -> crate::Result<Option<M>> {
        let previous = self
            .delete(&Object::of(model)?, DeleteOptions::default())
            .await?;
        previous
            .map(|object| object.typed::<M>().map_err(Into::into))
            .transpose()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{MockClient, Widget};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_delete_returns_the_previous_item() {
        let client = Arc::new(MockClient::new().on_delete(|req| {
            let mut attributes = req.key.clone();
            attributes.insert(
                "note".to_string(),
                store::AttributeValue::S("old".to_string()),
            );
            Ok(store::DeleteItemResponse {
                attributes: Some(attributes),
                ..Default::default()
            })
        }));
        let mapper = Mapper::new(client.clone());

        let mut widget = Widget::new("w-1");
        widget.version = Some(3);

        let previous = mapper.remove(&widget).await.unwrap().unwrap();
        assert_eq!(previous.note.as_deref(), Some("old"));

        // Key only, ALL_OLD, and a version-equality condition.
        assert_eq!(
            client.requests_of("DeleteItem"),
            vec![json!({
                "TableName": "widgets",
                "Key": {"id": {"S": "w-1"}},
                "ConditionExpression": "#attr0 = :val1",
                "ExpressionAttributeNames": {"#attr0": "version"},
                "ExpressionAttributeValues": {":val1": {"N": "3"}},
                "ReturnValues": "ALL_OLD",
            })],
        );
    }

    #[tokio::test]
    async fn test_delete_of_an_unversioned_item_guards_on_absence() {
        let client = Arc::new(MockClient::new());
        let mapper = Mapper::new(client.clone());

        let previous = mapper.remove(&Widget::new("w-1")).await.unwrap();
        assert!(previous.is_none());

        // No version value: the synthesized condition is attribute_not_exists
        // and no version is written anywhere.
        assert_eq!(
            client.requests_of("DeleteItem")[0]["ConditionExpression"],
            json!("attribute_not_exists(#attr0)"),
        );
    }
}
