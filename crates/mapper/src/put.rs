use crate::version::{merge_conditions, version_of};
use crate::Mapper;
use expressions::{Condition, ExpressionAttributes};
use marshal::{Model, Object};
use store::AttributeValue;

#[derive(Clone, Default)]
pub struct PutOptions {
    /// A caller condition, combined with any synthesized version check.
    pub condition: Option<Condition>,
    pub skip_version_check: Option<bool>,
}

impl Mapper {
    /// Write the full item, returning the written form (with materialized
    /// defaults and version) as an Object of the same schema and table.
    pub async fn put(&self, item: &Object, options: PutOptions) -> crate::Result<Object> {
        let schema = item.schema().clone();
        let mut marshalled = marshal::marshal_item(&schema, item.value())?;

        let skip_check = self.skip_version_check(options.skip_version_check);
        let mut version_condition = None;

        if let Some(version) = version_of(&schema, item.value()) {
            marshalled.insert(
                version.physical.to_string(),
                AttributeValue::N(version.next(skip_check).to_string()),
            );
            if !skip_check {
                version_condition = Some(version.condition());
            }
        }

        let mut attrs = ExpressionAttributes::new();
        let condition_expression = match merge_conditions(options.condition, version_condition) {
            Some(condition) => Some(condition.normalize(&schema)?.serialize(&mut attrs)),
            None => None,
        };
        let (names, values) = attrs.into_parts();

        let request = store::PutItemRequest {
            table_name: self.table_name(item),
            item: marshalled.clone(),
            condition_expression,
            expression_attribute_names: names,
            expression_attribute_values: values,
            ..Default::default()
        };

        tracing::debug!(table = %request.table_name, "putting item");
        self.client().put_item(request).await?;

        Ok(item.with_value(marshal::unmarshal_item(&schema, &marshalled)?))
    }

    /// Typed convenience: write `model` and return its written form.
    pub async fn save<M: Model>(&self, model: &M) -> crate::Result<M> {
        let written = self.put(&Object::of(model)?, PutOptions::default()).await?;
        Ok(written.typed::<M>()?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{MockClient, Widget};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_put_of_a_new_versioned_item() {
        let client = Arc::new(MockClient::new());
        let mapper = Mapper::new(client.clone());

        let written = mapper.save(&Widget::new("k")).await.unwrap();
        // The initialized version is echoed back on the written item.
        assert_eq!(written.version, Some(0));

        assert_eq!(
            client.requests_of("PutItem"),
            vec![json!({
                "TableName": "widgets",
                "Item": {"id": {"S": "k"}, "version": {"N": "0"}},
                "ConditionExpression": "attribute_not_exists(#attr0)",
                "ExpressionAttributeNames": {"#attr0": "version"},
            })],
        );
    }

    #[tokio::test]
    async fn test_put_of_an_existing_versioned_item() {
        let client = Arc::new(MockClient::new());
        let mapper = Mapper::new(client.clone());

        let mut widget = Widget::new("k");
        widget.version = Some(10);

        let written = mapper.save(&widget).await.unwrap();
        assert_eq!(written.version, Some(11));

        assert_eq!(
            client.requests_of("PutItem"),
            vec![json!({
                "TableName": "widgets",
                "Item": {"id": {"S": "k"}, "version": {"N": "11"}},
                "ConditionExpression": "#attr0 = :val1",
                "ExpressionAttributeNames": {"#attr0": "version"},
                "ExpressionAttributeValues": {":val1": {"N": "10"}},
            })],
        );
    }

    #[tokio::test]
    async fn test_skip_version_check_still_initializes() {
        let client = Arc::new(MockClient::new());
        let mapper = Mapper::new(client.clone());

        let object = marshal::Object::of(&Widget::new("k")).unwrap();
        mapper
            .put(
                &object,
                PutOptions {
                    condition: None,
                    skip_version_check: Some(true),
                },
            )
            .await
            .unwrap();

        // Version is initialized, but no condition is attached.
        assert_eq!(
            client.requests_of("PutItem"),
            vec![json!({
                "TableName": "widgets",
                "Item": {"id": {"S": "k"}, "version": {"N": "0"}},
            })],
        );

        // An existing version is neither checked nor incremented.
        let mut widget = Widget::new("k2");
        widget.version = Some(7);
        let object = marshal::Object::of(&widget).unwrap();
        mapper
            .put(
                &object,
                PutOptions {
                    condition: None,
                    skip_version_check: Some(true),
                },
            )
            .await
            .unwrap();

        assert_eq!(
            client.requests_of("PutItem")[1],
            json!({
                "TableName": "widgets",
                "Item": {"id": {"S": "k2"}, "version": {"N": "7"}},
            }),
        );
    }

    #[tokio::test]
    async fn test_rejected_condition_surfaces_as_transport() {
        let client = Arc::new(MockClient::new().on_put(|_| {
            Err(store::Error::Api {
                op: "PutItem",
                status: 400,
                kind: "ConditionalCheckFailedException".to_string(),
                message: "the conditional request failed".to_string(),
            })
        }));
        let mapper = Mapper::new(client.clone());

        let err = mapper.save(&Widget::new("k")).await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Transport(store::Error::Api { status: 400, .. }),
        ));

        // One request was sent, and nothing else.
        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "PutItem");
    }

    #[tokio::test]
    async fn test_caller_condition_composes_with_version_check() {
        let client = Arc::new(MockClient::new());
        let mapper = Mapper::new(client.clone());

        let object = marshal::Object::of(&Widget::new("k")).unwrap();
        mapper
            .put(
                &object,
                PutOptions {
                    condition: Some(Condition::attribute_not_exists(
                        expressions::AttributePath::new("id"),
                    )),
                    skip_version_check: None,
                },
            )
            .await
            .unwrap();

        let requests = client.requests_of("PutItem");
        assert_eq!(
            requests[0]["ConditionExpression"],
            json!("(attribute_not_exists(#attr0)) AND (attribute_not_exists(#attr1))"),
        );
        assert_eq!(
            requests[0]["ExpressionAttributeNames"],
            json!({"#attr0": "id", "#attr1": "version"}),
        );
    }
}
