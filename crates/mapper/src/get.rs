use crate::{Error, Mapper, ReadConsistency};
use expressions::{serialize_projection, AttributePath, ExpressionAttributes};
use marshal::{Model, Object};

#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub consistent_read: Option<ReadConsistency>,
    pub projection: Option<Vec<AttributePath>>,
}

impl Mapper {
    /// Fetch the item with `item`'s key, returning it as an Object of the
    /// same schema and table. Fails with ItemNotFound when the store has no
    /// item for the key, whether or not a projection is in play.
    pub async fn get(&self, item: &Object, options: GetOptions) -> crate::Result<Object> {
        let schema = item.schema().clone();
        let key = marshal::marshal_key(&schema, item.value(), None)?;

        let mut attrs = ExpressionAttributes::new();
        let projection_expression = options
            .projection
            .as_deref()
            .map(|projection| serialize_projection(projection, &schema, &mut attrs));
        let (names, _) = attrs.into_parts();

        let request = store::GetItemRequest {
            table_name: self.table_name(item),
            key,
            consistent_read: self.consistent_read(options.consistent_read),
            projection_expression,
            expression_attribute_names: names,
            return_consumed_capacity: None,
        };

        tracing::debug!(table = %request.table_name, "getting item");
        let response = self.client().get_item(request.clone()).await?;

        match response.item {
            Some(attributes) => {
                Ok(item.with_value(marshal::unmarshal_item(&schema, &attributes)?))
            }
            None => Err(Error::ItemNotFound {
                request: Box::new(request),
            }),
        }
    }

    /// Typed convenience: fetch the stored counterpart of `model`.
    pub async fn load<M: Model>(&self, model: &M) -> crate::Result<M> {
        let fetched = self.get(&Object::of(model)?, GetOptions::default()).await?;
        Ok(fetched.typed::<M>()?)
    }
}
