use crate::paginate::{Items, PageRequest, Pages};
use crate::{KeyCondition, Mapper, ReadConsistency};
use expressions::{serialize_projection, AttributePath, Condition, ExpressionAttributes};
use marshal::{Model, Object, Schema};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct QueryOptions {
    /// Read from the named secondary index instead of the table itself.
    pub index_name: Option<String>,
    /// Server-side filter, applied after the key condition.
    pub filter: Option<Condition>,
    pub projection: Option<Vec<AttributePath>>,
    pub consistent_read: Option<ReadConsistency>,
    /// False reads the range in descending order.
    pub scan_index_forward: Option<bool>,
    /// Resume from a previously captured `last_evaluated_key`.
    pub start_key: Option<serde_json::Value>,
    /// Stop after this many items, across all pages.
    pub limit: Option<u64>,
    /// Per-RPC page size.
    pub page_size: Option<u64>,
    /// Pass-through of the store's ReturnConsumedCapacity member, e.g.
    /// "TOTAL"; `consumed_capacity()` aggregates whatever comes back.
    pub return_consumed_capacity: Option<String>,
}

impl Mapper {
    /// Query a single partition of M's table, lazily paging through results.
    pub fn query<M: Model>(
        &self,
        key_condition: impl Into<KeyCondition>,
        options: QueryOptions,
    ) -> crate::Result<QueryIter> {
        self.query_table(M::table_name(), M::schema(), key_condition.into(), options)
    }

    /// As `query`, for a dynamically provided table and schema.
    pub fn query_table(
        &self,
        table: &str,
        schema: Arc<Schema>,
        key_condition: KeyCondition,
        options: QueryOptions,
    ) -> crate::Result<QueryIter> {
        let mut attrs = ExpressionAttributes::new();

        let key_condition_expression = key_condition
            .lower()
            .normalize(&schema)?
            .serialize(&mut attrs);
        let filter_expression = match &options.filter {
            Some(filter) => Some(filter.normalize(&schema)?.serialize(&mut attrs)),
            None => None,
        };
        let projection_expression = options
            .projection
            .as_deref()
            .map(|projection| serialize_projection(projection, &schema, &mut attrs));
        let (names, values) = attrs.into_parts();

        let key_properties = key_properties(&schema, options.index_name.as_deref());
        let exclusive_start_key = options
            .start_key
            .as_ref()
            .map(|start| start_key(&schema, start, &key_properties))
            .transpose()?;

        let request = store::QueryRequest {
            table_name: format!("{}{}", self.config().table_name_prefix, table),
            index_name: options.index_name.clone(),
            key_condition_expression: Some(key_condition_expression),
            filter_expression,
            projection_expression,
            expression_attribute_names: names,
            expression_attribute_values: values,
            exclusive_start_key,
            scan_index_forward: options.scan_index_forward,
            consistent_read: self.consistent_read(options.consistent_read),
            return_consumed_capacity: options.return_consumed_capacity.clone(),
            ..Default::default()
        };

        tracing::debug!(table = %request.table_name, index = ?request.index_name, "starting query");

        Ok(QueryIter {
            items: Items::new(Pages::new(
                self.client().clone(),
                PageRequest::Query(request),
                options.limit,
                options.page_size,
            )),
            table: table.to_string(),
            schema,
            key_properties,
        })
    }
}

/// The physical key properties of a continuation key: the table key plus,
/// for index reads, the index key.
pub(crate) fn key_properties(schema: &Schema, index: Option<&str>) -> Vec<String> {
    let mut properties = schema.key_properties(None);
    if index.is_some() {
        for name in schema.key_properties(index) {
            if !properties.contains(&name) {
                properties.push(name);
            }
        }
    }
    properties
}

/// Marshal a captured continuation key back to its wire form.
pub(crate) fn start_key(
    schema: &Schema,
    start: &serde_json::Value,
    key_properties: &[String],
) -> crate::Result<store::AttributeMap> {
    let marshalled = marshal::marshal_item(schema, start)?;
    Ok(marshalled
        .into_iter()
        .filter(|(name, _)| key_properties.contains(name))
        .collect())
}

/// A lazily paginated query: `next()` yields one item at a time, issuing
/// page RPCs as the local buffer drains. `pages()` converts to whole-page
/// iteration, disabling the per-item interface.
pub struct QueryIter {
    items: Items,
    table: String,
    schema: Arc<Schema>,
    key_properties: Vec<String>,
}

impl QueryIter {
    pub async fn next(&mut self) -> Option<crate::Result<Object>> {
        match self.items.next().await? {
            Ok(item) => Some(to_object(&self.table, &self.schema, &item)),
            Err(err) => Some(Err(err.into())),
        }
    }

    /// Whole-page iteration.
    pub fn pages(self) -> QueryPages {
        QueryPages {
            pages: self.items.pages,
            table: self.table,
            schema: self.schema,
        }
    }

    /// Items yielded so far.
    pub fn count(&self) -> u64 {
        self.items.pages.count()
    }

    /// Items the server evaluated; exceeds `count` under a filter.
    pub fn scanned_count(&self) -> u64 {
        self.items.pages.scanned_count()
    }

    /// Total capacity units consumed across all pages.
    pub fn consumed_capacity(&self) -> f64 {
        self.items.pages.consumed_capacity()
    }

    /// The resumption cursor, unmarshalled per the query's schema.
    pub fn last_evaluated_key(&self) -> Option<serde_json::Value> {
        let key = self.items.last_evaluated_key(&self.key_properties)?;
        marshal::unmarshal_item(&self.schema, &key).ok()
    }

    pub fn into_stream(self) -> impl futures::Stream<Item = crate::Result<Object>> {
        futures::stream::unfold(self, |mut iter| async move {
            let item = iter.next().await?;
            Some((item, iter))
        })
    }
}

pub struct QueryPages {
    pages: Pages,
    table: String,
    schema: Arc<Schema>,
}

impl QueryPages {
    pub async fn next(&mut self) -> Option<crate::Result<Vec<Object>>> {
        match self.pages.next_page().await? {
            Ok(items) => Some(
                items
                    .iter()
                    .map(|item| to_object(&self.table, &self.schema, item))
                    .collect(),
            ),
            Err(err) => Some(Err(err.into())),
        }
    }

    pub fn count(&self) -> u64 {
        self.pages.count()
    }
    pub fn scanned_count(&self) -> u64 {
        self.pages.scanned_count()
    }
    pub fn consumed_capacity(&self) -> f64 {
        self.pages.consumed_capacity()
    }

    /// The server's continuation key, unmarshalled per the query's schema.
    pub fn last_evaluated_key(&self) -> Option<serde_json::Value> {
        let key = self.pages.last_evaluated_key()?;
        marshal::unmarshal_item(&self.schema, key).ok()
    }
}

pub(crate) fn to_object(
    table: &str,
    schema: &Arc<Schema>,
    item: &store::AttributeMap,
) -> crate::Result<Object> {
    let value = marshal::unmarshal_item(schema, item)?;
    Ok(Object::new(table, schema.clone(), value)?)
}
