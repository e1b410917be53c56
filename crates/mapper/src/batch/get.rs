use super::{
    any_throttled, expired_table, next_input, ready_total, ReadState, TableState,
    MAX_READ_BATCH_SIZE,
};
use crate::{Mapper, ReadConsistency};
use expressions::{serialize_projection, AttributePath, ExpressionAttributes};
use futures::Stream;
use marshal::Object;
use std::collections::{BTreeMap, HashMap, VecDeque};
use store::AttributeMap;

/// Per-table read options of a batch get.
#[derive(Clone, Default)]
pub struct TableReadOptions {
    pub consistent_read: Option<ReadConsistency>,
    pub projection: Option<Vec<AttributePath>>,
}

#[derive(Clone, Default)]
pub struct BatchGetOptions {
    pub consistent_read: Option<ReadConsistency>,
    /// Options per (unprefixed) table name.
    pub per_table: HashMap<String, TableReadOptions>,
}

impl Mapper {
    /// Read every item of `items` (their keys are extracted), batching up to
    /// 100 keys per RPC across heterogeneous tables. The returned engine
    /// lazily yields each fetched item; unprocessed keys are retried with
    /// per-table backoff until the stream drains.
    pub fn batch_get<S>(&self, items: S, options: BatchGetOptions) -> BatchGet<S>
    where
        S: Stream<Item = Object> + Unpin,
    {
        BatchGet {
            mapper: self.clone(),
            input: Some(items),
            options,
            tables: BTreeMap::new(),
            out: VecDeque::new(),
            failed: false,
        }
    }
}

/// The streaming batch read engine. See [`Mapper::batch_get`].
pub struct BatchGet<S> {
    mapper: Mapper,
    input: Option<S>,
    options: BatchGetOptions,
    tables: BTreeMap<String, TableState<AttributeMap>>,
    out: VecDeque<Object>,
    failed: bool,
}

enum Event {
    Release(String),
    Input(Option<Object>),
}

impl<S> BatchGet<S>
where
    S: Stream<Item = Object> + Unpin,
{
    /// Yield the next fetched item. The engine advances by racing the input
    /// stream against the earliest throttling waiter, dispatching an RPC
    /// whenever a full batch is assembled or the drained input leaves a
    /// partial one.
    pub async fn next(&mut self) -> Option<crate::Result<Object>> {
        loop {
            if let Some(object) = self.out.pop_front() {
                return Some(Ok(object));
            }
            if self.failed {
                return None;
            }

            let ready = ready_total(&self.tables);
            let throttled = any_throttled(&self.tables);

            if ready >= MAX_READ_BATCH_SIZE || (self.input.is_none() && ready > 0) {
                if let Err(err) = self.dispatch().await {
                    self.failed = true;
                    return Some(Err(err));
                }
                continue;
            }
            if self.input.is_none() && !throttled {
                return None;
            }

            let event = {
                let Self { input, tables, .. } = self;
                tokio::select! {
                    biased;
                    Some(table) = expired_table(tables), if throttled => Event::Release(table),
                    item = next_input(input), if input.is_some() => Event::Input(item),
                }
            };

            match event {
                Event::Release(table) => {
                    let state = self.tables.get_mut(&table).expect("throttled table exists");
                    state.release();
                    tracing::debug!(table = %table, "throttled table released");
                }
                Event::Input(Some(object)) => {
                    if let Err(err) = self.prepare(object) {
                        self.failed = true;
                        return Some(Err(err));
                    }
                }
                Event::Input(None) => self.input = None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = crate::Result<Object>> {
        futures::stream::unfold(self, |mut engine| async move {
            let item = engine.next().await?;
            Some((item, engine))
        })
    }

    /// Marshal an input item's key and route it to its table's queue,
    /// allocating table state on first encounter.
    fn prepare(&mut self, object: Object) -> crate::Result<()> {
        let schema = object.schema().clone();
        let physical = self.mapper.table_name(&object);

        let state = match self.tables.entry(physical) {
            std::collections::btree_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::btree_map::Entry::Vacant(entry) => {
                let logical = object.table_name("");
                let key_properties = schema.key_properties(None);
                let table_options = self.options.per_table.get(&logical);

                let consistent_read = self.mapper.consistent_read(
                    table_options
                        .and_then(|options| options.consistent_read)
                        .or(self.options.consistent_read),
                );

                let (projection, names) =
                    match table_options.and_then(|options| options.projection.clone()) {
                        Some(mut projection) => {
                            // Key attributes are always projected: responses
                            // are correlated with their requests by key.
                            for (property, _) in schema.key_schemas(None) {
                                let path = AttributePath::new(property.clone());
                                if !projection.contains(&path) {
                                    projection.push(path);
                                }
                            }
                            let mut attrs = ExpressionAttributes::new();
                            let text = serialize_projection(&projection, &schema, &mut attrs);
                            (Some(text), attrs.into_parts().0)
                        }
                        None => (None, BTreeMap::new()),
                    };

                entry.insert(TableState::new(
                    logical,
                    key_properties,
                    Some(ReadState {
                        consistent_read,
                        projection,
                        names,
                    }),
                ))
            }
        };

        let key = marshal::marshal_key(&schema, object.value(), None)?;
        let identifier = marshal::item_identifier(&key, &state.key_properties)?;
        state.configs.insert(identifier, schema);
        state.enqueue(key);
        Ok(())
    }

    /// Drain up to one batch from the ready queues and await its RPC.
    async fn dispatch(&mut self) -> crate::Result<()> {
        let mut request_items = BTreeMap::new();
        let mut budget = MAX_READ_BATCH_SIZE;

        for (table, state) in self.tables.iter_mut() {
            let take = state.ready.len().min(budget);
            if take == 0 {
                continue;
            }
            budget -= take;

            let read = state.read.as_ref().expect("batch reads carry read state");
            request_items.insert(
                table.clone(),
                store::KeysAndAttributes {
                    keys: state.ready.drain(..take).collect(),
                    consistent_read: read.consistent_read,
                    projection_expression: read.projection.clone(),
                    expression_attribute_names: read.names.clone(),
                },
            );
            if budget == 0 {
                break;
            }
        }

        tracing::debug!(
            tables = request_items.len(),
            keys = MAX_READ_BATCH_SIZE - budget,
            "dispatching batch read",
        );

        let response = self
            .mapper
            .client()
            .batch_get_item(store::BatchGetRequest {
                request_items,
                ..Default::default()
            })
            .await?;

        for (table, items) in &response.responses {
            let Some(state) = self.tables.get_mut(table) else {
                continue;
            };
            if !items.is_empty() {
                state.record_success();
            }
            for item in items {
                let identifier = marshal::item_identifier(item, &state.key_properties)?;
                let Some(schema) = state.configs.get(&identifier) else {
                    tracing::warn!(table = %table, identifier = %identifier,
                        "response item matches no requested key");
                    continue;
                };
                let value = marshal::unmarshal_item(schema, item)?;
                self.out
                    .push_back(Object::new(state.logical.clone(), schema.clone(), value)?);
            }
        }

        for (table, unprocessed) in response.unprocessed_keys {
            if let Some(state) = self.tables.get_mut(&table) {
                state.mark_unprocessed(unprocessed.keys);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{MockClient, Widget};
    use serde_json::json;
    use std::sync::Arc;
    use store::AttributeValue;

    fn objects(count: usize) -> Vec<Object> {
        (0..count)
            .map(|i| Object::of(&Widget::new(&format!("widget-{i}"))).unwrap())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_batched_read_partitioning() {
        crate::testing::init_tracing();
        let client = Arc::new(MockClient::new());
        let mapper = Mapper::new(client.clone());

        let mut engine = mapper.batch_get(
            futures::stream::iter(objects(325)),
            BatchGetOptions::default(),
        );

        let mut fetched = 0;
        while let Some(object) = engine.next().await {
            object.unwrap();
            fetched += 1;
        }
        assert_eq!(fetched, 325);

        // Exactly ceil(325 / 100) calls, sized (100, 100, 100, 25).
        let sizes: Vec<usize> = client
            .requests_of("BatchGetItem")
            .iter()
            .map(|req| req["RequestItems"]["widgets"]["Keys"].as_array().unwrap().len())
            .collect();
        assert_eq!(sizes, vec![100, 100, 100, 25]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unprocessed_keys_are_retried() {
        // The first batch reports one key unprocessed; the retry succeeds.
        let mut calls = 0;
        let client = Arc::new(MockClient::new().on_batch_get(move |req| {
            calls += 1;
            let keys = &req.request_items["widgets"].keys;
            if calls == 1 {
                let (unprocessed, served) = keys.split_first().unwrap();
                Ok(store::BatchGetResponse {
                    responses: [("widgets".to_string(), served.to_vec())].into_iter().collect(),
                    unprocessed_keys: [(
                        "widgets".to_string(),
                        store::KeysAndAttributes {
                            keys: vec![unprocessed.clone()],
                            ..Default::default()
                        },
                    )]
                    .into_iter()
                    .collect(),
                    ..Default::default()
                })
            } else {
                Ok(store::BatchGetResponse {
                    responses: [("widgets".to_string(), keys.clone())].into_iter().collect(),
                    ..Default::default()
                })
            }
        }));
        let mapper = Mapper::new(client.clone());

        let mut engine = mapper.batch_get(
            futures::stream::iter(objects(10)),
            BatchGetOptions::default(),
        );

        let mut ids = Vec::new();
        while let Some(object) = engine.next().await {
            ids.push(object.unwrap().typed::<Widget>().unwrap().id);
        }

        // Every key is eventually served exactly once.
        ids.sort();
        let mut expect: Vec<String> = (0..10).map(|i| format!("widget-{i}")).collect();
        expect.sort();
        assert_eq!(ids, expect);

        assert_eq!(client.requests_of("BatchGetItem").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_table_options() {
        let client = Arc::new(MockClient::new());
        let mapper = Mapper::new(client.clone());

        let options = BatchGetOptions {
            consistent_read: None,
            per_table: [(
                "widgets".to_string(),
                TableReadOptions {
                    consistent_read: Some(ReadConsistency::Strong),
                    projection: Some(vec!["note".into()]),
                },
            )]
            .into_iter()
            .collect(),
        };

        let mut engine = mapper.batch_get(futures::stream::iter(objects(1)), options);
        while let Some(object) = engine.next().await {
            object.unwrap();
        }

        let requests = client.requests_of("BatchGetItem");
        let table = &requests[0]["RequestItems"]["widgets"];
        assert_eq!(table["ConsistentRead"], json!(true));
        // The key attribute is appended to the caller's projection so the
        // response can be correlated.
        assert_eq!(table["ProjectionExpression"], json!("#attr0, #attr1"));
        assert_eq!(
            table["ExpressionAttributeNames"],
            json!({"#attr0": "note", "#attr1": "id"}),
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_heterogeneous_tables_in_one_batch() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Gadget {
            serial: i64,
        }
        lazy_static::lazy_static! {
            static ref GADGET_SCHEMA: Arc<marshal::Schema> = Arc::new(
                marshal::Schema::new().with("serial", marshal::SchemaType::number().hash_key()),
            );
        }
        impl marshal::Model for Gadget {
            fn schema() -> Arc<marshal::Schema> {
                GADGET_SCHEMA.clone()
            }
            fn table_name() -> &'static str {
                "gadgets"
            }
        }

        let client = Arc::new(MockClient::new());
        let mapper = Mapper::new(client.clone());

        let input = vec![
            Object::of(&Widget::new("w")).unwrap(),
            Object::of(&Gadget { serial: 7 }).unwrap(),
        ];
        let mut engine =
            mapper.batch_get(futures::stream::iter(input), BatchGetOptions::default());

        let mut tables = Vec::new();
        while let Some(object) = engine.next().await {
            tables.push(object.unwrap().table_name(""));
        }
        tables.sort();
        assert_eq!(tables, vec!["gadgets", "widgets"]);

        // One RPC grouped both tables.
        let requests = client.requests_of("BatchGetItem");
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0]["RequestItems"]["gadgets"]["Keys"],
            json!([{"serial": {"N": "7"}}]),
        );
        assert_eq!(
            requests[0]["RequestItems"]["widgets"]["Keys"],
            json!([{"id": {"S": "w"}}]),
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_terminate_the_stream() {
        let mut calls = 0;
        let client = Arc::new(MockClient::new().on_batch_get(move |req| {
            calls += 1;
            if calls == 1 {
                let keys = req.request_items["widgets"].keys.clone();
                Ok(store::BatchGetResponse {
                    responses: [("widgets".to_string(), keys)].into_iter().collect(),
                    ..Default::default()
                })
            } else {
                Err(store::Error::Api {
                    op: "BatchGetItem",
                    status: 400,
                    kind: "ValidationException".to_string(),
                    message: "bad request".to_string(),
                })
            }
        }));
        let mapper = Mapper::new(client);

        let mut engine = mapper.batch_get(
            futures::stream::iter(objects(150)),
            BatchGetOptions::default(),
        );

        // The first batch of 100 yields; the second call fails and the
        // failure terminates the stream, retaining prior yields.
        let mut yielded = 0;
        let mut failures = 0;
        while let Some(result) = engine.next().await {
            match result {
                Ok(_) => yielded += 1,
                Err(crate::Error::Transport(_)) => failures += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(yielded, 100);
        assert_eq!(failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_input() {
        let client = Arc::new(MockClient::new());
        let mapper = Mapper::new(client.clone());

        let mut engine = mapper.batch_get(
            futures::stream::iter(Vec::<Object>::new()),
            BatchGetOptions::default(),
        );
        assert!(engine.next().await.is_none());
        assert!(client.requests_of("BatchGetItem").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_trip_of_fetched_attributes() {
        let client = Arc::new(MockClient::new().on_batch_get(|req| {
            let items: Vec<store::AttributeMap> = req.request_items["widgets"]
                .keys
                .iter()
                .map(|key| {
                    let mut item = key.clone();
                    item.insert(
                        "note".to_string(),
                        AttributeValue::S("fetched".to_string()),
                    );
                    item
                })
                .collect();
            Ok(store::BatchGetResponse {
                responses: [("widgets".to_string(), items)].into_iter().collect(),
                ..Default::default()
            })
        }));
        let mapper = Mapper::new(client);

        let mut engine = mapper.batch_get(
            futures::stream::iter(objects(1)),
            BatchGetOptions::default(),
        );
        let widget = engine
            .next()
            .await
            .unwrap()
            .unwrap()
            .typed::<Widget>()
            .unwrap();
        assert_eq!(widget.id, "widget-0");
        assert_eq!(widget.note.as_deref(), Some("fetched"));
        assert!(engine.next().await.is_none());
    }
}
