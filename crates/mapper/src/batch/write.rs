use super::{
    any_throttled, expired_table, next_input, ready_total, TableState, MAX_WRITE_BATCH_SIZE,
};
use crate::{Error, Mapper};
use futures::Stream;
use marshal::Object;
use std::collections::{BTreeMap, HashSet, VecDeque};

/// One element of a batch write stream.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Write the full item.
    Put(Object),
    /// Delete the item with this key.
    Delete(Object),
}

impl WriteOp {
    fn object(&self) -> &Object {
        match self {
            WriteOp::Put(object) | WriteOp::Delete(object) => object,
        }
    }
}

/// identifier + wire element of one enqueued write.
type Element = (String, store::WriteRequest);

impl Mapper {
    /// Apply every operation of `ops`, batching up to 25 writes per RPC
    /// across heterogeneous tables. The engine yields each written item
    /// once the store acknowledges it as processed; unprocessed elements
    /// are retried with per-table backoff until the stream drains.
    pub fn batch_write<S>(&self, ops: S) -> BatchWrite<S>
    where
        S: Stream<Item = WriteOp> + Unpin,
    {
        BatchWrite {
            mapper: self.clone(),
            input: Some(ops),
            tables: BTreeMap::new(),
            out: VecDeque::new(),
            failed: false,
        }
    }
}

/// The streaming batch write engine. See [`Mapper::batch_write`].
pub struct BatchWrite<S> {
    mapper: Mapper,
    input: Option<S>,
    tables: BTreeMap<String, TableState<Element>>,
    out: VecDeque<Object>,
    failed: bool,
}

enum Event {
    Release(String),
    Input(Option<WriteOp>),
}

impl<S> BatchWrite<S>
where
    S: Stream<Item = WriteOp> + Unpin,
{
    /// Yield the next acknowledged item. Mirrors [`BatchGet::next`]'s
    /// scheduling: race input against the earliest throttling waiter, and
    /// dispatch whenever a full batch forms or the drained input leaves a
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

            if ready >= MAX_WRITE_BATCH_SIZE || (self.input.is_none() && ready > 0) {
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
                    op = next_input(input), if input.is_some() => Event::Input(op),
                }
            };

            match event {
                Event::Release(table) => {
                    let state = self.tables.get_mut(&table).expect("throttled table exists");
                    state.release();
                    tracing::debug!(table = %table, "throttled table released");
                }
                Event::Input(Some(op)) => {
                    if let Err(err) = self.prepare(op) {
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

    /// Marshal a write (full item for puts, key only for deletes) and route
    /// it to its table's queue.
    fn prepare(&mut self, op: WriteOp) -> crate::Result<()> {
        let object = op.object();
        let schema = object.schema().clone();
        let physical = self.mapper.table_name(object);

        let state = self.tables.entry(physical).or_insert_with(|| {
            TableState::new(object.table_name(""), schema.key_properties(None), None)
        });

        let (identifier, request) = match &op {
            WriteOp::Put(object) => {
                let item = marshal::marshal_item(&schema, object.value())?;
                let identifier = marshal::item_identifier(&item, &state.key_properties)?;
                (
                    identifier,
                    store::WriteRequest {
                        put_request: Some(store::PutRequest { item }),
                        delete_request: None,
                    },
                )
            }
            WriteOp::Delete(object) => {
                let key = marshal::marshal_key(&schema, object.value(), None)?;
                let identifier = marshal::item_identifier(&key, &state.key_properties)?;
                (
                    identifier,
                    store::WriteRequest {
                        put_request: None,
                        delete_request: Some(store::DeleteRequest { key }),
                    },
                )
            }
        };

        state.configs.insert(identifier.clone(), schema);
        state.enqueue((identifier, request));
        Ok(())
    }

    /// Drain up to one batch from the ready queues and await its RPC.
    /// Elements the server reports unprocessed are not yet durable: they are
    /// routed to their table's retry queue instead of being echoed.
    async fn dispatch(&mut self) -> crate::Result<()> {
        let mut request_items = BTreeMap::new();
        let mut in_flight: Vec<(String, Element)> = Vec::new();
        let mut budget = MAX_WRITE_BATCH_SIZE;

        for (table, state) in self.tables.iter_mut() {
            let take = state.ready.len().min(budget);
            if take == 0 {
                continue;
            }
            budget -= take;

            let elements: Vec<Element> = state.ready.drain(..take).collect();
            request_items.insert(
                table.clone(),
                elements
                    .iter()
                    .map(|(_, request)| request.clone())
                    .collect::<Vec<_>>(),
            );
            in_flight.extend(elements.into_iter().map(|element| (table.clone(), element)));

            if budget == 0 {
                break;
            }
        }

        tracing::debug!(
            tables = request_items.len(),
            writes = in_flight.len(),
            "dispatching batch write",
        );

        let response = self
            .mapper
            .client()
            .batch_write_item(store::BatchWriteRequest {
                request_items,
                ..Default::default()
            })
            .await?;

        // Identifiers the server declined, per table.
        let mut declined: BTreeMap<String, HashSet<String>> = BTreeMap::new();
        for (table, requests) in response.unprocessed_items {
            let Some(state) = self.tables.get(&table) else {
                continue;
            };
            let mut identifiers = HashSet::new();
            for request in &requests {
                identifiers.insert(write_identifier(request, &state.key_properties)?);
            }
            declined.insert(table, identifiers);
        }

        let mut requeue: BTreeMap<String, Vec<Element>> = BTreeMap::new();
        let mut succeeded: HashSet<String> = HashSet::new();

        for (table, (identifier, request)) in in_flight {
            let was_declined = declined
                .get(&table)
                .map_or(false, |identifiers| identifiers.contains(&identifier));

            if was_declined {
                requeue.entry(table).or_default().push((identifier, request));
                continue;
            }

            let state = self.tables.get(&table).expect("dispatched table exists");
            let Some(schema) = state.configs.get(&identifier) else {
                continue;
            };
            let attributes = match (&request.put_request, &request.delete_request) {
                (Some(put), _) => &put.item,
                (_, Some(delete)) => &delete.key,
                _ => continue,
            };
            let value = marshal::unmarshal_item(schema, attributes)?;
            self.out
                .push_back(Object::new(state.logical.clone(), schema.clone(), value)?);
            succeeded.insert(table);
        }

        for table in succeeded {
            self.tables
                .get_mut(&table)
                .expect("dispatched table exists")
                .record_success();
        }
        for (table, elements) in requeue {
            self.tables
                .get_mut(&table)
                .expect("dispatched table exists")
                .mark_unprocessed(elements);
        }
        Ok(())
    }
}

/// The identifier of a wire write element, from whichever of its put or
/// delete members is set.
fn write_identifier(
    request: &store::WriteRequest,
    key_properties: &[String],
) -> crate::Result<String> {
    match (&request.put_request, &request.delete_request) {
        (Some(put), _) => Ok(marshal::item_identifier(&put.item, key_properties)?),
        (_, Some(delete)) => Ok(marshal::item_identifier(&delete.key, key_properties)?),
        _ => Err(Error::Marshal(marshal::Error::InvalidSchema(
            "write element holds neither a put nor a delete".to_string(),
        ))),
    }
}
