//! The streaming batch engines: group a possibly-unbounded input stream
//! into store-sized batches, dispatch them, route unprocessed elements into
//! per-table throttling queues with jittered exponential backoff, and yield
//! completed items lazily.

mod get;
mod write;

pub use get::{BatchGet, BatchGetOptions, TableReadOptions};
pub use write::{BatchWrite, WriteOp};

use futures::FutureExt;
use marshal::Schema;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;

pub(crate) const MAX_READ_BATCH_SIZE: usize = 100;
pub(crate) const MAX_WRITE_BATCH_SIZE: usize = 25;

/// A throttled table's retry queue, replayed once the waiter elapses.
pub(crate) struct Throttled<E> {
    pub unprocessed: VecDeque<E>,
    pub waiter: Pin<Box<tokio::time::Sleep>>,
}

/// Read-specific table state, derived once per table from its options.
pub(crate) struct ReadState {
    pub consistent_read: bool,
    pub projection: Option<String>,
    pub names: BTreeMap<String, String>,
}

/// Per-table state of one batch operation. Every not-yet-completed element
/// of a table sits in exactly one of `ready` or `throttled.unprocessed`.
pub(crate) struct TableState<E> {
    /// The unprefixed table name, for reconstructing yielded Objects.
    pub logical: String,
    /// Physical key attribute names, in canonical order.
    pub key_properties: Vec<String>,
    /// Schema of each enqueued element, by item identifier, so the original
    /// shape can be reconstructed on return.
    pub configs: HashMap<String, Arc<Schema>>,
    pub backoff_factor: u32,
    pub ready: VecDeque<E>,
    pub throttled: Option<Throttled<E>>,
    pub read: Option<ReadState>,
}

impl<E> TableState<E> {
    pub fn new(logical: String, key_properties: Vec<String>, read: Option<ReadState>) -> Self {
        Self {
            logical,
            key_properties,
            configs: HashMap::new(),
            backoff_factor: 0,
            ready: VecDeque::new(),
            throttled: None,
            read,
        }
    }

    /// Enqueue a prepared element: to the retry queue while the table is
    /// throttled, and to the ready queue otherwise.
    pub fn enqueue(&mut self, element: E) {
        match &mut self.throttled {
            Some(throttled) => throttled.unprocessed.push_back(element),
            None => self.ready.push_back(element),
        }
    }

    /// A response processed at least one of this table's elements.
    pub fn record_success(&mut self) {
        self.backoff_factor = self.backoff_factor.saturating_sub(1);
    }

    /// The server declined `fresh` elements of this table. They are queued
    /// ahead of previously-throttled elements, followed by any still-ready
    /// ones, and a fresh backoff waiter is installed.
    pub fn mark_unprocessed(&mut self, fresh: Vec<E>) {
        self.backoff_factor += 1;

        let mut unprocessed: VecDeque<E> = fresh.into();
        if let Some(previous) = self.throttled.take() {
            unprocessed.extend(previous.unprocessed);
        }
        unprocessed.extend(self.ready.drain(..));

        let delay = crate::backoff(self.backoff_factor);
        tracing::debug!(
            table = %self.logical,
            backoff_factor = self.backoff_factor,
            delay_ms = delay.as_millis() as u64,
            queued = unprocessed.len(),
            "table throttled",
        );

        self.throttled = Some(Throttled {
            unprocessed,
            waiter: Box::pin(tokio::time::sleep(delay)),
        });
    }

    /// The waiter elapsed: replay the retry queue into the ready queue.
    pub fn release(&mut self) {
        if let Some(throttled) = self.throttled.take() {
            let mut ready = throttled.unprocessed;
            ready.extend(self.ready.drain(..));
            self.ready = ready;
        }
    }
}

/// Pull the next element of the (possibly already drained) input stream.
/// Both engines enable this select branch only while input remains.
pub(crate) async fn next_input<S: futures::Stream + Unpin>(
    input: &mut Option<S>,
) -> Option<S::Item> {
    use futures::StreamExt;
    input
        .as_mut()
        .expect("the input branch is enabled only while input remains")
        .next()
        .await
}

pub(crate) fn ready_total<E>(tables: &BTreeMap<String, TableState<E>>) -> usize {
    tables.values().map(|state| state.ready.len()).sum()
}

pub(crate) fn any_throttled<E>(tables: &BTreeMap<String, TableState<E>>) -> bool {
    tables.values().any(|state| state.throttled.is_some())
}

/// Await the earliest throttling waiter, resolving to its table name.
/// Resolves to None immediately when no table is throttled.
pub(crate) async fn expired_table<E: Send>(
    tables: &mut BTreeMap<String, TableState<E>>,
) -> Option<String> {
    let waiters: Vec<_> = tables
        .iter_mut()
        .filter_map(|(name, state)| {
            state.throttled.as_mut().map(|throttled| {
                let name = name.clone();
                async move {
                    throttled.waiter.as_mut().await;
                    name
                }
                .boxed()
            })
        })
        .collect();

    if waiters.is_empty() {
        return None;
    }
    let (name, _, _) = futures::future::select_all(waiters).await;
    Some(name)
}
