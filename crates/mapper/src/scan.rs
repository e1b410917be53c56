use crate::paginate::{Items, PageRequest, Pages};
use crate::query::{key_properties, start_key, to_object};
use crate::{Mapper, ReadConsistency};
use expressions::{serialize_projection, AttributePath, Condition, ExpressionAttributes};
use marshal::{Model, Object, Schema};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct ScanOptions {
    /// Scan the named secondary index instead of the table itself.
    pub index_name: Option<String>,
    /// Server-side filter.
    pub filter: Option<Condition>,
    pub projection: Option<Vec<AttributePath>>,
    pub consistent_read: Option<ReadConsistency>,
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
    /// Scan M's whole table, lazily paging through results.
    pub fn scan<M: Model>(&self, options: ScanOptions) -> crate::Result<ScanIter> {
        self.scan_table(M::table_name(), M::schema(), options)
    }

    /// As `scan`, for a dynamically provided table and schema.
    pub fn scan_table(
        &self,
        table: &str,
        schema: Arc<Schema>,
        options: ScanOptions,
    ) -> crate::Result<ScanIter> {
        self.scan_segment(table, schema, options, None)
    }

    /// One worker slice of a segmented scan: this iterator covers segment
    /// `segment` of `total_segments`.
    pub(crate) fn scan_segment(
        &self,
        table: &str,
        schema: Arc<Schema>,
        options: ScanOptions,
        segment: Option<(u32, u32)>,
    ) -> crate::Result<ScanIter> {
        let mut attrs = ExpressionAttributes::new();

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

        let request = store::ScanRequest {
            table_name: format!("{}{}", self.config().table_name_prefix, table),
            index_name: options.index_name.clone(),
            filter_expression,
            projection_expression,
            expression_attribute_names: names,
            expression_attribute_values: values,
            exclusive_start_key,
            segment: segment.map(|(segment, _)| segment),
            total_segments: segment.map(|(_, total)| total),
            consistent_read: self.consistent_read(options.consistent_read),
            return_consumed_capacity: options.return_consumed_capacity.clone(),
            ..Default::default()
        };

        tracing::debug!(
            table = %request.table_name,
            segment = ?request.segment,
            "starting scan",
        );

        Ok(ScanIter {
            items: Items::new(Pages::new(
                self.client().clone(),
                PageRequest::Scan(request),
                options.limit,
                options.page_size,
            )),
            table: table.to_string(),
            schema,
            key_properties,
        })
    }
}

/// A lazily paginated scan. Mirrors QueryIter, adding the per-segment state
/// used by the parallel scan coordinator.
pub struct ScanIter {
    items: Items,
    table: String,
    schema: Arc<Schema>,
    key_properties: Vec<String>,
}

impl ScanIter {
    pub async fn next(&mut self) -> Option<crate::Result<Object>> {
        match self.items.next().await? {
            Ok(item) => Some(to_object(&self.table, &self.schema, &item)),
            Err(err) => Some(Err(err.into())),
        }
    }

    /// Whole-page iteration.
    pub fn pages(self) -> ScanPages {
        ScanPages {
            pages: self.items.pages,
            table: self.table,
            schema: self.schema,
        }
    }

    pub fn count(&self) -> u64 {
        self.items.pages.count()
    }
    pub fn scanned_count(&self) -> u64 {
        self.items.pages.scanned_count()
    }
    pub fn consumed_capacity(&self) -> f64 {
        self.items.pages.consumed_capacity()
    }

    /// The resumption cursor, unmarshalled per the scan's schema.
    pub fn last_evaluated_key(&self) -> Option<serde_json::Value> {
        let key = self.items.last_evaluated_key(&self.key_properties)?;
        marshal::unmarshal_item(&self.schema, &key).ok()
    }

    /// This worker's resumable state, for `ParallelScan::scan_state`.
    pub(crate) fn segment_state(&self) -> crate::SegmentState {
        if !self.items.pages.started() {
            crate::SegmentState::Uninitialized
        } else {
            crate::SegmentState::Initialized {
                last_evaluated_key: self.last_evaluated_key(),
            }
        }
    }

    pub fn into_stream(self) -> impl futures::Stream<Item = crate::Result<Object>> {
        futures::stream::unfold(self, |mut iter| async move {
            let item = iter.next().await?;
            Some((item, iter))
        })
    }
}

pub struct ScanPages {
    pages: Pages,
    table: String,
    schema: Arc<Schema>,
}

impl ScanPages {
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

    pub fn last_evaluated_key(&self) -> Option<serde_json::Value> {
        let key = self.pages.last_evaluated_key()?;
        marshal::unmarshal_item(&self.schema, key).ok()
    }
}
