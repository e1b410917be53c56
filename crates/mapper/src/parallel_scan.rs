use crate::scan::{ScanIter, ScanOptions};
use crate::{Error, Mapper};
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use marshal::{Model, Object, Schema};
use std::sync::Arc;

const MAX_SEGMENTS: u32 = 1_000_000;

/// The resumable state of one scan segment. A segment that was initialized
/// and carries no continuation key is complete and issues no further RPCs.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SegmentState {
    Uninitialized,
    Initialized {
        last_evaluated_key: Option<serde_json::Value>,
    },
}

impl Mapper {
    /// Scan M's table with `segments` parallel workers, merging their
    /// outputs as they arrive. Pass a previously captured `scan_state` to
    /// resume each segment from where it left off.
    pub fn parallel_scan<M: Model>(
        &self,
        segments: u32,
        options: ScanOptions,
        scan_state: Option<Vec<SegmentState>>,
    ) -> crate::Result<ParallelScan> {
        self.parallel_scan_table(M::table_name(), M::schema(), segments, options, scan_state)
    }

    /// As `parallel_scan`, for a dynamically provided table and schema.
    pub fn parallel_scan_table(
        &self,
        table: &str,
        schema: Arc<Schema>,
        segments: u32,
        options: ScanOptions,
        scan_state: Option<Vec<SegmentState>>,
    ) -> crate::Result<ParallelScan> {
        if segments == 0 || segments > MAX_SEGMENTS {
            return Err(Error::InvalidSegmentCount(segments));
        }
        if let Some(scan_state) = &scan_state {
            if scan_state.len() != segments as usize {
                return Err(Error::InvalidScanState {
                    expected: segments as usize,
                    actual: scan_state.len(),
                });
            }
        }

        let pending = FuturesUnordered::new();
        let mut states = Vec::with_capacity(segments as usize);

        for segment in 0..segments {
            let entry = scan_state
                .as_ref()
                .map(|state| state[segment as usize].clone())
                .unwrap_or(SegmentState::Uninitialized);

            let mut segment_options = options.clone();
            match &entry {
                // Initialized without a continuation: the segment is
                // complete and must not issue further RPCs.
                SegmentState::Initialized {
                    last_evaluated_key: None,
                } => {
                    states.push(entry);
                    continue;
                }
                SegmentState::Initialized {
                    last_evaluated_key: Some(key),
                } => {
                    segment_options.start_key = Some(key.clone());
                }
                SegmentState::Uninitialized => (),
            }

            let iter = self.scan_segment(
                table,
                schema.clone(),
                segment_options,
                Some((segment, segments)),
            )?;
            states.push(entry);
            pending.push(advance(segment as usize, iter));
        }

        tracing::debug!(table, segments, "starting parallel scan");
        Ok(ParallelScan { pending, states })
    }
}

/// Move the segment cursor into its own future so every segment's `next()`
/// can be raced in one FuturesUnordered; the cursor rides along and comes
/// back with the result.
fn advance(
    segment: usize,
    mut iter: ScanIter,
) -> BoxFuture<'static, (usize, ScanIter, Option<crate::Result<Object>>)> {
    async move {
        let item = iter.next().await;
        (segment, iter, item)
    }
    .boxed()
}

/// ParallelScan races N segmented scan workers and yields items in arrival
/// order, which is non-deterministic across segments.
pub struct ParallelScan {
    pending: FuturesUnordered<BoxFuture<'static, (usize, ScanIter, Option<crate::Result<Object>>)>>,
    states: Vec<SegmentState>,
}

impl std::fmt::Debug for ParallelScan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelScan")
            .field("states", &self.states)
            .finish()
    }
}

impl ParallelScan {
    pub async fn next(&mut self) -> Option<crate::Result<Object>> {
        while let Some((segment, iter, item)) = self.pending.next().await {
            self.states[segment] = iter.segment_state();

            match item {
                Some(item) => {
                    self.pending.push(advance(segment, iter));
                    return Some(item);
                }
                // Terminal: the segment leaves the pending set.
                None => tracing::trace!(segment, "scan segment complete"),
            }
        }
        None
    }

    /// A snapshot of per-segment resumable state, indexed by segment.
    pub fn scan_state(&self) -> Vec<SegmentState> {
        self.states.clone()
    }

    pub fn into_stream(self) -> impl futures::Stream<Item = crate::Result<Object>> {
        futures::stream::unfold(self, |mut scan| async move {
            let item = scan.next().await?;
            Some((item, scan))
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{MockClient, Widget};
    use serde_json::json;
    use store::AttributeValue;

    fn item_of(id: &str) -> store::AttributeMap {
        [("id".to_string(), AttributeValue::S(id.to_string()))]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn test_merges_all_segments() {
        // Each segment serves one item, then completes.
        let client = Arc::new(MockClient::new().on_scan(|req| {
            let segment = req.segment.unwrap();
            Ok(store::ScanResponse {
                items: vec![item_of(&format!("item-{segment}"))],
                count: 1,
                scanned_count: 1,
                ..Default::default()
            })
        }));
        let mapper = Mapper::new(client.clone());

        let mut scan = mapper
            .parallel_scan::<Widget>(3, ScanOptions::default(), None)
            .unwrap();

        let mut ids = Vec::new();
        while let Some(object) = scan.next().await {
            ids.push(object.unwrap().typed::<Widget>().unwrap().id);
        }
        ids.sort();
        assert_eq!(ids, vec!["item-0", "item-1", "item-2"]);

        // Each segment carried its (segment, total) pair.
        let mut segments: Vec<_> = client
            .requests_of("Scan")
            .iter()
            .map(|req| (req["Segment"].clone(), req["TotalSegments"].clone()))
            .collect();
        segments.sort_by_key(|(segment, _)| segment.as_u64());
        assert_eq!(
            segments,
            vec![
                (json!(0), json!(3)),
                (json!(1), json!(3)),
                (json!(2), json!(3)),
            ],
        );

        // All segments ran to completion.
        assert_eq!(
            scan.scan_state(),
            vec![
                SegmentState::Initialized { last_evaluated_key: None };
                3
            ],
        );
    }

    #[tokio::test]
    async fn test_resumption_skips_complete_segments() {
        let client = Arc::new(MockClient::new());
        let mapper = Mapper::new(client.clone());

        let scan_state = vec![
            // Complete: no RPC may be issued.
            SegmentState::Initialized {
                last_evaluated_key: None,
            },
            // Mid-segment: resumes from the captured key.
            SegmentState::Initialized {
                last_evaluated_key: Some(json!({"id": "resume-here"})),
            },
            // Never started: begins from the segment start.
            SegmentState::Uninitialized,
        ];

        let mut scan = mapper
            .parallel_scan::<Widget>(3, ScanOptions::default(), Some(scan_state))
            .unwrap();
        while let Some(object) = scan.next().await {
            object.unwrap();
        }

        let mut requests = client.requests_of("Scan");
        requests.sort_by_key(|req| req["Segment"].as_u64());
        assert_eq!(requests.len(), 2);

        assert_eq!(requests[0]["Segment"], json!(1));
        assert_eq!(
            requests[0]["ExclusiveStartKey"],
            json!({"id": {"S": "resume-here"}}),
        );
        assert_eq!(requests[1]["Segment"], json!(2));
        assert!(requests[1].get("ExclusiveStartKey").is_none());
    }

    #[tokio::test]
    async fn test_segment_count_validation() {
        let mapper = Mapper::new(Arc::new(MockClient::new()));

        assert!(matches!(
            mapper
                .parallel_scan::<Widget>(0, ScanOptions::default(), None)
                .unwrap_err(),
            Error::InvalidSegmentCount(0),
        ));
        assert!(matches!(
            mapper
                .parallel_scan::<Widget>(2, ScanOptions::default(), Some(Vec::new()))
                .unwrap_err(),
            Error::InvalidScanState {
                expected: 2,
                actual: 0,
            },
        ));
    }

    #[tokio::test]
    async fn test_capture_and_resume_mid_scan() {
        // Segment 0 has two pages; segment 1 completes immediately.
        let client = Arc::new(MockClient::new().on_scan(|req| {
            let segment = req.segment.unwrap();
            if segment == 0 && req.exclusive_start_key.is_none() {
                Ok(store::ScanResponse {
                    items: vec![item_of("a")],
                    count: 1,
                    scanned_count: 1,
                    last_evaluated_key: Some(item_of("a")),
                    ..Default::default()
                })
            } else {
                Ok(store::ScanResponse::default())
            }
        }));
        let mapper = Mapper::new(client.clone());

        let mut scan = mapper
            .parallel_scan::<Widget>(2, ScanOptions::default(), None)
            .unwrap();

        // Consume the one item of segment 0's first page.
        let first = scan.next().await.unwrap().unwrap();
        assert_eq!(first.typed::<Widget>().unwrap().id, "a");

        // Segment 0 is mid-flight with a continuation key.
        let state = scan.scan_state();
        assert_eq!(
            state[0],
            SegmentState::Initialized {
                last_evaluated_key: Some(json!({"id": "a"})),
            },
        );

        // Relaunching from the captured state resumes segment 0 exactly at
        // the captured key.
        drop(scan);
        let mut resumed = mapper
            .parallel_scan::<Widget>(2, ScanOptions::default(), Some(state))
            .unwrap();
        while let Some(object) = resumed.next().await {
            object.unwrap();
        }

        let resumed_requests: Vec<_> = client
            .requests_of("Scan")
            .into_iter()
            .filter(|req| req.get("ExclusiveStartKey").is_some())
            .collect();
        assert_eq!(resumed_requests.len(), 1);
        assert_eq!(
            resumed_requests[0]["ExclusiveStartKey"],
            json!({"id": {"S": "a"}}),
        );
    }
}
