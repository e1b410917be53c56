//! A scripted StoreClient for engine and façade tests: every RPC is recorded
//! as serialized JSON, and per-operation responders script the responses.

use std::sync::Mutex;
use store::*;

type Responder<Req, Resp> = Mutex<Box<dyn FnMut(&Req) -> store::Result<Resp> + Send>>;

fn responder<Req, Resp>(
    f: impl FnMut(&Req) -> store::Result<Resp> + Send + 'static,
) -> Responder<Req, Resp> {
    Mutex::new(Box::new(f))
}

pub(crate) struct MockClient {
    requests: Mutex<Vec<(&'static str, serde_json::Value)>>,
    on_get: Responder<GetItemRequest, GetItemResponse>,
    on_put: Responder<PutItemRequest, PutItemResponse>,
    on_delete: Responder<DeleteItemRequest, DeleteItemResponse>,
    on_update: Responder<UpdateItemRequest, UpdateItemResponse>,
    on_query: Responder<QueryRequest, QueryResponse>,
    on_scan: Responder<ScanRequest, ScanResponse>,
    on_batch_get: Responder<BatchGetRequest, BatchGetResponse>,
    on_batch_write: Responder<BatchWriteRequest, BatchWriteResponse>,
}

impl Default for MockClient {
    fn default() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            on_get: responder(|_| Ok(GetItemResponse::default())),
            on_put: responder(|_| Ok(PutItemResponse::default())),
            on_delete: responder(|_| Ok(DeleteItemResponse::default())),
            on_update: responder(|_| Ok(UpdateItemResponse::default())),
            on_query: responder(|_| Ok(QueryResponse::default())),
            on_scan: responder(|_| Ok(ScanResponse::default())),
            // By default, a batch read finds every requested key, echoing
            // the key attributes as the item.
            on_batch_get: responder(|req: &BatchGetRequest| {
                let responses = req
                    .request_items
                    .iter()
                    .map(|(table, keys)| (table.clone(), keys.keys.clone()))
                    .collect();
                Ok(BatchGetResponse {
                    responses,
                    ..Default::default()
                })
            }),
            on_batch_write: responder(|_| Ok(BatchWriteResponse::default())),
        }
    }
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_get(
        self,
        f: impl FnMut(&GetItemRequest) -> store::Result<GetItemResponse> + Send + 'static,
    ) -> Self {
        Self {
            on_get: responder(f),
            ..self
        }
    }

    pub fn on_put(
        self,
        f: impl FnMut(&PutItemRequest) -> store::Result<PutItemResponse> + Send + 'static,
    ) -> Self {
        Self {
            on_put: responder(f),
            ..self
        }
    }

    pub fn on_delete(
        self,
        f: impl FnMut(&DeleteItemRequest) -> store::Result<DeleteItemResponse> + Send + 'static,
    ) -> Self {
        Self {
            on_delete: responder(f),
            ..self
        }
    }

    pub fn on_update(
        self,
        f: impl FnMut(&UpdateItemRequest) -> store::Result<UpdateItemResponse> + Send + 'static,
    ) -> Self {
        Self {
            on_update: responder(f),
            ..self
        }
    }

    pub fn on_query(
        self,
        f: impl FnMut(&QueryRequest) -> store::Result<QueryResponse> + Send + 'static,
    ) -> Self {
        Self {
            on_query: responder(f),
            ..self
        }
    }

    pub fn on_scan(
        self,
        f: impl FnMut(&ScanRequest) -> store::Result<ScanResponse> + Send + 'static,
    ) -> Self {
        Self {
            on_scan: responder(f),
            ..self
        }
    }

    pub fn on_batch_get(
        self,
        f: impl FnMut(&BatchGetRequest) -> store::Result<BatchGetResponse> + Send + 'static,
    ) -> Self {
        Self {
            on_batch_get: responder(f),
            ..self
        }
    }

    pub fn on_batch_write(
        self,
        f: impl FnMut(&BatchWriteRequest) -> store::Result<BatchWriteResponse> + Send + 'static,
    ) -> Self {
        Self {
            on_batch_write: responder(f),
            ..self
        }
    }

    /// Every request sent, as (operation, serialized request) pairs.
    pub fn requests(&self) -> Vec<(&'static str, serde_json::Value)> {
        self.requests.lock().unwrap().clone()
    }

    /// Serialized requests of one operation.
    pub fn requests_of(&self, op: &str) -> Vec<serde_json::Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| *name == op)
            .map(|(_, request)| request.clone())
            .collect()
    }

    fn call<Req: serde::Serialize, Resp>(
        &self,
        op: &'static str,
        responder: &Responder<Req, Resp>,
        req: Req,
    ) -> store::Result<Resp> {
        self.requests
            .lock()
            .unwrap()
            .push((op, serde_json::to_value(&req).unwrap()));
        let mut responder = responder.lock().unwrap();
        (*responder)(&req)
    }
}

#[async_trait::async_trait]
impl StoreClient for MockClient {
    async fn get_item(&self, req: GetItemRequest) -> store::Result<GetItemResponse> {
        self.call("GetItem", &self.on_get, req)
    }
    async fn put_item(&self, req: PutItemRequest) -> store::Result<PutItemResponse> {
        self.call("PutItem", &self.on_put, req)
    }
    async fn delete_item(&self, req: DeleteItemRequest) -> store::Result<DeleteItemResponse> {
        self.call("DeleteItem", &self.on_delete, req)
    }
    async fn update_item(&self, req: UpdateItemRequest) -> store::Result<UpdateItemResponse> {
        self.call("UpdateItem", &self.on_update, req)
    }
    async fn query(&self, req: QueryRequest) -> store::Result<QueryResponse> {
        self.call("Query", &self.on_query, req)
    }
    async fn scan(&self, req: ScanRequest) -> store::Result<ScanResponse> {
        self.call("Scan", &self.on_scan, req)
    }
    async fn batch_get_item(&self, req: BatchGetRequest) -> store::Result<BatchGetResponse> {
        self.call("BatchGetItem", &self.on_batch_get, req)
    }
    async fn batch_write_item(&self, req: BatchWriteRequest) -> store::Result<BatchWriteResponse> {
        self.call("BatchWriteItem", &self.on_batch_write, req)
    }
}

/// Route engine traces to the test writer when RUST_LOG is set.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A widget fixture shared across façade and engine tests.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub(crate) struct Widget {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

lazy_static::lazy_static! {
    static ref WIDGET_SCHEMA: std::sync::Arc<marshal::Schema> = std::sync::Arc::new(
        marshal::Schema::new()
            .with("id", marshal::SchemaType::string().hash_key())
            .with("version", marshal::SchemaType::number().version())
            .with("note", marshal::SchemaType::string()),
    );
}

impl marshal::Model for Widget {
    fn schema() -> std::sync::Arc<marshal::Schema> {
        WIDGET_SCHEMA.clone()
    }
    fn table_name() -> &'static str {
        "widgets"
    }
}

impl Widget {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            version: None,
            note: None,
        }
    }
}
