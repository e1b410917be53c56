mod client;
mod http;
mod rpc;
mod value;

pub use client::StoreClient;
pub use http::{ClientConfig, HttpClient};
pub use rpc::{
    BatchGetRequest, BatchGetResponse, BatchWriteRequest, BatchWriteResponse, ConsumedCapacity,
    DeleteItemRequest, DeleteItemResponse, DeleteRequest, GetItemRequest, GetItemResponse,
    KeysAndAttributes, PutItemRequest, PutItemResponse, PutRequest, QueryRequest, QueryResponse,
    ScanRequest, ScanResponse, UpdateItemRequest, UpdateItemResponse, WriteRequest,
};
pub use value::AttributeValue;

/// AttributeMap is a marshalled item: physical attribute name to tagged value.
/// BTreeMap keeps attribute ordering stable across serializations.
pub type AttributeMap = std::collections::BTreeMap<String, AttributeValue>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid store endpoint: '{0}'")]
    InvalidEndpoint(String),
    #[error("invalid authorization token")]
    InvalidAuthToken,
    #[error("failed to send {op} request")]
    Http {
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{op} failed ({status}): {kind}: {message}")]
    Api {
        op: &'static str,
        status: u16,
        kind: String,
        message: String,
    },
    #[error("failed to decode {op} response")]
    Decode {
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
