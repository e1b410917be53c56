use crate::rpc::*;

/// StoreClient is the typed RPC surface the mapper drives.
///
/// Implementations are expected to be cheaply shareable (the mapper holds an
/// `Arc<dyn StoreClient>`) and safe under one in-flight call per operation
/// stream. Retry of throttled batch elements is the caller's concern, not the
/// client's; a client surfaces every non-2xx outcome as an error.
#[async_trait::async_trait]
pub trait StoreClient: Send + Sync {
    async fn get_item(&self, req: GetItemRequest) -> crate::Result<GetItemResponse>;
    async fn put_item(&self, req: PutItemRequest) -> crate::Result<PutItemResponse>;
    async fn delete_item(&self, req: DeleteItemRequest) -> crate::Result<DeleteItemResponse>;
    async fn update_item(&self, req: UpdateItemRequest) -> crate::Result<UpdateItemResponse>;
    async fn query(&self, req: QueryRequest) -> crate::Result<QueryResponse>;
    async fn scan(&self, req: ScanRequest) -> crate::Result<ScanResponse>;
    async fn batch_get_item(&self, req: BatchGetRequest) -> crate::Result<BatchGetResponse>;
    async fn batch_write_item(&self, req: BatchWriteRequest) -> crate::Result<BatchWriteResponse>;
}
