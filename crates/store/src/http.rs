use crate::rpc::*;
use crate::{Error, StoreClient};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// ClientConfig configures an HttpClient.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ClientConfig {
    /// Base endpoint of the store, e.g. "https://store.us-east-1.example.com".
    pub endpoint: String,
    /// Optional bearer token attached to every request.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Optional per-request deadline, in seconds. No deadline by default;
    /// batch retry timing is the engine's concern, not the transport's.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// The `<package>/<version>` identity sent as the user agent. Callers
    /// supply their own package metadata here (e.g. `mapper::USER_AGENT`);
    /// absent, the transport identifies itself.
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// HttpClient speaks the store's JSON-over-HTTP dialect: one POST per RPC,
/// with the operation named by a target header.
#[derive(Clone, Debug)]
pub struct HttpClient {
    http: reqwest::Client,
    endpoint: url::Url,
}

const TARGET_HEADER: &str = "x-amz-target";
const TARGET_PREFIX: &str = "DynamoDB_20120810.";
const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

impl HttpClient {
    pub fn new(config: ClientConfig) -> crate::Result<Self> {
        let endpoint: url::Url = config
            .endpoint
            .parse()
            .map_err(|_| Error::InvalidEndpoint(config.endpoint.clone()))?;

        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = &config.auth_token {
            let header = format!("Bearer {token}")
                .parse()
                .map_err(|_| Error::InvalidAuthToken)?;
            headers.insert(reqwest::header::AUTHORIZATION, header);
        }

        // The user agent names the calling library. env! resolves against
        // this crate, so a caller identity must arrive via config; the
        // transport's own is only the fallback.
        let user_agent = config.user_agent.as_deref().unwrap_or(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        let mut builder = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers);
        if let Some(seconds) = config.timeout_seconds {
            builder = builder.timeout(std::time::Duration::from_secs(seconds));
        }
        let http = builder
            .build()
            .expect("reqwest client construction does not fail with static configuration");

        Ok(Self { http, endpoint })
    }

    async fn call<Req, Resp>(&self, op: &'static str, req: &Req) -> crate::Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        tracing::trace!(op, "sending store rpc");

        let response = self
            .http
            .post(self.endpoint.clone())
            .header(TARGET_HEADER, format!("{TARGET_PREFIX}{op}"))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(req)
            .send()
            .await
            .map_err(|source| Error::Http { op, source })?;

        let status = response.status();
        if !status.is_success() {
            // Error bodies carry a namespaced kind and a human message.
            #[derive(serde::Deserialize, Default)]
            struct ErrorBody {
                #[serde(rename = "__type", default)]
                kind: String,
                #[serde(default, alias = "Message")]
                message: String,
            }
            let body: ErrorBody = response.json().await.unwrap_or_default();

            return Err(Error::Api {
                op,
                status: status.as_u16(),
                kind: body
                    .kind
                    .rsplit('#')
                    .next()
                    .unwrap_or_default()
                    .to_string(),
                message: body.message,
            });
        }

        response
            .json()
            .await
            .map_err(|source| Error::Decode { op, source })
    }
}

#[async_trait::async_trait]
impl StoreClient for HttpClient {
    async fn get_item(&self, req: GetItemRequest) -> crate::Result<GetItemResponse> {
        self.call("GetItem", &req).await
    }

    async fn put_item(&self, req: PutItemRequest) -> crate::Result<PutItemResponse> {
        self.call("PutItem", &req).await
    }

    async fn delete_item(&self, req: DeleteItemRequest) -> crate::Result<DeleteItemResponse> {
        self.call("DeleteItem", &req).await
    }

    async fn update_item(&self, req: UpdateItemRequest) -> crate::Result<UpdateItemResponse> {
        self.call("UpdateItem", &req).await
    }

    async fn query(&self, req: QueryRequest) -> crate::Result<QueryResponse> {
        self.call("Query", &req).await
    }

    async fn scan(&self, req: ScanRequest) -> crate::Result<ScanResponse> {
        self.call("Scan", &req).await
    }

    async fn batch_get_item(&self, req: BatchGetRequest) -> crate::Result<BatchGetResponse> {
        self.call("BatchGetItem", &req).await
    }

    async fn batch_write_item(&self, req: BatchWriteRequest) -> crate::Result<BatchWriteResponse> {
        self.call("BatchWriteItem", &req).await
    }
}
