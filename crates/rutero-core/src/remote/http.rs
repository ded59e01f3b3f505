//! reqwest-backed [`RemoteClient`].
//!
//! All endpoints hang off one normalized base URL and authenticate with a
//! bearer token. Non-2xx responses are surfaced as
//! [`Error::RemoteRejected`] with the server's message when the body
//! carries one.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{Error, Result};

use super::payload::{
    CatalogDelta, CatalogSnapshot, ClientCreate, ClientPushResult, ClientUpdate, ClientsPayload,
    HistoryPayload, OrderUpload, UploadReport,
};
use super::RemoteClient;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct HttpRemoteClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemoteClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteClient")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpRemoteClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            token: token.into(),
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await?;
        decode(response).await
    }

    async fn post_json<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;
        decode(response).await
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn fetch_full_catalog(&self) -> Result<CatalogSnapshot> {
        self.get_json("sync/catalog").await
    }

    async fn fetch_catalog_delta(&self, since: &str) -> Result<CatalogDelta> {
        self.get_json(&format!("sync/changes?since={since}")).await
    }

    async fn fetch_assigned_clients(&self) -> Result<ClientsPayload> {
        self.get_json("sync/clients").await
    }

    async fn fetch_client_delta(&self, since: &str) -> Result<ClientsPayload> {
        self.get_json(&format!("sync/client-changes?since={since}"))
            .await
    }

    async fn fetch_order_history(&self) -> Result<HistoryPayload> {
        self.get_json("sync/orders").await
    }

    async fn upload_orders(&self, orders: &[OrderUpload]) -> Result<UploadReport> {
        self.post_json("sync/upload-orders", &orders).await
    }

    async fn create_client(&self, client: &ClientCreate) -> Result<ClientPushResult> {
        self.post_json("sync/create-client", client).await
    }

    async fn update_client(&self, id: &str, update: &ClientUpdate) -> Result<ClientPushResult> {
        #[derive(serde::Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            client_id: &'a str,
            updates: &'a ClientUpdate,
        }
        self.post_json(
            "sync/update-client",
            &Body {
                client_id: id,
                updates: update,
            },
        )
        .await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::RemoteRejected(parse_api_error(status, &body)));
    }
    let body = response.text().await?;
    super::payload::parse_payload(&body)
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("base URL must not be empty".to_string()));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}
