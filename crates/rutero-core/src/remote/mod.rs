//! Remote backend boundary.
//!
//! The sync coordinator only sees the [`RemoteClient`] trait; the reqwest
//! implementation lives in [`http`] and tests script a mock instead.

pub mod http;
pub mod payload;

use async_trait::async_trait;

use crate::error::Result;

pub use http::HttpRemoteClient;
pub use payload::{
    parse_payload, CatalogDelta, CatalogSnapshot, ClientCreate, ClientPushResult, ClientUpdate,
    ClientsPayload, HistoryPayload, OrderUpload, OrderUploadItem, OrderUploadResult,
    RemoteClientRecord, RemoteHistoryItem, RemoteHistoryOrder, RemoteProduct, UploadReport,
    Validated,
};

/// Everything the sync pipeline needs from the backend.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Full catalog snapshot, including inactive records so they can be
    /// deleted locally.
    async fn fetch_full_catalog(&self) -> Result<CatalogSnapshot>;

    /// Catalog records changed since the given watermark.
    async fn fetch_catalog_delta(&self, since: &str) -> Result<CatalogDelta>;

    /// All clients currently assigned to the authenticated agent.
    async fn fetch_assigned_clients(&self) -> Result<ClientsPayload>;

    /// Client records changed since the given watermark, including
    /// `_removed` tombstones for reassigned clients.
    async fn fetch_client_delta(&self, since: &str) -> Result<ClientsPayload>;

    /// The agent's order history as the remote knows it.
    async fn fetch_order_history(&self) -> Result<HistoryPayload>;

    /// Upload a batch of pending orders. The report carries one result per
    /// order, correlated by `created_at_offline`.
    async fn upload_orders(&self, orders: &[OrderUpload]) -> Result<UploadReport>;

    /// Push a locally-created client; a successful result carries the
    /// remote-issued id.
    async fn create_client(&self, client: &ClientCreate) -> Result<ClientPushResult>;

    /// Push edits to a remote-owned client.
    async fn update_client(&self, id: &str, update: &ClientUpdate) -> Result<ClientPushResult>;
}
