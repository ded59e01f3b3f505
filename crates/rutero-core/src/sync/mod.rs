//! Sync pipeline: catalog pulls, client push/pull, order upload, watermark
//! bookkeeping.
//!
//! A pass is a fixed sequence of steps. Push happens before pull so a
//! locally-edited record can never be clobbered by a stale copy of itself
//! coming back down. The incremental watermark only advances once the
//! whole pass has applied, which makes an interrupted pass safe: the next
//! one re-pulls the same window and every apply is idempotent.

pub mod connectivity;

pub use connectivity::ConnectivityMonitor;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{ClientRepository, ConfigRepository, Database, OrderRepository, ProductRepository};
use crate::error::{Error, Result};
use crate::images::ImageCache;
use crate::models::Client;
use crate::order_number::OrderNumberAllocator;
use crate::remote::payload::{
    ClientCreate, ClientUpdate, OrderUpload, OrderUploadItem, RemoteClientRecord, RemoteProduct,
    Validated,
};
use crate::remote::RemoteClient;

/// Progress messages surfaced to the UI while a pass runs.
pub type OnProgress<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Steps of an incremental pass, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    CheckingConnectivity,
    UploadingOrders,
    UploadingClients,
    PullingCatalogDelta,
    PullingClientDelta,
    PullingOrderHistory,
    AdvancingWatermark,
    Done,
}

impl SyncStep {
    pub const fn label(self) -> &'static str {
        match self {
            Self::CheckingConnectivity => "Checking connectivity",
            Self::UploadingOrders => "Uploading pending orders",
            Self::UploadingClients => "Uploading client changes",
            Self::PullingCatalogDelta => "Downloading catalog changes",
            Self::PullingClientDelta => "Downloading client changes",
            Self::PullingOrderHistory => "Downloading order history",
            Self::AdvancingWatermark => "Recording sync checkpoint",
            Self::Done => "Done",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub products_updated: usize,
    pub products_deleted: usize,
    pub clients_pushed: usize,
    pub clients_pulled: usize,
    pub orders_uploaded: usize,
    pub history_pulled: usize,
    pub images_cached: usize,
    pub images_failed: usize,
}

/// Result of one pass. Secondary sub-step failures never fail the pass,
/// they only show up as missing counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
    pub counts: SyncCounts,
}

impl SyncOutcome {
    fn failed(error: &Error, counts: SyncCounts) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            counts,
        }
    }
}

pub struct SyncCoordinator<R: RemoteClient> {
    db: Arc<Database>,
    remote: R,
    monitor: Arc<ConnectivityMonitor>,
    images: Option<ImageCache>,
    agent_number: String,
    // One pass at a time; a second caller waits behind the current pass.
    pass_guard: Mutex<()>,
}

impl<R: RemoteClient> SyncCoordinator<R> {
    pub fn new(
        db: Arc<Database>,
        remote: R,
        monitor: Arc<ConnectivityMonitor>,
        images: Option<ImageCache>,
        agent_number: impl Into<String>,
    ) -> Self {
        Self {
            db,
            remote,
            monitor,
            images,
            agent_number: agent_number.into(),
            pass_guard: Mutex::new(()),
        }
    }

    /// Full sync: complete catalog snapshot, then the shared client and
    /// history sub-steps. The watermark jumps to the snapshot timestamp.
    pub async fn run_full_sync(&self, on_progress: Option<OnProgress<'_>>) -> SyncOutcome {
        let _pass = self.pass_guard.lock().await;
        let mut counts = SyncCounts::default();
        match self.full_sync(on_progress, &mut counts).await {
            Ok(message) => SyncOutcome {
                success: true,
                message,
                counts,
            },
            Err(e) => {
                tracing::error!("Full sync failed: {e}");
                SyncOutcome::failed(&e, counts)
            }
        }
    }

    /// Incremental sync since the last watermark. With no watermark
    /// recorded (first run, or after a reset) this is a full sync.
    pub async fn run_incremental_sync(&self, on_progress: Option<OnProgress<'_>>) -> SyncOutcome {
        let _pass = self.pass_guard.lock().await;
        let mut counts = SyncCounts::default();
        match self.incremental_sync(on_progress, &mut counts).await {
            Ok(message) => SyncOutcome {
                success: true,
                message,
                counts,
            },
            Err(e) => {
                tracing::error!("Incremental sync failed: {e}");
                SyncOutcome::failed(&e, counts)
            }
        }
    }

    /// Upload pending orders only, without touching catalog or clients.
    pub async fn run_order_upload(&self, on_progress: Option<OnProgress<'_>>) -> SyncOutcome {
        let _pass = self.pass_guard.lock().await;
        let mut counts = SyncCounts::default();
        if !self.monitor.is_online() {
            return SyncOutcome::failed(&Error::NoConnectivity, counts);
        }
        match self.upload_pending_orders(on_progress, &mut counts).await {
            Ok(()) => SyncOutcome {
                success: true,
                message: format!("{} orders uploaded", counts.orders_uploaded),
                counts,
            },
            Err(e) => {
                tracing::error!("Order upload failed: {e}");
                SyncOutcome::failed(&e, counts)
            }
        }
    }

    /// Run a full sync in the background whenever connectivity comes back.
    pub fn spawn_auto_sync(self: &Arc<Self>) -> tokio::task::JoinHandle<()>
    where
        R: 'static,
    {
        let coordinator = Arc::clone(self);
        let mut rx = coordinator.monitor.subscribe();
        tokio::spawn(async move {
            let mut was_online = *rx.borrow();
            while rx.changed().await.is_ok() {
                let online = *rx.borrow();
                if online && !was_online {
                    tracing::info!("Connectivity restored, starting automatic sync");
                    let outcome = coordinator.run_full_sync(None).await;
                    if !outcome.success {
                        tracing::warn!("Automatic sync failed: {}", outcome.message);
                    }
                }
                was_online = online;
            }
        })
    }

    async fn full_sync(
        &self,
        on_progress: Option<OnProgress<'_>>,
        counts: &mut SyncCounts,
    ) -> Result<String> {
        if !self.monitor.is_online() {
            return Err(Error::NoConnectivity);
        }

        progress(on_progress, "Downloading full catalog");
        let snapshot = self.remote.fetch_full_catalog().await?;
        if !snapshot.success {
            return Err(Error::RemoteRejected(
                "catalog fetch unsuccessful".to_string(),
            ));
        }

        progress(on_progress, "Applying products");
        let prefetch = self.apply_products(snapshot.products, false, counts)?;
        {
            let conn = self.db.lock();
            ConfigRepository::new(&conn).set_watermark(&snapshot.timestamp)?;
        }
        self.prefetch_images(prefetch, on_progress, counts).await;

        progress(on_progress, "Uploading client changes");
        let pushed = self.push_dirty_clients(counts).await?;

        progress(on_progress, "Downloading assigned clients");
        if let Err(e) = self.pull_assigned_clients(&pushed, counts).await {
            tracing::warn!("Assigned clients pull failed: {e}");
        }

        progress(on_progress, "Downloading order history");
        if let Err(e) = self.pull_order_history(counts).await {
            tracing::warn!("Order history pull failed: {e}");
        }

        Ok(format!(
            "Catalog synced: {} products updated, {} removed",
            counts.products_updated, counts.products_deleted
        ))
    }

    async fn incremental_sync(
        &self,
        on_progress: Option<OnProgress<'_>>,
        counts: &mut SyncCounts,
    ) -> Result<String> {
        progress(on_progress, SyncStep::CheckingConnectivity.label());
        if !self.monitor.is_online() {
            return Err(Error::NoConnectivity);
        }

        let since = {
            let conn = self.db.lock();
            ConfigRepository::new(&conn).watermark()?
        };
        let Some(since) = since else {
            tracing::info!("No sync watermark recorded, running full sync");
            return self.full_sync(on_progress, counts).await;
        };

        progress(on_progress, SyncStep::UploadingOrders.label());
        self.upload_pending_orders(on_progress, counts).await?;

        progress(on_progress, SyncStep::UploadingClients.label());
        let pushed = self.push_dirty_clients(counts).await?;

        progress(on_progress, SyncStep::PullingCatalogDelta.label());
        let delta = self.remote.fetch_catalog_delta(&since).await?;
        if !delta.success {
            return Err(Error::RemoteRejected(
                "catalog delta fetch unsuccessful".to_string(),
            ));
        }
        let prefetch = self.apply_products(delta.products, true, counts)?;
        self.prefetch_images(prefetch, on_progress, counts).await;

        progress(on_progress, SyncStep::PullingClientDelta.label());
        match self.remote.fetch_client_delta(&since).await {
            Ok(payload) if payload.success => {
                if let Err(e) = self.apply_client_records(payload.clients, &pushed, counts) {
                    tracing::warn!("Client delta apply failed: {e}");
                }
            }
            Ok(_) => tracing::warn!("Client delta fetch unsuccessful"),
            Err(e) => tracing::warn!("Client delta fetch failed: {e}"),
        }

        progress(on_progress, SyncStep::PullingOrderHistory.label());
        if let Err(e) = self.pull_order_history(counts).await {
            tracing::warn!("Order history pull failed: {e}");
        }

        progress(on_progress, SyncStep::AdvancingWatermark.label());
        {
            let conn = self.db.lock();
            ConfigRepository::new(&conn).set_watermark(&delta.timestamp)?;
        }

        progress(on_progress, SyncStep::Done.label());
        Ok(format!(
            "Sync complete: {} products, {} clients, {} orders uploaded",
            counts.products_updated, counts.clients_pulled, counts.orders_uploaded
        ))
    }

    /// Apply one batch of catalog records and return the image URLs worth
    /// prefetching. With `only_changed_images` set, a row whose stored
    /// `image` and `updated_at` are byte-identical contributes nothing.
    fn apply_products(
        &self,
        records: Vec<RemoteProduct>,
        only_changed_images: bool,
        counts: &mut SyncCounts,
    ) -> Result<Vec<String>> {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.db.lock();
        let repo = ProductRepository::new(&conn);
        let mut prefetch = Vec::new();

        for record in records {
            if record.is_inactive() {
                if let Some(id) = record.id.as_deref().filter(|id| !id.is_empty()) {
                    if repo.delete_by_remote_id(id)? {
                        counts.products_deleted += 1;
                    }
                }
                continue;
            }

            let product = match record.validate(&now) {
                Validated::Valid(product) => product,
                Validated::Invalid(reason) => {
                    tracing::warn!("Skipping malformed product record: {reason}");
                    continue;
                }
            };

            // Checked before the upsert rewrites the stored row.
            let wants_image = match product.image.as_deref() {
                None => false,
                Some(_) if !only_changed_images => true,
                Some(image) => repo.image_changed(&product.id, Some(image), &product.updated_at)?,
            };

            repo.upsert(&product)?;
            counts.products_updated += 1;
            if wants_image {
                if let Some(image) = product.image {
                    prefetch.push(image);
                }
            }
        }

        Ok(prefetch)
    }

    async fn prefetch_images(
        &self,
        urls: Vec<String>,
        on_progress: Option<OnProgress<'_>>,
        counts: &mut SyncCounts,
    ) {
        let Some(cache) = &self.images else { return };
        if urls.is_empty() {
            return;
        }
        progress(on_progress, &format!("Caching {} images", urls.len()));
        let report = cache.ensure_cached_batch(&urls, None).await;
        counts.images_cached += report.cached;
        counts.images_failed += report.failed;
    }

    /// Push every dirty client, one at a time, isolating failures so one
    /// rejected record cannot block the rest. Returns the ids pushed this
    /// pass; the pull sub-steps skip them so the push wins within the pass.
    async fn push_dirty_clients(&self, counts: &mut SyncCounts) -> Result<HashSet<String>> {
        let dirty = {
            let conn = self.db.lock();
            ClientRepository::new(&conn).dirty()?
        };
        let mut pushed = HashSet::new();

        for client in dirty {
            let result = if client.is_locally_created() {
                self.push_created_client(&client).await
            } else {
                self.push_updated_client(&client).await
            };
            match result {
                Ok(remote_id) => {
                    pushed.insert(client.id.clone());
                    if let Some(id) = remote_id {
                        pushed.insert(id);
                    }
                    counts.clients_pushed += 1;
                }
                Err(e) => tracing::warn!("Client push failed for {}: {e}", client.id),
            }
        }

        Ok(pushed)
    }

    /// Push a locally-created client to the create endpoint. When the
    /// remote issues its own id, the local timestamp-id row is replaced by
    /// a clean row under the remote id.
    async fn push_created_client(&self, client: &Client) -> Result<Option<String>> {
        let result = self
            .remote
            .create_client(&ClientCreate::from_client(client))
            .await?;
        if !result.success {
            return Err(Error::RemoteRejected(
                result
                    .message
                    .unwrap_or_else(|| "client create rejected".to_string()),
            ));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.db.lock();
        let repo = ClientRepository::new(&conn);
        match result.client_id.as_deref().filter(|id| !id.is_empty()) {
            Some(remote_id) => {
                let mut accepted = client.clone();
                accepted.id = remote_id.to_string();
                accepted.needs_sync = false;
                repo.adopt_remote_id(&client.id, &accepted, &now)?;
                Ok(Some(remote_id.to_string()))
            }
            None => {
                repo.mark_synced(&client.id, &now)?;
                Ok(None)
            }
        }
    }

    async fn push_updated_client(&self, client: &Client) -> Result<Option<String>> {
        let result = self
            .remote
            .update_client(&client.id, &ClientUpdate::from_client(client))
            .await?;
        if !result.success {
            return Err(Error::RemoteRejected(
                result
                    .message
                    .unwrap_or_else(|| "client update rejected".to_string()),
            ));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.db.lock();
        ClientRepository::new(&conn).mark_synced(&client.id, &now)?;
        Ok(None)
    }

    async fn pull_assigned_clients(
        &self,
        pushed: &HashSet<String>,
        counts: &mut SyncCounts,
    ) -> Result<()> {
        let payload = self.remote.fetch_assigned_clients().await?;
        if !payload.success {
            return Err(Error::RemoteRejected(
                "client fetch unsuccessful".to_string(),
            ));
        }
        self.apply_client_records(payload.clients, pushed, counts)
    }

    fn apply_client_records(
        &self,
        records: Vec<RemoteClientRecord>,
        pushed: &HashSet<String>,
        counts: &mut SyncCounts,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.db.lock();
        let repo = ClientRepository::new(&conn);

        for record in records {
            if record.removed {
                if let Some(id) = record.id.as_deref().filter(|id| !id.is_empty()) {
                    if repo.delete_by_id(id)? {
                        tracing::info!(client_id = %id, "Client removed by reassignment");
                        counts.clients_pulled += 1;
                    }
                }
                continue;
            }

            let client = match record.validate() {
                Validated::Valid(client) => client,
                Validated::Invalid(reason) => {
                    tracing::warn!("Skipping malformed client record: {reason}");
                    continue;
                }
            };

            // Already pushed this pass; the accepted state echoes back on
            // the next delta.
            if pushed.contains(&client.id) {
                continue;
            }

            if repo.upsert_from_remote(&client, &now)? {
                counts.clients_pulled += 1;
            }
        }

        Ok(())
    }

    async fn pull_order_history(&self, counts: &mut SyncCounts) -> Result<()> {
        let payload = self.remote.fetch_order_history().await?;
        if !payload.success {
            return Err(Error::RemoteRejected(
                "order history fetch unsuccessful".to_string(),
            ));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.db.lock();
        let repo = OrderRepository::new(&conn);
        for record in payload.orders {
            match record.validate(&now) {
                Validated::Valid((order, items)) => {
                    repo.upsert_history(&order, &items)?;
                    counts.history_pulled += 1;
                }
                Validated::Invalid(reason) => {
                    tracing::warn!("Skipping malformed history record: {reason}");
                }
            }
        }
        Ok(())
    }

    /// Upload every queued order, then promote each accepted one into
    /// history under a freshly allocated sent number. A rejected or
    /// unmatched result leaves its row in place for the next pass.
    async fn upload_pending_orders(
        &self,
        on_progress: Option<OnProgress<'_>>,
        counts: &mut SyncCounts,
    ) -> Result<()> {
        let uploads = {
            let conn = self.db.lock();
            let repo = OrderRepository::new(&conn);
            let orders = repo.pending_for_upload()?;
            let mut uploads = Vec::with_capacity(orders.len());
            for order in orders {
                let items = repo.pending_items(&order.id)?;
                uploads.push(OrderUpload {
                    client_id: order.client_id,
                    customer_note: order.customer_note,
                    items: items
                        .into_iter()
                        .map(|item| OrderUploadItem {
                            product_id: item.product_id,
                            quantity: item.quantity,
                            price_per_unit: item.price_per_unit,
                        })
                        .collect(),
                    created_at_offline: order.created_at,
                });
            }
            uploads
        };

        if uploads.is_empty() {
            return Ok(());
        }

        progress(on_progress, &format!("Uploading {} orders", uploads.len()));
        let report = self.remote.upload_orders(&uploads).await?;
        if !report.success {
            return Err(Error::RemoteRejected("order upload rejected".to_string()));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.db.lock();
        let repo = OrderRepository::new(&conn);
        for result in report.results {
            if !result.success {
                tracing::warn!(
                    "Order rejected by remote ({}): {}",
                    result.created_at_offline,
                    result.error.as_deref().unwrap_or("no reason given")
                );
                continue;
            }
            let Some(order) = repo.find_pending_by_created_at(&result.created_at_offline)? else {
                tracing::warn!(
                    "Upload result matches no pending order: {}",
                    result.created_at_offline
                );
                continue;
            };
            let sent_number =
                OrderNumberAllocator::new(&conn).next_sent_number(&self.agent_number);
            if let Err(e) = repo.promote(&order.id, &sent_number, &now) {
                tracing::warn!("Promotion failed for order {}: {e}", order.id);
                continue;
            }
            counts.orders_uploaded += 1;
        }
        Ok(())
    }
}

fn progress(on_progress: Option<OnProgress<'_>>, message: &str) {
    if let Some(callback) = on_progress {
        callback(message);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::{OrderStatus, PendingOrder, PendingOrderItem, STATUS_SENT};
    use crate::order_number::is_valid_sent_number;
    use crate::remote::payload::{
        CatalogDelta, CatalogSnapshot, ClientPushResult, ClientsPayload, HistoryPayload,
        UploadReport,
    };

    #[derive(Default)]
    struct ScriptedRemote {
        catalog: Option<CatalogSnapshot>,
        catalog_delta: Option<CatalogDelta>,
        clients: Option<ClientsPayload>,
        client_delta: Option<ClientsPayload>,
        history: Option<HistoryPayload>,
        upload_report: Option<UploadReport>,
        create_result: Option<ClientPushResult>,
        update_result: Option<ClientPushResult>,
        uploads_seen: StdMutex<Vec<Vec<OrderUpload>>>,
        creates_seen: StdMutex<Vec<ClientCreate>>,
        updates_seen: StdMutex<Vec<(String, ClientUpdate)>>,
    }

    fn scripted_failure() -> Error {
        Error::RemoteRejected("scripted failure".to_string())
    }

    #[async_trait]
    impl RemoteClient for ScriptedRemote {
        async fn fetch_full_catalog(&self) -> Result<CatalogSnapshot> {
            self.catalog.clone().ok_or_else(scripted_failure)
        }

        async fn fetch_catalog_delta(&self, _since: &str) -> Result<CatalogDelta> {
            self.catalog_delta.clone().ok_or_else(scripted_failure)
        }

        async fn fetch_assigned_clients(&self) -> Result<ClientsPayload> {
            self.clients.clone().ok_or_else(scripted_failure)
        }

        async fn fetch_client_delta(&self, _since: &str) -> Result<ClientsPayload> {
            self.client_delta.clone().ok_or_else(scripted_failure)
        }

        async fn fetch_order_history(&self) -> Result<HistoryPayload> {
            self.history.clone().ok_or_else(scripted_failure)
        }

        async fn upload_orders(&self, orders: &[OrderUpload]) -> Result<UploadReport> {
            self.uploads_seen.lock().unwrap().push(orders.to_vec());
            self.upload_report.clone().ok_or_else(scripted_failure)
        }

        async fn create_client(&self, client: &ClientCreate) -> Result<ClientPushResult> {
            self.creates_seen.lock().unwrap().push(client.clone());
            self.create_result.clone().ok_or_else(scripted_failure)
        }

        async fn update_client(
            &self,
            id: &str,
            update: &ClientUpdate,
        ) -> Result<ClientPushResult> {
            self.updates_seen
                .lock()
                .unwrap()
                .push((id.to_string(), update.clone()));
            self.update_result.clone().ok_or_else(scripted_failure)
        }
    }

    fn remote_product(id: &str, sku: &str) -> RemoteProduct {
        RemoteProduct {
            id: Some(id.to_string()),
            sku: Some(sku.to_string()),
            name: Some(format!("Product {sku}")),
            base_price: Some("10.00".to_string()),
            updated_at: Some("2024-05-01T00:00:00Z".to_string()),
            ..RemoteProduct::default()
        }
    }

    fn coordinator(
        remote: ScriptedRemote,
    ) -> (Arc<Database>, Arc<ConnectivityMonitor>, SyncCoordinator<ScriptedRemote>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let monitor = Arc::new(ConnectivityMonitor::new(true));
        let coordinator =
            SyncCoordinator::new(Arc::clone(&db), remote, Arc::clone(&monitor), None, "7");
        (db, monitor, coordinator)
    }

    fn pending_order(id: &str, created_at: &str) -> PendingOrder {
        PendingOrder {
            id: id.to_string(),
            client_id: Some("c1".to_string()),
            order_number: "A000000001".to_string(),
            status: OrderStatus::Pending.as_str().to_string(),
            subtotal: "25.00".to_string(),
            tax: "0.00".to_string(),
            total: "25.00".to_string(),
            created_at: created_at.to_string(),
            ..PendingOrder::default()
        }
    }

    fn pending_item(order_id: &str) -> PendingOrderItem {
        PendingOrderItem {
            id: format!("{order_id}-i1"),
            order_id: order_id.to_string(),
            product_id: "p1".to_string(),
            product_name: "Product OIL-01".to_string(),
            quantity: 2,
            price_per_unit: "12.50".to_string(),
            subtotal: "25.00".to_string(),
            custom_text: None,
            custom_select: None,
        }
    }

    #[tokio::test]
    async fn offline_fails_fast_without_touching_the_remote() {
        let (_db, monitor, coordinator) = coordinator(ScriptedRemote::default());
        monitor.set_online(false);

        let outcome = coordinator.run_full_sync(None).await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, Error::NoConnectivity.to_string());
        assert!(coordinator.remote.uploads_seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_sync_applies_products_and_advances_watermark() {
        let remote = ScriptedRemote {
            catalog: Some(CatalogSnapshot {
                success: true,
                timestamp: "2024-05-02T00:00:00Z".to_string(),
                products: vec![remote_product("p1", "OIL-01"), remote_product("p2", "OIL-02")],
            }),
            clients: Some(ClientsPayload {
                success: true,
                clients: vec![],
            }),
            history: Some(HistoryPayload {
                success: true,
                orders: vec![],
            }),
            ..ScriptedRemote::default()
        };
        let (db, _monitor, coordinator) = coordinator(remote);

        let outcome = coordinator.run_full_sync(None).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.counts.products_updated, 2);

        let conn = db.lock();
        assert_eq!(ProductRepository::new(&conn).count().unwrap(), 2);
        assert_eq!(
            ConfigRepository::new(&conn).watermark().unwrap().as_deref(),
            Some("2024-05-02T00:00:00Z")
        );
    }

    #[tokio::test]
    async fn catalog_apply_is_idempotent_and_deletes_inactive() {
        let inactive = RemoteProduct {
            is_active: Some(false),
            ..remote_product("p2", "OIL-02")
        };
        let remote = ScriptedRemote {
            catalog: Some(CatalogSnapshot {
                success: true,
                timestamp: "2024-05-02T00:00:00Z".to_string(),
                products: vec![remote_product("p1", "OIL-01"), inactive],
            }),
            clients: Some(ClientsPayload {
                success: true,
                clients: vec![],
            }),
            history: Some(HistoryPayload {
                success: true,
                orders: vec![],
            }),
            ..ScriptedRemote::default()
        };
        let (db, _monitor, coordinator) = coordinator(remote);

        // Seed the row the inactive record will delete.
        let mut counts = SyncCounts::default();
        coordinator
            .apply_products(vec![remote_product("p2", "OIL-02")], false, &mut counts)
            .unwrap();

        let first = coordinator.run_full_sync(None).await;
        assert!(first.success);
        assert_eq!(first.counts.products_deleted, 1);

        let second = coordinator.run_full_sync(None).await;
        assert!(second.success);
        assert_eq!(second.counts.products_updated, 1);
        assert_eq!(second.counts.products_deleted, 0);

        let conn = db.lock();
        assert_eq!(ProductRepository::new(&conn).count().unwrap(), 1);
    }

    #[tokio::test]
    async fn first_incremental_without_watermark_runs_full_sync() {
        let remote = ScriptedRemote {
            catalog: Some(CatalogSnapshot {
                success: true,
                timestamp: "2024-05-02T00:00:00Z".to_string(),
                products: vec![remote_product("p1", "OIL-01")],
            }),
            clients: Some(ClientsPayload {
                success: true,
                clients: vec![],
            }),
            history: Some(HistoryPayload {
                success: true,
                orders: vec![],
            }),
            ..ScriptedRemote::default()
        };
        let (db, _monitor, coordinator) = coordinator(remote);

        let outcome = coordinator.run_incremental_sync(None).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.counts.products_updated, 1);

        let conn = db.lock();
        assert_eq!(
            ConfigRepository::new(&conn).watermark().unwrap().as_deref(),
            Some("2024-05-02T00:00:00Z")
        );
    }

    #[tokio::test]
    async fn watermark_does_not_advance_when_catalog_delta_fails() {
        let remote = ScriptedRemote::default();
        let (db, _monitor, coordinator) = coordinator(remote);
        {
            let conn = db.lock();
            ConfigRepository::new(&conn)
                .set_watermark("2024-05-01T00:00:00Z")
                .unwrap();
        }

        let outcome = coordinator.run_incremental_sync(None).await;
        assert!(!outcome.success);

        let conn = db.lock();
        assert_eq!(
            ConfigRepository::new(&conn).watermark().unwrap().as_deref(),
            Some("2024-05-01T00:00:00Z")
        );
    }

    #[tokio::test]
    async fn order_upload_promotes_exactly_once() {
        let created_at = "2024-05-01T10:00:00.000Z";
        let remote = ScriptedRemote {
            upload_report: Some(UploadReport {
                success: true,
                results: vec![crate::remote::payload::OrderUploadResult {
                    success: true,
                    created_at_offline: created_at.to_string(),
                    order_id: Some("srv-1".to_string()),
                    error: None,
                }],
            }),
            ..ScriptedRemote::default()
        };
        let (db, _monitor, coordinator) = coordinator(remote);
        {
            let conn = db.lock();
            OrderRepository::new(&conn)
                .create_pending(&pending_order("o1", created_at), &[pending_item("o1")])
                .unwrap();
        }

        let outcome = coordinator.run_order_upload(None).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.counts.orders_uploaded, 1);

        {
            let conn = db.lock();
            let repo = OrderRepository::new(&conn);
            assert_eq!(repo.pending_count().unwrap(), 0);
            let history = repo.history().unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].status, STATUS_SENT);
            assert_eq!(history[0].order_number, "7B00000001");
            assert!(is_valid_sent_number(&history[0].order_number));
        }

        // Nothing left to upload; a second pass must not duplicate history.
        let again = coordinator.run_order_upload(None).await;
        assert!(again.success);
        assert_eq!(again.counts.orders_uploaded, 0);

        let conn = db.lock();
        assert_eq!(OrderRepository::new(&conn).history().unwrap().len(), 1);
        assert_eq!(coordinator.remote.uploads_seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejected_order_stays_queued_for_retry() {
        let created_at = "2024-05-01T10:00:00.000Z";
        let remote = ScriptedRemote {
            upload_report: Some(UploadReport {
                success: true,
                results: vec![crate::remote::payload::OrderUploadResult {
                    success: false,
                    created_at_offline: created_at.to_string(),
                    order_id: None,
                    error: Some("client over credit limit".to_string()),
                }],
            }),
            ..ScriptedRemote::default()
        };
        let (db, _monitor, coordinator) = coordinator(remote);
        {
            let conn = db.lock();
            OrderRepository::new(&conn)
                .create_pending(&pending_order("o1", created_at), &[pending_item("o1")])
                .unwrap();
        }

        let outcome = coordinator.run_order_upload(None).await;
        assert!(outcome.success);
        assert_eq!(outcome.counts.orders_uploaded, 0);

        let conn = db.lock();
        let repo = OrderRepository::new(&conn);
        assert_eq!(repo.pending_count().unwrap(), 1);
        assert!(repo.history().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dirty_client_is_pushed_and_not_overwritten_by_the_delta() {
        let remote = ScriptedRemote {
            catalog_delta: Some(CatalogDelta {
                success: true,
                timestamp: "2024-05-03T00:00:00Z".to_string(),
                products: vec![],
            }),
            client_delta: Some(ClientsPayload {
                success: true,
                clients: vec![RemoteClientRecord {
                    id: Some("cl_remote_1".to_string()),
                    name: Some("Stale Server Name".to_string()),
                    ..RemoteClientRecord::default()
                }],
            }),
            history: Some(HistoryPayload {
                success: true,
                orders: vec![],
            }),
            update_result: Some(ClientPushResult {
                success: true,
                message: None,
                client_id: None,
            }),
            ..ScriptedRemote::default()
        };
        let (db, _monitor, coordinator) = coordinator(remote);
        {
            let conn = db.lock();
            let repo = ClientRepository::new(&conn);
            let client = Client {
                id: "cl_remote_1".to_string(),
                name: Some("Edited Offline".to_string()),
                needs_sync: true,
                ..Client::default()
            };
            repo.save_local(&client, "2024-05-02T12:00:00Z").unwrap();
            ConfigRepository::new(&conn)
                .set_watermark("2024-05-02T00:00:00Z")
                .unwrap();
        }

        let outcome = coordinator.run_incremental_sync(None).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.counts.clients_pushed, 1);

        let updates = coordinator.remote.updates_seen.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "cl_remote_1");
        drop(updates);

        let conn = db.lock();
        let stored = ClientRepository::new(&conn)
            .get("cl_remote_1")
            .unwrap()
            .unwrap();
        assert_eq!(stored.name.as_deref(), Some("Edited Offline"));
        assert!(!stored.needs_sync);
    }

    #[tokio::test]
    async fn locally_created_client_adopts_the_remote_id() {
        let remote = ScriptedRemote {
            catalog_delta: Some(CatalogDelta {
                success: true,
                timestamp: "2024-05-03T00:00:00Z".to_string(),
                products: vec![],
            }),
            client_delta: Some(ClientsPayload {
                success: true,
                clients: vec![],
            }),
            history: Some(HistoryPayload {
                success: true,
                orders: vec![],
            }),
            create_result: Some(ClientPushResult {
                success: true,
                message: None,
                client_id: Some("cl_issued_9".to_string()),
            }),
            ..ScriptedRemote::default()
        };
        let (db, _monitor, coordinator) = coordinator(remote);
        {
            let conn = db.lock();
            let client = Client {
                id: "1717171717171".to_string(),
                company_name: Some("Ferreteria Sur".to_string()),
                needs_sync: true,
                ..Client::default()
            };
            ClientRepository::new(&conn)
                .save_local(&client, "2024-05-02T12:00:00Z")
                .unwrap();
            ConfigRepository::new(&conn)
                .set_watermark("2024-05-02T00:00:00Z")
                .unwrap();
        }

        let outcome = coordinator.run_incremental_sync(None).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(coordinator.remote.creates_seen.lock().unwrap().len(), 1);

        let conn = db.lock();
        let repo = ClientRepository::new(&conn);
        assert!(repo.get("1717171717171").unwrap().is_none());
        let adopted = repo.get("cl_issued_9").unwrap().unwrap();
        assert_eq!(adopted.company_name.as_deref(), Some("Ferreteria Sur"));
        assert!(!adopted.needs_sync);
    }

    #[tokio::test]
    async fn removed_client_tombstone_deletes_the_row() {
        let remote = ScriptedRemote {
            catalog_delta: Some(CatalogDelta {
                success: true,
                timestamp: "2024-05-03T00:00:00Z".to_string(),
                products: vec![],
            }),
            client_delta: Some(ClientsPayload {
                success: true,
                clients: vec![RemoteClientRecord {
                    id: Some("cl_gone".to_string()),
                    removed: true,
                    ..RemoteClientRecord::default()
                }],
            }),
            history: Some(HistoryPayload {
                success: true,
                orders: vec![],
            }),
            ..ScriptedRemote::default()
        };
        let (db, _monitor, coordinator) = coordinator(remote);
        {
            let conn = db.lock();
            let repo = ClientRepository::new(&conn);
            repo.upsert_from_remote(
                &Client {
                    id: "cl_gone".to_string(),
                    ..Client::default()
                },
                "2024-05-01T00:00:00Z",
            )
            .unwrap();
            ConfigRepository::new(&conn)
                .set_watermark("2024-05-02T00:00:00Z")
                .unwrap();
        }

        let outcome = coordinator.run_incremental_sync(None).await;
        assert!(outcome.success, "{}", outcome.message);

        let conn = db.lock();
        assert!(ClientRepository::new(&conn).get("cl_gone").unwrap().is_none());
    }

    #[tokio::test]
    async fn unchanged_row_is_not_an_image_prefetch_candidate() {
        let (db, _monitor, coordinator) = coordinator(ScriptedRemote::default());
        let with_image = RemoteProduct {
            image: Some("https://cdn.example.com/oil.png".to_string()),
            ..remote_product("p1", "OIL-01")
        };

        let mut counts = SyncCounts::default();
        let first = coordinator
            .apply_products(vec![with_image.clone()], true, &mut counts)
            .unwrap();
        assert_eq!(first, vec!["https://cdn.example.com/oil.png".to_string()]);

        let second = coordinator
            .apply_products(vec![with_image.clone()], true, &mut counts)
            .unwrap();
        assert!(second.is_empty());

        let changed = RemoteProduct {
            updated_at: Some("2024-05-09T00:00:00Z".to_string()),
            ..with_image
        };
        let third = coordinator
            .apply_products(vec![changed], true, &mut counts)
            .unwrap();
        assert_eq!(third.len(), 1);

        let conn = db.lock();
        assert_eq!(ProductRepository::new(&conn).count().unwrap(), 1);
    }

    #[tokio::test]
    async fn auto_sync_runs_on_the_offline_to_online_edge() {
        let remote = ScriptedRemote {
            catalog: Some(CatalogSnapshot {
                success: true,
                timestamp: "2024-05-02T00:00:00Z".to_string(),
                products: vec![remote_product("p1", "OIL-01")],
            }),
            clients: Some(ClientsPayload {
                success: true,
                clients: vec![],
            }),
            history: Some(HistoryPayload {
                success: true,
                orders: vec![],
            }),
            ..ScriptedRemote::default()
        };
        let db = Arc::new(Database::open_in_memory().unwrap());
        let monitor = Arc::new(ConnectivityMonitor::new(false));
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::clone(&db),
            remote,
            Arc::clone(&monitor),
            None,
            "7",
        ));
        let handle = coordinator.spawn_auto_sync();

        monitor.set_online(true);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        {
            let conn = db.lock();
            assert_eq!(ProductRepository::new(&conn).count().unwrap(), 1);
        }
        handle.abort();
    }
}
