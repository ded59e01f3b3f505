//! Wire payloads and per-record shape validation.
//!
//! The backend speaks camelCase JSON and is permissive about which fields
//! it sends, so every remote record type is decoded leniently (everything
//! optional that the backend has ever omitted) and then validated into the
//! strict local model. A malformed record is tagged [`Validated::Invalid`]
//! and skipped by the caller, it never aborts the batch.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Client, HistoryOrder, HistoryOrderItem, Product};

/// Decode a whole response body into a payload type. A body that does not
/// match the expected shape is a validation failure, not a transport error;
/// per-record problems inside a well-shaped payload go through
/// [`Validated`] instead.
pub fn parse_payload<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| Error::Validation(format!("payload did not match expected shape: {e}")))
}

/// Outcome of validating one remote record into its local model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validated<T> {
    Valid(T),
    Invalid(String),
}

/// Full catalog snapshot.
///
/// `timestamp` is the server-side snapshot time and becomes the local sync
/// watermark once the whole batch has been applied.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    pub success: bool,
    pub timestamp: String,
    #[serde(default)]
    pub products: Vec<RemoteProduct>,
}

/// Incremental catalog changes since a watermark.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDelta {
    pub success: bool,
    pub timestamp: String,
    #[serde(default)]
    pub products: Vec<RemoteProduct>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProduct {
    pub id: Option<String>,
    pub sku: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub image: Option<String>,
    pub base_price: Option<String>,
    pub price_city: Option<String>,
    pub price_interior: Option<String>,
    pub price_special: Option<String>,
    pub stock: Option<i64>,
    pub min_quantity: Option<i64>,
    pub units_per_box: Option<i64>,
    pub display_order: Option<i64>,
    pub is_active: Option<bool>,
    pub hide_in_catalog: Option<bool>,
    pub parent_sku: Option<String>,
    pub variant_name: Option<String>,
    pub custom_text: Option<String>,
    pub custom_select: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl RemoteProduct {
    /// Inactive records are not applied as upserts, they are hard deletes.
    pub fn is_inactive(&self) -> bool {
        self.is_active == Some(false)
    }

    /// Validate into the local model. Missing tier prices default to the
    /// base price; `synced_at` is stamped with the local apply time.
    pub fn validate(self, synced_at: &str) -> Validated<Product> {
        let Some(id) = non_empty(self.id) else {
            return Validated::Invalid("product without id".to_string());
        };
        let Some(sku) = non_empty(self.sku) else {
            return Validated::Invalid(format!("product {id} without sku"));
        };
        let Some(name) = non_empty(self.name) else {
            return Validated::Invalid(format!("product {sku} without name"));
        };
        let Some(base_price) = non_empty(self.base_price) else {
            return Validated::Invalid(format!("product {sku} without base price"));
        };

        let tier = |value: Option<String>| non_empty(value).unwrap_or_else(|| base_price.clone());

        Validated::Valid(Product {
            id,
            sku,
            name,
            description: self.description,
            category: self.category,
            subcategory: self.subcategory,
            image: non_empty(self.image),
            price_city: tier(self.price_city),
            price_interior: tier(self.price_interior),
            price_special: tier(self.price_special),
            base_price,
            stock: self.stock.unwrap_or(0),
            min_quantity: self.min_quantity.unwrap_or(1),
            units_per_box: self.units_per_box.unwrap_or(0),
            display_order: self.display_order,
            is_active: self.is_active.unwrap_or(true),
            hide_in_catalog: self.hide_in_catalog.unwrap_or(false),
            parent_sku: self.parent_sku,
            variant_name: self.variant_name,
            custom_text: self.custom_text,
            custom_select: self.custom_select,
            created_at: self.created_at,
            updated_at: self.updated_at.unwrap_or_else(|| synced_at.to_string()),
            synced_at: synced_at.to_string(),
        })
    }
}

/// Assigned clients, either a full list or a delta since a watermark.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientsPayload {
    pub success: bool,
    #[serde(default)]
    pub clients: Vec<RemoteClientRecord>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteClientRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub company_name: Option<String>,
    pub company_tax_id: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gps_location: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub contact_person: Option<String>,
    pub status: Option<String>,
    pub is_active: Option<bool>,
    pub agent_number: Option<String>,
    pub client_number: Option<String>,
    pub price_type: Option<String>,
    pub created_at: Option<String>,
    /// Set by the delta endpoint when the client has been reassigned away
    /// from this agent; the local row must be deleted.
    #[serde(rename = "_removed", default)]
    pub removed: bool,
}

impl RemoteClientRecord {
    pub fn validate(self) -> Validated<Client> {
        let Some(id) = non_empty(self.id) else {
            return Validated::Invalid("client without id".to_string());
        };

        Validated::Valid(Client {
            id,
            name: self.name,
            email: self.email,
            company_name: self.company_name,
            company_tax_id: self.company_tax_id,
            phone: self.phone,
            address: self.address,
            gps_location: self.gps_location,
            city: self.city,
            state: self.state,
            zip_code: self.zip_code,
            country: self.country,
            contact_person: self.contact_person,
            status: self.status.unwrap_or_else(|| "active".to_string()),
            is_active: self.is_active.unwrap_or(true),
            agent_number: self.agent_number,
            client_number: self.client_number,
            price_type: non_empty(self.price_type).unwrap_or_else(|| "ciudad".to_string()),
            created_at: self.created_at,
            synced_at: None,
            modified_at: None,
            needs_sync: false,
        })
    }
}

/// Remote-side order history for this agent.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPayload {
    pub success: bool,
    #[serde(default)]
    pub orders: Vec<RemoteHistoryOrder>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteHistoryOrder {
    pub id: Option<String>,
    pub user_id: Option<String>,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub order_number: Option<String>,
    pub status: Option<String>,
    pub subtotal: Option<String>,
    pub tax: Option<String>,
    pub total: Option<String>,
    pub notes: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(default)]
    pub items: Vec<RemoteHistoryItem>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteHistoryItem {
    pub id: Option<String>,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub quantity: Option<i64>,
    pub price_per_unit: Option<String>,
    pub subtotal: Option<String>,
}

impl RemoteHistoryOrder {
    pub fn validate(self, synced_at: &str) -> Validated<(HistoryOrder, Vec<HistoryOrderItem>)> {
        let Some(id) = non_empty(self.id) else {
            return Validated::Invalid("history order without id".to_string());
        };
        let Some(order_number) = non_empty(self.order_number) else {
            return Validated::Invalid(format!("history order {id} without number"));
        };

        let items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| HistoryOrderItem {
                id: item.id.unwrap_or_else(|| format!("{id}-{index}")),
                order_id: id.clone(),
                product_id: item.product_id,
                product_name: item.product_name,
                quantity: item.quantity.unwrap_or(0),
                price_per_unit: item.price_per_unit.unwrap_or_default(),
                subtotal: item.subtotal.unwrap_or_default(),
            })
            .collect();

        Validated::Valid((
            HistoryOrder {
                id,
                user_id: self.user_id,
                client_id: self.client_id,
                client_name: self.client_name,
                order_number,
                status: self.status.unwrap_or_default(),
                subtotal: self.subtotal.unwrap_or_default(),
                tax: self.tax.unwrap_or_default(),
                total: self.total.unwrap_or_default(),
                notes: self.notes,
                customer_name: None,
                customer_note: None,
                created_at: self.created_at,
                updated_at: self.updated_at,
                synced_at: Some(synced_at.to_string()),
            },
            items,
        ))
    }
}

/// One pending order as sent to the upload endpoint.
///
/// The remote does not know local row ids, so `created_at_offline` carries
/// the capture timestamp and the upload report echoes it back as the
/// correlation key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpload {
    pub client_id: Option<String>,
    pub customer_note: Option<String>,
    pub items: Vec<OrderUploadItem>,
    pub created_at_offline: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUploadItem {
    pub product_id: String,
    pub quantity: i64,
    pub price_per_unit: String,
}

/// Per-order upload outcome. Failed orders stay in the pending queue and
/// retry on the next pass.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub success: bool,
    #[serde(default)]
    pub results: Vec<OrderUploadResult>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUploadResult {
    pub success: bool,
    pub created_at_offline: String,
    pub order_id: Option<String>,
    pub error: Option<String>,
}

/// Fields pushed when updating a remote-owned client record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub company_name: Option<String>,
    pub company_tax_id: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gps_location: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub contact_person: Option<String>,
    pub price_type: Option<String>,
}

impl ClientUpdate {
    pub fn from_client(client: &Client) -> Self {
        Self {
            name: client.name.clone(),
            email: client.email.clone(),
            company_name: client.company_name.clone(),
            company_tax_id: client.company_tax_id.clone(),
            phone: client.phone.clone(),
            address: client.address.clone(),
            gps_location: client.gps_location.clone(),
            city: client.city.clone(),
            state: client.state.clone(),
            zip_code: client.zip_code.clone(),
            country: client.country.clone(),
            contact_person: client.contact_person.clone(),
            price_type: Some(client.price_type.clone()),
        }
    }
}

/// Fields pushed when creating a locally-captured client on the remote.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCreate {
    pub client_number: Option<String>,
    pub company_name: Option<String>,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gps_location: Option<String>,
    pub company_tax_id: Option<String>,
    pub price_type: Option<String>,
}

impl ClientCreate {
    pub fn from_client(client: &Client) -> Self {
        Self {
            client_number: client.client_number.clone(),
            company_name: client.company_name.clone(),
            contact_person: client.contact_person.clone(),
            email: client.email.clone(),
            phone: client.phone.clone(),
            address: client.address.clone(),
            gps_location: client.gps_location.clone(),
            company_tax_id: client.company_tax_id.clone(),
            price_type: Some(client.price_type.clone()),
        }
    }
}

/// Response to a client create or update push.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPushResult {
    pub success: bool,
    pub message: Option<String>,
    /// Remote-issued id, present on successful creates. The local
    /// timestamp-id row is replaced by a row under this id.
    pub client_id: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
