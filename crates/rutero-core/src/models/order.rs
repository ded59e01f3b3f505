//! Pending orders captured offline and the durable order history.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::CartItem;
use crate::pricing;

/// Status written to history rows when a pending order is promoted after a
/// confirmed upload.
pub const STATUS_SENT: &str = "enviado";

/// Lifecycle of an order still in the pending queue.
///
/// `Draft` orders stay editable and are never picked up by automatic
/// upload; `Pending` orders are queued for the next sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Draft,
    Pending,
}

impl OrderStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }
}

/// An order captured offline, not yet uploaded.
///
/// `order_number` lives in the draft numbering space (`A` + 9 digits).
/// `created_at` doubles as the correlation key for upload results, since
/// the local id is unknown to the remote until acceptance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub id: String,
    pub client_id: Option<String>,
    pub order_number: String,
    pub status: String,
    pub subtotal: String,
    pub tax: String,
    pub total: String,
    pub customer_name: Option<String>,
    pub customer_note: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub synced: bool,
}

impl PendingOrder {
    /// Capture the current cart as a new order. Row ids are generated
    /// locally; the remote only learns about the order at upload, keyed by
    /// `created_at`.
    pub fn capture(
        order_number: String,
        status: OrderStatus,
        client_id: Option<String>,
        customer_name: Option<String>,
        customer_note: Option<String>,
        lines: &[CartItem],
        now: &str,
    ) -> (Self, Vec<PendingOrderItem>) {
        let order_id = Uuid::new_v4().to_string();
        let mut subtotal = 0.0;
        let items = lines
            .iter()
            .map(|line| {
                let unit = line.price_per_unit.parse::<f64>().unwrap_or(0.0);
                let line_total = pricing::line_subtotal(unit, line.quantity);
                subtotal += line_total;
                PendingOrderItem {
                    id: Uuid::new_v4().to_string(),
                    order_id: order_id.clone(),
                    product_id: line.product_sku.clone(),
                    product_name: line.product_name.clone(),
                    quantity: line.quantity,
                    price_per_unit: line.price_per_unit.clone(),
                    subtotal: format!("{line_total:.2}"),
                    custom_text: line.custom_text.clone(),
                    custom_select: None,
                }
            })
            .collect();

        (
            Self {
                id: order_id,
                client_id,
                order_number,
                status: status.as_str().to_string(),
                subtotal: format!("{subtotal:.2}"),
                tax: "0.00".to_string(),
                total: format!("{subtotal:.2}"),
                customer_name,
                customer_note,
                created_at: now.to_string(),
                updated_at: Some(now.to_string()),
                synced: false,
            },
            items,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub price_per_unit: String,
    pub subtotal: String,
    pub custom_text: Option<String>,
    pub custom_select: Option<String>,
}

/// The terminal resting place of an order: either pulled from the remote's
/// own history, or promoted from the pending queue after a confirmed
/// upload. `order_number` is permanently in the agent-scoped sent space and
/// immutable once written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryOrder {
    pub id: String,
    pub user_id: Option<String>,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub order_number: String,
    pub status: String,
    pub subtotal: String,
    pub tax: String,
    pub total: String,
    pub notes: Option<String>,
    pub customer_name: Option<String>,
    pub customer_note: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub synced_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryOrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub quantity: i64,
    pub price_per_unit: String,
    pub subtotal: String,
}
