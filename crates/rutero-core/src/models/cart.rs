//! Ephemeral cart entries.

use serde::{Deserialize, Serialize};

/// A product/quantity pair in the cart. Carries no identity beyond the
/// product sku; checkout and "continue editing" flows replace the whole set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_sku: String,
    pub product_name: String,
    pub quantity: i64,
    pub price_per_unit: String,
    pub custom_text: Option<String>,
}
