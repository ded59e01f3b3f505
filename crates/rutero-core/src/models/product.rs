//! Locally mirrored product records.

use serde::{Deserialize, Serialize};

/// A product row in the local mirror of the remote catalog.
///
/// `sku` is the stable business key; `id` is the opaque remote identifier.
/// Prices are kept as decimal strings exactly as received on the wire.
/// `synced_at` is always the local apply time, never the remote-origin
/// timestamp, and is therefore `>= updated_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub image: Option<String>,
    pub base_price: String,
    pub price_city: String,
    pub price_interior: String,
    pub price_special: String,
    pub stock: i64,
    pub min_quantity: i64,
    pub units_per_box: i64,
    pub display_order: Option<i64>,
    pub is_active: bool,
    pub hide_in_catalog: bool,
    pub parent_sku: Option<String>,
    pub variant_name: Option<String>,
    pub custom_text: Option<String>,
    pub custom_select: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: String,
    pub synced_at: String,
}

impl Product {
    /// A product whose `parent_sku` references another product is a variant
    /// and is excluded from top-level catalog listings.
    pub fn is_variant(&self) -> bool {
        self.parent_sku.as_deref().is_some_and(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_detection() {
        let base = Product {
            sku: "OIL-01".to_string(),
            ..Product::default()
        };
        assert!(!base.is_variant());

        let variant = Product {
            sku: "OIL-01-L".to_string(),
            parent_sku: Some("OIL-01".to_string()),
            ..Product::default()
        };
        assert!(variant.is_variant());

        let empty_parent = Product {
            parent_sku: Some(String::new()),
            ..Product::default()
        };
        assert!(!empty_parent.is_variant());
    }
}
