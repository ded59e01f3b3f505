//! Price tier resolution.
//!
//! Every client carries a price type and every product carries one price
//! column per tier. Tier prices are stored as strings exactly as the
//! backend sends them; resolution falls back to the base price whenever
//! the tier column is empty or unparsable.

use serde::{Deserialize, Serialize};

use crate::models::Product;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriceType {
    #[default]
    Ciudad,
    Interior,
    Especial,
}

impl PriceType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ciudad => "ciudad",
            Self::Interior => "interior",
            Self::Especial => "especial",
        }
    }

    /// Unknown labels resolve to the default tier rather than erroring,
    /// so a stale client row can always be priced.
    pub fn parse(value: &str) -> Self {
        match value {
            "interior" => Self::Interior,
            "especial" => Self::Especial,
            _ => Self::Ciudad,
        }
    }
}

/// Resolve the unit price of `product` for the given tier, falling back to
/// the base price when the tier column is empty or not a number.
pub fn price_for(product: &Product, price_type: PriceType) -> f64 {
    let tier = match price_type {
        PriceType::Ciudad => &product.price_city,
        PriceType::Interior => &product.price_interior,
        PriceType::Especial => &product.price_special,
    };
    parse_price(tier).unwrap_or_else(|| parse_price(&product.base_price).unwrap_or(0.0))
}

/// Subtotal for a cart or order line.
pub fn line_subtotal(unit_price: f64, quantity: i64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    {
        unit_price * quantity as f64
    }
}

/// Two-decimal display formatting, `Bs. 12.50`.
pub fn format_price(value: f64) -> String {
    format!("Bs. {value:.2}")
}

fn parse_price(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}
