//! Product card display-field configuration.

use serde::{Deserialize, Serialize};

/// One configurable field on the catalog product card. Synced from the
/// backend when available; seeded with defaults on first run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayField {
    pub field: String,
    pub label: String,
    pub enabled: bool,
    pub display_order: i64,
    pub display_type: String,
}

/// First-run defaults, applied only when no configuration rows exist yet.
pub fn default_display_fields() -> Vec<DisplayField> {
    vec![
        DisplayField {
            field: "name".to_string(),
            label: "Nombre".to_string(),
            enabled: true,
            display_order: 1,
            display_type: "multiline".to_string(),
        },
        DisplayField {
            field: "rolePrice".to_string(),
            label: "Precio".to_string(),
            enabled: true,
            display_order: 2,
            display_type: "price".to_string(),
        },
        DisplayField {
            field: "stock".to_string(),
            label: "Stock".to_string(),
            enabled: true,
            display_order: 3,
            display_type: "number".to_string(),
        },
    ]
}
