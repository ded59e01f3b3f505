//! Client records, bidirectionally owned between device and backend.

use serde::{Deserialize, Serialize};

/// A client assigned to the authenticated agent.
///
/// `needs_sync = true` marks a dirty row: created or edited on-device and
/// not yet acknowledged by the remote. Dirty rows must never be overwritten
/// by an incoming pull until they have been pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
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
    pub status: String,
    pub is_active: bool,
    pub agent_number: Option<String>,
    pub client_number: Option<String>,
    pub price_type: String,
    pub created_at: Option<String>,
    pub synced_at: Option<String>,
    pub modified_at: Option<String>,
    pub needs_sync: bool,
}

/// Remote-issued client ids are long opaque strings; ids generated on-device
/// are raw millisecond timestamps and stay under this length.
const LOCAL_ID_MAX_LEN: usize = 20;

impl Client {
    /// Whether this record was created on-device and does not yet exist on
    /// the remote. Routed to the create endpoint instead of update.
    pub fn is_locally_created(&self) -> bool {
        self.id.len() < LOCAL_ID_MAX_LEN && self.id.chars().all(|c| c.is_ascii_digit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locally_created_id_is_a_timestamp() {
        let local = Client {
            id: "1717171717171".to_string(),
            ..Client::default()
        };
        assert!(local.is_locally_created());

        let remote = Client {
            id: "cl_9f8e7d6c5b4a39281706f5e4d3c2b1a0".to_string(),
            ..Client::default()
        };
        assert!(!remote.is_locally_created());
    }
}
