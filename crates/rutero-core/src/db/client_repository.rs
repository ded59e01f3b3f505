//! Client repository: remote pulls, local edits, and dirty-row tracking.

use rusqlite::{params, Connection, Row};

use crate::error::Result;
use crate::models::Client;

pub struct ClientRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ClientRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Apply a pulled client record.
    ///
    /// Returns `false` without writing when the local row is dirty
    /// (`needs_sync = 1`): push wins, the pull is skipped for that row.
    pub fn upsert_from_remote(&self, client: &Client, synced_at: &str) -> Result<bool> {
        if self.is_dirty(&client.id)? {
            tracing::warn!(client_id = %client.id, "Skipping pull for locally dirty client");
            return Ok(false);
        }

        self.conn.execute(
            "INSERT OR REPLACE INTO clients
             (id, name, email, company_name, company_tax_id, phone, address,
              gps_location, city, state, zip_code, country, contact_person,
              status, is_active, agent_number, client_number, price_type,
              created_at, synced_at, modified_at, needs_sync)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, 0)",
            params![
                client.id,
                client.name,
                client.email,
                client.company_name,
                client.company_tax_id,
                client.phone,
                client.address,
                client.gps_location,
                client.city,
                client.state,
                client.zip_code,
                client.country,
                client.contact_person,
                client.status,
                i64::from(client.is_active),
                client.agent_number,
                client.client_number,
                client.price_type,
                client.created_at,
                synced_at,
            ],
        )?;
        Ok(true)
    }

    /// Write a locally-created or locally-edited client, flagging it dirty
    /// for the next upload pass.
    pub fn save_local(&self, client: &Client, modified_at: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO clients
             (id, name, email, company_name, company_tax_id, phone, address,
              gps_location, city, state, zip_code, country, contact_person,
              status, is_active, agent_number, client_number, price_type,
              created_at, synced_at, modified_at, needs_sync)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)",
            params![
                client.id,
                client.name,
                client.email,
                client.company_name,
                client.company_tax_id,
                client.phone,
                client.address,
                client.gps_location,
                client.city,
                client.state,
                client.zip_code,
                client.country,
                client.contact_person,
                client.status,
                i64::from(client.is_active),
                client.agent_number,
                client.client_number,
                client.price_type,
                client.created_at,
                client.synced_at,
                modified_at,
            ],
        )?;
        Ok(())
    }

    /// Replace a locally-created row with its remote-accepted form under
    /// the remote-issued id. Delete and re-insert run in one transaction so
    /// a crash can never leave the client missing under both ids.
    pub fn adopt_remote_id(
        &self,
        local_id: &str,
        accepted: &Client,
        synced_at: &str,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM clients WHERE id = ?", [local_id])?;
        tx.execute(
            "INSERT OR REPLACE INTO clients
             (id, name, email, company_name, company_tax_id, phone, address,
              gps_location, city, state, zip_code, country, contact_person,
              status, is_active, agent_number, client_number, price_type,
              created_at, synced_at, modified_at, needs_sync)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)",
            params![
                accepted.id,
                accepted.name,
                accepted.email,
                accepted.company_name,
                accepted.company_tax_id,
                accepted.phone,
                accepted.address,
                accepted.gps_location,
                accepted.city,
                accepted.state,
                accepted.zip_code,
                accepted.country,
                accepted.contact_person,
                accepted.status,
                i64::from(accepted.is_active),
                accepted.agent_number,
                accepted.client_number,
                accepted.price_type,
                accepted.created_at,
                synced_at,
                synced_at,
            ],
        )?;
        tx.commit()?;
        tracing::info!(local_id = %local_id, remote_id = %accepted.id, "Client adopted remote id");
        Ok(())
    }

    /// Clear the dirty flag after a confirmed push, stamping both sync
    /// timestamps in the same statement so a crash cannot split them.
    pub fn mark_synced(&self, id: &str, now: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE clients SET needs_sync = 0, synced_at = ?, modified_at = ? WHERE id = ?",
            params![now, now, id],
        )?;
        Ok(())
    }

    /// Hard-delete a client, e.g. when a delta flags it as reassigned to a
    /// different agent.
    pub fn delete_by_id(&self, id: &str) -> Result<bool> {
        let rows = self.conn.execute("DELETE FROM clients WHERE id = ?", [id])?;
        Ok(rows > 0)
    }

    /// All rows awaiting upload.
    pub fn dirty(&self) -> Result<Vec<Client>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_CLIENT} WHERE needs_sync = 1"))?;
        let clients = stmt
            .query_map([], parse_client)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(clients)
    }

    pub fn get(&self, id: &str) -> Result<Option<Client>> {
        let result = self.conn.query_row(
            &format!("{SELECT_CLIENT} WHERE id = ?"),
            [id],
            parse_client,
        );
        match result {
            Ok(client) => Ok(Some(client)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_active(&self) -> Result<Vec<Client>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_CLIENT} WHERE is_active = 1 ORDER BY company_name ASC, name ASC"
        ))?;
        let clients = stmt
            .query_map([], parse_client)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(clients)
    }

    fn is_dirty(&self, id: &str) -> Result<bool> {
        let result = self.conn.query_row(
            "SELECT needs_sync FROM clients WHERE id = ?",
            [id],
            |row| row.get::<_, i64>(0),
        );
        match result {
            Ok(flag) => Ok(flag != 0),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

const SELECT_CLIENT: &str = "SELECT id, name, email, company_name, company_tax_id, phone, address,
        gps_location, city, state, zip_code, country, contact_person,
        status, is_active, agent_number, client_number, price_type,
        created_at, synced_at, modified_at, needs_sync
    FROM clients";

fn parse_client(row: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        company_name: row.get(3)?,
        company_tax_id: row.get(4)?,
        phone: row.get(5)?,
        address: row.get(6)?,
        gps_location: row.get(7)?,
        city: row.get(8)?,
        state: row.get(9)?,
        zip_code: row.get(10)?,
        country: row.get(11)?,
        contact_person: row.get(12)?,
        status: row.get(13)?,
        is_active: row.get::<_, i64>(14)? != 0,
        agent_number: row.get(15)?,
        client_number: row.get(16)?,
        price_type: row.get(17)?,
        created_at: row.get(18)?,
        synced_at: row.get(19)?,
        modified_at: row.get(20)?,
        needs_sync: row.get::<_, i64>(21)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn remote_client(id: &str) -> Client {
        Client {
            id: id.to_string(),
            company_name: Some("Ferretería El Sol".to_string()),
            phone: Some("5550-1234".to_string()),
            status: "active".to_string(),
            is_active: true,
            price_type: "interior".to_string(),
            ..Client::default()
        }
    }

    #[test]
    fn test_pull_then_read_back() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock();
        let repo = ClientRepository::new(&conn);

        let client = remote_client("cl_abc123def456ghi789");
        assert!(repo
            .upsert_from_remote(&client, "2024-05-01T10:00:00Z")
            .unwrap());

        let stored = repo.get(&client.id).unwrap().unwrap();
        assert_eq!(stored.company_name, client.company_name);
        assert!(!stored.needs_sync);
        assert_eq!(stored.synced_at.as_deref(), Some("2024-05-01T10:00:00Z"));
    }

    #[test]
    fn test_pull_never_overwrites_dirty_row() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock();
        let repo = ClientRepository::new(&conn);

        let mut client = remote_client("cl_abc123def456ghi789");
        client.phone = Some("edited-on-device".to_string());
        repo.save_local(&client, "2024-05-01T09:00:00Z").unwrap();

        let mut incoming = remote_client(&client.id);
        incoming.phone = Some("remote-value".to_string());
        assert!(!repo
            .upsert_from_remote(&incoming, "2024-05-01T10:00:00Z")
            .unwrap());

        let stored = repo.get(&client.id).unwrap().unwrap();
        assert_eq!(stored.phone.as_deref(), Some("edited-on-device"));
        assert!(stored.needs_sync);
    }

    #[test]
    fn test_mark_synced_clears_dirty_flag() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock();
        let repo = ClientRepository::new(&conn);

        let client = remote_client("1717171717171");
        repo.save_local(&client, "2024-05-01T09:00:00Z").unwrap();
        assert_eq!(repo.dirty().unwrap().len(), 1);

        repo.mark_synced(&client.id, "2024-05-01T10:00:00Z").unwrap();
        assert!(repo.dirty().unwrap().is_empty());

        let stored = repo.get(&client.id).unwrap().unwrap();
        assert_eq!(stored.synced_at.as_deref(), Some("2024-05-01T10:00:00Z"));
    }

    #[test]
    fn test_adopt_remote_id_swaps_rows_atomically() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock();
        let repo = ClientRepository::new(&conn);

        let client = remote_client("1717171717171");
        repo.save_local(&client, "2024-05-01T09:00:00Z").unwrap();

        let mut accepted = client.clone();
        accepted.id = "cl_issued_9".to_string();
        accepted.needs_sync = false;
        repo.adopt_remote_id(&client.id, &accepted, "2024-05-01T10:00:00Z")
            .unwrap();

        assert!(repo.get("1717171717171").unwrap().is_none());
        let stored = repo.get("cl_issued_9").unwrap().unwrap();
        assert_eq!(stored.company_name, client.company_name);
        assert!(!stored.needs_sync);
        assert_eq!(stored.synced_at.as_deref(), Some("2024-05-01T10:00:00Z"));
        assert!(repo.dirty().unwrap().is_empty());
    }

    #[test]
    fn test_delete_for_reassigned_client() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock();
        let repo = ClientRepository::new(&conn);

        let client = remote_client("cl_gone");
        repo.upsert_from_remote(&client, "2024-05-01T10:00:00Z")
            .unwrap();

        assert!(repo.delete_by_id("cl_gone").unwrap());
        assert!(repo.get("cl_gone").unwrap().is_none());
    }
}
