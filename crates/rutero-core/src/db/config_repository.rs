//! Key-value config storage: sync watermark, schema version, display fields.

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::{default_display_fields, DisplayField};

/// Config key holding the sync watermark: the timestamp boundary below
/// which all remote changes are known to be applied locally.
const LAST_SYNC_KEY: &str = "last_sync_timestamp";

pub struct ConfigRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ConfigRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let result = self.conn.query_row(
            "SELECT value FROM config WHERE key = ?",
            [key],
            |row| row.get(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO config (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM config WHERE key = ?", [key])?;
        Ok(())
    }

    /// The last successfully-applied pull boundary, `None` before the first
    /// ever sync.
    pub fn watermark(&self) -> Result<Option<String>> {
        self.get(LAST_SYNC_KEY)
    }

    /// Advance the watermark. Written only after an entire pull batch has
    /// been durably applied.
    pub fn set_watermark(&self, timestamp: &str) -> Result<()> {
        self.set(LAST_SYNC_KEY, timestamp)
    }

    pub fn clear_watermark(&self) -> Result<()> {
        self.delete(LAST_SYNC_KEY)
    }

    /// Seed the default product card configuration, only when no rows exist
    /// yet (first run or post-reset).
    pub fn seed_display_fields(&self) -> Result<()> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM product_fields", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(());
        }

        for field in default_display_fields() {
            self.conn.execute(
                "INSERT INTO product_fields (field, label, enabled, display_order, display_type)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    field.field,
                    field.label,
                    i64::from(field.enabled),
                    field.display_order,
                    field.display_type
                ],
            )?;
        }
        tracing::info!("Seeded default display field configuration");
        Ok(())
    }

    /// Replace the display field configuration with a server-provided set.
    pub fn replace_display_fields(&self, fields: &[DisplayField]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM product_fields", [])?;
        for field in fields {
            tx.execute(
                "INSERT INTO product_fields (field, label, enabled, display_order, display_type)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    field.field,
                    field.label,
                    i64::from(field.enabled),
                    field.display_order,
                    field.display_type
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Enabled display fields in configured order.
    pub fn display_fields(&self) -> Result<Vec<DisplayField>> {
        let mut stmt = self.conn.prepare(
            "SELECT field, label, enabled, display_order, display_type
             FROM product_fields
             WHERE enabled = 1
             ORDER BY display_order ASC",
        )?;
        let fields = stmt
            .query_map([], |row| {
                Ok(DisplayField {
                    field: row.get(0)?,
                    label: row.get(1)?,
                    enabled: row.get::<_, i64>(2)? != 0,
                    display_order: row.get(3)?,
                    display_type: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(fields)
    }
}
