//! Database migrations
//!
//! Schema creation plus a declared, ordered list of additive migration
//! steps. Each step is expressed as "add column X if absent", checked via
//! `PRAGMA table_info` introspection, so re-applying a step is a no-op
//! rather than an error. Any other failure aborts initialization.

use rusqlite::Connection;

use crate::error::{Error, Result};

/// Current schema version, persisted under the `schema_version` config key.
pub const CURRENT_VERSION: i64 = 3;

const SCHEMA_VERSION_KEY: &str = "schema_version";

/// One additive column change.
struct AddColumn {
    table: &'static str,
    column: &'static str,
    decl: &'static str,
}

/// One migration step: a version number and the columns it introduces.
struct Migration {
    version: i64,
    description: &'static str,
    columns: &'static [AddColumn],
}

/// v2: tiered pricing on products, dirty-row tracking on clients.
const MIGRATION_V2: Migration = Migration {
    version: 2,
    description: "tiered prices and client sync tracking",
    columns: &[
        AddColumn { table: "products", column: "price_city", decl: "TEXT" },
        AddColumn { table: "products", column: "price_interior", decl: "TEXT" },
        AddColumn { table: "products", column: "price_special", decl: "TEXT" },
        AddColumn { table: "clients", column: "gps_location", decl: "TEXT" },
        AddColumn { table: "clients", column: "contact_person", decl: "TEXT" },
        AddColumn { table: "clients", column: "zip_code", decl: "TEXT" },
        AddColumn { table: "clients", column: "country", decl: "TEXT" },
        AddColumn { table: "clients", column: "modified_at", decl: "TEXT" },
        AddColumn { table: "clients", column: "needs_sync", decl: "INTEGER NOT NULL DEFAULT 0" },
    ],
};

/// v3: per-product custom fields and packaging, client name on history rows.
const MIGRATION_V3: Migration = Migration {
    version: 3,
    description: "product custom fields and history client name",
    columns: &[
        AddColumn { table: "products", column: "units_per_box", decl: "INTEGER NOT NULL DEFAULT 0" },
        AddColumn { table: "products", column: "custom_text", decl: "TEXT" },
        AddColumn { table: "products", column: "custom_select", decl: "TEXT" },
        AddColumn { table: "order_history", column: "client_name", decl: "TEXT" },
    ],
};

const MIGRATIONS: &[Migration] = &[MIGRATION_V2, MIGRATION_V3];

/// Create the base schema if absent, then run all pending migration steps
/// and persist the new version marker.
pub fn run(conn: &Connection) -> Result<()> {
    create_base_schema(conn)?;

    let version = get_version(conn)?;
    for migration in MIGRATIONS {
        if version < migration.version {
            apply(conn, migration)?;
        }
    }

    set_version(conn, CURRENT_VERSION)?;
    Ok(())
}

/// Read the persisted schema version, 0 when none has been recorded.
pub fn get_version(conn: &Connection) -> Result<i64> {
    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM config WHERE key = ?",
            [SCHEMA_VERSION_KEY],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    match version {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::Migration(format!("invalid schema version marker: {raw}"))),
        None => Ok(0),
    }
}

fn set_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO config (key, value) VALUES (?, ?)",
        rusqlite::params![SCHEMA_VERSION_KEY, version.to_string()],
    )?;
    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for add in migration.columns {
        if column_exists(&tx, add.table, add.column)? {
            continue;
        }
        tx.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            add.table, add.column, add.decl
        ))?;
    }
    tx.commit()?;

    tracing::info!(
        version = migration.version,
        "Migrated database: {}",
        migration.description
    );
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn create_base_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS products (
            id TEXT NOT NULL,
            sku TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            category TEXT,
            subcategory TEXT,
            image TEXT,
            base_price TEXT NOT NULL,
            stock INTEGER NOT NULL DEFAULT 0,
            min_quantity INTEGER NOT NULL DEFAULT 1,
            display_order INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            hide_in_catalog INTEGER NOT NULL DEFAULT 0,
            parent_sku TEXT,
            variant_name TEXT,
            created_at TEXT,
            updated_at TEXT NOT NULL,
            synced_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_products_id ON products(id);
        CREATE INDEX IF NOT EXISTS idx_products_category ON products(category);
        CREATE INDEX IF NOT EXISTS idx_products_listing
            ON products(is_active, parent_sku, hide_in_catalog);

        CREATE TABLE IF NOT EXISTS clients (
            id TEXT PRIMARY KEY,
            name TEXT,
            email TEXT,
            company_name TEXT,
            company_tax_id TEXT,
            phone TEXT,
            address TEXT,
            city TEXT,
            state TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            is_active INTEGER NOT NULL DEFAULT 1,
            agent_number TEXT,
            client_number TEXT,
            price_type TEXT NOT NULL DEFAULT 'ciudad',
            created_at TEXT,
            synced_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_clients_active ON clients(is_active);

        CREATE TABLE IF NOT EXISTS pending_orders (
            id TEXT PRIMARY KEY,
            client_id TEXT,
            order_number TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            subtotal TEXT NOT NULL,
            tax TEXT NOT NULL DEFAULT '0.00',
            total TEXT NOT NULL,
            customer_name TEXT,
            customer_note TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            synced INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_pending_orders_synced ON pending_orders(synced);
        CREATE INDEX IF NOT EXISTS idx_pending_orders_client ON pending_orders(client_id);

        CREATE TABLE IF NOT EXISTS pending_order_items (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES pending_orders(id) ON DELETE CASCADE,
            product_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            price_per_unit TEXT NOT NULL,
            subtotal TEXT NOT NULL,
            custom_text TEXT,
            custom_select TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_pending_order_items_order
            ON pending_order_items(order_id);

        CREATE TABLE IF NOT EXISTS order_history (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            client_id TEXT,
            order_number TEXT NOT NULL,
            status TEXT NOT NULL,
            subtotal TEXT NOT NULL DEFAULT '0.00',
            tax TEXT NOT NULL DEFAULT '0.00',
            total TEXT NOT NULL DEFAULT '0.00',
            notes TEXT,
            customer_name TEXT,
            customer_note TEXT,
            created_at TEXT,
            updated_at TEXT,
            synced_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_order_history_client ON order_history(client_id);
        CREATE INDEX IF NOT EXISTS idx_order_history_status ON order_history(status);

        CREATE TABLE IF NOT EXISTS order_history_items (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES order_history(id) ON DELETE CASCADE,
            product_id TEXT,
            product_name TEXT,
            quantity INTEGER NOT NULL DEFAULT 0,
            price_per_unit TEXT NOT NULL DEFAULT '0.00',
            subtotal TEXT NOT NULL DEFAULT '0.00'
        );
        CREATE INDEX IF NOT EXISTS idx_order_history_items_order
            ON order_history_items(order_id);

        CREATE TABLE IF NOT EXISTS cart_items (
            product_sku TEXT PRIMARY KEY,
            product_name TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            price_per_unit TEXT NOT NULL,
            custom_text TEXT
        );

        CREATE TABLE IF NOT EXISTS product_fields (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            field TEXT NOT NULL,
            label TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            display_order INTEGER NOT NULL DEFAULT 0,
            display_type TEXT NOT NULL DEFAULT 'text'
        );",
    )?;
    Ok(())
}

/// Drop every table owned by this store. Used by [`crate::db::Database::reset`].
pub fn drop_all(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS pending_order_items;
        DROP TABLE IF EXISTS pending_orders;
        DROP TABLE IF EXISTS order_history_items;
        DROP TABLE IF EXISTS order_history;
        DROP TABLE IF EXISTS cart_items;
        DROP TABLE IF EXISTS product_fields;
        DROP TABLE IF EXISTS products;
        DROP TABLE IF EXISTS clients;
        DROP TABLE IF EXISTS config;",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_steps_tolerate_existing_columns() {
        let conn = setup();
        create_base_schema(&conn).unwrap();
        conn.execute_batch("ALTER TABLE products ADD COLUMN price_city TEXT")
            .unwrap();

        // price_city already present; the v2 step must skip it, not fail.
        run(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_migrated_columns_are_usable() {
        let conn = setup();
        run(&conn).unwrap();

        conn.execute(
            "INSERT INTO products (id, sku, name, base_price, price_interior, custom_text, updated_at, synced_at)
             VALUES ('p1', 'SKU-1', 'Oil', '1.40', '1.50', 'engraving', '2024-01-01T00:00:00Z', '2024-01-01T00:00:01Z')",
            [],
        )
        .unwrap();

        let price: String = conn
            .query_row(
                "SELECT price_interior FROM products WHERE sku = 'SKU-1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(price, "1.50");
    }
}
