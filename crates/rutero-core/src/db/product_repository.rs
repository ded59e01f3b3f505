//! Product mirror repository

use rusqlite::{params, Connection, Row};

use crate::error::Result;
use crate::models::Product;

pub struct ProductRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ProductRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or replace a mirrored product row.
    pub fn upsert(&self, product: &Product) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO products
             (id, sku, name, description, category, subcategory, image,
              base_price, price_city, price_interior, price_special,
              stock, min_quantity, units_per_box, display_order,
              is_active, hide_in_catalog, parent_sku, variant_name,
              custom_text, custom_select, created_at, updated_at, synced_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                product.id,
                product.sku,
                product.name,
                product.description,
                product.category,
                product.subcategory,
                product.image,
                product.base_price,
                product.price_city,
                product.price_interior,
                product.price_special,
                product.stock,
                product.min_quantity,
                product.units_per_box,
                product.display_order,
                i64::from(product.is_active),
                i64::from(product.hide_in_catalog),
                product.parent_sku,
                product.variant_name,
                product.custom_text,
                product.custom_select,
                product.created_at,
                product.updated_at,
                product.synced_at,
            ],
        )?;
        Ok(())
    }

    /// Remove a product by its remote id. Remote archival (`is_active =
    /// false` in a sync payload) translates to a local hard delete.
    pub fn delete_by_remote_id(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM products WHERE id = ?", [id])?;
        Ok(rows > 0)
    }

    pub fn get_by_sku(&self, sku: &str) -> Result<Option<Product>> {
        let result = self.conn.query_row(
            &format!("{SELECT_PRODUCT} WHERE sku = ?"),
            [sku],
            parse_product,
        );
        match result {
            Ok(product) => Ok(Some(product)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn count(&self) -> Result<i64> {
        let count =
            self.conn
                .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Top-level catalog listing: active base products (variants excluded)
    /// that are not hidden, in display order.
    pub fn list_catalog(&self) -> Result<Vec<Product>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_PRODUCT}
             WHERE is_active = 1
               AND hide_in_catalog = 0
               AND (parent_sku IS NULL OR parent_sku = '')
             ORDER BY display_order IS NULL, display_order ASC, name ASC"
        ))?;
        let products = stmt
            .query_map([], parse_product)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(products)
    }

    /// Variants of a base product, for drill-down listings.
    pub fn list_variants(&self, parent_sku: &str) -> Result<Vec<Product>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_PRODUCT}
             WHERE is_active = 1 AND parent_sku = ?
             ORDER BY display_order IS NULL, display_order ASC, name ASC"
        ))?;
        let products = stmt
            .query_map([parent_sku], parse_product)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(products)
    }

    /// Whether an incoming delta row warrants an image prefetch: the row is
    /// new, or its `image`/`updated_at` differ byte-for-byte from the
    /// stored values. Identical rows must not trigger a redundant download.
    pub fn image_changed(
        &self,
        remote_id: &str,
        image: Option<&str>,
        updated_at: &str,
    ) -> Result<bool> {
        let result = self.conn.query_row(
            "SELECT image, updated_at FROM products WHERE id = ?",
            [remote_id],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, String>(1)?,
                ))
            },
        );
        match result {
            Ok((stored_image, stored_updated)) => {
                Ok(stored_image.as_deref() != image || stored_updated != updated_at)
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

const SELECT_PRODUCT: &str = "SELECT id, sku, name, description, category, subcategory, image,
        base_price, price_city, price_interior, price_special,
        stock, min_quantity, units_per_box, display_order,
        is_active, hide_in_catalog, parent_sku, variant_name,
        custom_text, custom_select, created_at, updated_at, synced_at
    FROM products";

fn parse_product(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        sku: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        subcategory: row.get(5)?,
        image: row.get(6)?,
        base_price: row.get(7)?,
        price_city: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        price_interior: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
        price_special: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
        stock: row.get(11)?,
        min_quantity: row.get(12)?,
        units_per_box: row.get(13)?,
        display_order: row.get(14)?,
        is_active: row.get::<_, i64>(15)? != 0,
        hide_in_catalog: row.get::<_, i64>(16)? != 0,
        parent_sku: row.get(17)?,
        variant_name: row.get(18)?,
        custom_text: row.get(19)?,
        custom_select: row.get(20)?,
        created_at: row.get(21)?,
        updated_at: row.get(22)?,
        synced_at: row.get(23)?,
    })
}
