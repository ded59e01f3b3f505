//! Ephemeral cart storage.

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::CartItem;

use super::order_repository::OrderRepository;

pub struct CartRepository<'a> {
    conn: &'a Connection,
}

impl<'a> CartRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Replace the whole cart with the given items.
    pub fn replace(&self, items: &[CartItem]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM cart_items", [])?;
        for item in items {
            tx.execute(
                "INSERT OR REPLACE INTO cart_items
                 (product_sku, product_name, quantity, price_per_unit, custom_text)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    item.product_sku,
                    item.product_name,
                    item.quantity,
                    item.price_per_unit,
                    item.custom_text,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<CartItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT product_sku, product_name, quantity, price_per_unit, custom_text
             FROM cart_items ORDER BY product_name ASC",
        )?;
        let items = stmt
            .query_map([], |row| {
                Ok(CartItem {
                    product_sku: row.get(0)?,
                    product_name: row.get(1)?,
                    quantity: row.get(2)?,
                    price_per_unit: row.get(3)?,
                    custom_text: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM cart_items", [])?;
        Ok(())
    }

    /// "Continue editing" flow: load a pending order's items back into the
    /// cart and remove the pending order, as one unit. The order will be
    /// re-captured by the next checkout.
    pub fn resume_pending_order(&self, order_id: &str) -> Result<Vec<CartItem>> {
        let orders = OrderRepository::new(self.conn);
        if orders.get_pending(order_id)?.is_none() {
            return Err(Error::NotFound(order_id.to_string()));
        }
        let pending_items = orders.pending_items(order_id)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM cart_items", [])?;
        for item in &pending_items {
            tx.execute(
                "INSERT OR REPLACE INTO cart_items
                 (product_sku, product_name, quantity, price_per_unit, custom_text)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    item.product_id,
                    item.product_name,
                    item.quantity,
                    item.price_per_unit,
                    item.custom_text,
                ],
            )?;
        }
        tx.execute(
            "DELETE FROM pending_order_items WHERE order_id = ?",
            [order_id],
        )?;
        tx.execute("DELETE FROM pending_orders WHERE id = ?", [order_id])?;
        tx.commit()?;

        self.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{OrderStatus, PendingOrder, PendingOrderItem};

    fn item(sku: &str, quantity: i64) -> CartItem {
        CartItem {
            product_sku: sku.to_string(),
            product_name: format!("Product {sku}"),
            quantity,
            price_per_unit: "1.50".to_string(),
            custom_text: None,
        }
    }

    #[test]
    fn test_replace_and_clear() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock();
        let repo = CartRepository::new(&conn);

        repo.replace(&[item("A", 2), item("B", 1)]).unwrap();
        assert_eq!(repo.list().unwrap().len(), 2);

        repo.replace(&[item("C", 5)]).unwrap();
        let items = repo.list().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_sku, "C");

        repo.clear().unwrap();
        assert!(repo.list().unwrap().is_empty());
    }

    #[test]
    fn test_resume_pending_order_moves_items_to_cart() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock();
        let orders = OrderRepository::new(&conn);
        let cart = CartRepository::new(&conn);

        let order = PendingOrder {
            id: "o1".to_string(),
            order_number: "A000000001".to_string(),
            status: OrderStatus::Draft.as_str().to_string(),
            subtotal: "3.00".to_string(),
            tax: "0.00".to_string(),
            total: "3.00".to_string(),
            created_at: "2024-05-01T10:00:00Z".to_string(),
            ..PendingOrder::default()
        };
        let items = vec![PendingOrderItem {
            id: "o1-i1".to_string(),
            order_id: "o1".to_string(),
            product_id: "p1".to_string(),
            product_name: "Oil 3-in-1".to_string(),
            quantity: 2,
            price_per_unit: "1.50".to_string(),
            subtotal: "3.00".to_string(),
            ..PendingOrderItem::default()
        }];
        orders.create_pending(&order, &items).unwrap();

        let cart_items = cart.resume_pending_order("o1").unwrap();
        assert_eq!(cart_items.len(), 1);
        assert_eq!(cart_items[0].quantity, 2);

        assert!(orders.get_pending("o1").unwrap().is_none());
        assert!(orders.pending_items("o1").unwrap().is_empty());
    }
}
