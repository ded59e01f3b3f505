//! Pending order queue and durable order history.
//!
//! An order and its items always move together: creation, promotion to
//! history, and deletion each run inside one transaction so a crash can
//! never leave an order present in history but still queued (or half of
//! either).

use rusqlite::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::models::{
    HistoryOrder, HistoryOrderItem, OrderStatus, PendingOrder, PendingOrderItem, STATUS_SENT,
};

pub struct OrderRepository<'a> {
    conn: &'a Connection,
}

impl<'a> OrderRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Write a captured order and its items atomically.
    pub fn create_pending(
        &self,
        order: &PendingOrder,
        items: &[PendingOrderItem],
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO pending_orders
             (id, client_id, order_number, status, subtotal, tax, total,
              customer_name, customer_note, created_at, updated_at, synced)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                order.id,
                order.client_id,
                order.order_number,
                order.status,
                order.subtotal,
                order.tax,
                order.total,
                order.customer_name,
                order.customer_note,
                order.created_at,
                order.updated_at,
                i64::from(order.synced),
            ],
        )?;
        for item in items {
            insert_pending_item(&tx, item)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Orders eligible for automatic upload: queued, never draft.
    pub fn pending_for_upload(&self) -> Result<Vec<PendingOrder>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_PENDING} WHERE synced = 0 AND status = 'pending' ORDER BY created_at ASC"
        ))?;
        let orders = stmt
            .query_map([], parse_pending)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(orders)
    }

    pub fn get_pending(&self, id: &str) -> Result<Option<PendingOrder>> {
        let result = self.conn.query_row(
            &format!("{SELECT_PENDING} WHERE id = ?"),
            [id],
            parse_pending,
        );
        match result {
            Ok(order) => Ok(Some(order)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve an upload result back to its order via the offline creation
    /// timestamp, the only key the remote echoes back.
    pub fn find_pending_by_created_at(&self, created_at: &str) -> Result<Option<PendingOrder>> {
        let result = self.conn.query_row(
            &format!("{SELECT_PENDING} WHERE created_at = ?"),
            [created_at],
            parse_pending,
        );
        match result {
            Ok(order) => Ok(Some(order)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn pending_items(&self, order_id: &str) -> Result<Vec<PendingOrderItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, order_id, product_id, product_name, quantity,
                    price_per_unit, subtotal, custom_text, custom_select
             FROM pending_order_items WHERE order_id = ?",
        )?;
        let items = stmt
            .query_map([order_id], |row| {
                Ok(PendingOrderItem {
                    id: row.get(0)?,
                    order_id: row.get(1)?,
                    product_id: row.get(2)?,
                    product_name: row.get(3)?,
                    quantity: row.get(4)?,
                    price_per_unit: row.get(5)?,
                    subtotal: row.get(6)?,
                    custom_text: row.get(7)?,
                    custom_select: row.get(8)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Move a draft into the upload queue.
    pub fn queue_draft(&self, id: &str) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE pending_orders SET status = ?, synced = 0 WHERE id = ? AND status = ?",
            params![
                OrderStatus::Pending.as_str(),
                id,
                OrderStatus::Draft.as_str()
            ],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Promote a confirmed-uploaded order: write the history row and items
    /// with the freshly allocated sent number and delete the pending order
    /// and its items, all in one transaction.
    pub fn promote(&self, pending_id: &str, sent_number: &str, now: &str) -> Result<()> {
        let order = self
            .get_pending(pending_id)?
            .ok_or_else(|| Error::NotFound(pending_id.to_string()))?;
        let items = self.pending_items(pending_id)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO order_history
             (id, client_id, order_number, status, subtotal, tax, total,
              customer_name, customer_note, created_at, synced_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                order.id,
                order.client_id,
                sent_number,
                STATUS_SENT,
                order.subtotal,
                order.tax,
                order.total,
                order.customer_name,
                order.customer_note,
                order.created_at,
                now,
            ],
        )?;
        for item in &items {
            tx.execute(
                "INSERT INTO order_history_items
                 (id, order_id, product_id, product_name, quantity, price_per_unit, subtotal)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    item.id,
                    order.id,
                    item.product_id,
                    item.product_name,
                    item.quantity,
                    item.price_per_unit,
                    item.subtotal,
                ],
            )?;
        }
        tx.execute(
            "DELETE FROM pending_order_items WHERE order_id = ?",
            [pending_id],
        )?;
        tx.execute("DELETE FROM pending_orders WHERE id = ?", [pending_id])?;
        tx.commit()?;

        tracing::info!(order_id = %pending_id, order_number = %sent_number, "Order promoted to history");
        Ok(())
    }

    /// Delete a pending order and its items atomically.
    pub fn delete_pending(&self, id: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM pending_order_items WHERE order_id = ?", [id])?;
        tx.execute("DELETE FROM pending_orders WHERE id = ?", [id])?;
        tx.commit()?;
        Ok(())
    }

    /// Idempotent upsert of a remote history order: re-pulling an
    /// already-known order must not duplicate it.
    pub fn upsert_history(
        &self,
        order: &HistoryOrder,
        items: &[HistoryOrderItem],
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO order_history
             (id, user_id, client_id, client_name, order_number, status,
              subtotal, tax, total, notes, customer_name, customer_note,
              created_at, updated_at, synced_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                order.id,
                order.user_id,
                order.client_id,
                order.client_name,
                order.order_number,
                order.status,
                order.subtotal,
                order.tax,
                order.total,
                order.notes,
                order.customer_name,
                order.customer_note,
                order.created_at,
                order.updated_at,
                order.synced_at,
            ],
        )?;
        for item in items {
            tx.execute(
                "INSERT OR REPLACE INTO order_history_items
                 (id, order_id, product_id, product_name, quantity, price_per_unit, subtotal)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    item.id,
                    order.id,
                    item.product_id,
                    item.product_name,
                    item.quantity,
                    item.price_per_unit,
                    item.subtotal,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn history(&self) -> Result<Vec<HistoryOrder>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, client_id, client_name, order_number, status,
                    subtotal, tax, total, notes, customer_name, customer_note,
                    created_at, updated_at, synced_at
             FROM order_history ORDER BY created_at DESC",
        )?;
        let orders = stmt
            .query_map([], parse_history)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(orders)
    }

    pub fn pending_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM pending_orders", [], |row| row.get(0))?;
        Ok(count)
    }
}

const SELECT_PENDING: &str = "SELECT id, client_id, order_number, status, subtotal, tax, total,
        customer_name, customer_note, created_at, updated_at, synced
    FROM pending_orders";

fn insert_pending_item(conn: &Connection, item: &PendingOrderItem) -> Result<()> {
    conn.execute(
        "INSERT INTO pending_order_items
         (id, order_id, product_id, product_name, quantity,
          price_per_unit, subtotal, custom_text, custom_select)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            item.id,
            item.order_id,
            item.product_id,
            item.product_name,
            item.quantity,
            item.price_per_unit,
            item.subtotal,
            item.custom_text,
            item.custom_select,
        ],
    )?;
    Ok(())
}

fn parse_pending(row: &Row<'_>) -> rusqlite::Result<PendingOrder> {
    Ok(PendingOrder {
        id: row.get(0)?,
        client_id: row.get(1)?,
        order_number: row.get(2)?,
        status: row.get(3)?,
        subtotal: row.get(4)?,
        tax: row.get(5)?,
        total: row.get(6)?,
        customer_name: row.get(7)?,
        customer_note: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        synced: row.get::<_, i64>(11)? != 0,
    })
}

fn parse_history(row: &Row<'_>) -> rusqlite::Result<HistoryOrder> {
    Ok(HistoryOrder {
        id: row.get(0)?,
        user_id: row.get(1)?,
        client_id: row.get(2)?,
        client_name: row.get(3)?,
        order_number: row.get(4)?,
        status: row.get(5)?,
        subtotal: row.get(6)?,
        tax: row.get(7)?,
        total: row.get(8)?,
        notes: row.get(9)?,
        customer_name: row.get(10)?,
        customer_note: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        synced_at: row.get(14)?,
    })
}
