//! Order number allocation.
//!
//! Two independent, monotonically increasing numbering spaces, both derived
//! by scanning the local store so they keep working fully offline:
//!
//! - draft numbers, `A` + 9 digits, for locally-created orders that have
//!   not been sent;
//! - sent numbers, `{agent_number}B` + 8 digits, allocated exactly once
//!   when an order is confirmed-uploaded, immediately before it is written
//!   into history.
//!
//! If the store is unreadable the allocator falls back to a clock-derived
//! number of the same width: monotonicity is sacrificed under that failure
//! but the allocator never errors and never returns an empty number.

use std::sync::OnceLock;

use regex::Regex;
use rusqlite::Connection;

use crate::error::Result;

const DRAFT_WIDTH: usize = 9;
const SENT_WIDTH: usize = 8;

fn draft_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^A\d{9}$").expect("static regex"))
}

fn sent_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+B\d{8}$").expect("static regex"))
}

/// Exact-format check for the draft space (`A000000001`).
pub fn is_valid_draft_number(number: &str) -> bool {
    draft_regex().is_match(number)
}

/// Exact-format check for the sent space (`5B00000001`).
pub fn is_valid_sent_number(number: &str) -> bool {
    sent_regex().is_match(number)
}

pub struct OrderNumberAllocator<'a> {
    conn: &'a Connection,
}

impl<'a> OrderNumberAllocator<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Next draft number: max existing numeric suffix among pending orders
    /// plus one, `A000000001` when none exist.
    pub fn next_draft_number(&self) -> String {
        match self.max_draft_suffix() {
            Ok(max) => format!("A{:0width$}", max + 1, width = DRAFT_WIDTH),
            Err(e) => {
                tracing::warn!("Draft number scan failed, using clock fallback: {e}");
                clock_fallback_draft()
            }
        }
    }

    /// Next sent number for the given agent. Scans both the pending queue
    /// and order history, since a sent number must never repeat across
    /// either table.
    pub fn next_sent_number(&self, agent_number: &str) -> String {
        match self.max_sent_suffix(agent_number) {
            Ok(max) => format!("{agent_number}B{:0width$}", max + 1, width = SENT_WIDTH),
            Err(e) => {
                tracing::warn!("Sent number scan failed, using clock fallback: {e}");
                clock_fallback_sent(agent_number)
            }
        }
    }

    fn max_draft_suffix(&self) -> Result<u64> {
        let numbers = self.numbers_like("pending_orders", "A%")?;
        Ok(numbers
            .iter()
            .filter(|n| is_valid_draft_number(n))
            .filter_map(|n| n[1..].parse::<u64>().ok())
            .max()
            .unwrap_or(0))
    }

    fn max_sent_suffix(&self, agent_number: &str) -> Result<u64> {
        let prefix = format!("{agent_number}B");
        let pattern = format!("{prefix}%");
        let mut numbers = self.numbers_like("pending_orders", &pattern)?;
        numbers.extend(self.numbers_like("order_history", &pattern)?);
        Ok(numbers
            .iter()
            .filter(|n| is_valid_sent_number(n) && n.starts_with(&prefix))
            .filter_map(|n| n[prefix.len()..].parse::<u64>().ok())
            .max()
            .unwrap_or(0))
    }

    fn numbers_like(&self, table: &str, pattern: &str) -> Result<Vec<String>> {
        let sql = format!("SELECT order_number FROM {table} WHERE order_number LIKE ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([pattern], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn clock_fallback_draft() -> String {
    let millis = chrono::Utc::now().timestamp_millis().unsigned_abs();
    format!("A{:0width$}", millis % 10_u64.pow(9), width = DRAFT_WIDTH)
}

fn clock_fallback_sent(agent_number: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis().unsigned_abs();
    format!(
        "{agent_number}B{:0width$}",
        millis % 10_u64.pow(8),
        width = SENT_WIDTH
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::{Database, OrderRepository};
    use crate::models::{OrderStatus, PendingOrder};

    fn order(id: &str, number: &str) -> PendingOrder {
        PendingOrder {
            id: id.to_string(),
            order_number: number.to_string(),
            client_id: Some("c1".to_string()),
            status: OrderStatus::Pending.as_str().to_string(),
            subtotal: "100.00".to_string(),
            tax: "0.00".to_string(),
            total: "100.00".to_string(),
            created_at: format!("2024-05-01T10:00:00.{:03}Z", id.len()),
            ..PendingOrder::default()
        }
    }

    #[test]
    fn first_draft_number() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock();
        let alloc = OrderNumberAllocator::new(&conn);
        assert_eq!(alloc.next_draft_number(), "A000000001");
    }

    #[test]
    fn draft_numbers_are_monotonic() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock();
        let repo = OrderRepository::new(&conn);
        repo.create_pending(&order("o1", "A000000041"), &[]).unwrap();
        repo.create_pending(&order("o2", "A000000007"), &[]).unwrap();

        let alloc = OrderNumberAllocator::new(&conn);
        assert_eq!(alloc.next_draft_number(), "A000000042");
    }

    #[test]
    fn malformed_numbers_are_ignored() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock();
        let repo = OrderRepository::new(&conn);
        repo.create_pending(&order("o1", "A12"), &[]).unwrap();
        repo.create_pending(&order("o2", "AXYZ999999"), &[]).unwrap();

        let alloc = OrderNumberAllocator::new(&conn);
        assert_eq!(alloc.next_draft_number(), "A000000001");
    }

    #[test]
    fn sent_numbers_scan_pending_and_history() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock();
        let repo = OrderRepository::new(&conn);
        repo.create_pending(&order("o1", "5B00000003"), &[]).unwrap();
        repo.create_pending(&order("o2", "5B00000010"), &[]).unwrap();
        repo.promote("o2", "5B00000010", "2024-05-02T00:00:00Z")
            .unwrap();

        let alloc = OrderNumberAllocator::new(&conn);
        assert_eq!(alloc.next_sent_number("5"), "5B00000011");
    }

    #[test]
    fn sent_numbers_strictly_increase_across_promotions() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock();
        let repo = OrderRepository::new(&conn);
        let alloc = OrderNumberAllocator::new(&conn);

        let mut previous = 0_u64;
        for cycle in 0..5 {
            let id = format!("o{cycle}");
            let draft_number = alloc.next_draft_number();
            assert!(is_valid_draft_number(&draft_number));
            repo.create_pending(&order(&id, &draft_number), &[]).unwrap();

            let sent_number = alloc.next_sent_number("5");
            assert!(is_valid_sent_number(&sent_number));
            let suffix = sent_number["5B".len()..].parse::<u64>().unwrap();
            assert!(suffix > previous, "{sent_number} after {previous}");
            previous = suffix;

            repo.promote(&id, &sent_number, "2024-05-02T00:00:00Z").unwrap();
        }

        // Five promoted orders, numbered 1 through 5 with no reuse.
        assert_eq!(previous, 5);
    }

    #[test]
    fn sent_spaces_are_per_agent() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock();
        let repo = OrderRepository::new(&conn);
        repo.create_pending(&order("o1", "12B00000099"), &[]).unwrap();

        let alloc = OrderNumberAllocator::new(&conn);
        assert_eq!(alloc.next_sent_number("5"), "5B00000001");
        assert_eq!(alloc.next_sent_number("12"), "12B00000100");
    }

    #[test]
    fn fallback_when_store_unreadable() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock();
        conn.execute_batch("DROP TABLE pending_orders").unwrap();

        let alloc = OrderNumberAllocator::new(&conn);
        let number = alloc.next_draft_number();
        assert!(is_valid_draft_number(&number));
        let number = alloc.next_sent_number("5");
        assert!(is_valid_sent_number(&number));
    }

    #[test]
    fn format_validators() {
        assert!(is_valid_draft_number("A000000001"));
        assert!(!is_valid_draft_number("A1"));
        assert!(!is_valid_draft_number("B000000001"));
        assert!(is_valid_sent_number("5B00000001"));
        assert!(is_valid_sent_number("12B00000001"));
        assert!(!is_valid_sent_number("B00000001"));
        assert!(!is_valid_sent_number("5B001"));
    }
}
