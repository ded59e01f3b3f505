//! rutero-core - Core library for Rutero
//!
//! Offline-first engine for the field sales client: local SQLite mirror of
//! the catalog and client book, pending order queue, sync pipeline, and
//! image cache. The UI shells consume this crate and never touch the
//! backend or the database directly.

pub mod db;
pub mod error;
pub mod images;
pub mod models;
pub mod order_number;
pub mod pricing;
pub mod remote;
pub mod sync;

pub use error::{Error, Result};
pub use models::{Client, PendingOrder, Product};
