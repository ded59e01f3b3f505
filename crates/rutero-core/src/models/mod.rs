//! Data models for Rutero

mod cart;
mod client;
mod display;
mod order;
mod product;

pub use cart::CartItem;
pub use client::Client;
pub use display::{default_display_fields, DisplayField};
pub use order::{
    HistoryOrder, HistoryOrderItem, OrderStatus, PendingOrder, PendingOrderItem, STATUS_SENT,
};
pub use product::Product;
