//! Database layer for Rutero

mod cart_repository;
mod client_repository;
mod config_repository;
mod connection;
mod migrations;
mod order_repository;
mod product_repository;

pub use cart_repository::CartRepository;
pub use client_repository::ClientRepository;
pub use config_repository::ConfigRepository;
pub use connection::Database;
pub use migrations::CURRENT_VERSION;
pub use order_repository::OrderRepository;
pub use product_repository::ProductRepository;
