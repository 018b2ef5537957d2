//! WooCommerce REST API source for the query layer.

pub mod client;
pub mod collections;
pub mod config;
pub mod request;

pub use client::WooClient;
pub use collections::{default_collections, default_query_config};
pub use config::WooConfig;
