//! # peartalk-store
//!
//! Durable, append-only message history for one local identity, backed by
//! SQLite. Every message has one primary record keyed by
//! `timestamp || random suffix` and one entry in each of three derived
//! indexes (sender, recipient, timestamp). Indexes are never authoritative:
//! reads trust the primary record and [`Database::repair_indexes`] rebuilds
//! the indexes from it.

pub mod database;
pub mod indexes;
pub mod messages;
pub mod migrations;
pub mod models;

mod error;

pub use database::{store_dir_for, Database};
pub use error::StoreError;
pub use indexes::Index;
pub use models::*;
