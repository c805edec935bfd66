//! Tessera Store — SurrealDB connection management and repository
//! implementations for the `tessera-core` traits.
//!
//! This crate provides:
//! - Connection management ([`StoreManager`], [`StoreConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Error types ([`StoreError`])
//! - One repository implementation per `tessera-core` trait

mod connection;
mod error;
pub mod repository;
mod schema;

pub use connection::{StoreConfig, StoreManager};
pub use error::StoreError;
pub use schema::{run_migrations, schema_v1};
