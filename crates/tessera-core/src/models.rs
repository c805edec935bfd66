//! Domain models for Tessera.
//!
//! These are the core types shared across all crates. The engine
//! consumes them as immutable snapshots; only the store mutates them.

pub mod attributes;
pub mod compliance;
pub mod consumer;
pub mod entitlement;
pub mod owner;
pub mod pool;
pub mod product;
pub mod validation;
pub mod window;
