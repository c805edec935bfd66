//! Tessera Core — shared domain models, errors, and repository traits.
//!
//! This crate defines the entitlement domain (owners, consumers,
//! products, pools, entitlements) along with the value types the
//! engine computes over (attribute views, temporal windows, validation
//! and compliance results). It has no I/O of its own; persistence is
//! abstracted behind the traits in [`repository`].

pub mod error;
pub mod models;
pub mod repository;

pub use error::{TesseraError, TesseraResult};
