//! Tessera Engine — entitlement policy evaluation.
//!
//! The engine decides who may consume what: per-pool eligibility,
//! stack coverage arithmetic, autobind pool selection, and compliance
//! classification. Every evaluation component is a pure function over
//! immutable snapshots of consumer, pool, and entitlement state; the
//! only async code is [`BindService`], which loads snapshots through
//! the `tessera-core` repository traits and persists bind decisions.

pub mod autobind;
pub mod compliance;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod quantity;
pub mod service;
pub mod snapshot;
pub mod stacking;

pub use config::{EngineConfig, RankCriterion, SlaStrictness};
pub use error::{EngineError, EngineResult};
pub use service::BindService;
