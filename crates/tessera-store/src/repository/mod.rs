//! SurrealDB repository implementations.

mod consumer;
mod entitlement;
mod owner;
mod pool;
mod product;

pub use consumer::SurrealConsumerRepository;
pub use entitlement::SurrealEntitlementRepository;
pub use owner::SurrealOwnerRepository;
pub use pool::SurrealPoolRepository;
pub use product::SurrealProductRepository;
