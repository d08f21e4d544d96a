//! Core types and reconciliation engine for the wattfeed free electricity event aggregator.

/// Revalidation token and snapshot cache for conditional fetches.
pub mod cache;
/// Wire representation shared by the published file and the community feed.
pub mod feed;
/// Domain models: events, their keys, and ordered datasets.
pub mod model;
/// Traits describing event sources and the transports they rely on.
pub mod ports;
/// Merges upstream events into the published dataset.
pub mod reconcile;
/// Durable storage for the published dataset.
pub mod store;

pub use cache::*;
pub use feed::*;
pub use model::*;
pub use ports::*;
pub use reconcile::*;
pub use store::*;
