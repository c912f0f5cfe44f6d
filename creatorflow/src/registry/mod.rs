//! Run registry: effectively-once launch bookkeeping and ownership.
//!
//! This module provides:
//! - Idempotent run record creation keyed by run id
//! - The compare-and-swap ownership pointer that serializes runners
//! - Guarded status writes and best-effort heartbeats

#[cfg(test)]
mod registry_tests;
mod runs;
mod store;

pub use runs::PipelineRegistry;
pub use store::{InMemoryRegistryStore, OwnershipSwap, RegistryStore};
