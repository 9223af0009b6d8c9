//! Blogcache Storage - Key/value adapters behind each tier
//!
//! A tier never talks to a concrete store; it holds an
//! `Arc<dyn StorageAdapter>`. This crate provides the trait and two
//! implementations:
//!
//! - [`MemoryStorage`]: process-local map with an optional byte quota.
//!   Used for the memory and session tiers, and in tests to simulate a
//!   disabled or full store.
//! - [`FileStorage`]: one file per key under a directory. Used for the
//!   durable tier so entries survive restarts.

mod adapter;
mod error;
mod file;
mod memory;

pub use adapter::StorageAdapter;
pub use error::StorageError;
pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
