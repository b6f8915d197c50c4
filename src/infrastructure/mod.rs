//! Adapters behind the domain ports: storage backends and payment rails.

pub mod in_memory;
pub mod rails;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
