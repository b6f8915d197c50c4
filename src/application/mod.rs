//! Orchestration layer: the settlement engine and its background services.

pub mod engine;
pub mod monitor;
pub mod scheduler;
pub mod selector;

#[cfg(test)]
pub(crate) mod testkit;
