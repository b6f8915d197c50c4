//! Dogecoin earnings settlement: ledger accounting, withdrawal dispatch over
//! pluggable payment rails, and transaction lifecycle tracking.
//!
//! Layout follows hexagonal lines: `domain` holds the core types and port
//! traits, `application` the engine and background services, `infrastructure`
//! the storage and rail adapters, `interfaces` the inbound surfaces.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
