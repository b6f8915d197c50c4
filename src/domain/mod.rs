//! Domain layer: core types, the settlement state machine and the ports the
//! application layer is wired through.

pub mod account;
pub mod address;
pub mod ports;
pub mod record;
