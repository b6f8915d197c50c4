//! Inbound surfaces: the request API and the CLI command stream.

pub mod api;
pub mod commands;
