//! Core state — types, errors, configuration, and the two baseline stores.

pub mod checksums;
pub mod config;
pub mod errors;
pub mod state;
pub mod types;
