//! Tripwire — content fingerprints, metadata drift, audit trail, pass engine.

pub mod drift;
pub mod engine;
pub mod eventlog;
pub mod hasher;
