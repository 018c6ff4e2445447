//! fimwatch — file integrity monitoring.
//!
//! Each pass fingerprints a file's content, snapshots its metadata, and
//! compares both against persisted baselines. Metadata changes made by the
//! actor recorded on the baseline are accepted quietly; changes by anyone
//! else, and any content change, raise an alert.

pub mod cli;
pub mod core;
pub mod tripwire;
