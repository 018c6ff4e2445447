//! FIM-002: Error taxonomy with stable, machine-parseable codes.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the crate.
pub type Result<T> = std::result::Result<T, FimError>;

/// Every failure a monitoring pass, a store, or the config loader can report.
#[derive(Debug, Error)]
pub enum FimError {
    #[error("[FIM-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[FIM-1002] configuration parse failure in {path}: {details}")]
    ConfigParse { path: PathBuf, details: String },

    #[error("[FIM-2001] cannot read content of {path}: {source}")]
    NotReadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[FIM-2002] cannot read metadata of {path}: {source}")]
    StatUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[FIM-2003] cannot monitor {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("[FIM-3001] store {path} unavailable: {source}")]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[FIM-3002] cannot stage rewrite of {path}: {source}")]
    TempWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[FIM-3003] malformed record on line {line} of {path}")]
    StoreCorrupt { path: PathBuf, line: usize },

    #[error("[FIM-3101] sink {path} rejected entry: {source}")]
    Sink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FimError {
    /// Stable code, also embedded in the `Display` output.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "FIM-1001",
            Self::ConfigParse { .. } => "FIM-1002",
            Self::NotReadable { .. } => "FIM-2001",
            Self::StatUnavailable { .. } => "FIM-2002",
            Self::InvalidPath { .. } => "FIM-2003",
            Self::StoreUnavailable { .. } => "FIM-3001",
            Self::TempWriteFailure { .. } => "FIM-3002",
            Self::StoreCorrupt { .. } => "FIM-3003",
            Self::Sink { .. } => "FIM-3101",
        }
    }

    pub fn not_readable(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::NotReadable {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn stat_unavailable(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::StatUnavailable {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn store_unavailable(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::StoreUnavailable {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn temp_write(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::TempWriteFailure {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn sink(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Sink {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
