//! FIM-003: Configuration — `fimwatch.yaml` parsing and validation.
//!
//! Every field has a default, so an absent config file is equivalent to an
//! empty one. Store and log names are resolved relative to `state_dir`.

use super::errors::{FimError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "fimwatch.yaml";

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FimConfig {
    /// Directory holding both stores and both logs
    pub state_dir: PathBuf,

    /// Fingerprint store file name
    pub fingerprint_store: String,

    /// Metadata store file name
    pub metadata_store: String,

    /// Audit (SIEM) log file name
    pub audit_log: String,

    /// Access log file name
    pub access_log: String,

    /// Content fingerprint scheme
    pub fingerprinter: FingerprintScheme,

    /// Read buffer size for streaming file content
    pub chunk_size: usize,

    /// How alerts reach the user
    pub notify: NotifyMode,
}

impl Default for FimConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("."),
            fingerprint_store: "checksum_store.txt".to_string(),
            metadata_store: "metadata_store.txt".to_string(),
            audit_log: "fim_siem_log.txt".to_string(),
            access_log: "access_log.txt".to_string(),
            fingerprinter: FingerprintScheme::default(),
            chunk_size: 1024,
            notify: NotifyMode::default(),
        }
    }
}

impl FimConfig {
    pub fn fingerprint_store_path(&self) -> PathBuf {
        self.state_dir.join(&self.fingerprint_store)
    }

    pub fn metadata_store_path(&self) -> PathBuf {
        self.state_dir.join(&self.metadata_store)
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.state_dir.join(&self.audit_log)
    }

    pub fn access_log_path(&self) -> PathBuf {
        self.state_dir.join(&self.access_log)
    }
}

/// Fingerprint scheme selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintScheme {
    /// 8-bit XOR fold. Cheap change pre-filter, trivially forgeable.
    #[default]
    Xor8,
    /// BLAKE3 digest.
    Blake3,
}

/// Alert delivery mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyMode {
    #[default]
    Console,
    Silent,
}

/// Validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a config file from disk.
pub fn parse_config_file(path: &Path) -> Result<FimConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FimError::ConfigParse {
        path: path.to_path_buf(),
        details: e.to_string(),
    })?;
    parse_config(&content).map_err(|details| FimError::ConfigParse {
        path: path.to_path_buf(),
        details,
    })
}

/// Parse a config from a YAML string. Empty input yields the defaults.
pub fn parse_config(yaml: &str) -> std::result::Result<FimConfig, String> {
    if yaml.trim().is_empty() {
        return Ok(FimConfig::default());
    }
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &FimConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.chunk_size == 0 {
        errors.push(ValidationError {
            message: "chunk_size must be greater than 0".to_string(),
        });
    }

    let names = [
        ("fingerprint_store", &config.fingerprint_store),
        ("metadata_store", &config.metadata_store),
        ("audit_log", &config.audit_log),
        ("access_log", &config.access_log),
    ];
    for (field, name) in names {
        if name.trim().is_empty() {
            errors.push(ValidationError {
                message: format!("{} must not be empty", field),
            });
        } else if name.contains('/') || name.contains('\\') {
            errors.push(ValidationError {
                message: format!(
                    "{} must be a file name inside state_dir, got '{}'",
                    field, name
                ),
            });
        }
    }

    if config.fingerprint_store == config.metadata_store {
        errors.push(ValidationError {
            message: "fingerprint_store and metadata_store must differ".to_string(),
        });
    }

    errors
}

/// Resolve the effective config.
///
/// An explicit path must exist. Without one, `fimwatch.yaml` in the working
/// directory is used when present, otherwise the defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<FimConfig> {
    let config = match explicit {
        Some(path) => parse_config_file(path)?,
        None => {
            let fallback = Path::new(DEFAULT_CONFIG_FILE);
            if fallback.exists() {
                parse_config_file(fallback)?
            } else {
                log::debug!("no {} found, using defaults", DEFAULT_CONFIG_FILE);
                FimConfig::default()
            }
        }
    };

    let errors = validate_config(&config);
    if !errors.is_empty() {
        let details = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(FimError::InvalidConfig { details });
    }
    Ok(config)
}
