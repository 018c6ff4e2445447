//! FIM-015: Append-only audit and access logs, and alert delivery.
//!
//! Log lines are `[<timestamp>] <message>`. Files are opened in append mode
//! per entry and never truncated or rotated here.

use crate::core::errors::{FimError, Result};
use parking_lot::Mutex;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Decision points written to the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    AccessTracked { path: String },
    InvalidPath { path: String },
    MetadataUnavailable { path: String },
    ContentUnreadable { path: String },
    MetadataStored { path: String, actor: String },
    MetadataVerified { path: String },
    MetadataChangedBySameActor { path: String, actor: String },
    MetadataChangedByOtherActor { path: String, recorded: String, actor: String },
    MetadataRewriteFailed { path: String },
    ChecksumStoreUnavailable { path: String },
    ChecksumStored { path: String, fingerprint: String },
    IntegrityVerified { path: String },
    IntegrityViolation { path: String, old: String, new: String },
    ChecksumUpdated { path: String },
}

impl AuditEvent {
    /// Alerts are the events that also interrupt the user.
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            Self::MetadataChangedByOtherActor { .. } | Self::IntegrityViolation { .. }
        )
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessTracked { path } => write!(f, "File access tracked. ({})", path),
            Self::InvalidPath { path } => write!(f, "ERROR: Path cannot be monitored. ({})", path),
            Self::MetadataUnavailable { path } => {
                write!(f, "ERROR: Cannot get file metadata. ({})", path)
            }
            Self::ContentUnreadable { path } => {
                write!(f, "ERROR: Cannot open monitored file. ({})", path)
            }
            Self::MetadataStored { path, actor } => {
                write!(f, "New metadata stored with user info. ({}, user: {})", path, actor)
            }
            Self::MetadataVerified { path } => {
                write!(f, "Metadata Verified: No changes. ({})", path)
            }
            Self::MetadataChangedBySameActor { path, actor } => write!(
                f,
                "Metadata changed by original user; no alert. ({}, user: {})",
                path, actor
            ),
            Self::MetadataChangedByOtherActor {
                path,
                recorded,
                actor,
            } => write!(
                f,
                "ALERT: Metadata change by a different user! ({}, recorded: {}, current: {})",
                path, recorded, actor
            ),
            Self::MetadataRewriteFailed { path } => {
                write!(f, "ERROR: Cannot create temporary metadata file. ({})", path)
            }
            Self::ChecksumStoreUnavailable { path } => {
                write!(f, "ERROR: Cannot open checksum storage file. ({})", path)
            }
            Self::ChecksumStored { path, fingerprint } => {
                write!(f, "New checksum stored. ({} {})", path, fingerprint)
            }
            Self::IntegrityVerified { path } => {
                write!(f, "Integrity Verified: File unchanged. ({})", path)
            }
            Self::IntegrityViolation { path, old, new } => write!(
                f,
                "ALERT: File integrity violation detected! ({}, old: {}, new: {})",
                path, old, new
            ),
            Self::ChecksumUpdated { path } => {
                write!(f, "Checksum updated after tampering detected. ({})", path)
            }
        }
    }
}

/// Timestamp in `ctime(3)` layout, local time.
pub fn timestamp() -> String {
    chrono::Local::now().format("%a %b %e %H:%M:%S %Y").to_string()
}

/// Receives every decision point of a pass.
pub trait AuditSink: Send + Sync {
    fn audit(&self, event: &AuditEvent) -> Result<()>;
}

/// Records that a path was examined.
pub trait AccessTracker: Send + Sync {
    fn track_access(&self, path: &str) -> Result<()>;
}

/// Interrupts the user. Delivery is best-effort.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str) -> Result<()>;
}

/// Append one `[ts] message` line to `path`.
pub fn append_line(path: &Path, message: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| FimError::sink(parent, e))?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| FimError::sink(path, e))?;
    writeln!(file, "[{}] {}", timestamp(), message).map_err(|e| FimError::sink(path, e))
}

/// Audit (SIEM) log file.
#[derive(Debug, Clone)]
pub struct FileAuditLog {
    path: PathBuf,
}

impl FileAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAuditLog {
    fn audit(&self, event: &AuditEvent) -> Result<()> {
        append_line(&self.path, &event.to_string())
    }
}

/// Access log file. Each entry is also audited as `AccessTracked`.
pub struct FileAccessLog<A> {
    path: PathBuf,
    audit: A,
}

impl<A: AuditSink> FileAccessLog<A> {
    pub fn new(path: impl Into<PathBuf>, audit: A) -> Self {
        Self {
            path: path.into(),
            audit,
        }
    }
}

impl<A: AuditSink> AccessTracker for FileAccessLog<A> {
    fn track_access(&self, path: &str) -> Result<()> {
        append_line(&self.path, &format!("Accessed: {}", path))?;
        self.audit.audit(&AuditEvent::AccessTracked {
            path: path.to_string(),
        })
    }
}

/// Prints alerts to standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, message: &str) -> Result<()> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "NOTIFY: {}", message)
            .and_then(|()| out.flush())
            .map_err(|e| FimError::sink("<stdout>", e))
    }
}

/// Logs alerts at `warn` and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, message: &str) -> Result<()> {
        log::warn!("alert suppressed (notify: silent): {}", message);
        Ok(())
    }
}

/// In-memory sink for tests and embedding: keeps every audit event, access
/// and notification in order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
    accesses: Mutex<Vec<String>>,
    notifications: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn accesses(&self) -> Vec<String> {
        self.accesses.lock().clone()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().clone()
    }
}

impl AuditSink for MemorySink {
    fn audit(&self, event: &AuditEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

impl AccessTracker for MemorySink {
    fn track_access(&self, path: &str) -> Result<()> {
        self.accesses.lock().push(path.to_string());
        Ok(())
    }
}

impl Notifier for MemorySink {
    fn notify(&self, message: &str) -> Result<()> {
        self.notifications.lock().push(message.to_string());
        Ok(())
    }
}

impl<T: AuditSink + ?Sized> AuditSink for std::sync::Arc<T> {
    fn audit(&self, event: &AuditEvent) -> Result<()> {
        (**self).audit(event)
    }
}

impl<T: AccessTracker + ?Sized> AccessTracker for std::sync::Arc<T> {
    fn track_access(&self, path: &str) -> Result<()> {
        (**self).track_access(path)
    }
}

impl<T: Notifier + ?Sized> Notifier for std::sync::Arc<T> {
    fn notify(&self, message: &str) -> Result<()> {
        (**self).notify(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fim015_timestamp_layout() {
        let ts = timestamp();
        // e.g. "Sun Oct 18 09:05:01 2026"
        assert_eq!(ts.split_whitespace().count(), 5);
        assert!(ts.ends_with(|c: char| c.is_ascii_digit()));
    }

    #[test]
    fn test_fim015_append_line_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fim_siem_log.txt");
        append_line(&path, "hello").unwrap();
        append_line(&path, "world").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] hello"));
        assert!(lines[1].ends_with("] world"));
    }

    #[test]
    fn test_fim015_audit_log_appends_event_text() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileAuditLog::new(dir.path().join("logs/fim_siem_log.txt"));
        log.audit(&AuditEvent::IntegrityVerified {
            path: "f".to_string(),
        })
        .unwrap();
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.contains("Integrity Verified: File unchanged. (f)"));
    }

    #[test]
    fn test_fim015_access_log_also_audits() {
        let dir = tempfile::tempdir().unwrap();
        let audit = std::sync::Arc::new(MemorySink::new());
        let access = FileAccessLog::new(dir.path().join("access_log.txt"), audit.clone());
        access.track_access("/etc/passwd").unwrap();

        let content = std::fs::read_to_string(dir.path().join("access_log.txt")).unwrap();
        assert!(content.trim_end().ends_with("] Accessed: /etc/passwd"));
        assert_eq!(
            audit.events(),
            vec![AuditEvent::AccessTracked {
                path: "/etc/passwd".to_string()
            }]
        );
    }

    #[test]
    fn test_fim015_sink_failure_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for append.
        let err = append_line(dir.path(), "x").unwrap_err();
        assert_eq!(err.code(), "FIM-3101");
    }

    #[test]
    fn test_fim015_alert_events() {
        assert!(AuditEvent::IntegrityViolation {
            path: "f".into(),
            old: "60".into(),
            new: "67".into()
        }
        .is_alert());
        assert!(!AuditEvent::MetadataChangedBySameActor {
            path: "f".into(),
            actor: "alice".into()
        }
        .is_alert());
    }

    #[test]
    fn test_fim015_memory_sink_records() {
        let sink = MemorySink::new();
        sink.notify("one").unwrap();
        sink.track_access("f").unwrap();
        assert_eq!(sink.notifications(), vec!["one".to_string()]);
        assert_eq!(sink.accesses(), vec!["f".to_string()]);
        assert!(sink.events().is_empty());
        SilentNotifier.notify("quiet").unwrap();
    }
}
