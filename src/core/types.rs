//! FIM-001: Baseline records, observations, and pass outcomes.
//!
//! Both stores key their records by the monitored path exactly as the caller
//! supplied it. Store lines are whitespace-delimited, so neither keys nor
//! actor names may contain whitespace.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Fingerprints
// ============================================================================

/// Opaque content fingerprint token, as written to the fingerprint store.
///
/// The XOR fold renders as two lowercase hex digits (`"60"`); a BLAKE3 digest
/// renders as `"blake3:{hex}"`. Stores and the classifier only compare tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Read a token from the store. A bare one- or two-digit hex token is an
    /// 8-bit fold value and is brought to the form the fold renders (two
    /// lowercase digits), so `6`, `06` and `6A`/`6a` compare by value.
    pub fn from_stored(token: &str) -> Self {
        if (1..=2).contains(&token.len()) && token.bytes().all(|b| b.is_ascii_hexdigit()) {
            if let Ok(value) = u8::from_str_radix(token, 16) {
                return Self(format!("{:02x}", value));
            }
        }
        Self::new(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One line of the fingerprint store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub path: String,
    pub fingerprint: Fingerprint,
}

impl FingerprintRecord {
    /// Parse `<path> <fingerprint>`. Returns `None` for anything else.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let path = fields.next()?;
        let token = fields.next()?;
        if fields.next().is_some() {
            return None;
        }
        Some(Self {
            path: path.to_string(),
            fingerprint: Fingerprint::from_stored(token),
        })
    }

    pub fn to_line(&self) -> String {
        format!("{} {}", self.path, self.fingerprint)
    }
}

/// Result of checking a fresh fingerprint against the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum FingerprintVerdict {
    New,
    Unchanged,
    Changed { old: Fingerprint, new: Fingerprint },
}

impl fmt::Display for FingerprintVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Unchanged => write!(f, "UNCHANGED"),
            Self::Changed { .. } => write!(f, "CHANGED"),
        }
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Mask applied to `st_mode`: permission, setuid, setgid and sticky bits.
pub const MODE_MASK: u32 = 0o7777;

/// Metadata baseline for one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub path: String,
    /// Opaque identity; may be reused after deletion.
    pub inode: u64,
    /// Low 12 bits of the mode only.
    pub permissions: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime: i64,
    pub ctime: i64,
    /// Identity attributed to the last accepted change.
    pub recorded_actor: String,
}

impl MetadataRecord {
    /// Parse `<path> <inode> <perms> <uid> <gid> <mtime> <ctime> <actor>`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [path, inode, perms, uid, gid, mtime, ctime, actor] = fields.as_slice() else {
            return None;
        };
        Some(Self {
            path: (*path).to_string(),
            inode: inode.parse().ok()?,
            permissions: perms.parse::<u32>().ok()? & MODE_MASK,
            uid: uid.parse().ok()?,
            gid: gid.parse().ok()?,
            mtime: mtime.parse().ok()?,
            ctime: ctime.parse().ok()?,
            recorded_actor: (*actor).to_string(),
        })
    }

    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {} {} {} {} {}",
            self.path,
            self.inode,
            self.permissions,
            self.uid,
            self.gid,
            self.mtime,
            self.ctime,
            self.recorded_actor
        )
    }
}

/// Outcome of reconciling a fresh metadata snapshot against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataOutcome {
    FirstSeen,
    VerifiedUnchanged,
    UpdatedBySameActor,
    FlaggedOtherActor,
}

impl MetadataOutcome {
    /// Whether this outcome interrupts the user.
    pub fn is_alert(self) -> bool {
        self == Self::FlaggedOtherActor
    }
}

impl fmt::Display for MetadataOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstSeen => write!(f, "FIRST-SEEN"),
            Self::VerifiedUnchanged => write!(f, "VERIFIED"),
            Self::UpdatedBySameActor => write!(f, "UPDATED"),
            Self::FlaggedOtherActor => write!(f, "FLAGGED"),
        }
    }
}

// ============================================================================
// Actors
// ============================================================================

/// Self-reported identity of whoever runs the pass.
///
/// Read from the environment and therefore spoofable. Attribution built on it
/// is advisory: it decides whether to *alert*, never whether to *trust*.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ReportedActor(String);

impl ReportedActor {
    pub const UNKNOWN: &'static str = "UNKNOWN";

    /// Whitespace is replaced with `_` so the name fits one store field.
    pub fn new(name: &str) -> Self {
        let name = name.trim();
        if name.is_empty() {
            return Self(Self::UNKNOWN.to_string());
        }
        Self(
            name.chars()
                .map(|c| if c.is_whitespace() { '_' } else { c })
                .collect(),
        )
    }

    /// `USER`, then `USERNAME`, then `UNKNOWN`.
    pub fn from_env() -> Self {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .map(|name| Self::new(&name))
            .unwrap_or_else(|_| Self::new(Self::UNKNOWN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReportedActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fresh view of a path taken at the start of a pass. Never cached.
#[derive(Debug, Clone)]
pub struct Observation {
    pub metadata: MetadataRecord,
    pub fingerprint: Fingerprint,
    pub actor: ReportedActor,
}

// ============================================================================
// Pass report
// ============================================================================

/// What one monitoring pass decided.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub path: String,
    pub actor: ReportedActor,
    pub metadata: MetadataOutcome,
    pub fingerprint: FingerprintVerdict,
    /// Notifications that were attempted during the pass.
    pub notifications: u32,
}

impl PassReport {
    pub fn is_clean(&self) -> bool {
        !self.metadata.is_alert() && !matches!(self.fingerprint, FingerprintVerdict::Changed { .. })
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.metadata {
            MetadataOutcome::FirstSeen => writeln!(
                f,
                "New metadata stored for {} (user: {})",
                self.path, self.actor
            )?,
            MetadataOutcome::VerifiedUnchanged => writeln!(
                f,
                "Metadata Verified: No changes detected for {}",
                self.path
            )?,
            MetadataOutcome::UpdatedBySameActor => writeln!(
                f,
                "Metadata change ignored: modified by original user ({}).",
                self.actor
            )?,
            MetadataOutcome::FlaggedOtherActor => {
                writeln!(f, "WARNING: Metadata change detected for {}", self.path)?
            }
        }
        match &self.fingerprint {
            FingerprintVerdict::New => write!(f, "New checksum stored for {}", self.path),
            FingerprintVerdict::Unchanged => {
                write!(f, "Integrity Verified: The file is unchanged.")
            }
            FingerprintVerdict::Changed { old, new } => write!(
                f,
                "WARNING: File Integrity Violation! {} has been modified!\nOld Checksum: {}, New Checksum: {}",
                self.path, old, new
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> MetadataRecord {
        MetadataRecord {
            path: "f".to_string(),
            inode: 131_072,
            permissions: 0o644,
            uid: 1000,
            gid: 1000,
            mtime: 1_760_000_000,
            ctime: 1_760_000_001,
            recorded_actor: "alice".to_string(),
        }
    }

    #[test]
    fn test_fim001_stored_fold_tokens_compare_by_value() {
        assert_eq!(Fingerprint::from_stored("6"), Fingerprint::new("06"));
        assert_eq!(Fingerprint::from_stored("6A"), Fingerprint::new("6a"));
        assert_eq!(Fingerprint::from_stored("ff"), Fingerprint::new("ff"));
        assert_eq!(
            Fingerprint::from_stored("blake3:ABCD").as_str(),
            "blake3:ABCD"
        );
        assert_eq!(Fingerprint::from_stored("+6").as_str(), "+6");
        assert_eq!(Fingerprint::from_stored("100").as_str(), "100");
    }

    #[test]
    fn test_fim001_metadata_line_format() {
        assert_eq!(
            record().to_line(),
            "f 131072 420 1000 1000 1760000000 1760000001 alice"
        );
    }

    #[test]
    fn test_fim001_metadata_parse_line() {
        let parsed = MetadataRecord::parse_line("f 131072 420 1000 1000 1760000000 1760000001 alice\n");
        assert_eq!(parsed, Some(record()));
    }

    #[test]
    fn test_fim001_metadata_parse_masks_file_type_bits() {
        // 0o100644 = regular file + rw-r--r--
        let parsed = MetadataRecord::parse_line("f 1 33188 0 0 0 0 root").unwrap();
        assert_eq!(parsed.permissions, 0o644);
    }

    #[test]
    fn test_fim001_metadata_parse_rejects_short_and_garbage() {
        assert!(MetadataRecord::parse_line("").is_none());
        assert!(MetadataRecord::parse_line("f 1 420 0 0 0 0").is_none());
        assert!(MetadataRecord::parse_line("f x 420 0 0 0 0 bob").is_none());
        assert!(MetadataRecord::parse_line("f 1 420 0 0 0 0 bob extra").is_none());
    }

    #[test]
    fn test_fim001_fingerprint_parse_line() {
        let rec = FingerprintRecord::parse_line("f 60").unwrap();
        assert_eq!(rec.path, "f");
        assert_eq!(rec.fingerprint.as_str(), "60");
        assert_eq!(rec.to_line(), "f 60");
        assert!(FingerprintRecord::parse_line("f").is_none());
        assert!(FingerprintRecord::parse_line("f 60 70").is_none());
    }

    #[test]
    fn test_fim001_actor_sanitized() {
        assert_eq!(ReportedActor::new("Jane Doe").as_str(), "Jane_Doe");
        assert_eq!(ReportedActor::new("  ").as_str(), ReportedActor::UNKNOWN);
        assert_eq!(ReportedActor::new("alice").to_string(), "alice");
    }

    #[test]
    fn test_fim001_report_display() {
        let report = PassReport {
            path: "f".to_string(),
            actor: ReportedActor::new("alice"),
            metadata: MetadataOutcome::VerifiedUnchanged,
            fingerprint: FingerprintVerdict::Changed {
                old: Fingerprint::new("60"),
                new: Fingerprint::new("67"),
            },
            notifications: 1,
        };
        let text = report.to_string();
        assert!(text.contains("Metadata Verified"));
        assert!(text.contains("Old Checksum: 60, New Checksum: 67"));
        assert!(!report.is_clean());
    }

    #[test]
    fn test_fim001_outcome_alerting() {
        assert!(MetadataOutcome::FlaggedOtherActor.is_alert());
        assert!(!MetadataOutcome::UpdatedBySameActor.is_alert());
        assert!(!MetadataOutcome::FirstSeen.is_alert());
    }
}
