//! FIM-005: Metadata baseline store — snapshot, load, reconcile, atomic save.
//!
//! The store is a line file, one record per path. Every reconcile rewrites
//! the whole file through a temp file renamed over the original, so readers
//! see either the old store or the new one.

use super::errors::{FimError, Result};
use super::types::{MetadataOutcome, MetadataRecord, ReportedActor};
use crate::tripwire::drift::{self, ChangeClass};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Records keyed by path, in file order.
pub type MetadataIndex = IndexMap<String, MetadataRecord>;

/// Validate a path for use as a store key.
///
/// Store lines are whitespace-delimited, so keys must be non-empty UTF-8
/// without whitespace.
pub fn monitor_key(path: &Path) -> Result<&str> {
    let key = path.to_str().ok_or_else(|| FimError::InvalidPath {
        path: path.to_string_lossy().into_owned(),
        reason: "path is not valid UTF-8",
    })?;
    if key.is_empty() {
        return Err(FimError::InvalidPath {
            path: String::new(),
            reason: "path is empty",
        });
    }
    if key.chars().any(char::is_whitespace) {
        return Err(FimError::InvalidPath {
            path: key.to_string(),
            reason: "path contains whitespace",
        });
    }
    Ok(key)
}

/// Read current filesystem metadata for `path` (following symlinks).
///
/// `recorded_actor` is left empty; reconcile decides who owns the baseline.
pub fn snapshot(path: &Path) -> Result<MetadataRecord> {
    let key = monitor_key(path)?;
    let meta = std::fs::metadata(path).map_err(|e| FimError::stat_unavailable(path, e))?;
    Ok(record_from_metadata(key, &meta))
}

#[cfg(unix)]
fn record_from_metadata(key: &str, meta: &std::fs::Metadata) -> MetadataRecord {
    use super::types::MODE_MASK;
    use std::os::unix::fs::MetadataExt;
    MetadataRecord {
        path: key.to_string(),
        inode: meta.ino(),
        permissions: meta.mode() & MODE_MASK,
        uid: meta.uid(),
        gid: meta.gid(),
        mtime: meta.mtime(),
        ctime: meta.ctime(),
        recorded_actor: String::new(),
    }
}

#[cfg(not(unix))]
fn record_from_metadata(key: &str, meta: &std::fs::Metadata) -> MetadataRecord {
    fn secs(t: std::io::Result<std::time::SystemTime>) -> i64 {
        t.ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
    let mtime = secs(meta.modified());
    MetadataRecord {
        path: key.to_string(),
        inode: 0,
        permissions: if meta.permissions().readonly() { 0o444 } else { 0o666 },
        uid: 0,
        gid: 0,
        mtime,
        ctime: meta.created().map_or(mtime, |t| secs(Ok(t))),
        recorded_actor: String::new(),
    }
}

/// Sibling temp path used while staging a rewrite.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace `path` with `content` atomically (write temp, fsync, rename over).
///
/// On failure the previous file is left as it was and the temp file removed.
pub fn atomic_write(path: &Path, content: impl AsRef<[u8]>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| FimError::store_unavailable(parent, e))?;
    }

    let tmp_path = temp_path(path);
    let staged = std::fs::File::create(&tmp_path).and_then(|mut tmp| {
        tmp.write_all(content.as_ref())?;
        tmp.sync_all()
    });
    if let Err(e) = staged {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(FimError::temp_write(&tmp_path, e));
    }

    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        FimError::temp_write(&tmp_path, e)
    })
}

/// Render an index as store text. Empty index renders as an empty file.
pub fn render(records: &MetadataIndex) -> String {
    let mut out = String::new();
    for record in records.values() {
        out.push_str(&record.to_line());
        out.push('\n');
    }
    out
}

/// Parse store bytes. Malformed lines, including lines that are not UTF-8,
/// are skipped (or rejected when `strict`); for duplicate keys the first
/// record wins.
pub fn parse_store(path: &Path, content: &[u8], strict: bool) -> Result<MetadataIndex> {
    let mut records = MetadataIndex::new();
    for (idx, raw) in content.split(|b| *b == b'\n').enumerate() {
        let line = std::str::from_utf8(raw).ok();
        if line.is_some_and(|l| l.trim().is_empty()) {
            continue;
        }
        let Some(record) = line.and_then(MetadataRecord::parse_line) else {
            if strict {
                return Err(FimError::StoreCorrupt {
                    path: path.to_path_buf(),
                    line: idx + 1,
                });
            }
            log::warn!("{}:{}: skipping malformed metadata record", path.display(), idx + 1);
            continue;
        };
        if records.contains_key(&record.path) {
            log::warn!(
                "{}:{}: duplicate record for {}, keeping the first",
                path.display(),
                idx + 1,
                record.path
            );
            continue;
        }
        records.insert(record.path.clone(), record);
    }
    Ok(records)
}

/// What a reconcile decided, and the baseline it persisted for the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub outcome: MetadataOutcome,
    pub baseline: MetadataRecord,
}

/// Metadata baseline store with a single in-process writer.
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    writer: Mutex<()>,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every record. A store that cannot be read counts as empty.
    pub fn load(&self) -> Result<MetadataIndex> {
        let _writer = self.writer.lock();
        self.read_tolerant()
    }

    /// Load every record, failing on the first malformed line.
    pub fn load_strict(&self) -> Result<MetadataIndex> {
        let _writer = self.writer.lock();
        match std::fs::read(&self.path) {
            Ok(content) => parse_store(&self.path, &content, true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MetadataIndex::new()),
            Err(e) => Err(FimError::store_unavailable(&self.path, e)),
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<MetadataRecord>> {
        Ok(self.load()?.shift_remove(key))
    }

    /// Compare `fresh` with the baseline for its path and persist the result.
    ///
    /// The baseline always advances to `fresh`, flagged or not, so the same
    /// state is not alerted twice. `recorded_actor` is only set on insert, so
    /// the returned baseline names the actor a flagged change is held against.
    pub fn reconcile(&self, fresh: &MetadataRecord, actor: &ReportedActor) -> Result<Reconciled> {
        let _writer = self.writer.lock();
        let mut records = self.read_tolerant()?;

        let (outcome, next) = match records.get(&fresh.path) {
            None => {
                let mut next = fresh.clone();
                next.recorded_actor = actor.as_str().to_string();
                (MetadataOutcome::FirstSeen, next)
            }
            Some(stored) => {
                let outcome = match drift::classify(stored, fresh, actor) {
                    ChangeClass::Unchanged => MetadataOutcome::VerifiedUnchanged,
                    ChangeClass::ChangedBySameActor => MetadataOutcome::UpdatedBySameActor,
                    ChangeClass::ChangedByOtherActor => MetadataOutcome::FlaggedOtherActor,
                };
                let next = if outcome == MetadataOutcome::VerifiedUnchanged {
                    stored.clone()
                } else {
                    MetadataRecord {
                        recorded_actor: stored.recorded_actor.clone(),
                        ..fresh.clone()
                    }
                };
                (outcome, next)
            }
        };

        log::debug!("{}: metadata {}", fresh.path, outcome);
        records.insert(next.path.clone(), next.clone());
        atomic_write(&self.path, render(&records))?;
        Ok(Reconciled {
            outcome,
            baseline: next,
        })
    }

    fn read_tolerant(&self) -> Result<MetadataIndex> {
        match std::fs::read(&self.path) {
            Ok(content) => parse_store(&self.path, &content, false),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("{}: no metadata store yet", self.path.display());
                Ok(MetadataIndex::new())
            }
            Err(e) => {
                log::warn!(
                    "{}: cannot read metadata store ({}), treating as empty",
                    self.path.display(),
                    e
                );
                Ok(MetadataIndex::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, mtime: i64, actor: &str) -> MetadataRecord {
        MetadataRecord {
            path: path.to_string(),
            inode: 7,
            permissions: 0o644,
            uid: 1000,
            gid: 1000,
            mtime,
            ctime: mtime,
            recorded_actor: actor.to_string(),
        }
    }

    fn fresh(path: &str, mtime: i64) -> MetadataRecord {
        record(path, mtime, "")
    }

    #[test]
    fn test_fim005_monitor_key() {
        assert_eq!(monitor_key(Path::new("/etc/hosts")).unwrap(), "/etc/hosts");
        assert_eq!(monitor_key(Path::new("my file")).unwrap_err().code(), "FIM-2003");
        assert_eq!(monitor_key(Path::new("")).unwrap_err().code(), "FIM-2003");
    }

    #[test]
    fn test_fim005_snapshot_missing() {
        let err = snapshot(Path::new("/nonexistent/fim/file")).unwrap_err();
        assert_eq!(err.code(), "FIM-2002");
    }

    #[cfg(unix)]
    #[test]
    fn test_fim005_snapshot_reads_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, "abc").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();
        let snap = snapshot(&path).unwrap();
        assert_eq!(snap.permissions, 0o640);
        assert_eq!(snap.path, path.to_str().unwrap());
        assert!(snap.inode > 0);
        assert!(snap.recorded_actor.is_empty());
    }

    #[test]
    fn test_fim005_temp_path() {
        assert_eq!(
            temp_path(Path::new("/state/metadata_store.txt")),
            PathBuf::from("/state/metadata_store.txt.tmp")
        );
    }

    #[test]
    fn test_fim005_atomic_write_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata_store.txt");
        atomic_write(&path, "a 1 420 0 0 0 0 root\n").unwrap();
        assert!(!temp_path(&path).exists());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a 1 420 0 0 0 0 root\n");
    }

    #[test]
    fn test_fim005_atomic_write_failure_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata_store.txt");
        std::fs::write(&path, "original\n").unwrap();
        // A directory squatting on the temp name makes staging fail.
        std::fs::create_dir(temp_path(&path)).unwrap();
        let err = atomic_write(&path, "replacement\n").unwrap_err();
        assert_eq!(err.code(), "FIM-3002");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original\n");
    }

    #[test]
    fn test_fim005_first_seen_records_actor() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("metadata_store.txt"));
        let outcome = store
            .reconcile(&fresh("f", 100), &ReportedActor::new("alice"))
            .unwrap()
            .outcome;
        assert_eq!(outcome, MetadataOutcome::FirstSeen);
        let rec = store.get("f").unwrap().unwrap();
        assert_eq!(rec.recorded_actor, "alice");
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn test_fim005_verified_unchanged_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata_store.txt");
        let store = MetadataStore::new(&path);
        let alice = ReportedActor::new("alice");
        store.reconcile(&fresh("f", 100), &alice).unwrap();
        let before = std::fs::read(&path).unwrap();

        let outcome = store
            .reconcile(&fresh("f", 100), &ReportedActor::new("bob"))
            .unwrap()
            .outcome;
        assert_eq!(outcome, MetadataOutcome::VerifiedUnchanged);
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_fim005_same_actor_update_advances_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("metadata_store.txt"));
        let alice = ReportedActor::new("alice");
        store.reconcile(&fresh("f", 100), &alice).unwrap();

        let outcome = store.reconcile(&fresh("f", 200), &alice).unwrap().outcome;
        assert_eq!(outcome, MetadataOutcome::UpdatedBySameActor);
        let rec = store.get("f").unwrap().unwrap();
        assert_eq!(rec.mtime, 200);
        assert_eq!(rec.recorded_actor, "alice");
    }

    #[test]
    fn test_fim005_other_actor_flagged_keeps_recorded_actor() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("metadata_store.txt"));
        store
            .reconcile(&fresh("f", 100), &ReportedActor::new("alice"))
            .unwrap();

        let mallory = ReportedActor::new("mallory");
        let flagged = store.reconcile(&fresh("f", 300), &mallory).unwrap();
        assert_eq!(flagged.outcome, MetadataOutcome::FlaggedOtherActor);
        assert_eq!(flagged.baseline.recorded_actor, "alice");
        assert_eq!(flagged.baseline.mtime, 300);
        let rec = store.get("f").unwrap().unwrap();
        assert_eq!(rec.mtime, 300, "baseline advances even when flagged");
        assert_eq!(rec.recorded_actor, "alice");

        // Same state again: no repeat alert.
        let again = store.reconcile(&fresh("f", 300), &mallory).unwrap().outcome;
        assert_eq!(again, MetadataOutcome::VerifiedUnchanged);
    }

    #[test]
    fn test_fim005_unrelated_records_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata_store.txt");
        std::fs::write(
            &path,
            "a 1 420 0 0 10 10 root\nb 2 384 1 1 20 20 bob\nc 3 493 2 2 30 30 carol\n",
        )
        .unwrap();
        let store = MetadataStore::new(&path);
        store
            .reconcile(&fresh("b", 99), &ReportedActor::new("bob"))
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "a 1 420 0 0 10 10 root");
        assert!(lines[1].starts_with("b 7 420 1000 1000 99 99 bob"));
        assert_eq!(lines[2], "c 3 493 2 2 30 30 carol");
    }

    #[test]
    fn test_fim005_malformed_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata_store.txt");
        std::fs::write(&path, "garbage\na 1 420 0 0 10 10 root\n\n").unwrap();
        let store = MetadataStore::new(&path);
        assert_eq!(store.load().unwrap().len(), 1);
        let err = store.load_strict().unwrap_err();
        assert!(matches!(err, FimError::StoreCorrupt { line: 1, .. }));
    }

    #[test]
    fn test_fim005_non_utf8_line_keeps_other_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata_store.txt");
        let store = MetadataStore::new(&path);
        store.reconcile(&fresh("b", 20), &ReportedActor::new("bob")).unwrap();

        let mut content = std::fs::read(&path).unwrap();
        content.extend_from_slice(b"\xff\n");
        std::fs::write(&path, &content).unwrap();

        assert_eq!(store.load().unwrap().len(), 1);
        assert!(matches!(
            store.load_strict().unwrap_err(),
            FimError::StoreCorrupt { line: 2, .. }
        ));

        store.reconcile(&fresh("a", 10), &ReportedActor::new("alice")).unwrap();
        let b = store.get("b").unwrap().expect("record for b survives");
        assert_eq!(b.recorded_actor, "bob");
        assert!(store.get("a").unwrap().is_some());
        // The undecodable line is dropped by the rewrite like any malformed line.
        assert!(std::str::from_utf8(&std::fs::read(&path).unwrap()).is_ok());
    }

    #[test]
    fn test_fim005_duplicate_keys_collapse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata_store.txt");
        std::fs::write(&path, "a 1 420 0 0 10 10 root\na 9 420 0 0 90 90 eve\n").unwrap();
        let store = MetadataStore::new(&path);
        let rec = store.get("a").unwrap().unwrap();
        assert_eq!(rec.inode, 1);

        store.reconcile(&fresh("z", 5), &ReportedActor::new("root")).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().filter(|l| l.starts_with("a ")).count(), 1);
    }

    #[test]
    fn test_fim005_missing_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("nested/metadata_store.txt"));
        assert!(store.load().unwrap().is_empty());
        assert!(store.load_strict().unwrap().is_empty());
        store.reconcile(&fresh("f", 1), &ReportedActor::new("x")).unwrap();
        assert!(dir.path().join("nested/metadata_store.txt").exists());
    }

    #[test]
    fn test_fim005_temp_failure_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata_store.txt");
        let store = MetadataStore::new(&path);
        store.reconcile(&fresh("f", 1), &ReportedActor::new("x")).unwrap();
        let before = std::fs::read(&path).unwrap();

        std::fs::create_dir(temp_path(&path)).unwrap();
        let err = store
            .reconcile(&fresh("f", 2), &ReportedActor::new("x"))
            .unwrap_err();
        assert_eq!(err.code(), "FIM-3002");
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }
}
