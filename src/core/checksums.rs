//! FIM-004: Fingerprint store — verify-or-insert with in-place overwrite.
//!
//! Lines are `<path> <fingerprint>`. A mismatch overwrites the fingerprint
//! bytes where they sit when the new token has the same width (always true
//! within one scheme); a width change falls back to an atomic rewrite.

use super::errors::{FimError, Result};
use super::state::atomic_write;
use super::types::{Fingerprint, FingerprintRecord, FingerprintVerdict};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Fingerprint store with a single in-process writer.
#[derive(Debug)]
pub struct FingerprintStore {
    path: PathBuf,
    writer: Mutex<()>,
}

impl FingerprintStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the store read+write, creating it when absent.
    fn open_rw(&self) -> Result<File> {
        match OpenOptions::new().read(true).write(true).open(&self.path) {
            Ok(file) => Ok(file),
            Err(first) => {
                log::debug!(
                    "{}: open failed ({}), creating",
                    self.path.display(),
                    first
                );
                if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| FimError::store_unavailable(parent, e))?;
                }
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(&self.path)
                    .map_err(|e| FimError::store_unavailable(&self.path, e))
            }
        }
    }

    /// Check the store can be opened for writing and read through, creating
    /// it if needed.
    pub fn ensure_available(&self) -> Result<()> {
        let _writer = self.writer.lock();
        let mut file = self.open_rw()?;
        std::io::copy(&mut file, &mut std::io::sink())
            .map(drop)
            .map_err(|e| FimError::store_unavailable(&self.path, e))
    }

    /// Compare `fingerprint` with the stored value for `key`.
    ///
    /// Absent → appended (`New`); equal → untouched (`Unchanged`); different
    /// → overwritten (`Changed`). Nothing is mutated when the store cannot be
    /// opened. Lines that do not parse, UTF-8 or otherwise, are passed over
    /// and kept byte for byte.
    pub fn verify_or_store(&self, key: &str, fingerprint: &Fingerprint) -> Result<FingerprintVerdict> {
        let _writer = self.writer.lock();
        let mut file = self.open_rw()?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|e| FimError::store_unavailable(&self.path, e))?;

        let mut offset = 0usize;
        for (idx, raw) in content.split_inclusive(|b| *b == b'\n').enumerate() {
            let line = std::str::from_utf8(raw).ok();
            match line.and_then(|l| FingerprintRecord::parse_line(l).map(|r| (l, r))) {
                Some((line, record)) if record.path == key => {
                    if record.fingerprint == *fingerprint {
                        log::debug!("{}: fingerprint unchanged", key);
                        return Ok(FingerprintVerdict::Unchanged);
                    }
                    self.overwrite(&mut file, &content, offset, line, key, fingerprint)?;
                    return Ok(FingerprintVerdict::Changed {
                        old: record.fingerprint,
                        new: fingerprint.clone(),
                    });
                }
                Some(_) => {}
                None if line.is_some_and(|l| l.trim().is_empty()) => {}
                None => log::warn!(
                    "{}:{}: skipping malformed fingerprint record",
                    self.path.display(),
                    idx + 1
                ),
            }
            offset += raw.len();
        }

        let mut entry = String::new();
        if !content.is_empty() && !content.ends_with(b"\n") {
            entry.push('\n');
        }
        entry.push_str(
            &FingerprintRecord {
                path: key.to_string(),
                fingerprint: fingerprint.clone(),
            }
            .to_line(),
        );
        entry.push('\n');
        file.seek(SeekFrom::End(0))
            .and_then(|_| file.write_all(entry.as_bytes()))
            .and_then(|()| file.flush())
            .map_err(|e| FimError::store_unavailable(&self.path, e))?;
        Ok(FingerprintVerdict::New)
    }

    /// Replace the token on `line` (which starts at byte `offset`). The bytes
    /// are patched in place when the token as written has the new width.
    fn overwrite(
        &self,
        file: &mut File,
        content: &[u8],
        offset: usize,
        line: &str,
        key: &str,
        new: &Fingerprint,
    ) -> Result<()> {
        let written = line.split_whitespace().nth(1).unwrap_or_default();
        match line.rfind(written) {
            Some(col) if !written.is_empty() && written.len() == new.as_str().len() => {
                let at = (offset + col) as u64;
                file.seek(SeekFrom::Start(at))
                    .and_then(|_| file.write_all(new.as_str().as_bytes()))
                    .and_then(|()| file.flush())
                    .map_err(|e| FimError::store_unavailable(&self.path, e))
            }
            _ => {
                log::debug!(
                    "{}: fingerprint width changed ({} -> {}), rewriting store",
                    key,
                    written.len(),
                    new.as_str().len()
                );
                let mut rewritten = Vec::with_capacity(content.len() + new.as_str().len());
                rewritten.extend_from_slice(&content[..offset]);
                rewritten.extend_from_slice(format!("{} {}\n", key, new).as_bytes());
                rewritten.extend_from_slice(&content[offset + line.len()..]);
                atomic_write(&self.path, rewritten)
            }
        }
    }

    /// All records in file order. A missing store is empty.
    pub fn load(&self) -> Result<IndexMap<String, FingerprintRecord>> {
        self.read_records(false)
    }

    /// Like [`load`](Self::load) but fails on the first malformed line.
    pub fn load_strict(&self) -> Result<IndexMap<String, FingerprintRecord>> {
        self.read_records(true)
    }

    pub fn get(&self, key: &str) -> Result<Option<Fingerprint>> {
        Ok(self
            .load()?
            .shift_remove(key)
            .map(|record| record.fingerprint))
    }

    fn read_records(&self, strict: bool) -> Result<IndexMap<String, FingerprintRecord>> {
        let _writer = self.writer.lock();
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(FimError::store_unavailable(&self.path, e)),
        };

        let mut records = IndexMap::new();
        for (idx, raw) in content.split(|b| *b == b'\n').enumerate() {
            let line = std::str::from_utf8(raw).ok();
            if line.is_some_and(|l| l.trim().is_empty()) {
                continue;
            }
            match line.and_then(FingerprintRecord::parse_line) {
                Some(record) => {
                    records.entry(record.path.clone()).or_insert(record);
                }
                None if strict => {
                    return Err(FimError::StoreCorrupt {
                        path: self.path.clone(),
                        line: idx + 1,
                    })
                }
                None => log::warn!(
                    "{}:{}: skipping malformed fingerprint record",
                    self.path.display(),
                    idx + 1
                ),
            }
        }
        Ok(records)
    }
}
