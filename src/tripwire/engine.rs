//! FIM-020: Integrity engine — one monitoring pass over one path.
//!
//! Pass order: track access, observe (stat + fingerprint), reconcile
//! metadata, verify fingerprint. Both observations are taken before either
//! store is touched, so a path that cannot be read or stat'd leaves every
//! baseline as it was.
//!
//! The engine holds no process-wide state. It is `Send + Sync`; workers can
//! share one through `Arc` and serialize on the per-store writer locks.

use crate::core::checksums::FingerprintStore;
use crate::core::config::{FimConfig, NotifyMode};
use crate::core::errors::{FimError, Result};
use crate::core::state::{self, MetadataStore};
use crate::core::types::{
    FingerprintVerdict, MetadataOutcome, Observation, PassReport, ReportedActor,
};
use crate::tripwire::eventlog::{
    AccessTracker, AuditEvent, AuditSink, ConsoleNotifier, FileAccessLog, FileAuditLog,
    Notifier, SilentNotifier,
};
use crate::tripwire::hasher::{self, Fingerprinter};
use std::path::Path;
use std::sync::Arc;

/// External collaborators a pass reports to.
#[derive(Clone)]
pub struct Sinks {
    pub audit: Arc<dyn AuditSink>,
    pub access: Arc<dyn AccessTracker>,
    pub notifier: Arc<dyn Notifier>,
}

impl Sinks {
    /// File-backed logs from `config` plus the configured notifier.
    pub fn from_config(config: &FimConfig) -> Self {
        let audit = Arc::new(FileAuditLog::new(config.audit_log_path()));
        let access = Arc::new(FileAccessLog::new(config.access_log_path(), audit.clone()));
        let notifier: Arc<dyn Notifier> = match config.notify {
            NotifyMode::Console => Arc::new(ConsoleNotifier),
            NotifyMode::Silent => Arc::new(SilentNotifier),
        };
        Self {
            audit,
            access,
            notifier,
        }
    }
}

/// Reusable monitor over one pair of baseline stores.
pub struct IntegrityEngine {
    fingerprinter: Box<dyn Fingerprinter>,
    checksums: FingerprintStore,
    metadata: MetadataStore,
    sinks: Sinks,
}

impl IntegrityEngine {
    pub fn new(
        fingerprinter: Box<dyn Fingerprinter>,
        checksums: FingerprintStore,
        metadata: MetadataStore,
        sinks: Sinks,
    ) -> Self {
        Self {
            fingerprinter,
            checksums,
            metadata,
            sinks,
        }
    }

    /// Stores, logs and fingerprinter as `config` describes them.
    pub fn from_config(config: &FimConfig) -> Self {
        Self::new(
            hasher::for_scheme(config.fingerprinter, config.chunk_size),
            FingerprintStore::new(config.fingerprint_store_path()),
            MetadataStore::new(config.metadata_store_path()),
            Sinks::from_config(config),
        )
    }

    pub fn checksums(&self) -> &FingerprintStore {
        &self.checksums
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Take a fresh observation of `path`. Nothing is persisted.
    pub fn observe(&self, path: &Path, actor: &ReportedActor) -> Result<Observation> {
        let metadata = state::snapshot(path)?;
        let fingerprint = self.fingerprinter.fingerprint_file(path)?;
        Ok(Observation {
            metadata,
            fingerprint,
            actor: actor.clone(),
        })
    }

    /// Run one monitoring pass. On error no baseline has been advanced past
    /// the failing step, and the failure has already been audited.
    pub fn run_pass(&self, path: &Path, actor: &ReportedActor) -> Result<PassReport> {
        let key = match state::monitor_key(path) {
            Ok(key) => key,
            Err(e) => {
                self.audit(AuditEvent::InvalidPath {
                    path: path.to_string_lossy().into_owned(),
                });
                return Err(e);
            }
        };

        if let Err(e) = self.sinks.access.track_access(key) {
            log::warn!("{}: access tracking failed: {}", key, e);
        }

        let observation = self.observe(path, actor).inspect_err(|e| {
            let event = match e {
                FimError::StatUnavailable { .. } => AuditEvent::MetadataUnavailable {
                    path: key.to_string(),
                },
                _ => AuditEvent::ContentUnreadable {
                    path: key.to_string(),
                },
            };
            self.audit(event);
        })?;
        log::debug!(
            "{}: observed {} fingerprint {}",
            key,
            self.fingerprinter.scheme(),
            observation.fingerprint
        );

        // Fail before the metadata rewrite if the fingerprint store is unusable.
        self.checksums.ensure_available().inspect_err(|_| {
            self.audit(AuditEvent::ChecksumStoreUnavailable {
                path: key.to_string(),
            });
        })?;

        let mut notifications = 0;
        let metadata = self.reconcile_metadata(key, &observation, &mut notifications)?;
        let fingerprint = self.verify_fingerprint(key, &observation, &mut notifications)?;

        Ok(PassReport {
            path: key.to_string(),
            actor: observation.actor,
            metadata,
            fingerprint,
            notifications,
        })
    }

    fn reconcile_metadata(
        &self,
        key: &str,
        observation: &Observation,
        notifications: &mut u32,
    ) -> Result<MetadataOutcome> {
        let actor = observation.actor.as_str().to_string();

        let reconciled = self
            .metadata
            .reconcile(&observation.metadata, &observation.actor)
            .inspect_err(|_| {
                self.audit(AuditEvent::MetadataRewriteFailed {
                    path: key.to_string(),
                });
            })?;

        let path = key.to_string();
        match reconciled.outcome {
            MetadataOutcome::FirstSeen => self.audit(AuditEvent::MetadataStored { path, actor }),
            MetadataOutcome::VerifiedUnchanged => {
                self.audit(AuditEvent::MetadataVerified { path })
            }
            MetadataOutcome::UpdatedBySameActor => {
                self.audit(AuditEvent::MetadataChangedBySameActor { path, actor })
            }
            MetadataOutcome::FlaggedOtherActor => {
                let recorded = reconciled.baseline.recorded_actor;
                log::warn!("{}: metadata changed by {} (recorded: {})", key, actor, recorded);
                self.audit(AuditEvent::MetadataChangedByOtherActor {
                    path,
                    recorded,
                    actor,
                });
                self.notify(
                    &format!("Metadata change by another user on {}!", key),
                    notifications,
                );
            }
        }
        Ok(reconciled.outcome)
    }

    fn verify_fingerprint(
        &self,
        key: &str,
        observation: &Observation,
        notifications: &mut u32,
    ) -> Result<FingerprintVerdict> {
        let verdict = self
            .checksums
            .verify_or_store(key, &observation.fingerprint)
            .inspect_err(|_| {
                self.audit(AuditEvent::ChecksumStoreUnavailable {
                    path: key.to_string(),
                });
            })?;

        let path = key.to_string();
        match &verdict {
            FingerprintVerdict::New => self.audit(AuditEvent::ChecksumStored {
                path,
                fingerprint: observation.fingerprint.to_string(),
            }),
            FingerprintVerdict::Unchanged => self.audit(AuditEvent::IntegrityVerified { path }),
            FingerprintVerdict::Changed { old, new } => {
                log::warn!("{}: content fingerprint {} -> {}", key, old, new);
                self.audit(AuditEvent::IntegrityViolation {
                    path: path.clone(),
                    old: old.to_string(),
                    new: new.to_string(),
                });
                self.notify(
                    &format!("File integrity violation detected on {}!", key),
                    notifications,
                );
                self.audit(AuditEvent::ChecksumUpdated { path });
            }
        }
        Ok(verdict)
    }

    fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.sinks.audit.audit(&event) {
            log::warn!("audit sink dropped \"{}\": {}", event, e);
        }
    }

    fn notify(&self, message: &str, notifications: &mut u32) {
        *notifications += 1;
        if let Err(e) = self.sinks.notifier.notify(message) {
            log::warn!("notification not delivered: {}", e);
        }
    }
}
