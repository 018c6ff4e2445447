//! FIM-012: Metadata drift — field diff and attribution-aware classification.
//!
//! Pure functions over value snapshots; no store or filesystem access.

use crate::core::types::{MetadataRecord, ReportedActor, MODE_MASK};
use std::fmt;

/// Whether any tracked metadata field moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataDiff {
    Unchanged,
    Changed,
}

/// A tracked metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    Inode,
    Permissions,
    Owner,
    Group,
    Mtime,
    Ctime,
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inode => write!(f, "inode"),
            Self::Permissions => write!(f, "mode"),
            Self::Owner => write!(f, "uid"),
            Self::Group => write!(f, "gid"),
            Self::Mtime => write!(f, "mtime"),
            Self::Ctime => write!(f, "ctime"),
        }
    }
}

/// Classification of a fresh observation against its baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeClass {
    Unchanged,
    ChangedBySameActor,
    ChangedByOtherActor,
}

/// Fields that differ between `stored` and `fresh`, in a fixed order.
/// Permissions compare on the mode mask only.
pub fn changed_fields(stored: &MetadataRecord, fresh: &MetadataRecord) -> Vec<MetadataField> {
    let mut fields = Vec::new();
    if stored.inode != fresh.inode {
        fields.push(MetadataField::Inode);
    }
    if stored.permissions & MODE_MASK != fresh.permissions & MODE_MASK {
        fields.push(MetadataField::Permissions);
    }
    if stored.uid != fresh.uid {
        fields.push(MetadataField::Owner);
    }
    if stored.gid != fresh.gid {
        fields.push(MetadataField::Group);
    }
    if stored.mtime != fresh.mtime {
        fields.push(MetadataField::Mtime);
    }
    if stored.ctime != fresh.ctime {
        fields.push(MetadataField::Ctime);
    }
    fields
}

/// `Changed` iff any tracked field differs. Path and actor are not compared.
pub fn diff(stored: &MetadataRecord, fresh: &MetadataRecord) -> MetadataDiff {
    if changed_fields(stored, fresh).is_empty() {
        MetadataDiff::Unchanged
    } else {
        MetadataDiff::Changed
    }
}

/// A change is noise when the actor running the pass is the one recorded on
/// the baseline, and an alert otherwise. Advisory only: the actor is
/// self-reported.
pub fn classify(
    stored: &MetadataRecord,
    fresh: &MetadataRecord,
    actor: &ReportedActor,
) -> ChangeClass {
    match diff(stored, fresh) {
        MetadataDiff::Unchanged => ChangeClass::Unchanged,
        MetadataDiff::Changed if stored.recorded_actor == actor.as_str() => {
            ChangeClass::ChangedBySameActor
        }
        MetadataDiff::Changed => ChangeClass::ChangedByOtherActor,
    }
}
