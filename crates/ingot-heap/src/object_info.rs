//! Per-admitted-object records.

use std::fmt;

use ingot_meta::{ClassId, FieldId, HostRef, ObjectId};

use crate::partition::PartitionKind;

/// Why an object is in the image heap.
///
/// Reasons form a reverse reachability chain back to a root label. The chain
/// exists only for diagnostics; it is never walked on hot paths.
#[derive(Clone, Debug)]
pub enum Reason {
    /// A named root, e.g. "staticObjectFields".
    Root(String),
    /// Referenced from another admitted object.
    Object(ObjectId),
    /// The value of a static field.
    StaticField(FieldId),
}

impl Reason {
    pub fn root(label: &str) -> Self {
        Reason::Root(label.to_string())
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Root(label) => f.write_str(label),
            Reason::Object(id) => write!(f, "{id:?}"),
            Reason::StaticField(id) => write!(f, "static field {id:?}"),
        }
    }
}

/// One record per admitted object. The record survives for the whole build;
/// the partition assignment is immutable once made.
#[derive(Debug)]
pub struct ObjectInfo {
    object: HostRef,
    class: ClassId,
    size: u64,
    identity_hash: i32,
    partition: Option<PartitionKind>,
    offset_in_partition: u64,
    reason: Reason,
}

impl ObjectInfo {
    pub fn new(
        object: HostRef,
        class: ClassId,
        size: u64,
        identity_hash: i32,
        reason: Reason,
    ) -> Self {
        Self {
            object,
            class,
            size,
            identity_hash,
            partition: None,
            offset_in_partition: 0,
            reason,
        }
    }

    pub fn object(&self) -> &HostRef {
        &self.object
    }

    pub fn id(&self) -> ObjectId {
        ObjectId::of(&self.object)
    }

    pub fn class(&self) -> ClassId {
        self.class
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn identity_hash(&self) -> i32 {
        self.identity_hash
    }

    pub fn partition(&self) -> Option<PartitionKind> {
        self.partition
    }

    /// The offset within the assigned partition. Section-relative positions
    /// come from the heap, which knows the partition's section binding.
    pub fn offset_in_partition(&self) -> u64 {
        assert!(self.partition.is_some(), "object has no partition yet");
        self.offset_in_partition
    }

    pub fn reason(&self) -> &Reason {
        &self.reason
    }

    pub(crate) fn assign_to_partition(&mut self, kind: PartitionKind, offset: u64) {
        assert!(
            self.partition.is_none(),
            "partition assigned twice (was {:?})",
            self.partition
        );
        self.partition = Some(kind);
        self.offset_in_partition = offset;
    }
}
