//! Image heap partitions.
//!
//! The heap comes in five partitions, each a contiguous append-only arena
//! holding objects that share writability and content-kind properties.
//! Partitions are later bound into linker sections at fixed offsets.

use ingot_meta::ObjectId;

/// The five partitions of the image heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PartitionKind {
    /// Read-only objects holding only primitive values.
    ReadOnlyPrimitive,
    /// Read-only objects holding references (and primitives).
    ReadOnlyReference,
    /// Read-only objects containing relocation-bearing pointers. Keeping
    /// them together minimizes the page range the dynamic linker touches.
    ReadOnlyRelocatable,
    /// Writable objects holding only primitive values.
    WritablePrimitive,
    /// Writable objects holding references (and primitives).
    WritableReference,
}

impl PartitionKind {
    pub const ALL: [PartitionKind; 5] = [
        PartitionKind::ReadOnlyPrimitive,
        PartitionKind::ReadOnlyReference,
        PartitionKind::ReadOnlyRelocatable,
        PartitionKind::WritablePrimitive,
        PartitionKind::WritableReference,
    ];

    pub fn index(self) -> usize {
        match self {
            PartitionKind::ReadOnlyPrimitive => 0,
            PartitionKind::ReadOnlyReference => 1,
            PartitionKind::ReadOnlyRelocatable => 2,
            PartitionKind::WritablePrimitive => 3,
            PartitionKind::WritableReference => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PartitionKind::ReadOnlyPrimitive => "readOnlyPrimitive",
            PartitionKind::ReadOnlyReference => "readOnlyReference",
            PartitionKind::ReadOnlyRelocatable => "readOnlyRelocatable",
            PartitionKind::WritablePrimitive => "writablePrimitive",
            PartitionKind::WritableReference => "writableReference",
        }
    }

    pub fn is_writable(self) -> bool {
        matches!(
            self,
            PartitionKind::WritablePrimitive | PartitionKind::WritableReference
        )
    }
}

/// One partition: an append-only arena with monotonically growing size.
#[derive(Debug)]
pub struct HeapPartition {
    kind: PartitionKind,
    size: u64,
    pre_pad: u64,
    post_pad: u64,
    count: u64,
    first_object: Option<ObjectId>,
    last_object: Option<ObjectId>,
    section_name: Option<String>,
    section_offset: Option<u64>,
}

impl HeapPartition {
    pub fn new(kind: PartitionKind) -> Self {
        Self {
            kind,
            size: 0,
            pre_pad: 0,
            post_pad: 0,
            count: 0,
            first_object: None,
            last_object: None,
            section_name: None,
            section_offset: None,
        }
    }

    pub fn kind(&self) -> PartitionKind {
        self.kind
    }

    pub fn is_writable(&self) -> bool {
        self.kind.is_writable()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn pre_pad(&self) -> u64 {
        self.pre_pad
    }

    pub fn post_pad(&self) -> u64 {
        self.post_pad
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn first_object(&self) -> Option<ObjectId> {
        self.first_object
    }

    pub fn last_object(&self) -> Option<ObjectId> {
        self.last_object
    }

    /// Append an object of `size` bytes, returning its partition-relative
    /// offset.
    pub fn allocate(&mut self, object: ObjectId, size: u64) -> u64 {
        self.last_object = Some(object);
        if self.first_object.is_none() {
            self.first_object = Some(object);
        }
        let position = self.size;
        self.size += size;
        self.count += 1;
        position
    }

    pub fn add_pre_pad(&mut self, pad: u64) {
        self.pre_pad += pad;
        self.size += pad;
    }

    pub fn add_post_pad(&mut self, pad: u64) {
        self.post_pad += pad;
        self.size += pad;
    }

    /// Bind the partition into its enclosing linker section.
    pub fn set_section(&mut self, name: &str, offset: u64) {
        self.section_name = Some(name.to_string());
        self.section_offset = Some(offset);
    }

    pub fn section_name(&self) -> &str {
        self.section_name
            .as_deref()
            .unwrap_or_else(|| panic!("partition {} should have a section name by now", self.kind.name()))
    }

    pub fn section_offset(&self) -> u64 {
        self.section_offset
            .unwrap_or_else(|| panic!("partition {} should have a section offset by now", self.kind.name()))
    }

    /// Section-relative position of a partition-relative offset.
    pub fn offset_in_section(&self, offset: u64) -> u64 {
        self.section_offset() + offset
    }
}
