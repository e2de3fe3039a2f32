//! The object layout oracle.
//!
//! Pure queries describing the byte layout of image objects. The emitter and
//! the partitioner depend only on these; nothing here is mutable.
//!
//! Every object is laid out as
//! `[hub header | instance fields | hybrid tail? | identity hash?]` for
//! instances and `[hub header | length | identity hash | elements]` for
//! arrays.

use crate::kind::ValueKind;
use crate::types::LayoutEncoding;

/// Compressed-reference encoding: references are stored as offsets relative
/// to the heap base, right-shifted by `shift`, and reconstructed at load
/// time by a shift-and-add.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct CompressEncoding {
    pub shift: u32,
    pub has_base: bool,
}

impl Default for CompressEncoding {
    fn default() -> Self {
        Self {
            shift: 3,
            has_base: true,
        }
    }
}

/// Packs the hub reference into the first word of every image object.
///
/// The reserved low bits mark image-heap objects for the collector. When any
/// bits are reserved, the compression shift must not be applied to the hub
/// header, because the shifted offset would collide with them.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObjectHeader {
    reserved_bits: u32,
}

impl ObjectHeader {
    pub fn new(reserved_bits: u32) -> Self {
        assert!(reserved_bits < 8, "reserved bits must fit below alignment");
        Self { reserved_bits }
    }

    pub fn reserved_bits(&self) -> u32 {
        self.reserved_bits
    }

    /// Header bits for an image object whose hub lives at `hub_offset`.
    pub fn header_for_image_object(&self, hub_offset: u64) -> u64 {
        let mask = (1u64 << self.reserved_bits) - 1;
        debug_assert!(hub_offset & mask == 0, "hub offset collides with reserved bits");
        hub_offset | mask
    }
}

/// Pure layout queries for any type or kind.
#[derive(Clone, Copy, Debug)]
pub struct ObjectLayout {
    reference_size: u32,
    word_size: u32,
    alignment: u32,
    header: ObjectHeader,
}

impl ObjectLayout {
    pub fn new(reference_size: u32, alignment: u32, header: ObjectHeader) -> Self {
        assert!(
            reference_size == 4 || reference_size == 8,
            "unsupported reference size: {reference_size}"
        );
        assert!(alignment.is_power_of_two() && alignment >= reference_size);
        Self {
            reference_size,
            word_size: 8,
            alignment,
            header,
        }
    }

    pub fn reference_size(&self) -> u32 {
        self.reference_size
    }

    pub fn word_size(&self) -> u32 {
        self.word_size
    }

    pub fn alignment(&self) -> u64 {
        self.alignment as u64
    }

    pub fn header(&self) -> &ObjectHeader {
        &self.header
    }

    /// Offset of the hub reference from the object base.
    pub fn hub_offset(&self) -> u32 {
        0
    }

    /// First byte after the hub header; instance fields start here.
    pub fn first_instance_field_offset(&self) -> u32 {
        self.reference_size
    }

    pub fn array_length_offset(&self) -> u32 {
        self.reference_size
    }

    pub fn array_hash_code_offset(&self) -> u32 {
        self.array_length_offset() + 4
    }

    /// Offset of element 0, aligned to the element size.
    pub fn array_base_offset(&self, kind: ValueKind) -> u32 {
        let elem = kind.byte_size(self.reference_size, self.word_size);
        round_up(self.array_hash_code_offset() as u64 + 4, elem as u64) as u32
    }

    pub fn array_element_offset(&self, kind: ValueKind, index: u64) -> u64 {
        let elem = kind.byte_size(self.reference_size, self.word_size) as u64;
        self.array_base_offset(kind) as u64 + index * elem
    }

    /// Total aligned size of an array of `length` elements of `kind`.
    pub fn array_size(&self, kind: ValueKind, length: u64) -> u64 {
        self.align_up(self.array_element_offset(kind, length))
    }

    /// Instance size from a type's layout encoding.
    pub fn instance_size(&self, encoding: LayoutEncoding) -> u64 {
        match encoding {
            LayoutEncoding::Instance { size } => self.align_up(size as u64),
            other => panic!("no instance size for layout encoding {other:?}"),
        }
    }

    pub fn align_up(&self, n: u64) -> u64 {
        round_up(n, self.alignment as u64)
    }

    pub fn is_aligned(&self, n: u64) -> bool {
        n % self.alignment as u64 == 0
    }
}

fn round_up(n: u64, alignment: u64) -> u64 {
    n.div_ceil(alignment) * alignment
}
