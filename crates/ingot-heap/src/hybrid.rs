//! Resolved layouts for hybrid types.
//!
//! A hybrid type inlines a variable-length tail array (and an optional bit
//! set) into the instance so the whole structure occupies one contiguous
//! region: `[hub | length | bit set | fields | elements]`.

use ingot_meta::{FieldId, HostedType, ObjectLayout, ValueKind};

/// Layout of one hybrid class, cached per type on the heap.
#[derive(Clone, Debug)]
pub struct HybridLayout {
    array_field: FieldId,
    bitset_field: Option<FieldId>,
    element_kind: ValueKind,
    bit_field_offset: u32,
    array_length_offset: u32,
    /// Elements start right after the instance fields.
    array_base_offset: u64,
    element_size: u32,
    alignment: u64,
}

impl HybridLayout {
    pub fn new(ty: &HostedType, layout: &ObjectLayout) -> Self {
        let info = ty.hybrid.expect("hybrid layout requested for a non-hybrid type");
        Self {
            array_field: info.array_field,
            bitset_field: info.bitset_field,
            element_kind: info.element_kind,
            bit_field_offset: info.bit_field_offset,
            array_length_offset: layout.array_length_offset(),
            array_base_offset: layout.instance_size(ty.layout),
            element_size: info
                .element_kind
                .byte_size(layout.reference_size(), layout.word_size()),
            alignment: layout.alignment(),
        }
    }

    pub fn array_field(&self) -> FieldId {
        self.array_field
    }

    pub fn bitset_field(&self) -> Option<FieldId> {
        self.bitset_field
    }

    pub fn element_kind(&self) -> ValueKind {
        self.element_kind
    }

    pub fn bit_field_offset(&self) -> u32 {
        self.bit_field_offset
    }

    pub fn array_length_offset(&self) -> u32 {
        self.array_length_offset
    }

    pub fn array_element_offset(&self, index: u64) -> u64 {
        self.array_base_offset + index * self.element_size as u64
    }

    /// Total object size given the tail length. A missing tail behaves like
    /// a zero-length one.
    pub fn total_size(&self, length: u64) -> u64 {
        self.array_element_offset(length).div_ceil(self.alignment) * self.alignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingot_meta::{
        FieldSpec, HybridSpec, InstanceTypeSpec, ObjectHeader, ObjectLayout, UniverseBuilder,
        ValueKind,
    };

    #[test]
    fn hybrid_tail_follows_the_fields() {
        let mut b = UniverseBuilder::new(ObjectLayout::new(8, 8, ObjectHeader::default()));
        let class = b.register_instance_type(
            InstanceTypeSpec::new("Table")
                .field(FieldSpec::new("id", ValueKind::Int))
                .hybrid(HybridSpec {
                    element_kind: ValueKind::Object,
                    bitset_bytes: 4,
                }),
        );
        let u = b.build();
        let hl = HybridLayout::new(u.ty(class), u.layout());

        // [hub 0..8][length 8..12][bit set 12..16][id 16..20][pad][elements]
        assert_eq!(hl.bit_field_offset(), 12);
        assert_eq!(hl.array_length_offset(), 8);
        assert_eq!(hl.array_element_offset(0), 24);
        assert_eq!(hl.array_element_offset(2), 40);
        assert_eq!(hl.total_size(2), 40);
        assert_eq!(hl.total_size(0), 24);
    }

    #[test]
    fn missing_tail_is_instance_sized() {
        let mut b = UniverseBuilder::new(ObjectLayout::new(8, 8, ObjectHeader::default()));
        let class = b.register_instance_type(InstanceTypeSpec::new("Bare").hybrid(HybridSpec {
            element_kind: ValueKind::Byte,
            bitset_bytes: 0,
        }));
        let u = b.build();
        let hl = HybridLayout::new(u.ty(class), u.layout());
        assert_eq!(hl.total_size(0), u.layout().instance_size(u.ty(class).layout));
    }
}
