use super::*;
use crate::kind::ValueKind;
use crate::types::LayoutEncoding;

fn layout() -> ObjectLayout {
    ObjectLayout::new(8, 8, ObjectHeader::default())
}

#[test]
fn array_offsets() {
    let l = layout();
    assert_eq!(l.array_length_offset(), 8);
    assert_eq!(l.array_hash_code_offset(), 12);
    assert_eq!(l.array_base_offset(ValueKind::Byte), 16);
    assert_eq!(l.array_base_offset(ValueKind::Long), 16);
    assert_eq!(l.array_element_offset(ValueKind::Byte, 3), 19);
    assert_eq!(l.array_element_offset(ValueKind::Int, 2), 24);
}

#[test]
fn array_sizes_are_aligned() {
    let l = layout();
    assert_eq!(l.array_size(ValueKind::Byte, 0), 16);
    assert_eq!(l.array_size(ValueKind::Byte, 3), 24);
    assert_eq!(l.array_size(ValueKind::Object, 2), 32);
    for len in 0..16 {
        assert!(l.is_aligned(l.array_size(ValueKind::Char, len)));
    }
}

#[test]
fn narrow_references() {
    let l = ObjectLayout::new(4, 8, ObjectHeader::default());
    assert_eq!(l.array_length_offset(), 4);
    assert_eq!(l.array_hash_code_offset(), 8);
    // Longs still need 8-byte element alignment.
    assert_eq!(l.array_base_offset(ValueKind::Long), 16);
    assert_eq!(l.array_base_offset(ValueKind::Byte), 12);
}

#[test]
fn instance_size_aligns_encoding() {
    let l = layout();
    assert_eq!(l.instance_size(LayoutEncoding::Instance { size: 20 }), 24);
    assert_eq!(l.instance_size(LayoutEncoding::Instance { size: 24 }), 24);
}

#[test]
fn header_without_reserved_bits_is_the_offset() {
    let h = ObjectHeader::new(0);
    assert_eq!(h.header_for_image_object(0x40), 0x40);
}

#[test]
fn header_reserved_bits_are_set() {
    let h = ObjectHeader::new(3);
    assert_eq!(h.reserved_bits(), 3);
    assert_eq!(h.header_for_image_object(0x40), 0x47);
}

#[test]
#[should_panic(expected = "unsupported reference size")]
fn odd_reference_size_rejected() {
    ObjectLayout::new(6, 8, ObjectHeader::default());
}
