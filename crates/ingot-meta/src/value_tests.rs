use std::cell::Cell;

use super::*;
use crate::types::ClassId;

#[test]
fn string_hash_matches_host_semantics() {
    assert_eq!(string_hash(""), 0);
    assert_eq!(string_hash("a"), 97);
    assert_eq!(string_hash("abc"), 96354);
    assert_eq!(string_hash("hello"), 99162322);
}

#[test]
fn empty_string_hash_never_caches() {
    let chars = HostObject::new(ClassId(0), 1, HostObjectBody::PrimArray(PrimArray::Char(vec![])));
    let s = HostObject::new(
        ClassId(1),
        2,
        HostObjectBody::Str {
            value: String::new(),
            chars,
            hash: Cell::new(0),
            interned: false,
        },
    );
    assert_eq!(s.force_string_hash(), 0);
    assert_eq!(s.cached_string_hash(), 0);
}

#[test]
fn string_hash_cached_after_force() {
    let chars = HostObject::new(
        ClassId(0),
        1,
        HostObjectBody::PrimArray(PrimArray::Char("abc".encode_utf16().collect())),
    );
    let s = HostObject::new(
        ClassId(1),
        2,
        HostObjectBody::Str {
            value: "abc".to_string(),
            chars,
            hash: Cell::new(0),
            interned: true,
        },
    );
    assert_eq!(s.cached_string_hash(), 0);
    assert_eq!(s.force_string_hash(), 96354);
    assert_eq!(s.cached_string_hash(), 96354);
}

#[test]
fn object_identity_is_by_address() {
    let a = HostObject::new(ClassId(0), 1, HostObjectBody::PrimArray(PrimArray::Byte(vec![1])));
    let b = HostObject::new(ClassId(0), 2, HostObjectBody::PrimArray(PrimArray::Byte(vec![1])));
    assert_ne!(ObjectId::of(&a), ObjectId::of(&b));
    assert_eq!(ObjectId::of(&a), ObjectId::of(&a.clone()));
}

#[test]
fn bitset_iteration_in_order() {
    let set = HostBitSet::from_bits(&[9, 0, 3, 64, 127]);
    let bits: Vec<u32> = set.iter_set_bits().collect();
    assert_eq!(bits, vec![0, 3, 9, 64, 127]);
}

#[test]
fn prim_array_round_trip() {
    let arr = PrimArray::Int(vec![1, -2, 3]);
    assert_eq!(arr.kind(), ValueKind::Int);
    assert_eq!(arr.len(), 3);
    assert_eq!(arr.get(1), PrimValue::Int(-2));
}

#[test]
#[should_panic(expected = "hash not yet computed")]
fn zero_identity_hash_rejected() {
    HostObject::new(ClassId(0), 0, HostObjectBody::PrimArray(PrimArray::Byte(vec![])));
}
