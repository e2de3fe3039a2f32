use super::*;
use crate::layout::{ObjectHeader, ObjectLayout};
use crate::value::{HostValue, ObjectId, PrimValue};

fn builder() -> UniverseBuilder {
    UniverseBuilder::new(ObjectLayout::new(8, 8, ObjectHeader::default()))
}

#[test]
fn instance_field_locations_follow_declaration_order() {
    let mut b = builder();
    let class = b.register_instance_type(
        InstanceTypeSpec::new("Mixed")
            .field(FieldSpec::new("flag", ValueKind::Boolean))
            .field(FieldSpec::new("count", ValueKind::Int))
            .field(FieldSpec::new("next", ValueKind::Object)),
    );
    let u = b.build();
    let ty = u.ty(class);
    let locations: Vec<u32> = ty
        .instance_fields
        .iter()
        .map(|&f| u.field(f).location())
        .collect();
    // flag at 8, count aligned to 12, next aligned to 16.
    assert_eq!(locations, vec![8, 12, 16]);
    assert_eq!(u.layout().instance_size(ty.layout), 24);
}

#[test]
fn hybrid_fields_have_no_location() {
    let mut b = builder();
    let class = b.register_instance_type(
        InstanceTypeSpec::new("Hybrid")
            .field(FieldSpec::new("id", ValueKind::Int))
            .hybrid(HybridSpec {
                element_kind: ValueKind::Object,
                bitset_bytes: 4,
            }),
    );
    let u = b.build();
    let ty = u.ty(class);
    let hybrid = ty.hybrid.unwrap();
    assert!(!u.field(hybrid.array_field).has_location());
    assert!(!u.field(hybrid.bitset_field.unwrap()).has_location());
    assert_eq!(hybrid.bit_field_offset, 12);
    // The id field lands after the bit set region.
    assert_eq!(u.field(ty.instance_fields[0]).location(), 16);
}

#[test]
fn static_fields_are_located_in_their_holders() {
    let mut b = builder();
    let obj_static = b.register_static_field("cache", ValueKind::Object, true);
    let int_static = b.register_static_field("counter", ValueKind::Int, true);
    let long_static = b.register_static_field("epoch", ValueKind::Long, false);
    let u = b.build();

    // Object statics occupy consecutive reference slots; bootstrap registers
    // the intern-support anchor and the eight boundary fields first.
    let base = u.layout().array_base_offset(ValueKind::Object);
    assert_eq!(u.field(obj_static).location(), base + 9 * 8);

    // Primitive statics pack with per-kind alignment.
    let prim_base = u.layout().array_base_offset(ValueKind::Byte);
    assert_eq!(u.field(int_static).location(), prim_base);
    assert_eq!(u.field(long_static).location(), prim_base + 8);

    // The primitive holder spans the packed region.
    assert_eq!(u.static_primitive_fields().array_length(), Some(16));
    assert_eq!(u.static_object_fields().array_length(), Some(10));
}

#[test]
fn static_values_read_back() {
    let mut b = builder();
    let counter = b.register_static_field("counter", ValueKind::Int, true);
    let u = b.build();
    assert!(matches!(u.read_static(counter), HostValue::Prim(PrimValue::Int(0))));
    u.set_static_field(counter, HostValue::Prim(PrimValue::Int(7)));
    assert!(matches!(u.read_static(counter), HostValue::Prim(PrimValue::Int(7))));
}

#[test]
fn intern_support_is_anchored_by_a_static() {
    let u = builder().build();
    let anchor = u.lookup_static_field(INTERN_SUPPORT_FIELD).unwrap();
    let value = u.read_static(anchor);
    let obj = value.as_object().unwrap();
    assert_eq!(ObjectId::of(obj), ObjectId::of(u.intern_support()));
}

#[test]
fn boundary_fields_exist_and_start_null() {
    let u = builder().build();
    for name in image_info::ALL {
        let id = u.lookup_static_field(name).unwrap();
        assert!(matches!(u.read_static(id), HostValue::Null));
    }
}

#[test]
fn hubs_adopt_class_object_hashes() {
    let u = builder().build();
    let wk = *u.well_known();
    let handle = u.alloc_class_handle(wk.string);
    assert_eq!(handle.identity_hash(), u.class_identity_hash(wk.string));
    // Hub objects have their own allocation identity.
    assert_ne!(
        u.hub(wk.string).identity_hash(),
        u.class_identity_hash(wk.string)
    );
}

#[test]
fn replace_object_substitutes_by_identity() {
    let mut b = builder();
    let class = b.register_instance_type(InstanceTypeSpec::new("Widget"));
    let mut u = b.build();
    let original = u.alloc_instance(class, vec![]);
    let replacement = u.alloc_instance(class, vec![]);
    u.register_replacement(&original, HostValue::Object(replacement.clone()));

    let replaced = u.replace_object(&HostValue::Object(original));
    assert_eq!(
        ObjectId::of(replaced.as_object().unwrap()),
        ObjectId::of(&replacement)
    );

    let untouched = u.replace_object(&HostValue::Object(replacement.clone()));
    assert_eq!(
        ObjectId::of(untouched.as_object().unwrap()),
        ObjectId::of(&replacement)
    );
}

#[test]
fn strings_carry_their_char_payload() {
    let u = builder().build();
    let s = u.alloc_string("hi", true);
    let ty = u.ty(s.class());
    let value_field = u.field(ty.instance_fields[0]);
    let chars = value_field.read_value(&s);
    let payload = chars.as_object().unwrap();
    assert_eq!(payload.array_length(), Some(2));
    assert!(s.is_interned_string());
}
