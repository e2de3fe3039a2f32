//! Hosted type, field, and method metadata.
//!
//! These records are produced by static analysis in the enclosing toolchain;
//! the heap builder only reads them. A type that is not `is_instantiated`
//! must never appear in the image heap.

use crate::kind::ValueKind;
use crate::value::{HostObject, HostObjectBody, HostValue, PrimValue};

/// Index of a hosted type in the universe.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ClassId(pub u32);

impl ClassId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a hosted field in the universe.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FieldId(pub u32);

impl FieldId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a hosted method in the universe.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct MethodId(pub u32);

impl MethodId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Instance,
    Array,
    Primitive,
}

/// How instances of a type are laid out in the image.
#[derive(Clone, Copy, Debug)]
pub enum LayoutEncoding {
    /// Fixed-size instance; `size` covers the header through the last field
    /// and is already aligned.
    Instance { size: u32 },
    /// Variable-length array of `component` elements.
    Array { component: ValueKind },
    Primitive,
}

/// Extra layout metadata for hybrid types: the tail array (and optional bit
/// set) is inlined into the instance, so the whole structure occupies one
/// contiguous region.
#[derive(Clone, Copy, Debug)]
pub struct HybridInfo {
    pub array_field: FieldId,
    pub bitset_field: Option<FieldId>,
    pub element_kind: ValueKind,
    /// Byte offset of the inlined bit set, between the array length and the
    /// instance fields.
    pub bit_field_offset: u32,
}

/// A type as seen by static analysis.
#[derive(Debug)]
pub struct HostedType {
    pub name: String,
    pub kind: TypeKind,
    pub layout: LayoutEncoding,
    /// Whether analysis saw an instance of this type. Objects of types not
    /// seen as instantiated abort the build.
    pub is_instantiated: bool,
    /// Byte offset of the runtime monitor slot, if the type carries one.
    /// The monitor is a reference slot written at runtime.
    pub monitor_offset: Option<u32>,
    /// Byte offset where the identity hash is stored, when the hub declares
    /// one. Arrays always store theirs at the layout's array hash offset.
    pub hash_code_offset: Option<u32>,
    pub hybrid: Option<HybridInfo>,
    /// Instance fields in slot order. Empty for arrays.
    pub instance_fields: Vec<FieldId>,
}

impl HostedType {
    pub fn is_hybrid(&self) -> bool {
        self.hybrid.is_some()
    }

    /// Component kind for array types.
    pub fn component(&self) -> Option<ValueKind> {
        match self.layout {
            LayoutEncoding::Array { component } => Some(component),
            _ => None,
        }
    }
}

/// A field as seen by static analysis.
#[derive(Debug)]
pub struct HostedField {
    pub name: String,
    pub declaring: ClassId,
    pub kind: ValueKind,
    /// Byte offset within the owning object, when materialized. Hybrid
    /// array/bit-set fields have no location; their data is inlined.
    pub location: Option<u32>,
    /// Slot index into the owner's field value vector.
    pub slot: usize,
    pub is_accessed: bool,
    pub is_written: bool,
    pub is_final: bool,
    pub is_static: bool,
}

impl HostedField {
    pub fn has_location(&self) -> bool {
        self.location.is_some()
    }

    pub fn location(&self) -> u32 {
        self.location
            .unwrap_or_else(|| panic!("field {} has no location", self.name))
    }

    /// Read the field's current value from a live host object.
    pub fn read_value(&self, receiver: &HostObject) -> HostValue {
        assert!(!self.is_static, "static field {} read with a receiver", self.name);
        match receiver.body() {
            HostObjectBody::Instance { fields } => fields.borrow()[self.slot].clone(),
            // Strings expose two slots: the character payload and the hash.
            HostObjectBody::Str { chars, hash, .. } => match self.slot {
                0 => HostValue::Object(chars.clone()),
                1 => HostValue::Prim(PrimValue::Int(hash.get())),
                _ => panic!("string has no field slot {}", self.slot),
            },
            other => panic!(
                "field {} read on non-instance object: {other:?}",
                self.name
            ),
        }
    }
}

/// A method as seen by the compilation pipeline. Method pointers only
/// relocate when the target was actually compiled.
#[derive(Debug)]
pub struct HostedMethod {
    pub name: String,
    pub is_compiled: bool,
}
