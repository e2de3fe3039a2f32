//! Hosted universe metadata for the ingot image builder.
//!
//! The image heap builder materializes a graph of build-time ("host") objects
//! into the binary heap of the generated executable. This crate holds the
//! host side of that contract:
//!
//! - **Host values** ([`HostValue`], [`HostObject`]): the identity-bearing
//!   object graph assembled before the build. Identity is the allocation
//!   address, never structural equality.
//! - **Type metadata** ([`HostedType`], [`HostedField`]): per-type layout
//!   encodings, field offsets and access flags as decided by static analysis.
//! - **The layout oracle** ([`ObjectLayout`]): pure queries for object sizes,
//!   field and element offsets, alignment, and reference width.
//! - **The universe** ([`HostedUniverse`]): the registry tying it together,
//!   including the static-field holder arrays and the well-known singletons
//!   the heap builder patches.

pub mod kind;
pub mod layout;
pub mod types;
pub mod universe;
pub mod value;

pub use kind::ValueKind;
pub use layout::{CompressEncoding, ObjectHeader, ObjectLayout};
pub use types::{
    ClassId, FieldId, HostedField, HostedMethod, HostedType, HybridInfo, LayoutEncoding, MethodId,
    TypeKind,
};
pub use universe::{
    FieldSpec, HostedUniverse, HybridSpec, INTERN_SUPPORT_FIELD, InstanceTypeSpec,
    UniverseBuilder, WellKnown, image_info,
};
pub use value::{
    HostBitSet, HostObject, HostObjectBody, HostRef, HostValue, ObjectId, PrimArray, PrimValue,
    string_hash,
};

#[cfg(test)]
mod layout_tests;

#[cfg(test)]
mod universe_tests;

#[cfg(test)]
mod value_tests;
