//! Shared fixtures for heap and writer tests.

use ingot_meta::{
    ClassId, FieldSpec, HostedUniverse, InstanceTypeSpec, ObjectHeader, ObjectLayout,
    UniverseBuilder, ValueKind,
};

use crate::heap::ImageHeap;
use crate::options::BuildOptions;
use crate::reloc::RelocatableBuffer;

pub fn default_layout() -> ObjectLayout {
    ObjectLayout::new(8, 8, ObjectHeader::new(0))
}

pub fn builder() -> UniverseBuilder {
    UniverseBuilder::new(default_layout())
}

/// Options with compressed heap-base references disabled: every reference
/// becomes a direct relocation.
pub fn no_base_options() -> BuildOptions {
    let mut options = BuildOptions::default();
    options.spawn_isolates = false;
    options.compress.has_base = false;
    options
}

/// A type with two primitive fields and no writes.
pub fn point_type(b: &mut UniverseBuilder) -> ClassId {
    b.register_instance_type(
        InstanceTypeSpec::new("Point")
            .field(FieldSpec::new("x", ValueKind::Int))
            .field(FieldSpec::new("y", ValueKind::Int)),
    )
}

/// A type with a single object field named `target`.
pub fn holder_type(b: &mut UniverseBuilder, name: &str) -> ClassId {
    b.register_instance_type(
        InstanceTypeSpec::new(name).field(FieldSpec::new("target", ValueKind::Object)),
    )
}

/// Run the full admission sequence over an already-seeded universe.
pub fn admit_all(heap: &mut ImageHeap) {
    heap.add_initial_objects().expect("initial objects admitted");
    heap.add_trailing_objects().expect("trailing objects admitted");
}

/// Bind both sections at offset zero, the way the tests' section linker
/// would.
pub fn bind_sections(heap: &mut ImageHeap) {
    heap.set_read_only_section("rodata", 0);
    heap.set_writable_section("rwdata", 0);
}

/// Emit into freshly sized buffers.
pub fn write_heap(heap: &ImageHeap) -> (RelocatableBuffer, RelocatableBuffer) {
    let mut ro = RelocatableBuffer::new(heap.read_only_section_size() as usize);
    let mut rw = RelocatableBuffer::new(heap.writable_section_size() as usize);
    heap.write_heap(&mut ro, &mut rw).expect("heap written");
    (ro, rw)
}

/// Admission plus section binding plus emission, for tests that only care
/// about the output.
pub fn build_and_write(
    universe: &HostedUniverse,
    options: BuildOptions,
) -> (ImageHeap<'_>, RelocatableBuffer, RelocatableBuffer) {
    let mut heap = ImageHeap::new(universe, options);
    admit_all(&mut heap);
    bind_sections(&mut heap);
    let (ro, rw) = write_heap(&heap);
    (heap, ro, rw)
}

pub fn read_u64(bytes: &[u8], index: usize) -> u64 {
    u64::from_le_bytes(bytes[index..index + 8].try_into().unwrap())
}

pub fn read_i32(bytes: &[u8], index: usize) -> i32 {
    i32::from_le_bytes(bytes[index..index + 4].try_into().unwrap())
}
