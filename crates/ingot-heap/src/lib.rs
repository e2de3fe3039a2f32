//! The ingot image heap builder.
//!
//! Takes the closed graph of live host objects discovered by static analysis
//! and materializes it as the initial object heap of the generated
//! executable: byte-exact, relocatable, and split into read-only and
//! writable sections.
//!
//! The build is a fixed sequence driven by the enclosing image writer:
//!
//! 1. [`ImageHeap::add_initial_objects`] opens admission and seeds the
//!    static-field roots.
//! 2. The worklist drains; every admission may enqueue field and element
//!    references.
//! 3. [`ImageHeap::add_trailing_objects`] publishes the sorted
//!    interned-strings table and closes admission.
//! 4. The section linker binds partitions via
//!    [`ImageHeap::set_read_only_section`] / [`set_writable_section`](ImageHeap::set_writable_section).
//! 5. [`ImageHeap::write_heap`] emits bytes and relocations, then patches
//!    the partition boundary fields.
//!
//! Everything runs single-threaded; admission order and partition layout are
//! reproducible by construction.

pub mod errors;
pub mod heap;
pub mod histogram;
pub mod hybrid;
pub mod object_info;
pub mod options;
pub mod partition;
pub mod phase;
pub mod reloc;

mod patch;
mod writer;

pub use errors::HeapError;
pub use heap::ImageHeap;
pub use hybrid::HybridLayout;
pub use object_info::{ObjectInfo, Reason};
pub use options::BuildOptions;
pub use partition::{HeapPartition, PartitionKind};
pub use phase::Phase;
pub use reloc::{RelocatableBuffer, Relocation, RelocationTarget};

#[cfg(test)]
mod testutil;
