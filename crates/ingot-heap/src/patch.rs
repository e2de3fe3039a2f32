//! Partition boundary patching.
//!
//! Runtime code walks partition ranges through a well-known set of boundary
//! fields that start out null. Once every offset is final, the patcher
//! overwrites them with the first and last object of each partition.

use log::debug;

use ingot_meta::{ObjectId, universe::image_info};

use crate::errors::HeapError;
use crate::heap::ImageHeap;
use crate::object_info::ObjectInfo;
use crate::partition::PartitionKind;
use crate::reloc::RelocatableBuffer;

impl ImageHeap<'_> {
    pub(crate) fn patch_partition_boundaries(
        &self,
        ro_buffer: &mut RelocatableBuffer,
        rw_buffer: &mut RelocatableBuffer,
    ) -> Result<(), HeapError> {
        let holder = self
            .get_object_info(self.universe.static_object_fields())
            .expect("static object-field holder admitted");
        let buffer = self.buffer_for_partition(holder, ro_buffer, rw_buffer);

        let read_only_primitive = self.partition(PartitionKind::ReadOnlyPrimitive);
        let read_only_reference = self.partition(PartitionKind::ReadOnlyReference);
        let read_only_relocatable = self.partition(PartitionKind::ReadOnlyRelocatable);
        let writable_primitive = self.partition(PartitionKind::WritablePrimitive);
        let writable_reference = self.partition(PartitionKind::WritableReference);

        // The read-only reference boundary spans the reference partition
        // followed by the relocatable partition; an empty one falls back to
        // the other's boundary.
        let first_read_only_reference = read_only_reference
            .first_object()
            .or(read_only_relocatable.first_object());
        let last_read_only_reference = read_only_relocatable
            .last_object()
            .or(read_only_reference.last_object());

        let patches = [
            (image_info::FIRST_READ_ONLY_PRIMITIVE, read_only_primitive.first_object()),
            (image_info::LAST_READ_ONLY_PRIMITIVE, read_only_primitive.last_object()),
            (image_info::FIRST_READ_ONLY_REFERENCE, first_read_only_reference),
            (image_info::LAST_READ_ONLY_REFERENCE, last_read_only_reference),
            (image_info::FIRST_WRITABLE_PRIMITIVE, writable_primitive.first_object()),
            (image_info::LAST_WRITABLE_PRIMITIVE, writable_primitive.last_object()),
            (image_info::FIRST_WRITABLE_REFERENCE, writable_reference.first_object()),
            (image_info::LAST_WRITABLE_REFERENCE, writable_reference.last_object()),
        ];
        for (name, target) in patches {
            self.patch_boundary_reference(buffer, holder, name, target)?;
        }
        Ok(())
    }

    fn patch_boundary_reference(
        &self,
        buffer: &mut RelocatableBuffer,
        holder: &ObjectInfo,
        name: &str,
        target: Option<ObjectId>,
    ) -> Result<(), HeapError> {
        let Some(target) = target else {
            debug!("patch_partition_boundaries: {name} is null");
            return Ok(());
        };
        let field_id = self
            .universe
            .lookup_static_field(name)
            .unwrap_or_else(|| panic!("boundary field {name} not registered"));
        let index = self.index_in_section(holder, self.universe.field(field_id).location() as u64);
        let target_object = self.objects[&target].object().clone();
        // Overwrite the null written earlier with the real boundary object.
        self.write_reference(buffer, index, Some(&target_object), holder)
    }
}
