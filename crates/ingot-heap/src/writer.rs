//! Emission of the heap model into relocatable buffers.
//!
//! Every object is written as `[hub header | instance fields | (hybrid bit
//! set | length | tail)? | identity hash?]` or `[hub header | length |
//! identity hash | elements]`. Object references either encode a shifted
//! section offset (heap-base mode) or are backed by relocation records.

use log::debug;

use ingot_meta::{
    FieldId, HostObject, HostObjectBody, HostRef, HostValue, MethodId, ObjectId, PrimValue,
    TypeKind, ValueKind,
};

use crate::errors::HeapError;
use crate::heap::ImageHeap;
use crate::histogram;
use crate::object_info::{ObjectInfo, Reason};
use crate::reloc::{RelocatableBuffer, RelocationTarget};

impl ImageHeap<'_> {
    /// Write the heap model into the read-only and writable section buffers.
    ///
    /// The object map is frozen by this point; admission during emission is
    /// a programmer error.
    pub fn write_heap(
        &self,
        ro_buffer: &mut RelocatableBuffer,
        rw_buffer: &mut RelocatableBuffer,
    ) -> Result<(), HeapError> {
        assert!(self.sealed(), "the heap must be sealed before writing");
        debug!("writing image heap: {} objects", self.object_count());

        for info in self.objects.values() {
            debug_assert!(
                !self.blacklist.contains(&info.id()),
                "blacklisted object reached emission"
            );
            self.write_object(info, ro_buffer, rw_buffer)?;
        }
        // Only writable static fields reach the image heap; read-only ones
        // were inlined into code. Reading values here (not at admission)
        // captures late changes from build features.
        self.write_static_fields(ro_buffer, rw_buffer)?;
        self.patch_partition_boundaries(ro_buffer, rw_buffer)?;

        if self.options.print_heap_histogram {
            log::info!("{}", histogram::render_histogram(self));
        }
        if self.options.print_partition_sizes {
            log::info!("{}", histogram::render_partition_sizes(self));
        }
        Ok(())
    }

    pub(crate) fn buffer_for_partition<'b>(
        &self,
        info: &ObjectInfo,
        ro_buffer: &'b mut RelocatableBuffer,
        rw_buffer: &'b mut RelocatableBuffer,
    ) -> &'b mut RelocatableBuffer {
        let partition = info.partition().expect("object has a partition");
        if partition.is_writable() { rw_buffer } else { ro_buffer }
    }

    fn write_object(
        &self,
        info: &ObjectInfo,
        ro_buffer: &mut RelocatableBuffer,
        rw_buffer: &mut RelocatableBuffer,
    ) -> Result<(), HeapError> {
        let universe = self.universe;
        let layout = universe.layout();
        let buffer = self.buffer_for_partition(info, ro_buffer, rw_buffer);

        assert!(layout.is_aligned(info.offset_in_partition()));
        let hub_index = self.index_in_section(info, layout.hub_offset() as u64);
        self.write_hub_reference(buffer, hub_index, info);

        let ty = universe.ty(info.class());
        match ty.kind {
            TypeKind::Instance => {
                let hybrid = ty
                    .is_hybrid()
                    .then(|| {
                        self.hybrid_layouts
                            .get(&info.class())
                            .cloned()
                            .expect("hybrid layout cached during discovery")
                    });

                // Bit set first: the bits live between the array length and
                // the instance fields.
                let mut max_bit_index = 0usize;
                if let Some(hl) = &hybrid
                    && let Some(bitset_field) = hl.bitset_field()
                    && let HostValue::Object(bits) =
                        universe.field(bitset_field).read_value(info.object())
                {
                    let HostObjectBody::BitSet(set) = bits.body() else {
                        panic!("hybrid bit-set field must hold a bit set");
                    };
                    for bit in set.iter_set_bits() {
                        let index = self
                            .index_in_section(info, hl.bit_field_offset() as u64 + (bit / 8) as u64);
                        buffer.or_u8(index, 1u8 << (bit % 8));
                        max_bit_index = max_bit_index.max(index);
                    }
                }

                let hybrid_array_field = hybrid.as_ref().map(|h| h.array_field());
                let hybrid_bitset_field = hybrid.as_ref().and_then(|h| h.bitset_field());
                for &fid in &ty.instance_fields {
                    if Some(fid) == hybrid_array_field || Some(fid) == hybrid_bitset_field {
                        continue;
                    }
                    let field = universe.field(fid);
                    if !field.is_accessed {
                        continue;
                    }
                    debug_assert!(
                        self.index_in_section(info, field.location() as u64) > max_bit_index
                            || max_bit_index == 0,
                        "instance fields must follow the hybrid bit set"
                    );
                    self.write_field(buffer, info, fid, Some(info.object()))?;
                }

                if let Some(hash_offset) = ty.hash_code_offset {
                    buffer.put_i32(
                        self.index_in_section(info, hash_offset as u64),
                        info.identity_hash(),
                    );
                }

                if let Some(hl) = &hybrid
                    && let HostValue::Object(arr) =
                        universe.field(hl.array_field()).read_value(info.object())
                {
                    let length = arr.array_length().expect("hybrid tail is an array");
                    buffer.put_i32(
                        self.index_in_section(info, hl.array_length_offset() as u64),
                        length as i32,
                    );
                    for i in 0..length {
                        let index = self.index_in_section(info, hl.array_element_offset(i as u64));
                        let element = array_element(&arr, i);
                        self.write_constant(buffer, index, hl.element_kind(), &element, info)?;
                    }
                }
            }
            TypeKind::Array => {
                let kind = ty.component().expect("array type has a component kind");
                let length = info.object().array_length().expect("array object has a length");
                buffer.put_i32(
                    self.index_in_section(info, layout.array_length_offset() as u64),
                    length as i32,
                );
                buffer.put_i32(
                    self.index_in_section(info, layout.array_hash_code_offset() as u64),
                    info.identity_hash(),
                );
                match info.object().body() {
                    HostObjectBody::ObjArray { elements } => {
                        for (i, element) in elements.borrow().iter().enumerate() {
                            let value = universe.replace_object(element);
                            let index = self
                                .index_in_section(info, layout.array_element_offset(kind, i as u64));
                            self.write_constant(buffer, index, kind, &value, info)?;
                        }
                    }
                    HostObjectBody::PrimArray(data) => {
                        for i in 0..data.len() {
                            let index = self
                                .index_in_section(info, layout.array_element_offset(kind, i as u64));
                            write_primitive(buffer, index, data.get(i));
                        }
                    }
                    other => panic!("array-typed object with non-array body: {other:?}"),
                }
            }
            TypeKind::Primitive => unreachable!("primitive types are never admitted"),
        }
        Ok(())
    }

    /// Write the packed hub header at the start of the object.
    fn write_hub_reference(&self, buffer: &mut RelocatableBuffer, index: usize, info: &ObjectInfo) {
        let layout = self.universe.layout();
        self.must_be_reference_aligned(index);

        let hub = self.universe.hub(info.class());
        let hub_id = ObjectId::of(hub);
        let hub_info = self.objects.get(&hub_id).unwrap_or_else(|| {
            panic!(
                "hub of {} missing from the image heap; did a static field change during image generation?",
                self.universe.ty(info.class()).name
            )
        });

        let header = layout.header();
        if self.use_heap_base() {
            let mut header_bits =
                header.header_for_image_object(self.object_offset_in_section(hub_info));
            if header.reserved_bits() == 0 {
                // The shift only applies when no bits are reserved;
                // otherwise the reserved bits would have no space.
                header_bits >>= self.options.compress.shift;
            }
            buffer.put_reference_value(index, header_bits, layout.reference_size());
        } else {
            // The hub's final address is filled in by the link editor.
            let header_bits = header.header_for_image_object(0);
            self.add_direct_relocation_with_addend(
                buffer,
                index,
                layout.reference_size(),
                header_bits,
                RelocationTarget::Object(hub_id),
            );
        }
    }

    pub(crate) fn write_field(
        &self,
        buffer: &mut RelocatableBuffer,
        holder: &ObjectInfo,
        field_id: FieldId,
        receiver: Option<&HostObject>,
    ) -> Result<(), HeapError> {
        let field = self.universe.field(field_id);
        let index = self.index_in_section(holder, field.location() as u64);
        let value = match receiver {
            Some(receiver) => field.read_value(receiver),
            None => self.universe.read_static(field_id),
        };
        match &value {
            HostValue::MethodPtr(method) => {
                self.add_non_data_relocation(buffer, index, *method);
                Ok(())
            }
            _ => self.write_value(buffer, index, &value, holder),
        }
    }

    fn write_value(
        &self,
        buffer: &mut RelocatableBuffer,
        index: usize,
        value: &HostValue,
        reason: &ObjectInfo,
    ) -> Result<(), HeapError> {
        let layout = self.universe.layout();
        match value {
            HostValue::Null | HostValue::Object(_) => {
                self.write_reference(buffer, index, value.as_object(), reason)
            }
            HostValue::Prim(prim) => {
                write_primitive(buffer, index, *prim);
                Ok(())
            }
            HostValue::Word(word) => {
                buffer.put_word(index, *word, layout.word_size());
                Ok(())
            }
            HostValue::MethodPtr(_) => unreachable!("relocated pointers are handled by the caller"),
        }
    }

    /// Serialize an array or hybrid element of a known kind.
    fn write_constant(
        &self,
        buffer: &mut RelocatableBuffer,
        index: usize,
        kind: ValueKind,
        value: &HostValue,
        reason: &ObjectInfo,
    ) -> Result<(), HeapError> {
        let layout = self.universe.layout();
        match value {
            HostValue::MethodPtr(method) => {
                self.add_non_data_relocation(buffer, index, *method);
                Ok(())
            }
            HostValue::Word(word) => {
                buffer.put_word(index, *word, layout.word_size());
                Ok(())
            }
            HostValue::Null if kind == ValueKind::Word => {
                buffer.put_word(index, 0, layout.word_size());
                Ok(())
            }
            _ if kind == ValueKind::Object => {
                self.write_reference(buffer, index, value.as_object(), reason)
            }
            HostValue::Prim(prim) => {
                assert!(prim.kind() == kind, "element kind mismatch: {} in {kind} slot", prim.kind());
                write_primitive(buffer, index, *prim);
                Ok(())
            }
            HostValue::Null => panic!("primitive value must not be null"),
            HostValue::Object(_) => panic!("object value in a {kind} slot"),
        }
    }

    /// Write a reference slot. The target must itself be admitted; a miss
    /// means the source mutated after analysis.
    pub(crate) fn write_reference(
        &self,
        buffer: &mut RelocatableBuffer,
        index: usize,
        target: Option<&HostRef>,
        reason: &ObjectInfo,
    ) -> Result<(), HeapError> {
        let layout = self.universe.layout();
        self.must_be_reference_aligned(index);
        let Some(target) = target else {
            return Ok(()); // null stays all-zero
        };

        let target_info =
            self.objects
                .get(&ObjectId::of(target))
                .ok_or_else(|| HeapError::UnknownTarget {
                    object: self.describe_object(target),
                    class: self.universe.ty(target.class()).name.clone(),
                    chain: self.reason_chain(&Reason::Object(reason.id())),
                })?;

        if self.use_heap_base() {
            let offset = self.object_offset_in_section(target_info);
            buffer.put_reference_value(
                index,
                offset >> self.options.compress.shift,
                layout.reference_size(),
            );
        } else {
            self.add_direct_relocation_without_addend(
                buffer,
                index,
                layout.reference_size(),
                RelocationTarget::Object(ObjectId::of(target)),
            );
        }
        Ok(())
    }

    /// Relocation for a code pointer or other non-data pointer. Only
    /// compiled methods end up in dispatch tables and need patching.
    fn add_non_data_relocation(&self, buffer: &mut RelocatableBuffer, index: usize, method: MethodId) {
        self.must_be_reference_aligned(index);
        if self.universe.method(method).is_compiled {
            let word_size = self.universe.layout().word_size();
            self.add_direct_relocation_without_addend(
                buffer,
                index,
                word_size,
                RelocationTarget::Method(method),
            );
        }
    }

    fn write_static_fields(
        &self,
        ro_buffer: &mut RelocatableBuffer,
        rw_buffer: &mut RelocatableBuffer,
    ) -> Result<(), HeapError> {
        let universe = self.universe;
        let object_holder = self
            .get_object_info(universe.static_object_fields())
            .expect("static object-field holder admitted");
        let primitive_holder = self
            .get_object_info(universe.static_primitive_fields())
            .expect("static primitive-field holder admitted");

        for field_id in universe.static_fields() {
            let field = universe.field(field_id);
            if !field.has_location() {
                continue;
            }
            let holder = if field.kind == ValueKind::Object {
                object_holder
            } else {
                primitive_holder
            };
            let buffer = self.buffer_for_partition(holder, ro_buffer, rw_buffer);
            self.write_field(buffer, holder, field_id, None)?;
        }
        Ok(())
    }

    pub(crate) fn must_be_reference_aligned(&self, index: usize) {
        let reference_size = self.universe.layout().reference_size() as usize;
        assert!(
            index % reference_size == 0,
            "index {index} must be reference-aligned"
        );
    }

    pub(crate) fn add_direct_relocation_without_addend(
        &self,
        buffer: &mut RelocatableBuffer,
        index: usize,
        size: u32,
        target: RelocationTarget,
    ) {
        self.check_relocation_confinement(index);
        buffer.add_direct_relocation_without_addend(index, size, target);
        self.note_relocation(index);
    }

    pub(crate) fn add_direct_relocation_with_addend(
        &self,
        buffer: &mut RelocatableBuffer,
        index: usize,
        size: u32,
        addend: u64,
        target: RelocationTarget,
    ) {
        self.check_relocation_confinement(index);
        buffer.add_direct_relocation_with_addend(index, size, addend, target);
        self.note_relocation(index);
    }

    /// With a heap base, every direct relocation must land inside the
    /// relocatable partition's section range.
    fn check_relocation_confinement(&self, index: usize) {
        if self.use_heap_base() {
            let partition = self.partition(crate::partition::PartitionKind::ReadOnlyRelocatable);
            let start = partition.section_offset();
            let end = partition.offset_in_section(partition.size());
            debug_assert!(
                (index as u64) >= start && (index as u64) < end,
                "relocation at {index} outside the relocatable partition [{start}..{end})"
            );
        }
    }

    fn note_relocation(&self, index: usize) {
        if self.first_relocatable_pointer_offset.get().is_none() {
            self.first_relocatable_pointer_offset.set(Some(index as u64));
        }
    }
}

fn array_element(arr: &HostRef, index: usize) -> HostValue {
    match arr.body() {
        HostObjectBody::ObjArray { elements } => elements.borrow()[index].clone(),
        HostObjectBody::PrimArray(data) => HostValue::Prim(data.get(index)),
        other => panic!("element read on non-array body: {other:?}"),
    }
}

fn write_primitive(buffer: &mut RelocatableBuffer, index: usize, value: PrimValue) {
    match value {
        PrimValue::Boolean(v) => buffer.put_u8(index, v as u8),
        PrimValue::Byte(v) => buffer.put_i8(index, v),
        PrimValue::Char(v) => buffer.put_u16(index, v),
        PrimValue::Short(v) => buffer.put_i16(index, v),
        PrimValue::Int(v) => buffer.put_i32(index, v),
        PrimValue::Long(v) => buffer.put_i64(index, v),
        PrimValue::Float(v) => buffer.put_f32(index, v),
        PrimValue::Double(v) => buffer.put_f64(index, v),
    }
}
