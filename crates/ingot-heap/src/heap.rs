//! The image heap model and its discovery traversal.
//!
//! The heap is built in two phases. While admission is allowed, objects are
//! added transitively from the static-field roots through an explicit
//! worklist (object graphs are deep; the call stack is not an option). Once
//! admission closes, the object map is frozen and the writer emits bytes.
//!
//! The builder runs single-threaded by design: admission order determines
//! partition offsets, and the emitted image must be a pure function of the
//! admitted object set.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use ingot_meta::{
    ClassId, HostObjectBody, HostRef, HostValue, HostedUniverse, ObjectId, TypeKind, ValueKind,
};

use crate::errors::HeapError;
use crate::hybrid::HybridLayout;
use crate::object_info::{ObjectInfo, Reason};
use crate::options::BuildOptions;
use crate::partition::{HeapPartition, PartitionKind};
use crate::phase::Phase;

/// A pending admission on the worklist.
#[derive(Debug)]
struct AddObjectData {
    value: HostValue,
    immutable_from_parent: bool,
    reason: Reason,
}

/// The model of the image heap under construction.
pub struct ImageHeap<'u> {
    pub(crate) universe: &'u HostedUniverse,
    pub(crate) options: BuildOptions,
    /// Admitted objects, in admission order. Iteration order is the
    /// emission order, which keeps the output deterministic.
    pub(crate) objects: IndexMap<ObjectId, ObjectInfo>,
    /// Host values whose bytes are inlined into some parent (hybrid tails).
    /// These must never be emitted as independent objects.
    pub(crate) blacklist: IndexSet<ObjectId>,
    known_immutable_objects: IndexSet<ObjectId>,
    pub(crate) hybrid_layouts: HashMap<ClassId, HybridLayout>,
    /// Host-interned strings encountered so far, keyed by content.
    interned_strings: IndexMap<String, HostRef>,
    add_objects_phase: Phase,
    intern_strings_phase: Phase,
    worklist: Vec<AddObjectData>,
    pub(crate) partitions: [HeapPartition; 5],
    pub(crate) first_relocatable_pointer_offset: std::cell::Cell<Option<u64>>,
}

impl<'u> ImageHeap<'u> {
    pub fn new(universe: &'u HostedUniverse, options: BuildOptions) -> Self {
        let mut heap = Self {
            universe,
            options,
            objects: IndexMap::new(),
            blacklist: IndexSet::new(),
            known_immutable_objects: IndexSet::new(),
            hybrid_layouts: HashMap::new(),
            interned_strings: IndexMap::new(),
            add_objects_phase: Phase::new("add objects"),
            intern_strings_phase: Phase::new("intern strings"),
            worklist: Vec::new(),
            partitions: PartitionKind::ALL.map(HeapPartition::new),
            first_relocatable_pointer_offset: std::cell::Cell::new(None),
        };
        if heap.use_heap_base() {
            // Object offset zero stays reserved for the null reference, so
            // the first partition starts with one alignment unit of padding.
            let alignment = universe.layout().alignment();
            heap.partitions[PartitionKind::ReadOnlyPrimitive.index()].add_pre_pad(alignment);
        }
        heap
    }

    pub fn universe(&self) -> &'u HostedUniverse {
        self.universe
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn use_heap_base(&self) -> bool {
        self.options.use_heap_base()
    }

    pub fn partition(&self, kind: PartitionKind) -> &HeapPartition {
        &self.partitions[kind.index()]
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectInfo> {
        self.objects.values()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn get_object_info(&self, object: &HostRef) -> Option<&ObjectInfo> {
        self.objects.get(&ObjectId::of(object))
    }

    pub fn object_info_by_id(&self, id: ObjectId) -> Option<&ObjectInfo> {
        self.objects.get(&id)
    }

    /// Objects known to stay immutable in the image even though analysis saw
    /// writes. Users take responsibility; registration closes when admission
    /// opens.
    pub fn register_as_immutable(&mut self, object: &HostRef) {
        assert!(
            self.add_objects_phase.is_before(),
            "registering immutable object too late: phase {}",
            self.add_objects_phase
        );
        self.known_immutable_objects.insert(ObjectId::of(object));
    }

    /// Open admission and seed the heap with the static-field roots.
    pub fn add_initial_objects(&mut self) -> Result<(), HeapError> {
        self.add_objects_phase.allow();
        self.intern_strings_phase.allow();

        let universe = self.universe;
        self.add_object(
            &HostValue::Object(universe.static_primitive_fields().clone()),
            false,
            Reason::root("primitive static fields"),
        )?;
        self.add_static_fields()
    }

    fn add_static_fields(&mut self) -> Result<(), HeapError> {
        let universe = self.universe;
        self.add_object(
            &HostValue::Object(universe.static_object_fields().clone()),
            false,
            Reason::root("staticObjectFields"),
        )?;
        self.add_object(
            &HostValue::Object(universe.static_primitive_fields().clone()),
            false,
            Reason::root("staticPrimitiveFields"),
        )?;

        // The holder arrays are empty placeholders, so static object fields
        // are seeded individually.
        let statics: Vec<_> = universe.static_fields().collect();
        for id in statics {
            let field = universe.field(id);
            if field.has_location() && field.kind == ValueKind::Object {
                let value = universe.read_static(id);
                self.add_object(&value, false, Reason::StaticField(id))?;
            }
        }
        Ok(())
    }

    /// Drain the worklist, finalize the interned-strings table, and close
    /// admission.
    pub fn add_trailing_objects(&mut self) -> Result<(), HeapError> {
        // Remaining worklist entries may still intern strings.
        self.process_worklist()?;

        let universe = self.universe;
        let wk = *universe.well_known();
        let uses_interned_strings = universe.field(wk.interned_table_field).is_accessed;

        if uses_interned_strings {
            // The hub of the table's array type must end up in the image.
            self.add_object(
                &HostValue::Object(universe.hub(wk.string_array).clone()),
                false,
                Reason::root("internedStrings table"),
            )?;
            // From here on no new interned strings may appear: admitting one
            // would grow the very table being serialized.
            self.intern_strings_phase.disallow();

            // Sorting makes the image independent of discovery order.
            let mut texts: Vec<String> = self.interned_strings.keys().cloned().collect();
            texts.sort();
            let elements: Vec<HostValue> = texts
                .iter()
                .map(|text| HostValue::Object(self.interned_strings[text].clone()))
                .collect();
            let table = universe.alloc_obj_array(wk.string_array, elements);
            universe.set_image_interned_strings(&table);
            self.add_object(
                &HostValue::Object(table),
                true,
                Reason::root("internedStrings table"),
            )?;

            // Anything transitively referenced from the new table.
            self.process_worklist()?;
        } else {
            self.intern_strings_phase.disallow();
        }

        self.add_objects_phase.disallow();
        assert!(self.worklist.is_empty(), "worklist drained before sealing");
        Ok(())
    }

    /// Admit a host value to the heap model, if it denotes an object.
    ///
    /// Null, primitives, word values, and relocated pointers are not heap
    /// objects and are ignored. Admission is idempotent.
    pub fn add_object(
        &mut self,
        value: &HostValue,
        immutable_from_parent: bool,
        reason: Reason,
    ) -> Result<(), HeapError> {
        assert!(
            self.add_objects_phase.is_allowed(),
            "objects cannot be added at phase {} (reason: {reason})",
            self.add_objects_phase
        );
        let HostValue::Object(obj) = value else {
            return Ok(());
        };
        let obj = obj.clone();
        let universe = self.universe;

        if let HostObjectBody::ClassHandle(_) = obj.body() {
            panic!(
                "must not have a class handle in the image heap: {}",
                self.describe_object(&obj)
            );
        }
        if let HostObjectBody::Hub {
            described,
            class_init: false,
        } = obj.body()
        {
            return Err(HeapError::HubMissingClassInit {
                class: universe.ty(*described).name.clone(),
                chain: self.reason_chain(&reason),
            });
        }

        // Hubs adopt the identity hash of the class object they describe, so
        // class-keyed hash maps filled during the build stay valid at
        // runtime.
        let identity_hash = match obj.body() {
            HostObjectBody::Hub { described, .. } => universe.class_identity_hash(*described),
            _ => obj.identity_hash(),
        };
        assert!(identity_hash != 0, "0 is reserved as the 'hash not yet computed' marker");

        if let HostObjectBody::Str { .. } = obj.body() {
            self.handle_image_string(&obj);
        }

        let id = ObjectId::of(&obj);
        if self.blacklist.contains(&id) {
            // Inlined into a parent; never emitted standalone.
            return Ok(());
        }
        if self.objects.contains_key(&id) {
            return Ok(());
        }
        self.add_object_to_heap(obj, immutable_from_parent, identity_hash, reason)
    }

    fn handle_image_string(&mut self, obj: &HostRef) {
        // Immutable strings need their hash field materialized eagerly.
        obj.force_string_hash();
        if obj.is_interned_string() {
            let text = obj.as_str().expect("interned string has text").to_string();
            assert!(
                self.interned_strings.contains_key(&text) || self.intern_strings_phase.is_allowed(),
                "must not intern string at phase {}",
                self.intern_strings_phase
            );
            self.interned_strings.entry(text).or_insert_with(|| obj.clone());
        }
    }

    /// The mechanics of admission: compute the size, enqueue everything the
    /// object references, and assign a partition.
    fn add_object_to_heap(
        &mut self,
        obj: HostRef,
        immutable_from_parent: bool,
        identity_hash: i32,
        reason: Reason,
    ) -> Result<(), HeapError> {
        let universe = self.universe;
        let layout = universe.layout();
        let class = obj.class();
        let ty = universe.ty(class);
        if !ty.is_instantiated {
            return Err(HeapError::NotInstantiated {
                object: self.describe_object(&obj),
                class: ty.name.clone(),
                chain: self.reason_chain(&reason),
            });
        }

        let id = ObjectId::of(&obj);
        let immutable = immutable_from_parent || self.is_known_immutable(&obj);
        let mut written = false;
        let mut references = false;
        let mut relocatable = false; // stays false without a heap base

        match ty.kind {
            TypeKind::Instance => {
                if ty.monitor_offset.is_some() {
                    // The monitor slot is a reference slot written at
                    // runtime; registered immutables take their chances.
                    written = true;
                    references = true;
                }

                let hybrid = ty.is_hybrid().then(|| self.hybrid_layout(class));
                let mut hybrid_array: Option<HostRef> = None;
                let size = if let Some(hl) = &hybrid {
                    // The tail array and bit set live inside the hybrid
                    // object and must not be emitted separately.
                    if let Some(bitset_field) = hl.bitset_field()
                        && let HostValue::Object(bits) =
                            universe.field(bitset_field).read_value(&obj)
                    {
                        self.blacklist_inlined(&bits);
                    }
                    if let HostValue::Object(arr) =
                        universe.field(hl.array_field()).read_value(&obj)
                    {
                        self.blacklist_inlined(&arr);
                        written = true;
                        hybrid_array = Some(arr);
                    }
                    let length = hybrid_array
                        .as_ref()
                        .and_then(|a| a.array_length())
                        .unwrap_or(0);
                    hl.total_size(length as u64)
                } else {
                    layout.instance_size(ty.layout)
                };

                self.insert_info(obj.clone(), class, size, identity_hash, reason);
                self.enqueue(
                    HostValue::Object(universe.hub(class).clone()),
                    false,
                    Reason::Object(id),
                );

                // Strings propagate immutability to their character payload.
                let fields_immutable = matches!(obj.body(), HostObjectBody::Str { .. });
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
                    let mut field_relocatable = false;
                    if field.kind == ValueKind::Object {
                        let value = field.read_value(&obj);
                        match &value {
                            HostValue::Word(_) | HostValue::Prim(_) => {}
                            _ => {
                                if self.use_heap_base()
                                    && matches!(value, HostValue::MethodPtr(_))
                                {
                                    field_relocatable = true;
                                }
                                self.enqueue(value, fields_immutable, Reason::Object(id));
                                references = true;
                            }
                        }
                    }
                    // Relocated pointers are patched once by the dynamic
                    // linker and count as read-only for partitioning.
                    relocatable = relocatable || field_relocatable;
                    written = written || (field.is_written && !field.is_final && !field_relocatable);
                }

                if let Some(arr) = &hybrid_array
                    && let HostObjectBody::ObjArray { elements } = arr.body()
                {
                    let elements = elements.borrow().clone();
                    relocatable = self.add_array_elements(&elements, relocatable, id);
                    references = true;
                }
            }
            TypeKind::Array => {
                let component = ty.component().expect("array type has a component kind");
                let length = obj.array_length().expect("array object has a length") as u64;
                let size = layout.array_size(component, length);
                self.insert_info(obj.clone(), class, size, identity_hash, reason);
                self.enqueue(
                    HostValue::Object(universe.hub(class).clone()),
                    false,
                    Reason::Object(id),
                );
                if let HostObjectBody::ObjArray { elements } = obj.body() {
                    let elements = elements.borrow().clone();
                    relocatable = self.add_array_elements(&elements, false, id);
                    references = true;
                }
                // No per-element write tracking exists, so arrays are
                // conservatively written.
                written = true;
            }
            TypeKind::Primitive => {
                panic!("primitive values cannot be heap objects: {}", ty.name)
            }
        }

        let partition = self.choose_partition(&obj, !written || immutable, references, relocatable);
        self.assign_to_partition(id, partition);
        Ok(())
    }

    /// Enqueue every array element, applying the analysis substitution hook
    /// and accumulating relocation-bearing elements.
    fn add_array_elements(
        &mut self,
        elements: &[HostValue],
        mut relocatable: bool,
        parent: ObjectId,
    ) -> bool {
        for element in elements {
            let value = self.universe.replace_object(element);
            if self.use_heap_base() && matches!(value, HostValue::MethodPtr(_)) {
                relocatable = true;
            }
            self.enqueue(value, false, Reason::Object(parent));
        }
        relocatable
    }

    /// Enqueue into the explicit worklist; never recurse on the call stack.
    fn enqueue(&mut self, value: HostValue, immutable_from_parent: bool, reason: Reason) {
        if matches!(value, HostValue::Null) {
            return;
        }
        self.worklist.push(AddObjectData {
            value,
            immutable_from_parent,
            reason,
        });
    }

    pub(crate) fn process_worklist(&mut self) -> Result<(), HeapError> {
        while let Some(data) = self.worklist.pop() {
            self.add_object(&data.value, data.immutable_from_parent, data.reason)?;
        }
        Ok(())
    }

    fn insert_info(
        &mut self,
        object: HostRef,
        class: ClassId,
        size: u64,
        identity_hash: i32,
        reason: Reason,
    ) {
        assert!(
            self.universe.layout().is_aligned(size),
            "object size {size} must be aligned"
        );
        let id = ObjectId::of(&object);
        let previous = self
            .objects
            .insert(id, ObjectInfo::new(object, class, size, identity_hash, reason));
        assert!(previous.is_none(), "object admitted twice");
    }

    fn blacklist_inlined(&mut self, obj: &HostRef) {
        let id = ObjectId::of(obj);
        assert!(
            !self.objects.contains_key(&id),
            "inlined hybrid data was already admitted as a standalone object: {}",
            self.describe_object(obj)
        );
        self.blacklist.insert(id);
    }

    /// Whether an object will be immutable in the image.
    fn is_known_immutable(&self, obj: &HostRef) -> bool {
        if let HostObjectBody::Str { .. } = obj.body() {
            // A string with an unset hash rewrites its hash field on first
            // use, so it cannot live in a read-only page.
            return obj.cached_string_hash() != 0;
        }
        self.universe.is_known_immutable_type(obj.class())
            || self.known_immutable_objects.contains(&ObjectId::of(obj))
    }

    fn choose_partition(
        &self,
        obj: &HostRef,
        immutable: bool,
        references: bool,
        relocatable: bool,
    ) -> PartitionKind {
        if self.options.use_only_writable_heap && !self.use_heap_base() {
            return PartitionKind::WritableReference;
        }
        if relocatable && !self.is_known_immutable(obj) {
            panic!(
                "object with relocatable pointers must be explicitly immutable: {}",
                self.describe_object(obj)
            );
        }
        if immutable {
            if relocatable {
                PartitionKind::ReadOnlyRelocatable
            } else if references {
                PartitionKind::ReadOnlyReference
            } else {
                PartitionKind::ReadOnlyPrimitive
            }
        } else if references {
            PartitionKind::WritableReference
        } else {
            PartitionKind::WritablePrimitive
        }
    }

    fn assign_to_partition(&mut self, id: ObjectId, kind: PartitionKind) {
        let size = self.objects[&id].size();
        let offset = self.partitions[kind.index()].allocate(id, size);
        debug_assert!(
            self.universe.layout().is_aligned(offset),
            "partition offset {offset} must be aligned"
        );
        self.objects
            .get_mut(&id)
            .expect("object inserted before partition assignment")
            .assign_to_partition(kind, offset);
    }

    fn hybrid_layout(&mut self, class: ClassId) -> HybridLayout {
        if let Some(layout) = self.hybrid_layouts.get(&class) {
            return layout.clone();
        }
        let layout = HybridLayout::new(self.universe.ty(class), self.universe.layout());
        self.hybrid_layouts.insert(class, layout.clone());
        layout
    }

    // ------------------------------------------------------------------
    // Section binding
    // ------------------------------------------------------------------

    /// Bind the read-only partitions into a section, in fixed order.
    pub fn set_read_only_section(&mut self, name: &str, offset: u64) {
        assert!(self.universe.layout().is_aligned(offset), "section offset must be aligned");
        let [prim, reference, relocatable, ..] = &mut self.partitions;
        prim.set_section(name, offset);
        reference.set_section(name, prim.offset_in_section(prim.size()));
        relocatable.set_section(name, reference.offset_in_section(reference.size()));
    }

    /// Bind the writable partitions into a section, in fixed order.
    pub fn set_writable_section(&mut self, name: &str, offset: u64) {
        assert!(self.universe.layout().is_aligned(offset), "section offset must be aligned");
        let [.., prim, reference] = &mut self.partitions;
        prim.set_section(name, offset);
        reference.set_section(name, prim.offset_in_section(prim.size()));
    }

    /// Pad so the relocatable partition starts and ends on an `alignment`
    /// boundary. Assumes the read-only section orders its partitions
    /// [primitive, reference, relocatable], as `set_read_only_section` does.
    pub fn align_relocatable_partition(&mut self, alignment: u64) {
        let relocatable_offset = self.partition(PartitionKind::ReadOnlyPrimitive).size()
            + self.partition(PartitionKind::ReadOnlyReference).size();
        let pre = round_up(relocatable_offset, alignment) - relocatable_offset;
        self.partitions[PartitionKind::ReadOnlyPrimitive.index()].add_pre_pad(pre);

        let relocatable_size = self.partition(PartitionKind::ReadOnlyRelocatable).size();
        let post = round_up(relocatable_size, alignment) - relocatable_size;
        self.partitions[PartitionKind::ReadOnlyRelocatable.index()].add_post_pad(post);
    }

    pub fn read_only_section_size(&self) -> u64 {
        self.partition(PartitionKind::ReadOnlyPrimitive).size()
            + self.partition(PartitionKind::ReadOnlyReference).size()
            + self.partition(PartitionKind::ReadOnlyRelocatable).size()
    }

    pub fn writable_section_size(&self) -> u64 {
        self.partition(PartitionKind::WritablePrimitive).size()
            + self.partition(PartitionKind::WritableReference).size()
    }

    pub fn read_only_relocatable_partition_offset(&self) -> u64 {
        self.partition(PartitionKind::ReadOnlyRelocatable).section_offset()
    }

    pub fn read_only_relocatable_partition_size(&self) -> u64 {
        self.partition(PartitionKind::ReadOnlyRelocatable).size()
    }

    /// The first emitted relocation offset in the section, once emission ran.
    pub fn first_relocatable_pointer_offset_in_section(&self) -> Option<u64> {
        self.first_relocatable_pointer_offset.get()
    }

    // ------------------------------------------------------------------
    // Positions and diagnostics
    // ------------------------------------------------------------------

    /// The object's start within its image section.
    pub fn object_offset_in_section(&self, info: &ObjectInfo) -> u64 {
        let partition = info.partition().expect("object has a partition");
        self.partitions[partition.index()].offset_in_section(info.offset_in_partition())
    }

    /// A byte index into an object, as an absolute section index.
    pub(crate) fn index_in_section(&self, info: &ObjectInfo, offset: u64) -> usize {
        assert!(
            offset < info.size(),
            "index {offset} out of bounds [0 .. {})",
            info.size()
        );
        (self.object_offset_in_section(info) + offset) as usize
    }

    pub(crate) fn describe_object(&self, obj: &HostRef) -> String {
        let class_name = &self.universe.ty(obj.class()).name;
        match obj.body() {
            HostObjectBody::Str { value, .. } => format!("\"{value}\""),
            HostObjectBody::Hub { described, .. } => {
                format!("hub of {}", self.universe.ty(*described).name)
            }
            HostObjectBody::ObjArray { .. } | HostObjectBody::PrimArray(_) => {
                format!(
                    "{class_name} of length {}",
                    obj.array_length().unwrap_or(0)
                )
            }
            HostObjectBody::Instance { .. } => format!("{class_name} instance"),
            HostObjectBody::BitSet(_) => "bit set".to_string(),
            HostObjectBody::ClassHandle(class) => {
                format!("class {}", self.universe.ty(*class).name)
            }
        }
    }

    /// Render the reverse reachability chain for diagnostics.
    pub(crate) fn reason_chain(&self, reason: &Reason) -> String {
        use std::fmt::Write as _;

        let mut out = String::new();
        let mut cur = reason;
        loop {
            match cur {
                Reason::Object(id) => {
                    let Some(info) = self.objects.get(id) else {
                        let _ = writeln!(out, "    root: <untracked object>");
                        break;
                    };
                    let _ = writeln!(
                        out,
                        "    object: {}  of class: {}",
                        self.describe_object(info.object()),
                        self.universe.ty(info.class()).name
                    );
                    cur = info.reason();
                }
                Reason::StaticField(id) => {
                    let _ = writeln!(out, "    root: static field {}", self.universe.field(*id).name);
                    break;
                }
                Reason::Root(label) => {
                    let _ = writeln!(out, "    root: {label}");
                    break;
                }
            }
        }
        out
    }

    pub(crate) fn sealed(&self) -> bool {
        !self.add_objects_phase.is_allowed() && !self.add_objects_phase.is_before()
    }
}

pub(crate) fn round_up(n: u64, alignment: u64) -> u64 {
    n.div_ceil(alignment) * alignment
}
