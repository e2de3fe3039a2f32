//! The hosted universe: everything static analysis knows about types,
//! fields, methods, and the root objects of the build.
//!
//! The universe is assembled once by the enclosing toolchain through
//! [`UniverseBuilder`] and is read-only during heap building, apart from
//! host-side writes the build itself performs (static field values, the
//! published interned-strings table) and identity-hash allocation.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use crate::kind::ValueKind;
use crate::layout::ObjectLayout;
use crate::types::{
    ClassId, FieldId, HostedField, HostedMethod, HostedType, HybridInfo, LayoutEncoding, MethodId,
    TypeKind,
};
use crate::value::{
    HostBitSet, HostObject, HostObjectBody, HostRef, HostValue, ObjectId, PrimArray, PrimValue,
};

/// Field names of the image-info singleton that the boundary patcher
/// overwrites after emission. All of them live in the static object-field
/// holder and start out null.
pub mod image_info {
    pub const FIRST_READ_ONLY_PRIMITIVE: &str = "firstReadOnlyPrimitiveObject";
    pub const LAST_READ_ONLY_PRIMITIVE: &str = "lastReadOnlyPrimitiveObject";
    pub const FIRST_READ_ONLY_REFERENCE: &str = "firstReadOnlyReferenceObject";
    pub const LAST_READ_ONLY_REFERENCE: &str = "lastReadOnlyReferenceObject";
    pub const FIRST_WRITABLE_PRIMITIVE: &str = "firstWritablePrimitiveObject";
    pub const LAST_WRITABLE_PRIMITIVE: &str = "lastWritablePrimitiveObject";
    pub const FIRST_WRITABLE_REFERENCE: &str = "firstWritableReferenceObject";
    pub const LAST_WRITABLE_REFERENCE: &str = "lastWritableReferenceObject";

    pub const ALL: [&str; 8] = [
        FIRST_READ_ONLY_PRIMITIVE,
        LAST_READ_ONLY_PRIMITIVE,
        FIRST_READ_ONLY_REFERENCE,
        LAST_READ_ONLY_REFERENCE,
        FIRST_WRITABLE_PRIMITIVE,
        LAST_WRITABLE_PRIMITIVE,
        FIRST_WRITABLE_REFERENCE,
        LAST_WRITABLE_REFERENCE,
    ];
}

/// Static field that anchors the string-intern support singleton.
pub const INTERN_SUPPORT_FIELD: &str = "stringInternSupport";

/// Bootstrap types every universe carries.
#[derive(Clone, Copy, Debug)]
pub struct WellKnown {
    /// Type of hub objects themselves.
    pub hub_class: ClassId,
    pub string: ClassId,
    pub char_array: ClassId,
    pub string_array: ClassId,
    pub object_array: ClassId,
    pub byte_array: ClassId,
    /// Bit sets only ever appear inlined into hybrid objects.
    pub bit_set: ClassId,
    pub intern_support: ClassId,
    /// Instance field of `intern_support` holding the sorted table.
    pub interned_table_field: FieldId,
}

/// Declarative description of an instance field for [`UniverseBuilder`].
#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub name: String,
    pub kind: ValueKind,
    pub is_accessed: bool,
    pub is_written: bool,
    pub is_final: bool,
}

impl FieldSpec {
    pub fn new(name: &str, kind: ValueKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            is_accessed: true,
            is_written: false,
            is_final: false,
        }
    }

    pub fn written(mut self) -> Self {
        self.is_written = true;
        self
    }

    pub fn final_(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn unaccessed(mut self) -> Self {
        self.is_accessed = false;
        self
    }
}

/// Declarative description of a hybrid tail.
#[derive(Clone, Debug)]
pub struct HybridSpec {
    pub element_kind: ValueKind,
    /// Number of bytes reserved for the inlined bit set; 0 means no bit-set
    /// field.
    pub bitset_bytes: u32,
}

/// Declarative description of an instance type.
#[derive(Clone, Debug)]
pub struct InstanceTypeSpec {
    pub name: String,
    pub fields: Vec<FieldSpec>,
    pub is_instantiated: bool,
    /// Whether the hub carries class-initialization info. Hubs without it
    /// were missed by analysis and abort the build on admission.
    pub class_init: bool,
    pub monitor: bool,
    pub with_hash_field: bool,
    pub hybrid: Option<HybridSpec>,
}

impl InstanceTypeSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            is_instantiated: true,
            class_init: true,
            monitor: false,
            with_hash_field: false,
            hybrid: None,
        }
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn not_instantiated(mut self) -> Self {
        self.is_instantiated = false;
        self
    }

    pub fn without_class_init(mut self) -> Self {
        self.class_init = false;
        self
    }

    pub fn with_monitor(mut self) -> Self {
        self.monitor = true;
        self
    }

    pub fn with_hash_field(mut self) -> Self {
        self.with_hash_field = true;
        self
    }

    pub fn hybrid(mut self, spec: HybridSpec) -> Self {
        self.hybrid = Some(spec);
        self
    }
}

/// Assembles a [`HostedUniverse`].
pub struct UniverseBuilder {
    layout: ObjectLayout,
    types: Vec<HostedType>,
    fields: Vec<HostedField>,
    methods: Vec<HostedMethod>,
    class_init: Vec<bool>,
    known_immutable_types: HashSet<ClassId>,
    static_fields: Vec<FieldId>,
    well_known: WellKnown,
}

impl UniverseBuilder {
    pub fn new(layout: ObjectLayout) -> Self {
        let mut builder = Self {
            layout,
            types: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            class_init: Vec::new(),
            known_immutable_types: HashSet::new(),
            static_fields: Vec::new(),
            // Patched right below once the bootstrap types exist.
            well_known: WellKnown {
                hub_class: ClassId(0),
                string: ClassId(0),
                char_array: ClassId(0),
                string_array: ClassId(0),
                object_array: ClassId(0),
                byte_array: ClassId(0),
                bit_set: ClassId(0),
                intern_support: ClassId(0),
                interned_table_field: FieldId(0),
            },
        };

        let hub_class = builder.register_instance_type(
            InstanceTypeSpec::new("Hub").with_hash_field(),
        );
        let string = builder.register_instance_type(
            InstanceTypeSpec::new("String")
                .field(FieldSpec::new("value", ValueKind::Object).final_())
                .field(FieldSpec::new("hash", ValueKind::Int).written()),
        );
        let char_array = builder.register_array_type("char[]", ValueKind::Char, true);
        let string_array = builder.register_array_type("String[]", ValueKind::Object, true);
        let object_array = builder.register_array_type("Object[]", ValueKind::Object, true);
        let byte_array = builder.register_array_type("byte[]", ValueKind::Byte, true);
        let bit_set =
            builder.register_instance_type(InstanceTypeSpec::new("BitSet").not_instantiated());
        let intern_support = builder.register_instance_type(
            InstanceTypeSpec::new("StringInternSupport")
                .field(FieldSpec::new("imageInternedStrings", ValueKind::Object).written()),
        );
        let interned_table_field = builder.types[intern_support.index()].instance_fields[0];

        builder.well_known = WellKnown {
            hub_class,
            string,
            char_array,
            string_array,
            object_array,
            byte_array,
            bit_set,
            intern_support,
            interned_table_field,
        };

        builder.register_static_field(INTERN_SUPPORT_FIELD, ValueKind::Object, true);
        for name in image_info::ALL {
            builder.register_static_field(name, ValueKind::Object, true);
        }

        builder
    }

    pub fn layout(&self) -> &ObjectLayout {
        &self.layout
    }

    pub fn well_known(&self) -> &WellKnown {
        &self.well_known
    }

    /// Register an instance type, computing field locations and the instance
    /// size from the declaration order.
    pub fn register_instance_type(&mut self, spec: InstanceTypeSpec) -> ClassId {
        let class = ClassId(self.types.len() as u32);
        let layout = self.layout;
        let reference_size = layout.reference_size();

        // Hybrid instances reserve the array length (and bit set) between
        // the header and the first field.
        let bit_field_offset = layout.array_length_offset() + 4;
        let mut off = match &spec.hybrid {
            Some(h) => bit_field_offset + h.bitset_bytes,
            None => layout.first_instance_field_offset(),
        };

        let mut instance_fields = Vec::new();
        for field in &spec.fields {
            let size = field.kind.byte_size(reference_size, layout.word_size());
            off = off.div_ceil(size) * size;
            let id = FieldId(self.fields.len() as u32);
            self.fields.push(HostedField {
                name: field.name.clone(),
                declaring: class,
                kind: field.kind,
                location: Some(off),
                slot: instance_fields.len(),
                is_accessed: field.is_accessed,
                is_written: field.is_written,
                is_final: field.is_final,
                is_static: false,
            });
            instance_fields.push(id);
            off += size;
        }

        let monitor_offset = spec.monitor.then(|| {
            off = off.div_ceil(reference_size) * reference_size;
            let monitor = off;
            off += reference_size;
            monitor
        });

        let hash_code_offset = spec.with_hash_field.then(|| {
            off = off.div_ceil(4) * 4;
            let hash = off;
            off += 4;
            hash
        });

        // Hybrid array/bit-set fields exist as metadata but have no
        // location: their data is inlined into the instance.
        let hybrid = spec.hybrid.as_ref().map(|h| {
            let array_field = FieldId(self.fields.len() as u32);
            self.fields.push(HostedField {
                name: "hybridArray".to_string(),
                declaring: class,
                kind: ValueKind::Object,
                location: None,
                slot: instance_fields.len(),
                is_accessed: true,
                is_written: false,
                is_final: true,
                is_static: false,
            });
            instance_fields.push(array_field);

            let bitset_field = (h.bitset_bytes > 0).then(|| {
                let id = FieldId(self.fields.len() as u32);
                self.fields.push(HostedField {
                    name: "hybridBitset".to_string(),
                    declaring: class,
                    kind: ValueKind::Object,
                    location: None,
                    slot: instance_fields.len(),
                    is_accessed: true,
                    is_written: false,
                    is_final: true,
                    is_static: false,
                });
                instance_fields.push(id);
                id
            });

            HybridInfo {
                array_field,
                bitset_field,
                element_kind: h.element_kind,
                bit_field_offset,
            }
        });

        let size = layout.align_up(off as u64) as u32;
        self.types.push(HostedType {
            name: spec.name,
            kind: TypeKind::Instance,
            layout: LayoutEncoding::Instance { size },
            is_instantiated: spec.is_instantiated,
            monitor_offset,
            hash_code_offset,
            hybrid,
            instance_fields,
        });
        self.class_init.push(spec.class_init);
        class
    }

    pub fn register_array_type(
        &mut self,
        name: &str,
        component: ValueKind,
        is_instantiated: bool,
    ) -> ClassId {
        let class = ClassId(self.types.len() as u32);
        self.types.push(HostedType {
            name: name.to_string(),
            kind: TypeKind::Array,
            layout: LayoutEncoding::Array { component },
            is_instantiated,
            monitor_offset: None,
            hash_code_offset: None,
            hybrid: None,
            instance_fields: Vec::new(),
        });
        self.class_init.push(true);
        class
    }

    /// Register a located static field. Object statics live in the object
    /// holder array, primitive statics are packed into the byte holder.
    pub fn register_static_field(
        &mut self,
        name: &str,
        kind: ValueKind,
        is_written: bool,
    ) -> FieldId {
        let id = FieldId(self.fields.len() as u32);
        let declaring = if kind == ValueKind::Object {
            self.well_known.object_array
        } else {
            self.well_known.byte_array
        };
        self.fields.push(HostedField {
            name: name.to_string(),
            declaring,
            kind,
            // Locations and value slots are assigned in build(), once the
            // full set of statics is known.
            location: None,
            slot: 0,
            is_accessed: true,
            is_written,
            is_final: false,
            is_static: true,
        });
        self.static_fields.push(id);
        id
    }

    pub fn register_method(&mut self, name: &str, is_compiled: bool) -> MethodId {
        let id = MethodId(self.methods.len() as u32);
        self.methods.push(HostedMethod {
            name: name.to_string(),
            is_compiled,
        });
        id
    }

    pub fn register_immutable_type(&mut self, class: ClassId) {
        self.known_immutable_types.insert(class);
    }

    /// Mark the interned-strings table field as unused by the image.
    pub fn set_intern_table_accessed(&mut self, accessed: bool) {
        self.fields[self.well_known.interned_table_field.index()].is_accessed = accessed;
    }

    pub fn build(mut self) -> HostedUniverse {
        let layout = self.layout;
        let mut next_hash = 1;
        let mut fresh_hash = || {
            let h = next_hash;
            next_hash += 1;
            h
        };

        // Lay the statics out inside their holder arrays and assign each a
        // value slot.
        let mut static_values = Vec::new();
        let mut object_slots = 0u64;
        let mut prim_off = layout.array_base_offset(ValueKind::Byte) as u64;
        for &id in &self.static_fields {
            let field = &mut self.fields[id.index()];
            field.slot = static_values.len();
            if field.kind == ValueKind::Object {
                field.location =
                    Some(layout.array_element_offset(ValueKind::Object, object_slots) as u32);
                object_slots += 1;
                static_values.push(HostValue::Null);
            } else {
                let size = field.kind.byte_size(layout.reference_size(), layout.word_size());
                prim_off = prim_off.div_ceil(size as u64) * size as u64;
                field.location = Some(prim_off as u32);
                prim_off += size as u64;
                static_values.push(HostValue::Prim(PrimValue::zero(field.kind)));
            }
        }
        let prim_holder_len = prim_off - layout.array_base_offset(ValueKind::Byte) as u64;

        let class_hashes: Vec<i32> = self.types.iter().map(|_| fresh_hash()).collect();
        let hubs: Vec<HostRef> = self
            .types
            .iter()
            .enumerate()
            .map(|(i, _)| {
                HostObject::new(
                    self.well_known.hub_class,
                    fresh_hash(),
                    HostObjectBody::Hub {
                        described: ClassId(i as u32),
                        class_init: self.class_init[i],
                    },
                )
            })
            .collect();

        let static_object_fields = HostObject::new(
            self.well_known.object_array,
            fresh_hash(),
            HostObjectBody::ObjArray {
                elements: RefCell::new(vec![HostValue::Null; object_slots as usize]),
            },
        );
        let static_primitive_fields = HostObject::new(
            self.well_known.byte_array,
            fresh_hash(),
            HostObjectBody::PrimArray(PrimArray::Byte(vec![0; prim_holder_len as usize])),
        );
        let intern_support_obj = HostObject::new(
            self.well_known.intern_support,
            fresh_hash(),
            HostObjectBody::Instance {
                fields: RefCell::new(vec![HostValue::Null]),
            },
        );

        let static_fields_by_name = self
            .static_fields
            .iter()
            .map(|&id| (self.fields[id.index()].name.clone(), id))
            .collect::<HashMap<_, _>>();

        let universe = HostedUniverse {
            layout,
            types: self.types,
            fields: self.fields,
            methods: self.methods,
            hubs,
            class_hashes,
            known_immutable_types: self.known_immutable_types,
            replacements: HashMap::new(),
            static_fields: self.static_fields,
            static_values: RefCell::new(static_values),
            static_fields_by_name,
            static_object_fields,
            static_primitive_fields,
            intern_support_obj,
            well_known: self.well_known,
            next_hash: Cell::new(next_hash),
        };

        let intern_field = universe.lookup_static_field(INTERN_SUPPORT_FIELD).unwrap();
        universe.set_static_field(
            intern_field,
            HostValue::Object(universe.intern_support_obj.clone()),
        );
        universe
    }
}

/// The read side of the analysis result, consumed by the heap builder.
pub struct HostedUniverse {
    layout: ObjectLayout,
    types: Vec<HostedType>,
    fields: Vec<HostedField>,
    methods: Vec<HostedMethod>,
    /// Hub object per type, parallel to `types`.
    hubs: Vec<HostRef>,
    /// Identity hash of the host-language class object per type. Hubs adopt
    /// these so class-keyed hash maps stay valid at runtime.
    class_hashes: Vec<i32>,
    known_immutable_types: HashSet<ClassId>,
    /// Analysis-time object substitutions, keyed by identity.
    replacements: HashMap<ObjectId, HostValue>,
    static_fields: Vec<FieldId>,
    static_values: RefCell<Vec<HostValue>>,
    static_fields_by_name: HashMap<String, FieldId>,
    /// Placeholder holder arrays; real values are written at emission time.
    static_object_fields: HostRef,
    static_primitive_fields: HostRef,
    intern_support_obj: HostRef,
    well_known: WellKnown,
    next_hash: Cell<i32>,
}

impl HostedUniverse {
    pub fn layout(&self) -> &ObjectLayout {
        &self.layout
    }

    pub fn well_known(&self) -> &WellKnown {
        &self.well_known
    }

    pub fn ty(&self, class: ClassId) -> &HostedType {
        &self.types[class.index()]
    }

    pub fn field(&self, id: FieldId) -> &HostedField {
        &self.fields[id.index()]
    }

    pub fn method(&self, id: MethodId) -> &HostedMethod {
        &self.methods[id.index()]
    }

    pub fn hub(&self, class: ClassId) -> &HostRef {
        &self.hubs[class.index()]
    }

    pub fn class_identity_hash(&self, class: ClassId) -> i32 {
        self.class_hashes[class.index()]
    }

    pub fn fields(&self) -> impl Iterator<Item = (FieldId, &HostedField)> {
        self.fields
            .iter()
            .enumerate()
            .map(|(i, f)| (FieldId(i as u32), f))
    }

    pub fn lookup_static_field(&self, name: &str) -> Option<FieldId> {
        self.static_fields_by_name.get(name).copied()
    }

    pub fn static_fields(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.static_fields.iter().copied()
    }

    pub fn read_static(&self, id: FieldId) -> HostValue {
        let field = self.field(id);
        assert!(field.is_static, "field {} is not static", field.name);
        self.static_values.borrow()[field.slot].clone()
    }

    pub fn set_static_field(&self, id: FieldId, value: HostValue) {
        let field = self.field(id);
        assert!(field.is_static, "field {} is not static", field.name);
        self.static_values.borrow_mut()[field.slot] = value;
    }

    pub fn static_object_fields(&self) -> &HostRef {
        &self.static_object_fields
    }

    pub fn static_primitive_fields(&self) -> &HostRef {
        &self.static_primitive_fields
    }

    pub fn intern_support(&self) -> &HostRef {
        &self.intern_support_obj
    }

    /// Publish the sorted interned-strings table into the runtime-visible
    /// singleton.
    pub fn set_image_interned_strings(&self, table: &HostRef) {
        match self.intern_support_obj.body() {
            HostObjectBody::Instance { fields } => {
                fields.borrow_mut()[0] = HostValue::Object(table.clone());
            }
            _ => unreachable!("intern support singleton is an instance"),
        }
    }

    pub fn is_known_immutable_type(&self, class: ClassId) -> bool {
        self.known_immutable_types.contains(&class)
    }

    /// Register an analysis-time substitution: whenever `from` is reachable
    /// as an array element, `to` is materialized instead.
    pub fn register_replacement(&mut self, from: &HostRef, to: HostValue) {
        self.replacements.insert(ObjectId::of(from), to);
    }

    /// Apply the substitution hook to a value.
    pub fn replace_object(&self, value: &HostValue) -> HostValue {
        if let HostValue::Object(obj) = value
            && let Some(replacement) = self.replacements.get(&ObjectId::of(obj))
        {
            return replacement.clone();
        }
        value.clone()
    }

    fn fresh_hash(&self) -> i32 {
        let h = self.next_hash.get();
        self.next_hash.set(h + 1);
        h
    }

    pub fn alloc_instance(&self, class: ClassId, fields: Vec<HostValue>) -> HostRef {
        let ty = self.ty(class);
        assert_eq!(ty.kind, TypeKind::Instance, "{} is not an instance type", ty.name);
        assert_eq!(
            fields.len(),
            ty.instance_fields.len(),
            "wrong field count for {}",
            ty.name
        );
        HostObject::new(
            class,
            self.fresh_hash(),
            HostObjectBody::Instance {
                fields: RefCell::new(fields),
            },
        )
    }

    pub fn alloc_obj_array(&self, class: ClassId, elements: Vec<HostValue>) -> HostRef {
        let ty = self.ty(class);
        assert_eq!(ty.component(), Some(ValueKind::Object), "{} is not an object array", ty.name);
        HostObject::new(
            class,
            self.fresh_hash(),
            HostObjectBody::ObjArray {
                elements: RefCell::new(elements),
            },
        )
    }

    pub fn alloc_prim_array(&self, class: ClassId, data: PrimArray) -> HostRef {
        let ty = self.ty(class);
        assert_eq!(ty.component(), Some(data.kind()), "element kind mismatch for {}", ty.name);
        HostObject::new(class, self.fresh_hash(), HostObjectBody::PrimArray(data))
    }

    pub fn alloc_string(&self, text: &str, interned: bool) -> HostRef {
        let chars = self.alloc_prim_array(
            self.well_known.char_array,
            PrimArray::Char(text.encode_utf16().collect()),
        );
        HostObject::new(
            self.well_known.string,
            self.fresh_hash(),
            HostObjectBody::Str {
                value: text.to_string(),
                chars,
                hash: Cell::new(0),
                interned,
            },
        )
    }

    pub fn alloc_bitset(&self, bits: HostBitSet) -> HostRef {
        HostObject::new(
            self.well_known.bit_set,
            self.fresh_hash(),
            HostObjectBody::BitSet(bits),
        )
    }

    /// A host-language class handle. Handles share the identity hash of
    /// their class object but must never be admitted to the heap.
    pub fn alloc_class_handle(&self, class: ClassId) -> HostRef {
        HostObject::new(
            self.well_known.hub_class,
            self.class_identity_hash(class),
            HostObjectBody::ClassHandle(class),
        )
    }
}
