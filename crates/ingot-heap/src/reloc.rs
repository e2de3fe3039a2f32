//! Relocatable output buffers.
//!
//! A [`RelocatableBuffer`] is a byte-addressed image section plus the
//! relocation records the dynamic linker applies at load time. All primitive
//! writes are little-endian at absolute indices.

use ingot_meta::{MethodId, ObjectId};

/// What a relocation resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelocationTarget {
    Object(ObjectId),
    Method(MethodId),
}

/// A record telling the dynamic linker to patch `size` bytes at `index`
/// with the final address of `target` (plus `addend`, if any).
#[derive(Clone, Copy, Debug)]
pub struct Relocation {
    pub index: usize,
    pub size: u32,
    pub addend: Option<u64>,
    pub target: RelocationTarget,
}

#[derive(Debug)]
pub struct RelocatableBuffer {
    bytes: Vec<u8>,
    relocations: Vec<Relocation>,
}

impl RelocatableBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0; len],
            relocations: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    fn put(&mut self, index: usize, data: &[u8]) {
        self.bytes[index..index + data.len()].copy_from_slice(data);
    }

    pub fn put_u8(&mut self, index: usize, value: u8) {
        self.bytes[index] = value;
    }

    pub fn put_i8(&mut self, index: usize, value: i8) {
        self.bytes[index] = value as u8;
    }

    pub fn put_u16(&mut self, index: usize, value: u16) {
        self.put(index, &value.to_le_bytes());
    }

    pub fn put_i16(&mut self, index: usize, value: i16) {
        self.put(index, &value.to_le_bytes());
    }

    pub fn put_u32(&mut self, index: usize, value: u32) {
        self.put(index, &value.to_le_bytes());
    }

    pub fn put_i32(&mut self, index: usize, value: i32) {
        self.put(index, &value.to_le_bytes());
    }

    pub fn put_u64(&mut self, index: usize, value: u64) {
        self.put(index, &value.to_le_bytes());
    }

    pub fn put_i64(&mut self, index: usize, value: i64) {
        self.put(index, &value.to_le_bytes());
    }

    pub fn put_f32(&mut self, index: usize, value: f32) {
        self.put(index, &value.to_le_bytes());
    }

    pub fn put_f64(&mut self, index: usize, value: f64) {
        self.put(index, &value.to_le_bytes());
    }

    pub fn get_u8(&self, index: usize) -> u8 {
        self.bytes[index]
    }

    /// OR a mask into the byte at `index`. Bit-set emission accumulates.
    pub fn or_u8(&mut self, index: usize, mask: u8) {
        self.bytes[index] |= mask;
    }

    /// Write a reference-sized value.
    pub fn put_reference_value(&mut self, index: usize, value: u64, reference_size: u32) {
        match reference_size {
            8 => self.put_u64(index, value),
            4 => self.put_u32(
                index,
                u32::try_from(value).expect("reference value overflows a 32-bit slot"),
            ),
            other => panic!("unsupported reference size: {other}"),
        }
    }

    /// Write a word-sized raw integer.
    pub fn put_word(&mut self, index: usize, value: u64, word_size: u32) {
        match word_size {
            8 => self.put_u64(index, value),
            4 => self.put_u32(index, u32::try_from(value).expect("word overflows a 32-bit slot")),
            other => panic!("unsupported word size: {other}"),
        }
    }

    pub fn add_direct_relocation_without_addend(
        &mut self,
        index: usize,
        size: u32,
        target: RelocationTarget,
    ) {
        self.relocations.push(Relocation {
            index,
            size,
            addend: None,
            target,
        });
    }

    pub fn add_direct_relocation_with_addend(
        &mut self,
        index: usize,
        size: u32,
        addend: u64,
        target: RelocationTarget,
    ) {
        self.relocations.push(Relocation {
            index,
            size,
            addend: Some(addend),
            target,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingot_meta::MethodId;

    #[test]
    fn little_endian_writes() {
        let mut buf = RelocatableBuffer::new(16);
        buf.put_i32(0, 0x01020304);
        assert_eq!(&buf.bytes()[0..4], &[0x04, 0x03, 0x02, 0x01]);
        buf.put_u16(4, 0xBEEF);
        assert_eq!(&buf.bytes()[4..6], &[0xEF, 0xBE]);
        buf.put_f64(8, 1.0);
        assert_eq!(&buf.bytes()[8..16], &1.0f64.to_le_bytes());
    }

    #[test]
    fn or_accumulates_bits() {
        let mut buf = RelocatableBuffer::new(2);
        buf.or_u8(0, 0x01);
        buf.or_u8(0, 0x08);
        assert_eq!(buf.get_u8(0), 0x09);
    }

    #[test]
    fn narrow_reference_values() {
        let mut buf = RelocatableBuffer::new(8);
        buf.put_reference_value(0, 0x1234, 4);
        assert_eq!(&buf.bytes()[0..4], &[0x34, 0x12, 0x00, 0x00]);
    }

    #[test]
    #[should_panic(expected = "overflows a 32-bit slot")]
    fn narrow_reference_overflow_panics() {
        let mut buf = RelocatableBuffer::new(8);
        buf.put_reference_value(0, u64::MAX, 4);
    }

    #[test]
    fn relocation_records() {
        let mut buf = RelocatableBuffer::new(8);
        buf.add_direct_relocation_with_addend(0, 8, 7, RelocationTarget::Method(MethodId(3)));
        let reloc = &buf.relocations()[0];
        assert_eq!(reloc.index, 0);
        assert_eq!(reloc.addend, Some(7));
        assert_eq!(reloc.target, RelocationTarget::Method(MethodId(3)));
    }
}
