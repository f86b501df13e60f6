//! Packed bitfield layouts
//!
//! Tachograph records pack several small values into one big-endian word
//! (activity change info, control type, card slot status). A [`BitLayout`]
//! declares the named ranges of such a word; extraction follows the
//! Motorola-style numbering used by the format tables: bit 0 is the most
//! significant bit of the first byte.
//!
//! Layouts are `const` values. Their ranges are checked when the constant is
//! evaluated, so an out-of-range field is a compile error rather than a
//! runtime data error.

/// One named bit range inside a packed word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    /// Field name (diagnostics only)
    pub name: &'static str,
    /// Offset of the field's most significant bit, counted from the MSB of the word
    pub offset: u8,
    /// Width in bits (1..=32)
    pub width: u8,
}

impl BitField {
    pub const fn new(name: &'static str, offset: u8, width: u8) -> Self {
        Self { name, offset, width }
    }
}

/// A fixed-width word split into named fields
#[derive(Debug, Clone, Copy)]
pub struct BitLayout {
    /// Word width in bits; must be a multiple of 8, at most 32
    pub width: u8,
    pub fields: &'static [BitField],
}

impl BitLayout {
    /// Declare a layout, checking every field fits inside the word
    pub const fn new(width: u8, fields: &'static [BitField]) -> Self {
        assert!(width > 0 && width <= 32 && width % 8 == 0, "bit layout width must be 8, 16, 24 or 32");
        let mut i = 0;
        while i < fields.len() {
            let field = fields[i];
            assert!(field.width > 0 && field.width <= 32, "bit field width out of range");
            assert!(
                (field.offset as u32) + (field.width as u32) <= width as u32,
                "bit field exceeds layout width"
            );
            i += 1;
        }
        Self { width, fields }
    }

    /// Number of bytes the packed word occupies
    pub const fn byte_len(&self) -> usize {
        (self.width / 8) as usize
    }

    /// Split raw bytes according to this layout
    pub fn unpack(&self, data: &[u8]) -> BitfieldValue {
        let mut raw: u32 = 0;
        for &byte in data.iter().take(self.byte_len()) {
            raw = (raw << 8) | byte as u32;
        }
        BitfieldValue {
            raw,
            width: self.width,
        }
    }
}

/// A packed word read through a [`BitLayout`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitfieldValue {
    /// The whole word, right-aligned
    pub raw: u32,
    width: u8,
}

impl BitfieldValue {
    /// Extract one field
    pub fn get(&self, field: &BitField) -> u32 {
        extract_msb0(self.raw, self.width, field.offset, field.width)
    }

    /// Extract a single-bit field as a flag
    pub fn flag(&self, field: &BitField) -> bool {
        self.get(field) != 0
    }
}

/// Extract `length` bits starting at `start_bit` (bit 0 = MSB of the word)
///
/// Walks the bits one by one so odd widths and offsets need no masks.
fn extract_msb0(word: u32, word_width: u8, start_bit: u8, length: u8) -> u32 {
    let mut result: u32 = 0;

    for i in 0..length {
        let bit_pos = start_bit + i;
        // Bit 0 is the MSB of the word
        let shift = word_width - 1 - bit_pos;
        let bit_value = (word >> shift) & 0x01;
        result |= bit_value << (length - 1 - i);
    }

    result
}

/// Pack field values back into a word (inverse of [`BitLayout::unpack`])
pub fn pack(layout: &BitLayout, values: &[(&BitField, u32)]) -> u32 {
    let mut word: u32 = 0;
    for (field, value) in values {
        let mask = if field.width >= 32 {
            u32::MAX
        } else {
            (1u32 << field.width) - 1
        };
        let shift = layout.width - field.offset - field.width;
        word |= (value & mask) << shift;
    }
    word
}
