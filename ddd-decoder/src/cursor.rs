//! Byte cursor with typed reads
//!
//! The primitive layer of the decoder. A [`Cursor`] borrows a byte slice and
//! tracks one position; every read advances that position by exactly the
//! number of bytes it consumed, including reads that fail with
//! [`DecoderError::InvalidEncoding`]. Only a read that runs past the end of the
//! slice leaves the position untouched.
//!
//! The cursor knows nothing about tachograph records. Shared encodings (BCD
//! digits, `TimeReal` timestamps, code-paged strings, packed bitfields) are
//! decoded here once instead of in each record decoder.

use crate::bitfield::{BitLayout, BitfieldValue};
use crate::types::{time_real, DecoderError, Result, Timestamp};
use byteorder::{BigEndian, ByteOrder};
use chrono::DateTime;

/// Character set a fixed-length text field is declared in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// Printable 7-bit ASCII (card numbers, approval numbers, VIN)
    Ascii,
    /// ISO/IEC 8859-1
    Latin1,
    /// A tachograph code page byte (ISO/IEC 8859 part number)
    CodePage(u8),
}

/// Text decoded from a fixed-length field
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedText {
    /// Field contents with trailing padding removed
    pub text: String,
    /// True when at least one byte fell outside the declared charset
    pub flagged: bool,
}

/// Position-tracked reader over a borrowed byte slice
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    /// Absolute offset of `data[0]` in the original file (for error reporting)
    base: usize,
}

impl<'a> Cursor<'a> {
    /// Create a cursor at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// Create a cursor whose reported offsets are shifted by `base`
    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    /// Current position relative to the start of the slice
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Current position as an absolute file offset
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Bytes from the current position to the end, without advancing
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Return the next `n` bytes and advance past them
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(DecoderError::TruncatedData {
                offset: self.offset(),
                requested: n,
                remaining: self.remaining(),
            });
        }
        let chunk = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(chunk)
    }

    /// Advance by `n` bytes without decoding them
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read_bytes(n).map(|_| ())
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u24(self.read_bytes(3)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.read_bytes(4)?))
    }

    /// Signed 24-bit big-endian integer (GNSS coordinates)
    pub fn read_i24(&mut self) -> Result<i32> {
        Ok(BigEndian::read_i24(self.read_bytes(3)?))
    }

    /// Decode `n` bytes of binary-coded decimal into `2n` digits
    ///
    /// A nibble above 9 fails the read with `InvalidEncoding`; the cursor
    /// still advances by `n` and the error carries the partial digit string
    /// with `?` in place of each invalid nibble.
    pub fn read_bcd(&mut self, n: usize) -> Result<String> {
        let start = self.offset();
        let raw = self.read_bytes(n)?;

        let mut digits = String::with_capacity(n * 2);
        let mut invalid = 0usize;
        for byte in raw {
            for nibble in [byte >> 4, byte & 0x0F] {
                if nibble <= 9 {
                    digits.push((b'0' + nibble) as char);
                } else {
                    digits.push('?');
                    invalid += 1;
                }
            }
        }

        if invalid > 0 {
            return Err(DecoderError::InvalidEncoding {
                offset: start,
                detail: format!("{} BCD nibble(s) above 9", invalid),
                partial: Some(digits),
            });
        }
        Ok(digits)
    }

    /// Read a packed word and split it according to `layout`
    pub fn read_bitfield(&mut self, layout: &BitLayout) -> Result<BitfieldValue> {
        let raw = self.read_bytes(layout.byte_len())?;
        Ok(layout.unpack(raw))
    }

    /// Decode `n` bytes of text, trimming trailing padding (NUL, space, 0xFF)
    pub fn read_fixed_string(&mut self, n: usize, charset: Charset) -> Result<DecodedText> {
        let raw = self.read_bytes(n)?;
        Ok(decode_text(raw, charset))
    }

    /// Read a `TimeReal`: 4-byte big-endian seconds since 1970-01-01T00:00:00Z
    pub fn read_timestamp(&mut self) -> Result<Timestamp> {
        let offset = self.offset();
        let seconds = self.read_u32()?;
        DateTime::from_timestamp(seconds as i64, 0).ok_or_else(|| DecoderError::InvalidEncoding {
            offset,
            detail: format!("timestamp {} out of range", seconds),
            partial: None,
        })
    }

    /// Read a `TimeReal` that may hold one of the "no value" markers
    pub fn read_optional_timestamp(&mut self) -> Result<Option<Timestamp>> {
        Ok(time_real(self.read_u32()?))
    }
}

/// Decode a text field in the given charset
pub fn decode_text(raw: &[u8], charset: Charset) -> DecodedText {
    let end = raw
        .iter()
        .rposition(|&b| !matches!(b, 0x00 | 0x20 | 0xFF))
        .map(|i| i + 1)
        .unwrap_or(0);

    let mut text = String::with_capacity(end);
    let mut flagged = false;
    for &byte in &raw[..end] {
        let (ch, in_charset) = map_byte(byte, charset);
        flagged |= !in_charset;
        text.push(ch);
    }

    DecodedText { text, flagged }
}

/// Map one byte to a char, reporting whether it belongs to the charset
///
/// Bytes outside the charset are preserved as their Latin-1 character.
fn map_byte(byte: u8, charset: Charset) -> (char, bool) {
    let printable_ascii = (0x20..=0x7E).contains(&byte);
    match charset {
        Charset::Ascii => (byte as char, printable_ascii),
        Charset::Latin1 | Charset::CodePage(1) => (byte as char, printable_ascii || byte >= 0xA0),
        Charset::CodePage(15) => match latin9_override(byte) {
            Some(ch) => (ch, true),
            None => (byte as char, printable_ascii || byte >= 0xA0),
        },
        // Other ISO 8859 parts share the ASCII half only
        Charset::CodePage(_) => (byte as char, printable_ascii),
    }
}

/// Code points where ISO/IEC 8859-15 differs from 8859-1
fn latin9_override(byte: u8) -> Option<char> {
    match byte {
        0xA4 => Some('€'),
        0xA6 => Some('Š'),
        0xA8 => Some('š'),
        0xB4 => Some('Ž'),
        0xB8 => Some('ž'),
        0xBC => Some('Œ'),
        0xBD => Some('œ'),
        0xBE => Some('Ÿ'),
        _ => None,
    }
}

/// Encode a decimal digit string as BCD (inverse of [`Cursor::read_bcd`])
///
/// Returns `None` for an odd number of digits or a non-digit character.
pub fn encode_bcd(digits: &str) -> Option<Vec<u8>> {
    let bytes = digits.as_bytes();
    if bytes.len() % 2 != 0 {
        return None;
    }
    bytes
        .chunks(2)
        .map(|pair| {
            let high = (pair[0] as char).to_digit(10)? as u8;
            let low = (pair[1] as char).to_digit(10)? as u8;
            Some((high << 4) | low)
        })
        .collect()
}
