//! Nested structures inside Gen2 payloads
//!
//! Two inner encodings appear below the top-level block framing:
//!
//! - **Record arrays** (vehicle unit parts): `{type u8, size u16, count u16}`
//!   followed by `size * count` bytes.
//! - **BER-TLV** (Gen2 certificates): tag of one or more bytes, definite
//!   length in short or long form, then the value.
//!
//! Both walkers follow the same discipline as the block dispatcher: a group is
//! consumed by its declared length whether or not its contents are understood,
//! so an unknown inner tag never desynchronises the walk.

use crate::cursor::Cursor;
use crate::types::{DecoderError, Issue, IssueKind, Result};
use byteorder::{BigEndian, ByteOrder};

/// Record array type carrying the part signature
pub const SIGNATURE_RECORD_TYPE: u8 = 0x08;

/// Gen2 signature sizes (ECDSA over 256, 384 and 512/521 bit curves)
pub const SIGNATURE_LENGTHS: [usize; 4] = [64, 96, 128, 132];

/// Header of one record array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordArrayHeader {
    pub record_type: u8,
    pub record_size: u16,
    pub count: u16,
}

impl RecordArrayHeader {
    pub const LEN: usize = 5;

    pub fn read(cursor: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            record_type: cursor.read_u8()?,
            record_size: cursor.read_u16()?,
            count: cursor.read_u16()?,
        })
    }

    /// Total payload length announced by the header
    pub fn data_len(&self) -> usize {
        self.record_size as usize * self.count as usize
    }

    /// Encode the header back to its five bytes
    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.record_type;
        BigEndian::write_u16(&mut out[1..3], self.record_size);
        BigEndian::write_u16(&mut out[3..5], self.count);
        out
    }
}

/// One record array borrowed from a part payload
#[derive(Debug, Clone)]
pub struct RecordArray<'a> {
    pub header: RecordArrayHeader,
    /// Absolute offset of the first record
    pub offset: usize,
    pub data: &'a [u8],
}

impl<'a> RecordArray<'a> {
    /// Iterate over the records with their absolute offsets
    pub fn records(&self) -> impl Iterator<Item = (usize, &'a [u8])> + '_ {
        let size = self.header.record_size as usize;
        let base = self.offset;
        let data = self.data;
        (0..self.header.count as usize).filter_map(move |i| {
            let start = i * size;
            data.get(start..start + size).map(|record| (base + start, record))
        })
    }
}

/// Result of walking the record arrays of one part
#[derive(Debug, Default)]
pub struct RecordArrayWalk<'a> {
    pub arrays: Vec<RecordArray<'a>>,
    pub issues: Vec<Issue>,
}

impl<'a> RecordArrayWalk<'a> {
    /// First array of the given type
    pub fn find(&self, record_type: u8) -> Option<&RecordArray<'a>> {
        self.arrays.iter().find(|a| a.header.record_type == record_type)
    }
}

/// Split a Gen2 vehicle unit payload into record arrays
///
/// A header announcing more data than remains is a length inconsistency: the
/// walk stops there with an error issue and keeps the arrays already read.
/// A payload that does not end with a signature array gets an error issue too.
pub fn walk_record_arrays(data: &[u8], base: usize) -> RecordArrayWalk<'_> {
    let mut walk = RecordArrayWalk::default();
    let mut cursor = Cursor::with_base(data, base);

    while !cursor.is_empty() {
        let header_offset = cursor.offset();
        let header = match RecordArrayHeader::read(&mut cursor) {
            Ok(header) => header,
            Err(e) => {
                walk.issues.push(
                    Issue::error(IssueKind::LengthMismatch, format!("incomplete record array header: {}", e))
                        .at(header_offset),
                );
                break;
            }
        };

        let offset = cursor.offset();
        let body = match cursor.read_bytes(header.data_len()) {
            Ok(body) => body,
            Err(_) => {
                walk.issues.push(
                    Issue::error(
                        IssueKind::LengthMismatch,
                        format!(
                            "record array 0x{:02X} declares {} x {} bytes, {} remaining",
                            header.record_type,
                            header.count,
                            header.record_size,
                            cursor.remaining()
                        ),
                    )
                    .at(header_offset),
                );
                break;
            }
        };

        log::trace!(
            "Record array 0x{:02X}: {} record(s) of {} bytes at {}",
            header.record_type,
            header.count,
            header.record_size,
            offset
        );

        walk.arrays.push(RecordArray {
            header,
            offset,
            data: body,
        });
    }

    match walk.arrays.last() {
        Some(last) if last.header.record_type == SIGNATURE_RECORD_TYPE => {
            let size = last.header.record_size as usize;
            if last.header.count != 1 || !SIGNATURE_LENGTHS.contains(&size) {
                walk.issues.push(
                    Issue::error(
                        IssueKind::ChecksumMismatch,
                        format!(
                            "signature record array holds {} x {} bytes",
                            last.header.count, last.header.record_size
                        ),
                    )
                    .at(last.offset),
                );
            }
        }
        _ => walk.issues.push(
            Issue::error(IssueKind::ChecksumMismatch, "part does not end with a signature record array")
                .at(base),
        ),
    }

    walk
}

/// One BER-TLV data object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tag: u32,
    /// Absolute offset of the tag
    pub offset: usize,
    pub value: &'a [u8],
}

impl<'a> Tlv<'a> {
    /// Constructed objects (bit 6 of the first tag byte) hold nested objects
    pub fn is_constructed(&self) -> bool {
        let first = if self.tag > 0xFFFF {
            self.tag >> 16
        } else if self.tag > 0xFF {
            self.tag >> 8
        } else {
            self.tag
        };
        first & 0x20 != 0
    }

    /// Parse the nested objects of a constructed object
    pub fn children(&self) -> Result<Vec<Tlv<'a>>> {
        let header_len = tag_len(self.tag) + length_len(self.value.len());
        parse_tlv(self.value, self.offset + header_len)
    }
}

/// Parse a sequence of BER-TLV objects at one nesting level
pub fn parse_tlv(data: &[u8], base: usize) -> Result<Vec<Tlv<'_>>> {
    let mut cursor = Cursor::with_base(data, base);
    let mut objects = Vec::new();

    while !cursor.is_empty() {
        // Padding between objects
        if matches!(cursor.peek_u8(), Some(0x00) | Some(0xFF)) {
            cursor.skip(1)?;
            continue;
        }

        let offset = cursor.offset();
        let tag = read_tag(&mut cursor)?;
        let length = read_length(&mut cursor)?;
        let value = cursor.read_bytes(length)?;
        objects.push(Tlv { tag, offset, value });
    }

    Ok(objects)
}

/// Find the first object with `tag` at one nesting level
pub fn find<'a, 'b>(objects: &'b [Tlv<'a>], tag: u32) -> Option<&'b Tlv<'a>> {
    objects.iter().find(|o| o.tag == tag)
}

fn read_tag(cursor: &mut Cursor<'_>) -> Result<u32> {
    let first = cursor.read_u8()?;
    let mut tag = first as u32;
    if first & 0x1F != 0x1F {
        return Ok(tag);
    }

    // Subsequent bytes continue while bit 8 is set
    for _ in 0..3 {
        let next = cursor.read_u8()?;
        tag = (tag << 8) | next as u32;
        if next & 0x80 == 0 {
            return Ok(tag);
        }
    }

    Err(DecoderError::InvalidEncoding {
        offset: cursor.offset(),
        detail: "BER tag longer than 4 bytes".to_string(),
        partial: None,
    })
}

fn read_length(cursor: &mut Cursor<'_>) -> Result<usize> {
    let offset = cursor.offset();
    let first = cursor.read_u8()?;
    match first {
        0x00..=0x7F => Ok(first as usize),
        0x81 => Ok(cursor.read_u8()? as usize),
        0x82 => Ok(cursor.read_u16()? as usize),
        0x83 => Ok(cursor.read_u24()? as usize),
        _ => Err(DecoderError::InvalidEncoding {
            offset,
            detail: format!("unsupported BER length byte 0x{:02X}", first),
            partial: None,
        }),
    }
}

fn tag_len(tag: u32) -> usize {
    match tag {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

fn length_len(len: usize) -> usize {
    match len {
        0..=0x7F => 1,
        0x80..=0xFF => 2,
        0x100..=0xFFFF => 3,
        _ => 4,
    }
}
