//! Block dispatcher
//!
//! Walks the top-level `tag u16 | length u16 | payload` sequence, detects the
//! source kind and generation, and routes every payload to the record decoder
//! registered for `(generation, tag)`.
//!
//! The walk is sequential and owns the only cursor over the file. Each block
//! consumes exactly `4 + length` bytes whatever happens to its payload, so a
//! block that cannot be decoded never shifts the blocks after it. Decoding the
//! payloads is pure and may run on the rayon pool once the walk is done.

use crate::config::DecoderConfig;
use crate::cursor::Cursor;
use crate::records::{self, Decoded, RawUnknownRecord, Record, RecordKind, UnknownReason};
use crate::types::{DecoderError, Generation, Issue, IssueKind, Result, Severity, SourceKind};
use crate::validator::PartId;
use byteorder::{BigEndian, ByteOrder};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

/// Size of a block header (tag + length)
pub const HEADER_LEN: usize = 4;

/// Transfer-data positive response service identifier, high byte of VU tags
const VU_SID: u8 = 0x76;

/// Card signature blocks are tagged with this bit set on the signed EF
const SIGNATURE_FLAG: u16 = 0x8000;

/// EF holding the card structure version
const APPLICATION_IDENTIFICATION: u16 = 0x0501;

type BlockDecoder = fn(&[u8], usize, Generation) -> Result<Decoded>;

/// One entry of the dispatch table
struct Route {
    tag: u16,
    part: PartId,
    gen1: bool,
    gen2: bool,
    decode: BlockDecoder,
}

const fn route(tag: u16, part: PartId, gen1: bool, gen2: bool, decode: BlockDecoder) -> Route {
    Route {
        tag,
        part,
        gen1,
        gen2,
        decode,
    }
}

impl Route {
    fn supports(&self, generation: Generation) -> bool {
        match generation {
            Generation::Gen1 => self.gen1,
            Generation::Gen2 => self.gen2,
        }
    }
}

static CARD_ROUTES: &[Route] = &[
    route(0x0002, PartId::CardIcc, true, true, records::decode_card_icc),
    route(0x0005, PartId::CardIc, true, true, records::decode_card_ic),
    route(0x0501, PartId::ApplicationIdentification, true, true, records::decode_application_identification),
    route(0x0502, PartId::Events, true, true, records::decode_card_events),
    route(0x0503, PartId::Faults, true, true, records::decode_card_faults),
    route(0x0504, PartId::DriverActivity, true, true, records::decode_driver_activity),
    route(0x0505, PartId::VehiclesUsed, true, true, records::decode_vehicles_used),
    route(0x0506, PartId::Places, true, true, records::decode_places),
    route(0x0507, PartId::CurrentUsage, true, true, records::decode_current_usage),
    route(0x0508, PartId::ControlActivity, true, true, records::decode_control_activity),
    route(0x050E, PartId::CardDownload, true, true, records::decode_card_download),
    route(0x0520, PartId::Identification, true, true, records::decode_card_identification),
    route(0x0521, PartId::DrivingLicence, true, true, records::decode_driving_licence),
    route(0x0522, PartId::SpecificConditions, true, true, records::decode_specific_conditions),
    route(0x0523, PartId::VehicleUnitsUsed, false, true, records::decode_vehicle_units_used),
    route(0x0524, PartId::GnssPlaces, false, true, records::decode_gnss_places),
    route(0x0528, PartId::BorderCrossings, false, true, records::decode_border_crossings),
    route(0xC100, PartId::CardCertificate, true, false, records::decode_card_certificate),
    route(0xC108, PartId::CaCertificate, true, false, records::decode_ca_certificate),
    route(0xC101, PartId::CardCertificate, false, true, records::decode_card_certificate),
    route(0xC109, PartId::CaCertificate, false, true, records::decode_ca_certificate),
];

static VU_ROUTES: &[Route] = &[
    route(0x7600, PartId::DownloadInterfaceVersion, true, true, records::decode_vu_interface_version),
    route(0x7601, PartId::Overview, true, false, records::decode_vu_overview),
    route(0x7602, PartId::Activities, true, false, records::decode_vu_activities),
    route(0x7603, PartId::EventsAndFaults, true, false, records::decode_vu_events),
    route(0x7604, PartId::DetailedSpeed, true, false, records::decode_vu_speed),
    route(0x7605, PartId::TechnicalData, true, false, records::decode_vu_technical),
    route(0x7621, PartId::Overview, false, true, records::decode_vu_overview),
    route(0x7622, PartId::Activities, false, true, records::decode_vu_activities),
    route(0x7623, PartId::EventsAndFaults, false, true, records::decode_vu_events),
    route(0x7624, PartId::DetailedSpeed, false, true, records::decode_vu_speed),
    route(0x7625, PartId::TechnicalData, false, true, records::decode_vu_technical),
    route(0x7631, PartId::Overview, false, true, records::decode_vu_overview),
    route(0x7632, PartId::Activities, false, true, records::decode_vu_activities),
    route(0x7633, PartId::EventsAndFaults, false, true, records::decode_vu_events),
    route(0x7635, PartId::TechnicalData, false, true, records::decode_vu_technical),
];

fn routes(source: SourceKind) -> &'static [Route] {
    match source {
        SourceKind::DriverCard => CARD_ROUTES,
        SourceKind::VehicleUnit => VU_ROUTES,
    }
}

fn find_route(source: SourceKind, tag: u16) -> Option<&'static Route> {
    routes(source).iter().find(|r| r.tag == tag)
}

/// Card EF signed by a block with this tag, if it is a signature block
fn signed_ef(source: SourceKind, tag: u16) -> Option<&'static Route> {
    if source != SourceKind::DriverCard || tag & SIGNATURE_FLAG == 0 {
        return None;
    }
    find_route(source, tag & !SIGNATURE_FLAG)
}

/// Encode one top-level block
pub fn encode_block(tag: u16, payload: &[u8]) -> Result<Vec<u8>> {
    let length = u16::try_from(payload.len()).map_err(|_| DecoderError::PayloadTooLarge {
        tag,
        length: payload.len(),
    })?;
    let mut out = vec![0u8; HEADER_LEN];
    BigEndian::write_u16(&mut out[0..2], tag);
    BigEndian::write_u16(&mut out[2..4], length);
    out.extend_from_slice(payload);
    Ok(out)
}

/// A framed block borrowed from the file buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block<'a> {
    pub tag: u16,
    /// Absolute offset of the block header
    pub offset: usize,
    pub declared_length: usize,
    /// Payload bytes; shorter than `declared_length` only for a truncated final block
    pub payload: &'a [u8],
}

impl<'a> Block<'a> {
    pub fn payload_offset(&self) -> usize {
        self.offset + HEADER_LEN
    }

    pub fn is_truncated(&self) -> bool {
        self.payload.len() < self.declared_length
    }
}

/// Result of the sequential block walk
#[derive(Debug, Default)]
pub struct BlockWalk<'a> {
    pub blocks: Vec<Block<'a>>,
    /// File-level findings (trailing bytes)
    pub issues: Vec<Issue>,
}

/// Split a buffer into blocks
///
/// A final block whose payload runs past the end of the buffer is kept with
/// the bytes that are there. Fewer than four bytes after the last block are
/// reported as trailing bytes.
pub fn walk_blocks(data: &[u8]) -> BlockWalk<'_> {
    let mut walk = BlockWalk::default();
    let mut cursor = Cursor::new(data);

    while cursor.remaining() >= HEADER_LEN {
        let offset = cursor.offset();
        let (tag, length) = match (cursor.read_u16(), cursor.read_u16()) {
            (Ok(tag), Ok(length)) => (tag, length as usize),
            _ => break,
        };
        let available = length.min(cursor.remaining());
        let payload = match cursor.read_bytes(available) {
            Ok(payload) => payload,
            Err(_) => break,
        };
        walk.blocks.push(Block {
            tag,
            offset,
            declared_length: length,
            payload,
        });
    }

    if !cursor.is_empty() {
        walk.issues.push(
            Issue::warning(
                IssueKind::TrailingBytes,
                format!("{} byte(s) after the last block", cursor.remaining()),
            )
            .at(cursor.offset()),
        );
    }

    walk
}

/// Determine source kind and generation from the leading blocks
///
/// This is the only place a file can be rejected.
pub fn detect(data: &[u8]) -> Result<(SourceKind, Generation)> {
    if data.len() < HEADER_LEN {
        return Err(DecoderError::MalformedHeader(format!(
            "file too short for a block header ({} bytes)",
            data.len()
        )));
    }
    let first_tag = BigEndian::read_u16(&data[0..2]);

    if (first_tag >> 8) as u8 == VU_SID {
        let generation = detect_vu_generation(data, first_tag)?;
        return Ok((SourceKind::VehicleUnit, generation));
    }

    let card = SourceKind::DriverCard;
    if find_route(card, first_tag).is_some() || signed_ef(card, first_tag).is_some() {
        let generation = detect_card_generation(data)?;
        return Ok((card, generation));
    }

    Err(DecoderError::MalformedHeader(format!(
        "first tag 0x{:04X} is neither a vehicle unit part nor a card file",
        first_tag
    )))
}

fn detect_vu_generation(data: &[u8], first_tag: u16) -> Result<Generation> {
    let trep = (first_tag & 0xFF) as u8;
    match trep {
        0x00 => match data.get(HEADER_LEN) {
            Some(0x00) => Ok(Generation::Gen1),
            Some(0x01) => Ok(Generation::Gen2),
            Some(other) => Err(DecoderError::MalformedHeader(format!(
                "unknown download interface generation 0x{:02X}",
                other
            ))),
            None => Err(DecoderError::MalformedHeader(
                "download interface version block has no payload".to_string(),
            )),
        },
        0x01..=0x05 => Ok(Generation::Gen1),
        0x21..=0x25 | 0x31..=0x35 => Ok(Generation::Gen2),
        other => Err(DecoderError::MalformedHeader(format!(
            "unknown vehicle unit transfer type 0x{:02X}",
            other
        ))),
    }
}

fn detect_card_generation(data: &[u8]) -> Result<Generation> {
    let walk = walk_blocks(data);
    let block = walk
        .blocks
        .iter()
        .find(|b| b.tag == APPLICATION_IDENTIFICATION)
        .ok_or_else(|| DecoderError::MalformedHeader("no application identification block".to_string()))?;

    if block.payload.len() < 10 {
        return Err(DecoderError::MalformedHeader(format!(
            "application identification holds {} bytes, at least 10 needed",
            block.payload.len()
        )));
    }

    // typeOfTachographCardId, then cardStructureVersion
    match block.payload[1] {
        0x00 => Ok(Generation::Gen1),
        0x01 => Ok(Generation::Gen2),
        other => Err(DecoderError::MalformedHeader(format!(
            "unknown card structure version 0x{:02X}{:02X}",
            other, block.payload[2]
        ))),
    }
}

/// Outcome of one block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockStatus {
    Decoded,
    /// Unknown tag or other generation, kept undecoded
    Skipped,
    LocallyFailed,
}

/// A dispatched block with everything decoded from it
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBlock {
    pub tag: u16,
    pub offset: usize,
    pub declared_length: usize,
    pub truncated: bool,
    /// Part the block belongs to; `None` for skipped blocks
    pub part: Option<PartId>,
    /// Card signature block covering the part's data block
    pub is_signature: bool,
    pub status: BlockStatus,
    pub records: Vec<Record>,
    pub issues: Vec<Issue>,
}

/// All blocks of a file in stream order
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub source: SourceKind,
    pub generation: Generation,
    pub blocks: Vec<DecodedBlock>,
    /// File-level findings
    pub issues: Vec<Issue>,
}

impl Dispatch {
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.blocks.iter().flat_map(|b| b.records.iter())
    }

    /// File-level issues followed by block issues, in stream order
    pub fn all_issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues
            .iter()
            .chain(self.blocks.iter().flat_map(|b| b.issues.iter()))
    }
}

/// Walk, route and decode every block of a file
pub fn dispatch(data: &[u8], config: &DecoderConfig, cancel: Option<&AtomicBool>) -> Result<Dispatch> {
    let (source, generation) = detect(data)?;
    log::debug!("Detected {} file, {}", source, generation);

    let walk = walk_blocks(data);
    let is_cancelled = || cancel.map_or(false, |flag| flag.load(Ordering::Relaxed));

    let blocks: Vec<DecodedBlock> = if config.parallel_records {
        walk.blocks
            .par_iter()
            .map(|block| {
                if is_cancelled() {
                    return Err(DecoderError::Cancelled);
                }
                Ok(decode_block(block, source, generation, config))
            })
            .collect::<Result<Vec<_>>>()?
    } else {
        let mut blocks = Vec::with_capacity(walk.blocks.len());
        for block in &walk.blocks {
            if is_cancelled() {
                return Err(DecoderError::Cancelled);
            }
            blocks.push(decode_block(block, source, generation, config));
        }
        blocks
    };

    log_block_warnings(&blocks, config.max_logged_warnings);
    for issue in &walk.issues {
        log::warn!("{}", issue);
    }

    Ok(Dispatch {
        source,
        generation,
        blocks,
        issues: walk.issues,
    })
}

fn raw_unknown(block: &Block<'_>, reason: UnknownReason, config: &DecoderConfig) -> RawUnknownRecord {
    RawUnknownRecord {
        tag: block.tag,
        offset: block.payload_offset(),
        length: block.declared_length,
        payload: config.keep_unknown_payloads.then(|| block.payload.to_vec()),
        reason,
    }
}

/// Decode one block; never fails, failures become issues on the block
fn decode_block(
    block: &Block<'_>,
    source: SourceKind,
    generation: Generation,
    config: &DecoderConfig,
) -> DecodedBlock {
    let mut out = DecodedBlock {
        tag: block.tag,
        offset: block.offset,
        declared_length: block.declared_length,
        truncated: block.is_truncated(),
        part: None,
        is_signature: false,
        status: BlockStatus::Decoded,
        records: Vec::new(),
        issues: Vec::new(),
    };

    let routed = find_route(source, block.tag);
    match routed {
        Some(r) if r.supports(generation) => {
            out.part = Some(r.part);
            log::debug!(
                "Block 0x{:04X} ({:?}) at {}: {} bytes",
                block.tag,
                r.part,
                block.offset,
                block.declared_length
            );

            if block.is_truncated() {
                out.status = BlockStatus::LocallyFailed;
                out.issues.push(Issue::error(
                    IssueKind::TruncatedData,
                    format!(
                        "block declares {} bytes, {} remaining in the file",
                        block.declared_length,
                        block.payload.len()
                    ),
                ));
                out.records.push(Record {
                    generation,
                    kind: RecordKind::RawUnknown(raw_unknown(block, UnknownReason::DecodeFailed, config)),
                });
            } else {
                match (r.decode)(block.payload, block.payload_offset(), generation) {
                    Ok(decoded) => {
                        out.records = decoded.records;
                        out.issues = decoded.issues;
                    }
                    Err(e) => {
                        out.status = BlockStatus::LocallyFailed;
                        out.issues.push(Issue::from_error(&e, Severity::Error));
                        out.records.push(Record {
                            generation,
                            kind: RecordKind::RawUnknown(raw_unknown(block, UnknownReason::DecodeFailed, config)),
                        });
                    }
                }
            }
        }
        Some(r) => {
            out.status = BlockStatus::Skipped;
            out.issues.push(Issue::warning(
                IssueKind::GenerationMismatch,
                format!("{:?} block of the other generation in a {} file", r.part, generation),
            ));
            out.records.push(Record {
                generation,
                kind: RecordKind::RawUnknown(raw_unknown(block, UnknownReason::GenerationMismatch, config)),
            });
        }
        None => match signed_ef(source, block.tag) {
            Some(r) if r.supports(generation) => {
                out.part = Some(r.part);
                out.is_signature = true;
                log::trace!("Signature block for EF 0x{:04X}", r.tag);
            }
            _ => {
                out.status = BlockStatus::Skipped;
                out.issues.push(Issue::warning(
                    IssueKind::UnknownBlockType,
                    format!("unknown tag, {} bytes skipped", block.declared_length),
                ));
                out.records.push(Record {
                    generation,
                    kind: RecordKind::RawUnknown(raw_unknown(block, UnknownReason::UnknownTag, config)),
                });
            }
        },
    }

    for issue in &mut out.issues {
        issue.tag.get_or_insert(block.tag);
        if issue.offset.is_none() {
            issue.offset = Some(block.offset);
        }
    }
    out
}

fn log_block_warnings(blocks: &[DecodedBlock], max_warnings: usize) {
    let mut warning_count = 0;
    for issue in blocks.iter().flat_map(|b| b.issues.iter()) {
        warning_count += 1;
        if warning_count <= max_warnings {
            log::warn!("{} (warning {}/{})", issue, warning_count, max_warnings);
        } else if warning_count == max_warnings + 1 {
            log::warn!("... suppressing further block warnings for this file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(tag: u16, payload: &[u8]) -> Vec<u8> {
        encode_block(tag, payload).unwrap()
    }

    fn app_identification(version_major: u8) -> Vec<u8> {
        let mut payload = vec![0x01, version_major, 0x00, 12, 24, 0x2A, 0x30, 0, 84, 112];
        if version_major == 0x01 {
            payload.extend([0, 200, 0, 24, 0, 8]);
            payload.push(0);
        }
        payload
    }

    #[test]
    fn test_walk_consumes_declared_length() {
        let mut data = block(0x0501, &[0xEE; 18]);
        data.extend(block(0x0520, &[1, 2, 3]));

        let walk = walk_blocks(&data);
        assert_eq!(walk.blocks.len(), 2);
        assert_eq!(walk.blocks[0].payload.len(), 18);
        assert_eq!(walk.blocks[1].offset, 22);
        assert_eq!(walk.blocks[1].tag, 0x0520);
        assert!(walk.issues.is_empty());
    }

    #[test]
    fn test_encode_block_rejects_oversized_payload() {
        let largest = encode_block(0x0504, &vec![0u8; 0xFFFF]).unwrap();
        assert_eq!(&largest[2..4], &[0xFF, 0xFF]);
        assert_eq!(walk_blocks(&largest).blocks[0].payload.len(), 0xFFFF);

        let err = encode_block(0x0504, &vec![0u8; 0x1_0000]).unwrap_err();
        assert!(matches!(err, DecoderError::PayloadTooLarge { tag: 0x0504, length: 0x1_0000 }));
    }

    #[test]
    fn test_walk_trailing_and_truncated() {
        let mut data = block(0x0501, &[0; 4]);
        data.extend([0x05, 0x02]);
        let walk = walk_blocks(&data);
        assert_eq!(walk.blocks.len(), 1);
        assert_eq!(walk.issues.len(), 1);
        assert_eq!(walk.issues[0].kind, IssueKind::TrailingBytes);
        assert_eq!(walk.issues[0].offset, Some(8));

        let mut data = block(0x0501, &[0; 4]);
        data.extend([0x05, 0x02, 0x00, 0x30, 0xAA]);
        let walk = walk_blocks(&data);
        assert_eq!(walk.blocks.len(), 2);
        assert!(walk.blocks[1].is_truncated());
        assert_eq!(walk.blocks[1].payload, &[0xAA]);
        assert!(walk.issues.is_empty());
    }

    #[test]
    fn test_detect_card_generation() {
        let mut data = block(0x0002, &[0; 25]);
        data.extend(block(0x0501, &app_identification(0x00)));
        assert_eq!(detect(&data).unwrap(), (SourceKind::DriverCard, Generation::Gen1));

        let data = block(0x0501, &app_identification(0x01));
        assert_eq!(detect(&data).unwrap(), (SourceKind::DriverCard, Generation::Gen2));
    }

    #[test]
    fn test_detect_rejects() {
        assert!(matches!(detect(&[0x05]), Err(DecoderError::MalformedHeader(_))));
        // No application identification
        let data = block(0x0520, &[0; 143]);
        assert!(matches!(detect(&data), Err(DecoderError::MalformedHeader(_))));
        // Application identification too short
        let data = block(0x0501, &[0x01, 0x00, 0x00]);
        assert!(matches!(detect(&data), Err(DecoderError::MalformedHeader(_))));
        // Unknown first tag
        let data = block(0x1234, &[0; 4]);
        assert!(matches!(detect(&data), Err(DecoderError::MalformedHeader(_))));
        // Unknown TREP
        let data = block(0x7699, &[0; 4]);
        assert!(matches!(detect(&data), Err(DecoderError::MalformedHeader(_))));
    }

    #[test]
    fn test_detect_vu_generation() {
        let data = block(0x7601, &[0; 4]);
        assert_eq!(detect(&data).unwrap(), (SourceKind::VehicleUnit, Generation::Gen1));
        let data = block(0x7631, &[0; 4]);
        assert_eq!(detect(&data).unwrap(), (SourceKind::VehicleUnit, Generation::Gen2));
        let data = block(0x7600, &[0x01, 0x01]);
        assert_eq!(detect(&data).unwrap(), (SourceKind::VehicleUnit, Generation::Gen2));
    }

    #[test]
    fn test_dispatch_unknown_and_mismatched_blocks() {
        let mut data = block(0x0501, &app_identification(0x00));
        data.extend(block(0x0523, &[0; 2]));
        data.extend(block(0x0777, &[1, 2, 3]));
        data.extend(block(0x8501, &[0; 128]));

        let config = DecoderConfig::default().with_max_logged_warnings(1);
        let dispatch = dispatch(&data, &config, None).unwrap();
        assert_eq!(dispatch.blocks.len(), 4);

        let app = &dispatch.blocks[0];
        assert_eq!(app.status, BlockStatus::Decoded);
        assert_eq!(app.part, Some(PartId::ApplicationIdentification));

        let units = &dispatch.blocks[1];
        assert_eq!(units.status, BlockStatus::Skipped);
        assert_eq!(units.issues[0].kind, IssueKind::GenerationMismatch);
        assert_eq!(units.part, None);

        let unknown = &dispatch.blocks[2];
        assert_eq!(unknown.status, BlockStatus::Skipped);
        assert_eq!(unknown.issues[0].kind, IssueKind::UnknownBlockType);
        assert_eq!(unknown.issues[0].tag, Some(0x0777));
        match &unknown.records[0].kind {
            RecordKind::RawUnknown(raw) => {
                assert_eq!(raw.payload.as_deref(), Some(&[1u8, 2, 3][..]));
                assert_eq!(raw.reason, UnknownReason::UnknownTag);
                assert_eq!(raw.offset, unknown.offset + HEADER_LEN);
            }
            other => panic!("unexpected record: {:?}", other),
        }

        let signature = &dispatch.blocks[3];
        assert!(signature.is_signature);
        assert_eq!(signature.part, Some(PartId::ApplicationIdentification));
        assert!(signature.issues.is_empty());
    }

    #[test]
    fn test_gen2_card_routes() {
        let mut data = block(0x0501, &app_identification(0x01));
        data.extend(block(0x0523, &[0; 22]));
        data.extend(block(0x0524, &[0; 20]));
        data.extend(block(0x0528, &[0; 19]));
        data.extend(block(0x8523, &[0; 64]));

        let dispatch = dispatch(&data, &DecoderConfig::default(), None).unwrap();
        let parts: Vec<_> = dispatch.blocks.iter().map(|b| (b.part, b.is_signature)).collect();
        assert_eq!(
            parts,
            vec![
                (Some(PartId::ApplicationIdentification), false),
                (Some(PartId::VehicleUnitsUsed), false),
                (Some(PartId::GnssPlaces), false),
                (Some(PartId::BorderCrossings), false),
                (Some(PartId::VehicleUnitsUsed), true),
            ]
        );
        assert!(dispatch.all_issues().next().is_none());
    }

    #[test]
    fn test_dispatch_failed_block_keeps_payload() {
        let mut data = block(0x0501, &app_identification(0x00));
        data.extend(block(0x0521, &[0; 10]));

        let config = DecoderConfig::default().with_unknown_payloads(false);
        let dispatch = dispatch(&data, &config, None).unwrap();
        let licence = &dispatch.blocks[1];
        assert_eq!(licence.status, BlockStatus::LocallyFailed);
        assert!(licence.issues[0].is_error());
        match &licence.records[0].kind {
            RecordKind::RawUnknown(raw) => {
                assert_eq!(raw.reason, UnknownReason::DecodeFailed);
                assert_eq!(raw.length, 10);
                assert_eq!(raw.payload, None);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_parallel_keeps_order() {
        let mut data = block(0x0501, &app_identification(0x00));
        for _ in 0..20 {
            data.extend(block(0x050E, &1_700_000_000u32.to_be_bytes()));
            data.extend(block(0x0777, &[0]));
        }
        let sequential = dispatch(&data, &DecoderConfig::default(), None).unwrap();
        let parallel = dispatch(&data, &DecoderConfig::default().with_parallel_records(true), None).unwrap();
        assert_eq!(sequential.blocks, parallel.blocks);
    }

    #[test]
    fn test_dispatch_cancelled() {
        let data = block(0x0501, &app_identification(0x00));
        let flag = AtomicBool::new(true);
        let result = dispatch(&data, &DecoderConfig::default(), Some(&flag));
        assert!(matches!(result, Err(DecoderError::Cancelled)));
    }
}
