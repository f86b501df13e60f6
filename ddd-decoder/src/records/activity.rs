//! Activity timeline decoding
//!
//! A day of activity is a list of 16-bit change words. Each word packs the
//! card slot, crew status, card presence, the activity type and the minute of
//! the day at which the activity started:
//!
//! ```text
//! bit 15   14   13   12..11    10..0
//!     slot crew card activity  minutes since 00:00 UTC
//! ```
//!
//! Driver cards store their days in a cyclic buffer of variable-length
//! records linked by length fields; vehicle units store one day per
//! Activities part.

use super::{Decoded, FieldReader, FullCardNumber, Name, RecordKind, VehicleRegistration};
use crate::bitfield::{self, BitField, BitLayout};
use crate::types::{time_real, Generation, Issue, IssueKind, Result, Timestamp};
use byteorder::{BigEndian, ByteOrder};
use chrono::NaiveDate;
use serde::Serialize;

const SLOT: BitField = BitField::new("slot", 0, 1);
const CREW: BitField = BitField::new("driving status", 1, 1);
const CARD_ABSENT: BitField = BitField::new("card status", 2, 1);
const ACTIVITY: BitField = BitField::new("activity", 3, 2);
const MINUTES: BitField = BitField::new("minutes", 5, 11);

/// `ActivityChangeInfo` word layout
pub const ACTIVITY_CHANGE: BitLayout = BitLayout::new(16, &[SLOT, CREW, CARD_ABSENT, ACTIVITY, MINUTES]);

/// Last valid minute of a day
pub const LAST_MINUTE: u16 = 1439;

/// Fixed part of a card daily record (lengths, date, presence counter, distance)
const DAY_HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Slot {
    Driver,
    CoDriver,
}

impl Slot {
    pub fn from_bit(bit: u32) -> Self {
        if bit == 0 {
            Slot::Driver
        } else {
            Slot::CoDriver
        }
    }

    fn index(self) -> usize {
        match self {
            Slot::Driver => 0,
            Slot::CoDriver => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Activity {
    Rest,
    Availability,
    Work,
    Driving,
}

impl Activity {
    pub fn from_code(code: u32) -> Self {
        match code & 0x03 {
            0 => Activity::Rest,
            1 => Activity::Availability,
            2 => Activity::Work,
            _ => Activity::Driving,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Activity::Rest => 0,
            Activity::Availability => 1,
            Activity::Work => 2,
            Activity::Driving => 3,
        }
    }
}

/// Why a transition was flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimelineAnomaly {
    /// Minute value above 1439
    OutOfRange,
    /// Earlier than the preceding transition of the same slot
    NonMonotonic,
}

/// One activity transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityChange {
    pub slot: Slot,
    /// Crew (true) or single driving
    pub crew: bool,
    pub card_inserted: bool,
    pub activity: Activity,
    /// Minutes since midnight UTC
    pub minute: u16,
    pub anomaly: Option<TimelineAnomaly>,
}

impl ActivityChange {
    /// Encode back to the packed word
    pub fn encode(&self) -> [u8; 2] {
        let word = bitfield::pack(
            &ACTIVITY_CHANGE,
            &[
                (&SLOT, self.slot.index() as u32),
                (&CREW, self.crew as u32),
                (&CARD_ABSENT, (!self.card_inserted) as u32),
                (&ACTIVITY, self.activity.code()),
                (&MINUTES, self.minute as u32),
            ],
        );
        (word as u16).to_be_bytes()
    }
}

/// Activity of one calendar day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityDay {
    pub date: Option<NaiveDate>,
    /// Card only: daily presence counter (BCD)
    pub presence_counter: Option<String>,
    /// Card only: distance travelled that day
    pub distance_km: Option<u16>,
    /// Vehicle unit only: odometer at 00:00
    pub odometer_midnight_km: Option<u32>,
    pub changes: Vec<ActivityChange>,
}

/// Card insertion/withdrawal cycle recorded by a vehicle unit (`VuCardIWRecord`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardSession {
    pub holder_surname: Name,
    pub holder_first_names: Name,
    pub card: Option<FullCardNumber>,
    pub card_expiry: Option<Timestamp>,
    pub inserted_at: Option<Timestamp>,
    pub odometer_at_insertion_km: u32,
    pub slot: Slot,
    pub withdrawn_at: Option<Timestamp>,
    pub odometer_at_withdrawal_km: u32,
    pub previous_vehicle: Option<VehicleRegistration>,
    pub previous_withdrawal: Option<Timestamp>,
    pub manual_input: bool,
}

/// Date of a daily record: a `TimeReal` at 00:00 of that day
pub(crate) fn day_date(seconds: u32) -> Option<NaiveDate> {
    time_real(seconds).map(|t| t.date_naive())
}

/// Decode a run of change words, flagging out-of-range and out-of-order entries
///
/// Flagged entries are kept in place; each one also yields a warning.
pub fn decode_changes(words: &[u8], base: usize) -> (Vec<ActivityChange>, Vec<Issue>) {
    let mut changes = Vec::with_capacity(words.len() / 2);
    let mut issues = Vec::new();
    let mut last_minute: [Option<u16>; 2] = [None, None];

    for (index, raw) in words.chunks_exact(2).enumerate() {
        let value = ACTIVITY_CHANGE.unpack(raw);
        let slot = Slot::from_bit(value.get(&SLOT));
        let minute = value.get(&MINUTES) as u16;
        let offset = base + index * 2;

        let anomaly = if minute > LAST_MINUTE {
            Some(TimelineAnomaly::OutOfRange)
        } else if last_minute[slot.index()].is_some_and(|previous| minute < previous) {
            Some(TimelineAnomaly::NonMonotonic)
        } else {
            last_minute[slot.index()] = Some(minute);
            None
        };

        if let Some(anomaly) = anomaly {
            issues.push(
                Issue::warning(
                    IssueKind::TimelineAnomaly,
                    format!("{:?} activity change at minute {} ({:?} slot)", anomaly, minute, slot),
                )
                .at(offset),
            );
        }

        changes.push(ActivityChange {
            slot,
            crew: value.flag(&CREW),
            card_inserted: !value.flag(&CARD_ABSENT),
            activity: Activity::from_code(value.get(&ACTIVITY)),
            minute,
            anomaly,
        });
    }

    if words.len() % 2 != 0 {
        issues.push(
            Issue::warning(IssueKind::LengthMismatch, "odd number of bytes in activity change list")
                .at(base + words.len() - 1),
        );
    }

    (changes, issues)
}

pub(crate) fn read_card_session(r: &mut FieldReader<'_>, generation: Generation) -> Result<CardSession> {
    let holder_surname = r.name("holder surname")?;
    let holder_first_names = r.name("holder first names")?;
    let card = r.card_number(generation)?;
    let card_expiry = r.time()?;
    let inserted_at = r.time()?;
    let odometer_at_insertion_km = r.read_u24()?;
    let slot = Slot::from_bit(r.read_u8()? as u32);
    let withdrawn_at = r.time()?;
    let odometer_at_withdrawal_km = r.read_u24()?;
    let previous = r.registration()?;
    let previous_withdrawal = r.time()?;
    if generation == Generation::Gen2 {
        // Generation of the previous vehicle unit
        r.read_u8()?;
    }
    let manual_input = r.read_u8()? != 0;

    let previous_vehicle = if previous.number.is_empty() {
        None
    } else {
        Some(previous)
    };

    Ok(CardSession {
        holder_surname,
        holder_first_names,
        card,
        card_expiry,
        inserted_at,
        odometer_at_insertion_km,
        slot,
        withdrawn_at,
        odometer_at_withdrawal_km,
        previous_vehicle,
        previous_withdrawal,
        manual_input,
    })
}

/// EF Driver activity: two pointers and a cyclic buffer of daily records
///
/// The walk starts at the oldest record and follows each record's length to
/// the next, wrapping at the buffer end, until it has decoded the newest
/// record. A record whose `previousLength` disagrees with the length of the
/// record before it is reported as a length inconsistency.
pub(crate) fn decode_driver_activity(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    let mut r = FieldReader::new(payload, base);
    let oldest = r.read_u16()? as usize;
    let newest = r.read_u16()? as usize;
    let buffer_base = r.offset();
    let buffer = r.rest();

    let mut out = Decoded::default();
    if buffer.is_empty() {
        return Ok(out);
    }
    if oldest >= buffer.len() || newest >= buffer.len() {
        out.issues.push(
            Issue::error(
                IssueKind::LengthMismatch,
                format!(
                    "activity pointers {}/{} outside a {}-byte buffer",
                    oldest,
                    newest,
                    buffer.len()
                ),
            )
            .at(base),
        );
        return Ok(out);
    }

    let mut pos = oldest;
    let mut previous_len: Option<usize> = None;
    let mut reached_newest = false;

    for _ in 0..=buffer.len() / DAY_HEADER_LEN {
        let header = read_wrapped(buffer, pos, 4);
        let prev_len = BigEndian::read_u16(&header[0..2]) as usize;
        let len = BigEndian::read_u16(&header[2..4]) as usize;

        if len == 0 && previous_len.is_none() {
            // Card never recorded any activity
            log::trace!("Driver activity buffer is empty");
            reached_newest = true;
            break;
        }
        if len < DAY_HEADER_LEN || len > buffer.len() {
            out.issues.push(
                Issue::error(
                    IssueKind::LengthMismatch,
                    format!("daily record at {} declares length {}", pos, len),
                )
                .at(buffer_base + pos),
            );
            break;
        }
        if let Some(expected) = previous_len {
            if prev_len != expected {
                out.issues.push(
                    Issue::error(
                        IssueKind::LengthMismatch,
                        format!(
                            "daily record at {} has previous length {}, preceding record is {} bytes",
                            pos, prev_len, expected
                        ),
                    )
                    .at(buffer_base + pos),
                );
            }
        }

        let record = read_wrapped(buffer, pos, len);
        match decode_day(&record, buffer_base + pos) {
            Ok((day, issues)) => {
                out.issues.extend(issues);
                out.push(generation, RecordKind::ActivityDay(day));
            }
            Err(e) => out.record_failed("daily activity", &e),
        }

        if pos == newest {
            reached_newest = true;
            break;
        }
        previous_len = Some(len);
        pos = (pos + len) % buffer.len();
    }

    if !reached_newest {
        out.issues.push(
            Issue::error(
                IssueKind::LengthMismatch,
                format!("activity walk never reached the newest record at {}", newest),
            )
            .at(base),
        );
    }

    log::trace!("Decoded {} activity day(s) from driver card", out.records.len());
    Ok(out)
}

fn decode_day(record: &[u8], base: usize) -> Result<(ActivityDay, Vec<Issue>)> {
    let mut r = FieldReader::new(record, base);
    r.skip(4)?;
    let date = day_date(r.read_u32()?);
    let presence_counter = r.bcd(2, "daily presence counter")?;
    let distance_km = r.read_u16()?;

    let words_base = r.offset();
    let (changes, mut issues) = decode_changes(r.rest(), words_base);
    issues.splice(0..0, r.issues.drain(..));

    Ok((
        ActivityDay {
            date,
            presence_counter: Some(presence_counter),
            distance_km: Some(distance_km),
            odometer_midnight_km: None,
            changes,
        },
        issues,
    ))
}

/// Copy `len` bytes starting at `pos`, wrapping at the end of the buffer
fn read_wrapped(buffer: &[u8], pos: usize, len: usize) -> Vec<u8> {
    buffer.iter().cycle().skip(pos).take(len).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(slot: u16, activity: u16, minute: u16) -> [u8; 2] {
        ((slot << 15) | (activity << 11) | minute).to_be_bytes()
    }

    fn day_record(prev_len: u16, seconds: u32, words: &[[u8; 2]]) -> Vec<u8> {
        let len = (DAY_HEADER_LEN + words.len() * 2) as u16;
        let mut out = Vec::new();
        out.extend(prev_len.to_be_bytes());
        out.extend(len.to_be_bytes());
        out.extend(seconds.to_be_bytes());
        out.extend([0x00, 0x42]);
        out.extend(120u16.to_be_bytes());
        for w in words {
            out.extend(w);
        }
        out
    }

    #[test]
    fn test_decode_changes_fields() {
        let raw = [0x5B, 0x20, 0x05, 0x9F];
        let (changes, issues) = decode_changes(&raw, 0);
        assert!(issues.is_empty());
        assert_eq!(changes.len(), 2);

        // 0101 1011 0010 0000: driver slot, crew, card inserted, driving, minute 800
        assert_eq!(changes[0].slot, Slot::Driver);
        assert!(changes[0].crew);
        assert!(changes[0].card_inserted);
        assert_eq!(changes[0].activity, Activity::Driving);
        assert_eq!(changes[0].minute, 800);

        assert_eq!(changes[1].activity, Activity::Rest);
        assert_eq!(changes[1].minute, 1439);
    }

    #[test]
    fn test_decode_changes_flags_without_dropping() {
        let raw: Vec<u8> = [word(0, 0, 0), word(0, 3, 600), word(0, 2, 500), word(0, 0, 1500)]
            .concat();
        let (changes, issues) = decode_changes(&raw, 40);
        assert_eq!(changes.len(), 4);
        assert_eq!(changes[0].anomaly, None);
        assert_eq!(changes[2].anomaly, Some(TimelineAnomaly::NonMonotonic));
        assert_eq!(changes[3].anomaly, Some(TimelineAnomaly::OutOfRange));
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].offset, Some(44));
        assert!(issues.iter().all(|i| i.kind == IssueKind::TimelineAnomaly && !i.is_error()));
    }

    #[test]
    fn test_slots_are_ordered_independently() {
        let raw: Vec<u8> = [word(0, 3, 600), word(1, 0, 0), word(1, 1, 300)].concat();
        let (changes, issues) = decode_changes(&raw, 0);
        assert!(issues.is_empty());
        assert_eq!(changes[1].slot, Slot::CoDriver);
    }

    #[test]
    fn test_encode_change_word() {
        let raw = [0x5B, 0x20];
        let (changes, _) = decode_changes(&raw, 0);
        assert_eq!(changes[0].encode(), raw);

        let withdrawn = [0x20, 0x00];
        let (changes, _) = decode_changes(&withdrawn, 0);
        assert!(!changes[0].card_inserted);
        assert_eq!(changes[0].encode(), withdrawn);
    }

    #[test]
    fn test_driver_activity_cyclic_walk() {
        let first = day_record(0, 1_700_006_400, &[word(0, 0, 0), word(0, 3, 480)]);
        let second = day_record(first.len() as u16, 1_700_092_800, &[word(0, 2, 60)]);

        let mut payload = Vec::new();
        payload.extend(0u16.to_be_bytes());
        payload.extend((first.len() as u16).to_be_bytes());
        payload.extend(&first);
        payload.extend(&second);

        let out = decode_driver_activity(&payload, 0, Generation::Gen1).unwrap();
        assert!(out.issues.is_empty(), "{:?}", out.issues);
        assert_eq!(out.records.len(), 2);
        match &out.records[0].kind {
            RecordKind::ActivityDay(day) => {
                assert_eq!(day.date, NaiveDate::from_ymd_opt(2023, 11, 15));
                assert_eq!(day.presence_counter.as_deref(), Some("0042"));
                assert_eq!(day.distance_km, Some(120));
                assert_eq!(day.changes.len(), 2);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_driver_activity_wraps_around() {
        let first = day_record(0, 1_700_006_400, &[word(0, 0, 0)]);
        let second = day_record(first.len() as u16, 1_700_092_800, &[word(0, 3, 60)]);
        assert_eq!(first.len(), 14);

        // Buffer of 30 bytes: the second record starts at 16 and wraps after 14 bytes
        let mut buffer = vec![0u8; 30];
        buffer[16..30].copy_from_slice(&first);
        buffer[0..14].copy_from_slice(&second);

        let mut payload = Vec::new();
        payload.extend(16u16.to_be_bytes());
        payload.extend(0u16.to_be_bytes());
        payload.extend(&buffer);

        let out = decode_driver_activity(&payload, 0, Generation::Gen1).unwrap();
        assert!(out.issues.is_empty(), "{:?}", out.issues);
        assert_eq!(out.records.len(), 2);
    }

    #[test]
    fn test_driver_activity_previous_length_mismatch() {
        let first = day_record(0, 1_700_006_400, &[word(0, 0, 0)]);
        let second = day_record(99, 1_700_092_800, &[word(0, 3, 60)]);

        let mut payload = Vec::new();
        payload.extend(0u16.to_be_bytes());
        payload.extend((first.len() as u16).to_be_bytes());
        payload.extend(&first);
        payload.extend(&second);

        let out = decode_driver_activity(&payload, 0, Generation::Gen1).unwrap();
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].kind, IssueKind::LengthMismatch);
        assert!(out.issues[0].is_error());
    }

    #[test]
    fn test_driver_activity_unused_buffer() {
        let payload = vec![0u8; 64];
        let out = decode_driver_activity(&payload, 0, Generation::Gen1).unwrap();
        assert!(out.records.is_empty());
        assert!(out.issues.is_empty());
    }
}
