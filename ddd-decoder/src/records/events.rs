//! Events, faults and overspeeding
//!
//! Fixed-size repeated entries. Type codes go through the lookup table and an
//! unrecognised code is kept as `Unknown(code)`.

use super::{for_each_record, Decoded, FieldReader, FullCardNumber, RecordKind, VehicleRegistration};
use crate::tables::EventFaultType;
use crate::types::{Generation, Issue, IssueKind, Result, Timestamp};
use serde::Serialize;

/// `CardEventRecord` / `CardFaultRecord`
const CARD_EVENT_LEN: usize = 24;

/// Cards in the vehicle unit slots when an event began and ended
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventCards {
    pub driver_begin: Option<FullCardNumber>,
    pub driver_end: Option<FullCardNumber>,
    pub codriver_begin: Option<FullCardNumber>,
    pub codriver_end: Option<FullCardNumber>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub event_type: EventFaultType,
    /// Vehicle unit only: why the event was recorded
    pub purpose: Option<u8>,
    pub begin: Option<Timestamp>,
    pub end: Option<Timestamp>,
    /// Card only: vehicle the card was inserted in
    pub vehicle: Option<VehicleRegistration>,
    /// Vehicle unit only
    pub cards: Option<EventCards>,
    pub similar_events: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaultRecord {
    pub fault_type: EventFaultType,
    pub purpose: Option<u8>,
    pub begin: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub vehicle: Option<VehicleRegistration>,
    pub cards: Option<EventCards>,
}

/// `VuOverSpeedingControlData`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverspeedControl {
    pub last_control: Option<Timestamp>,
    pub first_overspeed_since: Option<Timestamp>,
    pub overspeed_count: u8,
}

/// `VuOverSpeedingEventRecord`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverspeedingRecord {
    pub event_type: EventFaultType,
    pub purpose: u8,
    pub begin: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub max_speed_kmh: u8,
    pub average_speed_kmh: u8,
    pub card: Option<FullCardNumber>,
    pub similar_events: u8,
}

struct CardEntry {
    code: u8,
    begin: Option<Timestamp>,
    end: Option<Timestamp>,
    vehicle: VehicleRegistration,
}

/// Read one 24-byte card event/fault slot; `None` for an unused slot
fn read_card_entry(r: &mut FieldReader<'_>) -> Result<Option<CardEntry>> {
    let code = r.read_u8()?;
    let begin = r.time()?;
    let end = r.time()?;
    let vehicle = r.registration()?;
    if code == 0 && begin.is_none() {
        return Ok(None);
    }
    Ok(Some(CardEntry {
        code,
        begin,
        end,
        vehicle,
    }))
}

/// Entry whose type code belongs in the other of the two card EFs; kept as read
fn misfiled(code: EventFaultType, file: &str) -> Issue {
    Issue::warning(
        IssueKind::InvalidEncoding,
        format!("type 0x{:02X} ({}) recorded in the card {} file", code.code(), code, file),
    )
}

pub(crate) fn decode_card_events(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    let mut out = Decoded::default();
    for_each_record(payload, base, CARD_EVENT_LEN, "card event", &mut out, |r, out| {
        let offset = r.offset();
        if let Some(entry) = read_card_entry(r)? {
            let event_type = EventFaultType::from_code(entry.code);
            if event_type.is_fault_code() {
                r.issues.push(misfiled(event_type, "events").at(offset));
            }
            out.push(
                generation,
                RecordKind::Event(EventRecord {
                    event_type,
                    purpose: None,
                    begin: entry.begin,
                    end: entry.end,
                    vehicle: Some(entry.vehicle),
                    cards: None,
                    similar_events: None,
                }),
            );
        }
        Ok(())
    });
    Ok(out)
}

pub(crate) fn decode_card_faults(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    let mut out = Decoded::default();
    for_each_record(payload, base, CARD_EVENT_LEN, "card fault", &mut out, |r, out| {
        let offset = r.offset();
        if let Some(entry) = read_card_entry(r)? {
            let fault_type = EventFaultType::from_code(entry.code);
            if fault_type.is_event_code() {
                r.issues.push(misfiled(fault_type, "faults").at(offset));
            }
            out.push(
                generation,
                RecordKind::Fault(FaultRecord {
                    fault_type,
                    purpose: None,
                    begin: entry.begin,
                    end: entry.end,
                    vehicle: Some(entry.vehicle),
                    cards: None,
                }),
            );
        }
        Ok(())
    });
    Ok(out)
}

fn read_event_cards(r: &mut FieldReader<'_>, generation: Generation) -> Result<EventCards> {
    Ok(EventCards {
        driver_begin: r.card_number(generation)?,
        driver_end: r.card_number(generation)?,
        codriver_begin: r.card_number(generation)?,
        codriver_end: r.card_number(generation)?,
    })
}

/// `VuEventRecord`: 83 bytes (Gen1), card numbers with generation byte (Gen2)
pub(crate) fn read_vu_event(r: &mut FieldReader<'_>, generation: Generation) -> Result<EventRecord> {
    let event_type = EventFaultType::from_code(r.read_u8()?);
    let purpose = r.read_u8()?;
    let begin = r.time()?;
    let end = r.time()?;
    let cards = read_event_cards(r, generation)?;
    let similar_events = r.read_u8()?;
    Ok(EventRecord {
        event_type,
        purpose: Some(purpose),
        begin,
        end,
        vehicle: None,
        cards: Some(cards),
        similar_events: Some(similar_events),
    })
}

/// `VuFaultRecord`: 82 bytes (Gen1)
pub(crate) fn read_vu_fault(r: &mut FieldReader<'_>, generation: Generation) -> Result<FaultRecord> {
    let fault_type = EventFaultType::from_code(r.read_u8()?);
    let purpose = r.read_u8()?;
    let begin = r.time()?;
    let end = r.time()?;
    let cards = read_event_cards(r, generation)?;
    Ok(FaultRecord {
        fault_type,
        purpose: Some(purpose),
        begin,
        end,
        vehicle: None,
        cards: Some(cards),
    })
}

pub(crate) fn read_overspeed_control(r: &mut FieldReader<'_>) -> Result<OverspeedControl> {
    Ok(OverspeedControl {
        last_control: r.time()?,
        first_overspeed_since: r.time()?,
        overspeed_count: r.read_u8()?,
    })
}

/// `VuOverSpeedingEventRecord`: 31 bytes (Gen1)
pub(crate) fn read_overspeeding(r: &mut FieldReader<'_>, generation: Generation) -> Result<OverspeedingRecord> {
    Ok(OverspeedingRecord {
        event_type: EventFaultType::from_code(r.read_u8()?),
        purpose: r.read_u8()?,
        begin: r.time()?,
        end: r.time()?,
        max_speed_kmh: r.read_u8()?,
        average_speed_kmh: r.read_u8()?,
        card: r.card_number(generation)?,
        similar_events: r.read_u8()?,
    })
}
