//! Vehicle unit parts
//!
//! A vehicle unit download is a sequence of parts (overview, one activities
//! part per day, events and faults, detailed speed, technical data).
//!
//! Gen1 parts are fixed sequences of fields and count-prefixed arrays ending
//! in a 128-byte signature; the part length has to match what the counts
//! announce. Gen2 parts are sequences of record arrays, walked by
//! [`tlv::walk_record_arrays`] and decoded record by record so one bad record
//! does not take the rest of the part with it.

use super::activity::{day_date, decode_changes, read_card_session, ActivityChange, ActivityDay};
use super::certificate::{read_certificate, CertificateRole, GEN1_CERTIFICATE_LEN};
use super::events::{read_overspeed_control, read_overspeeding, read_vu_event, read_vu_fault};
use super::identification::{read_card_slots, read_sensor_pairing, read_vu_identification, IdentificationRecord, VehicleOverview};
use super::vehicles::{read_place, read_specific_condition, read_vu_control_activity, read_vu_gnss_accumulated};
use super::{for_each_record, Decoded, FieldReader, FullCardNumber, Name, RecordKind, VehicleRegistration};
use crate::cursor::Charset;
use crate::tables::{CalibrationPurpose, Nation};
use crate::tlv::{self, RecordArray};
use crate::types::{Generation, Issue, IssueKind, Result, Timestamp};
use serde::Serialize;

const GEN1_SIGNATURE_LEN: usize = 128;

/// Gen2 record types (`RecordType`)
mod record_type {
    pub const ACTIVITY_CHANGE_INFO: u8 = 0x01;
    pub const CARD_SLOTS_STATUS: u8 = 0x02;
    pub const CURRENT_DATE_TIME: u8 = 0x03;
    pub const MEMBER_STATE_CERTIFICATE: u8 = 0x04;
    pub const ODOMETER_MIDNIGHT: u8 = 0x05;
    pub const DATE_OF_DAY: u8 = 0x06;
    pub const SIGNATURE: u8 = 0x08;
    pub const SPECIFIC_CONDITION: u8 = 0x09;
    pub const VIN: u8 = 0x0A;
    pub const REGISTRATION_NUMBER: u8 = 0x0B;
    pub const CALIBRATION: u8 = 0x0C;
    pub const CARD_IW: u8 = 0x0D;
    pub const CARD_RECORD: u8 = 0x0E;
    pub const VU_CERTIFICATE: u8 = 0x0F;
    pub const COMPANY_LOCKS: u8 = 0x10;
    pub const CONTROL_ACTIVITY: u8 = 0x11;
    pub const DETAILED_SPEED: u8 = 0x12;
    pub const DOWNLOADABLE_PERIOD: u8 = 0x13;
    pub const DOWNLOAD_ACTIVITY: u8 = 0x14;
    pub const EVENT: u8 = 0x15;
    pub const GNSS_ACCUMULATED_DRIVING: u8 = 0x16;
    pub const ITS_CONSENT: u8 = 0x17;
    pub const FAULT: u8 = 0x18;
    pub const IDENTIFICATION: u8 = 0x19;
    pub const OVERSPEED_CONTROL: u8 = 0x1A;
    pub const OVERSPEED_EVENT: u8 = 0x1B;
    pub const PLACE_DAILY_WORK_PERIOD: u8 = 0x1C;
    pub const TIME_ADJUSTMENT_GNSS: u8 = 0x1D;
    pub const TIME_ADJUSTMENT: u8 = 0x1E;
    pub const POWER_SUPPLY_INTERRUPTION: u8 = 0x1F;
    pub const SENSOR_PAIRED: u8 = 0x20;
    pub const SENSOR_EXTERNAL_GNSS: u8 = 0x21;
    pub const BORDER_CROSSING: u8 = 0x22;
    pub const LOAD_UNLOAD: u8 = 0x23;
    pub const REGISTRATION_IDENTIFICATION: u8 = 0x24;
}

/// Version of the download interface (TREP 0x00)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DownloadInterfaceVersion {
    pub generation: u8,
    pub version: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadablePeriod {
    pub min: Option<Timestamp>,
    pub max: Option<Timestamp>,
}

/// `VuDownloadActivityData`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastDownload {
    pub time: Option<Timestamp>,
    pub card: Option<FullCardNumber>,
    pub company: Name,
}

/// `VuCompanyLocksRecord`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyLock {
    pub lock_in: Option<Timestamp>,
    pub lock_out: Option<Timestamp>,
    pub company_name: Name,
    pub company_address: Name,
    pub company_card: Option<FullCardNumber>,
}

/// `VuTimeAdjustmentRecord`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeAdjustment {
    pub old_time: Option<Timestamp>,
    pub new_time: Option<Timestamp>,
    pub workshop_name: Name,
    pub workshop_address: Name,
    pub workshop_card: Option<FullCardNumber>,
}

/// One minute of detailed speed, one value per second
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeedBlock {
    pub begin: Option<Timestamp>,
    pub speeds_kmh: Vec<u8>,
}

/// `VuCalibrationRecord`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationRecord {
    pub purpose: CalibrationPurpose,
    pub workshop_name: Name,
    pub workshop_address: Name,
    pub workshop_card: Option<FullCardNumber>,
    pub workshop_card_expiry: Option<Timestamp>,
    pub vin: String,
    pub registration: VehicleRegistration,
    /// Characteristic coefficient, impulses per km
    pub w_characteristic: u16,
    /// Constant of the recording equipment, impulses per km
    pub k_constant: u16,
    /// Effective tyre circumference in 1/8 mm
    pub l_tyre_circumference: u16,
    pub tyre_size: String,
    pub authorised_speed_kmh: u8,
    pub old_odometer_km: u32,
    pub new_odometer_km: u32,
    pub old_time: Option<Timestamp>,
    pub new_time: Option<Timestamp>,
    pub next_calibration: Option<Timestamp>,
}

pub(crate) fn decode_vu_interface_version(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    let mut r = FieldReader::new(payload, base);
    let version = DownloadInterfaceVersion {
        generation: r.read_u8()?,
        version: r.read_u8()?,
    };
    let mut out = Decoded::default();
    out.push(generation, RecordKind::DownloadInterfaceVersion(version));
    Ok(out)
}

fn read_last_download(r: &mut FieldReader<'_>, generation: Generation) -> Result<LastDownload> {
    Ok(LastDownload {
        time: r.time()?,
        card: r.card_number(generation)?,
        company: r.name("company name")?,
    })
}

fn read_downloadable_period(r: &mut FieldReader<'_>) -> Result<DownloadablePeriod> {
    Ok(DownloadablePeriod {
        min: r.time()?,
        max: r.time()?,
    })
}

fn read_company_lock(r: &mut FieldReader<'_>, generation: Generation) -> Result<CompanyLock> {
    Ok(CompanyLock {
        lock_in: r.time()?,
        lock_out: r.time()?,
        company_name: r.name("company name")?,
        company_address: r.name("company address")?,
        company_card: r.card_number(generation)?,
    })
}

fn read_time_adjustment(r: &mut FieldReader<'_>, generation: Generation) -> Result<TimeAdjustment> {
    Ok(TimeAdjustment {
        old_time: r.time()?,
        new_time: r.time()?,
        workshop_name: r.name("workshop name")?,
        workshop_address: r.name("workshop address")?,
        workshop_card: r.card_number(generation)?,
    })
}

fn read_speed_block(r: &mut FieldReader<'_>) -> Result<SpeedBlock> {
    let begin = r.time()?;
    let speeds_kmh = r.read_bytes(60)?.to_vec();
    Ok(SpeedBlock { begin, speeds_kmh })
}

fn read_calibration(r: &mut FieldReader<'_>, generation: Generation) -> Result<CalibrationRecord> {
    Ok(CalibrationRecord {
        purpose: CalibrationPurpose::from_code(r.read_u8()?),
        workshop_name: r.name("workshop name")?,
        workshop_address: r.name("workshop address")?,
        workshop_card: r.card_number(generation)?,
        workshop_card_expiry: r.time()?,
        vin: r.text(17, Charset::Ascii, "VIN")?,
        registration: r.registration()?,
        w_characteristic: r.read_u16()?,
        k_constant: r.read_u16()?,
        l_tyre_circumference: r.read_u16()?,
        tyre_size: r.text(15, Charset::Ascii, "tyre size")?,
        authorised_speed_kmh: r.read_u8()?,
        old_odometer_km: r.read_u24()?,
        new_odometer_km: r.read_u24()?,
        old_time: r.time()?,
        new_time: r.time()?,
        next_calibration: r.time()?,
    })
}

/// `VuPlaceDailyWorkPeriodRecord`: card number then place
fn read_vu_place(r: &mut FieldReader<'_>, generation: Generation) -> Result<super::PlaceRecord> {
    let card = r.card_number(generation)?;
    let mut place = read_place(r, generation)?;
    place.card = card;
    Ok(place)
}

/// Read `count` fixed-size records that follow inline in a Gen1 part
fn read_counted<F>(
    r: &mut FieldReader<'_>,
    count: usize,
    record_len: usize,
    what: &str,
    out: &mut Decoded,
    decode: F,
) -> Result<()>
where
    F: FnMut(&mut FieldReader<'_>, &mut Decoded) -> Result<()>,
{
    let base = r.offset();
    let data = r.read_bytes(count * record_len)?;
    for_each_record(data, base, record_len, what, out, decode);
    Ok(())
}

/// Check a Gen1 part ends with exactly one signature
fn finish_gen1(r: &mut FieldReader<'_>, out: &mut Decoded) -> Result<()> {
    r.skip(GEN1_SIGNATURE_LEN)?;
    if !r.is_empty() {
        out.issues.push(
            Issue::error(
                IssueKind::LengthMismatch,
                format!("{} byte(s) after the part signature", r.remaining()),
            )
            .at(r.offset()),
        );
    }
    r.drain_into(out);
    Ok(())
}

fn read_embedded_certificate(
    r: &mut FieldReader<'_>,
    role: CertificateRole,
    out: &mut Decoded,
) -> Result<()> {
    let offset = r.offset();
    let raw = r.read_bytes(GEN1_CERTIFICATE_LEN)?;
    match read_certificate(raw, offset, Generation::Gen1, role) {
        Ok(cert) => out.push(Generation::Gen1, RecordKind::Certificate(cert)),
        Err(e) => out.record_failed("certificate", &e),
    }
    Ok(())
}

pub(crate) fn decode_vu_overview(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    match generation {
        Generation::Gen1 => overview_gen1(payload, base),
        Generation::Gen2 => Ok(decode_gen2_part(payload, base)),
    }
}

fn overview_gen1(payload: &[u8], base: usize) -> Result<Decoded> {
    let g = Generation::Gen1;
    let mut r = FieldReader::new(payload, base);
    let mut out = Decoded::default();

    read_embedded_certificate(&mut r, CertificateRole::MemberState, &mut out)?;
    read_embedded_certificate(&mut r, CertificateRole::VehicleUnit, &mut out)?;

    let vehicle = VehicleOverview {
        vin: Some(r.text(17, Charset::Ascii, "VIN")?),
        registration: Some(r.registration()?),
        current_time: r.time()?,
        downloadable_period: Some(read_downloadable_period(&mut r)?),
        card_slots: Some(read_card_slots(&mut r)?),
        last_download: Some(read_last_download(&mut r, g)?),
    };
    out.push(g, RecordKind::Identification(IdentificationRecord::Vehicle(vehicle)));

    let locks = r.read_u8()? as usize;
    read_counted(&mut r, locks, 98, "company lock", &mut out, |r, out| {
        out.push(g, RecordKind::CompanyLock(read_company_lock(r, g)?));
        Ok(())
    })?;

    let controls = r.read_u8()? as usize;
    read_counted(&mut r, controls, 31, "control activity", &mut out, |r, out| {
        out.push(g, RecordKind::ControlActivity(read_vu_control_activity(r, g)?));
        Ok(())
    })?;

    finish_gen1(&mut r, &mut out)?;
    Ok(out)
}

pub(crate) fn decode_vu_activities(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    match generation {
        Generation::Gen1 => activities_gen1(payload, base),
        Generation::Gen2 => Ok(decode_gen2_part(payload, base)),
    }
}

fn activities_gen1(payload: &[u8], base: usize) -> Result<Decoded> {
    let g = Generation::Gen1;
    let mut r = FieldReader::new(payload, base);
    let mut out = Decoded::default();

    let date = day_date(r.read_u32()?);
    let odometer_midnight = r.read_u24()?;

    let sessions = r.read_u16()? as usize;
    read_counted(&mut r, sessions, 129, "card insertion", &mut out, |r, out| {
        out.push(g, RecordKind::CardSession(read_card_session(r, g)?));
        Ok(())
    })?;

    let changes = r.read_u16()? as usize;
    let changes_base = r.offset();
    let words = r.read_bytes(changes * 2)?;
    let (changes, issues) = decode_changes(words, changes_base);
    out.issues.extend(issues);
    out.push(
        g,
        RecordKind::ActivityDay(ActivityDay {
            date,
            presence_counter: None,
            distance_km: None,
            odometer_midnight_km: Some(odometer_midnight),
            changes,
        }),
    );

    let places = r.read_u8()? as usize;
    read_counted(&mut r, places, 28, "place", &mut out, |r, out| {
        out.push(g, RecordKind::Place(read_vu_place(r, g)?));
        Ok(())
    })?;

    let conditions = r.read_u16()? as usize;
    read_counted(&mut r, conditions, 5, "specific condition", &mut out, |r, out| {
        out.push(g, RecordKind::SpecificCondition(read_specific_condition(r)?));
        Ok(())
    })?;

    finish_gen1(&mut r, &mut out)?;
    Ok(out)
}

pub(crate) fn decode_vu_events(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    match generation {
        Generation::Gen1 => events_gen1(payload, base),
        Generation::Gen2 => Ok(decode_gen2_part(payload, base)),
    }
}

fn events_gen1(payload: &[u8], base: usize) -> Result<Decoded> {
    let g = Generation::Gen1;
    let mut r = FieldReader::new(payload, base);
    let mut out = Decoded::default();

    let faults = r.read_u8()? as usize;
    read_counted(&mut r, faults, 82, "fault", &mut out, |r, out| {
        out.push(g, RecordKind::Fault(read_vu_fault(r, g)?));
        Ok(())
    })?;

    let events = r.read_u8()? as usize;
    read_counted(&mut r, events, 83, "event", &mut out, |r, out| {
        out.push(g, RecordKind::Event(read_vu_event(r, g)?));
        Ok(())
    })?;

    let control = read_overspeed_control(&mut r)?;
    out.push(g, RecordKind::OverspeedControl(control));

    let overspeeds = r.read_u8()? as usize;
    read_counted(&mut r, overspeeds, 31, "overspeeding", &mut out, |r, out| {
        out.push(g, RecordKind::Overspeeding(read_overspeeding(r, g)?));
        Ok(())
    })?;

    let adjustments = r.read_u8()? as usize;
    read_counted(&mut r, adjustments, 98, "time adjustment", &mut out, |r, out| {
        out.push(g, RecordKind::TimeAdjustment(read_time_adjustment(r, g)?));
        Ok(())
    })?;

    finish_gen1(&mut r, &mut out)?;
    Ok(out)
}

pub(crate) fn decode_vu_speed(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    match generation {
        Generation::Gen1 => {
            let g = Generation::Gen1;
            let mut r = FieldReader::new(payload, base);
            let mut out = Decoded::default();
            let blocks = r.read_u16()? as usize;
            read_counted(&mut r, blocks, 64, "speed block", &mut out, |r, out| {
                out.push(g, RecordKind::SpeedBlock(read_speed_block(r)?));
                Ok(())
            })?;
            finish_gen1(&mut r, &mut out)?;
            Ok(out)
        }
        Generation::Gen2 => Ok(decode_gen2_part(payload, base)),
    }
}

pub(crate) fn decode_vu_technical(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    match generation {
        Generation::Gen1 => technical_gen1(payload, base),
        Generation::Gen2 => Ok(decode_gen2_part(payload, base)),
    }
}

fn technical_gen1(payload: &[u8], base: usize) -> Result<Decoded> {
    let g = Generation::Gen1;
    let mut r = FieldReader::new(payload, base);
    let mut out = Decoded::default();

    let vu = read_vu_identification(&mut r, g)?;
    out.push(g, RecordKind::Identification(IdentificationRecord::VehicleUnit(vu)));

    let sensor = read_sensor_pairing(&mut r, g, false)?;
    out.push(g, RecordKind::Identification(IdentificationRecord::SensorPairing(sensor)));

    let calibrations = r.read_u8()? as usize;
    read_counted(&mut r, calibrations, 167, "calibration", &mut out, |r, out| {
        out.push(g, RecordKind::Calibration(read_calibration(r, g)?));
        Ok(())
    })?;

    finish_gen1(&mut r, &mut out)?;
    Ok(out)
}

/// Pieces of a Gen2 part that combine into one record
#[derive(Default)]
struct Gen2Part {
    vehicle: VehicleOverview,
    date: Option<u32>,
    odometer_midnight: Option<u32>,
    changes: Option<Vec<ActivityChange>>,
}

/// Walk and decode every record array of a Gen2 part
///
/// Record types are unique across parts, so one routine serves all five
/// parts. Structural problems of the array sequence (overrun, missing
/// signature) come from the walker as error issues.
fn decode_gen2_part(payload: &[u8], base: usize) -> Decoded {
    let g = Generation::Gen2;
    let walk = tlv::walk_record_arrays(payload, base);
    let mut out = Decoded::default();
    out.issues.extend(walk.issues.iter().cloned());

    let mut part = Gen2Part::default();
    for array in &walk.arrays {
        decode_gen2_array(array, &mut part, &mut out);
    }

    if !part.vehicle.is_empty() {
        out.push(g, RecordKind::Identification(IdentificationRecord::Vehicle(part.vehicle)));
    }
    if part.date.is_some() || part.changes.is_some() {
        out.push(
            g,
            RecordKind::ActivityDay(ActivityDay {
                date: part.date.and_then(day_date),
                presence_counter: None,
                distance_km: None,
                odometer_midnight_km: part.odometer_midnight,
                changes: part.changes.unwrap_or_default(),
            }),
        );
    }
    out
}

/// Decode each record of a Gen2 array with its own reader
fn each_record<'a, F>(array: &RecordArray<'a>, what: &str, out: &mut Decoded, mut decode: F)
where
    F: FnMut(&mut FieldReader<'a>, &mut Decoded) -> Result<()>,
{
    for (offset, record) in array.records() {
        let mut r = FieldReader::new(record, offset);
        if let Err(e) = decode(&mut r, out) {
            out.record_failed(what, &e);
        }
        r.drain_into(out);
    }
}

fn decode_gen2_array(array: &RecordArray<'_>, part: &mut Gen2Part, out: &mut Decoded) {
    use self::record_type::*;

    let g = Generation::Gen2;
    let record_type = array.header.record_type;

    match record_type {
        ACTIVITY_CHANGE_INFO => {
            let (changes, issues) = decode_changes(array.data, array.offset);
            out.issues.extend(issues);
            part.changes.get_or_insert_with(Vec::new).extend(changes);
        }
        CARD_SLOTS_STATUS => each_record(array, "card slots", out, |r, _| {
            part.vehicle.card_slots = Some(read_card_slots(r)?);
            Ok(())
        }),
        CURRENT_DATE_TIME => each_record(array, "current time", out, |r, _| {
            part.vehicle.current_time = r.time()?;
            Ok(())
        }),
        MEMBER_STATE_CERTIFICATE | VU_CERTIFICATE => {
            let role = if record_type == VU_CERTIFICATE {
                CertificateRole::VehicleUnit
            } else {
                CertificateRole::MemberState
            };
            for (offset, record) in array.records() {
                match read_certificate(record, offset, g, role) {
                    Ok(cert) => out.push(g, RecordKind::Certificate(cert)),
                    Err(e) => out.record_failed("certificate", &e),
                }
            }
        }
        ODOMETER_MIDNIGHT => each_record(array, "odometer", out, |r, _| {
            part.odometer_midnight = Some(r.read_u24()?);
            Ok(())
        }),
        DATE_OF_DAY => each_record(array, "date of day", out, |r, _| {
            part.date = Some(r.read_u32()?);
            Ok(())
        }),
        SIGNATURE => {}
        SPECIFIC_CONDITION => each_record(array, "specific condition", out, |r, out| {
            out.push(g, RecordKind::SpecificCondition(read_specific_condition(r)?));
            Ok(())
        }),
        VIN => each_record(array, "VIN", out, |r, _| {
            part.vehicle.vin = Some(r.text(17, Charset::Ascii, "VIN")?);
            Ok(())
        }),
        REGISTRATION_NUMBER | REGISTRATION_IDENTIFICATION => {
            let with_nation = array.header.record_size >= 15;
            each_record(array, "registration", out, |r, _| {
                let registration = if with_nation {
                    r.registration()?
                } else {
                    let code_page = r.read_u8()?;
                    VehicleRegistration {
                        nation: Nation::from_code(0),
                        number: r.text(13, Charset::CodePage(code_page), "registration number")?,
                    }
                };
                part.vehicle.registration = Some(registration);
                Ok(())
            })
        }
        CALIBRATION => each_record(array, "calibration", out, |r, out| {
            out.push(g, RecordKind::Calibration(read_calibration(r, g)?));
            Ok(())
        }),
        CARD_IW => each_record(array, "card insertion", out, |r, out| {
            out.push(g, RecordKind::CardSession(read_card_session(r, g)?));
            Ok(())
        }),
        COMPANY_LOCKS => each_record(array, "company lock", out, |r, out| {
            out.push(g, RecordKind::CompanyLock(read_company_lock(r, g)?));
            Ok(())
        }),
        CONTROL_ACTIVITY => each_record(array, "control activity", out, |r, out| {
            out.push(g, RecordKind::ControlActivity(read_vu_control_activity(r, g)?));
            Ok(())
        }),
        DETAILED_SPEED => each_record(array, "speed block", out, |r, out| {
            out.push(g, RecordKind::SpeedBlock(read_speed_block(r)?));
            Ok(())
        }),
        DOWNLOADABLE_PERIOD => each_record(array, "downloadable period", out, |r, _| {
            part.vehicle.downloadable_period = Some(read_downloadable_period(r)?);
            Ok(())
        }),
        DOWNLOAD_ACTIVITY => each_record(array, "download activity", out, |r, _| {
            part.vehicle.last_download = Some(read_last_download(r, g)?);
            Ok(())
        }),
        EVENT | POWER_SUPPLY_INTERRUPTION => each_record(array, "event", out, |r, out| {
            out.push(g, RecordKind::Event(read_vu_event(r, g)?));
            Ok(())
        }),
        GNSS_ACCUMULATED_DRIVING => each_record(array, "GNSS accumulated driving", out, |r, out| {
            out.push(g, RecordKind::GnssAccumulatedDriving(read_vu_gnss_accumulated(r, g)?));
            Ok(())
        }),
        FAULT => each_record(array, "fault", out, |r, out| {
            out.push(g, RecordKind::Fault(read_vu_fault(r, g)?));
            Ok(())
        }),
        IDENTIFICATION => each_record(array, "VU identification", out, |r, out| {
            let vu = read_vu_identification(r, g)?;
            out.push(g, RecordKind::Identification(IdentificationRecord::VehicleUnit(vu)));
            Ok(())
        }),
        OVERSPEED_CONTROL => each_record(array, "overspeed control", out, |r, out| {
            out.push(g, RecordKind::OverspeedControl(read_overspeed_control(r)?));
            Ok(())
        }),
        OVERSPEED_EVENT => each_record(array, "overspeeding", out, |r, out| {
            out.push(g, RecordKind::Overspeeding(read_overspeeding(r, g)?));
            Ok(())
        }),
        PLACE_DAILY_WORK_PERIOD => each_record(array, "place", out, |r, out| {
            out.push(g, RecordKind::Place(read_vu_place(r, g)?));
            Ok(())
        }),
        TIME_ADJUSTMENT => each_record(array, "time adjustment", out, |r, out| {
            out.push(g, RecordKind::TimeAdjustment(read_time_adjustment(r, g)?));
            Ok(())
        }),
        SENSOR_PAIRED | SENSOR_EXTERNAL_GNSS => {
            let external = record_type == SENSOR_EXTERNAL_GNSS;
            each_record(array, "sensor pairing", out, |r, out| {
                let sensor = read_sensor_pairing(r, g, external)?;
                out.push(g, RecordKind::Identification(IdentificationRecord::SensorPairing(sensor)));
                Ok(())
            })
        }
        CARD_RECORD | ITS_CONSENT | TIME_ADJUSTMENT_GNSS | BORDER_CROSSING | LOAD_UNLOAD => {
            log::trace!(
                "Skipping {} record(s) of type 0x{:02X}",
                array.header.count,
                record_type
            );
        }
        other => {
            out.issues.push(
                Issue::warning(
                    IssueKind::UnknownBlockType,
                    format!(
                        "unknown record type 0x{:02X} ({} x {} bytes) skipped",
                        other, array.header.count, array.header.record_size
                    ),
                )
                .at(array.offset),
            );
        }
    }

}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::tlv::RecordArrayHeader;

    fn array(record_type: u8, size: u16, records: &[Vec<u8>]) -> Vec<u8> {
        let mut out = RecordArrayHeader {
            record_type,
            record_size: size,
            count: records.len() as u16,
        }
        .encode()
        .to_vec();
        for record in records {
            out.extend(record);
        }
        out
    }

    fn change(slot: u16, activity: u16, minute: u16) -> Vec<u8> {
        ((slot << 15) | (activity << 11) | minute).to_be_bytes().to_vec()
    }

    #[test]
    fn test_gen1_activities_part() {
        let mut payload = Vec::new();
        payload.extend(1_700_006_400u32.to_be_bytes());
        payload.extend([0x01, 0x86, 0xA0]);
        payload.extend(0u16.to_be_bytes());
        payload.extend(2u16.to_be_bytes());
        payload.extend(change(0, 0, 0));
        payload.extend(change(0, 3, 480));
        payload.push(0);
        payload.extend(0u16.to_be_bytes());
        payload.extend([0x55; GEN1_SIGNATURE_LEN]);

        let out = decode_vu_activities(&payload, 0, Generation::Gen1).unwrap();
        assert!(out.issues.is_empty(), "{:?}", out.issues);
        assert_eq!(out.records.len(), 1);
        match &out.records[0].kind {
            RecordKind::ActivityDay(day) => {
                assert_eq!(day.odometer_midnight_km, Some(100_000));
                assert_eq!(day.changes.len(), 2);
                assert_eq!(day.distance_km, None);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_gen1_part_length_must_match() {
        let mut payload = vec![0u8; 2];
        payload.extend([0x55; GEN1_SIGNATURE_LEN + 3]);
        // no speed blocks, then signature and 3 stray bytes
        let out = decode_vu_speed(&payload, 0, Generation::Gen1).unwrap();
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].kind, IssueKind::LengthMismatch);
        assert!(out.issues[0].is_error());
    }

    #[test]
    fn test_gen1_part_truncated_fails() {
        let mut payload = 3u16.to_be_bytes().to_vec();
        payload.extend([0u8; 64]);
        assert!(decode_vu_speed(&payload, 0, Generation::Gen1).is_err());
    }

    #[test]
    fn test_gen2_activities_part() {
        let mut payload = array(record_type::DATE_OF_DAY, 4, &[1_700_006_400u32.to_be_bytes().to_vec()]);
        payload.extend(array(record_type::ODOMETER_MIDNIGHT, 3, &[vec![0x01, 0x86, 0xA0]]));
        payload.extend(array(0x7A, 2, &[vec![1, 2]]));
        payload.extend(array(
            record_type::ACTIVITY_CHANGE_INFO,
            2,
            &[change(0, 0, 0), change(0, 3, 480)],
        ));
        payload.extend(array(record_type::SIGNATURE, 64, &[vec![0x11; 64]]));

        let out = decode_vu_activities(&payload, 0, Generation::Gen2).unwrap();
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].kind, IssueKind::UnknownBlockType);
        assert!(!out.issues[0].is_error());

        let day = out
            .records
            .iter()
            .find_map(|r| match &r.kind {
                RecordKind::ActivityDay(day) => Some(day),
                _ => None,
            })
            .unwrap();
        assert_eq!(day.odometer_midnight_km, Some(100_000));
        assert_eq!(day.changes.len(), 2);
    }

    #[test]
    fn test_gen2_bad_record_is_local() {
        // Two overspeed control records, the second too short to decode
        let mut good = 1_700_000_000u32.to_be_bytes().to_vec();
        good.extend(1_700_000_000u32.to_be_bytes());
        good.push(2);
        let mut payload = array(record_type::OVERSPEED_CONTROL, 9, &[good]);
        payload.extend(array(record_type::OVERSPEED_CONTROL, 3, &[vec![0, 0, 0]]));
        payload.extend(array(record_type::SIGNATURE, 64, &[vec![0x11; 64]]));

        let out = decode_vu_events(&payload, 0, Generation::Gen2).unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].kind, IssueKind::TruncatedData);
    }

    #[test]
    fn test_gen2_overview_collects_vehicle() {
        let mut payload = array(record_type::VIN, 17, &[padded("WDB9634031L123456", 17)]);
        payload.extend(array(
            record_type::REGISTRATION_IDENTIFICATION,
            15,
            &[registration(0x0D, "B-XY 123")],
        ));
        payload.extend(array(record_type::CARD_SLOTS_STATUS, 1, &[vec![0x01]]));
        payload.extend(array(record_type::SIGNATURE, 64, &[vec![0x11; 64]]));

        let out = decode_vu_overview(&payload, 0, Generation::Gen2).unwrap();
        assert!(out.issues.is_empty(), "{:?}", out.issues);
        match &out.records[0].kind {
            RecordKind::Identification(IdentificationRecord::Vehicle(v)) => {
                assert_eq!(v.vin.as_deref(), Some("WDB9634031L123456"));
                assert_eq!(v.registration.as_ref().unwrap().number, "B-XY 123");
                assert_eq!(v.card_slots.unwrap().driver, 1);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }
}
