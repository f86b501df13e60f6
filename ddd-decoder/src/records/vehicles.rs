//! Vehicle use, places, specific conditions and controls

use super::{for_each_record, Decoded, FieldReader, FullCardNumber, RecordKind, VehicleRegistration};
use crate::bitfield::{BitField, BitLayout};
use crate::cursor::Charset;
use crate::tables::{Nation, PlaceEntryType, SpecificConditionType};
use crate::types::{Generation, Result, Timestamp};
use serde::Serialize;

const CONTROL_CARD_DOWNLOAD: BitField = BitField::new("card downloading", 0, 1);
const CONTROL_VU_DOWNLOAD: BitField = BitField::new("vu downloading", 1, 1);
const CONTROL_PRINTING: BitField = BitField::new("printing", 2, 1);
const CONTROL_DISPLAY: BitField = BitField::new("display", 3, 1);
const CONTROL_CALIBRATION_CHECK: BitField = BitField::new("calibration checking", 4, 1);
const CONTROL_TYPE: BitLayout = BitLayout::new(
    8,
    &[
        CONTROL_CARD_DOWNLOAD,
        CONTROL_VU_DOWNLOAD,
        CONTROL_PRINTING,
        CONTROL_DISPLAY,
        CONTROL_CALIBRATION_CHECK,
    ],
);

/// `CardVehicleRecord`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleUsed {
    pub odometer_begin_km: u32,
    pub odometer_end_km: u32,
    pub first_use: Option<Timestamp>,
    pub last_use: Option<Timestamp>,
    pub registration: VehicleRegistration,
    pub block_counter: String,
    /// Gen2 only
    pub vin: Option<String>,
}

/// Raw GNSS position (`GNSSPlaceRecord`)
///
/// Coordinates are kept in their stored `±DDMM.M * 10` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GnssPlace {
    pub time: Option<Timestamp>,
    pub accuracy: u8,
    pub latitude: i32,
    pub longitude: i32,
}

/// Place where a daily work period began or ended (`PlaceRecord`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceRecord {
    pub entry_time: Option<Timestamp>,
    pub entry_type: PlaceEntryType,
    pub country: Nation,
    pub region: u8,
    pub odometer_km: u32,
    /// Gen2 only
    pub gnss: Option<GnssPlace>,
    /// Vehicle unit only: card that entered the place
    pub card: Option<FullCardNumber>,
}

/// Position recorded after every three hours of accumulated driving
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GnssAccumulatedDriving {
    pub time: Option<Timestamp>,
    pub place: GnssPlace,
    pub odometer_km: u32,
    pub driver_card: Option<FullCardNumber>,
    pub codriver_card: Option<FullCardNumber>,
}

/// Vehicle unit the card was inserted in (`CardVehicleUnitRecord`, Gen2)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VehicleUnitUsed {
    pub time: Option<Timestamp>,
    pub manufacturer_code: u8,
    pub device_id: u8,
    pub software_version: String,
}

/// Country change recorded by the vehicle unit (`CardBorderCrossingRecord`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BorderCrossing {
    pub country_left: Nation,
    pub country_entered: Nation,
    pub place: GnssPlace,
    pub authenticated: bool,
    pub odometer_km: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecificCondition {
    pub time: Option<Timestamp>,
    pub condition: SpecificConditionType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ControlType {
    pub card_downloading: bool,
    pub vu_downloading: bool,
    pub printing: bool,
    pub display: bool,
    pub calibration_checking: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlActivity {
    pub control_type: ControlType,
    pub time: Option<Timestamp>,
    pub control_card: Option<FullCardNumber>,
    /// Card only: vehicle in which the control took place
    pub vehicle: Option<VehicleRegistration>,
    pub download_begin: Option<Timestamp>,
    pub download_end: Option<Timestamp>,
}

/// EF Current usage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentUsage {
    pub session_open: Option<Timestamp>,
    pub vehicle: VehicleRegistration,
}

/// EF Card download
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardDownload {
    pub last_download: Option<Timestamp>,
}

fn vehicle_record_len(generation: Generation) -> usize {
    match generation {
        Generation::Gen1 => 31,
        Generation::Gen2 => 48,
    }
}

fn place_record_len(generation: Generation) -> usize {
    match generation {
        Generation::Gen1 => 10,
        Generation::Gen2 => 21,
    }
}

pub(crate) fn decode_vehicles_used(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    let mut r = FieldReader::new(payload, base);
    let newest = r.read_u16()?;
    log::trace!("Vehicles used: newest record {}", newest);

    let mut out = Decoded::default();
    let records_base = r.offset();
    for_each_record(
        r.rest(),
        records_base,
        vehicle_record_len(generation),
        "vehicle used",
        &mut out,
        |r, out| {
            let odometer_begin_km = r.read_u24()?;
            let odometer_end_km = r.read_u24()?;
            let first_use = r.time()?;
            let last_use = r.time()?;
            let registration = r.registration()?;
            let block_counter = r.bcd(2, "vehicle data block counter")?;
            let vin = match generation {
                Generation::Gen1 => None,
                Generation::Gen2 => Some(r.text(17, Charset::Ascii, "VIN")?),
            };
            if first_use.is_none() && odometer_begin_km == 0 && registration.number.is_empty() {
                return Ok(());
            }
            out.push(
                generation,
                RecordKind::VehicleUsed(VehicleUsed {
                    odometer_begin_km,
                    odometer_end_km,
                    first_use,
                    last_use,
                    registration,
                    block_counter,
                    vin,
                }),
            );
            Ok(())
        },
    );
    Ok(out)
}

pub(crate) fn read_gnss_place(r: &mut FieldReader<'_>) -> Result<GnssPlace> {
    Ok(GnssPlace {
        time: r.time()?,
        accuracy: r.read_u8()?,
        latitude: r.read_i24()?,
        longitude: r.read_i24()?,
    })
}

/// `PlaceRecord`: 10 bytes (Gen1), 21 bytes with the GNSS position (Gen2)
pub(crate) fn read_place(r: &mut FieldReader<'_>, generation: Generation) -> Result<PlaceRecord> {
    let entry_time = r.time()?;
    let entry_type = PlaceEntryType::from_code(r.read_u8()?);
    let country = Nation::from_code(r.read_u8()?);
    let region = r.read_u8()?;
    let odometer_km = r.read_u24()?;
    let gnss = match generation {
        Generation::Gen1 => None,
        Generation::Gen2 => Some(read_gnss_place(r)?),
    };
    Ok(PlaceRecord {
        entry_time,
        entry_type,
        country,
        region,
        odometer_km,
        gnss,
        card: None,
    })
}

pub(crate) fn decode_places(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    let mut r = FieldReader::new(payload, base);
    match generation {
        Generation::Gen1 => r.skip(1)?,
        Generation::Gen2 => r.skip(2)?,
    }

    let mut out = Decoded::default();
    let records_base = r.offset();
    for_each_record(
        r.rest(),
        records_base,
        place_record_len(generation),
        "place",
        &mut out,
        |r, out| {
            let place = read_place(r, generation)?;
            if place.entry_time.is_none() && place.odometer_km == 0 && place.country.code == 0 {
                return Ok(());
            }
            out.push(generation, RecordKind::Place(place));
            Ok(())
        },
    );
    Ok(out)
}

pub(crate) fn decode_current_usage(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    let mut r = FieldReader::new(payload, base);
    let session_open = r.time()?;
    let vehicle = r.registration()?;

    let mut out = Decoded::default();
    r.drain_into(&mut out);
    out.push(
        generation,
        RecordKind::CurrentUsage(CurrentUsage { session_open, vehicle }),
    );
    Ok(out)
}

fn read_control_type(r: &mut FieldReader<'_>) -> Result<ControlType> {
    let value = r.read_bitfield(&CONTROL_TYPE)?;
    Ok(ControlType {
        card_downloading: value.flag(&CONTROL_CARD_DOWNLOAD),
        vu_downloading: value.flag(&CONTROL_VU_DOWNLOAD),
        printing: value.flag(&CONTROL_PRINTING),
        display: value.flag(&CONTROL_DISPLAY),
        calibration_checking: value.flag(&CONTROL_CALIBRATION_CHECK),
    })
}

/// EF Control activity data: the last control of the card
pub(crate) fn decode_control_activity(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    let mut r = FieldReader::new(payload, base);
    let control_type = read_control_type(&mut r)?;
    let time = r.time()?;
    // Card EFs carry the card number without the generation byte
    let control_card = r.card_number(Generation::Gen1)?;
    let vehicle = r.registration()?;
    let download_begin = r.time()?;
    let download_end = r.time()?;

    let mut out = Decoded::default();
    r.drain_into(&mut out);
    if time.is_some() {
        out.push(
            generation,
            RecordKind::ControlActivity(ControlActivity {
                control_type,
                time,
                control_card,
                vehicle: Some(vehicle),
                download_begin,
                download_end,
            }),
        );
    }
    Ok(out)
}

/// `VuControlActivityRecord`: 31 bytes (Gen1)
pub(crate) fn read_vu_control_activity(r: &mut FieldReader<'_>, generation: Generation) -> Result<ControlActivity> {
    Ok(ControlActivity {
        control_type: read_control_type(r)?,
        time: r.time()?,
        control_card: r.card_number(generation)?,
        vehicle: None,
        download_begin: r.time()?,
        download_end: r.time()?,
    })
}

pub(crate) fn decode_card_download(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    let mut r = FieldReader::new(payload, base);
    let mut out = Decoded::default();
    out.push(
        generation,
        RecordKind::CardDownload(CardDownload {
            last_download: r.time()?,
        }),
    );
    Ok(out)
}

pub(crate) fn read_specific_condition(r: &mut FieldReader<'_>) -> Result<SpecificCondition> {
    Ok(SpecificCondition {
        time: r.time()?,
        condition: SpecificConditionType::from_code(r.read_u8()?),
    })
}

/// EF Specific conditions: plain records (Gen1), newest-record pointer first (Gen2)
pub(crate) fn decode_specific_conditions(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    let mut r = FieldReader::new(payload, base);
    if generation == Generation::Gen2 {
        r.skip(2)?;
    }

    let mut out = Decoded::default();
    let records_base = r.offset();
    for_each_record(r.rest(), records_base, 5, "specific condition", &mut out, |r, out| {
        let condition = read_specific_condition(r)?;
        if condition.time.is_some() {
            out.push(generation, RecordKind::SpecificCondition(condition));
        }
        Ok(())
    });
    Ok(out)
}

/// `CardVehicleUnitRecord`
pub const VEHICLE_UNIT_RECORD_LEN: usize = 10;
/// `GNSSAccumulatedDrivingRecord`
pub const GNSS_PLACE_RECORD_LEN: usize = 18;
/// `CardBorderCrossingRecord`
pub const BORDER_CROSSING_RECORD_LEN: usize = 17;

/// EF VehicleUnits_Used (Gen2): pointer then 10-byte records
pub(crate) fn decode_vehicle_units_used(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    let mut r = FieldReader::new(payload, base);
    let newest = r.read_u16()?;
    log::trace!("Vehicle units used: newest record {}", newest);

    let mut out = Decoded::default();
    let records_base = r.offset();
    for_each_record(
        r.rest(),
        records_base,
        VEHICLE_UNIT_RECORD_LEN,
        "vehicle unit used",
        &mut out,
        |r, out| {
            let time = r.time()?;
            let manufacturer_code = r.read_u8()?;
            let device_id = r.read_u8()?;
            let software_version = r.text(4, Charset::Ascii, "VU software version")?;
            if time.is_none() {
                return Ok(());
            }
            out.push(
                generation,
                RecordKind::VehicleUnitUsed(VehicleUnitUsed {
                    time,
                    manufacturer_code,
                    device_id,
                    software_version,
                }),
            );
            Ok(())
        },
    );
    Ok(out)
}

/// EF GNSS_Places (Gen2): pointer then 18-byte records
pub(crate) fn decode_gnss_places(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    let mut r = FieldReader::new(payload, base);
    r.skip(2)?;

    let mut out = Decoded::default();
    let records_base = r.offset();
    for_each_record(
        r.rest(),
        records_base,
        GNSS_PLACE_RECORD_LEN,
        "GNSS accumulated driving",
        &mut out,
        |r, out| {
            let time = r.time()?;
            let place = read_gnss_place(r)?;
            let odometer_km = r.read_u24()?;
            if time.is_some() {
                out.push(
                    generation,
                    RecordKind::GnssAccumulatedDriving(GnssAccumulatedDriving {
                        time,
                        place,
                        odometer_km,
                        driver_card: None,
                        codriver_card: None,
                    }),
                );
            }
            Ok(())
        },
    );
    Ok(out)
}

/// EF Border_Crossings (Gen2 version 2): pointer then 17-byte records
pub(crate) fn decode_border_crossings(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    let mut r = FieldReader::new(payload, base);
    r.skip(2)?;

    let mut out = Decoded::default();
    let records_base = r.offset();
    for_each_record(
        r.rest(),
        records_base,
        BORDER_CROSSING_RECORD_LEN,
        "border crossing",
        &mut out,
        |r, out| {
            let country_left = Nation::from_code(r.read_u8()?);
            let country_entered = Nation::from_code(r.read_u8()?);
            let place = read_gnss_place(r)?;
            // PositionAuthenticationStatus
            let authenticated = r.read_u8()? == 0x01;
            let odometer_km = r.read_u24()?;
            if place.time.is_none() {
                return Ok(());
            }
            out.push(
                generation,
                RecordKind::BorderCrossing(BorderCrossing {
                    country_left,
                    country_entered,
                    place,
                    authenticated,
                    odometer_km,
                }),
            );
            Ok(())
        },
    );
    Ok(out)
}

/// `VuGNSSADRecord` (Gen2 vehicle unit)
pub(crate) fn read_vu_gnss_accumulated(r: &mut FieldReader<'_>, generation: Generation) -> Result<GnssAccumulatedDriving> {
    let time = r.time()?;
    let driver_card = r.card_number(generation)?;
    let codriver_card = r.card_number(generation)?;
    let place = read_gnss_place(r)?;
    let odometer_km = r.read_u24()?;
    Ok(GnssAccumulatedDriving {
        time,
        place,
        odometer_km,
        driver_card,
        codriver_card,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_decode_vehicles_used_gen2() {
        let mut payload = 1u16.to_be_bytes().to_vec();
        let mut record = Vec::new();
        record.extend([0x01, 0x86, 0xA0]);
        record.extend([0x01, 0x87, 0x04]);
        record.extend(1_700_000_000u32.to_be_bytes());
        record.extend(1_700_030_000u32.to_be_bytes());
        record.extend(registration(0x0D, "M-AB 1234"));
        record.extend([0x00, 0x07]);
        record.extend(padded("WDB9634031L123456", 17));
        assert_eq!(record.len(), 48);
        payload.extend(&record);
        payload.extend(vec![0u8; 48]);

        let out = decode_vehicles_used(&payload, 0, Generation::Gen2).unwrap();
        assert!(out.issues.is_empty(), "{:?}", out.issues);
        assert_eq!(out.records.len(), 1);
        match &out.records[0].kind {
            RecordKind::VehicleUsed(v) => {
                assert_eq!(v.odometer_begin_km, 100_000);
                assert_eq!(v.odometer_end_km, 100_100);
                assert_eq!(v.block_counter, "0007");
                assert_eq!(v.vin.as_deref(), Some("WDB9634031L123456"));
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_decode_places_gen2_coordinates() {
        let mut payload = vec![0x00, 0x00];
        payload.extend(1_700_000_000u32.to_be_bytes());
        payload.extend([0x00, 0x0D, 0x05]);
        payload.extend([0x01, 0x86, 0xA0]);
        payload.extend(1_700_000_000u32.to_be_bytes());
        payload.push(3);
        // 52 deg 30.5 min N, 13 deg 24.0 min W
        payload.extend(&52305i32.to_be_bytes()[1..]);
        payload.extend(&(-13240i32).to_be_bytes()[1..]);

        let out = decode_places(&payload, 0, Generation::Gen2).unwrap();
        assert_eq!(out.records.len(), 1);
        match &out.records[0].kind {
            RecordKind::Place(place) => {
                assert_eq!(place.entry_type, PlaceEntryType::BeginRelatedTimeCardInsertion);
                assert_eq!(place.country.to_string(), "D");
                let gnss = place.gnss.as_ref().unwrap();
                assert_eq!(gnss.latitude, 52305);
                assert_eq!(gnss.longitude, -13240);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_control_type_bits() {
        let mut payload = vec![0b1010_0000];
        payload.extend(1_700_000_000u32.to_be_bytes());
        payload.extend(card_number(3, 0x0D, "DC00000000000101", None));
        payload.extend(registration(0x0D, "B-XY 123"));
        payload.extend(1_699_000_000u32.to_be_bytes());
        payload.extend(1_700_000_000u32.to_be_bytes());
        assert_eq!(payload.len(), 46);

        let out = decode_control_activity(&payload, 0, Generation::Gen1).unwrap();
        match &out.records[0].kind {
            RecordKind::ControlActivity(control) => {
                assert!(control.control_type.card_downloading);
                assert!(!control.control_type.vu_downloading);
                assert!(control.control_type.printing);
                assert!(control.control_card.is_some());
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_specific_conditions_gen2_pointer() {
        let mut payload = vec![0x00, 0x01];
        payload.extend(1_700_000_000u32.to_be_bytes());
        payload.push(0x03);
        payload.extend([0u8; 5]);
        let out = decode_specific_conditions(&payload, 0, Generation::Gen2).unwrap();
        assert_eq!(out.records.len(), 1);
        match &out.records[0].kind {
            RecordKind::SpecificCondition(c) => {
                assert_eq!(c.condition, SpecificConditionType::FerryTrainCrossingBegin)
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    fn gnss_place(seconds: u32, latitude: i32, longitude: i32) -> Vec<u8> {
        let mut out = seconds.to_be_bytes().to_vec();
        out.push(2);
        out.extend(&latitude.to_be_bytes()[1..]);
        out.extend(&longitude.to_be_bytes()[1..]);
        out
    }

    #[test]
    fn test_vehicle_units_used_records() {
        let mut payload = 1u16.to_be_bytes().to_vec();
        payload.extend(1_700_000_000u32.to_be_bytes());
        payload.extend([0x21, 0x03]);
        payload.extend(b"0412");
        payload.extend(1_700_090_000u32.to_be_bytes());
        payload.extend([0x21, 0x04]);
        payload.extend(b"0500");
        payload.extend([0u8; VEHICLE_UNIT_RECORD_LEN]);

        let out = decode_vehicle_units_used(&payload, 0, Generation::Gen2).unwrap();
        assert!(out.issues.is_empty(), "{:?}", out.issues);
        assert_eq!(out.records.len(), 2);
        match &out.records[1].kind {
            RecordKind::VehicleUnitUsed(unit) => {
                assert_eq!(unit.manufacturer_code, 0x21);
                assert_eq!(unit.device_id, 0x04);
                assert_eq!(unit.software_version, "0500");
                assert_eq!(unit.time.map(|t| t.timestamp()), Some(1_700_090_000));
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_gnss_places_not_read_as_vehicle_units() {
        let mut payload = vec![0x00, 0x00];
        payload.extend(1_700_010_800u32.to_be_bytes());
        payload.extend(gnss_place(1_700_010_790, 52305, 13240));
        payload.extend([0x01, 0x87, 0x04]);
        assert_eq!(payload.len(), 2 + GNSS_PLACE_RECORD_LEN);

        let out = decode_gnss_places(&payload, 0, Generation::Gen2).unwrap();
        assert!(out.issues.is_empty(), "{:?}", out.issues);
        match &out.records[..] {
            [record] => match &record.kind {
                RecordKind::GnssAccumulatedDriving(gnss) => {
                    assert_eq!(gnss.odometer_km, 100_100);
                    assert_eq!(gnss.place.latitude, 52305);
                    assert_eq!(gnss.place.accuracy, 2);
                }
                other => panic!("unexpected record: {:?}", other),
            },
            other => panic!("expected one record, got {:?}", other),
        }

        // A vehicle-units payload does not fill whole GNSS records
        let units = [0u8; 2 + 2 * VEHICLE_UNIT_RECORD_LEN];
        let out = decode_gnss_places(&units, 0, Generation::Gen2).unwrap();
        assert_eq!(out.issues[0].kind, crate::types::IssueKind::LengthMismatch);
    }

    #[test]
    fn test_border_crossings() {
        let mut payload = vec![0x00, 0x00];
        payload.extend([0x0D, 0x28]);
        payload.extend(gnss_place(1_700_020_000, 52200, 14350));
        payload.push(0x01);
        payload.extend([0x01, 0x88, 0x00]);
        payload.extend([0u8; BORDER_CROSSING_RECORD_LEN]);

        let out = decode_border_crossings(&payload, 0, Generation::Gen2).unwrap();
        assert!(out.issues.is_empty(), "{:?}", out.issues);
        assert_eq!(out.records.len(), 1);
        match &out.records[0].kind {
            RecordKind::BorderCrossing(crossing) => {
                assert_eq!(crossing.country_left.to_string(), "D");
                assert_eq!(crossing.country_entered.to_string(), "PL");
                assert!(crossing.authenticated);
                assert_eq!(crossing.odometer_km, 100_352);
                assert_eq!(crossing.place.longitude, 14350);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }
}
