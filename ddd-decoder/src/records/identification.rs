//! Identification records: card chip data, card holder, driving licence,
//! vehicle unit, paired sensors and the vehicle itself

use super::vu::{DownloadablePeriod, LastDownload};
use super::{Decoded, ExtendedSerialNumber, FieldReader, Name, RecordKind, VehicleRegistration};
use crate::bitfield::{BitField, BitLayout};
use crate::cursor::Charset;
use crate::tables::{CardType, Nation};
use crate::types::{Generation, Result, Timestamp};
use chrono::NaiveDate;
use serde::Serialize;

/// Identification sections, one variant per source structure
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "section")]
pub enum IdentificationRecord {
    CardIcc(CardIcc),
    CardIc(CardIc),
    Application(ApplicationIdentification),
    Card(CardIdentification),
    DrivingLicence(DrivingLicence),
    VehicleUnit(VuIdentification),
    SensorPairing(SensorPairing),
    Vehicle(VehicleOverview),
}

/// EF ICC: card chip identification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardIcc {
    pub clock_stop: u8,
    pub serial_number: ExtendedSerialNumber,
    pub approval_number: String,
    pub personaliser_id: u8,
    /// Embedder / IC assembler identifier, hex
    pub embedder_id: String,
    pub ic_identifier: u16,
}

/// EF IC: integrated circuit identification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardIc {
    pub ic_serial_number: u32,
    pub ic_manufacturing_references: u32,
}

/// EF Application identification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationIdentification {
    pub card_type: CardType,
    pub structure_version: u16,
    pub events_per_type: u8,
    pub faults_per_type: u8,
    pub activity_structure_length: u16,
    pub vehicle_records: u16,
    pub place_records: u16,
    pub gnss_records: Option<u16>,
    pub specific_condition_records: Option<u16>,
    pub vehicle_unit_records: Option<u16>,
}

/// EF Identification: card identification plus card holder identification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardIdentification {
    pub issuing_nation: Nation,
    pub card_number: String,
    pub issuing_authority: Name,
    pub issue_date: Option<Timestamp>,
    pub validity_begin: Option<Timestamp>,
    pub expiry_date: Option<Timestamp>,
    pub holder_surname: Name,
    pub holder_first_names: Name,
    pub birth_date: Option<NaiveDate>,
    pub preferred_language: String,
}

/// EF Driving licence info
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrivingLicence {
    pub issuing_authority: Name,
    pub issuing_nation: Nation,
    pub licence_number: String,
}

/// Vehicle unit manufacturer, software and approval data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VuIdentification {
    pub manufacturer_name: Name,
    pub manufacturer_address: Name,
    pub part_number: String,
    pub serial_number: ExtendedSerialNumber,
    pub software_version: String,
    pub software_installation: Option<Timestamp>,
    pub manufacturing_date: Option<Timestamp>,
    pub approval_number: String,
    pub vu_generation: Option<u8>,
    pub abilities: Option<u8>,
}

/// Motion sensor (or external GNSS facility) coupled to the vehicle unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorPairing {
    pub external_gnss: bool,
    pub serial_number: ExtendedSerialNumber,
    pub approval_number: String,
    pub paired_at: Option<Timestamp>,
}

/// Card types inserted in the two vehicle unit slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CardSlots {
    pub driver: u8,
    pub codriver: u8,
}

/// Vehicle identity and download status from a vehicle unit overview
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VehicleOverview {
    pub vin: Option<String>,
    pub registration: Option<VehicleRegistration>,
    pub current_time: Option<Timestamp>,
    pub downloadable_period: Option<DownloadablePeriod>,
    pub card_slots: Option<CardSlots>,
    pub last_download: Option<LastDownload>,
}

impl VehicleOverview {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

const SLOT_CODRIVER: BitField = BitField::new("codriver", 0, 4);
const SLOT_DRIVER: BitField = BitField::new("driver", 4, 4);
const CARD_SLOTS: BitLayout = BitLayout::new(8, &[SLOT_CODRIVER, SLOT_DRIVER]);

pub(crate) fn read_card_slots(r: &mut FieldReader<'_>) -> Result<CardSlots> {
    let value = r.read_bitfield(&CARD_SLOTS)?;
    Ok(CardSlots {
        driver: value.get(&SLOT_DRIVER) as u8,
        codriver: value.get(&SLOT_CODRIVER) as u8,
    })
}

fn approval_len(generation: Generation) -> usize {
    match generation {
        Generation::Gen1 => 8,
        Generation::Gen2 => 16,
    }
}

pub(crate) fn decode_card_icc(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    let mut r = FieldReader::new(payload, base);
    let clock_stop = r.read_u8()?;
    let serial_number = r.serial_number()?;
    let approval_number = r.text(8, Charset::Ascii, "card approval number")?;
    let personaliser_id = r.read_u8()?;
    let embedder_id = r.read_bytes(5)?.iter().map(|b| format!("{:02X}", b)).collect();
    let ic_identifier = r.read_u16()?;

    let mut out = Decoded::default();
    r.drain_into(&mut out);
    out.push(
        generation,
        RecordKind::Identification(IdentificationRecord::CardIcc(CardIcc {
            clock_stop,
            serial_number,
            approval_number,
            personaliser_id,
            embedder_id,
            ic_identifier,
        })),
    );
    Ok(out)
}

pub(crate) fn decode_card_ic(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    let mut r = FieldReader::new(payload, base);
    let record = CardIc {
        ic_serial_number: r.read_u32()?,
        ic_manufacturing_references: r.read_u32()?,
    };
    let mut out = Decoded::default();
    out.push(generation, RecordKind::Identification(IdentificationRecord::CardIc(record)));
    Ok(out)
}

pub(crate) fn decode_application_identification(
    payload: &[u8],
    base: usize,
    generation: Generation,
) -> Result<Decoded> {
    let mut r = FieldReader::new(payload, base);
    let card_type = CardType::from_code(r.read_u8()?);
    let structure_version = r.read_u16()?;
    let events_per_type = r.read_u8()?;
    let faults_per_type = r.read_u8()?;
    let activity_structure_length = r.read_u16()?;
    let vehicle_records = r.read_u16()?;

    let record = match generation {
        Generation::Gen1 => ApplicationIdentification {
            card_type,
            structure_version,
            events_per_type,
            faults_per_type,
            activity_structure_length,
            vehicle_records,
            place_records: r.read_u8()? as u16,
            gnss_records: None,
            specific_condition_records: None,
            vehicle_unit_records: None,
        },
        Generation::Gen2 => ApplicationIdentification {
            card_type,
            structure_version,
            events_per_type,
            faults_per_type,
            activity_structure_length,
            vehicle_records,
            place_records: r.read_u16()?,
            gnss_records: Some(r.read_u16()?),
            specific_condition_records: Some(r.read_u16()?),
            vehicle_unit_records: Some(r.read_u16()?),
        },
    };

    let mut out = Decoded::default();
    out.push(
        generation,
        RecordKind::Identification(IdentificationRecord::Application(record)),
    );
    Ok(out)
}

pub(crate) fn decode_card_identification(
    payload: &[u8],
    base: usize,
    generation: Generation,
) -> Result<Decoded> {
    let mut r = FieldReader::new(payload, base);
    let issuing_nation = Nation::from_code(r.read_u8()?);
    let card_number = r.text(16, Charset::Ascii, "card number")?;
    let issuing_authority = r.name("issuing authority")?;
    let issue_date = r.time()?;
    let validity_begin = r.time()?;
    let expiry_date = r.time()?;
    let holder_surname = r.name("holder surname")?;
    let holder_first_names = r.name("holder first names")?;
    let birth_date = r.datef("birth date")?;
    let preferred_language = r.text(2, Charset::Ascii, "preferred language")?;

    let mut out = Decoded::default();
    r.drain_into(&mut out);
    out.push(
        generation,
        RecordKind::Identification(IdentificationRecord::Card(CardIdentification {
            issuing_nation,
            card_number,
            issuing_authority,
            issue_date,
            validity_begin,
            expiry_date,
            holder_surname,
            holder_first_names,
            birth_date,
            preferred_language,
        })),
    );
    Ok(out)
}

pub(crate) fn decode_driving_licence(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    let mut r = FieldReader::new(payload, base);
    let issuing_authority = r.name("licence authority")?;
    let issuing_nation = Nation::from_code(r.read_u8()?);
    let licence_number = r.text(16, Charset::Ascii, "licence number")?;

    let mut out = Decoded::default();
    r.drain_into(&mut out);
    out.push(
        generation,
        RecordKind::Identification(IdentificationRecord::DrivingLicence(DrivingLicence {
            issuing_authority,
            issuing_nation,
            licence_number,
        })),
    );
    Ok(out)
}

/// `VuIdentification`: 116 bytes (Gen1), 16-byte approval number plus
/// generation and abilities bytes (Gen2)
pub(crate) fn read_vu_identification(r: &mut FieldReader<'_>, generation: Generation) -> Result<VuIdentification> {
    let manufacturer_name = r.name("manufacturer name")?;
    let manufacturer_address = r.name("manufacturer address")?;
    let part_number = r.text(16, Charset::Ascii, "part number")?;
    let serial_number = r.serial_number()?;
    let software_version = r.text(4, Charset::Ascii, "software version")?;
    let software_installation = r.time()?;
    let manufacturing_date = r.time()?;
    let approval_number = r.text(approval_len(generation), Charset::Ascii, "approval number")?;
    let (vu_generation, abilities) = match generation {
        Generation::Gen1 => (None, None),
        Generation::Gen2 => (Some(r.read_u8()?), Some(r.read_u8()?)),
    };

    Ok(VuIdentification {
        manufacturer_name,
        manufacturer_address,
        part_number,
        serial_number,
        software_version,
        software_installation,
        manufacturing_date,
        approval_number,
        vu_generation,
        abilities,
    })
}

pub(crate) fn read_sensor_pairing(
    r: &mut FieldReader<'_>,
    generation: Generation,
    external_gnss: bool,
) -> Result<SensorPairing> {
    Ok(SensorPairing {
        external_gnss,
        serial_number: r.serial_number()?,
        approval_number: r.text(approval_len(generation), Charset::Ascii, "sensor approval number")?,
        paired_at: r.time()?,
    })
}
