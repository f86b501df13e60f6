//! Record decoders
//!
//! One decoding routine per record kind. Each routine consumes one payload
//! slice (a top-level block, or one record of a Gen2 record array) together
//! with the generation of the file and returns owned records: nothing decoded
//! here borrows from the input buffer.
//!
//! Field-level problems that still leave a usable value (an invalid BCD digit,
//! a character outside the declared code page) become warnings collected by
//! [`FieldReader`]. Problems that make a record unusable propagate as `Err`
//! and are attached to the enclosing record or block by the caller.

mod activity;
mod certificate;
mod events;
mod identification;
mod vehicles;
mod vu;

pub use activity::{Activity, ActivityChange, ActivityDay, CardSession, Slot, TimelineAnomaly};
pub use certificate::{AuthorityReference, CertificateRecord, CertificateRole, PublicKey};
pub use events::{EventCards, EventRecord, FaultRecord, OverspeedControl, OverspeedingRecord};
pub use identification::{
    ApplicationIdentification, CardIc, CardIcc, CardIdentification, CardSlots, DrivingLicence,
    IdentificationRecord, SensorPairing, VehicleOverview, VuIdentification,
};
pub use vehicles::{
    BorderCrossing, CardDownload, ControlActivity, ControlType, CurrentUsage, GnssAccumulatedDriving,
    GnssPlace, PlaceRecord, SpecificCondition, VehicleUnitUsed, VehicleUsed,
};
pub use vu::{
    CalibrationRecord, CompanyLock, DownloadInterfaceVersion, DownloadablePeriod, LastDownload,
    SpeedBlock, TimeAdjustment,
};

pub(crate) use activity::decode_driver_activity;
pub(crate) use certificate::{decode_ca_certificate, decode_card_certificate};
pub(crate) use events::{decode_card_events, decode_card_faults};
pub(crate) use identification::{
    decode_application_identification, decode_card_ic, decode_card_icc,
    decode_card_identification, decode_driving_licence,
};
pub(crate) use vehicles::{
    decode_border_crossings, decode_card_download, decode_control_activity, decode_current_usage,
    decode_gnss_places, decode_places, decode_specific_conditions, decode_vehicle_units_used,
    decode_vehicles_used, BORDER_CROSSING_RECORD_LEN, GNSS_PLACE_RECORD_LEN, VEHICLE_UNIT_RECORD_LEN,
};
pub(crate) use vu::{
    decode_vu_activities, decode_vu_events, decode_vu_interface_version, decode_vu_overview,
    decode_vu_speed, decode_vu_technical,
};

use crate::cursor::{Charset, Cursor};
use crate::tables::{CardType, Nation};
use crate::types::{DecoderError, Generation, Issue, IssueKind, Result, Timestamp};
use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::ops::{Deref, DerefMut};

/// A decoded record, tagged with the generation of the layout it was read from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub generation: Generation,
    pub kind: RecordKind,
}

/// Record variants, one per record kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum RecordKind {
    Identification(IdentificationRecord),
    ActivityDay(ActivityDay),
    Event(EventRecord),
    Fault(FaultRecord),
    OverspeedControl(OverspeedControl),
    Overspeeding(OverspeedingRecord),
    Calibration(CalibrationRecord),
    Certificate(CertificateRecord),
    VehicleUsed(VehicleUsed),
    VehicleUnitUsed(VehicleUnitUsed),
    Place(PlaceRecord),
    GnssAccumulatedDriving(GnssAccumulatedDriving),
    BorderCrossing(BorderCrossing),
    SpecificCondition(SpecificCondition),
    ControlActivity(ControlActivity),
    CompanyLock(CompanyLock),
    CardSession(CardSession),
    TimeAdjustment(TimeAdjustment),
    SpeedBlock(SpeedBlock),
    CurrentUsage(CurrentUsage),
    CardDownload(CardDownload),
    DownloadInterfaceVersion(DownloadInterfaceVersion),
    RawUnknown(RawUnknownRecord),
}

impl RecordKind {
    /// Short name used in logs and summaries
    pub fn name(&self) -> &'static str {
        match self {
            RecordKind::Identification(_) => "Identification",
            RecordKind::ActivityDay(_) => "ActivityDay",
            RecordKind::Event(_) => "Event",
            RecordKind::Fault(_) => "Fault",
            RecordKind::OverspeedControl(_) => "OverspeedControl",
            RecordKind::Overspeeding(_) => "Overspeeding",
            RecordKind::Calibration(_) => "Calibration",
            RecordKind::Certificate(_) => "Certificate",
            RecordKind::VehicleUsed(_) => "VehicleUsed",
            RecordKind::VehicleUnitUsed(_) => "VehicleUnitUsed",
            RecordKind::Place(_) => "Place",
            RecordKind::GnssAccumulatedDriving(_) => "GnssAccumulatedDriving",
            RecordKind::BorderCrossing(_) => "BorderCrossing",
            RecordKind::SpecificCondition(_) => "SpecificCondition",
            RecordKind::ControlActivity(_) => "ControlActivity",
            RecordKind::CompanyLock(_) => "CompanyLock",
            RecordKind::CardSession(_) => "CardSession",
            RecordKind::TimeAdjustment(_) => "TimeAdjustment",
            RecordKind::SpeedBlock(_) => "SpeedBlock",
            RecordKind::CurrentUsage(_) => "CurrentUsage",
            RecordKind::CardDownload(_) => "CardDownload",
            RecordKind::DownloadInterfaceVersion(_) => "DownloadInterfaceVersion",
            RecordKind::RawUnknown(_) => "RawUnknown",
        }
    }
}

/// Why a payload was kept undecoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnknownReason {
    /// Tag not in the dispatch table for either generation
    UnknownTag,
    /// Tag only exists for the other generation
    GenerationMismatch,
    /// The record decoder failed on this payload
    DecodeFailed,
}

/// Payload that could not be turned into a typed record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawUnknownRecord {
    pub tag: u16,
    /// Absolute offset of the payload
    pub offset: usize,
    pub length: usize,
    #[serde(serialize_with = "hex_bytes")]
    pub payload: Option<Vec<u8>>,
    pub reason: UnknownReason,
}

/// Records and findings produced from one payload
#[derive(Debug, Default)]
pub struct Decoded {
    pub records: Vec<Record>,
    pub issues: Vec<Issue>,
}

impl Decoded {
    pub fn push(&mut self, generation: Generation, kind: RecordKind) {
        self.records.push(Record { generation, kind });
    }

    /// Attach an error for one record of an array; the rest of the array survives
    pub fn record_failed(&mut self, what: &str, err: &DecoderError) {
        let mut issue = Issue::from_error(err, crate::types::Severity::Error);
        issue.message = format!("{} record: {}", what, issue.message);
        self.issues.push(issue);
    }
}

/// Text field with its code page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Name {
    pub code_page: u8,
    pub text: String,
}

/// Vehicle registration nation and number
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VehicleRegistration {
    pub nation: Nation,
    pub number: String,
}

/// Card type, issuing nation and number (Gen2 adds the card generation)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FullCardNumber {
    pub card_type: CardType,
    pub nation: Nation,
    pub number: String,
    pub card_generation: Option<u8>,
}

/// Serial number of a device or card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtendedSerialNumber {
    pub serial: u32,
    /// BCD `MMYY`
    pub month_year: String,
    pub equipment_type: CardType,
    pub manufacturer_code: u8,
}

/// Cursor wrapper that reads the shared field types and collects soft warnings
pub struct FieldReader<'a> {
    cursor: Cursor<'a>,
    pub issues: Vec<Issue>,
}

impl<'a> Deref for FieldReader<'a> {
    type Target = Cursor<'a>;

    fn deref(&self) -> &Self::Target {
        &self.cursor
    }
}

impl<'a> DerefMut for FieldReader<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.cursor
    }
}

impl<'a> FieldReader<'a> {
    pub fn new(data: &'a [u8], base: usize) -> Self {
        Self {
            cursor: Cursor::with_base(data, base),
            issues: Vec::new(),
        }
    }

    /// BCD digits; an invalid nibble keeps the partial string and warns
    pub fn bcd(&mut self, n: usize, field: &str) -> Result<String> {
        match self.cursor.read_bcd(n) {
            Ok(digits) => Ok(digits),
            Err(DecoderError::InvalidEncoding {
                offset,
                detail,
                partial,
            }) => {
                self.issues.push(
                    Issue::warning(IssueKind::InvalidEncoding, format!("{}: {}", field, detail)).at(offset),
                );
                Ok(partial.unwrap_or_default())
            }
            Err(e) => Err(e),
        }
    }

    /// Fixed-length text; characters outside the charset are kept and warned about
    pub fn text(&mut self, n: usize, charset: Charset, field: &str) -> Result<String> {
        let offset = self.cursor.offset();
        let decoded = self.cursor.read_fixed_string(n, charset)?;
        if decoded.flagged {
            self.issues.push(
                Issue::warning(
                    IssueKind::InvalidEncoding,
                    format!("{}: characters outside {:?}", field, charset),
                )
                .at(offset),
            );
        }
        Ok(decoded.text)
    }

    /// `TimeReal` with the "no value" markers mapped to `None`
    pub fn time(&mut self) -> Result<Option<Timestamp>> {
        self.cursor.read_optional_timestamp()
    }

    /// Code page byte followed by 35 bytes of text
    pub fn name(&mut self, field: &str) -> Result<Name> {
        let code_page = self.cursor.read_u8()?;
        let text = self.text(35, Charset::CodePage(code_page), field)?;
        Ok(Name { code_page, text })
    }

    /// Nation, code page and 13 bytes of registration number
    pub fn registration(&mut self) -> Result<VehicleRegistration> {
        let nation = Nation::from_code(self.cursor.read_u8()?);
        let code_page = self.cursor.read_u8()?;
        let number = self.text(13, Charset::CodePage(code_page), "registration number")?;
        Ok(VehicleRegistration { nation, number })
    }

    /// Full card number; `None` when the slot holds no card
    pub fn card_number(&mut self, generation: Generation) -> Result<Option<FullCardNumber>> {
        let card_type = self.cursor.read_u8()?;
        let nation = self.cursor.read_u8()?;
        let number = self.text(16, Charset::Ascii, "card number")?;
        let card_generation = match generation {
            Generation::Gen1 => None,
            Generation::Gen2 => Some(self.cursor.read_u8()?),
        };

        if number.is_empty() || (card_type == 0xFF && nation == 0xFF) {
            return Ok(None);
        }
        Ok(Some(FullCardNumber {
            card_type: CardType::from_code(card_type),
            nation: Nation::from_code(nation),
            number,
            card_generation,
        }))
    }

    pub fn serial_number(&mut self) -> Result<ExtendedSerialNumber> {
        let serial = self.cursor.read_u32()?;
        let month_year = self.bcd(2, "serial month/year")?;
        let equipment_type = CardType::from_code(self.cursor.read_u8()?);
        let manufacturer_code = self.cursor.read_u8()?;
        Ok(ExtendedSerialNumber {
            serial,
            month_year,
            equipment_type,
            manufacturer_code,
        })
    }

    /// `Datef`: 4 BCD bytes `yyyymmdd`; all zeros means no date
    pub fn datef(&mut self, field: &str) -> Result<Option<NaiveDate>> {
        let offset = self.cursor.offset();
        let digits = self.bcd(4, field)?;
        if digits == "00000000" {
            return Ok(None);
        }
        let parsed = digits
            .get(0..4)
            .zip(digits.get(4..6))
            .zip(digits.get(6..8))
            .and_then(|((y, m), d)| {
                NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
            });
        if parsed.is_none() {
            self.issues.push(
                Issue::warning(IssueKind::InvalidEncoding, format!("{}: '{}' is not a date", field, digits))
                    .at(offset),
            );
        }
        Ok(parsed)
    }

    /// Move the collected warnings into `out`
    pub fn drain_into(&mut self, out: &mut Decoded) {
        out.issues.append(&mut self.issues);
    }
}

/// Read fixed-size records until the payload is exhausted
///
/// Each record is decoded on its own reader so a failure stays local to that
/// record. Bytes left over that do not fill a whole record are reported as a
/// warning.
pub(crate) fn for_each_record<F>(
    data: &[u8],
    base: usize,
    record_len: usize,
    what: &str,
    out: &mut Decoded,
    mut decode: F,
) where
    F: FnMut(&mut FieldReader<'_>, &mut Decoded) -> Result<()>,
{
    let mut chunks = data.chunks_exact(record_len);
    for (index, chunk) in chunks.by_ref().enumerate() {
        let mut reader = FieldReader::new(chunk, base + index * record_len);
        if let Err(e) = decode(&mut reader, out) {
            out.record_failed(what, &e);
        }
        reader.drain_into(out);
    }

    let rest = chunks.remainder();
    if !rest.is_empty() {
        out.issues.push(
            Issue::warning(
                IssueKind::LengthMismatch,
                format!("{} trailing byte(s) after the last {} record", rest.len(), what),
            )
            .at(base + data.len() - rest.len()),
        );
    }
}

fn hex_bytes<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match bytes {
        Some(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
            serializer.serialize_some(&hex)
        }
        None => serializer.serialize_none(),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_read_name_and_registration() {
        let mut data = name("MUSTERMANN");
        data.extend(registration(0x0D, "B-XY 123"));
        let mut reader = FieldReader::new(&data, 0);

        let surname = reader.name("surname").unwrap();
        assert_eq!(surname.text, "MUSTERMANN");
        assert_eq!(surname.code_page, 1);

        let reg = reader.registration().unwrap();
        assert_eq!(reg.nation.to_string(), "D");
        assert_eq!(reg.number, "B-XY 123");
        assert!(reader.issues.is_empty());
    }

    #[test]
    fn test_card_number_absent() {
        let data = [0xFFu8; 19];
        let mut reader = FieldReader::new(&data, 0);
        assert_eq!(reader.card_number(Generation::Gen2).unwrap(), None);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_card_number_gen2() {
        let data = card_number(1, 0x0D, "DF00000012345601", Some(2));
        let card = FieldReader::new(&data, 0)
            .card_number(Generation::Gen2)
            .unwrap()
            .unwrap();
        assert_eq!(card.card_type, CardType::DriverCard);
        assert_eq!(card.number, "DF00000012345601");
        assert_eq!(card.card_generation, Some(2));
    }

    #[test]
    fn test_datef_invalid_keeps_going() {
        let data = [0x19, 0x8A, 0x05, 0x31, 0x42];
        let mut reader = FieldReader::new(&data, 100);
        assert_eq!(reader.datef("birth date").unwrap(), None);
        assert_eq!(reader.issues.len(), 2);
        assert_eq!(reader.issues[0].offset, Some(100));
        assert_eq!(reader.read_u8().unwrap(), 0x42);
    }

    #[test]
    fn test_for_each_record_isolates_failures() {
        let data = [1u8, 2, 0xFF, 4, 5];
        let mut out = Decoded::default();
        for_each_record(&data, 0, 2, "pair", &mut out, |r, out| {
            let first = r.read_u8()?;
            if first == 0xFF {
                return Err(DecoderError::InvalidEncoding {
                    offset: r.offset(),
                    detail: "bad".into(),
                    partial: None,
                });
            }
            let second = r.read_u8()?;
            out.push(
                Generation::Gen1,
                RecordKind::CardDownload(CardDownload {
                    last_download: crate::types::time_real(u32::from(first) << 8 | u32::from(second)),
                }),
            );
            Ok(())
        });
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.issues.len(), 2);
        assert!(out.issues[0].is_error());
        assert_eq!(out.issues[1].kind, IssueKind::LengthMismatch);
    }
}
