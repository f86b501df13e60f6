//! Unified document
//!
//! The single output shape for both source kinds and both generations.
//! Consumers render from these types without looking at where the data came
//! from: fields a source does not record are `None` or empty, never zero.
//! Odometers are kilometres, speeds km/h, tyre circumference millimetres and
//! timestamps UTC.

use crate::records::{
    Activity, ActivityChange, CardIc, CardIcc, CardSession, CardSlots, CertificateRole, CompanyLock,
    ControlActivity, CurrentUsage, EventRecord, ExtendedSerialNumber, FaultRecord, FullCardNumber,
    OverspeedControl, OverspeedingRecord, RawUnknownRecord, SensorPairing, Slot, SpecificCondition,
    SpeedBlock, TimeAdjustment, VehicleRegistration, VehicleUnitUsed, VehicleUsed,
};
use crate::tables::{CalibrationPurpose, CardType, Nation, PlaceEntryType};
use crate::types::{Generation, SourceKind, Timestamp};
use crate::validator::ValidationResult;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedDocument {
    pub source_kind: SourceKind,
    /// Informational only; nothing in the document depends on it
    pub generation: Generation,
    pub identification: Identification,
    pub activities: Vec<DayActivity>,
    pub events: Vec<EventRecord>,
    pub faults: Vec<FaultRecord>,
    pub overspeedings: Vec<OverspeedingRecord>,
    pub overspeed_control: Option<OverspeedControl>,
    pub calibrations: Vec<Calibration>,
    pub certificates: Vec<Certificate>,
    pub vehicles_used: Vec<VehicleUsed>,
    /// Card only (Gen2)
    pub vehicle_units_used: Vec<VehicleUnitUsed>,
    pub places: Vec<Place>,
    pub gnss_accumulated_driving: Vec<GnssDrivingPosition>,
    /// Card only (Gen2 version 2)
    pub border_crossings: Vec<CountryCrossing>,
    pub specific_conditions: Vec<SpecificCondition>,
    pub control_activities: Vec<ControlActivity>,
    pub company_locks: Vec<CompanyLock>,
    pub card_sessions: Vec<CardSession>,
    pub time_adjustments: Vec<TimeAdjustment>,
    pub speed_blocks: Vec<SpeedBlock>,
    pub current_usage: Option<CurrentUsage>,
    pub download: Option<DownloadInfo>,
    /// Payloads that were kept undecoded
    pub unknown: Vec<RawUnknownRecord>,
    pub validation: Vec<ValidationResult>,
}

impl UnifiedDocument {
    /// Number of activity transitions over all days
    pub fn activity_change_count(&self) -> usize {
        self.activities.iter().map(|d| d.changes.len()).sum()
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DayActivity> {
        self.activities.iter().find(|d| d.date == Some(date))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Identification {
    /// Driver card and card holder
    pub card: Option<CardHolder>,
    pub vehicle_unit: Option<VehicleUnitInfo>,
    /// Motion sensors and external GNSS facilities paired with the vehicle unit
    pub sensors: Vec<SensorPairing>,
    pub vehicle: Option<VehicleInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CardHolder {
    pub card_type: Option<CardType>,
    pub card_number: Option<String>,
    pub issuing_nation: Option<Nation>,
    pub issuing_authority: Option<String>,
    pub issue_date: Option<Timestamp>,
    pub validity_begin: Option<Timestamp>,
    pub expiry_date: Option<Timestamp>,
    pub surname: Option<String>,
    pub first_names: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub preferred_language: Option<String>,
    pub driving_licence: Option<Licence>,
    pub icc: Option<CardIcc>,
    pub ic: Option<CardIc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Licence {
    pub issuing_authority: String,
    pub issuing_nation: Nation,
    pub number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleUnitInfo {
    pub manufacturer_name: String,
    pub manufacturer_address: String,
    pub part_number: String,
    pub serial_number: ExtendedSerialNumber,
    pub software_version: String,
    pub software_installation: Option<Timestamp>,
    pub manufacturing_date: Option<Timestamp>,
    pub approval_number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VehicleInfo {
    pub vin: Option<String>,
    pub registration: Option<VehicleRegistration>,
}

/// One calendar day of activity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayActivity {
    pub date: Option<NaiveDate>,
    /// Card only
    pub presence_counter: Option<String>,
    /// Card only
    pub distance_km: Option<u32>,
    /// Vehicle unit only
    pub odometer_midnight_km: Option<u32>,
    /// Transitions as recorded, anomalies flagged
    pub changes: Vec<ActivityChange>,
    /// Per-slot periods derived from the transitions
    pub segments: Vec<ActivitySegment>,
}

/// A period of one activity in one slot, `start..end` in minutes of the day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivitySegment {
    pub slot: Slot,
    pub activity: Activity,
    pub crew: bool,
    pub card_inserted: bool,
    pub start_minute: u16,
    /// Exclusive; 1440 for a period running to the end of the day
    pub end_minute: u16,
}

impl ActivitySegment {
    pub fn duration_minutes(&self) -> u16 {
        self.end_minute - self.start_minute
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Calibration {
    pub purpose: CalibrationPurpose,
    pub workshop_name: String,
    pub workshop_address: String,
    pub workshop_card: Option<FullCardNumber>,
    pub workshop_card_expiry: Option<Timestamp>,
    pub vin: String,
    pub registration: VehicleRegistration,
    pub w_characteristic: u16,
    pub k_constant: u16,
    pub tyre_circumference_mm: f64,
    pub tyre_size: String,
    pub authorised_speed_kmh: u8,
    pub old_odometer_km: u32,
    pub new_odometer_km: u32,
    pub old_time: Option<Timestamp>,
    pub new_time: Option<Timestamp>,
    pub next_calibration: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyAlgorithm {
    Rsa,
    Ecc,
}

/// Certificate structure summary; never verified
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Certificate {
    pub role: CertificateRole,
    pub algorithm: KeyAlgorithm,
    pub key_bits: Option<u16>,
    pub curve: Option<String>,
    /// Certification authority that signed the certificate
    pub authority: Option<String>,
    pub holder: Option<String>,
    pub effective: Option<Timestamp>,
    pub expiry: Option<Timestamp>,
}

/// GNSS position in decimal degrees
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub time: Option<Timestamp>,
    pub accuracy: u8,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Place {
    pub time: Option<Timestamp>,
    pub entry_type: PlaceEntryType,
    pub country: Nation,
    pub region: u8,
    pub odometer_km: u32,
    pub position: Option<Position>,
    pub card: Option<FullCardNumber>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GnssDrivingPosition {
    pub time: Option<Timestamp>,
    pub position: Option<Position>,
    pub odometer_km: u32,
    pub driver_card: Option<FullCardNumber>,
    pub codriver_card: Option<FullCardNumber>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryCrossing {
    pub country_left: Nation,
    pub country_entered: Nation,
    pub position: Option<Position>,
    /// Position authenticated by the GNSS receiver
    pub authenticated: bool,
    pub odometer_km: u32,
}

/// Download status: last download, and for vehicle units the downloadable window
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DownloadInfo {
    pub last_download: Option<Timestamp>,
    pub last_download_company: Option<String>,
    pub last_download_card: Option<FullCardNumber>,
    pub current_time: Option<Timestamp>,
    pub downloadable_from: Option<Timestamp>,
    pub downloadable_to: Option<Timestamp>,
    pub card_slots: Option<CardSlots>,
}
