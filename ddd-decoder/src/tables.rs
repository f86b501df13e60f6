//! Code lookup tables
//!
//! Enumerated codes from the tachograph data dictionary. Every lookup is
//! total: a code missing from a table resolves to an `Unknown(code)` value
//! instead of an error, so a new or manufacturer-specific code never stops a
//! record from decoding.

use serde::Serialize;
use std::fmt;

/// Event and fault type codes (`EventFaultType`)
const EVENT_FAULT_TYPES: &[(u8, &str)] = &[
    (0x00, "No further details"),
    (0x01, "Insertion of a non-valid card"),
    (0x02, "Card conflict"),
    (0x03, "Time overlap"),
    (0x04, "Driving without an appropriate card"),
    (0x05, "Card insertion while driving"),
    (0x06, "Last card session not correctly closed"),
    (0x07, "Over speeding"),
    (0x08, "Power supply interruption"),
    (0x09, "Motion data error"),
    (0x0A, "Vehicle motion conflict"),
    (0x0B, "Time conflict (GNSS versus VU internal clock)"),
    (0x0C, "Communication error with the remote communication facility"),
    (0x0D, "Absence of position information from GNSS receiver"),
    (0x0E, "Communication error with the external GNSS facility"),
    (0x10, "Security breach attempt, no further details"),
    (0x11, "Motion sensor authentication failure"),
    (0x12, "Tachograph card authentication failure"),
    (0x13, "Unauthorised change of motion sensor"),
    (0x14, "Card data input integrity error"),
    (0x15, "Stored user data integrity error"),
    (0x16, "Internal data transfer error"),
    (0x17, "Unauthorised case opening"),
    (0x18, "Hardware sabotage"),
    (0x19, "Tamper detection of GNSS"),
    (0x1A, "External GNSS facility authentication failure"),
    (0x1B, "External GNSS facility certificate expired"),
    (0x20, "Sensor fault, no further details"),
    (0x21, "Sensor authentication failure"),
    (0x22, "Sensor stored data integrity error"),
    (0x23, "Sensor internal data transfer error"),
    (0x24, "Sensor unauthorised case opening"),
    (0x25, "Sensor hardware sabotage"),
    (0x30, "Recording equipment fault, no further details"),
    (0x31, "VU internal fault"),
    (0x32, "Printer fault"),
    (0x33, "Display fault"),
    (0x34, "Downloading fault"),
    (0x35, "Sensor fault"),
    (0x36, "Internal GNSS receiver fault"),
    (0x37, "External GNSS facility fault"),
    (0x38, "Remote communication facility fault"),
    (0x39, "ITS interface fault"),
    (0x40, "Card fault, no further details"),
];

/// Numeric nation codes (`NationNumeric`) and their distinguishing signs
const NATIONS: &[(u8, &str)] = &[
    (0x00, ""),
    (0x01, "A"),
    (0x02, "AL"),
    (0x03, "AND"),
    (0x04, "ARM"),
    (0x05, "AZ"),
    (0x06, "B"),
    (0x07, "BG"),
    (0x08, "BIH"),
    (0x09, "BY"),
    (0x0A, "CH"),
    (0x0B, "CY"),
    (0x0C, "CZ"),
    (0x0D, "D"),
    (0x0E, "DK"),
    (0x0F, "E"),
    (0x10, "EST"),
    (0x11, "F"),
    (0x12, "FIN"),
    (0x13, "FL"),
    (0x14, "FO"),
    (0x15, "UK"),
    (0x16, "GE"),
    (0x17, "GR"),
    (0x18, "H"),
    (0x19, "HR"),
    (0x1A, "I"),
    (0x1B, "IRL"),
    (0x1C, "IS"),
    (0x1D, "KZ"),
    (0x1E, "L"),
    (0x1F, "LT"),
    (0x20, "LV"),
    (0x21, "M"),
    (0x22, "MC"),
    (0x23, "MD"),
    (0x24, "MK"),
    (0x25, "N"),
    (0x26, "NL"),
    (0x27, "P"),
    (0x28, "PL"),
    (0x29, "RO"),
    (0x2A, "RSM"),
    (0x2B, "RUS"),
    (0x2C, "S"),
    (0x2D, "SK"),
    (0x2E, "SLO"),
    (0x2F, "TM"),
    (0x30, "TR"),
    (0x31, "UA"),
    (0x32, "V"),
    (0x33, "YU"),
    (0x34, "MNE"),
    (0x35, "SRB"),
    (0x36, "UZ"),
    (0x37, "TJ"),
    (0xFD, "EC"),
    (0xFE, "EUR"),
    (0xFF, "WLD"),
];

/// Resolved event or fault type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventFaultType {
    Known { code: u8, label: &'static str },
    Unknown(u8),
}

impl EventFaultType {
    pub fn from_code(code: u8) -> Self {
        lookup(EVENT_FAULT_TYPES, code)
            .map(|label| EventFaultType::Known { code, label })
            .unwrap_or(EventFaultType::Unknown(code))
    }

    pub fn code(&self) -> u8 {
        match self {
            EventFaultType::Known { code, .. } => *code,
            EventFaultType::Unknown(code) => *code,
        }
    }

    /// General events and security breach attempts, 0x00 to 0x2F
    pub fn is_event_code(&self) -> bool {
        self.code() < 0x30
    }

    /// Recording equipment and card faults, 0x30 to 0x4F
    pub fn is_fault_code(&self) -> bool {
        (0x30..=0x4F).contains(&self.code())
    }
}

impl fmt::Display for EventFaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventFaultType::Known { label, .. } => write!(f, "{}", label),
            EventFaultType::Unknown(code) => write!(f, "Unknown (0x{:02X})", code),
        }
    }
}

/// Issuing or registering nation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Nation {
    pub code: u8,
    /// Distinguishing sign, `None` for codes missing from the table
    pub sign: Option<&'static str>,
}

impl Nation {
    pub fn from_code(code: u8) -> Self {
        Self {
            code,
            sign: lookup(NATIONS, code),
        }
    }
}

impl fmt::Display for Nation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sign {
            Some(sign) => write!(f, "{}", sign),
            None => write!(f, "0x{:02X}", self.code),
        }
    }
}

/// Equipment type of a card or device (`EquipmentType`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CardType {
    Reserved,
    DriverCard,
    WorkshopCard,
    ControlCard,
    CompanyCard,
    ManufacturingCard,
    VehicleUnit,
    MotionSensor,
    Unknown(u8),
}

impl CardType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => CardType::Reserved,
            1 => CardType::DriverCard,
            2 => CardType::WorkshopCard,
            3 => CardType::ControlCard,
            4 => CardType::CompanyCard,
            5 => CardType::ManufacturingCard,
            6 => CardType::VehicleUnit,
            7 => CardType::MotionSensor,
            other => CardType::Unknown(other),
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardType::Reserved => write!(f, "Reserved"),
            CardType::DriverCard => write!(f, "Driver Card"),
            CardType::WorkshopCard => write!(f, "Workshop Card"),
            CardType::ControlCard => write!(f, "Control Card"),
            CardType::CompanyCard => write!(f, "Company Card"),
            CardType::ManufacturingCard => write!(f, "Manufacturing Card"),
            CardType::VehicleUnit => write!(f, "Vehicle Unit"),
            CardType::MotionSensor => write!(f, "Motion Sensor"),
            CardType::Unknown(code) => write!(f, "Unknown ({})", code),
        }
    }
}

/// Specific condition types (out of scope, ferry/train crossing)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpecificConditionType {
    OutOfScopeBegin,
    OutOfScopeEnd,
    FerryTrainCrossingBegin,
    FerryTrainCrossingEnd,
    Unknown(u8),
}

impl SpecificConditionType {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => SpecificConditionType::OutOfScopeBegin,
            2 => SpecificConditionType::OutOfScopeEnd,
            3 => SpecificConditionType::FerryTrainCrossingBegin,
            4 => SpecificConditionType::FerryTrainCrossingEnd,
            other => SpecificConditionType::Unknown(other),
        }
    }
}

/// Calibration purpose codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CalibrationPurpose {
    Reserved,
    Activation,
    FirstInstallation,
    Installation,
    PeriodicInspection,
    VrnEntryByCompany,
    TimeAdjustmentWithoutCalibration,
    Unknown(u8),
}

impl CalibrationPurpose {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => CalibrationPurpose::Reserved,
            1 => CalibrationPurpose::Activation,
            2 => CalibrationPurpose::FirstInstallation,
            3 => CalibrationPurpose::Installation,
            4 => CalibrationPurpose::PeriodicInspection,
            5 => CalibrationPurpose::VrnEntryByCompany,
            6 => CalibrationPurpose::TimeAdjustmentWithoutCalibration,
            other => CalibrationPurpose::Unknown(other),
        }
    }
}

/// Place entry types (`EntryTypeDailyWorkPeriod`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaceEntryType {
    BeginRelatedTimeCardInsertion,
    EndRelatedTimeCardWithdrawal,
    BeginRelatedTimeManualEntry,
    EndRelatedTimeManualEntry,
    BeginRelatedTimeAssumedByVu,
    EndRelatedTimeAssumedByVu,
    Unknown(u8),
}

impl PlaceEntryType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => PlaceEntryType::BeginRelatedTimeCardInsertion,
            1 => PlaceEntryType::EndRelatedTimeCardWithdrawal,
            2 => PlaceEntryType::BeginRelatedTimeManualEntry,
            3 => PlaceEntryType::EndRelatedTimeManualEntry,
            4 => PlaceEntryType::BeginRelatedTimeAssumedByVu,
            5 => PlaceEntryType::EndRelatedTimeAssumedByVu,
            other => PlaceEntryType::Unknown(other),
        }
    }
}

fn lookup(table: &'static [(u8, &'static str)], code: u8) -> Option<&'static str> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == code)
        .map(|(_, label)| *label)
}
