//! Part validation
//!
//! Groups the dispatched blocks by the structural part they belong to and
//! gives every part expected for the source kind one verdict: Valid, Invalid
//! or Missing. Validation only annotates; it never stops or changes decoding.

use crate::dispatcher::{DecodedBlock, Dispatch};
use crate::records::{
    IdentificationRecord, RecordKind, BORDER_CROSSING_RECORD_LEN, GNSS_PLACE_RECORD_LEN,
    VEHICLE_UNIT_RECORD_LEN,
};
use crate::tlv::SIGNATURE_LENGTHS;
use crate::types::{Generation, Issue, IssueKind, SourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Signature length of Gen1 card EFs (RSA 1024)
const GEN1_SIGNATURE_LEN: usize = 128;

/// Newest-record pointer in front of the Gen2 cyclic card EFs
const RECORD_POINTER_LEN: usize = 2;

/// Structural parts of a tachograph file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PartId {
    /// Block framing of the whole file
    FileStructure,
    // Driver card
    CardIcc,
    CardIc,
    ApplicationIdentification,
    Identification,
    DrivingLicence,
    Events,
    Faults,
    DriverActivity,
    VehiclesUsed,
    Places,
    CurrentUsage,
    ControlActivity,
    SpecificConditions,
    CardDownload,
    VehicleUnitsUsed,
    GnssPlaces,
    BorderCrossings,
    CardCertificate,
    CaCertificate,
    // Vehicle unit
    DownloadInterfaceVersion,
    Overview,
    Activities,
    EventsAndFaults,
    DetailedSpeed,
    TechnicalData,
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PartId::FileStructure => "File structure",
            PartId::CardIcc => "Card ICC",
            PartId::CardIc => "Card IC",
            PartId::ApplicationIdentification => "Application identification",
            PartId::Identification => "Identification",
            PartId::DrivingLicence => "Driving licence",
            PartId::Events => "Events",
            PartId::Faults => "Faults",
            PartId::DriverActivity => "Driver activity",
            PartId::VehiclesUsed => "Vehicles used",
            PartId::Places => "Places",
            PartId::CurrentUsage => "Current usage",
            PartId::ControlActivity => "Control activity",
            PartId::SpecificConditions => "Specific conditions",
            PartId::CardDownload => "Card download",
            PartId::VehicleUnitsUsed => "Vehicle units used",
            PartId::GnssPlaces => "GNSS places",
            PartId::BorderCrossings => "Border crossings",
            PartId::CardCertificate => "Card certificate",
            PartId::CaCertificate => "CA certificate",
            PartId::DownloadInterfaceVersion => "Download interface version",
            PartId::Overview => "Overview",
            PartId::Activities => "Activities",
            PartId::EventsAndFaults => "Events and faults",
            PartId::DetailedSpeed => "Detailed speed",
            PartId::TechnicalData => "Technical data",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartStatus {
    Valid,
    Invalid,
    Missing,
}

/// Verdict for one part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub part: PartId,
    pub status: PartStatus,
    pub mandatory: bool,
    /// Findings in stream order, errors and warnings alike
    pub reasons: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.status == PartStatus::Valid
    }
}

/// Presence, length and signature rules of one part
#[derive(Debug, Clone, Copy)]
struct PartRule {
    part: PartId,
    mandatory: bool,
    min_len: Option<usize>,
    max_len: Option<usize>,
    /// Card EF covered by a signature block
    signed: bool,
    /// More than one data block is expected (VU activities, one per day)
    repeatable: bool,
    /// Pointer followed by whole records of this size
    record_len: Option<usize>,
}

impl PartRule {
    const fn new(part: PartId, mandatory: bool) -> Self {
        Self {
            part,
            mandatory,
            min_len: None,
            max_len: None,
            signed: false,
            repeatable: false,
            record_len: None,
        }
    }

    const fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    const fn min(mut self, len: usize) -> Self {
        self.min_len = Some(len);
        self
    }

    const fn range(mut self, min: usize, max: usize) -> Self {
        self.min_len = Some(min);
        self.max_len = Some(max);
        self
    }

    const fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    /// Cyclic EF: a pointer and at least one record
    const fn cyclic(mut self, record_len: usize) -> Self {
        self.record_len = Some(record_len);
        self.min_len = Some(RECORD_POINTER_LEN + record_len);
        self
    }
}

fn rules(source: SourceKind, generation: Generation) -> Vec<PartRule> {
    use PartId::*;

    match source {
        SourceKind::DriverCard => {
            let activity = match generation {
                Generation::Gen1 => PartRule::new(DriverActivity, true).signed().range(5548, 13780),
                Generation::Gen2 => PartRule::new(DriverActivity, true).signed().min(4),
            };
            let mut rules = vec![
                PartRule::new(CardIcc, false),
                PartRule::new(CardIc, false),
                PartRule::new(ApplicationIdentification, true).signed().min(10),
                PartRule::new(Identification, true).signed().min(143),
                PartRule::new(DrivingLicence, true).signed().min(53),
                PartRule::new(Events, true).signed(),
                PartRule::new(Faults, true).signed(),
                activity,
                PartRule::new(VehiclesUsed, true).signed(),
                PartRule::new(Places, true).signed(),
                PartRule::new(CurrentUsage, true).signed(),
                PartRule::new(ControlActivity, true).signed(),
                PartRule::new(SpecificConditions, true).signed(),
                PartRule::new(CardDownload, false).signed(),
            ];
            if generation == Generation::Gen2 {
                rules.push(PartRule::new(VehicleUnitsUsed, true).signed().cyclic(VEHICLE_UNIT_RECORD_LEN));
                rules.push(PartRule::new(GnssPlaces, true).signed().cyclic(GNSS_PLACE_RECORD_LEN));
                rules.push(PartRule::new(BorderCrossings, false).signed().cyclic(BORDER_CROSSING_RECORD_LEN));
            }
            rules.push(PartRule::new(CardCertificate, true));
            rules.push(PartRule::new(CaCertificate, true));
            rules
        }
        SourceKind::VehicleUnit => vec![
            PartRule::new(DownloadInterfaceVersion, false),
            PartRule::new(Overview, true),
            PartRule::new(Activities, false).repeatable(),
            PartRule::new(EventsAndFaults, false),
            PartRule::new(DetailedSpeed, false),
            PartRule::new(TechnicalData, false),
        ],
    }
}

/// Record count the card's application identification declares for a cyclic EF
fn declared_records(dispatch: &Dispatch, part: PartId) -> Option<usize> {
    let app = dispatch.records().find_map(|record| match &record.kind {
        RecordKind::Identification(IdentificationRecord::Application(app)) => Some(app),
        _ => None,
    })?;
    let count = match part {
        PartId::VehicleUnitsUsed => app.vehicle_unit_records,
        PartId::GnssPlaces => app.gnss_records,
        _ => None,
    }?;
    Some(count as usize)
}

fn signature_len_ok(generation: Generation, len: usize) -> bool {
    match generation {
        Generation::Gen1 => len == GEN1_SIGNATURE_LEN,
        Generation::Gen2 => SIGNATURE_LENGTHS.contains(&len),
    }
}

/// Verdicts plus the issues the validator itself raised
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub results: Vec<ValidationResult>,
    pub issues: Vec<Issue>,
}

/// Validate every part expected for the file's source kind
pub fn validate(dispatch: &Dispatch) -> Validation {
    let mut validation = Validation::default();
    validation.results.push(file_structure(dispatch));

    for rule in rules(dispatch.source, dispatch.generation) {
        let result = validate_part(dispatch, &rule, &mut validation.issues);
        log::debug!("{}: {:?}", result.part, result.status);
        validation.results.push(result);
    }
    validation
}

/// Framing problems, plus blocks that belong to no part
fn file_structure(dispatch: &Dispatch) -> ValidationResult {
    let mut reasons: Vec<String> = dispatch.issues.iter().map(|i| i.to_string()).collect();
    let mut invalid = dispatch.issues.iter().any(|i| i.kind == IssueKind::TrailingBytes);

    for block in &dispatch.blocks {
        if block.truncated {
            invalid = true;
            reasons.push(format!(
                "block 0x{:04X} @{} truncated: {} bytes declared",
                block.tag, block.offset, block.declared_length
            ));
        }
        if block.part.is_none() {
            reasons.extend(block.issues.iter().map(|i| i.to_string()));
        }
    }

    ValidationResult {
        part: PartId::FileStructure,
        status: if invalid { PartStatus::Invalid } else { PartStatus::Valid },
        mandatory: true,
        reasons,
    }
}

fn validate_part(dispatch: &Dispatch, rule: &PartRule, issues: &mut Vec<Issue>) -> ValidationResult {
    let blocks: Vec<&DecodedBlock> = dispatch
        .blocks
        .iter()
        .filter(|b| b.part == Some(rule.part))
        .collect();
    let data: Vec<&DecodedBlock> = blocks.iter().copied().filter(|b| !b.is_signature).collect();

    if data.is_empty() {
        let mut reasons = vec![format!("no {} block", rule.part)];
        if rule.mandatory {
            issues.push(Issue::warning(
                IssueKind::MissingPart,
                format!("mandatory part {} is missing", rule.part),
            ));
        }
        if blocks.iter().any(|b| b.is_signature) {
            reasons.push("signature block without data block".to_string());
        }
        return ValidationResult {
            part: rule.part,
            status: PartStatus::Missing,
            mandatory: rule.mandatory,
            reasons,
        };
    }

    // Issues the validator raises for this part
    let mut raised = Vec::new();

    if data.len() > 1 && !rule.repeatable {
        for duplicate in &data[1..] {
            raised.push(
                Issue::error(IssueKind::LengthMismatch, format!("duplicate {} block", rule.part))
                    .at(duplicate.offset)
                    .in_block(duplicate.tag),
            );
        }
    }

    for block in &data {
        let len = block.declared_length;
        let too_short = rule.min_len.map_or(false, |min| len < min);
        let too_long = rule.max_len.map_or(false, |max| len > max);
        if too_short || too_long {
            raised.push(
                Issue::error(
                    IssueKind::LengthMismatch,
                    format!(
                        "{} bytes outside the allowed length {}..{}",
                        len,
                        rule.min_len.unwrap_or(0),
                        rule.max_len.map(|m| m.to_string()).unwrap_or_default()
                    ),
                )
                .at(block.offset)
                .in_block(block.tag),
            );
        }
    }

    if let Some(record_len) = rule.record_len {
        let declared = declared_records(dispatch, rule.part);
        for block in &data {
            let records_len = block.declared_length.saturating_sub(RECORD_POINTER_LEN);
            if records_len % record_len != 0 {
                raised.push(
                    Issue::error(
                        IssueKind::LengthMismatch,
                        format!("{} record bytes are not a whole number of {}-byte records", records_len, record_len),
                    )
                    .at(block.offset)
                    .in_block(block.tag),
                );
            } else if let Some(declared) = declared.filter(|n| *n != records_len / record_len) {
                raised.push(
                    Issue::warning(
                        IssueKind::LengthMismatch,
                        format!(
                            "{} records stored, application identification declares {}",
                            records_len / record_len,
                            declared
                        ),
                    )
                    .at(block.offset)
                    .in_block(block.tag),
                );
            }
        }
    }

    if rule.signed {
        let signatures: Vec<&DecodedBlock> = blocks.iter().copied().filter(|b| b.is_signature).collect();
        match signatures.first() {
            None => raised.push(
                Issue::error(IssueKind::ChecksumMismatch, "signature block missing")
                    .at(data[0].offset)
                    .in_block(data[0].tag),
            ),
            Some(sig) if !signature_len_ok(dispatch.generation, sig.declared_length) => raised.push(
                Issue::error(
                    IssueKind::ChecksumMismatch,
                    format!("signature of {} bytes", sig.declared_length),
                )
                .at(sig.offset)
                .in_block(sig.tag),
            ),
            Some(_) => {}
        }
    }

    let block_issues = blocks.iter().flat_map(|b| b.issues.iter());
    let invalid = block_issues.clone().any(|i| i.is_error()) || raised.iter().any(|i| i.is_error());
    let reasons = block_issues.chain(raised.iter()).map(|i| i.to_string()).collect();
    issues.extend(raised);

    ValidationResult {
        part: rule.part,
        status: if invalid { PartStatus::Invalid } else { PartStatus::Valid },
        mandatory: rule.mandatory,
        reasons,
    }
}
