//! Normalizer: decoded records to [`UnifiedDocument`]
//!
//! Every unit or shape that differs between sources is resolved through one
//! [`Conventions`] entry, looked up once per document by `(source, generation)`.
//! The record-to-field mapping below never branches on generation.

use crate::document::{
    ActivitySegment, Calibration, CardHolder, Certificate, CountryCrossing, DayActivity, DownloadInfo,
    GnssDrivingPosition, Identification, KeyAlgorithm, Licence, Place, Position, UnifiedDocument,
    VehicleInfo, VehicleUnitInfo,
};
use crate::records::{
    ActivityChange, ActivityDay, BorderCrossing, CalibrationRecord, CertificateRecord, FullCardNumber,
    GnssAccumulatedDriving, GnssPlace, IdentificationRecord, PlaceRecord, PublicKey, Record, RecordKind,
    Slot, TimelineAnomaly,
};
use crate::types::{Generation, SourceKind};
use crate::validator::ValidationResult;

/// Minutes in a day; end of the last segment
pub const DAY_END: u16 = 1440;

/// Stored odometer unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OdometerUnit {
    Kilometres,
}

impl OdometerUnit {
    pub fn to_km(self, value: u32) -> u32 {
        match self {
            OdometerUnit::Kilometres => value,
        }
    }
}

/// Stored unit of the effective tyre circumference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TyreUnit {
    /// 1/8 mm (`L-TyreCircumference`)
    EighthMillimetre,
}

impl TyreUnit {
    pub fn to_mm(self, value: u16) -> f64 {
        match self {
            TyreUnit::EighthMillimetre => value as f64 / 8.0,
        }
    }
}

/// Stored encoding of GNSS coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateEncoding {
    /// The source records no positions
    None,
    /// `±DDMM.M * 10` as a signed 24-bit integer
    DegreesMinutesTenths,
}

/// "Position unknown" marker of the 24-bit coordinate fields
const COORDINATE_UNKNOWN: i32 = 0x7F_FFFF;

impl CoordinateEncoding {
    /// Decimal degrees, `None` for an unknown or malformed value
    pub fn to_degrees(self, raw: i32) -> Option<f64> {
        match self {
            CoordinateEncoding::None => None,
            CoordinateEncoding::DegreesMinutesTenths => {
                if raw == COORDINATE_UNKNOWN || raw == -COORDINATE_UNKNOWN - 1 {
                    return None;
                }
                let abs = raw.unsigned_abs();
                let degrees = (abs / 1000) as f64;
                let minutes = (abs % 1000) as f64 / 10.0;
                if minutes >= 60.0 {
                    return None;
                }
                let value = degrees + minutes / 60.0;
                Some(if raw < 0 { -value } else { value })
            }
        }
    }
}

/// Layout of card numbers inside records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardNumberShape {
    /// Type, nation, 16 characters
    Plain,
    /// Plain plus the card generation byte
    WithGeneration,
}

/// Layout of certificates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateShape {
    /// 194-byte RSA certificate
    Rsa1024,
    /// BER-TLV ECC certificate
    EccTlv,
}

/// Per-source encoding conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conventions {
    pub odometer: OdometerUnit,
    pub tyre: TyreUnit,
    pub coordinates: CoordinateEncoding,
    pub card_number: CardNumberShape,
    pub certificate: CertificateShape,
}

const GEN1: Conventions = Conventions {
    odometer: OdometerUnit::Kilometres,
    tyre: TyreUnit::EighthMillimetre,
    coordinates: CoordinateEncoding::None,
    card_number: CardNumberShape::Plain,
    certificate: CertificateShape::Rsa1024,
};

const GEN2: Conventions = Conventions {
    odometer: OdometerUnit::Kilometres,
    tyre: TyreUnit::EighthMillimetre,
    coordinates: CoordinateEncoding::DegreesMinutesTenths,
    card_number: CardNumberShape::WithGeneration,
    certificate: CertificateShape::EccTlv,
};

static CONVENTIONS: &[((SourceKind, Generation), Conventions)] = &[
    ((SourceKind::DriverCard, Generation::Gen1), GEN1),
    ((SourceKind::DriverCard, Generation::Gen2), GEN2),
    ((SourceKind::VehicleUnit, Generation::Gen1), GEN1),
    ((SourceKind::VehicleUnit, Generation::Gen2), GEN2),
];

impl Conventions {
    pub fn lookup(source: SourceKind, generation: Generation) -> Conventions {
        CONVENTIONS
            .iter()
            .find(|(key, _)| *key == (source, generation))
            .map(|(_, conventions)| *conventions)
            .unwrap_or(GEN1)
    }

    fn card(&self, card: &Option<FullCardNumber>) -> Option<FullCardNumber> {
        let mut card = card.clone()?;
        if self.card_number == CardNumberShape::Plain {
            card.card_generation = None;
        }
        Some(card)
    }

    fn position(&self, place: &GnssPlace) -> Option<Position> {
        Some(Position {
            time: place.time,
            accuracy: place.accuracy,
            latitude: self.coordinates.to_degrees(place.latitude)?,
            longitude: self.coordinates.to_degrees(place.longitude)?,
        })
    }

    fn day(&self, day: &ActivityDay) -> DayActivity {
        DayActivity {
            date: day.date,
            presence_counter: day.presence_counter.clone(),
            distance_km: day.distance_km.map(|d| self.odometer.to_km(d as u32)),
            odometer_midnight_km: day.odometer_midnight_km.map(|o| self.odometer.to_km(o)),
            changes: day.changes.clone(),
            segments: segments(&day.changes),
        }
    }

    fn place(&self, place: &PlaceRecord) -> Place {
        Place {
            time: place.entry_time,
            entry_type: place.entry_type,
            country: place.country,
            region: place.region,
            odometer_km: self.odometer.to_km(place.odometer_km),
            position: place.gnss.as_ref().and_then(|g| self.position(g)),
            card: self.card(&place.card),
        }
    }

    fn gnss_driving(&self, record: &GnssAccumulatedDriving) -> GnssDrivingPosition {
        GnssDrivingPosition {
            time: record.time,
            position: self.position(&record.place),
            odometer_km: self.odometer.to_km(record.odometer_km),
            driver_card: self.card(&record.driver_card),
            codriver_card: self.card(&record.codriver_card),
        }
    }

    fn border_crossing(&self, record: &BorderCrossing) -> CountryCrossing {
        CountryCrossing {
            country_left: record.country_left,
            country_entered: record.country_entered,
            position: self.position(&record.place),
            authenticated: record.authenticated,
            odometer_km: self.odometer.to_km(record.odometer_km),
        }
    }

    fn calibration(&self, record: &CalibrationRecord) -> Calibration {
        Calibration {
            purpose: record.purpose,
            workshop_name: record.workshop_name.text.clone(),
            workshop_address: record.workshop_address.text.clone(),
            workshop_card: self.card(&record.workshop_card),
            workshop_card_expiry: record.workshop_card_expiry,
            vin: record.vin.clone(),
            registration: record.registration.clone(),
            w_characteristic: record.w_characteristic,
            k_constant: record.k_constant,
            tyre_circumference_mm: self.tyre.to_mm(record.l_tyre_circumference),
            tyre_size: record.tyre_size.clone(),
            authorised_speed_kmh: record.authorised_speed_kmh,
            old_odometer_km: self.odometer.to_km(record.old_odometer_km),
            new_odometer_km: self.odometer.to_km(record.new_odometer_km),
            old_time: record.old_time,
            new_time: record.new_time,
            next_calibration: record.next_calibration,
        }
    }

    fn certificate(&self, record: &CertificateRecord) -> Certificate {
        let (algorithm, key_bits, curve) = match (&record.public_key, self.certificate) {
            (PublicKey::Rsa { .. }, CertificateShape::Rsa1024) => (KeyAlgorithm::Rsa, Some(1024), None),
            (PublicKey::Rsa { .. }, _) => (KeyAlgorithm::Rsa, None, None),
            (PublicKey::Ecc { domain_oid, curve, point_len }, _) => {
                // Uncompressed point: 04 || X || Y
                let bits = (*point_len > 1).then(|| ((point_len - 1) / 2 * 8) as u16);
                let curve = curve.map(str::to_string).unwrap_or_else(|| domain_oid.clone());
                (KeyAlgorithm::Ecc, bits, Some(curve))
            }
        };
        Certificate {
            role: record.role,
            algorithm,
            key_bits,
            curve,
            authority: record.authority_reference.as_ref().map(|a| {
                format!(
                    "{} {:02X} {} {:02X}",
                    a.nation_alpha, a.key_serial, a.additional_info, a.ca_identifier
                )
            }),
            holder: record.holder_reference.clone(),
            effective: record.effective,
            expiry: record.expiry,
        }
    }
}

/// Derive per-slot activity periods from the transitions of one day
///
/// Transitions are ordered by minute within each slot (stable, so equal
/// minutes keep their recorded order). A period lasts until the next
/// transition of the same slot or the end of the day; zero-length periods are
/// dropped. Out-of-range minutes cannot be placed on the day and are left out.
pub fn segments(changes: &[ActivityChange]) -> Vec<ActivitySegment> {
    let mut out = Vec::new();
    for slot in [Slot::Driver, Slot::CoDriver] {
        let mut slot_changes: Vec<&ActivityChange> = changes
            .iter()
            .filter(|c| c.slot == slot && c.anomaly != Some(TimelineAnomaly::OutOfRange))
            .collect();
        slot_changes.sort_by_key(|c| c.minute);

        for (i, change) in slot_changes.iter().enumerate() {
            let end = slot_changes.get(i + 1).map_or(DAY_END, |next| next.minute);
            if end > change.minute {
                out.push(ActivitySegment {
                    slot,
                    activity: change.activity,
                    crew: change.crew,
                    card_inserted: change.card_inserted,
                    start_minute: change.minute,
                    end_minute: end,
                });
            }
        }
    }
    out
}

/// Build the unified document from decoded records
///
/// Records are taken in stream order. Validation results are attached as
/// given.
pub fn normalize<'a, I>(
    records: I,
    validation: Vec<ValidationResult>,
    source: SourceKind,
    generation: Generation,
) -> UnifiedDocument
where
    I: IntoIterator<Item = &'a Record>,
{
    let conventions = Conventions::lookup(source, generation);
    log::trace!("Normalizing {} {} records with {:?}", source, generation, conventions);

    let mut doc = UnifiedDocument {
        source_kind: source,
        generation,
        identification: Identification::default(),
        activities: Vec::new(),
        events: Vec::new(),
        faults: Vec::new(),
        overspeedings: Vec::new(),
        overspeed_control: None,
        calibrations: Vec::new(),
        certificates: Vec::new(),
        vehicles_used: Vec::new(),
        vehicle_units_used: Vec::new(),
        places: Vec::new(),
        gnss_accumulated_driving: Vec::new(),
        border_crossings: Vec::new(),
        specific_conditions: Vec::new(),
        control_activities: Vec::new(),
        company_locks: Vec::new(),
        card_sessions: Vec::new(),
        time_adjustments: Vec::new(),
        speed_blocks: Vec::new(),
        current_usage: None,
        download: None,
        unknown: Vec::new(),
        validation,
    };
    let mut holder: Option<CardHolder> = None;

    for record in records {
        match &record.kind {
            RecordKind::Identification(section) => {
                apply_identification(&mut doc, &mut holder, section, &conventions)
            }
            RecordKind::ActivityDay(day) => doc.activities.push(conventions.day(day)),
            RecordKind::Event(event) => doc.events.push(event.clone()),
            RecordKind::Fault(fault) => doc.faults.push(fault.clone()),
            RecordKind::OverspeedControl(control) => doc.overspeed_control = Some(control.clone()),
            RecordKind::Overspeeding(overspeeding) => doc.overspeedings.push(overspeeding.clone()),
            RecordKind::Calibration(calibration) => doc.calibrations.push(conventions.calibration(calibration)),
            RecordKind::Certificate(certificate) => doc.certificates.push(conventions.certificate(certificate)),
            RecordKind::VehicleUsed(vehicle) => {
                let mut vehicle = vehicle.clone();
                vehicle.odometer_begin_km = conventions.odometer.to_km(vehicle.odometer_begin_km);
                vehicle.odometer_end_km = conventions.odometer.to_km(vehicle.odometer_end_km);
                doc.vehicles_used.push(vehicle);
            }
            RecordKind::VehicleUnitUsed(unit) => doc.vehicle_units_used.push(unit.clone()),
            RecordKind::Place(place) => doc.places.push(conventions.place(place)),
            RecordKind::GnssAccumulatedDriving(record) => {
                doc.gnss_accumulated_driving.push(conventions.gnss_driving(record))
            }
            RecordKind::BorderCrossing(crossing) => doc.border_crossings.push(conventions.border_crossing(crossing)),
            RecordKind::SpecificCondition(condition) => doc.specific_conditions.push(condition.clone()),
            RecordKind::ControlActivity(control) => doc.control_activities.push(control.clone()),
            RecordKind::CompanyLock(lock) => doc.company_locks.push(lock.clone()),
            RecordKind::CardSession(session) => doc.card_sessions.push(session.clone()),
            RecordKind::TimeAdjustment(adjustment) => doc.time_adjustments.push(adjustment.clone()),
            RecordKind::SpeedBlock(block) => doc.speed_blocks.push(block.clone()),
            RecordKind::CurrentUsage(usage) => doc.current_usage = Some(usage.clone()),
            RecordKind::CardDownload(download) => {
                doc.download.get_or_insert_with(DownloadInfo::default).last_download = download.last_download;
            }
            RecordKind::DownloadInterfaceVersion(version) => {
                log::trace!("Download interface version {:?}", version);
            }
            RecordKind::RawUnknown(raw) => doc.unknown.push(raw.clone()),
        }
    }

    doc.identification.card = holder;
    doc
}

fn apply_identification(
    doc: &mut UnifiedDocument,
    holder: &mut Option<CardHolder>,
    section: &IdentificationRecord,
    conventions: &Conventions,
) {
    match section {
        IdentificationRecord::CardIcc(icc) => {
            holder.get_or_insert_with(CardHolder::default).icc = Some(icc.clone());
        }
        IdentificationRecord::CardIc(ic) => {
            holder.get_or_insert_with(CardHolder::default).ic = Some(ic.clone());
        }
        IdentificationRecord::Application(app) => {
            holder.get_or_insert_with(CardHolder::default).card_type = Some(app.card_type);
        }
        IdentificationRecord::Card(card) => {
            let h = holder.get_or_insert_with(CardHolder::default);
            h.card_number = Some(card.card_number.clone());
            h.issuing_nation = Some(card.issuing_nation);
            h.issuing_authority = Some(card.issuing_authority.text.clone());
            h.issue_date = card.issue_date;
            h.validity_begin = card.validity_begin;
            h.expiry_date = card.expiry_date;
            h.surname = Some(card.holder_surname.text.clone());
            h.first_names = Some(card.holder_first_names.text.clone());
            h.birth_date = card.birth_date;
            h.preferred_language = Some(card.preferred_language.clone());
        }
        IdentificationRecord::DrivingLicence(licence) => {
            holder.get_or_insert_with(CardHolder::default).driving_licence = Some(Licence {
                issuing_authority: licence.issuing_authority.text.clone(),
                issuing_nation: licence.issuing_nation,
                number: licence.licence_number.clone(),
            });
        }
        IdentificationRecord::VehicleUnit(vu) => {
            doc.identification.vehicle_unit = Some(VehicleUnitInfo {
                manufacturer_name: vu.manufacturer_name.text.clone(),
                manufacturer_address: vu.manufacturer_address.text.clone(),
                part_number: vu.part_number.clone(),
                serial_number: vu.serial_number.clone(),
                software_version: vu.software_version.clone(),
                software_installation: vu.software_installation,
                manufacturing_date: vu.manufacturing_date,
                approval_number: vu.approval_number.clone(),
            });
        }
        IdentificationRecord::SensorPairing(sensor) => doc.identification.sensors.push(sensor.clone()),
        IdentificationRecord::Vehicle(overview) => {
            let vehicle = doc.identification.vehicle.get_or_insert_with(VehicleInfo::default);
            if overview.vin.is_some() {
                vehicle.vin = overview.vin.clone();
            }
            if overview.registration.is_some() {
                vehicle.registration = overview.registration.clone();
            }

            let download = doc.download.get_or_insert_with(DownloadInfo::default);
            if let Some(time) = overview.current_time {
                download.current_time = Some(time);
            }
            if let Some(period) = &overview.downloadable_period {
                download.downloadable_from = period.min;
                download.downloadable_to = period.max;
            }
            if overview.card_slots.is_some() {
                download.card_slots = overview.card_slots;
            }
            if let Some(last) = &overview.last_download {
                download.last_download = last.time;
                download.last_download_company = Some(last.company.text.clone());
                download.last_download_card = conventions.card(&last.card);
            }
        }
    }
}
