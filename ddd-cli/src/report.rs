//! Report generation
//!
//! Renders a decode result as a plain-text summary or as the JSON form of the
//! unified document. Both read only the document, never the source format.

use anyhow::{Context, Result};
use ddd_decoder::{DecodeReport, ParseOutcome, PartStatus, UnifiedDocument};
use std::fmt::Write;
use std::path::Path;

/// Issues listed in the text summary before the rest is counted only
const MAX_LISTED_ISSUES: usize = 20;

/// One-line outcome for a decoded file
pub fn outcome_line(path: &Path, report: &DecodeReport) -> String {
    match report.outcome() {
        ParseOutcome::FullyParsed => format!("{}: FullyParsed", path.display()),
        ParseOutcome::PartiallyParsed => format!(
            "{}: PartiallyParsed ({} errors, {} warnings)",
            path.display(),
            report.error_count(),
            report.warning_count()
        ),
    }
}

pub fn render_json(report: &DecodeReport, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(report)
    } else {
        serde_json::to_string(report)
    };
    json.context("Failed to serialize report")
}

/// Plain-text summary: identification, record counts, part verdicts, issues
pub fn render_text(path: &Path, report: &DecodeReport) -> String {
    let doc = &report.document;
    let mut out = String::new();

    let _ = writeln!(out, "═══════════════════════════════════════════════");
    let _ = writeln!(out, "  {}", path.display());
    let _ = writeln!(out, "═══════════════════════════════════════════════");
    let _ = writeln!(out, "Source:     {} ({})", doc.source_kind, doc.generation);
    let _ = writeln!(out, "Outcome:    {:?}", report.outcome());

    write_identification(&mut out, doc);
    write_counts(&mut out, doc);

    let _ = writeln!(out, "\nParts:");
    for result in &doc.validation {
        let mark = match result.status {
            PartStatus::Valid => "✓",
            PartStatus::Invalid => "✗",
            PartStatus::Missing if result.mandatory => "!",
            PartStatus::Missing => "-",
        };
        let _ = writeln!(out, "  {} {:<28} {:?}", mark, result.part.to_string(), result.status);
        if result.status == PartStatus::Invalid {
            for reason in &result.reasons {
                let _ = writeln!(out, "      {}", reason);
            }
        }
    }

    if !report.issues.is_empty() {
        let _ = writeln!(out, "\nIssues ({}):", report.issues.len());
        for issue in report.issues.iter().take(MAX_LISTED_ISSUES) {
            let _ = writeln!(out, "  {:?}: {}", issue.severity, issue);
        }
        if report.issues.len() > MAX_LISTED_ISSUES {
            let _ = writeln!(out, "  ... {} more", report.issues.len() - MAX_LISTED_ISSUES);
        }
    }
    out
}

fn write_identification(out: &mut String, doc: &UnifiedDocument) {
    if let Some(card) = &doc.identification.card {
        let _ = writeln!(out, "\nCard holder:");
        let _ = writeln!(
            out,
            "  Name:       {} {}",
            card.first_names.as_deref().unwrap_or(""),
            card.surname.as_deref().unwrap_or("")
        );
        if let Some(number) = &card.card_number {
            let _ = writeln!(out, "  Card:       {}", number);
        }
        if let Some(nation) = card.issuing_nation {
            let _ = writeln!(out, "  Nation:     {}", nation);
        }
        if let Some(expiry) = card.expiry_date {
            let _ = writeln!(out, "  Expires:    {}", expiry.format("%Y-%m-%d"));
        }
    }
    if let Some(vehicle) = &doc.identification.vehicle {
        let _ = writeln!(out, "\nVehicle:");
        if let Some(vin) = &vehicle.vin {
            let _ = writeln!(out, "  VIN:        {}", vin);
        }
        if let Some(registration) = &vehicle.registration {
            let _ = writeln!(out, "  Plate:      {} {}", registration.nation, registration.number);
        }
    }
    if let Some(vu) = &doc.identification.vehicle_unit {
        let _ = writeln!(out, "  VU:         {} {}", vu.manufacturer_name, vu.part_number);
    }
}

fn write_counts(out: &mut String, doc: &UnifiedDocument) {
    let _ = writeln!(out, "\nRecords:");
    let dates: Vec<_> = doc.activities.iter().filter_map(|d| d.date).collect();
    match (dates.iter().min(), dates.iter().max()) {
        (Some(first), Some(last)) => {
            let _ = writeln!(
                out,
                "  Activity days:    {} ({} .. {}), {} changes",
                doc.activities.len(),
                first,
                last,
                doc.activity_change_count()
            );
        }
        _ => {
            let _ = writeln!(out, "  Activity days:    {}", doc.activities.len());
        }
    }
    let counts = [
        ("Events", doc.events.len()),
        ("Faults", doc.faults.len()),
        ("Overspeedings", doc.overspeedings.len()),
        ("Vehicles used", doc.vehicles_used.len()),
        ("Vehicle units", doc.vehicle_units_used.len()),
        ("Places", doc.places.len()),
        ("GNSS positions", doc.gnss_accumulated_driving.len()),
        ("Border crossings", doc.border_crossings.len()),
        ("Paired sensors", doc.identification.sensors.len()),
        ("Calibrations", doc.calibrations.len()),
        ("Certificates", doc.certificates.len()),
        ("Card sessions", doc.card_sessions.len()),
        ("Speed blocks", doc.speed_blocks.len()),
        ("Unknown blocks", doc.unknown.len()),
    ];
    for (label, count) in counts.iter().filter(|(_, count)| *count > 0) {
        let _ = writeln!(out, "  {:<17} {}", format!("{}:", label), count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddd_decoder::dispatcher::encode_block;
    use ddd_decoder::Decoder;

    fn vu_report() -> DecodeReport {
        let mut data = encode_block(0x7600, &[0x00, 0x01]).unwrap();
        data.extend(encode_block(0x7699, &[1, 2, 3]).unwrap());
        Decoder::new().decode_bytes(&data).unwrap()
    }

    #[test]
    fn test_outcome_line_counts_issues() {
        let line = outcome_line(Path::new("vu.ddd"), &vu_report());
        assert!(line.starts_with("vu.ddd: PartiallyParsed"));
        assert!(line.contains("0 errors, 2 warnings"));
    }

    #[test]
    fn test_text_lists_parts() {
        let text = render_text(Path::new("vu.ddd"), &vu_report());
        assert!(text.contains("Vehicle unit"));
        assert!(text.contains("Overview"));
        assert!(text.contains("Unknown blocks:"));
    }

    #[test]
    fn test_json_round_trips_as_value() {
        let json = render_json(&vu_report(), false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["document"]["source_kind"], "VehicleUnit");
        assert_eq!(value["issues"].as_array().unwrap().len(), 2);
    }
}
