//! Plain-text clinical report and lesion summaries.

use std::fmt::{self, Write};

use serde::Serialize;

use crate::detection::DetectionBox;
use crate::geometry::{DD_TO_MICROMETERS, LesionDistance};
use crate::selection::Landmarks;
use crate::session::AnalysisSession;

pub const LOW_DENSITY_LIMIT: f64 = 5.0;
pub const HIGH_DENSITY_LIMIT: f64 = 15.0;

/// Vessel density bucket. Boundaries belong to the upper bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DensityStatus {
    Low,
    Normal,
    High,
}

impl DensityStatus {
    pub fn classify(density: f64) -> Self {
        if density < LOW_DENSITY_LIMIT {
            DensityStatus::Low
        } else if density < HIGH_DENSITY_LIMIT {
            DensityStatus::Normal
        } else {
            DensityStatus::High
        }
    }
}

impl fmt::Display for DensityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DensityStatus::Low => "Low density",
            DensityStatus::Normal => "Normal range",
            DensityStatus::High => "High density - monitor closely",
        })
    }
}

/// Lesion counts per class name, in order of first appearance.
pub fn lesion_counts(lesions: &[DetectionBox]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for lesion in lesions {
        match counts.iter_mut().find(|(name, _)| *name == lesion.class_name) {
            Some((_, count)) => *count += 1,
            None => counts.push((lesion.class_name.clone(), 1)),
        }
    }
    counts
}

/// One row of the lesion distance table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LesionDistanceRow {
    pub class_name: String,
    #[serde(flatten)]
    pub distance: LesionDistance,
}

/// Distance of every lesion to the macula. Empty when the macula or the disc
/// diameter is unknown.
pub fn lesion_distances(lesions: &[DetectionBox], landmarks: &Landmarks) -> Vec<LesionDistanceRow> {
    let Some(macula) = landmarks.macula_center() else {
        return Vec::new();
    };
    lesions
        .iter()
        .filter_map(|lesion| {
            let distance = LesionDistance::measure(&lesion.bounding_box, macula, landmarks.disc_diameter_px)?;
            Some(LesionDistanceRow {
                class_name: lesion.class_name.clone(),
                distance,
            })
        })
        .collect()
}

/// Builds the analysis report for `session`.
pub fn generate_report(session: &AnalysisSession, threshold: f32) -> String {
    let mut report = String::from("=== RETINA ANALYSIS REPORT ===\n\n");
    // writes into a String cannot fail
    let _ = write_report(&mut report, session, threshold);
    report
}

fn write_report(out: &mut String, session: &AnalysisSession, threshold: f32) -> fmt::Result {
    let severity = &session.severity;
    writeln!(out, "SEVERITY: {}", severity.severity)?;
    writeln!(out, "Confidence: {:.1}%\n", severity.confidence as f64 * 100.0)?;

    let lesions = &session.lesions;
    if lesions.is_empty() {
        out.push_str("No lesions detected.\n\n");
    } else {
        out.push_str("LESIONS DETECTED:\n");
        for (class_name, count) in lesion_counts(lesions) {
            writeln!(out, "  {class_name}: {count}")?;
        }
        writeln!(out, "\nTotal lesions: {}", lesions.len())?;

        let rows = lesion_distances(lesions, &session.landmarks);
        if !rows.is_empty() {
            out.push_str("\nLESION DISTANCES FROM MACULA:\n");
            for row in &rows {
                let marker = if row.distance.within_one_dd { " (INSIDE 1DD CIRCLE)" } else { "" };
                writeln!(out, "  {}: {:.2} DD{marker}", row.class_name, row.distance.distance_dd)?;
            }
            let inside = rows.iter().filter(|r| r.distance.within_one_dd).count();
            writeln!(out, "\nLesions within 1 DD of macula: {inside}")?;
        }
    }

    let landmarks = &session.landmarks;
    if landmarks.macula.is_some() || landmarks.disc.is_some() {
        out.push_str("\nMACULA AND OPTIC DISC:\n");
        if landmarks.macula.is_some() {
            writeln!(out, "  Macula detected: {}", landmarks.macula_count())?;
        }
        if landmarks.disc.is_some() {
            writeln!(out, "  Optic disc detected: {}", landmarks.disc_count())?;
            if landmarks.disc_diameter_px > 0 {
                writeln!(out, "  Optic disc diameter (DD): {} pixels", landmarks.disc_diameter_px)?;
                out.push_str("  1 DD circle drawn around macula for reference\n");
            }
        }
    }

    if let Some(vessels) = &session.vessels {
        out.push_str("\nVESSEL ANALYSIS:\n");
        writeln!(out, "  Vessel density: {:.2}%", vessels.density)?;
        writeln!(out, "  Segmentation method: {}", vessels.method)?;
        writeln!(out, "  Detection threshold: {threshold:.2}")?;
        writeln!(out, "  Status: {}", DensityStatus::classify(vessels.density))?;
    }

    out.push_str("\n=== CLINICAL SUMMARY ===\n");
    out.push_str(severity.severity.clinical_note());
    Ok(())
}

/// Gallery summary: totals, per-class counts, lesions inside 1 DD and the DD scale.
pub fn lesion_summary(lesions: &[DetectionBox], landmarks: &Landmarks) -> String {
    if lesions.is_empty() {
        return "No lesions detected".to_string();
    }
    let mut summary = String::from("SUMMARY STATISTICS:\n");
    summary.push_str(&format!("Total Lesions: {}\n", lesions.len()));
    for (class_name, count) in lesion_counts(lesions) {
        summary.push_str(&format!("{class_name}: {count} lesions\n"));
    }

    let rows = lesion_distances(lesions, landmarks);
    if !rows.is_empty() {
        let inside = rows.iter().filter(|r| r.distance.within_one_dd).count();
        summary.push_str(&format!("\nLesions within 1 DD of macula: {inside}\n"));
    }
    summary.push_str(&format!(
        "\nConversion: 1 DD = {}px ≈ {DD_TO_MICROMETERS:.0}µm",
        landmarks.disc_diameter_px
    ));
    summary
}

/// Tab-separated distance table with a header row.
pub fn distance_table(rows: &[LesionDistanceRow]) -> String {
    let mut table = String::from("lesion\tcenter\tdistance_px\tdistance_dd\twithin_1dd\n");
    for row in rows {
        let d = &row.distance;
        table.push_str(&format!(
            "{}\t({}, {})\t{:.2}\t{:.4}\t{}\n",
            row.class_name, d.center.0, d.center.1, d.distance_px, d.distance_dd, d.within_one_dd
        ));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    #[test]
    fn counts_keep_first_seen_order() {
        let b = BoundingBox::new(0, 0, 1, 1);
        let lesions = vec![
            DetectionBox::new("exudate", 0.5, b),
            DetectionBox::new("hemorrhage", 0.5, b),
            DetectionBox::new("exudate", 0.5, b),
        ];
        assert_eq!(
            lesion_counts(&lesions),
            vec![("exudate".to_string(), 2), ("hemorrhage".to_string(), 1)]
        );
    }

    #[test]
    fn summary_without_landmarks_still_shows_the_scale() {
        let lesions = vec![DetectionBox::new("exudate", 0.5, BoundingBox::new(0, 0, 4, 4))];
        let summary = lesion_summary(&lesions, &Landmarks::default());
        assert!(summary.starts_with("SUMMARY STATISTICS:\nTotal Lesions: 1\nexudate: 1 lesions\n"));
        assert!(!summary.contains("within 1 DD"));
        assert!(summary.ends_with("1 DD = 0px ≈ 1500µm"));
    }
}
