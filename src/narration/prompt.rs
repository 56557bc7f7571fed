use std::fmt::Write;

use super::ScanContext;

pub const ASSESSMENT_MAX_TOKENS: u32 = 1000;
pub const QUESTION_MAX_TOKENS: u32 = 1500;

/// Asks for a short clinical assessment of the scan.
pub fn assessment_prompt(context: &ScanContext) -> String {
    let mut prompt = String::from("Analyze this retinal scan diagnosis:\n\nDIAGNOSIS DETAILS:\n");
    push_facts(&mut prompt, context, "Lesions Detected");
    prompt.push_str(
        "\n\nPlease provide a brief clinical assessment (2-3 paragraphs) covering:\n\
         1. What this severity level means for the patient\n\
         2. Key clinical concerns based on the findings\n\
         3. Recommended next steps and follow-up timeline\n\
         4. Comments on vessel density and what it might indicate\n\n\
         Keep your response professional, concise, and clinically accurate.",
    );
    prompt
}

/// Wraps a free-text question with the current scan facts.
pub fn question_prompt(context: &ScanContext, question: &str) -> String {
    let mut prompt =
        String::from("Answer the following question about this retinal scan:\n\nCURRENT SCAN ANALYSIS:\n");
    push_facts(&mut prompt, context, "Total Lesions");
    let _ = write!(
        prompt,
        "\n\nUSER QUESTION: {question}\n\nPlease provide a clear, professional, and clinically accurate response."
    );
    prompt
}

fn push_facts(prompt: &mut String, context: &ScanContext, lesion_label: &str) {
    let lesion_types = if context.lesion_types.is_empty() {
        "None detected".to_string()
    } else {
        context
            .lesion_types
            .iter()
            .map(|(name, count)| format!("{count} {name}"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let _ = write!(
        prompt,
        "- Severity: {} Diabetic Retinopathy\n\
         - Confidence: {:.1}%\n\
         - {lesion_label}: {}\n\
         - Lesion Types: {lesion_types}\n\
         - Vessel Density: {:.2}%\n\
         - Vessel Method: {}",
        context.severity,
        context.confidence as f64 * 100.0,
        context.lesion_count,
        context.vessel_density,
        context.vessel_method,
    );
    if context.optic_disc_diameter > 0 {
        let _ = write!(prompt, "\n- Optic Disc Diameter: {} pixels", context.optic_disc_diameter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(disc: u32) -> ScanContext {
        ScanContext {
            severity: "Moderate".to_string(),
            confidence: 0.873,
            lesion_count: 3,
            lesion_types: vec![("exudate".to_string(), 2), ("hemorrhage".to_string(), 1)],
            vessel_density: 12.346,
            vessel_method: "Traditional".to_string(),
            optic_disc_diameter: disc,
        }
    }

    #[test]
    fn assessment_lists_the_scan_facts() {
        let prompt = assessment_prompt(&context(180));
        assert!(prompt.contains("- Severity: Moderate Diabetic Retinopathy\n"));
        assert!(prompt.contains("- Confidence: 87.3%\n"));
        assert!(prompt.contains("- Lesions Detected: 3\n"));
        assert!(prompt.contains("- Lesion Types: 2 exudate, 1 hemorrhage\n"));
        assert!(prompt.contains("- Vessel Density: 12.35%\n"));
        assert!(prompt.contains("- Optic Disc Diameter: 180 pixels\n\n"));
    }

    #[test]
    fn disc_line_needs_a_diameter() {
        let prompt = question_prompt(&context(0), "Is this urgent?");
        assert!(!prompt.contains("Optic Disc"));
        assert!(prompt.contains("- Vessel Method: Traditional\n\nUSER QUESTION: Is this urgent?"));
    }
}
