use crate::types::GarmentDescription;

/// Fixed qualifiers appended to every generation prompt.
const QUALITY_QUALIFIERS: &[&str] = &[
    "photorealistic fashion photography",
    "natural soft lighting",
    "accurate fabric texture and drape",
    "sharp focus, high detail",
];

const GENERIC_SUBJECT: &str = "A full-body photo of a person wearing a stylish outfit.";

fn summarize_garment(garment: &GarmentDescription) -> String {
    let category = garment.category.trim();
    let attributes: Vec<&str> = garment
        .attributes
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .collect();
    if attributes.is_empty() {
        category.to_string()
    } else {
        format!("{} ({})", category, attributes.join(", "))
    }
}

fn summarize_garments(garments: &[GarmentDescription]) -> Option<String> {
    let summaries: Vec<String> = garments
        .iter()
        .filter(|g| !g.category.trim().is_empty())
        .map(summarize_garment)
        .collect();
    if summaries.is_empty() {
        None
    } else {
        Some(summaries.join("; "))
    }
}

/// Composes the generation prompt. Pure: no I/O and no failure modes; empty
/// input degrades to a minimal generic prompt.
pub fn build_prompt(
    prompt_text: Option<&str>,
    garments: &[GarmentDescription],
    style_context: Option<&str>,
) -> String {
    let mut sections: Vec<String> = Vec::new();

    let description = prompt_text
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .or_else(|| summarize_garments(garments));

    match description {
        Some(outfit) => sections.push(format!(
            "A full-body photo of the same person now wearing {outfit}."
        )),
        None => sections.push(GENERIC_SUBJECT.to_string()),
    }

    sections.push(format!("{}.", QUALITY_QUALIFIERS.join(", ")));

    if let Some(style) = style_context.map(str::trim).filter(|s| !s.is_empty()) {
        sections.push(format!("Style: {style}."));
    }

    sections.join(" ")
}
