use crate::models::{AnalyzeResponse, Confidence, MealAnalysis};

/// Plain-text rendering of an analysis. Null fiber/sugar/notes are left out
/// rather than shown as zero.
pub fn render_analysis(analysis: &MealAnalysis) -> String {
    let macros = &analysis.macros;

    let mut out = format!(
        "🍽️  {} kcal (estimate)\n{}\n\nMacros:\n  Protein        {}g\n  Carbohydrates  {}g\n  Fat            {}g\n",
        format_number(analysis.total_calories),
        confidence_label(analysis.confidence),
        format_number(macros.protein),
        format_number(macros.carbohydrates),
        format_number(macros.fat)
    );
    if let Some(fiber) = macros.fiber {
        out.push_str(&format!("  Fiber          {}g\n", format_number(fiber)));
    }
    if let Some(sugar) = macros.sugar {
        out.push_str(&format!("  Sugar          {}g\n", format_number(sugar)));
    }

    if !analysis.food_items.is_empty() {
        out.push_str("\nItems:\n");
        for item in &analysis.food_items {
            out.push_str(&format!(
                "  • {} ({}) - {} kcal\n",
                item.name,
                item.estimated_portion,
                format_number(item.calories)
            ));
        }
    }

    if let Some(notes) = analysis.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        out.push_str(&format!("\n📝 {}\n", notes));
    }

    out
}

pub fn render_response(response: &AnalyzeResponse) -> String {
    match response {
        AnalyzeResponse::Success(analysis) => render_analysis(analysis),
        AnalyzeResponse::Failure { error, code } => format!("❌ {} ({})\n", error, code),
    }
}

fn confidence_label(confidence: Confidence) -> &'static str {
    match confidence {
        Confidence::High => "Confidence: high",
        Confidence::Medium => "Confidence: medium",
        Confidence::Low => "Confidence: low - treat these numbers as a rough guess",
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}
