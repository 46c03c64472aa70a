use crate::models::MealAnalysis;

/// Relative drift between `totalCalories` and the item sum that gets logged
const CALORIE_DRIFT_RATIO: f64 = 0.10;
const CALORIE_DRIFT_MIN_KCAL: f64 = 50.0;

/// Turn raw completion text into a validated [`MealAnalysis`].
///
/// Tries the whole text first, then (once) the slice between the first `{`
/// and the last `}` for models that wrap their JSON in prose. Returns `None`
/// when neither yields a valid analysis; details only go to the log.
pub fn reconcile(content: &str) -> Option<MealAnalysis> {
    let primary_err = match parse_and_validate(content) {
        Ok(analysis) => return Some(analysis),
        Err(e) => e,
    };

    log::debug!("🔧 Direct parse failed ({}), trying embedded JSON", primary_err);

    let embedded = match extract_json_object(content) {
        Some(slice) => slice,
        None => {
            log::error!(
                "❌ Failed to parse AI response: {} (no JSON object found, {} chars)",
                primary_err,
                content.len()
            );
            return None;
        }
    };

    match parse_and_validate(embedded) {
        Ok(analysis) => {
            log::warn!("⚠️ Recovered meal analysis from prose-wrapped AI response");
            Some(analysis)
        }
        Err(e) => {
            log::error!(
                "❌ Failed to parse AI response: direct: {}; embedded: {}",
                primary_err,
                e
            );
            None
        }
    }
}

/// Slice from the first `{` to the last `}`, if they exist in that order.
fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&content[start..=end])
}

fn parse_and_validate(text: &str) -> Result<MealAnalysis, String> {
    let analysis: MealAnalysis =
        serde_json::from_str(text.trim()).map_err(|e| format!("shape mismatch: {}", e))?;
    validate(&analysis)?;
    check_calorie_sum(&analysis);
    Ok(analysis)
}

fn validate(analysis: &MealAnalysis) -> Result<(), String> {
    non_negative("totalCalories", analysis.total_calories)?;
    non_negative("macros.protein", analysis.macros.protein)?;
    non_negative("macros.carbohydrates", analysis.macros.carbohydrates)?;
    non_negative("macros.fat", analysis.macros.fat)?;
    if let Some(fiber) = analysis.macros.fiber {
        non_negative("macros.fiber", fiber)?;
    }
    if let Some(sugar) = analysis.macros.sugar {
        non_negative("macros.sugar", sugar)?;
    }

    for (i, item) in analysis.food_items.iter().enumerate() {
        if item.name.trim().is_empty() {
            return Err(format!("foodItems[{}].name is empty", i));
        }
        non_negative(&format!("foodItems[{}].calories", i), item.calories)?;
    }

    Ok(())
}

fn non_negative(field: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(format!("{} must be a non-negative number, got {}", field, value))
    }
}

// Advisory only: the model is asked to keep these consistent.
fn check_calorie_sum(analysis: &MealAnalysis) {
    if analysis.food_items.is_empty() {
        return;
    }

    let items_total = analysis.food_items_calories();
    let drift = (analysis.total_calories - items_total).abs();
    let tolerance = (analysis.total_calories * CALORIE_DRIFT_RATIO).max(CALORIE_DRIFT_MIN_KCAL);

    if drift > tolerance {
        log::warn!(
            "⚠️ totalCalories {} differs from food item sum {} by {:.0} kcal",
            analysis.total_calories,
            items_total,
            drift
        );
    }
}
