use serde_json::json;

pub const NUTRITION_SYSTEM_PROMPT: &str = "You are a nutrition analysis assistant. \
Analyze the food in the provided image and estimate its nutritional content.

CRITICAL RULES:
1. Return ONLY valid JSON matching the schema below, no markdown and no extra text
2. All calorie and macro values are ESTIMATES - communicate uncertainty in notes
3. If you cannot identify the food clearly, set confidence to \"low\"
4. If the image does not show food, return zero values, an empty foodItems list, confidence \"low\" and explain in notes
5. Round calories to the nearest 5 and macros to the nearest 1g
6. List each distinct food or drink separately, in the order you detect them
7. totalCalories MUST equal the sum of foodItems[].calories
8. Use null for fiber, sugar or notes when you cannot estimate them

JSON SCHEMA:
{
  \"totalCalories\": number,
  \"macros\": {
    \"protein\": number,
    \"carbohydrates\": number,
    \"fat\": number,
    \"fiber\": number | null,
    \"sugar\": number | null
  },
  \"foodItems\": [
    { \"name\": string, \"estimatedPortion\": string, \"calories\": number }
  ],
  \"confidence\": \"low\" | \"medium\" | \"high\",
  \"notes\": string | null
}

PORTION ESTIMATION:
- Use plates (about 26cm), cutlery, cups and hands in the frame as scale references
- Describe portions in common units (cups, pieces, slices, grams)
- Account for visible oils, sauces and dressings; they are easy to miss
- For mixed dishes, estimate the main components and mention assumptions in notes

CONFIDENCE GUIDELINES:
- HIGH: Clear, well-lit image of recognizable foods with visible portions
- MEDIUM: Somewhat obscured, mixed dishes, or unusual angles
- LOW: Poor lighting, heavily processed or mixed foods, unclear portions";

const NUTRITION_USER_PROMPT: &str = "Analyze this meal image and provide a detailed \
nutritional estimate. Return only the JSON response, no additional text.";

/// User-turn instruction, with the caller's context embedded verbatim.
pub fn user_prompt(context: Option<&str>) -> String {
    match context.filter(|c| !c.trim().is_empty()) {
        Some(context) => format!(
            "{}\n\nAdditional context from the user: \"{}\"\n\
             Use this context to refine food identification and portion sizes.",
            NUTRITION_USER_PROMPT, context
        ),
        None => NUTRITION_USER_PROMPT.to_string(),
    }
}

/// Strict JSON schema describing `MealAnalysis` for structured output.
pub fn meal_analysis_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "totalCalories": { "type": "number" },
            "macros": {
                "type": "object",
                "properties": {
                    "protein": { "type": "number" },
                    "carbohydrates": { "type": "number" },
                    "fat": { "type": "number" },
                    "fiber": { "type": ["number", "null"] },
                    "sugar": { "type": ["number", "null"] }
                },
                "required": ["protein", "carbohydrates", "fat", "fiber", "sugar"],
                "additionalProperties": false
            },
            "foodItems": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "estimatedPortion": { "type": "string" },
                        "calories": { "type": "number" }
                    },
                    "required": ["name", "estimatedPortion", "calories"],
                    "additionalProperties": false
                }
            },
            "confidence": { "type": "string", "enum": ["low", "medium", "high"] },
            "notes": { "type": ["string", "null"] }
        },
        "required": ["totalCalories", "macros", "foodItems", "confidence", "notes"],
        "additionalProperties": false
    })
}
