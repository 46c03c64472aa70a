use serde::{Deserialize, Deserializer, Serialize};

/// Image encodings the analyze endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MimeType {
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/webp")]
    Webp,
}

impl MimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MimeType::Jpeg => "image/jpeg",
            MimeType::Png => "image/png",
            MimeType::Webp => "image/webp",
        }
    }

    /// Guess the encoding from a file extension (capture side only)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(MimeType::Jpeg),
            "png" => Some(MimeType::Png),
            "webp" => Some(MimeType::Webp),
            _ => None,
        }
    }
}

impl std::fmt::Display for MimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Body of `POST /analyze`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub image: String,
    pub mime_type: MimeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItem {
    pub name: String,
    pub estimated_portion: String,
    pub calories: f64,
}

/// Macronutrients in grams. `fiber` and `sugar` must be present but may be null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    pub protein: f64,
    pub carbohydrates: f64,
    pub fat: f64,
    #[serde(deserialize_with = "required_nullable")]
    pub fiber: Option<f64>,
    #[serde(deserialize_with = "required_nullable")]
    pub sugar: Option<f64>,
}

/// Canonical nutrition estimate for one image + context pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealAnalysis {
    pub total_calories: f64,
    pub macros: Macros,
    pub food_items: Vec<FoodItem>,
    pub confidence: Confidence,
    #[serde(deserialize_with = "required_nullable")]
    pub notes: Option<String>,
}

impl MealAnalysis {
    pub fn food_items_calories(&self) -> f64 {
        self.food_items.iter().map(|item| item.calories).sum()
    }
}

// A plain `Option` field silently defaults to None when the key is missing;
// going through `deserialize_with` makes the key mandatory while still
// accepting an explicit null.
fn required_nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

/// Machine-readable failure codes carried in the `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    Unauthorized,
    ImageTooLarge,
    Timeout,
    AiError,
    ParseError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::ImageTooLarge => "IMAGE_TOO_LARGE",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::AiError => "AI_ERROR",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::InvalidRequest | ErrorCode::ImageTooLarge => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Timeout => 504,
            ErrorCode::AiError | ErrorCode::ParseError | ErrorCode::InternalError => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Response envelope of `POST /analyze`: exactly one of the two shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Envelope", try_from = "Envelope")]
pub enum AnalyzeResponse {
    Success(MealAnalysis),
    Failure { error: String, code: ErrorCode },
}

impl AnalyzeResponse {
    pub fn failure(code: ErrorCode, error: impl Into<String>) -> Self {
        AnalyzeResponse::Failure {
            error: error.into(),
            code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalyzeResponse::Success(_))
    }

    pub fn http_status(&self) -> u16 {
        match self {
            AnalyzeResponse::Success(_) => 200,
            AnalyzeResponse::Failure { code, .. } => code.http_status(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<MealAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<ErrorCode>,
}

impl From<AnalyzeResponse> for Envelope {
    fn from(response: AnalyzeResponse) -> Self {
        match response {
            AnalyzeResponse::Success(data) => Envelope {
                success: true,
                data: Some(data),
                error: None,
                code: None,
            },
            AnalyzeResponse::Failure { error, code } => Envelope {
                success: false,
                data: None,
                error: Some(error),
                code: Some(code),
            },
        }
    }
}

impl TryFrom<Envelope> for AnalyzeResponse {
    type Error = String;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        match envelope {
            Envelope {
                success: true,
                data: Some(data),
                ..
            } => Ok(AnalyzeResponse::Success(data)),
            Envelope {
                success: false,
                error: Some(error),
                code: Some(code),
                ..
            } => Ok(AnalyzeResponse::Failure { error, code }),
            Envelope { success: true, .. } => Err("success envelope without data".to_string()),
            Envelope { .. } => Err("failure envelope without error/code".to_string()),
        }
    }
}
