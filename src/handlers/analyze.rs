use std::sync::Arc;

use crate::models::{AnalyzeResponse, ErrorCode, MealAnalysis};
use crate::services::gateway::{GatewayError, ModelGateway};
use crate::services::reconciler::reconcile;
use crate::services::validator::{self, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("AI response could not be reconciled into a meal analysis")]
    Parse,
    #[error("unexpected failure: {0}")]
    Internal(String),
}

impl AnalyzeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AnalyzeError::Validation(ValidationError::InvalidRequest(_)) => ErrorCode::InvalidRequest,
            AnalyzeError::Validation(ValidationError::ImageTooLarge { .. }) => ErrorCode::ImageTooLarge,
            AnalyzeError::Gateway(GatewayError::Timeout(_)) => ErrorCode::Timeout,
            AnalyzeError::Gateway(_) => ErrorCode::AiError,
            AnalyzeError::Parse => ErrorCode::ParseError,
            AnalyzeError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Message safe to show the client: never contains provider errors or model output.
    pub fn public_message(&self) -> String {
        match self {
            AnalyzeError::Validation(ValidationError::InvalidRequest(_)) => {
                "Invalid request format".to_string()
            }
            AnalyzeError::Validation(e @ ValidationError::ImageTooLarge { .. }) => e.to_string(),
            AnalyzeError::Gateway(GatewayError::Timeout(_)) => {
                "Analysis request timed out. Please try again.".to_string()
            }
            AnalyzeError::Gateway(_) => {
                "AI analysis service is temporarily unavailable. Please try again.".to_string()
            }
            AnalyzeError::Parse => "Failed to parse analysis results. Please try again.".to_string(),
            AnalyzeError::Internal(_) => "An unexpected error occurred. Please try again.".to_string(),
        }
    }
}

/// Runs one analyze request end to end: validate, size-check, call the
/// model, reconcile. Holds no per-request state.
pub struct AnalyzeHandler {
    gateway: ModelGateway,
}

impl AnalyzeHandler {
    pub fn new(gateway: ModelGateway) -> Self {
        Self { gateway }
    }

    /// Always yields one of the two envelope shapes. The run happens on its
    /// own task so a panic inside it surfaces as INTERNAL_ERROR.
    pub async fn handle(self: &Arc<Self>, body: String) -> AnalyzeResponse {
        let handler = Arc::clone(self);
        let result = match tokio::spawn(async move { handler.run(&body).await }).await {
            Ok(result) => result,
            Err(e) => Err(AnalyzeError::Internal(e.to_string())),
        };

        match result {
            Ok(analysis) => {
                log::info!(
                    "✅ Meal analysed: {} kcal, {} items, confidence {}",
                    analysis.total_calories,
                    analysis.food_items.len(),
                    analysis.confidence
                );
                AnalyzeResponse::Success(analysis)
            }
            Err(e) => {
                let code = e.code();
                match &e {
                    AnalyzeError::Validation(_) => log::warn!("🚫 {}: {}", code, e),
                    _ => log::error!("❌ {}: {}", code, e),
                }
                AnalyzeResponse::failure(code, e.public_message())
            }
        }
    }

    async fn run(&self, body: &str) -> Result<MealAnalysis, AnalyzeError> {
        let request = validator::parse_request(body)?;
        let size = validator::check_image_size(&request.image)?;

        log::info!(
            "📸 Analyze request: {} ({} bytes decoded, context: {})",
            request.mime_type,
            size,
            request.context.is_some()
        );

        let image = validator::strip_data_url(&request.image);
        let content = self
            .gateway
            .call(image, request.mime_type, request.context.as_deref())
            .await?;

        reconcile(&content).ok_or(AnalyzeError::Parse)
    }
}
