use std::sync::Arc;
use std::time::Duration;

use super::ai_service::AIService;
use crate::models::MimeType;

/// Hard wall-clock limit on one model call
pub const AI_TIMEOUT: Duration = Duration::from_millis(30_000);

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("AI request timed out after {0:?}")]
    Timeout(Duration),
    #[error("AI service error: {0}")]
    Service(anyhow::Error),
    #[error("AI response contained no content")]
    EmptyCompletion,
}

/// Single-attempt, timeout-guarded access to the vision model.
pub struct ModelGateway {
    ai: Arc<dyn AIService>,
    timeout: Duration,
}

impl ModelGateway {
    pub fn new(ai: Arc<dyn AIService>) -> Self {
        Self::with_timeout(ai, AI_TIMEOUT)
    }

    pub fn with_timeout(ai: Arc<dyn AIService>, timeout: Duration) -> Self {
        Self { ai, timeout }
    }

    /// Returns the raw completion text. When the timeout fires the in-flight
    /// call is dropped, which aborts the underlying HTTP request. Only that
    /// deadline counts as a timeout; transport-level timeouts inside the
    /// provider client are service errors.
    pub async fn call(
        &self,
        image_base64: &str,
        mime_type: MimeType,
        context: Option<&str>,
    ) -> Result<String, GatewayError> {
        let started = std::time::Instant::now();
        let call = self.ai.analyze_meal_image(image_base64, mime_type, context);

        let content = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => return Err(GatewayError::Timeout(self.timeout)),
            Ok(Err(e)) => return Err(GatewayError::Service(e)),
            Ok(Ok(content)) => content,
        };

        log::debug!("⏱️ Model call finished in {} ms", started.elapsed().as_millis());

        if content.trim().is_empty() {
            return Err(GatewayError::EmptyCompletion);
        }

        Ok(content)
    }
}
