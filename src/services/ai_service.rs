use anyhow::Result;

use crate::models::MimeType;

/// Trait for vision-model providers (OpenRouter, stubs in tests, etc.)
///
/// Implementations make exactly one completion call and return the raw text
/// of the first choice, or an empty string when the model produced none.
#[async_trait::async_trait]
pub trait AIService: Send + Sync {
    async fn analyze_meal_image(
        &self,
        image_base64: &str,
        mime_type: MimeType,
        context: Option<&str>,
    ) -> Result<String>;
}
