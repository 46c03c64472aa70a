use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ai_service::AIService;
use super::prompts::{meal_analysis_schema, user_prompt, NUTRITION_SYSTEM_PROMPT};
use crate::models::MimeType;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        #[serde(rename = "type")]
        content_type: String,
        text: String,
    },
    ImageUrl {
        #[serde(rename = "type")]
        content_type: String,
        image_url: ImageData,
    },
}

#[derive(Debug, Serialize)]
struct ImageData {
    url: String,
    detail: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: JsonSchemaSpec,
}

#[derive(Debug, Serialize)]
struct JsonSchemaSpec {
    name: String,
    strict: bool,
    schema: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions client pointed at OpenRouter.
pub struct OpenRouterService {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenRouterService {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                log::warn!("⚠️ Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn build_request(&self, image_base64: &str, mime_type: MimeType, context: Option<&str>) -> ChatRequest {
        let data_url = format!("data:{};base64,{}", mime_type, image_base64);

        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: MessageContent::Text(NUTRITION_SYSTEM_PROMPT.to_string()),
            },
            ChatMessage {
                role: "user".to_string(),
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        content_type: "text".to_string(),
                        text: user_prompt(context),
                    },
                    ContentPart::ImageUrl {
                        content_type: "image_url".to_string(),
                        image_url: ImageData {
                            url: data_url,
                            detail: "high".to_string(),
                        },
                    },
                ]),
            },
        ];

        ChatRequest {
            model: self.model.clone(),
            messages,
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: JsonSchemaSpec {
                    name: "meal_analysis".to_string(),
                    strict: true,
                    schema: meal_analysis_schema(),
                },
            },
            max_tokens: 1000,
            temperature: 0.3,
        }
    }
}

#[async_trait::async_trait]
impl AIService for OpenRouterService {
    async fn analyze_meal_image(
        &self,
        image_base64: &str,
        mime_type: MimeType,
        context: Option<&str>,
    ) -> Result<String> {
        let request = self.build_request(image_base64, mime_type, context);

        log::info!("🤖 Sending request to OpenRouter with model: {}", self.model);
        log::debug!("📤 Image payload size: {} bytes (base64)", image_base64.len());

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", "https://github.com/calorie-lens")
            .header("X-Title", "Calorie Lens")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        log::debug!("📥 OpenRouter response status: {}", status);

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            log::error!("❌ OpenRouter API error response: {}", truncate(&error_text, 500));
            anyhow::bail!("OpenRouter API error ({})", status);
        }

        let chat_response: ChatResponse = response.json().await?;
        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        log::debug!("📄 Completion length: {} chars", content.len());
        Ok(content)
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> OpenRouterService {
        OpenRouterService::new("test_key".to_string(), "test_model".to_string())
    }

    #[test]
    fn test_request_payload_shape() {
        let request = service().build_request("aGVsbG8=", MimeType::Png, Some("extra cheese"));
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["model"], "test_model");
        assert_eq!(value["max_tokens"], 1000);
        assert_eq!(value["messages"][0]["role"], "system");
        assert!(value["messages"][0]["content"].is_string());

        let parts = &value["messages"][1]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert!(parts[0]["text"].as_str().unwrap().contains("\"extra cheese\""));
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,aGVsbG8=");
        assert_eq!(parts[1]["image_url"]["detail"], "high");

        assert_eq!(value["response_format"]["type"], "json_schema");
        assert_eq!(value["response_format"]["json_schema"]["strict"], true);
        assert_eq!(
            value["response_format"]["json_schema"]["schema"]["properties"]["confidence"]["enum"][2],
            "high"
        );
    }

    #[test]
    fn test_chat_response_without_content() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.choices[0].message.content, None);

        let response: ChatResponse = serde_json::from_str("{}").unwrap();
        assert!(response.choices.is_empty());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let service = OpenRouterService::with_base_url(
            "k".to_string(),
            "m".to_string(),
            "http://localhost:9999/v1/".to_string(),
        );
        assert_eq!(service.base_url, "http://localhost:9999/v1");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
