use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::{
    config::ProviderConfig,
    error::{AppError, AppResult, ResponseShapeError},
    models::GenerationRequest,
    prompt,
};

const DEFAULT_TITLE: &str = "Scientific Sketch to 3D Converter";
const IMAGE_MARKER: &str = "data:image";
const EXCERPT_CHARS: usize = 200;

/// Credential and base URL resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub api_key: String,
    pub base_url: String,
}

impl Endpoint {
    pub fn from_config(config: &ProviderConfig) -> AppResult<Self> {
        Ok(Self {
            api_key: config.require_api_key()?.to_string(),
            base_url: config.require_base_url()?.to_string(),
        })
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// One round trip: one (prompt, image, angle) triple in, one image URL out.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_one(
        &self,
        endpoint: &Endpoint,
        request: &GenerationRequest,
    ) -> AppResult<String>;
}

#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    http_client: reqwest::Client,
    referer: Option<String>,
    title: Option<String>,
}

impl Default for OpenRouterClient {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl OpenRouterClient {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            referer: None,
            title: Some(DEFAULT_TITLE.to_string()),
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }
}

#[async_trait]
impl ImageGenerator for OpenRouterClient {
    async fn generate_one(
        &self,
        endpoint: &Endpoint,
        request: &GenerationRequest,
    ) -> AppResult<String> {
        let payload = build_payload(request);

        let mut req = self
            .http_client
            .post(endpoint.chat_completions_url())
            .header("Authorization", format!("Bearer {}", endpoint.api_key))
            .header("Content-Type", "application/json")
            .json(&payload);

        if let Some(referer) = &self.referer {
            req = req.header("HTTP-Referer", referer);
        }

        if let Some(title) = &self.title {
            req = req.header("X-Title", title);
        }

        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AppError::Transport { status, body });
        }

        let response_json: Value = serde_json::from_str(&body)?;
        classify_response(&response_json).into_image_url()
    }
}

#[derive(Debug, Serialize)]
struct ChatPayload {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrlPayload },
}

#[derive(Debug, Serialize)]
struct ImageUrlPayload {
    url: String,
}

fn build_payload(request: &GenerationRequest) -> ChatPayload {
    let text = prompt::build_angle_prompt(&request.system_prompt, &request.prompt, &request.angle);

    ChatPayload {
        model: request.model.clone(),
        messages: vec![ChatMessage {
            role: "user",
            content: vec![
                ContentPart::Text { text },
                ContentPart::ImageUrl {
                    image_url: ImageUrlPayload {
                        url: request.image_data_uri.clone(),
                    },
                },
            ],
        }],
    }
}

/// The shapes a completion message can take, in the order they are checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    StructuredImage(String),
    EmbeddedImage(String),
    TextOnly(String),
    Empty,
}

impl MessageOutcome {
    pub fn into_image_url(self) -> AppResult<String> {
        match self {
            Self::StructuredImage(url) | Self::EmbeddedImage(url) => Ok(url),
            Self::TextOnly(text) => Err(ResponseShapeError::TextOnly {
                excerpt: text.chars().take(EXCERPT_CHARS).collect(),
            }
            .into()),
            Self::Empty => Err(ResponseShapeError::NoContent.into()),
        }
    }
}

pub fn classify_response(response: &Value) -> MessageOutcome {
    let Some(message) = response
        .pointer("/choices/0/message")
        .filter(|message| message.is_object())
    else {
        return MessageOutcome::Empty;
    };

    if let Some(url) = extract_attached_image(message) {
        return MessageOutcome::StructuredImage(url);
    }

    match extract_text(message) {
        Some(text) if text.contains(IMAGE_MARKER) => MessageOutcome::EmbeddedImage(text),
        Some(text) => MessageOutcome::TextOnly(text),
        None => MessageOutcome::Empty,
    }
}

fn extract_attached_image(message: &Value) -> Option<String> {
    let from_images = message
        .get("images")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find_map(image_url_of);
    if from_images.is_some() {
        return from_images;
    }

    message
        .get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("image_url"))
        .find_map(image_url_of)
}

fn image_url_of(entry: &Value) -> Option<String> {
    match entry {
        Value::String(url) if !url.is_empty() => Some(url.clone()),
        Value::Object(obj) => obj
            .get("image_url")
            .or_else(|| obj.get("imageUrl"))
            .and_then(|value| value.get("url").or(Some(value)))
            .and_then(Value::as_str)
            .or_else(|| obj.get("url").and_then(Value::as_str))
            .filter(|url| !url.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

fn extract_text(message: &Value) -> Option<String> {
    let content = message.get("content")?;

    if let Some(text) = content.as_str() {
        if !text.is_empty() {
            return Some(text.to_string());
        }
    }

    if let Some(parts) = content.as_array() {
        let merged = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n");
        if !merged.is_empty() {
            return Some(merged);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ViewingAngle;
    use serde_json::json;

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: "google/gemini-2.5-flash-image-preview".into(),
            prompt: "a wooden chair".into(),
            image_data_uri: "data:image/png;base64,AAAA".into(),
            system_prompt: "Render as 3D.".into(),
            angle: ViewingAngle::front(),
        }
    }

    #[test]
    fn payload_is_one_user_turn_with_text_and_image() {
        let payload = serde_json::to_value(build_payload(&request())).unwrap();

        assert_eq!(payload["model"], "google/gemini-2.5-flash-image-preview");
        let messages = payload["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");

        let content = messages[0]["content"].as_array().unwrap();
        assert_eq!(content[0]["type"], "text");
        assert!(content[0]["text"]
            .as_str()
            .unwrap()
            .starts_with("Render as 3D.\n\nUser Request: a wooden chair"));
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn structured_image_wins_over_text() {
        let response = json!({
            "choices": [{"message": {
                "content": "Here is data:image/png;base64,BBBB",
                "images": [{"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}]
            }}]
        });
        assert_eq!(
            classify_response(&response),
            MessageOutcome::StructuredImage("data:image/png;base64,AAAA".into())
        );
    }

    #[test]
    fn remote_image_urls_are_accepted() {
        let response = json!({
            "choices": [{"message": {"images": [{"image_url": {"url": "https://cdn.example/x.png"}}]}}]
        });
        assert_eq!(
            classify_response(&response).into_image_url().unwrap(),
            "https://cdn.example/x.png"
        );
    }

    #[test]
    fn embedded_data_uri_returns_content_verbatim() {
        let content = "Sure! data:image/png;base64,CCCC";
        let response = json!({"choices": [{"message": {"content": content}}]});
        assert_eq!(
            classify_response(&response),
            MessageOutcome::EmbeddedImage(content.into())
        );
    }

    #[test]
    fn text_only_reports_truncated_excerpt() {
        let long = "x".repeat(500);
        let response = json!({"choices": [{"message": {"content": long}}]});

        let error = classify_response(&response).into_image_url().unwrap_err();
        match error {
            AppError::ResponseShape(ResponseShapeError::TextOnly { excerpt }) => {
                assert_eq!(excerpt.chars().count(), 200)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_shapes_report_no_content() {
        for response in [
            json!({}),
            json!({"choices": []}),
            json!({"choices": [{"message": null}]}),
            json!({"choices": [{"message": {"content": ""}}]}),
            json!({"choices": [{"message": {"content": null, "images": []}}]}),
        ] {
            assert_eq!(classify_response(&response), MessageOutcome::Empty);
            assert!(matches!(
                classify_response(&response).into_image_url(),
                Err(AppError::ResponseShape(ResponseShapeError::NoContent))
            ));
        }
    }

    #[test]
    fn whitespace_content_is_still_text() {
        let response = json!({"choices": [{"message": {"content": "   "}}]});
        assert_eq!(
            classify_response(&response),
            MessageOutcome::TextOnly("   ".into())
        );

        let error = classify_response(&response).into_image_url().unwrap_err();
        assert!(matches!(
            &error,
            AppError::ResponseShape(ResponseShapeError::TextOnly { excerpt }) if excerpt == "   "
        ));
        assert_eq!(error.to_string(), "No image generated. API returned:    ...");
    }

    #[test]
    fn content_parts_are_searched() {
        let response = json!({"choices": [{"message": {"content": [
            {"type": "text", "text": "here you go"},
            {"type": "image_url", "image_url": {"url": "data:image/webp;base64,DDDD"}}
        ]}}]});
        assert_eq!(
            classify_response(&response),
            MessageOutcome::StructuredImage("data:image/webp;base64,DDDD".into())
        );
    }

    #[test]
    fn endpoint_requires_credentials() {
        let config = ProviderConfig {
            api_key: None,
            base_url: "https://openrouter.ai/api/v1/".into(),
            models: None,
        };
        assert!(matches!(Endpoint::from_config(&config), Err(AppError::Config(_))));

        let endpoint = Endpoint::from_config(&ProviderConfig {
            api_key: Some("sk".into()),
            ..config
        })
        .unwrap();
        assert_eq!(
            endpoint.chat_completions_url(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }
}
