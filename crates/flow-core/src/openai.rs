use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::errors::ProviderError;
use crate::provider::{GenerationProvider, GenerationRequest};
use crate::utils::extract_json_object;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            temperature: 0.4,
            timeout: Duration::from_secs(30),
        }
    }
}

/// OpenAI-compatible chat completions client. One attempt per call.
pub struct OpenAiProvider {
    client: Client,
    endpoint: Url,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::unavailable("missing API key for generation"));
        }
        let endpoint = chat_completions_url(&config.api_base)?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| ProviderError::transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Value, ProviderError> {
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                r#type: "json_object".to_string(),
            },
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_with_schema(&request.prompt.system, &request.output_schema),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.prompt.user.clone(),
                },
            ],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::transport(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: provider_error_message(&text),
            });
        }

        let response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::malformed(format!("response invalid: {err}")))?;
        if let Some(usage) = &response.usage {
            debug!(
                flow = request.flow,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "generation usage"
            );
        }

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .and_then(ChatCompletionContent::as_text)
            .ok_or_else(|| ProviderError::malformed("response missing content"))?;
        let json = extract_json_object(&content)
            .ok_or_else(|| ProviderError::malformed("response missing JSON object"))?;
        serde_json::from_str(&json)
            .map_err(|err| ProviderError::malformed(format!("response JSON invalid: {err}")))
    }
}

fn chat_completions_url(api_base: &str) -> Result<Url, ProviderError> {
    let base = format!("{}/", api_base.trim().trim_end_matches('/'));
    Url::parse(&base)
        .and_then(|base| base.join("chat/completions"))
        .map_err(|err| ProviderError::unavailable(format!("invalid api base '{api_base}': {err}")))
}

fn system_with_schema(system: &str, schema: &Value) -> String {
    if schema.is_null() {
        return system.to_string();
    }
    format!(
        "{system}\n\nRespond with a single JSON object matching this JSON schema:\n{}",
        serde_json::to_string(schema).unwrap_or_default()
    )
}

fn provider_error_message(raw: &str) -> String {
    serde_json::from_str::<OpenAiErrorEnvelope>(raw)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| raw.chars().take(512).collect())
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    #[serde(default)]
    content: Option<ChatCompletionContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatCompletionContent {
    Text(String),
    Parts(Vec<ChatCompletionPart>),
}

impl ChatCompletionContent {
    fn as_text(&self) -> Option<String> {
        match self {
            ChatCompletionContent::Text(value) => Some(value.clone()),
            ChatCompletionContent::Parts(parts) => {
                let text = parts
                    .iter()
                    .filter_map(|part| part.text.as_ref())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n");
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorEnvelope {
    error: OpenAiErrorMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorMessage {
    message: String,
}
