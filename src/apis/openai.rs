use crate::apis::api_client::{
    user_agent, ApiClient, CompletionOptions, Message, ToolCall, ToolDefinition,
};
use crate::errors::AppError;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use serde_json::{self, json, Value};
use tracing::debug;

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";

// OpenAI API Types
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAITool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default = "function_type")]
    tool_type: String,
    function: OpenAIFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIResponseChoice {
    message: OpenAIMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<OpenAIResponseChoice>,
    #[serde(default)]
    usage: Option<Value>,
}

/// Client for any endpoint speaking the OpenAI chat-completions dialect.
pub struct OpenAIClient {
    client: ReqwestClient,
    model: String,
    api_base: String,
    provider_label: &'static str,
}

impl OpenAIClient {
    pub fn with_api_key(api_key: String, model: String) -> Result<Self> {
        Self::with_base_url(Some(api_key), model, DEFAULT_OPENAI_API_BASE.to_string())
    }

    /// `api_base` is the URL prefix in front of `/chat/completions`.
    pub fn with_base_url(api_key: Option<String>, model: String, api_base: String) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_str(&user_agent())?);
        if let Some(api_key) = api_key.filter(|k| !k.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", api_key))?,
            );
        }

        let client = ReqwestClient::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            model,
            api_base: api_base.trim_end_matches('/').to_string(),
            provider_label: "OpenAI",
        })
    }

    /// Name used in error messages, e.g. "Hugging Face" for the router.
    pub fn with_provider_label(mut self, label: &'static str) -> Self {
        self.provider_label = label;
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn build_request(&self, messages: Vec<Message>, options: CompletionOptions) -> OpenAIRequest {
        let mut request = OpenAIRequest {
            model: self.model.clone(),
            messages: convert_messages(messages),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            tools: None,
            tool_choice: None,
        };

        if let Some(tools) = options.tools.filter(|t| !t.is_empty()) {
            request.tools = Some(convert_tool_definitions(tools));
            request.tool_choice = Some("auto".to_string());
        }

        request
    }

    async fn send(&self, request: &OpenAIRequest) -> Result<OpenAIResponse> {
        let url = format!("{}/chat/completions", self.api_base);
        debug!(model = %request.model, %url, "sending chat completion");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                AppError::NetworkError(format!(
                    "Failed to send request to {}: {}",
                    self.provider_label, e
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::NetworkError(format!(
                "{} API error: {} - {}",
                self.provider_label, status, error_text
            ))
            .into());
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| AppError::NetworkError(format!("Failed to get response text: {}", e)))?;

        let parsed: OpenAIResponse = serde_json::from_str(&response_text).map_err(|e| {
            AppError::Other(format!(
                "Failed to parse {} response: {}",
                self.provider_label, e
            ))
        })?;

        if let Some(usage) = &parsed.usage {
            debug!(model = ?parsed.model, %usage, "completion usage");
        }

        Ok(parsed)
    }
}

#[async_trait]
impl ApiClient for OpenAIClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: Vec<Message>, options: CompletionOptions) -> Result<String> {
        let request = self.build_request(messages, CompletionOptions { tools: None, ..options });
        let response = self.send(&request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AppError::ModelError(format!("No content in {} response", self.provider_label))
                    .into()
            })
    }

    async fn complete_with_tools(
        &self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> Result<(String, Option<Vec<ToolCall>>)> {
        let request = self.build_request(messages, options);
        let response = self.send(&request).await?;

        let Some(first_choice) = response.choices.into_iter().next() else {
            return Ok((String::new(), None));
        };

        debug!(finish_reason = ?first_choice.finish_reason, "completion finished");
        let content = first_choice.message.content.unwrap_or_default();
        let tool_calls = first_choice
            .message
            .tool_calls
            .map(parse_tool_calls)
            .filter(|calls| !calls.is_empty());

        Ok((content, tool_calls))
    }
}

fn convert_messages(messages: Vec<Message>) -> Vec<OpenAIMessage> {
    messages
        .into_iter()
        .map(|msg| {
            let tool_calls = msg.tool_calls.map(|calls| {
                calls
                    .into_iter()
                    .map(|call| OpenAIToolCall {
                        id: call.id,
                        tool_type: function_type(),
                        function: OpenAIFunctionCall {
                            name: call.name,
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect::<Vec<_>>()
            });

            // An assistant turn that only carries tool calls has null content
            let content = if tool_calls.is_some() && msg.content.is_empty() {
                None
            } else {
                Some(msg.content)
            };

            OpenAIMessage {
                role: msg.role,
                content,
                tool_calls,
                tool_call_id: msg.tool_call_id,
            }
        })
        .collect()
}

fn convert_tool_definitions(tools: Vec<ToolDefinition>) -> Vec<OpenAITool> {
    tools
        .into_iter()
        .map(|tool| OpenAITool {
            tool_type: function_type(),
            function: OpenAIFunction {
                name: tool.name,
                description: tool.description,
                parameters: tool.parameters,
            },
        })
        .collect()
}

fn parse_tool_calls(calls: Vec<OpenAIToolCall>) -> Vec<ToolCall> {
    calls
        .into_iter()
        .map(|call| {
            // Models occasionally emit malformed argument JSON
            let arguments =
                serde_json::from_str::<Value>(&call.function.arguments).unwrap_or_else(|_| json!({}));

            ToolCall {
                id: Some(
                    call.id
                        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                ),
                name: call.function.name,
                arguments,
            }
        })
        .collect()
}
