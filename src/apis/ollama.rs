use crate::apis::api_client::{
    user_agent, ApiClient, CompletionOptions, Message, ToolCall, ToolDefinition,
};
use crate::apis::tool_prompt::{flatten_tool_turns, parse_tool_reply, render_tool_prompt};
use crate::errors::AppError;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use serde_json::{self, json, Map, Value};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_OLLAMA_API_BASE: &str = "http://localhost:11434";

/// Context length Ollama falls back to when none is requested.
pub const OLLAMA_DEFAULT_NUM_CTX: u32 = 2048;

/// Enough room for easy multi-step tool tasks; larger is better.
pub const RECOMMENDED_NUM_CTX: u32 = 8192;

// Ollama API Types
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    eval_count: Option<u64>,
}

pub struct OllamaClient {
    client: ReqwestClient,
    model: String,
    api_base: String,
    num_ctx: u32,
}

impl OllamaClient {
    /// `model` may carry a litellm-style `ollama_chat/` or `ollama/` prefix.
    pub fn new(model: String, api_base: String, api_key: Option<String>, num_ctx: u32) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_str(&user_agent())?);
        // Only meaningful behind an authenticating proxy
        if let Some(api_key) = api_key.filter(|k| !k.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", api_key))?,
            );
        }

        let client = ReqwestClient::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300)) // local generation can be slow
            .build()?;

        if num_ctx <= OLLAMA_DEFAULT_NUM_CTX {
            warn!(
                num_ctx,
                "Ollama context length is at or below its 2048 default; agent runs with tool output usually need 8192 or more"
            );
        }

        Ok(Self {
            client,
            model,
            api_base: api_base.trim_end_matches('/').to_string(),
            num_ctx,
        })
    }

    pub fn num_ctx(&self) -> u32 {
        self.num_ctx
    }

    /// Model name as Ollama knows it, without any routing prefix.
    pub fn wire_model(&self) -> &str {
        strip_route_prefix(&self.model)
    }

    fn build_request(&self, messages: Vec<Message>, options: &CompletionOptions) -> OllamaRequest {
        let mut model_options = Map::new();
        model_options.insert("num_ctx".to_string(), json!(self.num_ctx));
        if let Some(temperature) = options.temperature {
            model_options.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(top_p) = options.top_p {
            model_options.insert("top_p".to_string(), json!(top_p));
        }
        if let Some(max_tokens) = options.max_tokens {
            model_options.insert("num_predict".to_string(), json!(max_tokens));
        }

        OllamaRequest {
            model: self.wire_model().to_string(),
            messages: convert_messages(messages),
            stream: false,
            tools: options
                .tools
                .as_ref()
                .filter(|t| !t.is_empty())
                .map(|tools| convert_tool_definitions(tools)),
            options: Some(Value::Object(model_options)),
        }
    }

    fn prompt_only_request(
        &self,
        messages: Vec<Message>,
        options: &CompletionOptions,
    ) -> Result<OllamaRequest> {
        let mut conversation = flatten_tool_turns(messages);
        if let Some(tools) = options.tools.as_ref().filter(|t| !t.is_empty()) {
            conversation.insert(0, Message::system(render_tool_prompt(tools)?));
        }

        Ok(self.build_request(
            conversation,
            &CompletionOptions {
                tools: None,
                ..options.clone()
            },
        ))
    }

    async fn chat(&self, request: &OllamaRequest) -> Result<OllamaResponse> {
        let url = format!("{}/api/chat", self.api_base);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    // Connection failed - likely Ollama is not running
                    AppError::NetworkError(format!(
                        "Failed to connect to Ollama server at {}. Make sure 'ollama serve' is running.",
                        self.api_base
                    ))
                } else {
                    AppError::NetworkError(format!("Failed to send request to Ollama: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::NetworkError(format!(
                "Ollama API error: {} - {}",
                status, error_text
            ))
            .into());
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| AppError::NetworkError(format!("Failed to get response text: {}", e)))?;

        let parsed: OllamaResponse = serde_json::from_str(&response_text)
            .map_err(|e| AppError::Other(format!("Failed to parse Ollama response: {}", e)))?;
        tracing::debug!(done = parsed.done, eval_count = ?parsed.eval_count, "ollama chat finished");
        Ok(parsed)
    }
}

#[async_trait]
impl ApiClient for OllamaClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: Vec<Message>, options: CompletionOptions) -> Result<String> {
        let request = self.build_request(messages, &CompletionOptions { tools: None, ..options });
        Ok(self.chat(&request).await?.message.content)
    }

    async fn complete_with_tools(
        &self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> Result<(String, Option<Vec<ToolCall>>)> {
        if self.wire_model().is_empty() {
            return Err(anyhow::anyhow!(
                "Model name is empty. Please select a valid Ollama model."
            ));
        }

        let request = self.build_request(messages.clone(), &options);
        let message = match self.chat(&request).await {
            Ok(response) => response.message,
            Err(e) if e.to_string().contains("does not support tools") => {
                warn!(model = %self.model, "model lacks native tool support, embedding tools in the prompt");
                self.chat(&self.prompt_only_request(messages, &options)?)
                    .await?
                    .message
            }
            Err(e) => return Err(e),
        };

        let native_calls: Vec<ToolCall> = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: Some(format!("ollama-tool-{}", uuid::Uuid::new_v4().simple())),
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        if !native_calls.is_empty() {
            return Ok((message.content, Some(native_calls)));
        }

        // Smaller models sometimes answer with a JSON tool request as plain text
        if options.tools.is_some() {
            if let Some(call) = parse_tool_reply(&message.content) {
                return Ok((String::new(), Some(vec![call])));
            }
        }

        Ok((message.content, None))
    }
}

pub(crate) fn strip_route_prefix(model: &str) -> &str {
    model
        .strip_prefix("ollama_chat/")
        .or_else(|| model.strip_prefix("ollama/"))
        .unwrap_or(model)
}

fn convert_messages(messages: Vec<Message>) -> Vec<OllamaMessage> {
    messages
        .into_iter()
        .map(|msg| OllamaMessage {
            role: msg.role,
            content: msg.content,
            tool_calls: msg.tool_calls.map(|calls| {
                calls
                    .into_iter()
                    .map(|call| OllamaToolCall {
                        function: OllamaFunctionCall {
                            name: call.name,
                            arguments: call.arguments,
                        },
                    })
                    .collect()
            }),
        })
        .collect()
}

fn convert_tool_definitions(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }
            })
        })
        .collect()
}
