use crate::apis::api_client::{
    user_agent, ApiClient, CompletionOptions, Message, ToolCall, ToolDefinition,
};
use crate::apis::tool_prompt::flatten_tool_turns;
use crate::errors::AppError;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use serde_json::{self, json, Value};

// Anthropic API models
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContent {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(rename = "tool_use_id")]
        tool_call_id: String,
        content: String,
    },

    /// Block types this client does not use, e.g. `thinking`
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnthropicTool {
    name: String,
    description: Option<String>,
    #[serde(rename = "input_schema")]
    schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnthropicToolChoice {
    #[serde(rename = "type")]
    choice_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<AnthropicToolChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    #[serde(default)]
    stop_reason: Option<String>,
}

/// Anthropic Messages API client. Only reachable through the litellm router
/// (`anthropic/<model>`).
pub struct AnthropicClient {
    client: ReqwestClient,
    model: String,
    api_base: String,
}

impl AnthropicClient {
    pub fn with_api_key(api_key: String, model: String) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_str(&user_agent())?);
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert("x-api-key", HeaderValue::from_str(&api_key)?);

        let client = ReqwestClient::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            model,
            api_base: "https://api.anthropic.com/v1/messages".to_string(),
        })
    }

    fn build_request(&self, messages: Vec<Message>, options: CompletionOptions) -> AnthropicRequest {
        let system = extract_system_message(&messages);
        let tools = options.tools.filter(|t| !t.is_empty());

        // tool_use and tool_result blocks are rejected unless tools are declared
        let messages = if tools.is_some() {
            messages
        } else {
            flatten_tool_turns(messages)
        };

        let mut request = AnthropicRequest {
            model: self.model.clone(),
            messages: convert_messages(messages),
            max_tokens: options.max_tokens.unwrap_or(2048) as usize,
            system,
            temperature: options.temperature,
            top_p: options.top_p,
            tools: None,
            tool_choice: None,
        };

        if let Some(tools) = tools {
            request.tools = Some(convert_tool_definitions(tools));
            request.tool_choice = Some(AnthropicToolChoice {
                choice_type: "auto".to_string(),
            });
        }

        request
    }

    async fn send(&self, request: &AnthropicRequest) -> Result<AnthropicResponse> {
        let response = self
            .client
            .post(&self.api_base)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                AppError::NetworkError(format!("Failed to send request to Anthropic: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::NetworkError(format!(
                "Anthropic API error: {} - {}",
                status, error_text
            ))
            .into());
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| AppError::NetworkError(format!("Failed to get response text: {}", e)))?;

        let parsed = serde_json::from_str(&response_text)
            .map_err(|e| AppError::Other(format!("Failed to parse Anthropic response: {}", e)))?;
        Ok(parsed)
    }
}

#[async_trait]
impl ApiClient for AnthropicClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: Vec<Message>, options: CompletionOptions) -> Result<String> {
        let request = self.build_request(messages, CompletionOptions { tools: None, ..options });
        let response = self.send(&request).await?;

        let (text, _) = split_content(response.content);
        if text.is_empty() {
            return Err(
                AppError::ModelError("No text content in Anthropic response".to_string()).into(),
            );
        }
        Ok(text)
    }

    async fn complete_with_tools(
        &self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> Result<(String, Option<Vec<ToolCall>>)> {
        let request = self.build_request(messages, options);
        let response = self.send(&request).await?;
        tracing::debug!(stop_reason = ?response.stop_reason, "anthropic completion finished");

        let (text, tool_calls) = split_content(response.content);
        let tool_calls = if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        };
        Ok((text, tool_calls))
    }
}

fn extract_system_message(messages: &[Message]) -> Option<String> {
    let system: Vec<&str> = messages
        .iter()
        .filter(|msg| msg.role == "system")
        .map(|msg| msg.content.as_str())
        .collect();

    if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    }
}

fn convert_messages(messages: Vec<Message>) -> Vec<AnthropicMessage> {
    let mut converted: Vec<AnthropicMessage> = Vec::new();

    for msg in messages {
        match msg.role.as_str() {
            "system" => continue,
            "tool" => {
                let result = AnthropicContent::ToolResult {
                    tool_call_id: msg.tool_call_id.unwrap_or_default(),
                    content: msg.content,
                };
                // Results for one assistant turn must share a single user message
                match converted.last_mut() {
                    Some(last)
                        if last.role == "user"
                            && last
                                .content
                                .iter()
                                .all(|c| matches!(c, AnthropicContent::ToolResult { .. })) =>
                    {
                        last.content.push(result)
                    }
                    _ => converted.push(AnthropicMessage {
                        role: "user".to_string(),
                        content: vec![result],
                    }),
                }
            }
            _ => {
                let mut content = Vec::new();
                if !msg.content.is_empty() {
                    content.push(AnthropicContent::Text { text: msg.content });
                }
                for call in msg.tool_calls.unwrap_or_default() {
                    content.push(AnthropicContent::ToolUse {
                        id: call
                            .id
                            .unwrap_or_else(|| format!("toolu_{}", uuid::Uuid::new_v4().simple())),
                        name: call.name,
                        input: call.arguments,
                    });
                }
                match converted.last_mut() {
                    Some(last) if last.role == msg.role => last.content.extend(content),
                    _ => converted.push(AnthropicMessage {
                        role: msg.role,
                        content,
                    }),
                }
            }
        }
    }

    converted
}

fn convert_tool_definitions(tools: Vec<ToolDefinition>) -> Vec<AnthropicTool> {
    tools
        .into_iter()
        .map(|tool| {
            let mut schema = match tool.parameters {
                Value::Object(params) => params,
                _ => serde_json::Map::new(),
            };
            schema
                .entry("type".to_string())
                .or_insert_with(|| json!("object"));

            AnthropicTool {
                name: tool.name,
                description: Some(tool.description),
                schema: Value::Object(schema),
            }
        })
        .collect()
}

fn split_content(content: Vec<AnthropicContent>) -> (String, Vec<ToolCall>) {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for item in content {
        match item {
            AnthropicContent::Text { text: t } => {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&t);
            }
            AnthropicContent::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id: Some(id),
                name,
                arguments: input,
            }),
            AnthropicContent::ToolResult { .. } | AnthropicContent::Unknown => {}
        }
    }

    (text, tool_calls)
}
