use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::apis::inference_client::InferenceClientModel;
use crate::apis::litellm::LiteLlmClient;
use crate::apis::ollama::OllamaClient;
use crate::apis::openai::OpenAIClient;
use crate::apis::selector::BackendChoice;
use crate::apis::transformers::TransformersModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    /// Calls requested by an assistant turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Set on `tool` turns to point back at the call being answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: String) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: String) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: String) -> Self {
        Self::plain("assistant", content)
    }

    pub fn assistant_with_tools(content: String, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::plain("assistant", content)
        }
    }

    pub fn tool(tool_call_id: String, output: String) -> Self {
        Self {
            tool_call_id: Some(tool_call_id),
            ..Self::plain("tool", output)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: Option<String>, // Required by OpenAI and Anthropic to map results back to calls
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub tools: Option<Vec<ToolDefinition>>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: Some(0.7),
            top_p: Some(0.9),
            max_tokens: Some(2048),
            tools: None,
        }
    }
}

/// Uniform "generate a response from a conversation" capability shared by
/// every backend adapter.
#[async_trait::async_trait]
pub trait ApiClient: Send + Sync {
    /// Model identifier the adapter was built with
    fn model_id(&self) -> &str;

    // Basic completion without tool usage
    async fn complete(&self, messages: Vec<Message>, options: CompletionOptions) -> Result<String>;

    /// Completion that may answer with tool calls instead of (or next to) text.
    /// Tools are taken from `options.tools`.
    async fn complete_with_tools(
        &self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> Result<(String, Option<Vec<ToolCall>>)>;
}

/// Handle to the selected backend. One variant per [`BackendChoice`].
#[derive(Clone)]
pub enum ModelHandle {
    InferenceClient(Arc<InferenceClientModel>),
    Transformers(Arc<TransformersModel>),
    Ollama(Arc<OllamaClient>),
    LiteLlm(Arc<LiteLlmClient>),
    OpenAi(Arc<OpenAIClient>),
}

impl ModelHandle {
    pub fn backend(&self) -> BackendChoice {
        match self {
            Self::InferenceClient(_) => BackendChoice::InferenceClient,
            Self::Transformers(_) => BackendChoice::Transformers,
            Self::Ollama(_) => BackendChoice::Ollama,
            Self::LiteLlm(_) => BackendChoice::LiteLlm,
            Self::OpenAi(_) => BackendChoice::OpenAi,
        }
    }

    fn client(&self) -> &dyn ApiClient {
        match self {
            Self::InferenceClient(client) => client.as_ref(),
            Self::Transformers(client) => client.as_ref(),
            Self::Ollama(client) => client.as_ref(),
            Self::LiteLlm(client) => client.as_ref(),
            Self::OpenAi(client) => client.as_ref(),
        }
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("backend", &self.backend())
            .field("model_id", &self.model_id())
            .finish()
    }
}

#[async_trait::async_trait]
impl ApiClient for ModelHandle {
    fn model_id(&self) -> &str {
        self.client().model_id()
    }

    async fn complete(&self, messages: Vec<Message>, options: CompletionOptions) -> Result<String> {
        self.client().complete(messages, options).await
    }

    async fn complete_with_tools(
        &self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> Result<(String, Option<Vec<ToolCall>>)> {
        self.client().complete_with_tools(messages, options).await
    }
}

/// `User-Agent` sent by every HTTP adapter.
pub fn user_agent() -> String {
    format!("mapbox-agent/{}", env!("CARGO_PKG_VERSION"))
}
