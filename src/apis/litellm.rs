use anyhow::Result;
use async_trait::async_trait;

use crate::apis::anthropic::AnthropicClient;
use crate::apis::api_client::{ApiClient, CompletionOptions, Message, ToolCall};
use crate::apis::ollama::{OllamaClient, DEFAULT_OLLAMA_API_BASE, RECOMMENDED_NUM_CTX};
use crate::apis::openai::{OpenAIClient, DEFAULT_OPENAI_API_BASE};
use crate::errors::ConfigError;

/// Where a provider-qualified model id is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteLlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
    /// Any OpenAI-compatible endpoint, typically a LiteLLM proxy server
    Proxy,
}

impl LiteLlmProvider {
    /// Ollama prefixes always go to Ollama; otherwise an explicit `api_base`
    /// wins over the prefix.
    pub fn detect(model_id: &str, api_base: Option<&str>) -> Result<Self, ConfigError> {
        let prefix = model_id.split_once('/').map(|(prefix, _)| prefix);

        match prefix {
            Some("ollama") | Some("ollama_chat") => Ok(Self::Ollama),
            _ if api_base.is_some() => Ok(Self::Proxy),
            None | Some("openai") => Ok(Self::OpenAi),
            Some("anthropic") => Ok(Self::Anthropic),
            Some(other) => Err(ConfigError::InvalidValue(
                "litellm model id".to_string(),
                format!(
                    "unsupported provider '{}' in '{}'; set LITELLM_API_BASE to route through a LiteLLM proxy",
                    other, model_id
                ),
            )),
        }
    }

    /// Environment variable holding the credential this route needs, if any.
    pub fn key_env_var(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Ollama | Self::Proxy => None,
        }
    }
}

enum Route {
    OpenAi(OpenAIClient),
    Anthropic(AnthropicClient),
    Ollama(OllamaClient),
}

/// Multi-provider adapter addressed by a `provider/model` id.
pub struct LiteLlmClient {
    model_id: String,
    provider: LiteLlmProvider,
    route: Route,
}

impl LiteLlmClient {
    /// `api_key` must already be resolved for the detected provider.
    pub fn new(model_id: String, api_base: Option<String>, api_key: Option<String>) -> Result<Self> {
        let provider = LiteLlmProvider::detect(&model_id, api_base.as_deref())?;

        if let Some(var) = provider.key_env_var() {
            if api_key.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::MissingEnvVar(var.to_string()).into());
            }
        }

        let bare_model = model_id
            .split_once('/')
            .map(|(_, rest)| rest.to_string())
            .unwrap_or_else(|| model_id.clone());

        let route = match provider {
            LiteLlmProvider::OpenAi => Route::OpenAi(OpenAIClient::with_base_url(
                api_key,
                bare_model,
                DEFAULT_OPENAI_API_BASE.to_string(),
            )?),
            LiteLlmProvider::Anthropic => Route::Anthropic(AnthropicClient::with_api_key(
                api_key.unwrap_or_default(),
                bare_model,
            )?),
            LiteLlmProvider::Ollama => Route::Ollama(OllamaClient::new(
                model_id.clone(),
                api_base.unwrap_or_else(|| DEFAULT_OLLAMA_API_BASE.to_string()),
                api_key,
                RECOMMENDED_NUM_CTX,
            )?),
            // The proxy resolves the full provider-qualified id itself
            LiteLlmProvider::Proxy => Route::OpenAi(
                OpenAIClient::with_base_url(api_key, model_id.clone(), api_base.unwrap_or_default())?
                    .with_provider_label("LiteLLM proxy"),
            ),
        };

        Ok(Self {
            model_id,
            provider,
            route,
        })
    }

    pub fn provider(&self) -> LiteLlmProvider {
        self.provider
    }

    fn client(&self) -> &dyn ApiClient {
        match &self.route {
            Route::OpenAi(client) => client,
            Route::Anthropic(client) => client,
            Route::Ollama(client) => client,
        }
    }
}

#[async_trait]
impl ApiClient for LiteLlmClient {
    fn model_id(&self) -> &str {
        &self.model_id
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
