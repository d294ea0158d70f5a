use anyhow::Result;
use async_trait::async_trait;

use crate::apis::api_client::{ApiClient, CompletionOptions, Message, ToolCall};
use crate::apis::openai::OpenAIClient;

/// OpenAI-compatible router in front of the Hugging Face inference providers.
pub const HF_ROUTER_API_BASE: &str = "https://router.huggingface.co/v1";

/// Hosted inference through a named Hugging Face inference provider
/// (nebius, together, sambanova, ...).
pub struct InferenceClientModel {
    model_id: String,
    provider: String,
    inner: OpenAIClient,
}

impl InferenceClientModel {
    pub fn new(model_id: String, provider: String, token: String) -> Result<Self> {
        Self::with_router(model_id, provider, token, HF_ROUTER_API_BASE.to_string())
    }

    pub fn with_router(
        model_id: String,
        provider: String,
        token: String,
        router_base: String,
    ) -> Result<Self> {
        // The router picks the provider from a `model:provider` suffix
        let routed_model = if provider.is_empty() || provider == "auto" {
            model_id.clone()
        } else {
            format!("{}:{}", model_id, provider)
        };

        let inner = OpenAIClient::with_base_url(Some(token), routed_model, router_base)?
            .with_provider_label("Hugging Face inference");

        Ok(Self {
            model_id,
            provider,
            inner,
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Model string sent on the wire, including the provider suffix.
    pub fn routed_model(&self) -> &str {
        self.inner.model_id()
    }
}

#[async_trait]
impl ApiClient for InferenceClientModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, messages: Vec<Message>, options: CompletionOptions) -> Result<String> {
        self.inner.complete(messages, options).await
    }

    async fn complete_with_tools(
        &self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> Result<(String, Option<Vec<ToolCall>>)> {
        self.inner.complete_with_tools(messages, options).await
    }
}
