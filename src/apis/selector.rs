use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::apis::api_client::ModelHandle;
use crate::apis::inference_client::InferenceClientModel;
use crate::apis::litellm::{LiteLlmClient, LiteLlmProvider};
use crate::apis::ollama::{OllamaClient, DEFAULT_OLLAMA_API_BASE, RECOMMENDED_NUM_CTX};
use crate::apis::openai::{OpenAIClient, DEFAULT_OPENAI_API_BASE};
use crate::apis::transformers::{DeviceMap, TransformersModel};
use crate::errors::ConfigError;

/// The closed set of LLM backends the agent can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BackendChoice {
    InferenceClient,
    Transformers,
    Ollama,
    LiteLlm,
    #[default]
    OpenAi,
}

impl BackendChoice {
    pub const ALL: [BackendChoice; 5] = [
        BackendChoice::InferenceClient,
        BackendChoice::Transformers,
        BackendChoice::Ollama,
        BackendChoice::LiteLlm,
        BackendChoice::OpenAi,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendChoice::InferenceClient => "inference_client",
            BackendChoice::Transformers => "transformers",
            BackendChoice::Ollama => "ollama",
            BackendChoice::LiteLlm => "litellm",
            BackendChoice::OpenAi => "openai",
        }
    }
}

impl FromStr for BackendChoice {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        Self::ALL
            .into_iter()
            .find(|choice| choice.as_str().eq_ignore_ascii_case(tag))
            .ok_or_else(|| ConfigError::UnrecognizedBackend(s.to_string()))
    }
}

impl TryFrom<String> for BackendChoice {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BackendChoice> for String {
    fn from(choice: BackendChoice) -> Self {
        choice.as_str().to_string()
    }
}

impl fmt::Display for BackendChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceClientParams {
    pub model_id: String,
    pub provider: String,
    pub api_key: Option<String>,
}

impl Default for InferenceClientParams {
    fn default() -> Self {
        Self {
            model_id: "meta-llama/Llama-3.3-70B-Instruct".to_string(),
            provider: "nebius".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransformersParams {
    pub model_id: String,
    pub device_map: DeviceMap,
    pub max_new_tokens: u32,
    pub model_path: Option<PathBuf>,
}

impl Default for TransformersParams {
    fn default() -> Self {
        Self {
            model_id: "HuggingFaceTB/SmolLM2-1.7B-Instruct".to_string(),
            device_map: DeviceMap::Auto,
            max_new_tokens: 1000,
            model_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaParams {
    pub model_id: String,
    pub api_base: String,
    pub api_key: Option<String>,
    pub num_ctx: u32,
}

impl Default for OllamaParams {
    fn default() -> Self {
        Self {
            model_id: "ollama_chat/llama3.2".to_string(),
            api_base: DEFAULT_OLLAMA_API_BASE.to_string(),
            api_key: None,
            num_ctx: RECOMMENDED_NUM_CTX,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiteLlmParams {
    /// Provider-qualified, e.g. `anthropic/claude-3-5-sonnet-latest`
    pub model_id: String,
    /// OpenAI-compatible proxy; when set the model id is forwarded unchanged
    pub api_base: Option<String>,
    pub api_key: Option<String>,
}

impl Default for LiteLlmParams {
    fn default() -> Self {
        Self {
            model_id: "gpt-4o".to_string(),
            api_base: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiParams {
    pub model_id: String,
    pub api_base: Option<String>,
    pub api_key: Option<String>,
}

impl Default for OpenAiParams {
    fn default() -> Self {
        Self {
            model_id: "gpt-4.1-2025-04-14".to_string(),
            api_base: None,
            api_key: None,
        }
    }
}

/// Parameters for every backend. Only the selected one is used.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub inference_client: InferenceClientParams,
    pub transformers: TransformersParams,
    pub ollama: OllamaParams,
    pub litellm: LiteLlmParams,
    pub openai: OpenAiParams,
    /// Used by litellm for `anthropic/...` model ids
    pub anthropic_api_key: Option<String>,
}

impl BackendSettings {
    pub fn model_id(&self, choice: BackendChoice) -> &str {
        match choice {
            BackendChoice::InferenceClient => &self.inference_client.model_id,
            BackendChoice::Transformers => &self.transformers.model_id,
            BackendChoice::Ollama => &self.ollama.model_id,
            BackendChoice::LiteLlm => &self.litellm.model_id,
            BackendChoice::OpenAi => &self.openai.model_id,
        }
    }

    /// Replaces the model id of one backend, leaving the others untouched.
    pub fn set_model_id(&mut self, choice: BackendChoice, model_id: String) {
        match choice {
            BackendChoice::InferenceClient => self.inference_client.model_id = model_id,
            BackendChoice::Transformers => self.transformers.model_id = model_id,
            BackendChoice::Ollama => self.ollama.model_id = model_id,
            BackendChoice::LiteLlm => self.litellm.model_id = model_id,
            BackendChoice::OpenAi => self.openai.model_id = model_id,
        }
    }
}

fn require(value: &Option<String>, var: &str) -> Result<String, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
}

/// Builds the client for `choice`. Nothing is contacted and no weights are
/// loaded here.
pub fn select_backend(choice: BackendChoice, settings: &BackendSettings) -> Result<ModelHandle> {
    debug!(backend = %choice, model_id = settings.model_id(choice), "selecting backend");

    let handle = match choice {
        BackendChoice::InferenceClient => {
            let params = &settings.inference_client;
            let token = require(&params.api_key, "HF_TOKEN")?;
            ModelHandle::InferenceClient(Arc::new(InferenceClientModel::new(
                params.model_id.clone(),
                params.provider.clone(),
                token,
            )?))
        }
        BackendChoice::Transformers => {
            let params = &settings.transformers;
            ModelHandle::Transformers(Arc::new(TransformersModel::new(
                params.model_id.clone(),
                params.device_map,
                params.max_new_tokens,
                params.model_path.clone(),
            )))
        }
        BackendChoice::Ollama => {
            let params = &settings.ollama;
            ModelHandle::Ollama(Arc::new(OllamaClient::new(
                params.model_id.clone(),
                params.api_base.clone(),
                params.api_key.clone(),
                params.num_ctx,
            )?))
        }
        BackendChoice::LiteLlm => {
            let params = &settings.litellm;
            let provider =
                LiteLlmProvider::detect(&params.model_id, params.api_base.as_deref())?;
            // An explicit LITELLM_API_KEY applies to every route
            let own_key = params
                .api_key
                .clone()
                .filter(|key| !key.trim().is_empty());
            let api_key = match provider {
                LiteLlmProvider::OpenAi => Some(require(
                    &own_key.or_else(|| settings.openai.api_key.clone()),
                    "OPENAI_API_KEY",
                )?),
                LiteLlmProvider::Anthropic => Some(require(
                    &own_key.or_else(|| settings.anthropic_api_key.clone()),
                    "ANTHROPIC_API_KEY",
                )?),
                LiteLlmProvider::Ollama => own_key.or_else(|| settings.ollama.api_key.clone()),
                LiteLlmProvider::Proxy => own_key,
            };
            ModelHandle::LiteLlm(Arc::new(LiteLlmClient::new(
                params.model_id.clone(),
                params.api_base.clone(),
                api_key,
            )?))
        }
        BackendChoice::OpenAi => {
            let params = &settings.openai;
            let api_key = require(&params.api_key, "OPENAI_API_KEY")?;
            let api_base = params
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_string());
            ModelHandle::OpenAi(Arc::new(OpenAIClient::with_base_url(
                Some(api_key),
                params.model_id.clone(),
                api_base,
            )?))
        }
    };

    info!(backend = %choice, model_id = settings.model_id(choice), "backend selected");
    Ok(handle)
}
