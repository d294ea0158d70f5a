use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::apis::api_client::{ApiClient, CompletionOptions, Message, ToolCall};
use crate::apis::tool_prompt::{flatten_tool_turns, parse_tool_reply, render_tool_prompt};
use crate::errors::ConfigError;

#[cfg(feature = "local-inference")]
use std::sync::{Arc, Mutex};

/// Context window of a freshly created session.
#[cfg(feature = "local-inference")]
const CONTEXT_WINDOW: u32 = 4096;

/// Where the weights are placed when the model is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum DeviceMap {
    /// Offload every layer the GPU backend accepts
    #[default]
    Auto,
    Cpu,
    /// Offload this many layers
    Gpu(u32),
}

impl DeviceMap {
    pub fn n_gpu_layers(self) -> u32 {
        match self {
            DeviceMap::Auto => u32::MAX,
            DeviceMap::Cpu => 0,
            DeviceMap::Gpu(layers) => layers,
        }
    }
}

impl FromStr for DeviceMap {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            ConfigError::InvalidValue(
                "TRANSFORMERS_DEVICE_MAP".to_string(),
                format!("'{}' (expected auto, cpu, gpu or gpu:<layers>)", s),
            )
        };

        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(DeviceMap::Auto),
            "cpu" => Ok(DeviceMap::Cpu),
            "gpu" | "cuda" | "mps" => Ok(DeviceMap::Auto),
            other => other
                .strip_prefix("gpu:")
                .and_then(|layers| layers.parse().ok())
                .map(DeviceMap::Gpu)
                .ok_or_else(invalid),
        }
    }
}

impl TryFrom<String> for DeviceMap {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for DeviceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMap::Auto => write!(f, "auto"),
            DeviceMap::Cpu => write!(f, "cpu"),
            DeviceMap::Gpu(layers) => write!(f, "gpu:{}", layers),
        }
    }
}

/// Cache location for a model's GGUF weights when no explicit path is set.
pub fn default_model_path(model_id: &str) -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("mapbox-agent")
        .join("models")
        .join(format!("{}.gguf", model_id.replace('/', "__")))
}

/// In-process model. Weights are loaded on the first generation, not at
/// construction.
pub struct TransformersModel {
    model_id: String,
    device_map: DeviceMap,
    max_new_tokens: u32,
    model_path: PathBuf,
    #[cfg(feature = "local-inference")]
    loaded: Arc<Mutex<Option<llama_cpp::LlamaModel>>>,
}

impl TransformersModel {
    pub fn new(
        model_id: String,
        device_map: DeviceMap,
        max_new_tokens: u32,
        model_path: Option<PathBuf>,
    ) -> Self {
        let model_path = model_path.unwrap_or_else(|| default_model_path(&model_id));
        Self {
            model_id,
            device_map,
            max_new_tokens,
            model_path,
            #[cfg(feature = "local-inference")]
            loaded: Arc::new(Mutex::new(None)),
        }
    }

    pub fn device_map(&self) -> DeviceMap {
        self.device_map
    }

    pub fn max_new_tokens(&self) -> u32 {
        self.max_new_tokens
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    fn token_budget(&self, options: &CompletionOptions) -> u32 {
        options
            .max_tokens
            .map_or(self.max_new_tokens, |requested| requested.min(self.max_new_tokens))
    }

    #[cfg(feature = "local-inference")]
    async fn generate(&self, prompt: String, options: &CompletionOptions) -> Result<String> {
        use crate::errors::AppError;
        use llama_cpp::standard_sampler::{SamplerStage, StandardSampler};
        use llama_cpp::{LlamaModel, LlamaParams, SessionParams};

        let loaded = Arc::clone(&self.loaded);
        let model_path = self.model_path.clone();
        let n_gpu_layers = self.device_map.n_gpu_layers();
        let max_tokens = self.token_budget(options) as usize;
        let temperature = options.temperature.unwrap_or(0.7);
        let top_p = options.top_p.unwrap_or(0.9);

        tokio::task::spawn_blocking(move || -> Result<String> {
            let mut slot = loaded
                .lock()
                .map_err(|_| AppError::ModelError("model lock poisoned".to_string()))?;

            if slot.is_none() {
                if !model_path.exists() {
                    return Err(AppError::ModelError(format!(
                        "model weights not found at {}; set TRANSFORMERS_MODEL_PATH to a GGUF file",
                        model_path.display()
                    ))
                    .into());
                }
                tracing::info!(path = %model_path.display(), n_gpu_layers, "loading local model");
                let params = LlamaParams {
                    n_gpu_layers,
                    ..Default::default()
                };
                *slot = Some(LlamaModel::load_from_file(&model_path, params)?);
            }

            let model = slot
                .as_ref()
                .ok_or_else(|| AppError::ModelError("model failed to load".to_string()))?;

            // Fresh session per call so earlier conversations do not leak in
            let mut session = model.create_session(SessionParams {
                n_ctx: CONTEXT_WINDOW,
                ..Default::default()
            })?;
            session.advance_context(&prompt)?;

            let sampler = StandardSampler::new_softmax(
                vec![
                    SamplerStage::TopK(40),
                    SamplerStage::TopP(top_p),
                    SamplerStage::Temperature(temperature),
                ],
                1,
            );

            let mut output = String::new();
            for token in session
                .start_completing_with(sampler, max_tokens)?
                .into_strings()
            {
                output.push_str(&token);
                if output.contains("<|im_end|>") {
                    break;
                }
            }

            Ok(clean_output(&output))
        })
        .await?
    }

    #[cfg(not(feature = "local-inference"))]
    async fn generate(&self, _prompt: String, _options: &CompletionOptions) -> Result<String> {
        Err(crate::errors::AppError::ModelError(format!(
            "the transformers backend ({}) needs local inference support; rebuild with `--features local-inference`",
            self.model_id
        ))
        .into())
    }
}

#[async_trait]
impl ApiClient for TransformersModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, messages: Vec<Message>, options: CompletionOptions) -> Result<String> {
        let prompt = render_chatml(&flatten_tool_turns(messages));
        self.generate(prompt, &options).await
    }

    async fn complete_with_tools(
        &self,
        messages: Vec<Message>,
        options: CompletionOptions,
    ) -> Result<(String, Option<Vec<ToolCall>>)> {
        let mut conversation = flatten_tool_turns(messages);
        if let Some(tools) = options.tools.as_ref().filter(|t| !t.is_empty()) {
            conversation.insert(0, Message::system(render_tool_prompt(tools)?));
        }

        let reply = self.generate(render_chatml(&conversation), &options).await?;
        match parse_tool_reply(&reply) {
            Some(call) => Ok((String::new(), Some(vec![call]))),
            None => Ok((reply, None)),
        }
    }
}

/// ChatML transcript ending with an open assistant turn.
pub fn render_chatml(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for msg in messages {
        prompt.push_str(&format!("<|im_start|>{}\n{}<|im_end|>\n", msg.role, msg.content));
    }
    prompt.push_str("<|im_start|>assistant\n");
    prompt
}

#[cfg_attr(not(feature = "local-inference"), allow(dead_code))]
fn clean_output(raw: &str) -> String {
    let end = raw.find("<|im_end|>").unwrap_or(raw.len());
    raw[..end]
        .replace("<|assistant|>", "")
        .replace("<|user|>", "")
        .trim()
        .to_string()
}
