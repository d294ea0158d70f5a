//! Runtime configuration.
//!
//! Values come from an optional JSON file and from environment variables
//! (a `.env` file is loaded first). Environment variables win over the file.
//!
//! - `MAPBOX_ACCESS_TOKEN` - Required. Passed to the tool server.
//! - `AGENT_BACKEND` - One of `inference_client`, `transformers`, `ollama`, `litellm`, `openai`.
//! - `AGENT_MODEL_ID` - Overrides the model of the selected backend.
//! - `AGENT_MAX_STEPS`, `AGENT_VERBOSITY` (0-2), `VERBOSE_ERRORS`.
//! - Backend credentials and endpoints, see [`Config::from_sources`].
//! - `MCP_SERVER_COMMAND`, `MCP_SERVER_ARGS`, `MCP_SERVER_DOCKER_IMAGE`, `MCP_REQUEST_TIMEOUT_SECS`.
//! - `MAPBOX_AGENT_CONFIG` - Path of the JSON file. Defaults to
//!   `<config dir>/mapbox-agent/config.json`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::agent::DEFAULT_MAX_STEPS;
use crate::apis::selector::{BackendChoice, BackendSettings};
use crate::errors::ConfigError;
use crate::mcp::server_spec::{
    ServerLaunch, ACCESS_TOKEN_VAR, DEFAULT_SERVER_ARGS, DEFAULT_SERVER_COMMAND,
};
use crate::mcp::session::DEFAULT_REQUEST_TIMEOUT;

pub const CONFIG_PATH_VAR: &str = "MAPBOX_AGENT_CONFIG";

/// Variables copied into the tool server's environment when set.
const FORWARDED_SERVER_VARS: [&str; 2] = ["MAPBOX_API_ENDPOINT", "VERBOSE_ERRORS"];

/// Shape of the optional JSON config file. Every field may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub backend: Option<BackendChoice>,
    pub model_id: Option<String>,
    pub max_steps: Option<usize>,
    pub verbosity: Option<u8>,
    pub verbose_errors: Option<bool>,
    pub request_timeout_secs: Option<u64>,
    pub server: Option<ServerLaunch>,
    pub backends: BackendSettings,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let file_error = |message: String| ConfigError::ConfigFile {
            path: path.display().to_string(),
            message,
        };

        let contents = std::fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| file_error(e.to_string()))
    }
}

#[derive(Clone)]
pub struct Config {
    pub access_token: String,
    pub backend: BackendChoice,
    pub backends: BackendSettings,
    pub max_steps: usize,
    pub verbosity: u8,
    pub verbose_errors: bool,
    pub server: ServerLaunch,
    /// Extra variables for the tool server on top of the access token
    pub server_env: BTreeMap<String, String>,
    pub request_timeout: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("access_token", &"<redacted>")
            .field("backend", &self.backend)
            .field("model_id", &self.model_id())
            .field("max_steps", &self.max_steps)
            .field("verbosity", &self.verbosity)
            .field("verbose_errors", &self.verbose_errors)
            .field("server", &self.server)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Location of the config file, if one can be determined.
pub fn config_path() -> Option<PathBuf> {
    match std::env::var(CONFIG_PATH_VAR) {
        Ok(path) if !path.trim().is_empty() => Some(PathBuf::from(path)),
        _ => dirs::config_dir().map(|dir| dir.join("mapbox-agent").join("config.json")),
    }
}

/// True for tokens in `header.payload.signature` form, which is what Mapbox
/// access tokens look like.
pub fn looks_like_jwt(token: &str) -> bool {
    let parts: Vec<&str> = token.split('.').collect();
    parts.len() == 3 && parts.iter().all(|part| !part.is_empty())
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not a boolean", other),
        )),
    }
}

impl Config {
    /// Loads `.env`, the config file (if present) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenv::dotenv() {
            debug!(path = %path.display(), "loaded .env file");
        }

        let file = match config_path() {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "reading config file");
                FileConfig::read(&path)?
            }
            _ => FileConfig::default(),
        };

        Self::from_sources(file, |name| std::env::var(name).ok())
    }

    /// Builds the configuration from file values overlaid with variables
    /// returned by `lookup`. Blank variables count as unset.
    pub fn from_sources<F>(file: FileConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let access_token = var(ACCESS_TOKEN_VAR)
            .map(|token| token.trim().to_string())
            .ok_or_else(|| ConfigError::MissingEnvVar(ACCESS_TOKEN_VAR.to_string()))?;
        if !looks_like_jwt(&access_token) {
            warn!("MAPBOX_ACCESS_TOKEN is not in header.payload.signature form; the tool server will likely reject it");
        }

        let backend = match var("AGENT_BACKEND") {
            Some(tag) => tag.parse::<BackendChoice>()?,
            None => file.backend.unwrap_or_default(),
        };

        let mut backends = file.backends;

        if let Some(key) = var("HF_TOKEN") {
            backends.inference_client.api_key = Some(key);
        }
        if let Some(provider) = var("HF_PROVIDER") {
            backends.inference_client.provider = provider;
        }

        if let Some(device_map) = var("TRANSFORMERS_DEVICE_MAP") {
            backends.transformers.device_map = device_map.parse()?;
        }
        if let Some(max_new_tokens) = var("TRANSFORMERS_MAX_NEW_TOKENS") {
            backends.transformers.max_new_tokens =
                parse_var("TRANSFORMERS_MAX_NEW_TOKENS", &max_new_tokens)?;
        }
        if let Some(path) = var("TRANSFORMERS_MODEL_PATH") {
            backends.transformers.model_path = Some(PathBuf::from(path));
        }

        if let Some(api_base) = var("OLLAMA_API_BASE") {
            backends.ollama.api_base = api_base;
        }
        if let Some(key) = var("OLLAMA_API_KEY") {
            backends.ollama.api_key = Some(key);
        }
        if let Some(num_ctx) = var("OLLAMA_NUM_CTX") {
            backends.ollama.num_ctx = parse_var("OLLAMA_NUM_CTX", &num_ctx)?;
        }

        if let Some(api_base) = var("LITELLM_API_BASE") {
            backends.litellm.api_base = Some(api_base);
        }
        if let Some(key) = var("LITELLM_API_KEY") {
            backends.litellm.api_key = Some(key);
        }
        if let Some(key) = var("ANTHROPIC_API_KEY") {
            backends.anthropic_api_key = Some(key);
        }

        if let Some(key) = var("OPENAI_API_KEY") {
            backends.openai.api_key = Some(key);
        }
        if let Some(api_base) = var("OPENAI_API_BASE") {
            backends.openai.api_base = Some(api_base);
        }

        if let Some(model_id) = var("AGENT_MODEL_ID").or(file.model_id) {
            backends.set_model_id(backend, model_id);
        }

        let max_steps = match var("AGENT_MAX_STEPS") {
            Some(steps) => parse_var("AGENT_MAX_STEPS", &steps)?,
            None => file.max_steps.unwrap_or(DEFAULT_MAX_STEPS),
        };
        if max_steps == 0 {
            return Err(ConfigError::InvalidValue(
                "AGENT_MAX_STEPS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let verbosity = match var("AGENT_VERBOSITY") {
            Some(level) => parse_var("AGENT_VERBOSITY", &level)?,
            None => file.verbosity.unwrap_or(1),
        };
        if verbosity > 2 {
            return Err(ConfigError::InvalidValue(
                "AGENT_VERBOSITY".to_string(),
                format!("{} is outside 0-2", verbosity),
            ));
        }

        let verbose_errors = match var("VERBOSE_ERRORS") {
            Some(flag) => parse_flag("VERBOSE_ERRORS", &flag)?,
            None => file.verbose_errors.unwrap_or(false),
        };

        let request_timeout = match var("MCP_REQUEST_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(parse_var("MCP_REQUEST_TIMEOUT_SECS", &secs)?),
            None => file
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        };

        let server = if let Some(image) = var("MCP_SERVER_DOCKER_IMAGE") {
            ServerLaunch::Docker { image }
        } else {
            let command = var("MCP_SERVER_COMMAND");
            let args = var("MCP_SERVER_ARGS")
                .map(|args| args.split_whitespace().map(str::to_string).collect::<Vec<_>>());

            match (command, args, file.server) {
                (None, None, Some(server)) => server,
                (command, args, _) => ServerLaunch::Command {
                    command: command.unwrap_or_else(|| DEFAULT_SERVER_COMMAND.to_string()),
                    args: args.unwrap_or_else(|| {
                        DEFAULT_SERVER_ARGS.iter().map(|arg| arg.to_string()).collect()
                    }),
                },
            }
        };

        let server_env = FORWARDED_SERVER_VARS
            .iter()
            .filter_map(|name| var(*name).map(|value| (name.to_string(), value)))
            .collect();

        Ok(Self {
            access_token,
            backend,
            backends,
            max_steps,
            verbosity,
            verbose_errors,
            server,
            server_env,
            request_timeout,
        })
    }

    pub fn model_id(&self) -> &str {
        self.backends.model_id(self.backend)
    }
}
