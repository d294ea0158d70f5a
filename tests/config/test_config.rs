use crate::common::env_from;
use mapbox_agent::apis::selector::BackendChoice;
use mapbox_agent::apis::transformers::DeviceMap;
use mapbox_agent::config::{Config, FileConfig};
use mapbox_agent::errors::ConfigError;
use mapbox_agent::mcp::ServerLaunch;
use std::time::Duration;
use tempfile::TempDir;

const TOKEN: &str = "eyJhbGciOiJIUzI1NiJ9.eyJ1IjoiZXgifQ.c2ln";

fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
    Config::from_sources(FileConfig::default(), env_from(pairs))
}

fn write_file(dir: &TempDir, contents: &str) -> FileConfig {
    let path = dir.path().join("config.json");
    std::fs::write(&path, contents).unwrap();
    FileConfig::read(&path).unwrap()
}

#[test]
fn test_missing_token_is_fatal() {
    let err = load(&[("AGENT_BACKEND", "ollama")]).unwrap_err();
    match err {
        ConfigError::MissingEnvVar(name) => assert_eq!(name, "MAPBOX_ACCESS_TOKEN"),
        other => panic!("unexpected error {:?}", other),
    }

    // Blank counts as unset
    assert!(matches!(
        load(&[("MAPBOX_ACCESS_TOKEN", "  ")]),
        Err(ConfigError::MissingEnvVar(_))
    ));
}

#[test]
fn test_defaults() {
    let config = load(&[("MAPBOX_ACCESS_TOKEN", TOKEN)]).unwrap();
    assert_eq!(config.access_token, TOKEN);
    assert_eq!(config.backend, BackendChoice::OpenAi);
    assert_eq!(config.model_id(), "gpt-4.1-2025-04-14");
    assert_eq!(config.max_steps, 20);
    assert_eq!(config.verbosity, 1);
    assert!(!config.verbose_errors);
    assert_eq!(config.server, ServerLaunch::default());
    assert!(config.server_env.is_empty());
    assert_eq!(config.request_timeout, Duration::from_secs(60));
}

#[test]
fn test_non_jwt_token_is_accepted() {
    let config = load(&[
        ("MAPBOX_ACCESS_TOKEN", "abc123"),
        ("AGENT_BACKEND", "openai"),
        ("AGENT_MODEL_ID", "gpt-4.1-2025-04-14"),
    ])
    .unwrap();
    assert_eq!(config.access_token, "abc123");
    assert_eq!(config.backend, BackendChoice::OpenAi);
    assert_eq!(config.model_id(), "gpt-4.1-2025-04-14");
}

#[test]
fn test_unrecognized_backend() {
    let err = load(&[("MAPBOX_ACCESS_TOKEN", TOKEN), ("AGENT_BACKEND", "bedrock")]).unwrap_err();
    assert!(matches!(err, ConfigError::UnrecognizedBackend(ref tag) if tag == "bedrock"));
}

#[test]
fn test_model_id_applies_to_selected_backend_only() {
    let config = load(&[
        ("MAPBOX_ACCESS_TOKEN", TOKEN),
        ("AGENT_BACKEND", "ollama"),
        ("AGENT_MODEL_ID", "ollama_chat/qwen2.5"),
    ])
    .unwrap();
    assert_eq!(config.model_id(), "ollama_chat/qwen2.5");
    assert_eq!(
        config.backends.model_id(BackendChoice::OpenAi),
        "gpt-4.1-2025-04-14"
    );
}

#[test]
fn test_backend_credentials_and_endpoints() {
    let config = load(&[
        ("MAPBOX_ACCESS_TOKEN", TOKEN),
        ("HF_TOKEN", "hf_test"),
        ("HF_PROVIDER", "together"),
        ("OPENAI_API_KEY", "sk-test"),
        ("ANTHROPIC_API_KEY", "sk-ant"),
        ("LITELLM_API_BASE", "http://localhost:4000"),
        ("OLLAMA_API_BASE", "http://gpu-box:11434"),
        ("OLLAMA_NUM_CTX", "16384"),
        ("TRANSFORMERS_DEVICE_MAP", "cpu"),
        ("TRANSFORMERS_MAX_NEW_TOKENS", "512"),
    ])
    .unwrap();

    let backends = &config.backends;
    assert_eq!(backends.inference_client.api_key.as_deref(), Some("hf_test"));
    assert_eq!(backends.inference_client.provider, "together");
    assert_eq!(backends.openai.api_key.as_deref(), Some("sk-test"));
    assert_eq!(backends.anthropic_api_key.as_deref(), Some("sk-ant"));
    assert_eq!(
        backends.litellm.api_base.as_deref(),
        Some("http://localhost:4000")
    );
    assert_eq!(backends.ollama.api_base, "http://gpu-box:11434");
    assert_eq!(backends.ollama.num_ctx, 16384);
    assert_eq!(backends.transformers.device_map, DeviceMap::Cpu);
    assert_eq!(backends.transformers.max_new_tokens, 512);
}

#[test]
fn test_invalid_values() {
    let cases = [
        ("AGENT_MAX_STEPS", "0"),
        ("AGENT_MAX_STEPS", "many"),
        ("AGENT_VERBOSITY", "3"),
        ("VERBOSE_ERRORS", "sometimes"),
        ("OLLAMA_NUM_CTX", "-1"),
        ("TRANSFORMERS_DEVICE_MAP", "tpu"),
        ("MCP_REQUEST_TIMEOUT_SECS", "soon"),
    ];

    for (name, value) in cases {
        let err = load(&[("MAPBOX_ACCESS_TOKEN", TOKEN), (name, value)]).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue(..)),
            "{}={} gave {:?}",
            name,
            value,
            err
        );
        assert!(err.to_string().contains(name), "{}", err);
    }
}

#[test]
fn test_server_launch_from_env() {
    let config = load(&[
        ("MAPBOX_ACCESS_TOKEN", TOKEN),
        ("MCP_SERVER_COMMAND", "npx"),
        ("MCP_SERVER_ARGS", "-y  @mapbox/mcp-server"),
        ("MAPBOX_API_ENDPOINT", "https://api.mapbox.example/"),
        ("VERBOSE_ERRORS", "true"),
    ])
    .unwrap();

    assert_eq!(
        config.server,
        ServerLaunch::Command {
            command: "npx".to_string(),
            args: vec!["-y".to_string(), "@mapbox/mcp-server".to_string()],
        }
    );
    assert!(config.verbose_errors);
    assert_eq!(
        config.server_env.get("MAPBOX_API_ENDPOINT").map(String::as_str),
        Some("https://api.mapbox.example/")
    );
    assert_eq!(
        config.server_env.get("VERBOSE_ERRORS").map(String::as_str),
        Some("true")
    );
}

#[test]
fn test_docker_image_wins_over_command() {
    let config = load(&[
        ("MAPBOX_ACCESS_TOKEN", TOKEN),
        ("MCP_SERVER_COMMAND", "node"),
        ("MCP_SERVER_DOCKER_IMAGE", "mapbox-mcp-server"),
    ])
    .unwrap();
    assert_eq!(
        config.server,
        ServerLaunch::Docker {
            image: "mapbox-mcp-server".to_string()
        }
    );
}

#[test]
fn test_env_overrides_file() {
    let dir = TempDir::new().unwrap();
    let file = write_file(
        &dir,
        r#"{
            "backend": "ollama",
            "model_id": "ollama_chat/mistral",
            "max_steps": 8,
            "verbosity": 2,
            "request_timeout_secs": 15,
            "server": {"kind": "docker", "image": "mapbox/mcp-server:latest"},
            "backends": {"ollama": {"num_ctx": 4096}}
        }"#,
    );

    let from_file = Config::from_sources(file.clone(), env_from(&[("MAPBOX_ACCESS_TOKEN", TOKEN)]))
        .unwrap();
    assert_eq!(from_file.backend, BackendChoice::Ollama);
    assert_eq!(from_file.model_id(), "ollama_chat/mistral");
    assert_eq!(from_file.max_steps, 8);
    assert_eq!(from_file.verbosity, 2);
    assert_eq!(from_file.request_timeout, Duration::from_secs(15));
    assert_eq!(from_file.backends.ollama.num_ctx, 4096);
    assert!(matches!(from_file.server, ServerLaunch::Docker { .. }));

    let overridden = Config::from_sources(
        file,
        env_from(&[
            ("MAPBOX_ACCESS_TOKEN", TOKEN),
            ("AGENT_MAX_STEPS", "3"),
            ("AGENT_MODEL_ID", "ollama_chat/llama3.2"),
            ("MCP_SERVER_COMMAND", "node"),
            ("OLLAMA_NUM_CTX", ""),
        ]),
    )
    .unwrap();
    assert_eq!(overridden.backend, BackendChoice::Ollama);
    assert_eq!(overridden.model_id(), "ollama_chat/llama3.2");
    assert_eq!(overridden.max_steps, 3);
    assert_eq!(overridden.backends.ollama.num_ctx, 4096);
    assert_eq!(
        overridden.server,
        ServerLaunch::Command {
            command: "node".to_string(),
            args: vec!["dist/index.js".to_string()],
        }
    );
}

#[test]
fn test_bad_config_file() {
    let dir = TempDir::new().unwrap();

    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"backend": "openai", "colour": "blue"}"#).unwrap();
    let err = FileConfig::read(&path).unwrap_err();
    match &err {
        ConfigError::ConfigFile { path: reported, .. } => {
            assert_eq!(reported, &path.display().to_string())
        }
        other => panic!("unexpected error {:?}", other),
    }

    std::fs::write(&path, r#"{"backend": "claude"}"#).unwrap();
    assert!(FileConfig::read(&path).is_err());

    let missing = dir.path().join("absent.json");
    assert!(matches!(
        FileConfig::read(&missing),
        Err(ConfigError::ConfigFile { .. })
    ));
}
