use thiserror::Error;

/// Fatal startup problems. Nothing is retried and no process is spawned once
/// one of these is raised.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unrecognized backend: '{0}'")]
    UnrecognizedBackend(String),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to load config file {path}: {message}")]
    ConfigFile { path: String, message: String },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network Error: {0}")]
    NetworkError(String),

    #[error("Model Error: {0}")]
    ModelError(String),

    #[error("Protocol Error: {0}")]
    ProtocolError(String),

    #[error("Configuration Error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::NetworkError(err.to_string())
    }
}

/// Returns true if `err` (or anything it wraps) is a [`ConfigError`].
pub fn is_config_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.downcast_ref::<ConfigError>().is_some()
            || matches!(
                cause.downcast_ref::<AppError>(),
                Some(AppError::ConfigError(_))
            )
    })
}
