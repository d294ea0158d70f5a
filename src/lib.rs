pub mod agent;
pub mod apis;
pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod logger;
pub mod mcp;
pub mod prompts;

pub use agent::Agent;
pub use apis::api_client::{ApiClient, ModelHandle};
pub use apis::selector::{select_backend, BackendChoice, BackendSettings};
pub use config::Config;
pub use errors::{AppError, ConfigError};
pub use mcp::{ToolInvoker, ToolServerSpec, ToolSession};
