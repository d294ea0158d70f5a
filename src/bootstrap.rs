use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;

use crate::agent::Agent;
use crate::apis::selector::select_backend;
use crate::config::Config;
use crate::mcp::{ToolServerSpec, ToolSession};

/// Selects the backend, starts the tool server and runs `task` to completion.
/// The server process is gone when this returns.
pub async fn run(
    config: &Config,
    task: &str,
    progress: Option<mpsc::Sender<String>>,
) -> Result<String> {
    // Backend problems are configuration problems; surface them before
    // anything is spawned
    let model = select_backend(config.backend, &config.backends)?;

    let spec = ToolServerSpec::new(
        &config.access_token,
        &config.server,
        config.server_env.clone(),
    );

    let mut agent = Agent::new(model)
        .with_max_steps(config.max_steps)
        .with_verbose_errors(config.verbose_errors);
    if let Some(sender) = progress {
        agent = agent.with_progress_sender(sender);
    }

    info!(backend = %config.backend, model_id = agent.model_id(), task, "running task");

    let task = task.to_string();
    ToolSession::scope(&spec, config.request_timeout, move |session| {
        Box::pin(async move { agent.run(&task, session).await })
    })
    .await
}
