use crate::agent::executor::{AgentExecutor, DEFAULT_MAX_STEPS};
use crate::apis::api_client::ApiClient;
use crate::mcp::ToolInvoker;
use crate::prompts::DEFAULT_AGENT_PROMPT;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Tool-calling agent bound to one model. Each `run` starts a fresh
/// conversation.
#[derive(Clone)]
pub struct Agent {
    api_client: Arc<dyn ApiClient>,
    system_prompt: Option<String>,
    max_steps: usize,
    verbose_errors: bool,
    progress_sender: Option<mpsc::Sender<String>>,
}

impl Agent {
    pub fn new<C: ApiClient + 'static>(api_client: C) -> Self {
        Self {
            api_client: Arc::new(api_client),
            system_prompt: None,
            max_steps: DEFAULT_MAX_STEPS,
            verbose_errors: false,
            progress_sender: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: String) -> Self {
        self.system_prompt = Some(prompt);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_verbose_errors(mut self, verbose_errors: bool) -> Self {
        self.verbose_errors = verbose_errors;
        self
    }

    pub fn with_progress_sender(mut self, sender: mpsc::Sender<String>) -> Self {
        self.progress_sender = Some(sender);
        self
    }

    pub fn model_id(&self) -> &str {
        self.api_client.model_id()
    }

    pub async fn run(&self, task: &str, tools: &dyn ToolInvoker) -> Result<String> {
        let mut executor = AgentExecutor::new(self.api_client.as_ref(), tools)
            .with_max_steps(self.max_steps)
            .with_verbose_errors(self.verbose_errors);

        if let Some(sender) = &self.progress_sender {
            executor = executor.with_progress_sender(sender.clone());
        }

        executor.add_system_message(
            self.system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_AGENT_PROMPT.trim().to_string()),
        );
        executor.add_user_message(task.to_string());

        executor.execute().await
    }
}
