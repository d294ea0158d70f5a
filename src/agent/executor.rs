use crate::apis::api_client::{ApiClient, CompletionOptions, Message, ToolCall, ToolDefinition};
use crate::mcp::ToolInvoker;
use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_STEPS: usize = 20;

const PREVIEW_CHARS: usize = 200;

const FINAL_ANSWER_REQUEST: &str = "You have run out of steps. Using only what you have learned so far, \
give your best final answer to the original task now. Do not call any tools.";

/// One run of the tool-calling loop over a single conversation.
pub struct AgentExecutor<'a> {
    api_client: &'a dyn ApiClient,
    tools: &'a dyn ToolInvoker,
    conversation: Vec<Message>,
    tool_definitions: Vec<ToolDefinition>,
    progress_sender: Option<mpsc::Sender<String>>,
    max_steps: usize,
    verbose_errors: bool,
    steps_taken: usize,
}

impl<'a> AgentExecutor<'a> {
    pub fn new(api_client: &'a dyn ApiClient, tools: &'a dyn ToolInvoker) -> Self {
        let tool_definitions = tools
            .tools()
            .iter()
            .cloned()
            .map(ToolDefinition::from)
            .collect();

        Self {
            api_client,
            tools,
            conversation: Vec::new(),
            tool_definitions,
            progress_sender: None,
            max_steps: DEFAULT_MAX_STEPS,
            verbose_errors: false,
            steps_taken: 0,
        }
    }

    pub fn with_progress_sender(mut self, sender: mpsc::Sender<String>) -> Self {
        self.progress_sender = Some(sender);
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

    pub fn add_system_message(&mut self, content: String) {
        self.conversation.push(Message::system(content));
    }

    pub fn add_user_message(&mut self, content: String) {
        self.conversation.push(Message::user(content));
    }

    pub fn conversation(&self) -> &[Message] {
        &self.conversation
    }

    /// Model calls that were allowed to request tools.
    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    async fn report(&self, line: String) {
        info!("{}", line);
        if let Some(sender) = &self.progress_sender {
            let _ = sender.send(line).await;
        }
    }

    pub async fn execute(&mut self) -> Result<String> {
        let options = CompletionOptions {
            temperature: Some(0.5),
            top_p: Some(0.95),
            max_tokens: Some(4096),
            tools: Some(self.tool_definitions.clone()),
        };

        while self.steps_taken < self.max_steps {
            self.steps_taken += 1;
            let step = self.steps_taken;
            self.report(format!("Step {}", step)).await;

            let (content, tool_calls) = self
                .api_client
                .complete_with_tools(self.conversation.clone(), options.clone())
                .await?;

            let mut calls = match tool_calls.filter(|calls| !calls.is_empty()) {
                Some(calls) => calls,
                None => {
                    self.conversation.push(Message::assistant(content.clone()));
                    self.report(format!("Final answer after {} step(s)", step)).await;
                    return Ok(content);
                }
            };

            // Tool turns are matched to calls by id, so every call needs one
            for (i, call) in calls.iter_mut().enumerate() {
                call.id
                    .get_or_insert_with(|| format!("call_{}_{}", step, i));
            }

            if !content.trim().is_empty() {
                debug!(step, thought = %content, "model reasoning");
            }

            self.conversation
                .push(Message::assistant_with_tools(content, calls.clone()));

            for call in &calls {
                let output = self.invoke(call).await;
                let id = call.id.clone().unwrap_or_default();
                self.conversation.push(Message::tool(id, output));
            }
        }

        warn!(max_steps = self.max_steps, "step limit reached, asking for a final answer");
        self.report(format!(
            "Reached the limit of {} steps, requesting a final answer",
            self.max_steps
        ))
        .await;

        self.conversation
            .push(Message::user(FINAL_ANSWER_REQUEST.to_string()));
        let answer = self
            .api_client
            .complete(
                self.conversation.clone(),
                CompletionOptions {
                    tools: None,
                    ..options
                },
            )
            .await?;
        self.conversation.push(Message::assistant(answer.clone()));
        Ok(answer)
    }

    /// Runs one tool call. Failures are returned as text for the model.
    async fn invoke(&self, call: &ToolCall) -> String {
        self.report(format!("Calling tool {} with {}", call.name, call.arguments))
            .await;

        if !self.tools.tools().iter().any(|tool| tool.name == call.name) {
            let available = self
                .tools
                .tools()
                .iter()
                .map(|tool| tool.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            self.report(format!("Unknown tool {}", call.name)).await;
            return format!(
                "ERROR: unknown tool '{}'. Available tools: {}",
                call.name, available
            );
        }

        match self.tools.call_tool(&call.name, call.arguments.clone()).await {
            Ok(output) if output.is_error => {
                self.report(format!("Tool {} reported an error: {}", call.name, preview(&output.text)))
                    .await;
                format!("ERROR: {}", output.text)
            }
            Ok(output) => {
                self.report(format!("Tool {} returned: {}", call.name, preview(&output.text)))
                    .await;
                output.text
            }
            Err(e) => {
                self.report(format!("Tool {} failed: {}", call.name, e)).await;
                if self.verbose_errors {
                    format!("ERROR: tool '{}' failed: {:#}", call.name, e)
                } else {
                    format!("ERROR: tool '{}' failed", call.name)
                }
            }
        }
    }
}

fn preview(text: &str) -> String {
    let total = text.chars().count();
    if total <= PREVIEW_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{}... [+{} more chars]", head, total - PREVIEW_CHARS)
}
