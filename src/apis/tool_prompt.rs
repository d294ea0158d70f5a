//! Text protocol for models without native function calling: tool
//! definitions are rendered into the system prompt and a reply of the form
//! `{"tool": "...", "args": {...}}` is read back as a call.

use serde_json::Value;

use crate::apis::api_client::{Message, ToolCall, ToolDefinition};

pub fn render_tool_prompt(tools: &[ToolDefinition]) -> anyhow::Result<String> {
    let mut prompt = String::from("Available tools:\n\n");

    for tool in tools {
        prompt.push_str(&format!("Tool: {}\n", tool.name));
        prompt.push_str(&format!("Description: {}\n", tool.description));
        prompt.push_str(&format!(
            "Parameters: {}\n\n",
            serde_json::to_string_pretty(&tool.parameters)?
        ));
    }

    prompt.push_str("\nWhen you want to use a tool, respond with JSON in the following format:\n");
    prompt.push_str("```json\n{\n  \"tool\": \"tool_name\",\n  \"args\": { ... parameters ... }\n}\n```\n");
    prompt.push_str("When you have the final answer, reply with plain text instead.\n");

    Ok(prompt)
}

/// Parses a reply as a tool call, tolerating a surrounding ```json fence.
pub fn parse_tool_reply(reply: &str) -> Option<ToolCall> {
    let trimmed = reply.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    if !(body.starts_with('{') && body.ends_with('}')) {
        return None;
    }

    let json_value = serde_json::from_str::<Value>(body).ok()?;
    let tool_name = json_value.get("tool").and_then(|t| t.as_str())?;
    let tool_args = json_value
        .get("args")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));

    Some(ToolCall {
        id: Some(format!("tool-{}", uuid::Uuid::new_v4().simple())),
        name: tool_name.to_string(),
        arguments: tool_args,
    })
}

/// Rewrites tool turns into plain text turns for prompt-only models.
pub fn flatten_tool_turns(messages: Vec<Message>) -> Vec<Message> {
    messages
        .into_iter()
        .map(|msg| {
            if msg.role == "tool" {
                return Message::user(format!(
                    "Tool result for {}: {}",
                    msg.tool_call_id.as_deref().unwrap_or("call"),
                    msg.content
                ));
            }

            let rendered = msg
                .tool_calls
                .as_ref()
                .filter(|calls| !calls.is_empty())
                .map(|calls| {
                    calls
                        .iter()
                        .map(|call| {
                            serde_json::json!({ "tool": call.name, "args": call.arguments })
                                .to_string()
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                });

            match rendered {
                Some(rendered) => Message::assistant(rendered),
                None => msg,
            }
        })
        .collect()
}
