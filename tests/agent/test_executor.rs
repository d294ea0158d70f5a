//! Unit tests for the Agent executor module

use crate::common::{FakeTools, ScriptedClient};
use mapbox_agent::agent::executor::AgentExecutor;
use mapbox_agent::apis::api_client::ToolCall;
use serde_json::json;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_text_reply_is_final_answer() {
    let client = ScriptedClient::new().reply_text("About 5 hours by car.");
    let tools = FakeTools::new().with_tool("directions_tool", "unused");

    let mut executor = AgentExecutor::new(&client, &tools);
    executor.add_system_message("system".to_string());
    executor.add_user_message("How far is Paris?".to_string());

    let answer = executor.execute().await.unwrap();
    assert_eq!(answer, "About 5 hours by car.");
    assert_eq!(executor.steps_taken(), 1);
    assert!(tools.call_names().is_empty());

    let history = executor.conversation();
    assert_eq!(history.len(), 3);
    assert_eq!(history[2].role, "assistant");
}

#[tokio::test]
async fn test_tool_definitions_sent_with_each_step() {
    let client = ScriptedClient::new().reply_text("done");
    let tools = FakeTools::new()
        .with_tool("forward_geocode_tool", "")
        .with_tool("directions_tool", "");

    let mut executor = AgentExecutor::new(&client, &tools);
    executor.add_user_message("task".to_string());
    executor.execute().await.unwrap();

    let requests = client.tool_requests.lock().unwrap();
    let sent: Vec<String> = requests[0]
        .1
        .tools
        .as_ref()
        .unwrap()
        .iter()
        .map(|tool| tool.name.clone())
        .collect();
    assert_eq!(sent, vec!["forward_geocode_tool", "directions_tool"]);
}

#[tokio::test]
async fn test_tool_round_trip_feeds_result_back() {
    let client = ScriptedClient::new()
        .reply_tool("forward_geocode_tool", json!({"q": "Big Ben"}))
        .reply_text("Big Ben is at 51.5007, -0.1246");
    let tools = FakeTools::new().with_tool("forward_geocode_tool", "51.5007,-0.1246");

    let mut executor = AgentExecutor::new(&client, &tools);
    executor.add_user_message("Where is Big Ben?".to_string());

    let answer = executor.execute().await.unwrap();
    assert_eq!(answer, "Big Ben is at 51.5007, -0.1246");
    assert_eq!(tools.call_names(), vec!["forward_geocode_tool"]);
    assert_eq!(tools.calls.lock().unwrap()[0].1, json!({"q": "Big Ben"}));

    // Second request carries the assistant tool turn and the matching result
    let requests = client.tool_requests.lock().unwrap();
    let second = &requests[1].0;
    let assistant = &second[1];
    let tool_turn = &second[2];
    assert_eq!(assistant.role, "assistant");
    let call_id = assistant.tool_calls.as_ref().unwrap()[0].id.clone().unwrap();
    assert_eq!(tool_turn.role, "tool");
    assert_eq!(tool_turn.tool_call_id.as_deref(), Some(call_id.as_str()));
    assert_eq!(tool_turn.content, "51.5007,-0.1246");
}

#[tokio::test]
async fn test_parallel_calls_get_one_result_each() {
    let client = ScriptedClient::new()
        .reply_tools(vec![
            ToolCall {
                id: Some("a".into()),
                name: "forward_geocode_tool".into(),
                arguments: json!({"q": "Big Ben"}),
            },
            ToolCall {
                id: Some("b".into()),
                name: "forward_geocode_tool".into(),
                arguments: json!({"q": "Eiffel Tower"}),
            },
        ])
        .reply_text("both found");
    let tools = FakeTools::new().with_tool("forward_geocode_tool", "coords");

    let mut executor = AgentExecutor::new(&client, &tools);
    executor.add_user_message("task".to_string());
    executor.execute().await.unwrap();

    let ids: Vec<_> = executor
        .conversation()
        .iter()
        .filter(|msg| msg.role == "tool")
        .map(|msg| msg.tool_call_id.clone().unwrap())
        .collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn test_tool_errors_become_text_for_the_model() {
    let client = ScriptedClient::new()
        .reply_tool("matrix_tool", json!({}))
        .reply_tool("directions_tool", json!({}))
        .reply_tool("teleport_tool", json!({}))
        .reply_text("gave up");
    let tools = FakeTools::new()
        .with_failing_tool("matrix_tool", "Invalid coordinates")
        .with_broken_tool("directions_tool", "pipe closed");

    let mut executor = AgentExecutor::new(&client, &tools);
    executor.add_user_message("task".to_string());
    assert_eq!(executor.execute().await.unwrap(), "gave up");

    let results: Vec<String> = executor
        .conversation()
        .iter()
        .filter(|msg| msg.role == "tool")
        .map(|msg| msg.content.clone())
        .collect();
    assert_eq!(results[0], "ERROR: Invalid coordinates");
    assert_eq!(results[1], "ERROR: tool 'directions_tool' failed");
    assert!(results[2].starts_with("ERROR: unknown tool 'teleport_tool'"));
    assert!(results[2].contains("matrix_tool"));
    // The unknown tool never reaches the invoker
    assert_eq!(tools.call_names(), vec!["matrix_tool", "directions_tool"]);
}

#[tokio::test]
async fn test_verbose_errors_include_cause() {
    let client = ScriptedClient::new()
        .reply_tool("directions_tool", json!({}))
        .reply_text("ok");
    let tools = FakeTools::new().with_broken_tool("directions_tool", "pipe closed");

    let mut executor = AgentExecutor::new(&client, &tools).with_verbose_errors(true);
    executor.add_user_message("task".to_string());
    executor.execute().await.unwrap();

    let tool_turn = executor
        .conversation()
        .iter()
        .find(|msg| msg.role == "tool")
        .unwrap();
    assert!(tool_turn.content.contains("pipe closed"));
}

#[tokio::test]
async fn test_step_limit_requests_final_answer_without_tools() {
    let client = ScriptedClient::new()
        .reply_tool("version_tool", json!({}))
        .reply_tool("version_tool", json!({}))
        .reply_tool("version_tool", json!({}));
    let tools = FakeTools::new().with_tool("version_tool", "1.0.0");

    let mut executor = AgentExecutor::new(&client, &tools).with_max_steps(2);
    executor.add_user_message("task".to_string());

    let answer = executor.execute().await.unwrap();
    assert_eq!(answer, "best effort answer");
    assert_eq!(executor.steps_taken(), 2);
    assert_eq!(client.tool_request_count(), 2);
    assert_eq!(tools.call_names().len(), 2);

    let plain = client.plain_requests.lock().unwrap();
    assert_eq!(plain.len(), 1);
    let last = plain[0].last().unwrap();
    assert_eq!(last.role, "user");
    assert!(last.content.contains("final answer"));
}

#[tokio::test]
async fn test_model_errors_propagate() {
    // An empty script makes the first request fail
    let client = ScriptedClient::new();
    let tools = FakeTools::new();

    let mut executor = AgentExecutor::new(&client, &tools);
    executor.add_user_message("task".to_string());
    let err = executor.execute().await.unwrap_err();
    assert!(err.to_string().contains("script exhausted"));
}

#[tokio::test]
async fn test_progress_lines_are_sent() {
    let (tx, mut rx) = mpsc::channel(32);
    let client = ScriptedClient::new()
        .reply_tool("version_tool", json!({}))
        .reply_text("v1");
    let tools = FakeTools::new().with_tool("version_tool", "1.0.0");

    let mut executor = AgentExecutor::new(&client, &tools).with_progress_sender(tx);
    executor.add_user_message("task".to_string());
    executor.execute().await.unwrap();
    drop(executor);

    let mut lines = Vec::new();
    while let Some(line) = rx.recv().await {
        lines.push(line);
    }
    assert_eq!(lines[0], "Step 1");
    assert!(lines.iter().any(|l| l.starts_with("Calling tool version_tool")));
    assert!(lines.iter().any(|l| l == "Tool version_tool returned: 1.0.0"));
    assert!(lines.iter().any(|l| l == "Step 2"));
}
