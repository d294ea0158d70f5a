use crate::common::{FakeTools, ScriptedClient};
use mapbox_agent::prompts::DEFAULT_AGENT_PROMPT;
use mapbox_agent::Agent;
use serde_json::json;

#[tokio::test]
async fn test_run_starts_with_system_prompt_and_task() {
    let client = ScriptedClient::new().reply_text("5 hours 12 minutes");
    let agent = Agent::new(client.clone());
    assert_eq!(agent.model_id(), "scripted-model");

    let answer = agent
        .run("How long from Big Ben to the Eiffel Tower?", &FakeTools::new())
        .await
        .unwrap();
    assert_eq!(answer, "5 hours 12 minutes");

    let requests = client.tool_requests.lock().unwrap();
    let messages = &requests[0].0;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, "system");
    assert_eq!(messages[0].content, DEFAULT_AGENT_PROMPT.trim());
    assert_eq!(messages[1].content, "How long from Big Ben to the Eiffel Tower?");
}

#[tokio::test]
async fn test_custom_prompt_and_step_cap() {
    let client = ScriptedClient::new()
        .reply_tool("version_tool", json!({}))
        .reply_tool("version_tool", json!({}));
    let tools = FakeTools::new().with_tool("version_tool", "1.0.0");

    let agent = Agent::new(client.clone())
        .with_system_prompt("Answer in one word.".to_string())
        .with_max_steps(1);

    let answer = agent.run("version?", &tools).await.unwrap();
    assert_eq!(answer, "best effort answer");
    assert_eq!(client.tool_request_count(), 1);
    assert_eq!(
        client.tool_requests.lock().unwrap()[0].0[0].content,
        "Answer in one word."
    );
}

#[tokio::test]
async fn test_each_run_is_a_fresh_conversation() {
    let client = ScriptedClient::new().reply_text("first").reply_text("second");
    let agent = Agent::new(client.clone());
    let tools = FakeTools::new();

    agent.run("one", &tools).await.unwrap();
    agent.run("two", &tools).await.unwrap();

    let requests = client.tool_requests.lock().unwrap();
    assert_eq!(requests[1].0.len(), 2);
    assert_eq!(requests[1].0[1].content, "two");
}
