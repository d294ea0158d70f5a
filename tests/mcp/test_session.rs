use super::fake_server::{process_alive, script_spec};
use anyhow::anyhow;
use mapbox_agent::mcp::{ToolInvoker, ToolServerSpec, ToolSession};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_handshake_lists_tools() {
    let dir = TempDir::new().unwrap();
    let spec = script_spec(dir.path(), &[]);

    let session = ToolSession::start(&spec, TIMEOUT).await.unwrap();
    let names: Vec<&str> = session.tools().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["version_tool", "directions_tool"]);

    let directions = &session.tools()[1];
    assert_eq!(directions.description.as_deref(), Some("Route between points"));
    assert_eq!(directions.input_schema["required"][0], "coordinates");

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_call_tool_skips_notifications_and_log_lines() {
    let dir = TempDir::new().unwrap();
    let spec = script_spec(dir.path(), &[]);

    let output = ToolSession::scope(&spec, TIMEOUT, |session| {
        Box::pin(async move { session.call_tool("version_tool", json!({})).await })
    })
    .await
    .unwrap();

    assert_eq!(output.text, "fake-mapbox 0.0.1");
    assert!(!output.is_error);
}

#[tokio::test]
async fn test_tool_error_is_reported_not_raised() {
    let dir = TempDir::new().unwrap();
    let spec = script_spec(dir.path(), &[]);

    let output = ToolSession::scope(&spec, TIMEOUT, |session| {
        Box::pin(async move {
            let invoker: &dyn ToolInvoker = session;
            invoker
                .call_tool("directions_tool", json!({"coordinates": []}))
                .await
        })
    })
    .await
    .unwrap();

    assert!(output.is_error);
    assert_eq!(output.text, "Invalid coordinates");
}

#[tokio::test]
async fn test_rpc_error_becomes_err() {
    let dir = TempDir::new().unwrap();
    let spec = script_spec(dir.path(), &[]);

    let err = ToolSession::scope(&spec, TIMEOUT, |session| {
        Box::pin(async move { session.call_tool("no_such_tool", json!({})).await })
    })
    .await
    .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("tools/call"), "{}", message);
    assert!(message.contains("Unknown tool"), "{}", message);
}

#[tokio::test]
async fn test_sequential_calls_reuse_the_session() {
    let dir = TempDir::new().unwrap();
    let spec = script_spec(dir.path(), &[]);

    let outputs = ToolSession::scope(&spec, TIMEOUT, |session| {
        Box::pin(async move {
            let first = session.call_tool("version_tool", json!({})).await?;
            let second = session
                .call_tool("directions_tool", json!({"coordinates": [[0, 0]]}))
                .await?;
            let third = session.call_tool("version_tool", json!({})).await?;
            Ok(vec![first, second, third])
        })
    })
    .await
    .unwrap();

    assert_eq!(outputs.len(), 3);
    assert!(outputs[1].is_error);
    assert_eq!(outputs[2].text, "fake-mapbox 0.0.1");
}

#[tokio::test]
async fn test_scope_stops_server_when_body_fails() {
    let dir = TempDir::new().unwrap();
    let spec = script_spec(dir.path(), &[("FAKE_LINGER", "1")]);
    let pid = Arc::new(AtomicU32::new(0));

    let seen = pid.clone();
    let err = ToolSession::scope(&spec, TIMEOUT, move |session| {
        Box::pin(async move {
            seen.store(session.pid().unwrap_or(0), Ordering::SeqCst);
            Err::<(), _>(anyhow!("model gave up"))
        })
    })
    .await
    .unwrap_err();

    assert_eq!(err.to_string(), "model gave up");
    let pid = pid.load(Ordering::SeqCst);
    assert_ne!(pid, 0);
    assert!(!process_alive(pid));
}

#[tokio::test]
async fn test_scope_stops_server_on_success() {
    let dir = TempDir::new().unwrap();
    let spec = script_spec(dir.path(), &[]);
    let pid = Arc::new(AtomicU32::new(0));

    let seen = pid.clone();
    ToolSession::scope(&spec, TIMEOUT, move |session| {
        Box::pin(async move {
            seen.store(session.pid().unwrap_or(0), Ordering::SeqCst);
            Ok(())
        })
    })
    .await
    .unwrap();

    let pid = pid.load(Ordering::SeqCst);
    assert_ne!(pid, 0);
    assert!(!process_alive(pid));
}

#[tokio::test]
async fn test_server_that_exits_fails_the_handshake() {
    let spec = ToolServerSpec {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), "read line; echo 'missing token' >&2; exit 1".to_string()],
        env: BTreeMap::new(),
    };

    let err = match ToolSession::start(&spec, TIMEOUT).await {
        Ok(_) => panic!("handshake should fail"),
        Err(e) => e,
    };
    assert!(err.to_string().contains("closed its output"), "{:#}", err);
}

#[tokio::test]
async fn test_unknown_command_fails_to_spawn() {
    let spec = ToolServerSpec {
        command: "definitely-not-a-real-mcp-server".to_string(),
        args: Vec::new(),
        env: BTreeMap::new(),
    };

    let err = match ToolSession::start(&spec, TIMEOUT).await {
        Ok(_) => panic!("spawn should fail"),
        Err(e) => e,
    };
    assert!(err.to_string().contains("Failed to spawn"), "{:#}", err);
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let dir = TempDir::new().unwrap();
    let spec = script_spec(dir.path(), &[("FAKE_SILENT", "1")]);

    let err = match ToolSession::start(&spec, Duration::from_secs(1)).await {
        Ok(_) => panic!("initialize should time out"),
        Err(e) => e,
    };
    let message = err.to_string();
    assert!(message.contains("initialize"), "{}", message);
    assert!(message.contains("timed out"), "{}", message);
}
