use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use syndicate::{
    Agent, AgentConfig, ChatInput, ConversationMemory, FunctionTool, MetricsTracker, Role,
    StubModel, SyndicateError, WindowedMemory,
};

#[derive(Debug, Deserialize, JsonSchema)]
struct AddArgs {
    a: i64,
    b: i64,
}

fn add_tool() -> FunctionTool<AddArgs> {
    FunctionTool::new("Add", "Add two integers", |args: AddArgs| async move {
        Ok::<_, SyndicateError>(args.a + args.b)
    })
}

fn agent_with(model: Arc<StubModel>) -> AgentConfig {
    AgentConfig::new()
        .with_client(model)
        .with_name("calc")
        .with_model("gpt-4o-mini")
        .with_system_prompt("You add numbers.")
        .with_memory(ConversationMemory::new())
}

#[tokio::test]
async fn plain_answer_is_recorded() {
    let model = StubModel::new(vec![json!({"action": "respond", "content": "hi there"}).to_string()]);
    let agent = Agent::new(agent_with(model.clone())).unwrap();

    let answer = agent.chat("alice", "hello").await.unwrap();

    assert_eq!(answer, "hi there");
    let memory = agent.memory_snapshot().await;
    assert_eq!(memory.len(), 2);
    assert_eq!(memory[0].role, Role::User);
    assert_eq!(memory[0].name.as_deref(), Some("alice"));
    assert_eq!(memory[1].role, Role::Assistant);
    assert_eq!(memory[1].content, "hi there");

    let sent = &model.requests()[0].messages;
    assert_eq!(sent[0].role, Role::System);
    assert_eq!(sent[0].content, "You add numbers.");
}

#[tokio::test]
async fn tool_round_trip_records_call_and_result() {
    let model = StubModel::new(vec![
        json!({"action": "call_tool", "id": "c1", "name": "Add", "arguments": {"a": 2, "b": 3}})
            .to_string(),
        json!({"action": "respond", "content": "5"}).to_string(),
    ]);
    let agent = Agent::new(agent_with(model.clone()).with_tool(add_tool())).unwrap();

    let answer = agent.chat("alice", "what is 2+3?").await.unwrap();
    assert_eq!(answer, "5");

    let memory = agent.memory_snapshot().await;
    let roles: Vec<Role> = memory.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(memory[1].tool_calls[0].id, "c1");
    assert_eq!(memory[2].tool_call_id.as_deref(), Some("c1"));
    assert_eq!(memory[2].content, "5");

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools[0].name, "Add");
    assert_eq!(requests[0].tools[0].parameters["type"], "object");
    assert_eq!(requests[1].messages.last().unwrap().role, Role::Tool);
}

#[tokio::test]
async fn transport_failure_keeps_only_the_user_message() {
    let model = StubModel::new(vec![json!({"action": "fail", "error": "connection reset"}).to_string()]);
    let agent = Agent::new(agent_with(model)).unwrap();

    let err = agent.chat("alice", "hello").await.unwrap_err();

    assert!(matches!(&err, SyndicateError::Completion { agent, .. } if agent == "calc"));
    assert!(matches!(err.root_cause(), SyndicateError::LanguageModel(msg) if msg == "connection reset"));
    let memory = agent.memory_snapshot().await;
    assert_eq!(memory.len(), 1);
    assert_eq!(memory[0].role, Role::User);
}

#[tokio::test]
async fn bad_tool_arguments_fail_the_turn() {
    let model = StubModel::new(vec![
        json!({"action": "call_tool", "name": "Add", "arguments": "{\"a\": \"two\"}"}).to_string(),
    ]);
    let agent = Agent::new(agent_with(model).with_tool(add_tool())).unwrap();

    let err = agent.chat("alice", "add").await.unwrap_err();

    assert!(matches!(err, SyndicateError::ToolInvocation { name, .. } if name == "Add"));
    assert_eq!(agent.memory_len().await, 1);
}

#[tokio::test]
async fn timeout_cancels_the_turn_and_later_turns_still_work() {
    let slow = StubModel::with_delay(
        vec![
            json!({"action": "respond", "content": "late"}).to_string(),
            json!({"action": "respond", "content": "on time"}).to_string(),
        ],
        Duration::from_millis(200),
    );
    let agent = Agent::new(agent_with(slow)).unwrap();

    let err = agent
        .process(ChatInput::new("alice", "first").with_timeout(Duration::from_millis(20)))
        .await
        .unwrap_err();
    assert!(matches!(err, SyndicateError::Timeout(_)));
    assert_eq!(agent.memory_len().await, 1);

    let answer = agent.chat("alice", "second").await.unwrap();
    assert_eq!(answer, "on time");
    assert_eq!(agent.memory_len().await, 3);
}

#[tokio::test]
async fn windowed_memory_never_sends_orphaned_tool_results() {
    let model = StubModel::new(vec![
        json!({"action": "call_tool", "id": "c1", "name": "Add", "arguments": {"a": 1, "b": 1}})
            .to_string(),
        json!({"action": "respond", "content": "2"}).to_string(),
        json!({"action": "respond", "content": "bye"}).to_string(),
    ]);
    let config = agent_with(model.clone())
        .with_memory(WindowedMemory::new(3))
        .with_tool(add_tool());
    let agent = Agent::new(config).unwrap();

    agent.chat("alice", "1+1").await.unwrap();
    agent.chat("alice", "thanks").await.unwrap();

    // The window now starts at the tool result of the first turn.
    let last = model.requests().pop().unwrap();
    assert!(last.messages.iter().all(|m| m.role != Role::Tool));
    assert_eq!(last.messages.last().unwrap().content, "thanks");
}

#[tokio::test]
async fn shared_agent_serves_concurrent_callers() {
    let model = StubModel::new(vec![
        json!({"action": "respond", "content": "one"}).to_string(),
        json!({"action": "respond", "content": "two"}).to_string(),
    ]);
    let metrics = MetricsTracker::default();
    let agent = Arc::new(Agent::new(agent_with(model).with_metrics(metrics.clone())).unwrap());

    let first = tokio::spawn({
        let agent = Arc::clone(&agent);
        async move { agent.chat("alice", "a").await }
    });
    let second = tokio::spawn({
        let agent = Arc::clone(&agent);
        async move { agent.chat("bob", "b").await }
    });
    let mut answers = vec![first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];
    answers.sort();

    assert_eq!(answers, vec!["one", "two"]);
    assert_eq!(agent.memory_len().await, 4);
    let reports = metrics.reports();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.success));
}
