use std::sync::Arc;

use serde_json::json;
use syndicate::{
    Agent, AgentConfig, ChatInput, ConversationMemory, Role, StubModel, Syndicate, SyndicateError,
    WindowedMemory,
};

fn respond(content: &str) -> String {
    json!({"action": "respond", "content": content}).to_string()
}

fn agent(name: &str, model: Arc<StubModel>) -> Agent {
    Agent::new(
        AgentConfig::new()
            .with_client(model)
            .with_name(name)
            .with_model("gpt-4o")
            .with_system_prompt(format!("You are {name}."))
            .with_memory(ConversationMemory::new()),
    )
    .unwrap()
}

#[tokio::test]
async fn pipeline_chains_outputs_and_records_history() {
    let a = StubModel::new(vec![respond("x1")]);
    let b = StubModel::new(vec![respond("x2")]);
    let syndicate = Syndicate::builder()
        .with_agent(agent("A", a.clone()))
        .with_agent(agent("B", b.clone()))
        .with_pipeline(["A", "B"])
        .build()
        .unwrap();

    let answer = syndicate
        .execute_pipeline("alice", "x", vec!["https://img.example/cat.png".into()])
        .await
        .unwrap();
    assert_eq!(answer, "x2");

    let history = syndicate.global_history().await;
    let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["x", "[A]: x1", "x1", "[B]: x2"]);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].name.as_deref(), Some("alice"));
    assert_eq!(history[3].role, Role::Assistant);
    assert_eq!(history[3].name.as_deref(), Some("B"));

    // B received A's answer as its input, with A's exchange as context.
    let sent = &b.requests()[0].messages;
    let sent_contents: Vec<&str> = sent.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(sent_contents, vec!["You are B.", "x1", "x", "[A]: x1"]);

    // Images only reach the first step.
    assert_eq!(a.requests()[0].messages[1].image_urls.len(), 1);
    assert!(sent.iter().all(|m| m.image_urls.is_empty()));
}

#[tokio::test]
async fn each_step_appends_two_history_entries() {
    let names = ["draft", "edit", "polish"];
    let mut builder = Syndicate::builder().with_pipeline(names);
    for name in names {
        builder = builder.with_agent(agent(name, StubModel::new(vec![respond(name)])));
    }
    let syndicate = builder.build().unwrap();

    let answer = syndicate
        .execute_pipeline("alice", "start", Vec::new())
        .await
        .unwrap();

    assert_eq!(answer, "polish");
    assert_eq!(syndicate.global_history_len().await, 2 * names.len());
}

#[tokio::test]
async fn unknown_agent_leaves_history_untouched() {
    let syndicate = Syndicate::builder()
        .with_agent(agent("A", StubModel::new(vec![])))
        .build()
        .unwrap();

    let err = syndicate
        .execute_agent("Z", ChatInput::new("alice", "hello"))
        .await
        .unwrap_err();

    assert!(matches!(err, SyndicateError::AgentNotFound(name) if name == "Z"));
    assert_eq!(syndicate.global_history_len().await, 0);
}

#[tokio::test]
async fn empty_input_is_rejected_before_any_agent_runs() {
    let model = StubModel::new(vec![respond("unused")]);
    let syndicate = Syndicate::builder()
        .with_agent(agent("A", model.clone()))
        .with_pipeline(["A"])
        .build()
        .unwrap();

    let err = syndicate
        .execute_pipeline("alice", "", Vec::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SyndicateError::Validation(_)));
    assert!(model.requests().is_empty());
    assert_eq!(syndicate.find_agent("A").unwrap().memory_len().await, 0);
}

#[tokio::test]
async fn bounded_global_history_keeps_the_newest_exchanges() {
    let syndicate = Syndicate::builder()
        .with_agent(agent(
            "A",
            StubModel::new(vec![respond("one"), respond("two")]),
        ))
        .with_global_history(WindowedMemory::new(2))
        .build()
        .unwrap();

    syndicate
        .execute_agent("A", ChatInput::new("alice", "first"))
        .await
        .unwrap();
    syndicate
        .execute_agent("A", ChatInput::new("alice", "second"))
        .await
        .unwrap();

    let history = syndicate.global_history().await;
    let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["second", "[A]: two"]);
    assert_eq!(syndicate.agent_names(), vec!["A".to_string()]);
}

#[tokio::test]
async fn whitespace_answer_is_passed_to_the_next_step() {
    let a = StubModel::new(vec![respond(" ")]);
    let b = StubModel::new(vec![respond("done")]);
    let syndicate = Syndicate::builder()
        .with_agent(agent("A", a))
        .with_agent(agent("B", b.clone()))
        .with_pipeline(["A", "B"])
        .build()
        .unwrap();

    let answer = syndicate
        .execute_pipeline("alice", "x", Vec::new())
        .await
        .unwrap();

    assert_eq!(answer, "done");
    assert_eq!(b.requests()[0].messages[1].content, " ");
    assert_eq!(syndicate.global_history_len().await, 4);
}
