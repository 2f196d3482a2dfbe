//! Two scripted agents in a pipeline: a writer that uses a tool, and a
//! reviewer that reads the writer's draft from the shared history.
//!
//! Pass a TOML config path as the first argument to change logging.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use syndicate::{
    init_tracing, Agent, AgentConfig, AppConfig, ConversationMemory, FunctionTool, PromptBuilder,
    StubModel, Syndicate, SyndicateError,
};

#[derive(Debug, Deserialize, JsonSchema)]
struct WordCountArgs {
    /// Text to count words in.
    text: String,
}

#[tokio::main]
async fn main() -> Result<(), SyndicateError> {
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::from_env_or_file(path)?,
        None => {
            let mut config = AppConfig::default();
            config.apply_env();
            config
        }
    };
    init_tracing(&config.logging);

    let word_count = FunctionTool::new(
        "word_count",
        "Count the words in a piece of text",
        |args: WordCountArgs| async move {
            Ok::<_, SyndicateError>(json!({ "words": args.text.split_whitespace().count() }))
        },
    );

    let writer_model = StubModel::new(vec![
        json!({
            "action": "call_tool",
            "name": "word_count",
            "arguments": {"text": "Rust makes fearless concurrency practical"}
        })
        .to_string(),
        json!({
            "action": "respond",
            "content": "Rust makes fearless concurrency practical. (5 words)"
        })
        .to_string(),
    ]);
    let reviewer_model = StubModel::new(vec![json!({
        "action": "respond",
        "content": "Approved: short, accurate and within the word limit."
    })
    .to_string()]);

    let writer_prompt = PromptBuilder::new()
        .text("role", "You write one-sentence taglines.")
        .item("rules", "Stay under ten words.")
        .item("rules", "Check the length with the word_count tool.")
        .build();

    let writer = Agent::new(
        AgentConfig::from_app_config(&config)?
            .with_client(writer_model)
            .with_name("writer")
            .with_model("gpt-4o")
            .with_system_prompt(writer_prompt)
            .with_memory(ConversationMemory::new())
            .with_tool(word_count),
    )?;
    let reviewer = Agent::new(
        AgentConfig::from_app_config(&config)?
            .with_client(reviewer_model)
            .with_name("reviewer")
            .with_model("o3-mini")
            .with_system_prompt("Review the previous draft and approve or reject it.")
            .with_memory(ConversationMemory::new()),
    )?;

    let syndicate = Syndicate::builder()
        .with_agents([writer, reviewer])
        .with_pipeline(["writer", "reviewer"])
        .build()?;

    let answer = syndicate
        .execute_pipeline("demo-user", "Write a tagline about Rust.", Vec::new())
        .await?;
    tracing::info!(%answer, "pipeline finished");

    println!("final answer: {answer}");
    println!("global history:");
    for message in syndicate.global_history().await {
        println!(
            "  {:<9} {:<10} {}",
            message.role.as_str(),
            message.name.as_deref().unwrap_or("-"),
            message.content
        );
    }
    Ok(())
}
