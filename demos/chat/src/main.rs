use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use tracing_subscriber::EnvFilter;

use prysm::{monitor, ContextStore, ContextUpdate, PrysmConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // PRYSM_API_KEY and PRYSM_BASE_URL are read from the environment
    let original = async_openai::Client::with_config(OpenAIConfig::new());
    let client = monitor(&original, PrysmConfig::default())?;

    let messages: Vec<ChatCompletionRequestMessage> = vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content("You are a helpful assistant.")
            .build()?
            .into(),
        ChatCompletionRequestUserMessageArgs::default()
            .content("What is the capital of France?")
            .build()?
            .into(),
    ];
    let request = CreateChatCompletionRequestArgs::default()
        .model("gpt-4o-mini")
        .messages(messages)
        .temperature(0.0)
        .build()?;

    ContextStore::set(
        ContextUpdate::new()
            .user_id("demo_user")
            .metadata_from(&serde_json::json!({"source": "chat-demo"}))?,
    );

    println!("Sending request through {}...", client.base_url());
    let response = ContextStore::scope(
        ContextUpdate::new().session_id("demo_session"),
        client.chat_completion(request),
    )
    .await?;

    for choice in response.choices {
        println!(
            "{}: Role: {}  Content: {:?}",
            choice.index, choice.message.role, choice.message.content
        );
    }

    if let Some(usage) = response.usage {
        println!("\nToken usage:");
        println!("  Prompt tokens: {}", usage.prompt_tokens);
        println!("  Completion tokens: {}", usage.completion_tokens);
        println!("  Total tokens: {}", usage.total_tokens);
    }

    Ok(())
}
