use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use stock_chat::agents::{ChatAgent, InMemoryCheckpointStore};
use stock_chat::api::{run_server, AppState};
use stock_chat::config::AppConfig;
use stock_chat::constants::llm::SYSTEM_PROMPT;
use stock_chat::data::YahooClient;
use stock_chat::llm::LLMClient;
use stock_chat::tools::ToolRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Setup Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Stock Chat...");

    // Load Configuration (.env, config.yaml, environment)
    let config = AppConfig::load()?;
    info!("Loaded Configuration: {:?}", config);

    // Initialize Clients
    info!("Initializing AI Client...");
    let api_key = match config.llm.api_key.clone() {
        Some(key) => key,
        None => {
            warn!("⚠️ OPENAI_API_KEY not set - model requests will be rejected upstream");
            String::new()
        }
    };
    info!("Using OpenAI Base URL: {}", config.llm.base_url);
    info!("Using LLM Model: {}", config.llm.model);
    let llm_client = LLMClient::new(
        api_key,
        Some(config.llm.base_url.clone()),
        config.llm.model.clone(),
    );

    info!("Initializing Market Data Client ({})...", config.market_data.base_url);
    let market_data = YahooClient::new(
        Url::parse(&config.market_data.base_url)?,
        Url::parse(&config.market_data.cookie_url)?,
    )?;

    let tools = ToolRegistry::with_stock_tools(Arc::new(market_data));
    info!("🔧 Registered {} tools", tools.len());

    // Conversation state lives for the process lifetime
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());

    let agent = Arc::new(ChatAgent::new(
        Arc::new(llm_client),
        tools,
        checkpoints,
        config.llm.max_rounds,
        config.server.stream_buffer,
    ));

    let app_state = Arc::new(AppState {
        agent,
        system_prompt: SYSTEM_PROMPT.to_string(),
    });

    // Start API Server
    info!("Initializing API Server...");
    run_server(app_state, &config.bind_addr()).await?;

    Ok(())
}
