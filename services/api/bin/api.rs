//! Main Entrypoint for the Cadence API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the agent catalog from the prompts directory.
//! 3. Initializing the workflow engine, speech pipeline and avatar relay.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use cadence_api::{
    avatar::AvatarRelay, config::Config, router::create_router, state::AppState,
};
use cadence_core::{
    agent::AgentCatalog,
    speech::{OpenAISpeechPipeline, PCM16_SAMPLE_RATE, SpeechPipeline, SpeechSettings},
    workflow::{OpenAIWorkflowEngine, WorkflowEngine},
};
use std::{collections::BTreeMap, fs, net::SocketAddr, path::Path, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C; shutting down");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Loads one agent per `.md` file, keyed by file stem.
fn load_prompts(prompts_path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let mut prompts = BTreeMap::new();
    let entries = fs::read_dir(prompts_path)
        .with_context(|| format!("Could not read prompts directory {}", prompts_path.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let agent = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(agent, content);
        }
    }
    Ok(prompts)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Load Agents ---
    let prompts = load_prompts(&config.prompts_path)?;
    let agents = Arc::new(AgentCatalog::from_prompts(prompts, &config.default_agent)?);
    info!(
        agents = agents.len(),
        default_agent = %agents.default_agent(),
        "Agent catalog loaded."
    );

    // --- 4. Initialize Shared Services ---
    let openai_config = OpenAIConfig::new()
        .with_api_key(&config.openai_api_key)
        .with_api_base(&config.openai_base_url);
    let workflow: Arc<dyn WorkflowEngine> = Arc::new(OpenAIWorkflowEngine::new(
        openai_config,
        config.chat_model.clone(),
        agents.clone(),
        config.max_handoffs,
    ));

    let speech: Arc<dyn SpeechPipeline> = Arc::new(OpenAISpeechPipeline::new(
        reqwest::Client::new(),
        config.openai_base_url.clone(),
        config.openai_api_key.clone(),
        SpeechSettings {
            stt_model: config.stt_model.clone(),
            tts_model: config.tts_model.clone(),
            voice: config.tts_voice.clone(),
            instructions: config.tts_instructions.clone(),
            chunk_size: config.audio_chunk_size,
            sample_rate: PCM16_SAMPLE_RATE,
        },
    ));

    let avatar = Arc::new(
        AvatarRelay::new(config.avatar.clone()).context("Failed to build avatar relay client")?,
    );
    if config.avatar.api_key.is_none() {
        warn!("AVATAR_API_KEY is not set; /api/avatar/offer will fail.");
    }

    let app_state = Arc::new(AppState {
        workflow,
        speech,
        agents,
        avatar,
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        model = %config.chat_model,
        tts_model = %config.tts_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
