use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use voice_agent_config::load_settings;
use voice_agent_core::{StreamingChatCompletion, StreamingSynthesizer, StreamingTranscriber};
use voice_agent_llm::{OllamaConfig, OllamaProvider};
use voice_agent_pipeline::Orchestrator;
use voice_agent_server::state::AppState;
use voice_agent_server::{create_router, ServerError};
use voice_agent_session::{SessionRegistry, Supervisor};
use voice_agent_stt::{DeepgramConfig, DeepgramProvider};
use voice_agent_transport::TransportHub;
use voice_agent_tts::{CartesiaConfig, CartesiaProvider};

const SYSTEM_PROMPT: &str = "You are a helpful, concise voice assistant. \
Keep replies short and speak naturally; insert ||BREAK|| at natural pause points.";

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config_path = std::env::var("VOICE_AGENT_CONFIG").ok();
    let settings = load_settings(config_path.as_deref())?;
    let credentials = settings.credentials.clone().expect("load_settings guarantees credentials are present");

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install prometheus recorder");

    let registry = Arc::new(SessionRegistry::new());
    registry.spawn_sweeper();
    let transport = Arc::new(TransportHub::new());

    let stt_provider: Arc<dyn StreamingTranscriber> = Arc::new(DeepgramProvider::new(DeepgramConfig {
        api_key: credentials.stt_api_key.clone(),
        ..DeepgramConfig::default()
    }));
    let llm_provider: Arc<dyn StreamingChatCompletion> = Arc::new(
        OllamaProvider::new(OllamaConfig { api_key: Some(credentials.llm_api_key.clone()), ..OllamaConfig::default() })
            .expect("failed to build llm provider"),
    );
    let tts_provider: Arc<dyn StreamingSynthesizer> = Arc::new(CartesiaProvider::new(CartesiaConfig {
        api_key: credentials.tts_api_key.clone(),
        ..CartesiaConfig::default()
    }));

    let orchestrator = Orchestrator::new(
        registry.clone(),
        transport.clone(),
        stt_provider,
        llm_provider,
        tts_provider,
        settings.llm.clone(),
        settings.streaming.clone(),
        settings.tts.clone(),
        SYSTEM_PROMPT,
    );

    let supervisor = Arc::new(Supervisor::new(registry.clone()));

    let state = AppState { registry: registry.clone(), transport, orchestrator, metrics_handle, started_at: Instant::now() };
    let app = create_router(state, &settings.server.cors_allowed_origins);

    let listener = TcpListener::bind(&settings.server.bind_addr)
        .await
        .map_err(|source| ServerError::Bind { addr: settings.server.bind_addr.clone(), source })?;
    tracing::info!(addr = %settings.server.bind_addr, "voice-agent-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(supervisor))
        .await
        .expect("server loop exited unexpectedly");

    Ok(())
}

async fn shutdown_signal(supervisor: Arc<Supervisor>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    supervisor.shutdown().await;
}
