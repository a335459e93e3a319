//! Voice Agent Server: the axum WebSocket and HTTP surface binding
//! Session Registry, Transport Hub, and the Orchestrator to the network
//! (spec §4.8, §6.1, §6.4).

pub mod http;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use state::AppState;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] voice_agent_config::ConfigError),

    #[error("failed to bind to {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },
}
