//! Shared application state handed to every axum handler.

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;
use voice_agent_pipeline::Orchestrator;
use voice_agent_session::SessionRegistry;
use voice_agent_transport::TransportHub;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub transport: Arc<TransportHub>,
    pub orchestrator: Arc<Orchestrator>,
    pub metrics_handle: PrometheusHandle,
    pub started_at: Instant,
}
