//! DSA Tutor · Learning Platform Backend
//!
//! - Axum HTTP + WebSocket API
//! - Optional OpenAI integration (via environment variables)
//! - Periodic sweep that closes idle tutoring sessions
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   OPENAI_API_KEY    : enables OpenAI integration if present
//!   OPENAI_BASE_URL   : default "https://api.openai.com/v1"
//!   OPENAI_MODEL      : default "gpt-4o-mini"
//!   TUTOR_CONFIG_PATH : path to TOML config (engine, session, prompts, optional catalog)
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

use dsa_tutor_backend::routes::build_router;
use dsa_tutor_backend::state::AppState;
use dsa_tutor_backend::telemetry;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (catalog, store, engines, completion client).
  let state = Arc::new(AppState::new());

  spawn_idle_sweeper(state.clone());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "dsa_tutor", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
  info!(target: "dsa_tutor", "Server stopped");
  Ok(())
}

/// Idle sessions are also closed lazily on their next turn; this keeps the store tidy.
fn spawn_idle_sweeper(state: Arc<AppState>) {
  let every = Duration::from_secs(state.config.session.sweep_interval_secs.max(1));
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
      ticker.tick().await;
      if let Err(e) = state.sessions.sweep_idle(chrono::Utc::now()).await {
        warn!(target: "session", error = %e, "Idle session sweep failed");
      }
    }
  });
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "dsa_tutor", error = %e, "Failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  info!(target: "dsa_tutor", "Shutdown signal received");
}
