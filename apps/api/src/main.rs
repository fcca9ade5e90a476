mod backend;
mod config;
mod errors;
mod jobs;
mod models;
mod routes;
mod session;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::backend::fallback::{FallbackBackend, FallbackDataset};
use crate::backend::supabase::SupabaseClient;
use crate::config::Config;
use crate::jobs::service::JobBoard;
use crate::routes::build_router;
use crate::session::{SessionController, SessionStore};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting JobFlow API v{}", env!("CARGO_PKG_VERSION"));

    let dataset = Arc::new(FallbackDataset::load()?);
    info!(
        "Fallback dataset loaded ({} users, {} jobs)",
        dataset.users.len(),
        dataset.jobs.len()
    );

    let client = Arc::new(SupabaseClient::new(
        config.supabase_url.clone(),
        config.supabase_anon_key.clone(),
        config.supabase_refresh_token.clone(),
    )?);
    info!("Backend endpoint: {}", client.masked_url());

    let store = SessionStore::spawn();
    let session = SessionController::new(
        store.clone(),
        client.clone(),
        client.clone(),
        Arc::new(FallbackBackend::new(&dataset)),
    );

    let snapshot = session.initialize().await;
    info!(
        "Session ready: {:?} ({})",
        snapshot.state(),
        snapshot.status_message
    );
    client.clone().spawn_auto_refresh();

    let state = AppState {
        jobs: Arc::new(JobBoard::new(client.clone(), dataset, store)),
        session,
        config: config.clone(),
        backend_endpoint: client.masked_url(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
