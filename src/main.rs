use roomcast::{
    auth::{JwtAuthenticator, TokenConfig},
    profile::InMemoryProfileStore,
    room::InMemoryRoomDirectory,
    router, AppState, ServerConfig,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomcast=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting roomcast server");

    let config = ServerConfig::from_env();
    info!(
        heartbeat_interval_secs = config.session.heartbeat.interval.as_secs(),
        heartbeat_max_missed = config.session.heartbeat.max_missed,
        backlog_capacity = config.session.backlog_capacity,
        "Session configuration loaded"
    );

    // In-memory collaborators; swap for persistent implementations of the
    // same traits in production
    let (app_state, transitions) = AppState::new(
        Arc::new(InMemoryProfileStore::new()),
        Arc::new(InMemoryRoomDirectory::new()),
        Arc::new(JwtAuthenticator::new(TokenConfig::new())),
        config.session.clone(),
    );

    let _presence = Arc::new(app_state.presence_tracker()).start(transitions);

    let app = router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server running on http://{}", config.bind_addr);
    axum::serve(listener, app).await
}
