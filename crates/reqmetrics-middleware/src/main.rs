//! reqmetrics demo server (binary)
//!
//! - `/`, `/items/:id`, `/hello` : sample routes
//! - `/metrics` : request counter + latency histogram
//! - Ctrl-C drains queued emissions before exit

use tracing_subscriber::{fmt, EnvFilter};

use reqmetrics_middleware::{app_state, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "reqmetrics.yaml".to_string());
    let cfg = config::load_from_file(&path).expect("config load failed");
    let listen = cfg.server.listen_addr().expect("server.listen must be a valid SocketAddr");

    let state = app_state::AppState::new(cfg).expect("metrics setup failed");
    let instrumentor = state.instrumentor();
    let app = router::build_router(state);

    tracing::info!(%listen, "reqmetrics starting");
    let listener = tokio::net::TcpListener::bind(listen).await.expect("failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server failed");

    instrumentor.flush().await;
    tracing::info!(dropped = instrumentor.dropped_emissions(), "reqmetrics stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler failed; graceful shutdown disabled");
        std::future::pending::<()>().await;
    }
}
