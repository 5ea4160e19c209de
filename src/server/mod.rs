//! HTTP server for HealthArchive (spec §6).
//!
//! Grounded on the teacher's `server/mod.rs` "own `AppState`, expose
//! `serve()`, re-export `create_router`" shape, narrowed to the JSON
//! API surface spec §6 names instead of the teacher's document-browsing
//! HTML views.

pub mod cache;
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;

use std::net::SocketAddr;

use tracing::info;

use crate::error::HaResult;
use crate::repository::DbContext;
use crate::config::Settings;

/// Binds and serves the HTTP API until the process receives SIGINT
/// (spec §6 "serve"). `ctrl_c` is awaited directly rather than threaded
/// through a shutdown channel — the HTTP surface is stateless per
/// request, unlike the worker loop's in-flight crawl subprocess.
pub async fn serve(ctx: DbContext, settings: Settings, addr: SocketAddr) -> HaResult<()> {
    let state = AppState::new(ctx, settings);
    let app = create_router(state);

    info!(%addr, "starting HTTP server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
