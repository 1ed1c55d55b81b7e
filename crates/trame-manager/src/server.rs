// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP server.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET, POST | `<base>trame-manager/trame` | list apps, launch instance |
//! | POST | `<base>trame-manager/trame/{action}` | connect, disconnect, rediscover |
//! | GET, POST | `<base>trame-manager/paraview` | list servers, submit job |
//! | GET | `<base>trame-manager/user` | user data |
//! | GET | `<base>trame-manager/health` | liveness (no token) |
//! | any | `<base>trame/{uuid}/...` | instance proxy (HTTP and WebSocket) |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{any, get, post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::handlers;
use crate::manager::Manager;

/// Shared handler state.
#[derive(Clone)]
pub struct ServiceState {
    /// Lifecycle manager
    pub manager: Arc<Manager>,
    /// Token every request must carry, if any
    pub token: Option<String>,
}

impl ServiceState {
    /// State using the manager's configured token.
    pub fn new(manager: Arc<Manager>) -> Self {
        let token = manager.config().token.clone();
        Self { manager, token }
    }
}

/// Build the service router.
pub fn build_router(state: ServiceState) -> Router {
    let api = format!("{}trame-manager/", state.manager.config().base_url);
    let instances = state.manager.router().route_prefix();

    let protected = Router::new()
        .route(
            &format!("{api}trame"),
            get(handlers::list_apps).post(handlers::launch_trame),
        )
        .route(&format!("{api}trame/{{action}}"), post(handlers::trame_action))
        .route(
            &format!("{api}paraview"),
            get(handlers::list_servers).post(handlers::launch_paraview),
        )
        .route(&format!("{api}user"), get(handlers::user))
        .route(&format!("{instances}{{uuid}}"), any(handlers::proxy_redirect))
        .route(&format!("{instances}{{uuid}}/"), any(handlers::proxy))
        .route(&format!("{instances}{{uuid}}/{{*path}}"), any(handlers::proxy))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_token,
        ));

    Router::new()
        .route(&format!("{api}health"), get(handlers::health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the manager and serve until Ctrl-C.
pub async fn serve(config: Config) -> Result<()> {
    let addr = config.bind_addr;
    let manager = Arc::new(Manager::new(config).await?);
    let listener = TcpListener::bind(addr).await?;
    serve_with(manager, listener).await
}

/// Serve an existing manager on a bound listener until Ctrl-C.
pub async fn serve_with(manager: Arc<Manager>, listener: TcpListener) -> Result<()> {
    let addr: SocketAddr = listener.local_addr()?;
    let base_url = manager.config().base_url.clone();
    let app = build_router(ServiceState::new(manager));

    info!(
        addr = %addr,
        api = %format!("{base_url}trame-manager/"),
        "trame-manager listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("trame-manager shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
