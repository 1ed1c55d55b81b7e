// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! trame-manager server
//!
//! Serves the trame-manager REST API and the instance proxy:
//! - App discovery and instance launch
//! - ParaView server submission and polling
//! - Connect/disconnect between instances and servers

use tracing::{info, warn};

use trame_manager::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trame_manager=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        backend = %config.backend,
        bind_addr = %config.bind_addr,
        base_url = %config.base_url,
        runtime_dir = %config.runtime_dir.display(),
        search_paths = ?config.search_paths,
        "Starting trame-manager"
    );

    trame_manager::server::serve(config).await?;

    Ok(())
}
