// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock backend for testing.
//!
//! Serves servers and user data from memory and records ParaView
//! submissions instead of talking to a scheduler. Trame instances are still
//! launched through the shared launcher, optionally pinned to a fixed port so
//! tests can stand in for the instance.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::traits::{Backend, LaunchContext};
use crate::cmd::CommandOutput;
use crate::error::Result;
use crate::instance::{self, InstanceParameters};
use crate::types::{App, Instance, ParaViewLaunchOptions, Server, TrameLaunchOptions, UserData};

#[derive(Debug)]
struct MockState {
    servers: Vec<Server>,
    user: UserData,
    launches: Vec<ParaViewLaunchOptions>,
    launch_output: CommandOutput,
}

/// Mock backend for testing.
#[derive(Debug, Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
    search_paths: Option<Vec<PathBuf>>,
    /// Port every launched instance is told to use instead of a free one
    pub instance_port: Option<u16>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a mock backend without servers.
    pub fn new() -> Self {
        Self::with_servers(Vec::new())
    }

    /// Create a mock backend reporting the given servers.
    pub fn with_servers(servers: Vec<Server>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                servers,
                user: UserData {
                    user: "mock".to_string(),
                    home: PathBuf::from("/"),
                    accounts: vec!["mock-account".to_string()],
                    partitions: vec!["mock-partition".to_string()],
                },
                launches: Vec::new(),
                launch_output: CommandOutput {
                    code: 0,
                    output: "Submitted batch job 1\n".to_string(),
                },
            })),
            search_paths: None,
            instance_port: None,
        }
    }

    /// Pin launched instances to `port`.
    pub fn with_instance_port(mut self, port: u16) -> Self {
        self.instance_port = Some(port);
        self
    }

    /// Discover apps under these roots regardless of configuration.
    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = Some(paths);
        self
    }

    /// Replace the reported servers.
    pub async fn set_servers(&self, servers: Vec<Server>) {
        self.state.lock().await.servers = servers;
    }

    /// Replace the reported user data.
    pub async fn set_user_data(&self, user: UserData) {
        self.state.lock().await.user = user;
    }

    /// Result returned by the next ParaView launches.
    pub async fn set_launch_output(&self, output: CommandOutput) {
        self.state.lock().await.launch_output = output;
    }

    /// ParaView launches received so far.
    pub async fn launches(&self) -> Vec<ParaViewLaunchOptions> {
        self.state.lock().await.launches.clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn discover_apps(&self, search_paths: &[PathBuf]) -> Result<Vec<App>> {
        crate::discovery::discover_apps(self.search_paths.as_deref().unwrap_or(search_paths))
    }

    async fn launch_trame(
        &self,
        app: &App,
        options: TrameLaunchOptions,
        ctx: &LaunchContext<'_>,
    ) -> Result<Instance> {
        let mut params = InstanceParameters::generate(ctx.runtime_dir)?;
        if let Some(port) = self.instance_port {
            params.port = port;
        }
        instance::launch_with(app, options, params, ctx).await
    }

    async fn get_running_servers(&self) -> Result<Vec<Server>> {
        Ok(self.state.lock().await.servers.clone())
    }

    async fn launch_paraview(&self, options: ParaViewLaunchOptions) -> Result<CommandOutput> {
        let mut state = self.state.lock().await;
        state.launches.push(options);
        Ok(state.launch_output.clone())
    }

    async fn get_user_data(&self) -> Result<UserData> {
        Ok(self.state.lock().await.user.clone())
    }
}
