// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance lifecycle manager.
//!
//! The manager owns the app → instance mapping and the latest server
//! snapshot. Backends are consulted for every side effect and hand back
//! fresh records, which the manager files under their app. Locks are never
//! held across scheduler queries or instance handshakes.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::backend::{self, Backend, LaunchContext};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::mediator::Mediator;
use crate::proxy::ProxyRouter;
use crate::types::{
    App, AppView, ConnectResponse, InstanceView, LaunchResult, ParaViewLaunchOptions, Server,
    ServerView, TrameLaunchOptions, UserData,
};

/// System of record for apps, instances and servers.
pub struct Manager {
    config: Config,
    backend: Arc<dyn Backend>,
    router: ProxyRouter,
    mediator: Mediator,
    apps: RwLock<BTreeMap<String, App>>,
    servers: RwLock<Vec<Server>>,
}

impl Manager {
    /// Select the configured backend, discover apps and poll servers.
    pub async fn new(config: Config) -> Result<Self> {
        let backend = backend::from_name(&config.backend, &config)?;
        Self::with_backend(config, backend).await
    }

    /// Build a manager around an already constructed backend.
    pub async fn with_backend(config: Config, backend: Arc<dyn Backend>) -> Result<Self> {
        let apps = collect_apps(backend.discover_apps(&config.search_paths)?);
        let servers = backend.get_running_servers().await?;

        info!(
            backend = backend.name(),
            apps = apps.len(),
            servers = servers.len(),
            "Manager ready"
        );

        Ok(Self {
            router: ProxyRouter::new(config.base_url.clone())?,
            mediator: Mediator::new(),
            config,
            backend,
            apps: RwLock::new(apps),
            servers: RwLock::new(servers),
        })
    }

    /// Use a different mediator for instance handshakes.
    pub fn with_mediator(mut self, mediator: Mediator) -> Self {
        self.mediator = mediator;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Active backend.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Proxy routes of launched instances.
    pub fn router(&self) -> &ProxyRouter {
        &self.router
    }

    /// Apps with their running instances.
    pub async fn apps(&self) -> Vec<AppView> {
        self.apps.read().await.values().map(App::view).collect()
    }

    /// Last polled server snapshot.
    pub async fn servers(&self) -> Vec<ServerView> {
        self.servers.read().await.iter().map(Server::view).collect()
    }

    /// Poll the backend and replace the server snapshot.
    pub async fn refresh_servers(&self) -> Result<Vec<ServerView>> {
        let servers = self.backend.get_running_servers().await?;
        let views = servers.iter().map(Server::view).collect();
        *self.servers.write().await = servers;
        Ok(views)
    }

    /// Fresh user data from the backend.
    pub async fn user_data(&self) -> Result<UserData> {
        self.backend.get_user_data().await
    }

    /// Discover apps again. Instances of apps that still exist are kept.
    pub async fn rediscover_apps(&self) -> Result<Vec<AppView>> {
        let mut discovered = collect_apps(self.backend.discover_apps(&self.config.search_paths)?);

        let mut apps = self.apps.write().await;
        for (name, old) in std::mem::take(&mut *apps) {
            match discovered.get_mut(&name) {
                Some(app) => app.instances = old.instances,
                None => {
                    for instance in &old.instances {
                        warn!(
                            app = %name,
                            instance = %instance.name,
                            pid = ?instance.pid(),
                            "App disappeared, dropping instance; its process keeps running"
                        );
                    }
                }
            }
        }
        *apps = discovered;

        info!(apps = apps.len(), "Rediscovered apps");
        Ok(apps.values().map(App::view).collect())
    }

    /// Launch an instance of the named app.
    ///
    /// A data directory that does not exist is replaced by the home
    /// directory.
    pub async fn launch_trame(
        &self,
        app_name: &str,
        mut options: TrameLaunchOptions,
    ) -> Result<InstanceView> {
        let app = self
            .apps
            .read()
            .await
            .get(app_name)
            .map(App::definition)
            .ok_or_else(|| Error::AppNotFound(app_name.to_string()))?;

        if !is_dir(&options.data_directory).await {
            info!(
                requested = %options.data_directory.display(),
                home = %self.config.home.display(),
                "Data directory does not exist, using home"
            );
            options.data_directory = self.config.home.clone();
        }

        let ctx = LaunchContext {
            router: &self.router,
            runtime_dir: &self.config.runtime_dir,
        };
        let instance = self.backend.launch_trame(&app, options, &ctx).await?;
        let view = instance.view();

        match self.apps.write().await.get_mut(app_name) {
            Some(app) => app.instances.push(instance),
            None => warn!(app = %app_name, "App disappeared during launch"),
        }

        Ok(view)
    }

    /// Submit a ParaView server job.
    pub async fn launch_paraview(&self, options: ParaViewLaunchOptions) -> Result<LaunchResult> {
        let out = self.backend.launch_paraview(options).await?;
        if !out.success() {
            warn!(code = out.code, output = %out.output.trim_end(), "ParaView submission failed");
        }
        Ok(out.into())
    }

    /// Tell an instance to attach to a server.
    ///
    /// Both names resolve to their first match. Nothing is sent when either
    /// is unknown.
    pub async fn connect_to_backend(
        &self,
        app_name: &str,
        instance_name: &str,
        server_name: &str,
    ) -> Result<ConnectResponse> {
        let port = self.instance_port(app_name, instance_name).await?;
        let address = self
            .servers
            .read()
            .await
            .iter()
            .find(|s| s.name == server_name)
            .map(|s| s.connection_address.clone())
            .ok_or_else(|| Error::ServerNotFound(server_name.to_string()))?;

        self.mediator.connect(port, address.as_deref()).await?;
        Ok(ConnectResponse { url: address })
    }

    /// Tell an instance to detach from its server.
    pub async fn disconnect(&self, app_name: &str, instance_name: &str) -> Result<()> {
        let port = self.instance_port(app_name, instance_name).await?;
        self.mediator.disconnect(port).await
    }

    async fn instance_port(&self, app_name: &str, instance_name: &str) -> Result<u16> {
        let apps = self.apps.read().await;
        let app = apps
            .get(app_name)
            .ok_or_else(|| Error::AppNotFound(app_name.to_string()))?;
        app.instance(instance_name)
            .map(|i| i.port)
            .ok_or_else(|| Error::InstanceNotFound(instance_name.to_string()))
    }
}

fn collect_apps(apps: Vec<App>) -> BTreeMap<String, App> {
    apps.into_iter().map(|app| (app.name.clone(), app)).collect()
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
