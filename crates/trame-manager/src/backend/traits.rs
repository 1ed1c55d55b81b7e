// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Backend trait definitions.
//!
//! Defines the capability set every cluster or platform backend provides.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::cmd::CommandOutput;
use crate::error::Result;
use crate::proxy::ProxyRouter;
use crate::types::{App, Instance, ParaViewLaunchOptions, Server, TrameLaunchOptions, UserData};

/// Service resources a backend may use while launching a trame instance.
#[derive(Debug, Clone, Copy)]
pub struct LaunchContext<'a> {
    /// Router receiving the new instance's proxy route
    pub router: &'a ProxyRouter,
    /// Directory for per-instance secret and log files
    pub runtime_dir: &'a Path,
}

/// Trait for backend configurations.
///
/// Backends are stateless strategies: they query schedulers and spawn
/// processes, returning freshly built records. The manager owns all
/// bookkeeping of apps, instances and servers.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend identifier (e.g., "jsc", "desktop")
    fn name(&self) -> &'static str;

    /// Find launchable apps under the given search roots.
    fn discover_apps(&self, search_paths: &[PathBuf]) -> Result<Vec<App>> {
        crate::discovery::discover_apps(search_paths)
    }

    /// Launch an instance of `app` and register its proxy route.
    async fn launch_trame(
        &self,
        app: &App,
        options: TrameLaunchOptions,
        ctx: &LaunchContext<'_>,
    ) -> Result<Instance> {
        crate::instance::launch(app, options, ctx).await
    }

    /// Query the scheduler for the current user's compute servers.
    async fn get_running_servers(&self) -> Result<Vec<Server>>;

    /// Submit a ParaView server job.
    ///
    /// A non-zero submission exit code is reported in the output, not as an
    /// error.
    async fn launch_paraview(&self, options: ParaViewLaunchOptions) -> Result<CommandOutput>;

    /// Collect user name, accounts and partitions.
    async fn get_user_data(&self) -> Result<UserData>;
}
