// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Desktop backend: a single ParaView server already running on localhost.

use std::path::PathBuf;

use async_trait::async_trait;

use super::traits::Backend;
use crate::cmd::CommandOutput;
use crate::error::{Error, Result};
use crate::types::{ParaViewLaunchOptions, Server, UserData};

/// Connection address of the local ParaView server.
pub const LOCAL_SERVER_ADDRESS: &str = "localhost:11111";

/// Backend for workstations without a batch scheduler.
#[derive(Debug, Clone)]
pub struct DesktopBackend {
    home: PathBuf,
}

impl DesktopBackend {
    /// Create a desktop backend.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

#[async_trait]
impl Backend for DesktopBackend {
    fn name(&self) -> &'static str {
        "desktop"
    }

    async fn get_running_servers(&self) -> Result<Vec<Server>> {
        Ok(vec![Server {
            name: "Local Server".to_string(),
            account: String::new(),
            partition: String::new(),
            nodes: 1,
            time_used: "00:00".to_string(),
            time_limit: "00:00".to_string(),
            state: "RUNNING".to_string(),
            node_list: "localhost".to_string(),
            connection_address: Some(LOCAL_SERVER_ADDRESS.to_string()),
        }])
    }

    async fn launch_paraview(&self, _options: ParaViewLaunchOptions) -> Result<CommandOutput> {
        Err(Error::Unsupported(
            "Can't launch ParaView on Desktop".to_string(),
        ))
    }

    async fn get_user_data(&self) -> Result<UserData> {
        Ok(UserData {
            user: "Local User".to_string(),
            home: self.home.clone(),
            accounts: Vec::new(),
            partitions: Vec::new(),
        })
    }
}
