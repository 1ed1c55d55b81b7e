// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain records and their external JSON views.
//!
//! Internal records own resources (log handles, child processes, secrets).
//! What leaves the service is always a `*View` built by an explicit
//! projection, never the record itself.

use std::fs::File;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::process::Child;

/// A discovered, launchable trame app.
#[derive(Debug)]
pub struct App {
    /// Internal name, the descriptor's directory name
    pub name: String,
    /// Name shown to users
    pub display_name: String,
    /// Path of the `app.yml` / `app.yaml` descriptor
    pub path: PathBuf,
    /// Shell command launching an instance
    pub command: String,
    /// Working directory for the command
    pub working_directory: Option<PathBuf>,
    /// Running instances in launch order
    pub instances: Vec<Instance>,
}

impl App {
    /// Copy of the definition without any instances.
    pub fn definition(&self) -> App {
        App {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            path: self.path.clone(),
            command: self.command.clone(),
            working_directory: self.working_directory.clone(),
            instances: Vec::new(),
        }
    }

    /// First instance with the given name.
    pub fn instance(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.name == name)
    }

    /// External view of the app and its instances.
    pub fn view(&self) -> AppView {
        AppView {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            path: self.path.clone(),
            instances: self.instances.iter().map(Instance::view).collect(),
        }
    }
}

/// One running process of an [`App`].
#[derive(Debug)]
pub struct Instance {
    /// User supplied display name
    pub name: String,
    /// Directory the app is pointed at
    pub data_directory: PathBuf,
    /// Opaque routing segment
    pub uuid: String,
    /// Port the app listens on
    pub port: u16,
    /// Externally reachable proxy path
    pub base_url: String,
    /// Log file receiving the app's stdout and stderr
    pub log_file: PathBuf,
    // Owned for the lifetime of the instance; never exposed.
    #[allow(dead_code)]
    pub(crate) auth_key: String,
    #[allow(dead_code)]
    pub(crate) auth_key_file: PathBuf,
    #[allow(dead_code)]
    pub(crate) log_handle: Option<File>,
    pub(crate) process: Option<Child>,
}

impl Instance {
    /// OS process id, while the child handle is held.
    pub(crate) fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(Child::id)
    }

    /// External view, without secret, handles or process.
    pub fn view(&self) -> InstanceView {
        InstanceView {
            name: self.name.clone(),
            data_directory: self.data_directory.clone(),
            port: self.port,
            base_url: self.base_url.clone(),
            log: self.log_file.clone(),
        }
    }
}

/// A compute server reported by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Server {
    /// Job name, used as lookup key
    pub name: String,
    /// Charged account
    pub account: String,
    /// Partition or queue
    pub partition: String,
    /// Node count
    pub nodes: u32,
    /// Elapsed run time
    pub time_used: String,
    /// Requested time limit
    pub time_limit: String,
    /// Scheduler state, e.g. `RUNNING` or `PENDING`
    pub state: String,
    /// Raw node list
    pub node_list: String,
    /// `host[:port]` to connect to, only while running
    pub connection_address: Option<String>,
}

impl Server {
    /// External view.
    pub fn view(&self) -> ServerView {
        ServerView {
            name: self.name.clone(),
            account: self.account.clone(),
            partition: self.partition.clone(),
            nodes: self.nodes,
            time_used: self.time_used.clone(),
            time_limit: self.time_limit.clone(),
            state: self.state.clone(),
            connection_address: self.connection_address.clone(),
        }
    }
}

/// Per-user account metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)] // Fields mirror the JSON contract
pub struct UserData {
    pub user: String,
    pub home: PathBuf,
    pub accounts: Vec<String>,
    pub partitions: Vec<String>,
}

/// JSON view of an [`App`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)] // Fields mirror the JSON contract
pub struct AppView {
    pub name: String,
    pub display_name: String,
    pub path: PathBuf,
    pub instances: Vec<InstanceView>,
}

/// JSON view of an [`Instance`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)] // Fields mirror the JSON contract
pub struct InstanceView {
    pub name: String,
    pub data_directory: PathBuf,
    pub port: u16,
    #[serde(rename = "base_url")]
    pub base_url: String,
    pub log: PathBuf,
}

/// JSON view of a [`Server`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)] // Fields mirror the JSON contract
pub struct ServerView {
    pub name: String,
    pub account: String,
    pub partition: String,
    pub nodes: u32,
    pub time_used: String,
    pub time_limit: String,
    pub state: String,
    pub connection_address: Option<String>,
}

/// Options for launching a trame instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrameLaunchOptions {
    /// Display name of the new instance
    pub name: String,
    /// Directory the instance should work on
    pub data_directory: PathBuf,
}

/// Options for submitting a ParaView server job.
///
/// Unknown keys are kept in `extra` and passed to the job template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)] // Fields mirror the JSON contract
pub struct ParaViewLaunchOptions {
    pub name: String,
    pub account: String,
    pub partition: String,
    pub nodes: u32,
    #[serde(alias = "time")]
    pub time_limit: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Result of a connect request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
    /// Connection address handed to the instance
    pub url: Option<String>,
}

/// Result of a ParaView launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)] // Fields mirror the JSON contract
pub struct LaunchResult {
    pub return_code: i32,
    pub message: String,
}

impl From<crate::cmd::CommandOutput> for LaunchResult {
    fn from(out: crate::cmd::CommandOutput) -> Self {
        Self {
            return_code: out.code,
            message: out.output,
        }
    }
}
