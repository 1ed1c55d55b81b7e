// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for trame-manager integration tests.
//!
//! Provides TestContext with an app search root, runtime and home
//! directories, and helpers to build a manager on the mock backend.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use trame_manager::Config;
use trame_manager::Manager;
use trame_manager::backend::MockBackend;
use trame_manager::mediator::Mediator;
use trame_manager::types::Server;

/// Test context owning every directory a manager touches.
pub struct TestContext {
    pub share: PathBuf,
    pub runtime_dir: PathBuf,
    pub home: PathBuf,
    pub data_dir: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl TestContext {
    /// Create a new test context with empty directories.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path();

        let share = root.join("share");
        let runtime_dir = root.join("runtime");
        let home = root.join("home");
        let data_dir = home.join("data");
        for dir in [&share, &runtime_dir, &home, &data_dir] {
            std::fs::create_dir_all(dir).expect("Failed to create test dir");
        }

        Self {
            share,
            runtime_dir,
            home,
            data_dir,
            _temp_dir: temp_dir,
        }
    }

    /// Write `<share>/trame/<name>/app.yml`.
    pub fn write_app(&self, name: &str, display_name: &str, command: &str) -> PathBuf {
        write_app_in(&self.share, name, display_name, command)
    }

    /// Configuration for the mock backend rooted in this context.
    pub fn config(&self) -> Config {
        let mut config = Config::new("mock");
        config.search_paths = vec![self.share.clone()];
        config.runtime_dir = self.runtime_dir.clone();
        config.home = self.home.clone();
        config
    }

    /// Manager on the given mock backend, talking to instances on 127.0.0.1.
    pub async fn manager(&self, backend: MockBackend) -> Arc<Manager> {
        let manager = Manager::with_backend(self.config(), Arc::new(backend))
            .await
            .expect("Failed to create manager")
            .with_mediator(Mediator::with_host("127.0.0.1"));
        Arc::new(manager)
    }
}

/// Write `<root>/trame/<name>/app.yml`.
pub fn write_app_in(root: &Path, name: &str, display_name: &str, command: &str) -> PathBuf {
    let dir = root.join("trame").join(name);
    std::fs::create_dir_all(&dir).expect("Failed to create app dir");
    let path = dir.join("app.yml");
    std::fs::write(
        &path,
        format!(
            "name: '{}'\ncommand: '{}'\n",
            display_name.replace('\'', "''"),
            command.replace('\'', "''")
        ),
    )
    .expect("Failed to write descriptor");
    path
}

/// A scheduler-reported server.
pub fn server(name: &str, state: &str, address: Option<&str>) -> Server {
    Server {
        name: name.to_string(),
        account: "acct1".to_string(),
        partition: "booster".to_string(),
        nodes: 2,
        time_used: "00:10:00".to_string(),
        time_limit: "04:00:00".to_string(),
        state: state.to_string(),
        node_list: "jwb[0183-0184]".to_string(),
        connection_address: address.map(str::to_string),
    }
}
