// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! JUWELS Booster backend at the Jülich Supercomputing Centre.

use std::path::PathBuf;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::info;

use super::scheduler::SlurmScheduler;
use super::traits::Backend;
use crate::cmd::{self, CommandOutput};
use crate::config::{Config, ConfigError};
use crate::error::{Error, Result};
use crate::types::{ParaViewLaunchOptions, Server, UserData};

/// Extracts the root node number from a JUWELS Booster node list.
pub const NODE_PATTERN: &str = r"jwb\[?(\d{4})";

/// Connection address of a running server.
pub const ADDRESS_TEMPLATE: &str = "jwb{{ root_node }}i.juwels";

/// Partitions ParaView servers may be submitted to.
pub const PARTITIONS: [&str; 2] = ["booster", "develbooster"];

/// Built-in ParaView job script.
pub const JOB_TEMPLATE: &str = include_str!("../../templates/paraview_juwelsbooster.job");

#[derive(Debug, Deserialize)]
struct Project {
    unixgroup: String,
}

/// JUWELS Booster backend.
#[derive(Debug, Clone)]
pub struct JscBackend {
    scheduler: SlurmScheduler,
    home: PathBuf,
    whoami: String,
    jutil: String,
}

impl JscBackend {
    /// Create the backend around a configured scheduler.
    pub fn new(scheduler: SlurmScheduler, home: impl Into<PathBuf>) -> Self {
        Self {
            scheduler,
            home: home.into(),
            whoami: "whoami".to_string(),
            jutil: "jutil".to_string(),
        }
    }

    /// Build the backend from service configuration. Requires `SCRATCH`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let scratch = config
            .scratch
            .clone()
            .ok_or(ConfigError::MissingEnvVar("SCRATCH"))?;

        let job_template = match &config.job_template {
            Some(path) => std::fs::read_to_string(path)?,
            None => JOB_TEMPLATE.to_string(),
        };

        let scheduler =
            SlurmScheduler::new(Regex::new(NODE_PATTERN)?, ADDRESS_TEMPLATE, job_template, scratch)
                .with_user(config.user.clone())
                .with_cluster(config.system_name.clone());

        Ok(Self::new(scheduler, config.home.clone()))
    }

    /// Use other executables for the identity queries.
    pub fn with_identity_programs(
        mut self,
        whoami: impl Into<String>,
        jutil: impl Into<String>,
    ) -> Self {
        self.whoami = whoami.into();
        self.jutil = jutil.into();
        self
    }

    async fn username(&self) -> Result<String> {
        let out = cmd::output(&self.whoami, std::iter::empty::<&str>(), false).await?;
        check(&self.whoami, &out)?;
        Ok(out.output.trim().to_string())
    }

    async fn accounts(&self) -> Result<Vec<String>> {
        let out = cmd::output(&self.jutil, ["user", "projects", "--format=json"], false).await?;
        check(&self.jutil, &out)?;

        let text = out.output.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let projects: Vec<Project> = serde_json::from_str(text)?;
        Ok(projects.into_iter().map(|p| p.unixgroup).collect())
    }
}

fn check(program: &str, out: &CommandOutput) -> Result<()> {
    if out.success() {
        Ok(())
    } else {
        Err(Error::CommandFailed {
            program: program.to_string(),
            code: out.code,
            output: out.output.clone(),
        })
    }
}

#[async_trait]
impl Backend for JscBackend {
    fn name(&self) -> &'static str {
        "jsc"
    }

    async fn get_running_servers(&self) -> Result<Vec<Server>> {
        self.scheduler.poll().await
    }

    async fn launch_paraview(&self, options: ParaViewLaunchOptions) -> Result<CommandOutput> {
        info!(options = ?options, "Launching ParaView");

        if !PARTITIONS.contains(&options.partition.as_str()) {
            return Err(Error::Unsupported(format!(
                "Unknown partition: {}",
                options.partition
            )));
        }

        self.scheduler.submit(&options).await
    }

    async fn get_user_data(&self) -> Result<UserData> {
        let (user, accounts) = tokio::join!(self.username(), self.accounts());

        Ok(UserData {
            user: user?,
            home: self.home.clone(),
            accounts: accounts?,
            partitions: PARTITIONS.iter().map(|p| p.to_string()).collect(),
        })
    }
}
