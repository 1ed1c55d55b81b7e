// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SLURM scheduler helper shared by cluster backends.
//!
//! A backend holds a [`SlurmScheduler`] configured with the cluster's node
//! naming rule and address template, and delegates polling and job
//! submission to it.

use std::path::{Path, PathBuf};

use minijinja::Environment;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::info;

use crate::cmd::{self, CommandOutput};
use crate::error::{Error, Result};
use crate::types::{ParaViewLaunchOptions, Server};

/// `squeue` output format, one job per line with `;` separated fields.
pub const SQUEUE_FORMAT: &str =
    "--Format=Name:;,Account:;,Partition:;,NumNodes:;,TimeUsed:;,TimeLimit:;,State:;,NodeList";

/// Number of fields in one report line.
pub const REPORT_FIELDS: usize = 8;

/// Directory under the scratch root holding per-job directories.
pub const JOBS_DIR: &str = "trame-manager-jobs";

/// Job script file name inside a job directory.
pub const JOB_SCRIPT: &str = "paraview.job";

/// Polls `squeue` and submits job scripts with `sbatch`.
#[derive(Debug, Clone)]
pub struct SlurmScheduler {
    squeue: String,
    sbatch: String,
    delimiter: char,
    root_node: Regex,
    address_template: String,
    running_state: String,
    job_template: String,
    scratch: PathBuf,
    user: String,
    cluster: String,
}

impl SlurmScheduler {
    /// Create a scheduler helper.
    ///
    /// `root_node` must have one capture group extracting the first node of an
    /// allocation from the node list. `address_template` is rendered with
    /// `root_node` and all server fields.
    pub fn new(
        root_node: Regex,
        address_template: impl Into<String>,
        job_template: impl Into<String>,
        scratch: impl Into<PathBuf>,
    ) -> Self {
        Self {
            squeue: "squeue".to_string(),
            sbatch: "sbatch".to_string(),
            delimiter: ';',
            root_node,
            address_template: address_template.into(),
            running_state: "RUNNING".to_string(),
            job_template: job_template.into(),
            scratch: scratch.into(),
            user: "unknown".to_string(),
            cluster: String::new(),
        }
    }

    /// Use other `squeue` / `sbatch` executables.
    pub fn with_programs(mut self, squeue: impl Into<String>, sbatch: impl Into<String>) -> Self {
        self.squeue = squeue.into();
        self.sbatch = sbatch.into();
        self
    }

    /// Prefix for job directories.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Cluster identity passed to the job template.
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }

    /// Query the scheduler for the current user's jobs.
    pub async fn poll(&self) -> Result<Vec<Server>> {
        let out = cmd::output(&self.squeue, ["--me", "--noheader", SQUEUE_FORMAT], false).await?;
        if !out.success() {
            return Err(Error::CommandFailed {
                program: self.squeue.clone(),
                code: out.code,
                output: out.output,
            });
        }
        self.parse_report(&out.output)
    }

    /// Parse `squeue` output into servers.
    ///
    /// Fields are name, account, partition, nodes, time used, time limit,
    /// state and node list. Any malformed line fails the whole report.
    pub fn parse_report(&self, text: &str) -> Result<Vec<Server>> {
        let mut servers = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            info!(line, "Found server");
            servers.push(self.parse_line(line)?);
        }
        Ok(servers)
    }

    fn parse_line(&self, line: &str) -> Result<Server> {
        let parse_err = |reason: String| Error::Parse {
            line: line.to_string(),
            reason,
        };

        let fields: Vec<&str> = line.split(self.delimiter).map(str::trim).collect();
        let [name, account, partition, nodes, time_used, time_limit, state, node_list] =
            fields[..]
        else {
            return Err(parse_err(format!(
                "expected {REPORT_FIELDS} fields, found {}",
                fields.len()
            )));
        };

        let nodes = nodes
            .parse()
            .map_err(|_| parse_err(format!("node count {nodes:?} is not an integer")))?;

        let mut server = Server {
            name: name.to_string(),
            account: account.to_string(),
            partition: partition.to_string(),
            nodes,
            time_used: time_used.to_string(),
            time_limit: time_limit.to_string(),
            state: state.to_string(),
            node_list: node_list.to_string(),
            connection_address: None,
        };

        if server.state == self.running_state {
            let root_node = self
                .root_node
                .captures(node_list)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| parse_err(format!("no root node in {node_list:?}")))?;
            server.connection_address = Some(self.render_address(&server, &root_node)?);
        }

        Ok(server)
    }

    fn render_address(&self, server: &Server, root_node: &str) -> Result<String> {
        let mut ctx = match serde_json::to_value(server)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        ctx.insert("root_node".to_string(), Value::from(root_node));
        Ok(environment().render_str(&self.address_template, ctx)?)
    }

    /// Render the job script for a job living in `job_dir`.
    pub fn render_job(&self, options: &ParaViewLaunchOptions, job_dir: &Path) -> Result<String> {
        let mut ctx = options.extra.clone();
        ctx.insert("name".to_string(), Value::from(options.name.clone()));
        ctx.insert("account".to_string(), Value::from(options.account.clone()));
        ctx.insert("partition".to_string(), Value::from(options.partition.clone()));
        ctx.insert("nodes".to_string(), Value::from(options.nodes));
        ctx.insert("time_limit".to_string(), Value::from(options.time_limit.clone()));
        ctx.insert("cluster".to_string(), Value::from(self.cluster.clone()));
        ctx.insert(
            "stdout".to_string(),
            Value::from(job_dir.join("stdout").to_string_lossy().into_owned()),
        );
        ctx.insert(
            "stderr".to_string(),
            Value::from(job_dir.join("stderr").to_string_lossy().into_owned()),
        );
        Ok(environment().render_str(&self.job_template, ctx)?)
    }

    /// Write a job script into a fresh job directory and submit it.
    pub async fn submit(&self, options: &ParaViewLaunchOptions) -> Result<CommandOutput> {
        let jobs_root = self.scratch.join(JOBS_DIR);
        tokio::fs::create_dir_all(&jobs_root).await?;

        let job_dir = tempfile::Builder::new()
            .prefix(&format!("{}-", self.user))
            .tempdir_in(&jobs_root)?
            .keep();

        let script = self.render_job(options, &job_dir)?;
        let job_path = job_dir.join(JOB_SCRIPT);
        tokio::fs::write(&job_path, script).await?;

        info!(job_dir = %job_dir.display(), name = %options.name, "Submitting ParaView job");
        cmd::output(&self.sbatch, [job_path.as_os_str()], true).await
    }
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env
}
