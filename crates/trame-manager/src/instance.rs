// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Trame instance launcher.
//!
//! Each launch gets its own runtime directory:
//!
//! ```text
//! <runtime_dir>/<uuid>/auth.key       one-time secret (0600)
//! <runtime_dir>/<uuid>/instance.log   stdout and stderr of the app
//! ```
//!
//! The app receives its parameters through a single environment variable,
//! [`TRAME_INSTANCE_ARGS`], which app commands append to their invocation.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use tokio::process::Command;
use tracing::info;
use uuid::Uuid;

use crate::backend::LaunchContext;
use crate::error::{Error, Result};
use crate::types::{App, Instance, TrameLaunchOptions};

/// Environment variable carrying the instance arguments.
pub const TRAME_INSTANCE_ARGS: &str = "TRAME_INSTANCE_ARGS";

/// Secret file name inside an instance directory.
pub const AUTH_KEY_FILE: &str = "auth.key";

/// Log file name inside an instance directory.
pub const LOG_FILE: &str = "instance.log";

const SECRET_BYTES: usize = 32;

/// Generated runtime parameters of one instance.
#[derive(Debug)]
pub struct InstanceParameters {
    /// Routing segment, 32 lowercase hex characters
    pub uuid: String,
    /// Port the app should listen on
    pub port: u16,
    /// One-time secret
    pub auth_key: String,
    /// File the secret was written to
    pub auth_key_file: PathBuf,
    /// Log file path
    pub log_file: PathBuf,
    log_handle: File,
}

impl InstanceParameters {
    /// Allocate a free port, UUID and secret and create the instance files.
    pub fn generate(runtime_dir: &Path) -> Result<Self> {
        let port = free_port()?;
        let uuid = Uuid::new_v4().simple().to_string();
        let auth_key = generate_secret();

        let dir = runtime_dir.join(&uuid);
        std::fs::create_dir_all(&dir)?;

        let auth_key_file = dir.join(AUTH_KEY_FILE);
        write_secret(&auth_key_file, &auth_key)?;

        let log_file = dir.join(LOG_FILE);
        let log_handle = File::create(&log_file)?;

        info!(
            port,
            uuid = %uuid,
            log_file = %log_file.display(),
            auth_key_file = %auth_key_file.display(),
            "Generated instance parameters"
        );

        Ok(Self {
            uuid,
            port,
            auth_key,
            auth_key_file,
            log_file,
            log_handle,
        })
    }
}

fn free_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn write_secret(path: &Path, secret: &str) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(secret.as_bytes())?;
    Ok(())
}

/// Value of [`TRAME_INSTANCE_ARGS`] for an instance.
pub fn instance_env_value(port: u16, data_directory: &Path, auth_key_file: &Path) -> String {
    format!(
        "--port={port} --data=\"{}\" --authKeyFile=\"{}\" --server",
        data_directory.display(),
        auth_key_file.display()
    )
}

/// Launch an instance of `app` with freshly generated parameters.
pub async fn launch(
    app: &App,
    options: TrameLaunchOptions,
    ctx: &LaunchContext<'_>,
) -> Result<Instance> {
    let params = InstanceParameters::generate(ctx.runtime_dir)?;
    launch_with(app, options, params, ctx).await
}

/// Launch an instance of `app` with the given parameters.
///
/// The proxy route is registered before the process is spawned and removed
/// again if the spawn fails.
pub async fn launch_with(
    app: &App,
    options: TrameLaunchOptions,
    params: InstanceParameters,
    ctx: &LaunchContext<'_>,
) -> Result<Instance> {
    let env_value = instance_env_value(params.port, &options.data_directory, &params.auth_key_file);

    let base_url = ctx
        .router
        .register(&params.uuid, params.port, &params.auth_key)
        .await;

    let mut command = Command::new("sh");
    command
        .arg("-c")
        .arg(&app.command)
        .env(TRAME_INSTANCE_ARGS, env_value)
        .stdin(Stdio::null())
        .stdout(Stdio::from(params.log_handle.try_clone()?))
        .stderr(Stdio::from(params.log_handle.try_clone()?));
    if let Some(dir) = &app.working_directory {
        command.current_dir(dir);
    }

    let child = match command.spawn() {
        Ok(child) => child,
        Err(source) => {
            ctx.router.remove(&params.uuid).await;
            return Err(Error::Command {
                program: app.command.clone(),
                source,
            });
        }
    };

    info!(
        app = %app.name,
        instance = %options.name,
        uuid = %params.uuid,
        port = params.port,
        pid = ?child.id(),
        base_url = %base_url,
        "Launched trame instance"
    );

    Ok(Instance {
        name: options.name,
        data_directory: options.data_directory,
        uuid: params.uuid,
        port: params.port,
        base_url,
        log_file: params.log_file,
        auth_key: params.auth_key,
        auth_key_file: params.auth_key_file,
        log_handle: Some(params.log_handle),
        process: Some(child),
    })
}
