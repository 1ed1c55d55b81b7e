// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! External command execution.
//!
//! Commands are always built from an argument vector and never go through a
//! shell, so user supplied values (data directories, launch options) cannot
//! inject extra commands.

use std::ffi::OsStr;
use std::process::{Output, Stdio};

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Exit code reported for a process terminated by a signal.
pub const SIGNALED_EXIT_CODE: i32 = -1;

/// Result of [`output`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code (`-1` when killed by a signal)
    pub code: i32,
    /// Captured stdout followed by captured stderr
    pub output: String,
}

impl CommandOutput {
    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Run a program to completion and return its exit code.
///
/// Stdout and stderr are captured separately and forwarded to the log when
/// `log` is set.
pub async fn run<I, S>(program: &str, args: I, log: bool) -> Result<i32>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let (args, out) = execute(program, args).await?;
    let code = exit_code(&out);

    if log {
        info!(
            command = %display_command(program, &args),
            code,
            stdout = %String::from_utf8_lossy(&out.stdout).trim_end(),
            stderr = %String::from_utf8_lossy(&out.stderr).trim_end(),
            "Command finished"
        );
    }

    Ok(code)
}

/// Run a program to completion and return its exit code with the combined
/// stdout and stderr text.
pub async fn output<I, S>(program: &str, args: I, log: bool) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let (args, out) = execute(program, args).await?;
    let code = exit_code(&out);

    let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&out.stderr));

    if log {
        info!(
            command = %display_command(program, &args),
            code,
            output = %text.trim_end(),
            "Command finished"
        );
    }

    Ok(CommandOutput { code, output: text })
}

async fn execute<I, S>(program: &str, args: I) -> Result<(Vec<String>, Output)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<String> = args
        .into_iter()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .collect();

    debug!(program, args = ?args, "Running command");

    let out = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| Error::Command {
            program: program.to_string(),
            source,
        })?;

    Ok((args, out))
}

fn exit_code(out: &Output) -> i32 {
    out.status.code().unwrap_or(SIGNALED_EXIT_CODE)
}

fn display_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
