// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the SLURM helper and the JSC backend using stand-in scheduler
//! executables.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use regex::Regex;
use trame_manager::backend::jsc::{ADDRESS_TEMPLATE, JOB_TEMPLATE, NODE_PATTERN};
use trame_manager::backend::{Backend, JscBackend, SlurmScheduler};
use trame_manager::error::Error;
use trame_manager::types::ParaViewLaunchOptions;

/// Write an executable shell script and return its path.
fn script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

fn scheduler(bin: &Path, scratch: &Path, squeue_body: &str, sbatch_body: &str) -> SlurmScheduler {
    SlurmScheduler::new(
        Regex::new(NODE_PATTERN).unwrap(),
        ADDRESS_TEMPLATE,
        JOB_TEMPLATE,
        scratch,
    )
    .with_programs(
        script(bin, "squeue", squeue_body),
        script(bin, "sbatch", sbatch_body),
    )
    .with_user("alice")
    .with_cluster("juwelsbooster")
}

fn options(partition: &str) -> ParaViewLaunchOptions {
    serde_json::from_value(serde_json::json!({
        "name": "pv",
        "account": "acct1",
        "partition": partition,
        "nodes": 2,
        "timeLimit": "01:00:00",
        "reservation": "viz"
    }))
    .unwrap()
}

// ============================================================================
// Polling
// ============================================================================

#[tokio::test]
async fn test_poll_parses_report() {
    let bin = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let scheduler = scheduler(
        bin.path(),
        scratch.path(),
        "echo 'myjob;acct1;booster;2;00:10:00;04:00:00;RUNNING;jwb[0183-0184]'\n\
         echo 'queued;acct1;develbooster;1;0:00;00:30:00;PENDING;'",
        "exit 0",
    );

    let servers = scheduler.poll().await.unwrap();

    assert_eq!(servers.len(), 2);
    assert_eq!(servers[0].name, "myjob");
    assert_eq!(servers[0].nodes, 2);
    assert_eq!(servers[0].state, "RUNNING");
    assert_eq!(servers[0].connection_address.as_deref(), Some("jwb0183i.juwels"));
    assert_eq!(servers[1].state, "PENDING");
    assert!(servers[1].connection_address.is_none());
}

#[tokio::test]
async fn test_poll_passes_format_arguments() {
    let bin = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let args_file = bin.path().join("args");
    let scheduler = scheduler(
        bin.path(),
        scratch.path(),
        &format!("printf '%s\\n' \"$@\" > '{}'", args_file.display()),
        "exit 0",
    );

    let servers = scheduler.poll().await.unwrap();

    assert!(servers.is_empty());
    let args = std::fs::read_to_string(&args_file).unwrap();
    let args: Vec<_> = args.lines().collect();
    assert_eq!(
        args,
        vec![
            "--me",
            "--noheader",
            "--Format=Name:;,Account:;,Partition:;,NumNodes:;,TimeUsed:;,TimeLimit:;,State:;,NodeList"
        ]
    );
}

#[tokio::test]
async fn test_poll_failure_is_command_error() {
    let bin = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let scheduler = scheduler(
        bin.path(),
        scratch.path(),
        "echo 'slurm_load_jobs error: Unable to contact slurm controller' 1>&2; exit 1",
        "exit 0",
    );

    let err = scheduler.poll().await.unwrap_err();

    match err {
        Error::CommandFailed { code, output, .. } => {
            assert_eq!(code, 1);
            assert!(output.contains("Unable to contact"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_poll_malformed_output_is_parse_error() {
    let bin = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let scheduler = scheduler(bin.path(), scratch.path(), "echo 'garbage'", "exit 0");

    assert!(matches!(scheduler.poll().await, Err(Error::Parse { .. })));
}

// ============================================================================
// Submission
// ============================================================================

#[tokio::test]
async fn test_submit_writes_job_and_runs_sbatch() {
    let bin = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let scheduler = scheduler(
        bin.path(),
        scratch.path(),
        "exit 0",
        "echo \"Submitted batch job 4242 from $1\"",
    );

    let out = scheduler.submit(&options("booster")).await.unwrap();

    assert_eq!(out.code, 0);
    let job_path = PathBuf::from(
        out.output
            .trim()
            .strip_prefix("Submitted batch job 4242 from ")
            .unwrap(),
    );
    assert_eq!(job_path.file_name().unwrap(), "paraview.job");

    let job_dir = job_path.parent().unwrap();
    assert_eq!(job_dir.parent().unwrap(), scratch.path().join("trame-manager-jobs"));
    assert!(
        job_dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("alice-")
    );

    let script = std::fs::read_to_string(&job_path).unwrap();
    assert!(script.contains("#SBATCH --job-name=pv"));
    assert!(script.contains("#SBATCH --partition=booster"));
    assert!(script.contains("#SBATCH --time=01:00:00"));
    assert!(script.contains("#SBATCH --reservation=viz"));
    assert!(script.contains(&format!("#SBATCH --output={}", job_dir.join("stdout").display())));
    assert!(script.contains(&format!("#SBATCH --error={}", job_dir.join("stderr").display())));
}

#[tokio::test]
async fn test_submit_failure_code_is_returned() {
    let bin = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let scheduler = scheduler(
        bin.path(),
        scratch.path(),
        "exit 0",
        "echo 'sbatch: error: Batch job submission failed: Invalid account' 1>&2; exit 1",
    );

    let out = scheduler.submit(&options("booster")).await.unwrap();

    assert_eq!(out.code, 1);
    assert!(out.output.contains("Invalid account"));
}

#[tokio::test]
async fn test_each_submission_gets_own_directory() {
    let bin = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let scheduler = scheduler(bin.path(), scratch.path(), "exit 0", "exit 0");

    scheduler.submit(&options("booster")).await.unwrap();
    scheduler.submit(&options("booster")).await.unwrap();

    let dirs = std::fs::read_dir(scratch.path().join("trame-manager-jobs"))
        .unwrap()
        .count();
    assert_eq!(dirs, 2);
}

#[tokio::test]
async fn test_job_directory_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let bin = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let scheduler = scheduler(bin.path(), scratch.path(), "exit 0", "exit 0");

    scheduler.submit(&options("booster")).await.unwrap();

    let job_dir = std::fs::read_dir(scratch.path().join("trame-manager-jobs"))
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    let mode = std::fs::metadata(&job_dir).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o700);
    assert!(job_dir.join("paraview.job").exists());
}

// ============================================================================
// JSC backend
// ============================================================================

fn jsc(bin: &Path, scratch: &Path, jutil_body: &str) -> JscBackend {
    JscBackend::new(
        scheduler(bin, scratch, "exit 0", "echo 'Submitted batch job 1'"),
        "/home/alice",
    )
    .with_identity_programs(
        script(bin, "whoami", "echo alice"),
        script(bin, "jutil", jutil_body),
    )
}

#[tokio::test]
async fn test_jsc_user_data() {
    let bin = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let backend = jsc(
        bin.path(),
        scratch.path(),
        r#"echo '[{"unixgroup": "acct1", "project": "p1"}, {"unixgroup": "acct2", "project": "p2"}]'"#,
    );

    let user = backend.get_user_data().await.unwrap();

    assert_eq!(user.user, "alice");
    assert_eq!(user.home, PathBuf::from("/home/alice"));
    assert_eq!(user.accounts, vec!["acct1", "acct2"]);
    assert_eq!(user.partitions, vec!["booster", "develbooster"]);
}

#[tokio::test]
async fn test_jsc_no_projects() {
    let bin = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let backend = jsc(bin.path(), scratch.path(), "exit 0");

    let user = backend.get_user_data().await.unwrap();

    assert!(user.accounts.is_empty());
}

#[tokio::test]
async fn test_jsc_launch_checks_partition() {
    let bin = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let backend = jsc(bin.path(), scratch.path(), "exit 0");

    let out = backend.launch_paraview(options("develbooster")).await.unwrap();
    assert!(out.success());

    let err = backend.launch_paraview(options("gpus")).await.unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
}
