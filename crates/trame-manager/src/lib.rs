// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! trame-manager - Trame App and ParaView Server Lifecycle
//!
//! This crate discovers trame apps, launches instances of them behind a
//! secret-bearing reverse proxy, tracks ParaView render servers running on a
//! batch scheduler, and tells instances which server to attach to.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Browser / JupyterLab UI                       │
//! └──────────────────────────────────────────────────────────────────┘
//!             │ REST                               │ /trame/<uuid>/*
//!             ▼                                    ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    trame-manager (This Crate)                     │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────┐ │
//! │  │  Discovery  │  │   Manager   │  │    Proxy    │  │ Mediator │ │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └──────────┘ │
//! │                          │ Backend                                │
//! │               ┌──────────┼──────────┐                            │
//! │               ▼          ▼          ▼                            │
//! │             jsc       desktop      mock                          │
//! └──────────────────────────────────────────────────────────────────┘
//!        │ squeue / sbatch               │ spawn          ▲ POST /api
//!        ▼                               ▼                │
//! ┌──────────────────┐         ┌──────────────────────────────────┐
//! │  SLURM (pvserver │◄────────│      trame instances (local)     │
//! │    jobs)         │  11111  │                                  │
//! └──────────────────┘         └──────────────────────────────────┘
//! ```
//!
//! # HTTP API
//!
//! All endpoints live under `<base_url>trame-manager/`.
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | GET | `trame` | | `[{name, displayName, path, instances}]` |
//! | POST | `trame` | `{appName, name, dataDirectory}` | instance |
//! | POST | `trame/connect` | `{appName, instanceName, serverName}` | `{url}` |
//! | POST | `trame/disconnect` | `{appName, instanceName}` | empty |
//! | POST | `trame/rediscover` | | apps |
//! | GET | `paraview` | | `[{name, account, partition, nodes, timeUsed, timeLimit, state, connectionAddress}]` |
//! | POST | `paraview` | `{name, account, partition, nodes, timeLimit, ...}` | `{returnCode, message}` |
//! | GET | `user` | | `{user, home, accounts, partitions}` |
//! | GET | `health` | | status |
//!
//! Instances are reachable at `<base_url>trame/<uuid>/`.
//!
//! # Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TRAME_MANAGER_CONFIGURATION` | (required) | Backend: `jsc`, `desktop` or `mock` |
//! | `JUPYTER_PATH` | (empty) | Search roots, each scanned for `trame/<app>/app.yml` |
//! | `TRAME_MANAGER_BIND_ADDR` | `127.0.0.1:8890` | HTTP listen address |
//! | `TRAME_MANAGER_BASE_URL` | `/` | Base URL of the host |
//! | `TRAME_MANAGER_TOKEN` | (unset) | Token required on every request (header, `?token=` or session cookie) |
//! | `TRAME_MANAGER_RUNTIME_DIR` | `<tmp>/trame-manager` | Instance secret and log files |
//! | `TRAME_MANAGER_JOB_TEMPLATE` | (built-in) | ParaView job script template |
//! | `SCRATCH` | (required for `jsc`) | Scratch root for job directories |
//! | `SYSTEMNAME` | `juwelsbooster` | Cluster identity passed to job scripts |
//! | `USER` | `unknown` | Job directory prefix |
//! | `HOME` | home directory | Fallback data directory |
//!
//! # Modules
//!
//! - [`manager`]: App, instance and server bookkeeping
//! - [`backend`]: Pluggable cluster backends and the SLURM helper
//! - [`instance`]: Instance parameter generation and process spawn
//! - [`proxy`]: Instance routes and request forwarding
//! - [`mediator`]: Connect/disconnect handshake
//! - [`discovery`]: App descriptor discovery
//! - [`cmd`]: External command execution
//! - [`server`]: HTTP router and server

#![deny(missing_docs)]

/// Backend configurations and the SLURM scheduler helper.
pub mod backend;
/// External command execution.
pub mod cmd;
/// Configuration loaded from environment variables.
pub mod config;
/// App descriptor discovery.
pub mod discovery;
/// Error types.
pub mod error;
/// HTTP handlers.
pub mod handlers;
/// Instance launcher.
pub mod instance;
/// Instance lifecycle manager.
pub mod manager;
/// Connect/disconnect handshake.
pub mod mediator;
/// Instance reverse proxy.
pub mod proxy;
/// HTTP server.
pub mod server;
/// Domain records and JSON views.
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use manager::Manager;
