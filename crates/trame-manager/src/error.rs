// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for trame-manager.

use std::path::PathBuf;

use thiserror::Error;

/// Service errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// An app descriptor is missing or malformed.
    #[error("Invalid app descriptor {}: {reason}", .path.display())]
    Descriptor {
        /// Descriptor file, or the app directory when no descriptor exists
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// No backend is registered under the configured name.
    #[error("Unknown backend configuration: {0}")]
    UnknownBackend(String),

    /// App was not found.
    #[error("App not found: {0}")]
    AppNotFound(String),

    /// Instance was not found.
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    /// Server was not found.
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    /// An external command could not be spawned.
    #[error("Failed to run {program}: {source}")]
    Command {
        /// Program that failed to start
        program: String,
        /// Underlying spawn error
        #[source]
        source: std::io::Error,
    },

    /// An external command exited with a non-zero code.
    #[error("{program} exited with code {code}: {output}")]
    CommandFailed {
        /// Program that was run
        program: String,
        /// Exit code
        code: i32,
        /// Captured stdout and stderr
        output: String,
    },

    /// Scheduler output did not have the expected shape.
    #[error("Unexpected scheduler output {line:?}: {reason}")]
    Parse {
        /// Offending report line
        line: String,
        /// What went wrong
        reason: String,
    },

    /// A node-name pattern did not compile.
    #[error("Invalid node pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Template rendering failed.
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// Connect/disconnect request to an instance failed.
    #[error("Handshake with instance failed: {0}")]
    Handshake(#[from] reqwest::Error),

    /// The proxy HTTP client could not be built.
    #[error("Failed to build proxy client: {0}")]
    ProxyClient(#[source] reqwest::Error),

    /// The active backend does not support the operation.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type using the service Error.
pub type Result<T> = std::result::Result<T, Error>;
