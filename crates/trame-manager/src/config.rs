// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for trame-manager.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Default HTTP listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8890";

/// Default cluster identity injected into job scripts.
pub const DEFAULT_SYSTEM_NAME: &str = "juwelsbooster";

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifier of the active backend (`jsc`, `desktop`, `mock`)
    pub backend: String,
    /// Search roots for app discovery (each is scanned for a `trame/` child)
    pub search_paths: Vec<PathBuf>,
    /// HTTP listen address
    pub bind_addr: SocketAddr,
    /// Base URL of the host, always starting and ending with `/`
    pub base_url: String,
    /// Shared session token; every API request must carry it when set
    pub token: Option<String>,
    /// Directory holding per-instance secret and log files
    pub runtime_dir: PathBuf,
    /// Override for the built-in ParaView job script template
    pub job_template: Option<PathBuf>,
    /// Scratch root for job directories (cluster backends only)
    pub scratch: Option<PathBuf>,
    /// Name of the user running the service
    pub user: String,
    /// Home directory, used when a requested data directory does not exist
    pub home: PathBuf,
    /// Cluster identity passed to job templates
    pub system_name: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = lookup("TRAME_MANAGER_CONFIGURATION")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingEnvVar("TRAME_MANAGER_CONFIGURATION"))?;

        let search_paths = lookup("JUPYTER_PATH")
            .map(|v| split_search_path(&v))
            .unwrap_or_default();

        let bind_addr = lookup("TRAME_MANAGER_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(bind_addr))?;

        let base_url = normalize_base_url(
            &lookup("TRAME_MANAGER_BASE_URL").unwrap_or_else(|| "/".to_string()),
        );

        let token = lookup("TRAME_MANAGER_TOKEN").filter(|v| !v.is_empty());

        let runtime_dir = lookup("TRAME_MANAGER_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("trame-manager"));

        let job_template = lookup("TRAME_MANAGER_JOB_TEMPLATE").map(PathBuf::from);
        let scratch = lookup("SCRATCH").map(PathBuf::from);
        let user = lookup("USER").unwrap_or_else(|| "unknown".to_string());

        let home = lookup("HOME")
            .map(PathBuf::from)
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("/"));

        let system_name =
            lookup("SYSTEMNAME").unwrap_or_else(|| DEFAULT_SYSTEM_NAME.to_string());

        Ok(Self {
            backend,
            search_paths,
            bind_addr,
            base_url,
            token,
            runtime_dir,
            job_template,
            scratch,
            user,
            home,
            system_name,
        })
    }

    /// Defaults for the given backend, without reading the environment.
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            search_paths: Vec::new(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8890)),
            base_url: "/".to_string(),
            token: None,
            runtime_dir: std::env::temp_dir().join("trame-manager"),
            job_template: None,
            scratch: None,
            user: "unknown".to_string(),
            home: dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")),
            system_name: DEFAULT_SYSTEM_NAME.to_string(),
        }
    }
}

fn split_search_path(value: &str) -> Vec<PathBuf> {
    std::env::split_paths(value)
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}

/// Ensure the base URL starts and ends with a single `/`.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// The bind address could not be parsed.
    #[error("Invalid bind address: {0}")]
    InvalidBindAddr(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_selector() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingEnvVar("TRAME_MANAGER_CONFIGURATION")
        ));
    }

    #[test]
    fn test_defaults() {
        let config =
            Config::from_lookup(lookup_from(&[("TRAME_MANAGER_CONFIGURATION", "desktop")]))
                .unwrap();
        assert_eq!(config.backend, "desktop");
        assert!(config.search_paths.is_empty());
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.base_url, "/");
        assert!(config.token.is_none());
        assert_eq!(config.user, "unknown");
        assert_eq!(config.system_name, "juwelsbooster");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("TRAME_MANAGER_CONFIGURATION", "jsc"),
            ("JUPYTER_PATH", "/opt/a:/opt/b"),
            ("TRAME_MANAGER_BIND_ADDR", "0.0.0.0:9000"),
            ("TRAME_MANAGER_BASE_URL", "user/alice"),
            ("TRAME_MANAGER_TOKEN", "s3cret"),
            ("SCRATCH", "/p/scratch/proj"),
            ("USER", "alice"),
            ("HOME", "/home/alice"),
            ("SYSTEMNAME", "jurecadc"),
        ]))
        .unwrap();
        assert_eq!(
            config.search_paths,
            vec![PathBuf::from("/opt/a"), PathBuf::from("/opt/b")]
        );
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.base_url, "/user/alice/");
        assert_eq!(config.token.as_deref(), Some("s3cret"));
        assert_eq!(config.scratch, Some(PathBuf::from("/p/scratch/proj")));
        assert_eq!(config.user, "alice");
        assert_eq!(config.home, PathBuf::from("/home/alice"));
        assert_eq!(config.system_name, "jurecadc");
    }

    #[test]
    fn test_invalid_bind_addr() {
        let err = Config::from_lookup(lookup_from(&[
            ("TRAME_MANAGER_CONFIGURATION", "desktop"),
            ("TRAME_MANAGER_BIND_ADDR", "not-an-addr"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBindAddr(_)));
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url(""), "/");
        assert_eq!(normalize_base_url("/"), "/");
        assert_eq!(normalize_base_url("/hub/user/x"), "/hub/user/x/");
        assert_eq!(normalize_base_url("hub/"), "/hub/");
    }
}
