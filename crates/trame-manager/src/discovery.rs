// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! App descriptor discovery.
//!
//! Every search root may contain a `trame/` directory whose immediate
//! subdirectories are apps:
//!
//! ```text
//! <root>/trame/<app>/app.yml     (or app.yaml)
//! ```
//!
//! | Key | Required | Meaning |
//! |-----|----------|---------|
//! | `name` | yes | display name |
//! | `command` | yes | shell command launching an instance |
//! | `working_directory` | no | spawn directory, relative paths resolve against the app directory |

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::App;

/// Descriptor file names, in lookup order.
pub const DESCRIPTOR_NAMES: [&str; 2] = ["app.yml", "app.yaml"];

#[derive(Debug, Deserialize)]
struct Descriptor {
    name: String,
    command: String,
    #[serde(default)]
    working_directory: Option<PathBuf>,
}

/// Discover apps under `<root>/trame/*` for every search root.
///
/// Roots without a readable `trame/` directory are skipped. Apps come back in
/// root order; a later app with the same name is meant to replace an earlier
/// one when collected into a map.
pub fn discover_apps(search_paths: &[PathBuf]) -> Result<Vec<App>> {
    info!(paths = ?search_paths, "Searching for trame apps");

    let mut apps = Vec::new();
    for root in search_paths {
        let trame_dir = root.join("trame");
        let entries = match std::fs::read_dir(&trame_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(path = %trame_dir.display(), error = %e, "Skipping search root");
                continue;
            }
        };

        let mut app_dirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        app_dirs.sort();

        for dir in app_dirs {
            apps.push(parse_app_dir(&dir)?);
        }
    }

    Ok(apps)
}

/// Parse the descriptor of a single app directory.
pub fn parse_app_dir(dir: &Path) -> Result<App> {
    let path = find_descriptor(dir).ok_or_else(|| Error::Descriptor {
        path: dir.to_path_buf(),
        reason: "directory has no app.yml or app.yaml".to_string(),
    })?;

    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Descriptor {
            path: dir.to_path_buf(),
            reason: "app directory has no name".to_string(),
        })?;

    let text = std::fs::read_to_string(&path)?;
    let descriptor: Descriptor = serde_yaml::from_str(&text).map_err(|e| Error::Descriptor {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    info!(app = %name, path = %path.display(), "Found trame app");

    Ok(App {
        name,
        display_name: descriptor.name,
        command: descriptor.command,
        working_directory: descriptor.working_directory.map(|wd| dir.join(wd)),
        path,
        instances: Vec::new(),
    })
}

fn find_descriptor(dir: &Path) -> Option<PathBuf> {
    DESCRIPTOR_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}
