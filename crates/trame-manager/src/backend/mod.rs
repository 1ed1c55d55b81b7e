// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Backend configurations.
//!
//! | Name | Backend | Servers from |
//! |------|---------|--------------|
//! | `jsc` | [`JscBackend`] | SLURM on JUWELS Booster |
//! | `desktop` | [`DesktopBackend`] | a fixed local ParaView server |
//! | `mock` | [`MockBackend`] | in-memory test data |

pub mod desktop;
pub mod jsc;
pub mod mock;
pub mod scheduler;
mod traits;

use std::sync::Arc;

pub use desktop::DesktopBackend;
pub use jsc::JscBackend;
pub use mock::MockBackend;
pub use scheduler::SlurmScheduler;
pub use traits::*;

use crate::config::Config;
use crate::error::{Error, Result};

/// Build the backend registered under `name`.
pub fn from_name(name: &str, config: &Config) -> Result<Arc<dyn Backend>> {
    let backend: Arc<dyn Backend> = match name {
        "jsc" => Arc::new(JscBackend::from_config(config)?),
        "desktop" => Arc::new(DesktopBackend::new(config.home.clone())),
        "mock" => Arc::new(MockBackend::new()),
        other => return Err(Error::UnknownBackend(other.to_string())),
    };
    Ok(backend)
}
