// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connect/disconnect handshake with running trame instances.
//!
//! Instances expose `POST /api` on their local port and accept:
//!
//! ```json
//! {"action": "connect", "url": "jwb0183i.juwels", "port": 11111}
//! {"action": "disconnect"}
//! ```

use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::error::Result;

/// ParaView render server port.
pub const PARAVIEW_PORT: u16 = 11111;

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum Directive<'a> {
    Connect { url: Option<&'a str>, port: u16 },
    Disconnect,
}

/// Sends handshake directives to instances on the local host.
#[derive(Debug, Clone)]
pub struct Mediator {
    client: Client,
    host: String,
}

impl Default for Mediator {
    fn default() -> Self {
        Self::new()
    }
}

impl Mediator {
    /// Create a mediator talking to `localhost`.
    pub fn new() -> Self {
        Self::with_host("localhost")
    }

    /// Create a mediator talking to instances on `host`.
    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            host: host.into(),
        }
    }

    /// Tell the instance on `port` to attach to the server at `address`.
    pub async fn connect(&self, port: u16, address: Option<&str>) -> Result<()> {
        info!(port, address = ?address, "Connecting instance to server");
        self.send(
            port,
            &Directive::Connect {
                url: address,
                port: PARAVIEW_PORT,
            },
        )
        .await
    }

    /// Tell the instance on `port` to detach from its server.
    pub async fn disconnect(&self, port: u16) -> Result<()> {
        info!(port, "Disconnecting instance");
        self.send(port, &Directive::Disconnect).await
    }

    async fn send(&self, port: u16, directive: &Directive<'_>) -> Result<()> {
        self.client
            .post(format!("http://{}:{port}/api", self.host))
            .json(directive)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_bodies() {
        let connect = serde_json::to_value(Directive::Connect {
            url: Some("jwb0183i.juwels"),
            port: PARAVIEW_PORT,
        })
        .unwrap();
        assert_eq!(
            connect,
            serde_json::json!({"action": "connect", "url": "jwb0183i.juwels", "port": 11111})
        );

        let disconnect = serde_json::to_value(Directive::Disconnect).unwrap();
        assert_eq!(disconnect, serde_json::json!({"action": "disconnect"}));
    }
}
