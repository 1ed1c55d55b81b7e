// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reverse proxy routes for trame instances.
//!
//! Every launched instance gets one route, `<base_url>trame/<uuid>/`, that
//! forwards to `http://localhost:<port>/`. The instance's one-time secret is
//! appended to the app root (`/` and `/index.html`) only, so it leaves the
//! service with the first page load and never with sub-resource requests.
//!
//! Plain requests are forwarded with reqwest; upstream redirects are passed
//! back to the browser untouched. `Upgrade: websocket` requests are tunnelled
//! to `ws://localhost:<port>/...`, relaying frames in both directions.
//!
//! A route is removed only when its instance fails to start.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::ws::{self, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use reqwest::redirect::Policy;
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as UpstreamCloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Query parameter carrying the secret.
pub const SECRET_PARAM: &str = "secret";

/// Largest request body forwarded to an instance.
pub const MAX_PROXY_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Headers that apply to a single connection and are not forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "host",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
];

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Where a route forwards to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    /// Local port of the instance
    pub port: u16,
    auth_key: String,
}

/// Table of instance routes.
#[derive(Debug, Clone)]
pub struct ProxyRouter {
    base_url: String,
    host: String,
    routes: Arc<RwLock<HashMap<String, ProxyTarget>>>,
    client: Client,
}

impl ProxyRouter {
    /// Create an empty router below `base_url` (normalized, ends with `/`).
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .build()
            .map_err(Error::ProxyClient)?;
        Ok(Self {
            base_url: base_url.into(),
            host: "localhost".to_string(),
            routes: Arc::new(RwLock::new(HashMap::new())),
            client,
        })
    }

    /// Path prefix all instance routes live under.
    pub fn route_prefix(&self) -> String {
        format!("{}trame/", self.base_url)
    }

    /// Register a route and return the instance's external base URL.
    pub async fn register(&self, uuid: &str, port: u16, auth_key: &str) -> String {
        self.routes.write().await.insert(
            uuid.to_string(),
            ProxyTarget {
                port,
                auth_key: auth_key.to_string(),
            },
        );
        let base_url = format!("{}{uuid}/", self.route_prefix());
        debug!(uuid, port, base_url = %base_url, "Registered proxy route");
        base_url
    }

    /// Drop the route of an instance that never came up.
    pub(crate) async fn remove(&self, uuid: &str) -> Option<ProxyTarget> {
        let removed = self.routes.write().await.remove(uuid);
        if removed.is_some() {
            debug!(uuid, "Removed proxy route");
        }
        removed
    }

    /// Target registered for `uuid`.
    pub async fn target(&self, uuid: &str) -> Option<ProxyTarget> {
        self.routes.read().await.get(uuid).cloned()
    }

    /// Number of registered routes.
    pub async fn len(&self) -> usize {
        self.routes.read().await.len()
    }

    /// Whether no route is registered.
    pub async fn is_empty(&self) -> bool {
        self.routes.read().await.is_empty()
    }

    fn upstream_url(
        &self,
        scheme: &str,
        target: &ProxyTarget,
        path: &str,
        query: Option<&str>,
    ) -> String {
        let mut url = format!(
            "{scheme}://{}:{}{}",
            self.host,
            target.port,
            map_path(path, &target.auth_key)
        );
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(query);
        }
        url
    }

    /// Forward a request for `path` (relative to the instance root, starting
    /// with `/`) to the instance registered under `uuid`.
    pub async fn forward(
        &self,
        uuid: &str,
        path: &str,
        query: Option<&str>,
        method: Method,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        let Some(target) = self.target(uuid).await else {
            return not_found(uuid);
        };
        let url = self.upstream_url("http", &target, path, query);

        debug!(uuid, method = %method, path, "Proxying request");

        let mut request = self
            .client
            .request(method, &url)
            .headers(forwardable(&headers));
        if !body.is_empty() {
            request = request.body(body);
        }

        let upstream = match request.send().await {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!(uuid, port = target.port, error = %e, "Proxy request failed");
                return (StatusCode::BAD_GATEWAY, format!("Instance unreachable: {e}"))
                    .into_response();
            }
        };

        let status = upstream.status();
        let upstream_headers = forwardable(upstream.headers());
        let bytes = match upstream.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(uuid, error = %e, "Failed to read instance response");
                return (StatusCode::BAD_GATEWAY, format!("Instance response failed: {e}"))
                    .into_response();
            }
        };

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = upstream_headers;
        response.headers_mut().remove(header::CONTENT_LENGTH);
        response
    }

    /// Tunnel a WebSocket upgrade for `path` to the instance registered under
    /// `uuid`. The upstream handshake completes before the client is upgraded.
    pub async fn tunnel(
        &self,
        uuid: &str,
        path: &str,
        query: Option<&str>,
        upgrade: WebSocketUpgrade,
    ) -> Response {
        let Some(target) = self.target(uuid).await else {
            return not_found(uuid);
        };
        let url = self.upstream_url("ws", &target, path, query);

        let upstream = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((upstream, _)) => upstream,
            Err(e) => {
                warn!(uuid, port = target.port, error = %e, "WebSocket handshake with instance failed");
                return (StatusCode::BAD_GATEWAY, format!("Instance unreachable: {e}"))
                    .into_response();
            }
        };

        debug!(uuid, path, "Tunnelling WebSocket");
        let uuid = uuid.to_string();
        upgrade.on_upgrade(move |socket| async move {
            relay(socket, upstream).await;
            debug!(uuid = %uuid, "WebSocket tunnel closed");
        })
    }
}

fn not_found(uuid: &str) -> Response {
    (StatusCode::NOT_FOUND, format!("No trame instance {uuid}")).into_response()
}

/// Rewrite an instance path, appending the secret to the app root only.
pub fn map_path(path: &str, secret: &str) -> String {
    if path == "/" || path == "/index.html" {
        format!("{path}?{SECRET_PARAM}={secret}")
    } else {
        path.to_string()
    }
}

/// Whether a request asks for a WebSocket upgrade.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !HOP_BY_HOP.contains(&name.as_str()) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Copy frames between the browser and the instance until either side closes.
async fn relay(client: WebSocket, upstream: UpstreamSocket) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let outbound = async {
        while let Some(Ok(message)) = client_rx.next().await {
            let closing = matches!(message, ws::Message::Close(_));
            if upstream_tx.send(to_upstream(message)).await.is_err() || closing {
                break;
            }
        }
        let _ = upstream_tx.close().await;
    };

    let inbound = async {
        while let Some(Ok(message)) = upstream_rx.next().await {
            let Some(message) = to_client(message) else {
                continue;
            };
            let closing = matches!(message, ws::Message::Close(_));
            if client_tx.send(message).await.is_err() || closing {
                break;
            }
        }
        let _ = client_tx.close().await;
    };

    tokio::select! {
        _ = outbound => {}
        _ = inbound => {}
    }
}

fn to_upstream(message: ws::Message) -> UpstreamMessage {
    match message {
        ws::Message::Text(text) => UpstreamMessage::Text(text.as_str().to_owned().into()),
        ws::Message::Binary(data) => UpstreamMessage::Binary(data),
        ws::Message::Ping(data) => UpstreamMessage::Ping(data),
        ws::Message::Pong(data) => UpstreamMessage::Pong(data),
        ws::Message::Close(frame) => UpstreamMessage::Close(frame.map(|f| UpstreamCloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().to_owned().into(),
        })),
    }
}

fn to_client(message: UpstreamMessage) -> Option<ws::Message> {
    let message = match message {
        UpstreamMessage::Text(text) => ws::Message::Text(text.as_str().to_owned().into()),
        UpstreamMessage::Binary(data) => ws::Message::Binary(data),
        UpstreamMessage::Ping(data) => ws::Message::Ping(data),
        UpstreamMessage::Pong(data) => ws::Message::Pong(data),
        UpstreamMessage::Close(frame) => ws::Message::Close(frame.map(|f| ws::CloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().to_owned().into(),
        })),
        // Raw frames are never yielded when reading.
        UpstreamMessage::Frame(_) => return None,
    };
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_only_on_root() {
        assert_eq!(map_path("/", "k"), "/?secret=k");
        assert_eq!(map_path("/index.html", "k"), "/index.html?secret=k");
        for path in ["/app.js", "/index.htm", "/sub/", "/sub/index.html", "/ws"] {
            assert_eq!(map_path(path, "k"), path);
        }
    }

    #[test]
    fn test_hop_by_hop_headers_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "example".parse().unwrap());
        headers.insert(header::CONNECTION, "keep-alive".parse().unwrap());
        headers.insert(header::ACCEPT, "text/html".parse().unwrap());
        headers.append(header::COOKIE, "a=1".parse().unwrap());
        headers.append(header::COOKIE, "b=2".parse().unwrap());

        let out = forwardable(&headers);
        assert!(out.get(header::HOST).is_none());
        assert!(out.get(header::CONNECTION).is_none());
        assert_eq!(out.get(header::ACCEPT).unwrap(), "text/html");
        assert_eq!(out.get_all(header::COOKIE).iter().count(), 2);
    }

    #[test]
    fn test_websocket_upgrade_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_websocket_upgrade(&headers));
        headers.insert(header::UPGRADE, "h2c".parse().unwrap());
        assert!(!is_websocket_upgrade(&headers));
        headers.insert(header::UPGRADE, "WebSocket".parse().unwrap());
        assert!(is_websocket_upgrade(&headers));
    }

    #[test]
    fn test_upstream_url_schemes() {
        let router = ProxyRouter::new("/").unwrap();
        let target = ProxyTarget {
            port: 4000,
            auth_key: "k".to_string(),
        };
        assert_eq!(
            router.upstream_url("http", &target, "/", Some("a=1")),
            "http://localhost:4000/?secret=k&a=1"
        );
        assert_eq!(
            router.upstream_url("ws", &target, "/ws", None),
            "ws://localhost:4000/ws"
        );
    }

    #[test]
    fn test_close_frames_keep_code_and_reason() {
        let message = to_upstream(ws::Message::Close(Some(ws::CloseFrame {
            code: 1001,
            reason: "bye".to_string().into(),
        })));
        let UpstreamMessage::Close(Some(frame)) = &message else {
            panic!("expected close frame, got {message:?}");
        };
        assert_eq!(u16::from(frame.code), 1001);
        assert_eq!(frame.reason.as_str(), "bye");

        let Some(ws::Message::Close(Some(frame))) = to_client(message) else {
            panic!("expected close frame");
        };
        assert_eq!(frame.code, 1001);
        assert_eq!(frame.reason.as_str(), "bye");
    }

    #[tokio::test]
    async fn test_register_returns_base_url() {
        let router = ProxyRouter::new("/user/alice/").unwrap();
        let url = router.register("abc", 4000, "k").await;
        assert_eq!(url, "/user/alice/trame/abc/");
        assert_eq!(router.target("abc").await.unwrap().port, 4000);
        assert_eq!(router.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_drops_route() {
        let router = ProxyRouter::new("/").unwrap();
        router.register("abc", 4000, "k").await;

        assert_eq!(router.remove("abc").await.map(|t| t.port), Some(4000));
        assert!(router.target("abc").await.is_none());
        assert!(router.remove("abc").await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_uuid_is_not_found() {
        let router = ProxyRouter::new("/").unwrap();
        let response = router
            .forward("missing", "/", None, Method::GET, HeaderMap::new(), Bytes::new())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
