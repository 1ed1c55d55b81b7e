// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP handlers.
//!
//! Per-request failures answer `400 Bad Request` with the error text.

use std::collections::HashMap;

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Path, Query, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::Error;
use crate::proxy::{MAX_PROXY_BODY_BYTES, is_websocket_upgrade};
use crate::server::ServiceState;
use crate::types::{
    AppView, ConnectResponse, InstanceView, LaunchResult, ParaViewLaunchOptions, ServerView,
    TrameLaunchOptions, UserData,
};

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        warn!(error = %self, "Request failed");
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, Response>;

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, message.into()).into_response()
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| bad_request(format!("Invalid request body: {e}")))
}

/// Body of `POST trame`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchTrameRequest {
    app_name: String,
    #[serde(flatten)]
    options: TrameLaunchOptions,
}

/// Body of `POST trame/connect`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    app_name: String,
    instance_name: String,
    server_name: String,
}

/// Body of `POST trame/disconnect`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectRequest {
    app_name: String,
    instance_name: String,
}

/// `GET trame`
pub async fn list_apps(State(state): State<ServiceState>) -> Json<Vec<AppView>> {
    Json(state.manager.apps().await)
}

/// `POST trame`
pub async fn launch_trame(
    State(state): State<ServiceState>,
    payload: Result<Json<LaunchTrameRequest>, JsonRejection>,
) -> ApiResult<InstanceView> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;
    let instance = state
        .manager
        .launch_trame(&request.app_name, request.options)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(Json(instance))
}

/// `POST trame/{action}` with `connect`, `disconnect` or `rediscover`.
pub async fn trame_action(
    State(state): State<ServiceState>,
    Path(action): Path<String>,
    body: Bytes,
) -> Response {
    match action.as_str() {
        "connect" => {
            let request: ConnectRequest = match parse_body(&body) {
                Ok(request) => request,
                Err(response) => return response,
            };
            match state
                .manager
                .connect_to_backend(
                    &request.app_name,
                    &request.instance_name,
                    &request.server_name,
                )
                .await
            {
                Ok(connected) => Json::<ConnectResponse>(connected).into_response(),
                Err(e) => e.into_response(),
            }
        }
        "disconnect" => {
            let request: DisconnectRequest = match parse_body(&body) {
                Ok(request) => request,
                Err(response) => return response,
            };
            match state
                .manager
                .disconnect(&request.app_name, &request.instance_name)
                .await
            {
                Ok(()) => StatusCode::OK.into_response(),
                Err(e) => e.into_response(),
            }
        }
        "rediscover" => match state.manager.rediscover_apps().await {
            Ok(apps) => Json(apps).into_response(),
            Err(e) => e.into_response(),
        },
        other => bad_request(format!("Unknown action: {other}")),
    }
}

/// `GET paraview`, refreshing the snapshot first.
pub async fn list_servers(State(state): State<ServiceState>) -> ApiResult<Vec<ServerView>> {
    state
        .manager
        .refresh_servers()
        .await
        .map(Json)
        .map_err(IntoResponse::into_response)
}

/// `POST paraview`
pub async fn launch_paraview(
    State(state): State<ServiceState>,
    payload: Result<Json<ParaViewLaunchOptions>, JsonRejection>,
) -> ApiResult<LaunchResult> {
    let Json(options) = payload.map_err(|e| bad_request(e.body_text()))?;
    state
        .manager
        .launch_paraview(options)
        .await
        .map(Json)
        .map_err(IntoResponse::into_response)
}

/// `GET user`
pub async fn user(State(state): State<ServiceState>) -> ApiResult<UserData> {
    state
        .manager
        .user_data()
        .await
        .map(Json)
        .map_err(IntoResponse::into_response)
}

/// Unauthenticated liveness probe.
pub async fn health(State(state): State<ServiceState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "trame-manager",
        "backend": state.manager.backend().name(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `trame/{uuid}` without trailing slash redirects to the instance root.
pub async fn proxy_redirect(request: Request) -> Redirect {
    let uri = request.uri();
    let target = match uri.query() {
        Some(query) => format!("{}/?{query}", uri.path()),
        None => format!("{}/", uri.path()),
    };
    Redirect::permanent(&target)
}

/// Forward `trame/{uuid}/...` to the instance.
///
/// WebSocket upgrades are tunnelled. In token mode the service credential
/// is removed before the request reaches the instance.
pub async fn proxy(
    State(state): State<ServiceState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
) -> Response {
    let Some(uuid) = params.get("uuid") else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let router = state.manager.router();
    let (mut parts, body) = request.into_parts();
    let prefix = format!("{}{uuid}", router.route_prefix());
    let path = parts
        .uri
        .path()
        .strip_prefix(prefix.as_str())
        .filter(|p| p.starts_with('/'))
        .unwrap_or("/")
        .to_string();

    let query = match state.token.as_deref() {
        Some(token) => {
            strip_credentials(&mut parts.headers, token);
            parts.uri.query().and_then(query_without_token)
        }
        None => parts.uri.query().map(str::to_string),
    };

    if is_websocket_upgrade(&parts.headers) {
        return match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
            Ok(upgrade) => router.tunnel(uuid, &path, query.as_deref(), upgrade).await,
            Err(rejection) => rejection.into_response(),
        };
    }

    let body = match axum::body::to_bytes(body, MAX_PROXY_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("Request body rejected (limit {MAX_PROXY_BODY_BYTES} bytes): {e}"),
            )
                .into_response();
        }
    };

    router
        .forward(
            uuid,
            &path,
            query.as_deref(),
            parts.method,
            parts.headers,
            body,
        )
        .await
}

/// Require the configured token as `Authorization: token <t>`,
/// `Authorization: Bearer <t>`, `?token=<t>` or the session cookie.
///
/// A request authenticated by header or query gets the session cookie,
/// scoped to the base URL, so pages loaded through the proxy can fetch
/// their sub-resources.
pub async fn require_token(
    State(state): State<ServiceState>,
    Query(query): Query<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.token.as_deref() else {
        return next.run(request).await;
    };

    if cookie_value(request.headers(), TOKEN_COOKIE).as_deref() == Some(expected) {
        return next.run(request).await;
    }

    let from_header = header_token(request.headers());
    let from_query = query.get("token").map(String::as_str);
    if from_header != Some(expected) && from_query != Some(expected) {
        return (StatusCode::UNAUTHORIZED, "Missing or invalid token").into_response();
    }

    let cookie = session_cookie(expected, &state.manager.config().base_url);
    let mut response = next.run(request).await;
    if let Some(cookie) = cookie {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}

/// Name of the session cookie set after token authentication.
pub const TOKEN_COOKIE: &str = "trame_manager_token";

fn header_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("token ")
                .or_else(|| v.strip_prefix("Bearer "))
        })
        .map(str::trim)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| value.trim().to_string())
        })
}

fn session_cookie(token: &str, base_url: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{TOKEN_COOKIE}={token}; Path={base_url}; HttpOnly; SameSite=Lax"
    ))
    .ok()
}

/// Remove the session cookie, and an `Authorization` header carrying the
/// service token, from a request bound for an instance.
fn strip_credentials(headers: &mut HeaderMap, token: &str) {
    if header_token(headers) == Some(token) {
        headers.remove(header::AUTHORIZATION);
    }

    let kept: Vec<String> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split_once('=').map(|(k, _)| k.trim()) != Some(TOKEN_COOKIE))
        .map(str::to_string)
        .collect();
    headers.remove(header::COOKIE);
    if kept.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&kept.join("; ")) {
        headers.insert(header::COOKIE, value);
    }
}

/// Query string minus any `token` parameter, `None` when nothing is left.
fn query_without_token(query: &str) -> Option<String> {
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next() != Some("token"))
        .collect();
    (!kept.is_empty()).then(|| kept.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_without_token() {
        assert_eq!(query_without_token("token=s3cret"), None);
        assert_eq!(
            query_without_token("a=1&token=s3cret&b=2").as_deref(),
            Some("a=1&b=2")
        );
        assert_eq!(query_without_token("tokens=1").as_deref(), Some("tokens=1"));
    }

    #[test]
    fn test_strip_credentials_keeps_app_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            "theme=dark; trame_manager_token=s3cret; lang=en".parse().unwrap(),
        );
        headers.insert(header::AUTHORIZATION, "token s3cret".parse().unwrap());

        strip_credentials(&mut headers, "s3cret");

        assert_eq!(headers.get(header::COOKIE).unwrap(), "theme=dark; lang=en");
        assert!(headers.get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_strip_credentials_drops_lone_session_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "trame_manager_token=s3cret".parse().unwrap());
        headers.insert(header::AUTHORIZATION, "Bearer app-owned".parse().unwrap());

        strip_credentials(&mut headers, "s3cret");

        assert!(headers.get(header::COOKIE).is_none());
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer app-owned");
    }

    #[test]
    fn test_session_cookie_scoped_to_base_url() {
        let cookie = session_cookie("s3cret", "/user/alice/").unwrap();
        assert_eq!(
            cookie,
            "trame_manager_token=s3cret; Path=/user/alice/; HttpOnly; SameSite=Lax"
        );
    }
}
