// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Passthrough gateway in front of the upstream states API.
//!
//! `GET /api/states?lamin=&lomin=&lamax=&lomax=` is forwarded to the upstream
//! `states/all` endpoint with the same four parameters. The upstream body is
//! relayed byte-for-byte on success. Failures come back as
//! `{"error": "..."}` with the upstream status, or 500 when the upstream
//! could not be reached or sent something that is not JSON.
//!
//! The gateway keeps no state: no validation, no caching, no rate limiting.

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Default upstream endpoint.
pub const DEFAULT_UPSTREAM_URL: &str = "https://opensky-network.org/api/states/all";

/// Default listen address.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8787";

/// Path served by the gateway.
pub const STATES_PATH: &str = "/api/states";

/// Gateway settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listen address in host:port format.
    pub bind_address: String,
    /// Upstream `states/all` URL.
    pub upstream_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
        }
    }
}

/// JSON error body returned on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Names of the bounding-box parameters, in wire order.
pub const BOX_PARAMS: [&str; 4] = ["lamin", "lomin", "lamax", "lomax"];

/// The bounding-box parameters of one request, kept exactly as sent.
///
/// Values are neither decoded nor validated. Other parameters are dropped,
/// repeated ones are kept in request order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatesQuery {
    pairs: Vec<(String, String)>,
}

impl StatesQuery {
    /// Pick the bounding-box parameters out of a raw query string.
    #[must_use]
    pub fn from_raw(raw: Option<&str>) -> Self {
        let pairs = raw
            .unwrap_or_default()
            .split('&')
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
                BOX_PARAMS
                    .contains(&name)
                    .then(|| (name.to_string(), value.to_string()))
            })
            .collect();

        Self { pairs }
    }

    /// Parameters that were present, in request order.
    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// The upstream URL with these parameters appended verbatim.
    #[must_use]
    pub fn apply_to(&self, base_url: &str) -> String {
        if self.pairs.is_empty() {
            return base_url.to_string();
        }

        let query = self
            .pairs
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if base_url.contains('?') { '&' } else { '?' };
        format!("{base_url}{separator}{query}")
    }
}

/// Errors raised while serving or forwarding.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Upstream answered with a non-success status.
    #[error("Upstream request failed: {0}")]
    Upstream(StatusCode),

    #[error("Upstream request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream returned invalid JSON: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Status code sent to the client for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Upstream(status) => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Forwarder holding the upstream client.
#[derive(Debug, Clone)]
pub struct Gateway {
    http: reqwest::Client,
    upstream_url: String,
}

impl Gateway {
    pub fn new(upstream_url: &str) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("skywatch-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            upstream_url: upstream_url.to_string(),
        })
    }

    #[must_use]
    pub fn upstream_url(&self) -> &str {
        &self.upstream_url
    }

    /// Forward one query and return the upstream body unchanged.
    pub async fn forward(&self, query: &StatesQuery) -> Result<Bytes, GatewayError> {
        let response = self
            .http
            .get(query.apply_to(&self.upstream_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Upstream(status));
        }

        let body = response.bytes().await?;
        // Relay as-is, but only if it is JSON at all
        serde_json::from_slice::<serde::de::IgnoredAny>(&body)?;

        Ok(body)
    }
}

async fn states_handler(
    State(gateway): State<Gateway>,
    RawQuery(raw): RawQuery,
) -> Response {
    let query = StatesQuery::from_raw(raw.as_deref());
    debug!("Forwarding states query {:?}", query.pairs());

    match gateway.forward(&query).await {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            warn!("States query failed: {e}");
            e.into_response()
        }
    }
}

/// Build the gateway router.
pub fn router(gateway: Gateway) -> Router {
    Router::new()
        .route(STATES_PATH, get(states_handler))
        .with_state(gateway)
}

/// Bind `config.bind_address` and serve until `cancel_token` fires.
pub async fn serve(config: GatewayConfig, cancel_token: CancellationToken) -> Result<(), GatewayError> {
    let gateway = Gateway::new(&config.upstream_url)?;
    let listener = TcpListener::bind(&config.bind_address)
        .await
        .map_err(|source| GatewayError::Bind {
            address: config.bind_address.clone(),
            source,
        })?;

    serve_on(listener, gateway, cancel_token).await
}

/// Serve on an already bound listener until `cancel_token` fires.
pub async fn serve_on(
    listener: TcpListener,
    gateway: Gateway,
    cancel_token: CancellationToken,
) -> Result<(), GatewayError> {
    info!(
        "Gateway listening on {} -> {}",
        listener.local_addr()?,
        gateway.upstream_url()
    );

    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(async move { cancel_token.cancelled().await })
        .await?;

    info!("Gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_keeps_box_params_verbatim() {
        let query = StatesQuery::from_raw(Some("lamax=20&extra=1&lamin=1e1&lomax=%2D5"));
        assert_eq!(
            query.apply_to("http://upstream/api/states/all"),
            "http://upstream/api/states/all?lamax=20&lamin=1e1&lomax=%2D5"
        );
    }

    #[test]
    fn test_query_keeps_repeated_params() {
        let query = StatesQuery::from_raw(Some("lamin=10&lamin=11&lomin=10"));
        assert_eq!(query.pairs().len(), 3);
        assert_eq!(query.apply_to("http://u/s?x=1"), "http://u/s?x=1&lamin=10&lamin=11&lomin=10");
    }

    #[test]
    fn test_empty_query_leaves_url_alone() {
        assert_eq!(StatesQuery::from_raw(None).apply_to("http://u/s"), "http://u/s");
        assert_eq!(StatesQuery::from_raw(Some("")).apply_to("http://u/s"), "http://u/s");
    }

    #[test]
    fn test_upstream_error_keeps_status_and_text() {
        let err = GatewayError::Upstream(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            err.to_string(),
            "Upstream request failed: 503 Service Unavailable"
        );
    }

    #[test]
    fn test_other_errors_are_internal() {
        let err = GatewayError::Io(std::io::Error::other("boom"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
