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

//! Async HTTP layer between the tracker and the gateway.
//!
//! [`StatesClient`] performs one bounding-box query. [`Poller`] runs those
//! queries on a tokio runtime without blocking the caller and hands the
//! completions back through a channel, tagged with their ticket generation.
//! There are no retries; a failed query is reported once and the next
//! viewport-settled signal starts over.

use std::sync::Arc;

use log::{debug, info};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::gateway::ErrorBody;
use crate::protocol::{ParseError, StateVectorParser, StatesSnapshot};
use crate::tracker::QueryTicket;
use crate::viewport::BoundingBox;

/// Default gateway base URL.
pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8787";

/// Errors from a single gateway query.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("gateway returned {status}: {message}")]
    Gateway { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("decode error: {0}")]
    Parse(#[from] ParseError),
}

impl FetchError {
    /// HTTP status reported by the gateway, if the request got that far.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Gateway { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Parse(_) => None,
        }
    }
}

/// Client for the gateway's `/api/states` endpoint.
#[derive(Debug, Clone)]
pub struct StatesClient {
    http: reqwest::Client,
    endpoint: String,
}

impl StatesClient {
    /// Create a client for the gateway at `gateway_url` (scheme, host, port).
    pub fn new(gateway_url: &str) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("skywatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint: format!("{}/api/states", gateway_url.trim_end_matches('/')),
        })
    }

    /// Full URL of the states endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Query the aircraft inside `bbox`.
    pub async fn fetch(&self, bbox: &BoundingBox) -> Result<StatesSnapshot, FetchError> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&bbox.query_pairs())
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
            return Err(FetchError::Gateway {
                status: status.as_u16(),
                message,
            });
        }

        Ok(StateVectorParser::new().decode(&body)?)
    }
}

/// A finished query.
#[derive(Debug)]
pub struct PollEvent {
    pub generation: u64,
    pub result: Result<StatesSnapshot, FetchError>,
}

type Waker = Arc<dyn Fn() + Send + Sync>;

/// Fire-and-forget executor for query tickets.
///
/// Each [`Poller::request`] spawns one fetch on the runtime; completions are
/// collected with [`Poller::try_recv`] from a synchronous caller such as a UI
/// frame loop, or awaited with [`Poller::recv`].
pub struct Poller {
    client: StatesClient,
    runtime: Handle,
    event_tx: mpsc::UnboundedSender<PollEvent>,
    event_rx: mpsc::UnboundedReceiver<PollEvent>,
    cancel_token: CancellationToken,
    waker: Option<Waker>,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("client", &self.client)
            .field("cancel_token", &self.cancel_token)
            .finish_non_exhaustive()
    }
}

impl Poller {
    /// Create a poller that runs its fetches on `runtime`.
    #[must_use]
    pub fn new(client: StatesClient, runtime: Handle) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            client,
            runtime,
            event_tx,
            event_rx,
            cancel_token: CancellationToken::new(),
            waker: None,
        }
    }

    /// Callback invoked after each completion, e.g. to request a repaint.
    #[must_use]
    pub fn with_waker(mut self, waker: impl Fn() + Send + Sync + 'static) -> Self {
        self.waker = Some(Arc::new(waker));
        self
    }

    /// Start the query for `ticket`.
    pub fn request(&self, ticket: QueryTicket) {
        let client = self.client.clone();
        let event_tx = self.event_tx.clone();
        let cancel_token = self.cancel_token.clone();
        let waker = self.waker.clone();

        self.runtime.spawn(async move {
            tokio::select! {
                result = client.fetch(&ticket.bbox) => {
                    debug!("Query {} completed (ok={})", ticket.generation, result.is_ok());
                    if event_tx.send(PollEvent { generation: ticket.generation, result }).is_err() {
                        return; // Receiver dropped
                    }
                    if let Some(waker) = waker {
                        waker();
                    }
                }
                () = cancel_token.cancelled() => {
                    debug!("Query {} cancelled", ticket.generation);
                }
            }
        });
    }

    /// Next finished query, if any, without blocking.
    pub fn try_recv(&mut self) -> Option<PollEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Wait for the next finished query.
    pub async fn recv(&mut self) -> Option<PollEvent> {
        self.event_rx.recv().await
    }

    /// Abandon all in-flight queries.
    pub fn shutdown(&self) {
        info!("Shutting down states poller");
        self.cancel_token.cancel();
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_normalizes_trailing_slash() {
        let client = StatesClient::new("http://localhost:8787/").unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8787/api/states");
    }

    #[test]
    fn test_gateway_error_status() {
        let err = FetchError::Gateway {
            status: 503,
            message: "Upstream request failed: 503 Service Unavailable".to_string(),
        };
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("503"));
    }
}
