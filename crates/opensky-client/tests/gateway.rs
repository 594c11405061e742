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

use std::sync::{Arc, Mutex};

use axum::extract::{RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use opensky_client::gateway::{self, ErrorBody, Gateway};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct FakeUpstream {
    status: StatusCode,
    body: &'static str,
    seen: Arc<Mutex<Vec<Option<String>>>>,
}

async fn upstream_handler(State(upstream): State<FakeUpstream>, RawQuery(query): RawQuery) -> Response {
    upstream.seen.lock().unwrap().push(query);
    (
        upstream.status,
        [(header::CONTENT_TYPE, "application/json")],
        upstream.body,
    )
        .into_response()
}

async fn spawn_upstream(status: StatusCode, body: &'static str) -> (String, Arc<Mutex<Vec<Option<String>>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let upstream = FakeUpstream {
        status,
        body,
        seen: Arc::clone(&seen),
    };
    let app = Router::new()
        .route("/api/states/all", get(upstream_handler))
        .with_state(upstream);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/api/states/all"), seen)
}

async fn spawn_gateway(upstream_url: &str) -> (String, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let gateway = Gateway::new(upstream_url).unwrap();
    let cancel = CancellationToken::new();

    tokio::spawn(gateway::serve_on(listener, gateway, cancel.clone()));

    (format!("http://{addr}"), cancel)
}

#[tokio::test]
async fn test_passthrough_relays_body_unchanged() {
    // Odd spacing proves the body is not re-serialized
    let body = r#"{"time":1,  "states":[]}"#;
    let (upstream_url, seen) = spawn_upstream(StatusCode::OK, body).await;
    let (gateway_url, cancel) = spawn_gateway(&upstream_url).await;

    let response = reqwest::get(format!(
        "{gateway_url}/api/states?lamin=10&lomin=10&lamax=20&lomax=20"
    ))
    .await
    .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.headers()[reqwest::header::CONTENT_TYPE],
        "application/json"
    );
    assert_eq!(response.text().await.unwrap(), body);
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        [Some("lamin=10&lomin=10&lamax=20&lomax=20".to_string())]
    );

    cancel.cancel();
}

#[tokio::test]
async fn test_missing_params_are_omitted_upstream() {
    let (upstream_url, seen) = spawn_upstream(StatusCode::OK, r#"{"time":1,"states":null}"#).await;
    let (gateway_url, cancel) = spawn_gateway(&upstream_url).await;

    let response = reqwest::get(format!("{gateway_url}/api/states?lamin=abc"))
        .await
        .unwrap();

    // No validation: whatever was sent goes through as-is
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(seen.lock().unwrap().as_slice(), [Some("lamin=abc".to_string())]);

    cancel.cancel();
}

#[tokio::test]
async fn test_repeated_and_unknown_params_are_not_rejected() {
    let (upstream_url, seen) = spawn_upstream(StatusCode::OK, r#"{"time":1,"states":[]}"#).await;
    let (gateway_url, cancel) = spawn_gateway(&upstream_url).await;

    let response = reqwest::get(format!(
        "{gateway_url}/api/states?lamin=10&lamin=11&lomin=10&lamax=20&lomax=20&extended=1"
    ))
    .await
    .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        [Some("lamin=10&lamin=11&lomin=10&lamax=20&lomax=20".to_string())]
    );

    cancel.cancel();
}

#[tokio::test]
async fn test_no_params_forwards_bare_url() {
    let (upstream_url, seen) = spawn_upstream(StatusCode::OK, r#"{"time":1,"states":[]}"#).await;
    let (gateway_url, cancel) = spawn_gateway(&upstream_url).await;

    let response = reqwest::get(format!("{gateway_url}/api/states")).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(seen.lock().unwrap().as_slice(), [None]);

    cancel.cancel();
}

#[tokio::test]
async fn test_upstream_error_status_is_relayed() {
    let (upstream_url, _) = spawn_upstream(StatusCode::SERVICE_UNAVAILABLE, "{}").await;
    let (gateway_url, cancel) = spawn_gateway(&upstream_url).await;

    let response = reqwest::get(format!(
        "{gateway_url}/api/states?lamin=10&lomin=10&lamax=20&lomax=20"
    ))
    .await
    .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.error, "Upstream request failed: 503 Service Unavailable");

    cancel.cancel();
}

#[tokio::test]
async fn test_rate_limited_upstream() {
    let (upstream_url, _) = spawn_upstream(StatusCode::TOO_MANY_REQUESTS, "").await;
    let (gateway_url, cancel) = spawn_gateway(&upstream_url).await;

    let response = reqwest::get(format!("{gateway_url}/api/states")).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::TOO_MANY_REQUESTS);
    let body: ErrorBody = response.json().await.unwrap();
    assert!(body.error.starts_with("Upstream request failed: 429"));

    cancel.cancel();
}

#[tokio::test]
async fn test_unreachable_upstream_is_internal_error() {
    // Grab a free port, then close it again
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = listener.local_addr().unwrap();
    drop(listener);

    let (gateway_url, cancel) = spawn_gateway(&format!("http://{dead_addr}/api/states/all")).await;

    let response = reqwest::get(format!("{gateway_url}/api/states?lamin=1"))
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorBody = response.json().await.unwrap();
    assert!(!body.error.is_empty());

    cancel.cancel();
}

#[tokio::test]
async fn test_non_json_upstream_is_internal_error() {
    let (upstream_url, _) = spawn_upstream(StatusCode::OK, "<html>maintenance</html>").await;
    let (gateway_url, cancel) = spawn_gateway(&upstream_url).await;

    let response = reqwest::get(format!("{gateway_url}/api/states")).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorBody = response.json().await.unwrap();
    assert!(body.error.contains("invalid JSON"));

    cancel.cancel();
}

#[tokio::test]
async fn test_serve_stops_on_cancel() {
    let cancel = CancellationToken::new();
    let config = gateway::GatewayConfig {
        bind_address: "127.0.0.1:0".to_string(),
        ..Default::default()
    };

    let handle = tokio::spawn(gateway::serve(config, cancel.clone()));
    cancel.cancel();

    let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
