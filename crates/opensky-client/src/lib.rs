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

//! Viewport-driven client for OpenSky Network state vectors.
//!
//! This library holds everything behind the map viewer that does not need a
//! UI toolkit. The layers can be used independently or composed together:
//!
//! - **Protocol layer**: Decoding of `states/all` bodies into aircraft records
//! - **Viewport layer**: Web Mercator geometry, bounding boxes and settle detection
//! - **Tracker layer**: Zoom gate, query tickets and the current aircraft set
//! - **Render layer**: Icon size, color, rotation and paint order per aircraft
//! - **HTTP layer**: Async gateway client and a non-blocking poller
//! - **Gateway layer**: Passthrough HTTP server in front of the upstream API
//!
//! # Quick Start
//!
//! Run the gateway and query it for one bounding box:
//!
//! ```no_run
//! use opensky_client::gateway::{self, GatewayConfig};
//! use opensky_client::{BoundingBox, StatesClient};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cancel = CancellationToken::new();
//!     tokio::spawn(gateway::serve(GatewayConfig::default(), cancel.clone()));
//!
//!     let client = StatesClient::new("http://127.0.0.1:8787").unwrap();
//!     let bbox = BoundingBox::from_corners((45.8, 5.9), (47.8, 10.5));
//!     match client.fetch(&bbox).await {
//!         Ok(snapshot) => println!("{} aircraft", snapshot.states.len()),
//!         Err(e) => eprintln!("query failed: {e}"),
//!     }
//!     cancel.cancel();
//! }
//! ```
//!
//! # Using Individual Layers
//!
//! ## Protocol Layer Only
//!
//! ```
//! use opensky_client::protocol::StateVectorParser;
//!
//! let body = br#"{"time":1700000000,"states":[
//!     ["4b1805","SWR12   ","Switzerland",1700000000,1700000000,8.55,47.45,
//!      1200.0,false,140.0,90.0,0.0,null,1250.0,"1000",false,0]
//! ]}"#;
//! let snapshot = StateVectorParser::new().decode(body).unwrap();
//! assert_eq!(snapshot.states[0].callsign.as_deref(), Some("SWR12"));
//! ```
//!
//! ## Tracker Layer Only
//!
//! ```
//! use opensky_client::tracker::{SettleOutcome, TrackerConfig, ViewportTracker};
//! use opensky_client::protocol::StatesSnapshot;
//! use opensky_client::viewport::ViewportState;
//!
//! let mut tracker = ViewportTracker::new(TrackerConfig::default());
//! let view = ViewportState::new(47.45, 8.55, 9.0);
//!
//! if let SettleOutcome::Query(ticket) = tracker.on_viewport_settled(Some(view.zoom), view.bounds(1024.0, 768.0)) {
//!     tracker.apply_response(ticket.generation, Ok(StatesSnapshot::default()));
//! }
//! println!("Tracking {} aircraft", tracker.len());
//! ```

pub mod gateway;
pub mod http;
pub mod protocol;
pub mod render;
pub mod tracker;
pub mod viewport;

pub use gateway::{ErrorBody, Gateway, GatewayConfig, GatewayError};
pub use http::{FetchError, PollEvent, Poller, StatesClient};
pub use protocol::{AircraftRecord, ParseError, StateVectorParser, StatesSnapshot};
pub use render::IconStyle;
pub use tracker::{
    ApplyOutcome, ClearReason, QueryTicket, SettleOutcome, TrackerConfig, TrackerEvent,
    ViewportTracker,
};
pub use viewport::{BoundingBox, SettleDetector, ViewportState, WebMercator};
