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

use chrono::{DateTime, Utc};
use opensky_client::tracker::{ClearReason, TrackerEvent};
use std::collections::VecDeque;

const MAX_DIAGNOSTICS: usize = 50;

/// State of the aircraft feed as seen by the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// No query has been issued yet
    Idle,
    Loading,
    Live,
    /// Zoomed out past the query gate
    ZoomedOut,
    Error,
}

/// Diagnostic message with timestamp
#[derive(Debug, Clone)]
pub struct DiagnosticMessage {
    pub timestamp: DateTime<Utc>,
    pub level: DiagnosticLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

/// Feed statistics and diagnostics for the status pane
#[derive(Debug)]
pub struct FeedStatus {
    pub state: FeedState,
    pub gateway_url: String,
    /// Whether the gateway runs inside this process
    pub embedded_gateway: bool,

    pub aircraft_count: usize,
    pub queries_issued: u64,
    pub stale_dropped: u64,

    /// Local time the aircraft set was last replaced
    pub last_update: Option<DateTime<Utc>>,
    /// Upstream timestamp of the current set
    pub data_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,

    /// Base map tiles still downloading
    pub tiles_loading: bool,
    /// Base map tiles that failed to download or decode
    pub failed_tiles: usize,

    // Diagnostic messages (keep last 50)
    pub diagnostics: VecDeque<DiagnosticMessage>,
}

impl FeedStatus {
    pub fn new(gateway_url: String, embedded_gateway: bool) -> Self {
        Self {
            state: FeedState::Idle,
            gateway_url,
            embedded_gateway,
            aircraft_count: 0,
            queries_issued: 0,
            stale_dropped: 0,
            last_update: None,
            data_time: None,
            last_error: None,
            tiles_loading: false,
            failed_tiles: 0,
            diagnostics: VecDeque::new(),
        }
    }

    /// Update counters and diagnostics from a tracker event
    pub fn apply_event(&mut self, event: &TrackerEvent) {
        match event {
            TrackerEvent::QueryIssued(_) => {
                self.queries_issued += 1;
                self.state = FeedState::Loading;
            }
            TrackerEvent::AircraftReplaced { count, .. } => {
                self.aircraft_count = *count;
                self.last_update = Some(Utc::now());
                self.last_error = None;
                self.state = FeedState::Live;
            }
            TrackerEvent::AircraftCleared(ClearReason::ZoomGate) => {
                self.aircraft_count = 0;
                self.data_time = None;
                if self.state != FeedState::ZoomedOut {
                    self.add_diagnostic(DiagnosticLevel::Info, "Zoomed out, aircraft hidden".to_string());
                }
                self.state = FeedState::ZoomedOut;
            }
            TrackerEvent::AircraftCleared(ClearReason::FetchFailed(error)) => {
                self.aircraft_count = 0;
                self.data_time = None;
                self.last_error = Some(error.clone());
                self.state = FeedState::Error;
                self.add_diagnostic(DiagnosticLevel::Error, format!("Query failed: {error}"));
            }
            TrackerEvent::StaleResponseDropped(_) => {
                self.stale_dropped += 1;
            }
        }
    }

    /// Update base map tile counters, warning when more tiles fail
    pub fn set_tile_stats(&mut self, loading: bool, failed: usize) {
        if failed > self.failed_tiles {
            self.add_diagnostic(
                DiagnosticLevel::Warning,
                format!("{failed} map tiles failed to load"),
            );
        }
        self.tiles_loading = loading;
        self.failed_tiles = failed;
    }

    /// Add a diagnostic message
    pub fn add_diagnostic(&mut self, level: DiagnosticLevel, message: String) {
        self.diagnostics.push_back(DiagnosticMessage {
            timestamp: Utc::now(),
            level,
            message,
        });

        // Keep only the last N messages
        while self.diagnostics.len() > MAX_DIAGNOSTICS {
            self.diagnostics.pop_front();
        }
    }

    /// Seconds since the set was last replaced
    pub fn seconds_since_update(&self) -> Option<i64> {
        self.last_update.map(|t| (Utc::now() - t).num_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opensky_client::tracker::QueryTicket;
    use opensky_client::viewport::BoundingBox;

    fn status() -> FeedStatus {
        FeedStatus::new("http://127.0.0.1:8787".to_string(), true)
    }

    #[test]
    fn test_query_then_replace() {
        let mut status = status();
        status.apply_event(&TrackerEvent::QueryIssued(QueryTicket {
            generation: 1,
            bbox: BoundingBox::from_corners((10.0, 10.0), (20.0, 20.0)),
        }));
        assert_eq!(status.state, FeedState::Loading);
        assert_eq!(status.queries_issued, 1);

        status.apply_event(&TrackerEvent::AircraftReplaced { generation: 1, count: 12 });
        assert_eq!(status.state, FeedState::Live);
        assert_eq!(status.aircraft_count, 12);
        assert!(status.last_update.is_some());
    }

    #[test]
    fn test_failure_records_error() {
        let mut status = status();
        status.apply_event(&TrackerEvent::AircraftCleared(ClearReason::FetchFailed(
            "gateway returned 503".to_string(),
        )));

        assert_eq!(status.state, FeedState::Error);
        assert_eq!(status.last_error.as_deref(), Some("gateway returned 503"));
        assert_eq!(status.diagnostics.len(), 1);
        assert_eq!(status.diagnostics[0].level, DiagnosticLevel::Error);
    }

    #[test]
    fn test_repeated_zoom_gate_logs_once() {
        let mut status = status();
        status.apply_event(&TrackerEvent::AircraftCleared(ClearReason::ZoomGate));
        status.apply_event(&TrackerEvent::AircraftCleared(ClearReason::ZoomGate));

        assert_eq!(status.state, FeedState::ZoomedOut);
        assert_eq!(status.diagnostics.len(), 1);
    }

    #[test]
    fn test_diagnostics_are_bounded() {
        let mut status = status();
        for i in 0..(MAX_DIAGNOSTICS + 10) {
            status.add_diagnostic(DiagnosticLevel::Info, format!("message {i}"));
        }
        assert_eq!(status.diagnostics.len(), MAX_DIAGNOSTICS);
        assert_eq!(status.diagnostics[0].message, "message 10");
    }

    #[test]
    fn test_tile_failures_warn_once_per_increase() {
        let mut status = status();
        status.set_tile_stats(true, 0);
        assert!(status.diagnostics.is_empty());

        status.set_tile_stats(true, 2);
        status.set_tile_stats(false, 2);
        assert_eq!(status.diagnostics.len(), 1);
        assert_eq!(status.diagnostics[0].level, DiagnosticLevel::Warning);
        assert_eq!(status.diagnostics[0].message, "2 map tiles failed to load");
        assert!(!status.tiles_loading);

        status.set_tile_stats(false, 3);
        assert_eq!(status.diagnostics.len(), 2);
        assert_eq!(status.failed_tiles, 3);
    }
}
