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

//! Viewport tracking and aircraft set management.
//!
//! The tracker decides when a settled viewport is worth a query, hands out
//! query tickets, and applies completed responses. It performs no I/O itself;
//! the [`crate::http::Poller`] executes tickets and reports back.
//!
//! Rules:
//! - zoom unknown or below the gate clears the set and skips the query
//! - bounds unknown (widget still initializing) skips without clearing
//! - a failed response clears the set
//! - a successful response replaces the set wholesale
//! - responses for superseded tickets are dropped, so a slow early response
//!   can never overwrite the result of a later viewport

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::broadcast;

use crate::http::FetchError;
use crate::protocol::{AircraftRecord, StatesSnapshot};
use crate::viewport::{BoundingBox, ViewportState};

/// Zoom level below which no queries are issued.
pub const MIN_QUERY_ZOOM: f64 = 7.0;

/// A query the caller must execute exactly once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryTicket {
    /// Monotonic ticket number, echoed back in [`ViewportTracker::apply_response`].
    pub generation: u64,
    pub bbox: BoundingBox,
}

/// Result of a viewport-settled signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettleOutcome {
    /// Issue this query.
    Query(QueryTicket),
    /// Zoom gate closed; the set was cleared and nothing is queried.
    Cleared,
    /// Bounds not available yet; existing data kept.
    Skipped,
}

/// Result of applying a completed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The set was replaced with this many aircraft.
    Replaced(usize),
    /// The query failed and the set was cleared.
    Cleared,
    /// The response belonged to a superseded ticket and was ignored.
    Stale,
}

/// Why the aircraft set was emptied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearReason {
    /// View zoomed out past the gate, or zoom unknown.
    ZoomGate,
    /// The query for the current view failed.
    FetchFailed(String),
}

/// Events emitted by the tracker when aircraft state changes.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// A query was handed out.
    QueryIssued(QueryTicket),
    /// The aircraft set was replaced.
    AircraftReplaced { generation: u64, count: usize },
    /// The aircraft set was emptied.
    AircraftCleared(ClearReason),
    /// A late response was discarded.
    StaleResponseDropped(u64),
}

/// Configuration for the viewport tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Minimum zoom for issuing queries.
    pub min_query_zoom: f64,
    /// Initial mirrored view.
    pub initial_view: ViewportState,
    /// Broadcast channel capacity for events.
    pub event_channel_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_query_zoom: MIN_QUERY_ZOOM,
            initial_view: ViewportState::new(0.0, 0.0, 2.0),
            event_channel_capacity: 64,
        }
    }
}

/// Owns the mirrored view and the current aircraft set.
pub struct ViewportTracker {
    min_query_zoom: f64,
    view: ViewportState,
    aircraft: Arc<[AircraftRecord]>,
    /// Upstream timestamp of the current set.
    data_time: Option<DateTime<Utc>>,
    next_generation: u64,
    /// Generation whose response may still be applied.
    awaited: Option<u64>,
    event_tx: broadcast::Sender<TrackerEvent>,
}

impl std::fmt::Debug for ViewportTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewportTracker")
            .field("aircraft_count", &self.aircraft.len())
            .field("view", &self.view)
            .field("min_query_zoom", &self.min_query_zoom)
            .field("awaited", &self.awaited)
            .finish_non_exhaustive()
    }
}

impl Default for ViewportTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl ViewportTracker {
    /// Create a new tracker with the given configuration.
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);

        Self {
            min_query_zoom: config.min_query_zoom,
            view: config.initial_view,
            aircraft: Arc::from(Vec::new()),
            data_time: None,
            next_generation: 1,
            awaited: None,
            event_tx,
        }
    }

    /// Mirror the map widget's view.
    pub fn set_view(&mut self, view: ViewportState) {
        self.view = view;
    }

    /// Current mirrored view.
    #[must_use]
    pub fn view(&self) -> ViewportState {
        self.view
    }

    #[must_use]
    pub fn min_query_zoom(&self) -> f64 {
        self.min_query_zoom
    }

    /// Whether the zoom gate lets the given zoom through.
    #[must_use]
    pub fn zoom_allows_query(&self, zoom: Option<f64>) -> bool {
        matches!(zoom, Some(z) if z >= self.min_query_zoom)
    }

    /// Handle map-ready and viewport-settled signals.
    pub fn on_viewport_settled(
        &mut self,
        zoom: Option<f64>,
        bounds: Option<BoundingBox>,
    ) -> SettleOutcome {
        if !self.zoom_allows_query(zoom) {
            debug!("Zoom {zoom:?} below gate {}, clearing aircraft", self.min_query_zoom);
            // Anything still in flight belongs to a view we no longer show
            self.awaited = None;
            self.clear(ClearReason::ZoomGate);
            return SettleOutcome::Cleared;
        }

        let Some(bbox) = bounds else {
            debug!("Viewport bounds unavailable, skipping query");
            return SettleOutcome::Skipped;
        };

        let ticket = QueryTicket {
            generation: self.next_generation,
            bbox,
        };
        self.next_generation += 1;
        self.awaited = Some(ticket.generation);

        debug!(
            "Issuing query {} for lamin={:.4} lomin={:.4} lamax={:.4} lomax={:.4}",
            ticket.generation, bbox.lamin, bbox.lomin, bbox.lamax, bbox.lomax
        );
        let _ = self.event_tx.send(TrackerEvent::QueryIssued(ticket));

        SettleOutcome::Query(ticket)
    }

    /// Apply the result of the query issued with `generation`.
    pub fn apply_response(
        &mut self,
        generation: u64,
        result: Result<StatesSnapshot, FetchError>,
    ) -> ApplyOutcome {
        if !matches!(self.awaited, Some(awaited) if generation >= awaited) {
            info!("Dropping response for superseded query {generation}");
            let _ = self.event_tx.send(TrackerEvent::StaleResponseDropped(generation));
            return ApplyOutcome::Stale;
        }
        self.awaited = None;

        match result {
            Ok(snapshot) => {
                let count = snapshot.states.len();
                debug!(
                    "Query {generation} returned {count} aircraft ({} dropped)",
                    snapshot.dropped
                );
                self.data_time = snapshot.observed_at();
                self.aircraft = Arc::from(snapshot.states);
                let _ = self
                    .event_tx
                    .send(TrackerEvent::AircraftReplaced { generation, count });
                ApplyOutcome::Replaced(count)
            }
            Err(e) => {
                warn!("Query {generation} failed: {e}");
                self.clear(ClearReason::FetchFailed(e.to_string()));
                ApplyOutcome::Cleared
            }
        }
    }

    fn clear(&mut self, reason: ClearReason) {
        self.aircraft = Arc::from(Vec::new());
        self.data_time = None;
        let _ = self.event_tx.send(TrackerEvent::AircraftCleared(reason));
    }

    /// Current aircraft set. Cheap to clone; never mutated in place.
    #[must_use]
    pub fn aircraft(&self) -> Arc<[AircraftRecord]> {
        Arc::clone(&self.aircraft)
    }

    /// Look up an aircraft in the current set by ICAO address.
    #[must_use]
    pub fn get_by_id(&self, id: &str) -> Option<&AircraftRecord> {
        self.aircraft.iter().find(|a| a.id == id)
    }

    /// Upstream timestamp of the current set.
    #[must_use]
    pub fn data_time(&self) -> Option<DateTime<Utc>> {
        self.data_time
    }

    /// Whether a query is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.awaited.is_some()
    }

    /// Get the number of aircraft in the current set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    /// Check if the current set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }

    /// Subscribe to tracker events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> AircraftRecord {
        AircraftRecord {
            id: id.to_string(),
            callsign: None,
            origin_country: "Switzerland".to_string(),
            longitude: 8.55,
            latitude: 47.45,
            baro_altitude: None,
            on_ground: false,
            heading: 0.0,
            velocity: None,
            vertical_rate: None,
            squawk: None,
            spi: false,
            position_source: 0,
            category: 0,
            time_position: None,
            last_contact: 0,
            sensors: None,
            geo_altitude: None,
        }
    }

    fn snapshot(ids: &[&str]) -> StatesSnapshot {
        StatesSnapshot {
            time: 1,
            states: ids.iter().map(|id| record(id)).collect(),
            dropped: 0,
        }
    }

    fn bbox() -> BoundingBox {
        BoundingBox::from_corners((47.0, 8.0), (48.0, 9.0))
    }

    fn issue(tracker: &mut ViewportTracker, zoom: f64) -> QueryTicket {
        match tracker.on_viewport_settled(Some(zoom), Some(bbox())) {
            SettleOutcome::Query(ticket) => ticket,
            other => panic!("expected a query, got {other:?}"),
        }
    }

    #[test]
    fn test_zoom_gate_clears_and_skips_query() {
        let mut tracker = ViewportTracker::default();
        let ticket = issue(&mut tracker, 9.0);
        tracker.apply_response(ticket.generation, Ok(snapshot(&["a", "b"])));
        assert_eq!(tracker.len(), 2);

        let outcome = tracker.on_viewport_settled(Some(6.0), Some(bbox()));
        assert_eq!(outcome, SettleOutcome::Cleared);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_data_time_follows_current_set() {
        let mut tracker = ViewportTracker::default();
        let ticket = issue(&mut tracker, 9.0);
        let mut response = snapshot(&["a"]);
        response.time = 1_700_000_000;
        tracker.apply_response(ticket.generation, Ok(response));
        assert_eq!(tracker.data_time().map(|t| t.timestamp()), Some(1_700_000_000));

        tracker.on_viewport_settled(Some(5.0), Some(bbox()));
        assert!(tracker.data_time().is_none());
    }

    #[test]
    fn test_zoom_at_gate_issues_query() {
        let mut tracker = ViewportTracker::default();
        let outcome = tracker.on_viewport_settled(Some(7.0), Some(bbox()));
        assert!(matches!(outcome, SettleOutcome::Query(t) if t.bbox == bbox()));
    }

    #[test]
    fn test_unknown_zoom_clears() {
        let mut tracker = ViewportTracker::default();
        assert_eq!(
            tracker.on_viewport_settled(None, Some(bbox())),
            SettleOutcome::Cleared
        );
    }

    #[test]
    fn test_missing_bounds_keeps_data() {
        let mut tracker = ViewportTracker::default();
        let ticket = issue(&mut tracker, 8.0);
        tracker.apply_response(ticket.generation, Ok(snapshot(&["a"])));

        assert_eq!(
            tracker.on_viewport_settled(Some(8.0), None),
            SettleOutcome::Skipped
        );
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_failure_clears_set() {
        let mut tracker = ViewportTracker::default();
        let first = issue(&mut tracker, 8.0);
        tracker.apply_response(first.generation, Ok(snapshot(&["a"])));

        let second = issue(&mut tracker, 8.0);
        let outcome = tracker.apply_response(
            second.generation,
            Err(FetchError::Gateway {
                status: 503,
                message: "Upstream request failed: 503 Service Unavailable".to_string(),
            }),
        );
        assert_eq!(outcome, ApplyOutcome::Cleared);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_late_response_is_dropped() {
        let mut tracker = ViewportTracker::default();
        let slow = issue(&mut tracker, 8.0);
        let fast = issue(&mut tracker, 8.0);

        assert_eq!(
            tracker.apply_response(fast.generation, Ok(snapshot(&["new"]))),
            ApplyOutcome::Replaced(1)
        );
        assert_eq!(
            tracker.apply_response(slow.generation, Ok(snapshot(&["old", "older"]))),
            ApplyOutcome::Stale
        );
        assert!(tracker.get_by_id("new").is_some());
        assert!(tracker.get_by_id("old").is_none());
    }

    #[test]
    fn test_response_after_zoom_out_is_dropped() {
        let mut tracker = ViewportTracker::default();
        let ticket = issue(&mut tracker, 8.0);
        tracker.on_viewport_settled(Some(5.0), Some(bbox()));

        assert_eq!(
            tracker.apply_response(ticket.generation, Ok(snapshot(&["a"]))),
            ApplyOutcome::Stale
        );
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_replacement_leaves_old_snapshot_intact() {
        let mut tracker = ViewportTracker::default();
        let first = issue(&mut tracker, 8.0);
        tracker.apply_response(first.generation, Ok(snapshot(&["a", "b"])));
        let held = tracker.aircraft();

        let second = issue(&mut tracker, 8.0);
        tracker.apply_response(second.generation, Ok(snapshot(&["c"])));

        assert_eq!(held.len(), 2);
        assert_eq!(tracker.aircraft().len(), 1);
    }

    #[test]
    fn test_events_are_broadcast() {
        let mut tracker = ViewportTracker::default();
        let mut events = tracker.subscribe();

        let ticket = issue(&mut tracker, 8.0);
        tracker.apply_response(ticket.generation, Ok(snapshot(&["a"])));

        assert_eq!(events.try_recv().unwrap(), TrackerEvent::QueryIssued(ticket));
        assert_eq!(
            events.try_recv().unwrap(),
            TrackerEvent::AircraftReplaced {
                generation: ticket.generation,
                count: 1
            }
        );
    }

    #[test]
    fn test_loading_until_answered() {
        let mut tracker = ViewportTracker::default();
        let ticket = issue(&mut tracker, 8.0);
        assert!(tracker.is_loading());
        tracker.apply_response(ticket.generation, Ok(snapshot(&[])));
        assert!(!tracker.is_loading());
    }
}
