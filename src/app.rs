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

//! The map viewer: base map, aircraft overlay and the query loop.

use std::sync::Arc;
use std::time::Instant;

use eframe::egui;
use log::{debug, info, warn};
use opensky_client::http::{FetchError, Poller, StatesClient};
use opensky_client::tracker::{ApplyOutcome, SettleOutcome, TrackerConfig, TrackerEvent, ViewportTracker};
use opensky_client::viewport::{SettleDetector, ViewportState};
use tokio::runtime::Handle;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::map::maptiler::{self, MapTilerSource, API_KEY_ENV};
use crate::map::TileManager;
use crate::overlay::AircraftOverlay;
use crate::status::{DiagnosticLevel, FeedStatus};
use crate::status_pane::{self, StatusPane};

const MIN_ZOOM: f64 = 1.0;

/// Scroll distance in points for one zoom level
const SCROLL_POINTS_PER_ZOOM: f32 = 200.0;

/// Base map availability. Without a working map nothing else is shown.
enum MapState {
    Ready(TileManager),
    ConfigError(String),
}

pub struct SkywatchApp {
    map: MapState,
    view: ViewportState,
    /// Size of the map widget in the last frame
    map_size: egui::Vec2,
    map_ready: bool,

    tracker: ViewportTracker,
    tracker_events: broadcast::Receiver<TrackerEvent>,
    settle: SettleDetector,
    poller: Poller,

    overlay: AircraftOverlay,
    selected_aircraft: Option<String>,
    status: FeedStatus,
    status_pane: StatusPane,
}

impl std::fmt::Debug for SkywatchApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkywatchApp")
            .field("view", &self.view)
            .field("tracker", &self.tracker)
            .field("selected_aircraft", &self.selected_aircraft)
            .finish_non_exhaustive()
    }
}

impl SkywatchApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: &AppConfig, runtime: Handle) -> Result<Self, FetchError> {
        let view = ViewportState::new(config.initial_latitude, config.initial_longitude, config.initial_zoom);

        let map = match maptiler::resolve_api_key(config.map_api_key.as_deref()) {
            Some(api_key) => {
                info!(
                    "Using MapTiler style {} (key from {})",
                    config.map_style,
                    maptiler::api_key_source(config.map_api_key.as_deref()).unwrap_or("unknown")
                );
                let source = MapTilerSource::new(config.map_style.clone(), api_key);
                MapState::Ready(TileManager::new(Arc::new(source), &config.map_style))
            }
            None => {
                warn!("No map API key configured");
                MapState::ConfigError(missing_key_message())
            }
        };

        let tracker = ViewportTracker::new(TrackerConfig {
            min_query_zoom: config.min_query_zoom,
            initial_view: view,
            ..Default::default()
        });
        let tracker_events = tracker.subscribe();

        let ctx = cc.egui_ctx.clone();
        let poller = Poller::new(StatesClient::new(&config.gateway_url)?, runtime)
            .with_waker(move || ctx.request_repaint());

        let mut status = FeedStatus::new(config.gateway_url.clone(), config.embedded_gateway);
        status.add_diagnostic(DiagnosticLevel::Info, format!("Gateway {}", config.gateway_url));

        Ok(Self {
            map,
            view,
            map_size: egui::Vec2::ZERO,
            map_ready: false,
            tracker,
            tracker_events,
            settle: SettleDetector::new(config.settle_delay()),
            poller,
            overlay: AircraftOverlay::new(),
            selected_aircraft: None,
            status,
            status_pane: StatusPane::new(),
        })
    }

    /// Apply finished queries and forward tracker events to the status model
    fn drain_results(&mut self) {
        while let Some(event) = self.poller.try_recv() {
            if let ApplyOutcome::Replaced(count) = self.tracker.apply_response(event.generation, event.result) {
                debug!("Showing {count} aircraft");
                self.status.data_time = self.tracker.data_time();
            }
        }

        loop {
            match self.tracker_events.try_recv() {
                Ok(event) => self.status.apply_event(&event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Status missed {skipped} tracker events");
                }
                Err(_) => break,
            }
        }

        if let Some(id) = &self.selected_aircraft {
            if self.tracker.get_by_id(id).is_none() && !self.tracker.is_loading() {
                debug!("Selected aircraft {id} left the view");
                self.selected_aircraft = None;
            }
        }
    }

    /// Fire a viewport-settled signal once the view has been quiet long enough
    fn poll_settle(&mut self, ctx: &egui::Context, dragging: bool) {
        let now = Instant::now();

        if !dragging {
            if let Some(settled) = self.settle.poll(now) {
                let bounds = settled.bounds(f64::from(self.map_size.x), f64::from(self.map_size.y));
                match self.tracker.on_viewport_settled(Some(settled.zoom), bounds) {
                    SettleOutcome::Query(ticket) => self.poller.request(ticket),
                    SettleOutcome::Cleared => self.selected_aircraft = None,
                    SettleOutcome::Skipped => {}
                }
            }
        }

        if let Some(wait) = self.settle.time_until_settle(now) {
            ctx.request_repaint_after(wait);
        }
    }

    fn handle_input(&mut self, ui: &egui::Ui, response: &egui::Response, max_zoom: f64) {
        if response.dragged() {
            let delta = response.drag_delta();
            self.view.pan_by(f64::from(delta.x), f64::from(delta.y));
        }

        if !response.hovered() {
            return;
        }

        let (pinch, scroll) = ui.input(|i| (i.zoom_delta(), i.smooth_scroll_delta.y));
        let mut zoom_change = 0.0;
        if (pinch - 1.0).abs() > 0.001 {
            zoom_change += f64::from(pinch.log2());
        }
        if scroll.abs() > 0.0 {
            zoom_change += f64::from(scroll / SCROLL_POINTS_PER_ZOOM);
        }
        if zoom_change == 0.0 {
            return;
        }

        let anchor = response.hover_pos().map(|p| p - response.rect.center());
        self.zoom_around(zoom_change, anchor, max_zoom);
    }

    /// Change zoom while keeping the position under `anchor` in place
    fn zoom_around(&mut self, change: f64, anchor: Option<egui::Vec2>, max_zoom: f64) {
        let new_zoom = (self.view.zoom + change).clamp(MIN_ZOOM, max_zoom);
        let Some(anchor) = anchor else {
            self.view.zoom = new_zoom;
            return;
        };

        let (ax, ay) = (f64::from(anchor.x), f64::from(anchor.y));
        let (lat, lon) = self.view.unproject(ax, ay);
        self.view.zoom = new_zoom;
        let (dx, dy) = self.view.project(lat, lon);
        self.view.pan_by(ax - dx, ay - dy);
    }

    fn draw_map(&mut self, ui: &mut egui::Ui) {
        let MapState::Ready(tiles) = &self.map else {
            return;
        };
        let max_zoom = f64::from(tiles.max_zoom());

        let (response, painter) = ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
        let rect = response.rect;

        painter.rect_filled(rect, 0.0, egui::Color32::from_rgb(200, 220, 240));

        self.handle_input(ui, &response, max_zoom);

        let now = Instant::now();
        if rect.size() != self.map_size {
            self.map_size = rect.size();
            self.settle.touch(now);
        }
        self.tracker.set_view(self.view);
        self.settle.observe(self.view, now);

        // First frame with a real size counts as map-ready
        if !self.map_ready && rect.width() > 0.0 && rect.height() > 0.0 {
            self.map_ready = true;
            self.settle.force();
        }

        let MapState::Ready(tiles) = &self.map else {
            return;
        };
        tiles.paint(ui.ctx(), &painter, rect, &self.view);
        self.status.set_tile_stats(tiles.is_loading(), tiles.failed_count());

        let aircraft = self.tracker.aircraft();
        let hovered = self.overlay.paint(
            ui,
            rect,
            &self.view,
            &aircraft,
            self.selected_aircraft.as_deref(),
            response.hover_pos(),
        );

        if hovered.is_some() {
            ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
        }
        if response.clicked() {
            self.selected_aircraft = hovered.map(|a| a.id.clone());
        }

        self.draw_map_chrome(&painter, rect, tiles.attribution().text);
        self.poll_settle(ui.ctx(), response.dragged());
    }

    fn draw_map_chrome(&self, painter: &egui::Painter, rect: egui::Rect, attribution: &str) {
        painter.text(
            rect.left_top() + egui::vec2(10.0, 10.0),
            egui::Align2::LEFT_TOP,
            "Drag to pan | Scroll to zoom | Click an aircraft for details",
            egui::FontId::proportional(12.0),
            egui::Color32::BLACK,
        );

        painter.text(
            rect.right_bottom() + egui::vec2(-10.0, -10.0),
            egui::Align2::RIGHT_BOTTOM,
            attribution,
            egui::FontId::proportional(10.0),
            egui::Color32::from_black_alpha(180),
        );

        if self.tracker.is_loading() {
            painter.text(
                rect.center_top() + egui::vec2(0.0, 20.0),
                egui::Align2::CENTER_CENTER,
                "Loading aircraft...",
                egui::FontId::proportional(12.0),
                egui::Color32::from_rgb(60, 60, 60),
            );
        }
    }

    fn check_map_auth(&mut self) {
        let MapState::Ready(tiles) = &self.map else {
            return;
        };
        if let Some(status) = tiles.auth_rejection() {
            warn!("Map tiles rejected with HTTP {status}, stopping");
            self.map = MapState::ConfigError(format!(
                "The map tile server rejected the API key (HTTP {status}).\n\
                 Check {API_KEY_ENV} or map_api_key in the configuration file."
            ));
            self.poller.shutdown();
        }
    }
}

fn missing_key_message() -> String {
    let path = AppConfig::get_config_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "the configuration file".to_string());
    format!("No map API key is configured.\nSet {API_KEY_ENV} or map_api_key in {path}.")
}

fn draw_config_error(ctx: &egui::Context, message: &str) {
    egui::CentralPanel::default().show(ctx, |ui| {
        ui.vertical_centered(|ui| {
            ui.add_space(ui.available_height() / 3.0);
            ui.label(egui::RichText::new("Map configuration error")
                .color(egui::Color32::from_rgb(255, 100, 100))
                .size(20.0)
                .strong());
            ui.add_space(8.0);
            ui.label(egui::RichText::new(message).size(13.0));
        });
    });
}

impl eframe::App for SkywatchApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.check_map_auth();

        if let MapState::ConfigError(message) = &self.map {
            draw_config_error(ctx, message);
            return;
        }

        self.drain_results();

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                self.draw_map(ui);
            });

        self.status_pane.render(ctx, &self.status, self.view.zoom, self.tracker.min_query_zoom());

        let closed = match self.selected_aircraft.as_deref().and_then(|id| self.tracker.get_by_id(id)) {
            Some(aircraft) => !status_pane::render_aircraft_details(ctx, aircraft),
            None => false,
        };
        if closed {
            self.selected_aircraft = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_message_names_env_var() {
        assert!(missing_key_message().contains(API_KEY_ENV));
    }
}
