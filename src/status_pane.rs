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

use crate::status::{DiagnosticLevel, FeedState, FeedStatus};
use eframe::egui;
use opensky_client::protocol::AircraftRecord;

const LABEL_COLOR: egui::Color32 = egui::Color32::from_rgb(130, 130, 130);
const VALUE_COLOR: egui::Color32 = egui::Color32::from_rgb(200, 200, 200);

fn pane_frame(ctx: &egui::Context) -> egui::Frame {
    egui::Frame::window(&ctx.style())
        .fill(egui::Color32::from_rgba_unmultiplied(25, 30, 35, 230))
        .stroke(egui::Stroke::new(1.0, egui::Color32::from_rgb(60, 80, 100)))
        .corner_radius(6.0)
}

fn section_header(ui: &mut egui::Ui, title: &str) {
    ui.label(egui::RichText::new(title)
        .color(egui::Color32::from_rgb(150, 150, 150))
        .size(9.0)
        .strong());
    ui.add_space(2.0);
}

fn row(ui: &mut egui::Ui, label: &str, value: impl Into<String>) {
    ui.horizontal(|ui| {
        ui.label(egui::RichText::new(label)
            .color(LABEL_COLOR)
            .size(9.0));
        ui.label(egui::RichText::new(value.into())
            .color(VALUE_COLOR)
            .size(9.0)
            .monospace());
    });
}

#[derive(Debug)]
pub struct StatusPane {
    pub visible: bool,
    pub collapsed: bool,
}

impl Default for StatusPane {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusPane {
    pub fn new() -> Self {
        Self {
            visible: true,
            collapsed: false,
        }
    }

    /// Render the status pane as a floating window
    pub fn render(&mut self, ctx: &egui::Context, status: &FeedStatus, zoom: f64, min_query_zoom: f64) {
        if !self.visible {
            // Show a small button to re-open the status pane when hidden
            egui::Window::new("show_status")
                .title_bar(false)
                .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(10.0, -10.0))
                .fixed_size(egui::vec2(140.0, 35.0))
                .resizable(false)
                .frame(pane_frame(ctx))
                .show(ctx, |ui| {
                    if ui.button(egui::RichText::new("Show Status")
                        .color(egui::Color32::from_rgb(150, 200, 220))
                        .size(11.0))
                        .clicked() {
                        self.visible = true;
                    }
                });
            return;
        }

        egui::Window::new("Feed Status")
            .title_bar(false)
            .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(10.0, -10.0))
            .fixed_size(egui::vec2(280.0, if self.collapsed { 40.0 } else { 320.0 }))
            .resizable(false)
            .collapsible(false)
            .frame(pane_frame(ctx))
            .show(ctx, |ui| {
                // Header with collapse and close buttons
                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new("◈ STATUS")
                        .color(egui::Color32::from_rgb(100, 180, 220))
                        .size(12.0)
                        .strong());

                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button(egui::RichText::new("✕")
                            .size(12.0)
                            .color(egui::Color32::from_rgb(200, 100, 100)))
                            .on_hover_text("Hide status pane")
                            .clicked() {
                            self.visible = false;
                        }

                        ui.add_space(4.0);

                        let collapse_icon = if self.collapsed { "▼" } else { "▲" };
                        if ui.button(egui::RichText::new(collapse_icon).size(10.0))
                            .on_hover_text(if self.collapsed { "Expand" } else { "Collapse" })
                            .clicked() {
                            self.collapsed = !self.collapsed;
                        }
                    });
                });

                if self.collapsed {
                    return;
                }

                ui.separator();

                self.render_feed_section(ui, status, zoom, min_query_zoom);
                ui.add_space(6.0);
                self.render_diagnostics_section(ui, status);
            });
    }

    fn render_feed_section(&self, ui: &mut egui::Ui, status: &FeedStatus, zoom: f64, min_query_zoom: f64) {
        section_header(ui, "FEED");

        ui.horizontal(|ui| {
            let (color, text) = match status.state {
                FeedState::Idle => (egui::Color32::from_rgb(150, 150, 150), "IDLE"),
                FeedState::Loading => (egui::Color32::from_rgb(255, 200, 100), "LOADING"),
                FeedState::Live => (egui::Color32::from_rgb(100, 255, 100), "LIVE"),
                FeedState::ZoomedOut => (egui::Color32::from_rgb(100, 180, 255), "ZOOMED OUT"),
                FeedState::Error => (egui::Color32::from_rgb(255, 100, 100), "ERROR"),
            };
            ui.label(egui::RichText::new("●").color(color).size(10.0));
            ui.label(egui::RichText::new(text)
                .color(color)
                .size(10.0)
                .monospace()
                .strong());
        });

        let gateway = if status.embedded_gateway {
            format!("{} (embedded)", status.gateway_url)
        } else {
            status.gateway_url.clone()
        };
        row(ui, "Gateway:", gateway);
        row(ui, "Aircraft:", status.aircraft_count.to_string());
        row(ui, "Zoom:", format!("{zoom:.1}"));

        if zoom < min_query_zoom {
            ui.label(egui::RichText::new(format!("Zoom in to {min_query_zoom:.0}+ to see aircraft"))
                .color(egui::Color32::from_rgb(255, 200, 100))
                .size(9.0)
                .italics());
        }

        if let Some(seconds) = status.seconds_since_update() {
            row(ui, "Updated:", format!("{} ago", format_duration(seconds.max(0).unsigned_abs())));
        }
        if let Some(data_time) = status.data_time {
            row(ui, "Data time:", data_time.format("%H:%M:%S UTC").to_string());
        }
        row(ui, "Queries:", format!("{} ({} stale)", status.queries_issued, status.stale_dropped));
        row(ui, "Map tiles:", tile_summary(status.tiles_loading, status.failed_tiles));

        if let Some(ref error) = status.last_error {
            ui.label(egui::RichText::new(error)
                .color(egui::Color32::from_rgb(255, 100, 100))
                .size(8.5));
        }
    }

    fn render_diagnostics_section(&self, ui: &mut egui::Ui, status: &FeedStatus) {
        section_header(ui, "DIAGNOSTICS");

        if status.diagnostics.is_empty() {
            ui.label(egui::RichText::new("No messages")
                .color(egui::Color32::from_rgb(100, 100, 100))
                .size(8.0)
                .italics());
            return;
        }

        egui::ScrollArea::vertical()
            .max_height(14.0 * 6.0)
            .auto_shrink([false, true])
            .show(ui, |ui| {
                // Newest first
                for diagnostic in status.diagnostics.iter().rev() {
                    ui.horizontal(|ui| {
                        let (icon, color) = match diagnostic.level {
                            DiagnosticLevel::Info => ("ℹ", egui::Color32::from_rgb(100, 180, 255)),
                            DiagnosticLevel::Warning => ("⚠", egui::Color32::from_rgb(255, 200, 100)),
                            DiagnosticLevel::Error => ("✕", egui::Color32::from_rgb(255, 100, 100)),
                        };

                        ui.label(egui::RichText::new(icon).color(color).size(9.0));
                        ui.label(egui::RichText::new(diagnostic.timestamp.format("%H:%M:%S").to_string())
                            .color(egui::Color32::from_rgb(100, 100, 100))
                            .size(8.0)
                            .monospace());
                        ui.label(egui::RichText::new(truncate(&diagnostic.message, 40))
                            .color(egui::Color32::from_rgb(180, 180, 180))
                            .size(8.0));
                    });
                }
            });
    }
}

/// Render the detail panel for the selected aircraft.
///
/// Returns `false` when the user closed the panel.
pub fn render_aircraft_details(ctx: &egui::Context, aircraft: &AircraftRecord) -> bool {
    let mut open = true;

    egui::Window::new("Aircraft")
        .title_bar(false)
        .anchor(egui::Align2::RIGHT_TOP, egui::vec2(-10.0, 10.0))
        .default_width(260.0)
        .resizable(false)
        .frame(pane_frame(ctx))
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new(aircraft.label())
                    .color(egui::Color32::from_rgb(150, 220, 150))
                    .size(13.0)
                    .strong());
                ui.label(egui::RichText::new(&aircraft.id)
                    .color(egui::Color32::from_rgb(200, 220, 255))
                    .size(10.0)
                    .monospace());

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button(egui::RichText::new("✕").size(11.0)).clicked() {
                        open = false;
                    }
                });
            });

            ui.separator();

            row(ui, "Country:", aircraft.origin_country.clone());
            row(ui, "Position:", format!("{:>7.3}° {:>8.3}°", aircraft.latitude, aircraft.longitude));
            row(ui, "Baro alt:", format_meters(aircraft.baro_altitude));
            row(ui, "Geo alt:", format_meters(aircraft.geo_altitude));
            row(ui, "On ground:", if aircraft.on_ground { "yes" } else { "no" });
            row(ui, "Heading:", format!("{:03.0}°", aircraft.heading));
            row(ui, "Speed:", aircraft.velocity.map_or_else(|| "—".to_string(), |v| format!("{v:.0} m/s")));
            row(ui, "Vert rate:", aircraft.vertical_rate.map_or_else(|| "—".to_string(), |v| format!("{v:+.1} m/s")));
            row(ui, "Squawk:", aircraft.squawk.clone().unwrap_or_else(|| "—".to_string()));
            row(ui, "Source:", aircraft.position_source_name());
            row(ui, "Category:", aircraft.category.to_string());
            if aircraft.spi {
                row(ui, "SPI:", "active");
            }
            if let Some(contact) = aircraft.last_contact_at() {
                row(ui, "Last contact:", contact.format("%H:%M:%S UTC").to_string());
            }
            if let Some(age) = aircraft.position_age() {
                row(ui, "Position age:", format!("{age}s"));
            }
        });

    open
}

fn tile_summary(loading: bool, failed: usize) -> String {
    match (loading, failed) {
        (true, 0) => "loading".to_string(),
        (true, n) => format!("loading, {n} failed"),
        (false, 0) => "ok".to_string(),
        (false, n) => format!("{n} failed"),
    }
}

fn format_meters(value: Option<f64>) -> String {
    value.map_or_else(|| "—".to_string(), |m| format!("{m:.0} m"))
}

fn truncate(message: &str, max_chars: usize) -> String {
    if message.chars().count() > max_chars {
        let head: String = message.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        message.to_string()
    }
}

fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}
