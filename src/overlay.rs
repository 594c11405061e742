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

//! Aircraft icon layer drawn on top of the base map.

use eframe::egui;
use log::{debug, error};
use opensky_client::protocol::AircraftRecord;
use opensky_client::render::{self, IconStyle, Rgba};
use opensky_client::viewport::ViewportState;
use thiserror::Error;

const PLANE_SVG: &str = include_str!("../assets/plane.svg");

/// Raster size of the icon texture; icons are drawn smaller than this
const ICON_RASTER_SIZE: u32 = 64;

/// Extra pixels around an icon that still count as a hit
const HIT_SLOP: f32 = 3.0;

#[derive(Debug, Error)]
pub enum IconError {
    #[error("invalid icon SVG: {0}")]
    Svg(#[from] usvg::Error),

    #[error("cannot allocate {0}x{0} icon pixmap")]
    Pixmap(u32),
}

/// Rasterize an SVG into a square image, scaled to fit
pub fn rasterize_svg(svg: &str, size: u32) -> Result<egui::ColorImage, IconError> {
    let tree = usvg::Tree::from_str(svg, &usvg::Options::default())?;
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size, size).ok_or(IconError::Pixmap(size))?;

    let tree_size = tree.size();
    let scale = size as f32 / tree_size.width().max(tree_size.height());
    resvg::render(
        &tree,
        resvg::tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );

    Ok(egui::ColorImage::from_rgba_premultiplied(
        [size as usize, size as usize],
        pixmap.data(),
    ))
}

fn to_color32(color: Rgba) -> egui::Color32 {
    egui::Color32::from_rgba_unmultiplied(color.r(), color.g(), color.b(), color.a())
}

/// An icon placed on screen for this frame
#[derive(Debug, Clone, Copy)]
pub struct PlacedIcon<'a> {
    pub record: &'a AircraftRecord,
    pub style: IconStyle,
    pub center: egui::Pos2,
}

/// Project records to screen positions, in paint order
pub fn place_icons<'a>(
    records: &'a [AircraftRecord],
    view: &ViewportState,
    rect: egui::Rect,
) -> Vec<PlacedIcon<'a>> {
    let origin = rect.center();

    render::render_order(records)
        .into_iter()
        .filter_map(|(record, style)| {
            let (dx, dy) = view.project_nearest(style.latitude(), style.longitude());
            let center = origin + egui::vec2(dx as f32, dy as f32);
            rect.expand(style.size)
                .contains(center)
                .then_some(PlacedIcon { record, style, center })
        })
        .collect()
}

/// Topmost icon under the pointer
pub fn pick<'a>(icons: &[PlacedIcon<'a>], pointer: egui::Pos2) -> Option<&'a AircraftRecord> {
    icons
        .iter()
        .rev()
        .find(|icon| icon.center.distance(pointer) <= icon.style.size / 2.0 + HIT_SLOP)
        .map(|icon| icon.record)
}

/// Aircraft icon layer
#[derive(Default)]
pub struct AircraftOverlay {
    icon: Option<egui::TextureHandle>,
    icon_failed: bool,
}

impl std::fmt::Debug for AircraftOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AircraftOverlay")
            .field("icon_loaded", &self.icon.is_some())
            .finish()
    }
}

impl AircraftOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    fn icon(&mut self, ctx: &egui::Context) -> Option<egui::TextureId> {
        if self.icon.is_none() && !self.icon_failed {
            match rasterize_svg(PLANE_SVG, ICON_RASTER_SIZE) {
                Ok(image) => {
                    debug!("Rasterized aircraft icon at {ICON_RASTER_SIZE}px");
                    self.icon = Some(ctx.load_texture("aircraft_icon", image, egui::TextureOptions::LINEAR));
                }
                Err(e) => {
                    error!("Failed to rasterize aircraft icon, falling back to markers: {e}");
                    self.icon_failed = true;
                }
            }
        }
        self.icon.as_ref().map(egui::TextureHandle::id)
    }

    /// Draw all aircraft and return the one under the pointer, if any
    pub fn paint<'a>(
        &mut self,
        ui: &egui::Ui,
        rect: egui::Rect,
        view: &ViewportState,
        records: &'a [AircraftRecord],
        selected: Option<&str>,
        pointer: Option<egui::Pos2>,
    ) -> Option<&'a AircraftRecord> {
        let icon = self.icon(ui.ctx());
        let painter = ui.painter_at(rect);
        let icons = place_icons(records, view, rect);
        let hovered = pointer.and_then(|p| pick(&icons, p));

        for placed in &icons {
            let color = to_color32(placed.style.color);
            let size = placed.style.size;
            let is_selected = selected == Some(placed.record.id.as_str());
            let is_hovered = hovered.is_some_and(|h| h.id == placed.record.id);

            if is_selected || is_hovered {
                let ring = if is_selected {
                    egui::Color32::from_rgb(255, 210, 60)
                } else {
                    egui::Color32::from_white_alpha(200)
                };
                painter.circle_stroke(placed.center, size * 0.75, egui::Stroke::new(2.0, ring));
            }

            match icon {
                Some(texture) => {
                    let icon_rect = egui::Rect::from_center_size(placed.center, egui::vec2(size, size));
                    // egui rotates clockwise, the style angle is counterclockwise
                    egui::Image::new((texture, egui::vec2(size, size)))
                        .rotate(-placed.style.rotation_radians() as f32, egui::Vec2::splat(0.5))
                        .tint(color)
                        .paint_at(ui, icon_rect);
                }
                None => {
                    painter.circle_filled(placed.center, size / 3.0, color);
                }
            }
        }

        if let Some(record) = hovered {
            if let Some(placed) = icons.iter().find(|i| i.record.id == record.id) {
                draw_label(&painter, placed);
            }
        }

        hovered
    }
}

fn draw_label(painter: &egui::Painter, placed: &PlacedIcon<'_>) {
    let text = match placed.record.baro_altitude {
        Some(alt) => format!("{}  {alt:.0} m", placed.record.label()),
        None => placed.record.label().to_string(),
    };
    let text_pos = placed.center + egui::vec2(placed.style.size / 2.0 + 6.0, 0.0);

    let font = egui::FontId::proportional(11.0);
    let galley = painter.layout_no_wrap(text.clone(), font.clone(), egui::Color32::WHITE);

    // Draw background box
    let padding = egui::vec2(3.0, 2.0);
    let box_rect = egui::Rect::from_min_size(
        text_pos - egui::vec2(padding.x, galley.size().y / 2.0 + padding.y),
        galley.size() + padding * 2.0,
    );
    painter.rect_filled(box_rect, 2.0, egui::Color32::from_rgba_unmultiplied(0, 0, 0, 180));
    painter.text(text_pos, egui::Align2::LEFT_CENTER, text, font, egui::Color32::WHITE);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, lat: f64, lon: f64, on_ground: bool, alt: Option<f64>) -> AircraftRecord {
        AircraftRecord {
            id: id.to_string(),
            callsign: None,
            origin_country: "Switzerland".to_string(),
            longitude: lon,
            latitude: lat,
            baro_altitude: alt,
            on_ground,
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

    fn screen() -> egui::Rect {
        egui::Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(800.0, 600.0))
    }

    #[test]
    fn test_plane_icon_rasterizes() {
        let image = rasterize_svg(PLANE_SVG, ICON_RASTER_SIZE).unwrap();
        assert_eq!(image.size, [64, 64]);
        assert!(image.pixels.iter().any(|p| p.a() > 0));
        // Transparent corners
        assert_eq!(image.pixels[0].a(), 0);
    }

    #[test]
    fn test_invalid_svg_is_error() {
        assert!(matches!(rasterize_svg("not svg", 16), Err(IconError::Svg(_))));
    }

    #[test]
    fn test_center_aircraft_lands_on_rect_center() {
        let view = ViewportState::new(47.45, 8.55, 9.0);
        let records = vec![record("a", 47.45, 8.55, false, Some(1000.0))];
        let icons = place_icons(&records, &view, screen());

        assert_eq!(icons.len(), 1);
        assert!(icons[0].center.distance(egui::pos2(400.0, 300.0)) < 0.01);
    }

    #[test]
    fn test_offscreen_aircraft_skipped() {
        let view = ViewportState::new(47.45, 8.55, 9.0);
        let records = vec![record("far", 40.0, 0.0, false, None)];
        assert!(place_icons(&records, &view, screen()).is_empty());
    }

    #[test]
    fn test_aircraft_across_antimeridian_drawn_beside_center() {
        let view = ViewportState::new(0.0, 179.5, 7.0);
        let records = vec![record("east", 0.0, -179.5, false, Some(11000.0))];
        let icons = place_icons(&records, &view, screen());

        assert_eq!(icons.len(), 1);
        assert!(icons[0].center.x > 400.0);
        assert!((icons[0].center.y - 300.0).abs() < 0.01);
    }

    #[test]
    fn test_pick_prefers_topmost() {
        let view = ViewportState::new(47.45, 8.55, 9.0);
        let records = vec![
            record("high", 47.45, 8.55, false, Some(9000.0)),
            record("low", 47.45, 8.55, true, None),
        ];
        let icons = place_icons(&records, &view, screen());

        let picked = pick(&icons, egui::pos2(401.0, 301.0)).map(|r| r.id.as_str());
        assert_eq!(picked, Some("high"));
        assert!(pick(&icons, egui::pos2(450.0, 300.0)).is_none());
    }
}
