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

//! Viewport state, Web Mercator geometry and settle detection.
//!
//! The map widget reports its center and zoom every frame; this module turns
//! that into the bounding box used for queries and decides when the view has
//! stopped moving long enough to be worth a query.

mod settle;

pub use settle::{SettleDetector, DEFAULT_SETTLE_DELAY};

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Web Mercator tile edge in pixels.
pub const TILE_SIZE: f64 = 256.0;

/// Latitude limit of the Web Mercator projection.
pub const MAX_LATITUDE: f64 = 85.051_128_78;

/// Web Mercator projection utilities.
///
/// Coordinates are in tile units at the given (possibly fractional) zoom, so
/// multiplying by [`TILE_SIZE`] yields world pixels.
#[derive(Debug, Clone, Copy)]
pub struct WebMercator;

impl WebMercator {
    /// Convert latitude to Web Mercator Y in tile units.
    #[must_use]
    pub fn lat_to_y(lat: f64, zoom: f64) -> f64 {
        let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let n = zoom.exp2();
        let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0;
        y * n
    }

    /// Convert longitude to Web Mercator X in tile units.
    #[must_use]
    pub fn lon_to_x(lon: f64, zoom: f64) -> f64 {
        let n = zoom.exp2();
        ((lon + 180.0) / 360.0) * n
    }

    /// Convert tile units back to latitude.
    #[must_use]
    pub fn y_to_lat(y: f64, zoom: f64) -> f64 {
        let n = zoom.exp2();
        let lat_rad = (PI * (1.0 - 2.0 * y / n)).sinh().atan();
        lat_rad.to_degrees()
    }

    /// Convert tile units back to longitude.
    #[must_use]
    pub fn x_to_lon(x: f64, zoom: f64) -> f64 {
        let n = zoom.exp2();
        x / n * 360.0 - 180.0
    }
}

/// Geographic extent used to scope an upstream query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// South edge.
    pub lamin: f64,
    /// West edge.
    pub lomin: f64,
    /// North edge.
    pub lamax: f64,
    /// East edge.
    pub lomax: f64,
}

impl BoundingBox {
    /// Build from the southwest and northeast corners, each `(lat, lon)`.
    #[must_use]
    pub fn from_corners(south_west: (f64, f64), north_east: (f64, f64)) -> Self {
        Self {
            lamin: south_west.0,
            lomin: south_west.1,
            lamax: north_east.0,
            lomax: north_east.1,
        }
    }

    /// Query parameters in wire order.
    #[must_use]
    pub fn query_pairs(&self) -> [(&'static str, f64); 4] {
        [
            ("lamin", self.lamin),
            ("lomin", self.lomin),
            ("lamax", self.lamax),
            ("lomax", self.lomax),
        ]
    }
}

/// Mirrored map view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: f64,
    /// Camera tilt in degrees; the flat map keeps this at 0.
    pub pitch: f64,
    /// Map rotation in degrees; the flat map keeps this at 0.
    pub bearing: f64,
}

impl ViewportState {
    /// Create a flat, north-up view.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64, zoom: f64) -> Self {
        Self {
            longitude,
            latitude,
            zoom,
            pitch: 0.0,
            bearing: 0.0,
        }
    }

    /// Center in world pixels at the current zoom.
    #[must_use]
    pub fn center_pixels(&self) -> (f64, f64) {
        (
            WebMercator::lon_to_x(self.longitude, self.zoom) * TILE_SIZE,
            WebMercator::lat_to_y(self.latitude, self.zoom) * TILE_SIZE,
        )
    }

    /// Offset in screen pixels of a position relative to the view center.
    #[must_use]
    pub fn project(&self, lat: f64, lon: f64) -> (f64, f64) {
        let (cx, cy) = self.center_pixels();
        (
            WebMercator::lon_to_x(lon, self.zoom) * TILE_SIZE - cx,
            WebMercator::lat_to_y(lat, self.zoom) * TILE_SIZE - cy,
        )
    }

    /// Position at a screen offset from the view center, as `(lat, lon)`.
    #[must_use]
    pub fn unproject(&self, dx: f64, dy: f64) -> (f64, f64) {
        let (cx, cy) = self.center_pixels();
        let x = (cx + dx) / TILE_SIZE;
        let y = (cy + dy) / TILE_SIZE;
        (
            WebMercator::y_to_lat(y, self.zoom).clamp(-MAX_LATITUDE, MAX_LATITUDE),
            WebMercator::x_to_lon(x, self.zoom),
        )
    }

    /// Like [`project`](Self::project), but picks the copy of `lon` closest to
    /// the view center so positions across the antimeridian land next to it.
    #[must_use]
    pub fn project_nearest(&self, lat: f64, lon: f64) -> (f64, f64) {
        let (dx, dy) = self.project(lat, lon);
        let world = self.zoom.exp2() * TILE_SIZE;
        (dx - world * (dx / world).round(), dy)
    }

    /// Move the center by a screen-pixel drag delta.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        let (lat, lon) = self.unproject(-dx, -dy);
        self.latitude = lat;
        self.longitude = wrap_longitude(lon);
    }

    /// Bounds of a `width` x `height` pixel view, `None` while the widget has
    /// no size yet.
    ///
    /// Longitudes are always within [-180, 180]. The upstream box cannot wrap,
    /// so a view that crosses the antimeridian (or shows the whole world)
    /// queries the full longitude range for its latitude band.
    #[must_use]
    pub fn bounds(&self, width: f64, height: f64) -> Option<BoundingBox> {
        if !(width > 0.0 && height > 0.0) || !self.zoom.is_finite() {
            return None;
        }

        let (lamin, west) = self.unproject(-width / 2.0, height / 2.0);
        let (lamax, east) = self.unproject(width / 2.0, -height / 2.0);

        let world = self.zoom.exp2() * TILE_SIZE;
        let (west, east) = (wrap_longitude(west), wrap_longitude_east(east));
        let (lomin, lomax) = if width >= world || west > east {
            (-180.0, 180.0)
        } else {
            (west, east)
        };

        Some(BoundingBox::from_corners((lamin, lomin), (lamax, lomax)))
    }
}

/// Wrap into [-180, 180).
fn wrap_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Wrap into (-180, 180], so an east edge on the antimeridian stays at 180.
fn wrap_longitude_east(lon: f64) -> f64 {
    180.0 - (180.0 - lon).rem_euclid(360.0)
}
