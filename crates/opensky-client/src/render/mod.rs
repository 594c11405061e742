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

//! Icon styling for the aircraft overlay.
//!
//! Pure mapping from [`AircraftRecord`] to what the overlay draws, kept free of
//! any UI toolkit so the rules can be tested in isolation.

use crate::protocol::AircraftRecord;

/// Icon edge in pixels for aircraft on the ground.
pub const GROUND_ICON_SIZE: f32 = 14.0;
/// Icon edge in pixels for airborne aircraft.
pub const AIRBORNE_ICON_SIZE: f32 = 22.0;

/// Fill for aircraft on the ground (red).
pub const GROUND_COLOR: Rgba = Rgba([230, 57, 70, 255]);
/// Fill for airborne aircraft (green).
pub const AIRBORNE_COLOR: Rgba = Rgba([46, 204, 113, 255]);

/// Straight RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    #[must_use]
    pub fn r(self) -> u8 {
        self.0[0]
    }

    #[must_use]
    pub fn g(self) -> u8 {
        self.0[1]
    }

    #[must_use]
    pub fn b(self) -> u8 {
        self.0[2]
    }

    #[must_use]
    pub fn a(self) -> u8 {
        self.0[3]
    }
}

/// Convert a compass heading into the icon rotation.
///
/// The icon artwork points east, and rotation is counterclockwise in degrees,
/// so north (0) maps to 90 and east (90) maps to 0.
#[must_use]
pub fn rotation_degrees(heading: f64) -> f64 {
    -heading + 90.0
}

/// Everything the overlay needs to draw one aircraft.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IconStyle {
    /// Longitude, latitude and altitude in meters.
    pub position: [f64; 3],
    pub size: f32,
    pub color: Rgba,
    /// Counterclockwise degrees from the east-facing artwork.
    pub rotation: f64,
}

impl IconStyle {
    #[must_use]
    pub fn for_record(record: &AircraftRecord) -> Self {
        let (size, color) = if record.on_ground {
            (GROUND_ICON_SIZE, GROUND_COLOR)
        } else {
            (AIRBORNE_ICON_SIZE, AIRBORNE_COLOR)
        };

        Self {
            position: [record.longitude, record.latitude, record.z_offset()],
            size,
            color,
            rotation: rotation_degrees(record.heading),
        }
    }

    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.position[0]
    }

    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.position[1]
    }

    #[must_use]
    pub fn altitude(&self) -> f64 {
        self.position[2]
    }

    /// Rotation in radians.
    #[must_use]
    pub fn rotation_radians(&self) -> f64 {
        self.rotation.to_radians()
    }
}

/// Styles for a record set in paint order: lowest altitude first so that
/// higher aircraft are drawn on top.
#[must_use]
pub fn render_order(records: &[AircraftRecord]) -> Vec<(&AircraftRecord, IconStyle)> {
    let mut styled: Vec<_> = records
        .iter()
        .map(|record| (record, IconStyle::for_record(record)))
        .collect();
    styled.sort_by(|a, b| a.1.altitude().total_cmp(&b.1.altitude()));
    styled
}
