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

//! Protocol layer for OpenSky state vector decoding.
//!
//! The upstream API encodes each aircraft as a fixed-position JSON array.
//! This module decodes those arrays into named [`AircraftRecord`]s right at
//! the boundary; nothing past the decoder knows about array indices.

mod state_vector;

pub use state_vector::StateVectorParser;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while decoding an upstream body.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid states body: {0}")]
    InvalidFormat(String),

    #[error("invalid state vector at index {index}: {reason}")]
    InvalidVector { index: usize, reason: String },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Render-ready aircraft record decoded from one state vector.
///
/// Every record produced by [`StateVectorParser`] has finite `longitude` and
/// `latitude`; vectors without a position are dropped during decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftRecord {
    /// ICAO 24-bit address (hex string, e.g. "a1b2c3").
    pub id: String,
    /// Callsign with the upstream padding trimmed.
    pub callsign: Option<String>,
    pub origin_country: String,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Barometric altitude in meters.
    pub baro_altitude: Option<f64>,
    pub on_ground: bool,
    /// True track in degrees clockwise from north, 0 when unknown.
    pub heading: f64,
    /// Ground speed in m/s.
    pub velocity: Option<f64>,
    /// Vertical rate in m/s.
    pub vertical_rate: Option<f64>,
    pub squawk: Option<String>,
    /// Special purpose indicator.
    pub spi: bool,
    /// 0 = ADS-B, 1 = ASTERIX, 2 = MLAT, 3 = FLARM.
    pub position_source: u8,
    /// Emitter category, 0 when the upstream omits it.
    pub category: u8,
    /// Unix seconds of the last position update.
    pub time_position: Option<i64>,
    /// Unix seconds of the last message of any kind.
    pub last_contact: i64,
    pub sensors: Option<Vec<i64>>,
    /// Geometric altitude in meters.
    pub geo_altitude: Option<f64>,
}

impl AircraftRecord {
    /// Altitude used as the rendering z-offset.
    #[must_use]
    pub fn z_offset(&self) -> f64 {
        self.baro_altitude.unwrap_or(0.0)
    }

    /// Human readable label, callsign when known and ICAO address otherwise.
    #[must_use]
    pub fn label(&self) -> &str {
        self.callsign.as_deref().unwrap_or(&self.id)
    }

    /// Name of the position source for display.
    #[must_use]
    pub fn position_source_name(&self) -> &'static str {
        match self.position_source {
            0 => "ADS-B",
            1 => "ASTERIX",
            2 => "MLAT",
            3 => "FLARM",
            _ => "unknown",
        }
    }

    /// Time of the last message of any kind.
    #[must_use]
    pub fn last_contact_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.last_contact, 0)
    }

    /// Seconds between the last position update and the last contact.
    #[must_use]
    pub fn position_age(&self) -> Option<i64> {
        self.time_position.map(|t| self.last_contact - t)
    }
}

/// One decoded upstream response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatesSnapshot {
    /// Upstream timestamp (Unix seconds) the states are associated with.
    pub time: i64,
    /// Aircraft with a known position.
    pub states: Vec<AircraftRecord>,
    /// Number of vectors dropped for missing position or malformed content.
    pub dropped: usize,
}

impl StatesSnapshot {
    /// Upstream timestamp as a UTC date.
    #[must_use]
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.time, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AircraftRecord {
        AircraftRecord {
            id: "4b1805".to_string(),
            callsign: None,
            origin_country: "Switzerland".to_string(),
            longitude: 8.55,
            latitude: 47.45,
            baro_altitude: None,
            on_ground: true,
            heading: 0.0,
            velocity: None,
            vertical_rate: None,
            squawk: None,
            spi: false,
            position_source: 2,
            category: 0,
            time_position: Some(1_700_000_000),
            last_contact: 1_700_000_004,
            sensors: None,
            geo_altitude: None,
        }
    }

    #[test]
    fn test_label_falls_back_to_id() {
        let mut aircraft = record();
        assert_eq!(aircraft.label(), "4b1805");
        aircraft.callsign = Some("SWR12".to_string());
        assert_eq!(aircraft.label(), "SWR12");
    }

    #[test]
    fn test_z_offset_defaults_to_ground() {
        let mut aircraft = record();
        assert!(aircraft.z_offset().abs() < f64::EPSILON);
        aircraft.baro_altitude = Some(1200.0);
        assert!((aircraft.z_offset() - 1200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_contact_times() {
        let aircraft = record();
        assert_eq!(aircraft.position_source_name(), "MLAT");
        assert_eq!(aircraft.position_age(), Some(4));
        assert_eq!(
            aircraft.last_contact_at().map(|t| t.to_rfc3339()),
            Some("2023-11-14T22:13:24+00:00".to_string())
        );
    }
}
