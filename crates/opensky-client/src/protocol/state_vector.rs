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

//! OpenSky `states/all` body decoder.
//!
//! Body format:
//! ```text
//! {"time": <unix>, "states": [[icao24, callsign, origin_country, time_position,
//!   last_contact, longitude, latitude, baro_altitude, on_ground, velocity,
//!   true_track, vertical_rate, sensors, geo_altitude, squawk, spi,
//!   position_source, category?], ...] | null}
//! ```

use log::warn;
use serde::Deserialize;

use super::{AircraftRecord, ParseError, StatesSnapshot};

#[derive(Debug, Deserialize)]
struct WireStates {
    time: i64,
    states: Option<Vec<serde_json::Value>>,
}

/// Positional layout of one state vector. Serde reads a JSON array into the
/// fields in declaration order, so the field order here is the wire order.
#[derive(Debug, Deserialize)]
struct WireStateVector {
    icao24: String,
    callsign: Option<String>,
    origin_country: String,
    time_position: Option<i64>,
    last_contact: i64,
    longitude: Option<f64>,
    latitude: Option<f64>,
    baro_altitude: Option<f64>,
    on_ground: bool,
    velocity: Option<f64>,
    true_track: Option<f64>,
    vertical_rate: Option<f64>,
    sensors: Option<Vec<i64>>,
    geo_altitude: Option<f64>,
    squawk: Option<String>,
    spi: bool,
    position_source: u8,
    #[serde(default)]
    category: Option<u8>,
}

impl WireStateVector {
    /// Convert into a record, `None` when the position is unknown.
    fn into_record(self) -> Option<AircraftRecord> {
        let (Some(longitude), Some(latitude)) = (self.longitude, self.latitude) else {
            return None;
        };

        let callsign = self
            .callsign
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Some(AircraftRecord {
            id: self.icao24,
            callsign,
            origin_country: self.origin_country,
            longitude,
            latitude,
            baro_altitude: self.baro_altitude,
            on_ground: self.on_ground,
            heading: self.true_track.unwrap_or(0.0),
            velocity: self.velocity,
            vertical_rate: self.vertical_rate,
            squawk: self.squawk,
            spi: self.spi,
            position_source: self.position_source,
            category: self.category.unwrap_or(0),
            time_position: self.time_position,
            last_contact: self.last_contact,
            sensors: self.sensors,
            geo_altitude: self.geo_altitude,
        })
    }
}

/// Decoder for `states/all` bodies.
#[derive(Debug, Default)]
pub struct StateVectorParser;

impl StateVectorParser {
    /// Create a new state vector parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Decode a full body into a snapshot.
    ///
    /// Vectors without longitude or latitude are dropped. A malformed vector
    /// is logged and dropped without failing the rest of the body.
    pub fn decode(&self, body: &[u8]) -> Result<StatesSnapshot, ParseError> {
        let wire: WireStates = serde_json::from_slice(body)?;
        let vectors = wire.states.unwrap_or_default();
        let total = vectors.len();

        let mut states = Vec::with_capacity(total);
        for (index, value) in vectors.into_iter().enumerate() {
            match decode_vector(index, value) {
                Ok(Some(record)) => states.push(record),
                Ok(None) => {}
                Err(e) => warn!("Skipping state vector: {e}"),
            }
        }

        Ok(StatesSnapshot {
            time: wire.time,
            dropped: total - states.len(),
            states,
        })
    }
}

fn decode_vector(index: usize, value: serde_json::Value) -> Result<Option<AircraftRecord>, ParseError> {
    if !value.is_array() {
        return Err(ParseError::InvalidVector {
            index,
            reason: "expected an array".to_string(),
        });
    }

    let wire: WireStateVector = serde_json::from_value(value).map_err(|e| ParseError::InvalidVector {
        index,
        reason: e.to_string(),
    })?;

    Ok(wire.into_record())
}

#[cfg(test)]
mod tests {
    use super::*;

    const AIRBORNE: &str = r#"["a1b2c3","UAL123  ","United States",1700000000,1700000001,-122.38,37.62,3048.0,false,230.5,275.0,-2.5,null,3100.0,"1200",false,0,4]"#;

    fn body(states: &str) -> Vec<u8> {
        format!(r#"{{"time":1700000002,"states":[{states}]}}"#).into_bytes()
    }

    #[test]
    fn test_decode_full_vector() {
        let snapshot = StateVectorParser::new().decode(&body(AIRBORNE)).unwrap();
        assert_eq!(snapshot.time, 1_700_000_002);
        assert_eq!(snapshot.states.len(), 1);

        let record = &snapshot.states[0];
        assert_eq!(record.id, "a1b2c3");
        assert_eq!(record.callsign.as_deref(), Some("UAL123"));
        assert_eq!(record.origin_country, "United States");
        assert!((record.longitude - (-122.38)).abs() < 1e-9);
        assert!((record.latitude - 37.62).abs() < 1e-9);
        assert_eq!(record.baro_altitude, Some(3048.0));
        assert!(!record.on_ground);
        assert!((record.heading - 275.0).abs() < 1e-9);
        assert_eq!(record.squawk.as_deref(), Some("1200"));
        assert_eq!(record.category, 4);
        assert_eq!(record.geo_altitude, Some(3100.0));
    }

    #[test]
    fn test_missing_position_is_dropped() {
        let no_lon = r#"["000001",null,"France",null,1700000001,null,48.1,null,true,null,null,null,null,null,null,false,0]"#;
        let no_lat = r#"["000002",null,"France",null,1700000001,2.3,null,null,true,null,null,null,null,null,null,false,0]"#;
        let states = format!("{no_lon},{no_lat},{AIRBORNE}");

        let snapshot = StateVectorParser::new().decode(&body(&states)).unwrap();
        assert_eq!(snapshot.states.len(), 1);
        assert_eq!(snapshot.states[0].id, "a1b2c3");
        assert_eq!(snapshot.dropped, 2);
    }

    #[test]
    fn test_heading_and_category_default_to_zero() {
        let vector = r#"["4b1805","SWR1   ","Switzerland",1700000000,1700000000,8.55,47.45,null,true,0.0,null,null,null,null,null,false,0]"#;
        let snapshot = StateVectorParser::new().decode(&body(vector)).unwrap();

        let record = &snapshot.states[0];
        assert!(record.heading.abs() < f64::EPSILON);
        assert_eq!(record.category, 0);
        assert_eq!(record.baro_altitude, None);
        assert!(record.z_offset().abs() < f64::EPSILON);
    }

    #[test]
    fn test_blank_callsign_becomes_none() {
        let vector = r#"["4b1805","        ","Switzerland",null,1700000000,8.55,47.45,null,true,null,null,null,null,null,null,false,0]"#;
        let snapshot = StateVectorParser::new().decode(&body(vector)).unwrap();
        assert_eq!(snapshot.states[0].callsign, None);
        assert_eq!(snapshot.states[0].label(), "4b1805");
    }

    #[test]
    fn test_null_states_is_empty() {
        let snapshot = StateVectorParser::new()
            .decode(br#"{"time":1,"states":null}"#)
            .unwrap();
        assert_eq!(snapshot.time, 1);
        assert!(snapshot.states.is_empty());
    }

    #[test]
    fn test_malformed_vector_is_skipped() {
        let states = format!(r#"["short"],{{"not":"an array"}},{AIRBORNE}"#);
        let snapshot = StateVectorParser::new().decode(&body(&states)).unwrap();
        assert_eq!(snapshot.states.len(), 1);
        assert_eq!(snapshot.dropped, 2);
    }

    #[test]
    fn test_invalid_body_is_error() {
        let result = StateVectorParser::new().decode(b"[1,2,3]");
        assert!(matches!(result, Err(ParseError::Json(_))));
    }
}
