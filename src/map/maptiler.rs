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

//! MapTiler raster tile source.

use walkers::sources::{Attribution, TileSource};
use walkers::TileId;

/// Environment variable holding the map API key
pub const API_KEY_ENV: &str = "MAPTILER_API_KEY";

/// Tile source for MapTiler hosted raster styles
#[derive(Debug, Clone)]
pub struct MapTilerSource {
    style: String,
    api_key: String,
}

impl MapTilerSource {
    /// Create a tile source for the given style (e.g. "streets-v2")
    pub fn new(style: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            style: style.into(),
            api_key: api_key.into(),
        }
    }

    pub fn style(&self) -> &str {
        &self.style
    }
}

impl TileSource for MapTilerSource {
    fn tile_url(&self, tile_id: TileId) -> String {
        format!(
            "https://api.maptiler.com/maps/{}/256/{}/{}/{}.png?key={}",
            self.style, tile_id.zoom, tile_id.x, tile_id.y, self.api_key
        )
    }

    fn attribution(&self) -> Attribution {
        Attribution {
            text: "© MapTiler © OpenStreetMap contributors",
            url: "https://www.maptiler.com/copyright/",
            logo_light: None,
            logo_dark: None,
        }
    }
}

/// Resolve API key from environment variable or config
pub fn resolve_api_key(config_key: Option<&str>) -> Option<String> {
    choose_api_key(std::env::var(API_KEY_ENV).ok(), config_key)
}

/// Get the source of the API key for UI display
pub fn api_key_source(config_key: Option<&str>) -> Option<&'static str> {
    let from_env = std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty());
    if from_env.is_some() {
        Some("environment variable")
    } else if config_key.is_some_and(|k| !k.trim().is_empty()) {
        Some("config file")
    } else {
        None
    }
}

fn choose_api_key(env_key: Option<String>, config_key: Option<&str>) -> Option<String> {
    env_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .or_else(|| {
            config_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
        })
}
