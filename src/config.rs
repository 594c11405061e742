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

//! Application configuration management.
//!
//! Persistent configuration is stored in TOML format through `confy`. Every
//! field has a serde default so older or hand-edited files keep loading.

use log::info;
use opensky_client::gateway::{GatewayConfig, DEFAULT_BIND_ADDRESS, DEFAULT_UPSTREAM_URL};
use opensky_client::http::DEFAULT_GATEWAY_URL;
use opensky_client::tracker::MIN_QUERY_ZOOM;
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "skywatch";
const CONFIG_NAME: &str = "config";

/// Current configuration schema version
pub const CONFIG_VERSION: u32 = 1;

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Address the gateway listens on
    #[serde(default = "default_bind_address")]
    pub gateway_bind_address: String,

    /// Upstream `states/all` endpoint the gateway forwards to
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    /// Gateway base URL the viewer queries
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Run the gateway inside the viewer process
    #[serde(default = "default_true")]
    pub embedded_gateway: bool,

    /// Initial map center latitude
    #[serde(default = "default_latitude")]
    pub initial_latitude: f64,

    /// Initial map center longitude
    #[serde(default = "default_longitude")]
    pub initial_longitude: f64,

    /// Initial map zoom level
    #[serde(default = "default_zoom")]
    pub initial_zoom: f64,

    /// Minimum zoom for aircraft queries
    #[serde(default = "default_min_query_zoom")]
    pub min_query_zoom: f64,

    /// Quiet period after the last pan or zoom before querying, in milliseconds
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// MapTiler map style name
    #[serde(default = "default_map_style")]
    pub map_style: String,

    /// MapTiler API key (optional, env var takes precedence)
    #[serde(default)]
    pub map_api_key: Option<String>,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    CONFIG_VERSION
}

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

fn default_upstream_url() -> String {
    DEFAULT_UPSTREAM_URL.to_string()
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_latitude() -> f64 {
    37.6213 // SFO
}

fn default_longitude() -> f64 {
    -122.379
}

fn default_zoom() -> f64 {
    8.0
}

fn default_min_query_zoom() -> f64 {
    MIN_QUERY_ZOOM
}

fn default_settle_delay_ms() -> u64 {
    300
}

fn default_map_style() -> String {
    "streets-v2".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            gateway_bind_address: default_bind_address(),
            upstream_url: default_upstream_url(),
            gateway_url: default_gateway_url(),
            embedded_gateway: true,
            initial_latitude: default_latitude(),
            initial_longitude: default_longitude(),
            initial_zoom: default_zoom(),
            min_query_zoom: default_min_query_zoom(),
            settle_delay_ms: default_settle_delay_ms(),
            map_style: default_map_style(),
            map_api_key: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, writing defaults on first run
    pub fn load() -> Result<Self, confy::ConfyError> {
        let mut config: AppConfig = confy::load(APP_NAME, CONFIG_NAME)?;

        if config.config_version < CONFIG_VERSION {
            info!(
                "Upgrading configuration from version {} to {CONFIG_VERSION}",
                config.config_version
            );
            config.config_version = CONFIG_VERSION;
            config.save()?;
        }

        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<std::path::PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// Gateway settings derived from this configuration
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            bind_address: self.gateway_bind_address.clone(),
            upstream_url: self.upstream_url.clone(),
        }
    }

    /// Settle delay as a duration
    pub fn settle_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.settle_delay_ms)
    }
}
