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

use egui::{ColorImage, TextureHandle, TextureOptions};
use log::{debug, info, warn};
use opensky_client::viewport::{ViewportState, WebMercator, TILE_SIZE};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use walkers::sources::{Attribution, TileSource};
use walkers::TileId;

const CACHE_DURATION_DAYS: u64 = 7;

/// Tile source shared with the download threads
pub type SharedTileSource = Arc<dyn TileSource + Send + Sync>;

#[derive(Debug, Error)]
enum TileError {
    #[error("tile cache I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("tile decode: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub zoom: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    fn tile_id(self) -> TileId {
        TileId {
            x: self.x,
            y: self.y,
            zoom: self.zoom,
        }
    }

    fn texture_name(self) -> String {
        format!("tile_{}_{}/{}", self.zoom, self.x, self.y)
    }
}

/// Get cache filename based on hash of URL
fn cache_filename(url: &str) -> String {
    let hash = Sha256::digest(url.as_bytes());
    format!("{hash:x}.png")
}

enum TileState {
    Loading,
    Loaded(TextureHandle),
    Failed,
    /// The tile server refused the API key (HTTP 401/403)
    Rejected(u16),
}

/// A tile positioned relative to the view center
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacedTile {
    pub coord: TileCoord,
    /// Screen offset of the tile's top-left corner from the view center
    pub offset: (f32, f32),
    /// Edge length in screen pixels, larger than 256 between integer zooms
    pub size: f32,
}

/// Compute the tiles covering a `width` x `height` view.
///
/// Tiles come from the integer zoom at or below the view zoom and are scaled
/// up for the fractional remainder.
pub fn visible_tiles(view: &ViewportState, width: f32, height: f32, max_zoom: u8) -> Vec<PlacedTile> {
    let tile_zoom = view.zoom.floor().clamp(0.0, f64::from(max_zoom));
    let zoom = tile_zoom as u8;
    let tile_px = TILE_SIZE * (view.zoom - tile_zoom).exp2();

    let center_tile_x = WebMercator::lon_to_x(view.longitude, tile_zoom);
    let center_tile_y = WebMercator::lat_to_y(view.latitude, tile_zoom);

    // How many tiles we need in each direction
    let tiles_wide = (f64::from(width) / tile_px).ceil() as i64 + 2;
    let tiles_high = (f64::from(height) / tile_px).ceil() as i64 + 2;

    let start_x = center_tile_x.floor() as i64 - tiles_wide / 2;
    let start_y = center_tile_y.floor() as i64 - tiles_high / 2;

    let max_tile = 1_i64 << zoom;
    let mut tiles = Vec::new();

    for dy in 0..tiles_high {
        for dx in 0..tiles_wide {
            let tile_x = start_x + dx;
            let tile_y = start_y + dy;

            // Latitude doesn't wrap
            if !(0..max_tile).contains(&tile_y) {
                continue;
            }

            let wrapped_x = tile_x.rem_euclid(max_tile);
            tiles.push(PlacedTile {
                coord: TileCoord::new(wrapped_x as u32, tile_y as u32, zoom),
                offset: (
                    ((tile_x as f64 - center_tile_x) * tile_px) as f32,
                    ((tile_y as f64 - center_tile_y) * tile_px) as f32,
                ),
                size: tile_px as f32,
            });
        }
    }

    tiles
}

/// Base map tiles with an on-disk cache and background downloads
pub struct TileManager {
    source: SharedTileSource,
    cache_dir: PathBuf,
    tiles: Arc<Mutex<HashMap<TileCoord, TileState>>>,
}

impl std::fmt::Debug for TileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileManager")
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

impl TileManager {
    /// Create a manager for `source`, caching under `namespace`
    pub fn new(source: SharedTileSource, namespace: &str) -> Self {
        let cache_dir = Self::get_cache_dir(namespace);

        if let Err(e) = fs::create_dir_all(&cache_dir) {
            warn!("Failed to create tile cache directory {}: {e}", cache_dir.display());
        }

        Self::cleanup_old_tiles(&cache_dir);

        Self {
            source,
            cache_dir,
            tiles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn get_cache_dir(namespace: &str) -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("skywatch")
            .join("tiles")
            .join(namespace)
    }

    fn cleanup_old_tiles(cache_dir: &Path) {
        let now = SystemTime::now();
        let max_age = Duration::from_secs(CACHE_DURATION_DAYS * 24 * 60 * 60);

        let Ok(entries) = fs::read_dir(cache_dir) else {
            return;
        };

        for entry in entries.flatten() {
            let expired = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age > max_age);

            if expired && fs::remove_file(entry.path()).is_ok() {
                debug!("Removed old tile cache: {}", entry.path().display());
            }
        }
    }

    fn lock_tiles(&self) -> MutexGuard<'_, HashMap<TileCoord, TileState>> {
        self.tiles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn attribution(&self) -> Attribution {
        self.source.attribution()
    }

    pub fn max_zoom(&self) -> u8 {
        self.source.max_zoom()
    }

    /// Get tile from cache or queue for download
    pub fn get_tile(&self, coord: TileCoord, ctx: &egui::Context) -> Option<TextureHandle> {
        let mut tiles = self.lock_tiles();

        match tiles.get(&coord) {
            Some(TileState::Loaded(texture)) => return Some(texture.clone()),
            Some(_) => return None,
            None => {}
        }

        let url = self.source.tile_url(coord.tile_id());
        let cache_path = self.cache_dir.join(cache_filename(&url));

        if cache_path.exists() {
            match load_tile_from_disk(&cache_path, ctx, coord) {
                Ok(texture) => {
                    tiles.insert(coord, TileState::Loaded(texture.clone()));
                    return Some(texture);
                }
                Err(e) => warn!("Failed to load cached tile: {e}"),
            }
        }

        tiles.insert(coord, TileState::Loading);
        drop(tiles);
        self.spawn_download(coord, url, cache_path, ctx.clone());
        None
    }

    fn spawn_download(&self, coord: TileCoord, url: String, cache_path: PathBuf, ctx: egui::Context) {
        let tiles = Arc::clone(&self.tiles);

        std::thread::spawn(move || {
            let state = download_tile(coord, &url, &cache_path, &ctx);
            tiles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(coord, state);
            ctx.request_repaint();
        });
    }

    /// Paint the base map into `rect`, returning the number of tiles drawn
    pub fn paint(
        &self,
        ctx: &egui::Context,
        painter: &egui::Painter,
        rect: egui::Rect,
        view: &ViewportState,
    ) -> usize {
        let center = rect.center();
        let mut rendered = 0;

        for tile in visible_tiles(view, rect.width(), rect.height(), self.max_zoom()) {
            let Some(texture) = self.get_tile(tile.coord, ctx) else {
                continue;
            };

            let tile_rect = egui::Rect::from_min_size(
                center + egui::vec2(tile.offset.0, tile.offset.1),
                egui::vec2(tile.size, tile.size),
            );
            painter.image(
                texture.id(),
                tile_rect,
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                egui::Color32::WHITE,
            );
            rendered += 1;
        }

        rendered
    }

    /// HTTP status of a tile rejected for authorization, if any
    pub fn auth_rejection(&self) -> Option<u16> {
        self.lock_tiles().values().find_map(|state| match state {
            TileState::Rejected(status) => Some(*status),
            _ => None,
        })
    }

    /// Whether any tile download is still running
    pub fn is_loading(&self) -> bool {
        self.lock_tiles()
            .values()
            .any(|state| matches!(state, TileState::Loading))
    }

    /// Number of tiles that failed to download or decode
    pub fn failed_count(&self) -> usize {
        self.lock_tiles()
            .values()
            .filter(|state| matches!(state, TileState::Failed))
            .count()
    }
}

fn decode_tile(bytes: &[u8]) -> Result<ColorImage, TileError> {
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    Ok(ColorImage::from_rgba_unmultiplied(size, &rgba.into_raw()))
}

fn load_tile_from_disk(path: &Path, ctx: &egui::Context, coord: TileCoord) -> Result<TextureHandle, TileError> {
    let bytes = fs::read(path)?;
    let image = decode_tile(&bytes)?;
    Ok(ctx.load_texture(coord.texture_name(), image, TextureOptions::LINEAR))
}

fn download_tile(coord: TileCoord, url: &str, cache_path: &Path, ctx: &egui::Context) -> TileState {
    debug!("Downloading tile {}/{}/{}", coord.zoom, coord.x, coord.y);

    let response = match reqwest::blocking::get(url) {
        Ok(response) => response,
        Err(e) => {
            // The URL carries the API key, keep it out of the log
            warn!("Failed to fetch tile {coord:?}: {}", e.without_url());
            return TileState::Failed;
        }
    };

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        warn!("Tile server rejected the map API key: HTTP {status}");
        return TileState::Rejected(status.as_u16());
    }
    if !status.is_success() {
        warn!("Failed to download tile {coord:?}: HTTP {status}");
        return TileState::Failed;
    }

    let bytes = match response.bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to read tile bytes: {}", e.without_url());
            return TileState::Failed;
        }
    };

    match decode_tile(&bytes) {
        Ok(image) => {
            if let Err(e) = fs::write(cache_path, &bytes) {
                info!("Failed to save tile to cache: {e}");
            }
            TileState::Loaded(ctx.load_texture(coord.texture_name(), image, TextureOptions::LINEAR))
        }
        Err(e) => {
            warn!("Failed to decode tile {coord:?}: {e}");
            TileState::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_zoom_uses_native_size() {
        let view = ViewportState::new(37.62, -122.38, 8.0);
        let tiles = visible_tiles(&view, 800.0, 600.0, 19);

        assert!(!tiles.is_empty());
        assert!(tiles.iter().all(|t| t.coord.zoom == 8));
        assert!(tiles.iter().all(|t| (t.size - 256.0).abs() < 1e-3));
    }

    #[test]
    fn test_fractional_zoom_scales_lower_tiles() {
        let view = ViewportState::new(37.62, -122.38, 8.5);
        let tiles = visible_tiles(&view, 800.0, 600.0, 19);

        assert!(tiles.iter().all(|t| t.coord.zoom == 8));
        let expected = 256.0 * 2.0_f32.sqrt();
        assert!(tiles.iter().all(|t| (t.size - expected).abs() < 1e-2));
    }

    #[test]
    fn test_center_is_covered() {
        let view = ViewportState::new(47.45, 8.55, 9.3);
        let tiles = visible_tiles(&view, 1024.0, 768.0, 19);

        let covers_center = tiles.iter().any(|t| {
            let (x, y) = t.offset;
            x <= 0.0 && 0.0 < x + t.size && y <= 0.0 && 0.0 < y + t.size
        });
        assert!(covers_center);
    }

    #[test]
    fn test_world_view_wraps_x_and_clamps_y() {
        let view = ViewportState::new(0.0, 179.0, 1.0);
        let tiles = visible_tiles(&view, 2000.0, 2000.0, 19);

        assert!(tiles.iter().all(|t| t.coord.x < 2 && t.coord.y < 2));
    }

    #[test]
    fn test_zoom_clamped_to_source_max() {
        let view = ViewportState::new(47.45, 8.55, 14.0);
        let tiles = visible_tiles(&view, 512.0, 512.0, 12);

        assert!(tiles.iter().all(|t| t.coord.zoom == 12));
        assert!(tiles.iter().all(|t| (t.size - 1024.0).abs() < 1e-2));
    }

    fn manager_with(states: Vec<(TileCoord, TileState)>) -> TileManager {
        TileManager {
            source: Arc::new(crate::map::MapTilerSource::new("streets-v2", "test-key")),
            cache_dir: PathBuf::from("unused"),
            tiles: Arc::new(Mutex::new(states.into_iter().collect())),
        }
    }

    #[test]
    fn test_tile_counters() {
        let tiles = manager_with(vec![
            (TileCoord::new(1, 1, 8), TileState::Loading),
            (TileCoord::new(2, 1, 8), TileState::Failed),
            (TileCoord::new(3, 1, 8), TileState::Failed),
        ]);
        assert!(tiles.is_loading());
        assert_eq!(tiles.failed_count(), 2);
        assert!(tiles.auth_rejection().is_none());

        let rejected = manager_with(vec![(TileCoord::new(1, 1, 8), TileState::Rejected(401))]);
        assert!(!rejected.is_loading());
        assert_eq!(rejected.failed_count(), 0);
        assert_eq!(rejected.auth_rejection(), Some(401));
    }

    #[test]
    fn test_cache_filename_is_stable() {
        let a = cache_filename("https://example.com/1/2/3.png");
        let b = cache_filename("https://example.com/1/2/3.png");
        assert_eq!(a, b);
        assert!(a.ends_with(".png"));
        assert_ne!(a, cache_filename("https://example.com/1/2/4.png"));
    }
}
