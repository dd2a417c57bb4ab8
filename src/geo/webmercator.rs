//! Web-Mercator conversions between WGS84 coordinates and orthophoto grid cells.
//!
//! Orthophoto textures cover 16x16 map tiles, so grid cells are always
//! 16-aligned tile coordinates at a given zoom level.

use std::f64::consts::PI;

use super::tile::TextureKey;

/// Equatorial earth radius in metres.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

fn mercator_ratios(lat: f64, lon: f64) -> (f64, f64) {
    let ratio_x = lon / 180.0;
    let ratio_y = ((90.0 + lat) * PI / 360.0).tan().ln() / PI;
    (ratio_x, ratio_y)
}

/// Top-left tile of the 16-aligned orthophoto cell containing (lat, lon).
pub fn wgs84_to_orthogrid(lat: f64, lon: f64, zoom: u8) -> (u32, u32) {
    let (ratio_x, ratio_y) = mercator_ratios(lat, lon);
    let mult = 2f64.powi(zoom as i32 - 5);
    let til_x = ((ratio_x + 1.0) * mult).floor().max(0.0) as u32 * 16;
    let til_y = ((1.0 - ratio_y) * mult).floor().max(0.0) as u32 * 16;
    (til_x, til_y)
}

/// Latitude and longitude of the top-left corner of map tile (til_x, til_y).
pub fn gtile_to_wgs84(til_x: f64, til_y: f64, zoom: u8) -> (f64, f64) {
    let half = 2f64.powi(zoom as i32 - 1);
    let rat_x = til_x / half - 1.0;
    let rat_y = 1.0 - til_y / half;
    let lon = rat_x * 180.0;
    let lat = 360.0 / PI * (PI * rat_y).exp().atan() - 90.0;
    (lat, lon)
}

/// Texture (s, t) coordinates of (lat, lon) inside the texture `key`, clamped to [0, 1].
pub fn st_coord(lat: f64, lon: f64, key: &TextureKey) -> (f64, f64) {
    st_coord_in_cell(lat, lon, key.til_x, key.til_y, key.zoom)
}

/// Same as [`st_coord`] for a bare grid cell.
pub fn st_coord_in_cell(lat: f64, lon: f64, til_x: u32, til_y: u32, zoom: u8) -> (f64, f64) {
    let (ratio_x, ratio_y) = mercator_ratios(lat, lon);
    let mult = 2f64.powi(zoom as i32 - 5);
    let s = (ratio_x + 1.0) * mult - (til_x / 16) as f64;
    let t = 1.0 - ((1.0 - ratio_y) * mult - (til_y / 16) as f64);
    (s.clamp(0.0, 1.0), t.clamp(0.0, 1.0))
}

/// Ground size in metres of one texture pixel at `lat` and `zoom`.
pub fn webmercator_pixel_size(lat: f64, zoom: u8) -> f64 {
    2.0 * PI * EARTH_RADIUS * (PI * lat / 180.0).cos() / 2f64.powi(zoom as i32 + 8)
}
