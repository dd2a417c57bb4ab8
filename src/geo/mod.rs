//! Geographic helpers: Web-Mercator orthophoto grid math and tile naming.

pub mod webmercator;
pub mod tile;

pub use webmercator::{
    wgs84_to_orthogrid, gtile_to_wgs84, st_coord, st_coord_in_cell, webmercator_pixel_size,
    EARTH_RADIUS,
};
pub use tile::{distance_mask_file_name, legacy_mask_file_name, TileCoord, TextureKey};
