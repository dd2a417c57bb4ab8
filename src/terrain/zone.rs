//! Texture zones: which orthophoto zoom level and provider cover each part
//! of a tile.

use serde::{Deserialize, Serialize};

use crate::geo::{gtile_to_wgs84, TextureKey, TileCoord};

/// Maps a mesh-zoom grid cell to the texture that covers it.
pub trait ZoneLookup: Send + Sync {
    /// `til_x`, `til_y` are the 16-aligned cell at the mesh zoom level.
    fn texture_key(&self, til_x: u32, til_y: u32) -> TextureKey;

    /// Zoom level the lookup expects cells at.
    fn mesh_zl(&self) -> u8;
}

/// A polygonal area textured at its own zoom level and provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Closed or open ring of (lat, lon) vertices
    pub polygon: Vec<[f64; 2]>,
    pub zoom: u8,
    pub provider: String,
}

impl Zone {
    pub fn new(polygon: Vec<[f64; 2]>, zoom: u8, provider: impl Into<String>) -> Self {
        Self { polygon, zoom, provider: provider.into() }
    }

    /// Even-odd test of a (lat, lon) point.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        let ring = &self.polygon;
        if ring.len() < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = ring.len() - 1;
        for i in 0..ring.len() {
            let [lat_i, lon_i] = ring[i];
            let [lat_j, lon_j] = ring[j];
            if (lat_i > lat) != (lat_j > lat) {
                let cross = lon_i + (lat - lat_i) / (lat_j - lat_i) * (lon_j - lon_i);
                if lon < cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

/// Zone lookup from a default zone plus prioritised polygons.
#[derive(Debug, Clone)]
pub struct ZoneMap {
    tile: TileCoord,
    mesh_zl: u8,
    default_zl: u8,
    default_provider: String,
    /// First listed wins
    zones: Vec<Zone>,
}

impl ZoneMap {
    pub fn new(
        tile: TileCoord,
        mesh_zl: u8,
        default_zl: u8,
        default_provider: impl Into<String>,
        zones: Vec<Zone>,
    ) -> Self {
        Self {
            tile,
            mesh_zl,
            default_zl,
            default_provider: default_provider.into(),
            zones,
        }
    }

    fn zone_at(&self, lat: f64, lon: f64) -> (u8, &str) {
        self.zones
            .iter()
            .find(|zone| zone.contains(lat, lon))
            .map(|zone| (zone.zoom, zone.provider.as_str()))
            .unwrap_or((self.default_zl, self.default_provider.as_str()))
    }
}

impl ZoneLookup for ZoneMap {
    fn texture_key(&self, til_x: u32, til_y: u32) -> TextureKey {
        let (lat, lon) = gtile_to_wgs84(til_x as f64 + 8.0, til_y as f64 + 8.0, self.mesh_zl);
        let lat = lat.clamp(self.tile.lat as f64, self.tile.lat as f64 + 1.0);
        let lon = lon.clamp(self.tile.lon as f64, self.tile.lon as f64 + 1.0);
        let (zoom, provider) = self.zone_at(lat, lon);
        let zoom = zoom.min(self.mesh_zl);
        let shift = (self.mesh_zl - zoom) as u32;
        TextureKey::new(
            ((til_x >> shift) / 16) * 16,
            ((til_y >> shift) / 16) * 16,
            zoom,
            provider,
        )
    }

    fn mesh_zl(&self) -> u8 {
        self.mesh_zl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::wgs84_to_orthogrid;

    fn square(lat0: f64, lon0: f64, size: f64) -> Vec<[f64; 2]> {
        vec![
            [lat0, lon0],
            [lat0, lon0 + size],
            [lat0 + size, lon0 + size],
            [lat0 + size, lon0],
        ]
    }

    #[test]
    fn test_zone_contains() {
        let zone = Zone::new(square(45.0, 6.0, 0.5), 18, "GO2");
        assert!(zone.contains(45.25, 6.25));
        assert!(!zone.contains(45.75, 6.25));
        assert!(!zone.contains(45.25, 6.75));
        assert!(!Zone::new(vec![[0.0, 0.0], [1.0, 1.0]], 18, "X").contains(0.5, 0.5));
    }

    #[test]
    fn test_default_zone() {
        let tile = TileCoord::new(45, 6);
        let map = ZoneMap::new(tile, 19, 16, "BI", vec![]);
        let (tx, ty) = wgs84_to_orthogrid(45.5, 6.5, 19);
        let key = map.texture_key(tx, ty);
        assert_eq!(key.zoom, 16);
        assert_eq!(key.provider, "BI");
        assert_eq!((key.til_x, key.til_y), wgs84_to_orthogrid(45.5, 6.5, 16));
    }

    #[test]
    fn test_first_listed_zone_wins() {
        let tile = TileCoord::new(45, 6);
        let zones = vec![
            Zone::new(square(45.4, 6.4, 0.2), 18, "GO2"),
            Zone::new(square(45.0, 6.0, 1.0), 17, "IGN"),
        ];
        let map = ZoneMap::new(tile, 19, 16, "BI", zones);

        let (tx, ty) = wgs84_to_orthogrid(45.5, 6.5, 19);
        let key = map.texture_key(tx, ty);
        assert_eq!((key.zoom, key.provider.as_str()), (18, "GO2"));

        let (tx, ty) = wgs84_to_orthogrid(45.1, 6.1, 19);
        let key = map.texture_key(tx, ty);
        assert_eq!((key.zoom, key.provider.as_str()), (17, "IGN"));
        assert_eq!(key.til_x % 16, 0);
        assert_eq!(key.til_y % 16, 0);
    }

    #[test]
    fn test_zoom_capped_at_mesh_level() {
        let tile = TileCoord::new(45, 6);
        let zones = vec![Zone::new(square(45.0, 6.0, 1.0), 20, "GO2")];
        let map = ZoneMap::new(tile, 19, 16, "BI", zones);
        let (tx, ty) = wgs84_to_orthogrid(45.5, 6.5, 19);
        let key = map.texture_key(tx, ty);
        assert_eq!(key.zoom, 19);
        assert_eq!((key.til_x, key.til_y), (tx, ty));
    }
}
