//! Per-node bathymetry sampling.

use std::collections::HashMap;

use image::GrayImage;

use crate::core::{CancelToken, Result};
use crate::geo::{st_coord_in_cell, wgs84_to_orthogrid, TileCoord};
use crate::mesh::{Mesh, TypeMask};

use super::MaskSource;

/// Ratio given to nodes without a usable sample.
pub const DEFAULT_RATIO: f64 = 1.0;

/// Blend ratio for one 8-bit distance sample.
pub fn ratio_from_sample(value: u8, ratio_bathy: f64) -> f64 {
    (10.0 * ratio_bathy * value as f64 / 255.0).clamp(0.1, 1.0)
}

/// Counters from one sampling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BathymetryStats {
    pub wet_nodes: usize,
    pub coastal: usize,
    pub sampled: usize,
    pub missing: usize,
}

/// Assigns bathymetry ratios to wet nodes of a tile mesh.
///
/// Masks are loaded lazily and kept for the duration of the pass, a missing
/// mask is only looked up once.
pub struct BathymetrySampler<S: MaskSource> {
    source: S,
    tile: TileCoord,
    mask_zl: u8,
    ratio_bathy: f64,
    cache: HashMap<(u32, u32), Option<GrayImage>>,
}

impl<S: MaskSource> BathymetrySampler<S> {
    pub fn new(source: S, tile: TileCoord, mask_zl: u8, ratio_bathy: f64) -> Self {
        Self {
            source,
            tile,
            mask_zl,
            ratio_bathy,
            cache: HashMap::new(),
        }
    }

    /// Sample the ratio at an absolute position, `None` when no mask covers it.
    pub fn sample(&mut self, lat: f64, lon: f64) -> Option<f64> {
        let zoom = self.mask_zl;
        let (til_x, til_y) = wgs84_to_orthogrid(lat, lon, zoom);
        let source = &self.source;
        let mask = self
            .cache
            .entry((til_x, til_y))
            .or_insert_with(|| source.distance_mask(til_x, til_y, zoom))
            .as_ref()?;

        let (s, t) = st_coord_in_cell(lat, lon, til_x, til_y, zoom);
        let (w, h) = mask.dimensions();
        if w == 0 || h == 0 {
            return None;
        }
        let px = (s * (w - 1) as f64) as u32;
        let py = ((1.0 - t) * (h - 1) as f64) as u32;
        let value = mask.get_pixel(px.min(w - 1), py.min(h - 1)).0[0];
        Some(ratio_from_sample(value, self.ratio_bathy))
    }

    /// Assign ratios to every node touching water or sea.
    ///
    /// Coastal nodes get 0, others their sampled ratio or [`DEFAULT_RATIO`].
    pub fn apply(&mut self, mesh: &mut Mesh, cancel: &CancelToken) -> Result<BathymetryStats> {
        let mut stats = BathymetryStats::default();
        let (lat0, lon0) = (self.tile.lat as f64, self.tile.lon as f64);

        for (i, node) in mesh.nodes.iter_mut().enumerate() {
            if i % 4096 == 0 {
                cancel.check()?;
            }
            if node.types.0 & TypeMask::WET == 0 {
                continue;
            }
            stats.wet_nodes += 1;
            if node.coast {
                node.bathy = 0.0;
                stats.coastal += 1;
                continue;
            }
            match self.sample(node.lat() + lat0, node.lon() + lon0) {
                Some(ratio) => {
                    node.bathy = ratio;
                    stats.sampled += 1;
                }
                None => {
                    node.bathy = DEFAULT_RATIO;
                    stats.missing += 1;
                }
            }
        }

        log::info!(
            "Bathymetry: {} wet nodes, {} coastal, {} sampled, {} without mask",
            stats.wet_nodes, stats.coastal, stats.sampled, stats.missing
        );
        Ok(stats)
    }
}
