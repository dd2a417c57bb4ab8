//! Shallow-water blend ratios sampled from coastal distance rasters.
//!
//! Distance masks are pre-rendered 8-bit grayscale images, one per
//! orthophoto grid cell at the mask zoom level. Brighter pixels are further
//! from the coast.

pub mod sampler;

use std::path::{Path, PathBuf};

use image::GrayImage;

use crate::geo::{distance_mask_file_name, TileCoord};

pub use sampler::{ratio_from_sample, BathymetrySampler, BathymetryStats};

/// Source of distance mask rasters.
pub trait MaskSource: Send + Sync {
    /// Load the distance mask of the grid cell (til_x, til_y) at `zoom`.
    ///
    /// Returns `None` when no usable mask exists.
    fn distance_mask(&self, til_x: u32, til_y: u32, zoom: u8) -> Option<GrayImage>;
}

/// Reads distance masks from a tile's mask directory.
#[derive(Debug, Clone)]
pub struct DirMaskSource {
    dir: PathBuf,
}

impl DirMaskSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Mask directory of `tile` under the mask root.
    pub fn for_tile(mask_root: &Path, tile: TileCoord) -> Self {
        Self::new(tile.mask_dir(mask_root))
    }

    pub fn path(&self, til_x: u32, til_y: u32, zoom: u8) -> PathBuf {
        self.dir.join(distance_mask_file_name(til_x, til_y, zoom))
    }
}

impl MaskSource for DirMaskSource {
    fn distance_mask(&self, til_x: u32, til_y: u32, zoom: u8) -> Option<GrayImage> {
        let path = self.path(til_x, til_y, zoom);
        if !path.exists() {
            log::debug!("No distance mask at {}", path.display());
            return None;
        }
        match image::open(&path) {
            Ok(img) => Some(img.to_luma8()),
            Err(e) => {
                log::debug!("Unreadable distance mask {}: {}", path.display(), e);
                None
            }
        }
    }
}
