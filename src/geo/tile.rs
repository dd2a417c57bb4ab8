//! Tile coordinates, texture keys and the deterministic file layout of a build.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A 1x1 degree scenery tile, identified by its south-west corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub lat: i32,
    pub lon: i32,
}

impl TileCoord {
    pub fn new(lat: i32, lon: i32) -> Self {
        Self { lat, lon }
    }

    /// Short name, e.g. `+45+006`.
    pub fn short_name(&self) -> String {
        format!("{:+03}{:+04}", self.lat, self.lon)
    }

    /// Name of the 10x10 degree directory holding this tile, e.g. `+40+000`.
    pub fn round_name(&self) -> String {
        format!(
            "{:+03}{:+04}",
            self.lat.div_euclid(10) * 10,
            self.lon.div_euclid(10) * 10
        )
    }

    /// Relative path `+40+000/+45+006`.
    pub fn long_name(&self) -> PathBuf {
        Path::new(&self.round_name()).join(self.short_name())
    }

    /// Output DSF path inside a build directory.
    pub fn dsf_path(&self, build_dir: &Path) -> PathBuf {
        build_dir
            .join("Earth nav data")
            .join(self.long_name())
            .with_extension("dsf")
    }

    /// Upstream mesh file inside a build directory.
    pub fn mesh_path(&self, build_dir: &Path) -> PathBuf {
        build_dir.join(format!("Data{}.mesh", self.short_name()))
    }

    /// Per-tile directory of mask rasters.
    pub fn mask_dir(&self, mask_root: &Path) -> PathBuf {
        mask_root.join(self.long_name())
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// Texture attributes: a 16-aligned orthophoto cell at a zoom level from a provider.
///
/// This is also the work item pushed to the texture downloader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextureKey {
    pub til_x: u32,
    pub til_y: u32,
    pub zoom: u8,
    pub provider: String,
}

impl TextureKey {
    pub fn new(til_x: u32, til_y: u32, zoom: u8, provider: impl Into<String>) -> Self {
        Self { til_x, til_y, zoom, provider: provider.into() }
    }

    /// Compressed texture file name, e.g. `23000_34000_BI16.dds`.
    pub fn dds_file_name(&self) -> String {
        format!("{}_{}_{}{}.dds", self.til_y, self.til_x, self.provider, self.zoom)
    }

    /// Alpha mask file name stored next to the textures, e.g. `23000_34000_ZL16.png`.
    pub fn mask_file_name(&self) -> String {
        format!("{}_{}_ZL{}.png", self.til_y, self.til_x, self.zoom)
    }
}

impl fmt::Display for TextureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}{}", self.til_y, self.til_x, self.provider, self.zoom)
    }
}

/// Legacy full-size mask at the mask zoom level.
pub fn legacy_mask_file_name(til_x: u32, til_y: u32) -> String {
    format!("{}_{}.png", til_y, til_x)
}

/// Pre-rendered coastal distance raster at the mask zoom level.
pub fn distance_mask_file_name(til_x: u32, til_y: u32, zoom: u8) -> String {
    format!("{}_{}_ZL{}_distance.png", til_y, til_x, zoom)
}
