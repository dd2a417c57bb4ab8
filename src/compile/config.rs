//! Per-tile compilation settings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::Result;
use crate::pool::{CAPACITY, CAPACITY_MASKED, INIT_DEPTH};
use crate::terrain::Zone;

/// `experimental_water` bit: inland water drawn as physical normal-mapped terrain.
pub const EXPERIMENTAL_INLAND: u8 = 1;
/// `experimental_water` bit: sea drawn as physical normal-mapped terrain.
pub const EXPERIMENTAL_SEA: u8 = 2;

/// Settings for compiling one tile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    /// Zoom level of the mesh grid cells used for zone lookup
    pub mesh_zl: u8,
    /// Zoom level of the mask rasters
    pub mask_zl: u8,
    /// Zoom level of textures outside any zone
    pub default_zl: u8,
    /// Imagery provider outside any zone
    pub default_provider: String,
    /// Texture zones, first listed wins
    pub zones: Vec<Zone>,
    /// Treat inland water like sea
    pub use_masks_for_inland: bool,
    /// Alpha masks are baked into the textures
    pub imprint_masks_to_dds: bool,
    /// Add a low-resolution textured layer over the sea
    pub add_low_res_sea_ovl: bool,
    /// Bit field of [`EXPERIMENTAL_INLAND`] and [`EXPERIMENTAL_SEA`]
    pub experimental_water: u8,
    /// Constant transparency of water overlays
    pub ratio_water: f64,
    /// Use sampled bathymetry ratios on water overlays
    pub use_bathymetry: bool,
    /// Scale applied to distance mask samples
    pub ratio_bathy: f64,
    pub normal_map_strength: f64,
    pub terrain_casts_shadows: bool,
    /// Far draw distance of overlay patches in metres
    pub overlay_lod: f32,
    pub use_decal_on_terrain: bool,
    /// Root directory of mask rasters
    pub mask_dir: PathBuf,
    /// Existing DSF whose raster layers are carried over
    pub companion_dsf: Option<PathBuf>,
    /// Directory holding shared resource textures
    pub resources_dir: Option<PathBuf>,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            mesh_zl: 19,
            mask_zl: 14,
            default_zl: 16,
            default_provider: "BI".to_string(),
            zones: Vec::new(),
            use_masks_for_inland: false,
            imprint_masks_to_dds: false,
            add_low_res_sea_ovl: false,
            experimental_water: 0,
            ratio_water: 0.25,
            use_bathymetry: false,
            ratio_bathy: 0.1,
            normal_map_strength: 1.0,
            terrain_casts_shadows: true,
            overlay_lod: 25000.0,
            use_decal_on_terrain: false,
            mask_dir: PathBuf::from("Masks"),
            companion_dsf: None,
            resources_dir: None,
        }
    }
}

impl CompileConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Quadtree bucket capacity. Masked and bathymetric water adds vertex
    /// variants per node, so pools are kept smaller.
    pub fn quad_capacity(&self) -> usize {
        if self.add_low_res_sea_ovl || self.use_masks_for_inland || self.use_bathymetry {
            CAPACITY_MASKED
        } else {
            CAPACITY
        }
    }

    pub fn quad_init_depth(&self) -> u8 {
        INIT_DEPTH
    }

    pub fn experimental_inland(&self) -> bool {
        self.experimental_water & EXPERIMENTAL_INLAND != 0
    }

    pub fn experimental_sea(&self) -> bool {
        self.experimental_water & EXPERIMENTAL_SEA != 0
    }

    /// Whether sea triangles get the low-resolution layer.
    pub fn low_res_sea(&self) -> bool {
        self.add_low_res_sea_ovl || self.experimental_sea()
    }
}
