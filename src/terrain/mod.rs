//! Terrain classification: which texture and draw style every triangle uses.

pub mod zone;
pub mod mask;
pub mod descriptor;
pub mod classifier;

use crate::geo::TextureKey;
use crate::mesh::TriType;

pub use zone::{Zone, ZoneLookup, ZoneMap};
pub use mask::{AlphaMaskOracle, LegacyMaskOracle, NoMasks};
pub use descriptor::{render_descriptor, terrain_file_name};
pub use classifier::TerrainClassifier;

/// Name of the built-in water terrain, always definition 0.
pub const WATER_TERRAIN: &str = "terrain_Water";

/// Vertex layout of a terrain's patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexStyle {
    /// x, y, z, nx, ny, s, t
    Shaded,
    /// x, y, z, flat, flat, s, t
    FlatTextured,
    /// x, y, z, nx, ny, s, t, s, t
    BorderMasked,
    /// x, y, z, flat, flat, s, t, 0, ratio
    AlphaOverlay,
    /// x, y, z, flat, flat
    Water,
}

impl VertexStyle {
    pub fn planes(self) -> usize {
        match self {
            VertexStyle::Shaded | VertexStyle::FlatTextured => 7,
            VertexStyle::BorderMasked | VertexStyle::AlphaOverlay => 9,
            VertexStyle::Water => 5,
        }
    }

    /// Which of the three point pool banks holds vertices of this style.
    pub fn bank(self) -> usize {
        match self {
            VertexStyle::Shaded | VertexStyle::FlatTextured => 0,
            VertexStyle::BorderMasked | VertexStyle::AlphaOverlay => 1,
            VertexStyle::Water => 2,
        }
    }
}

/// One terrain definition of the output file.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainDef {
    pub id: u16,
    /// Entry of the terrain table, e.g. `terrain/23000_34000_BI16.ter`
    pub name: String,
    /// Texture covering the terrain, `None` for the built-in water
    pub key: Option<TextureKey>,
    pub kind: TriType,
    pub style: VertexStyle,
    pub overlay: bool,
    /// `.ter` file name and contents
    pub descriptor: Option<(String, String)>,
}

impl TerrainDef {
    /// Definition 0.
    pub fn water() -> Self {
        Self {
            id: 0,
            name: WATER_TERRAIN.to_string(),
            key: None,
            kind: TriType::Sea,
            style: VertexStyle::Water,
            overlay: false,
            descriptor: None,
        }
    }
}

/// A triangle drawn with a terrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Draw {
    pub tri: u32,
    pub terrain: u16,
}

/// Output of classifying a mesh.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Indexed by terrain id
    pub terrains: Vec<TerrainDef>,
    /// In scan order
    pub draws: Vec<Draw>,
    /// Textures pushed to the fetch queue
    pub requested: Vec<TextureKey>,
    pub masks_saved: usize,
}

impl Classification {
    pub fn terrain(&self, id: u16) -> &TerrainDef {
        &self.terrains[id as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_layout() {
        assert_eq!(VertexStyle::Shaded.planes(), 7);
        assert_eq!(VertexStyle::BorderMasked.planes(), 9);
        assert_eq!(VertexStyle::Water.planes(), 5);
        assert_eq!(VertexStyle::FlatTextured.bank(), VertexStyle::Shaded.bank());
        assert_eq!(VertexStyle::AlphaOverlay.bank(), 1);
        assert_eq!(TerrainDef::water().name, "terrain_Water");
    }
}
