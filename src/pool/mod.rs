//! Spatial pools: quadtree partitioning of mesh nodes and the 16-bit
//! quantization each pool applies to its members.

pub mod quantize;
pub mod quadtree;

pub use quantize::{
    address, cell_index, encode_normal_x, encode_normal_y, encode_unit, AltitudeScale, AxisScale,
    FLAT_NORMAL,
};
pub use quadtree::{CellKey, Pool, PoolQuadtree, PoolSet, QuadtreeStats, MAX_DEPTH};

/// Depth of the initial uniform bucket grid.
pub const INIT_DEPTH: u8 = 3;

/// Bucket capacity for plain scenery.
pub const CAPACITY: usize = 50_000;

/// Bucket capacity when masks or bathymetry add vertex variants.
pub const CAPACITY_MASKED: usize = 35_000;
