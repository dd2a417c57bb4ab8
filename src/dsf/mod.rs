//! The DSF container: atoms, point pools, commands and companion rasters.

pub mod atom;
pub mod commands;
pub mod pools;
pub mod raster;
pub mod reader;
pub mod writer;

pub use atom::{AtomTag, AtomWriter};
pub use commands::{decode_commands, Command, CommandWriter, PoolRef};
pub use pools::{EncodedPools, PointPoolBuilder, PointPoolData, PoolStats, TerrainPatches};
pub use raster::{CompanionRasters, RasterLayer, SampleFormat};
pub use reader::{verify, AtomInfo, AtomIter, DsfFile, PointPool};
pub use writer::{backup_path, encode_dsf, write_dsf, AtomSizes, DsfContent};
