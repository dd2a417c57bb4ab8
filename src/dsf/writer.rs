//! Assembling and saving a tile's DSF.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::Result;
use crate::geo::TileCoord;
use crate::terrain::TerrainDef;

use super::atom::{string_table, AtomTag, AtomWriter};
use super::commands::CommandWriter;
use super::pools::EncodedPools;
use super::raster::CompanionRasters;

/// Value of the `sim/creation_agent` property.
pub const CREATION_AGENT: &str = "orthodsf";

/// Everything that goes into one DSF.
pub struct DsfContent<'a> {
    pub tile: TileCoord,
    pub terrains: &'a [TerrainDef],
    pub pools: &'a EncodedPools,
    pub rasters: Option<&'a CompanionRasters>,
    /// Far LOD of overlay patches, metres
    pub overlay_lod: f32,
}

/// Sizes of the top-level atoms of an encoded file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AtomSizes {
    pub head: usize,
    pub defn: usize,
    pub geod: usize,
    pub dems: usize,
    pub cmds: usize,
    pub total: usize,
}

fn properties(tile: TileCoord) -> Vec<u8> {
    let (lat, lon) = (tile.lat, tile.lon);
    string_table([
        "sim/west".to_string(),
        lon.to_string(),
        "sim/east".to_string(),
        (lon + 1).to_string(),
        "sim/south".to_string(),
        lat.to_string(),
        "sim/north".to_string(),
        (lat + 1).to_string(),
        "sim/creation_agent".to_string(),
        CREATION_AGENT.to_string(),
    ])
}

/// Command stream: per terrain, each same-pool group and then the
/// cross-pool triangles.
pub fn encode_commands(content: &DsfContent<'_>) -> Vec<u8> {
    let mut cmds = CommandWriter::new();
    for (&terrain, patches) in &content.pools.patches {
        let overlay = content
            .terrains
            .get(terrain as usize)
            .is_some_and(|def| def.overlay);
        cmds.set_definition(terrain);
        for (&pool, slots) in &patches.same_pool {
            cmds.select_pool(pool);
            cmds.patch_flags(overlay, content.overlay_lod);
            cmds.triangles(slots);
        }
        if let Some(first) = patches.cross_pool.first() {
            cmds.select_pool(first.pool);
            cmds.patch_flags(overlay, content.overlay_lod);
            cmds.cross_pool_triangles(&patches.cross_pool);
        }
    }
    cmds.into_bytes()
}

/// Encode the complete file, checksum included.
pub fn encode_dsf(content: &DsfContent<'_>) -> Result<(Vec<u8>, AtomSizes)> {
    let mut sizes = AtomSizes::default();
    let mut w = AtomWriter::new();

    w.begin(AtomTag::HEAD);
    w.atom(AtomTag::PROP, &properties(content.tile))?;
    sizes.head = w.end()?;

    w.begin(AtomTag::DEFN);
    w.atom(AtomTag::TERT, &string_table(content.terrains.iter().map(|t| t.name.as_str())))?;
    w.atom(AtomTag::OBJT, &[])?;
    w.atom(AtomTag::POLY, &[])?;
    w.atom(AtomTag::NETW, &[])?;
    let raster_names = content.rasters.map(|r| r.names.as_slice()).unwrap_or(&[]);
    w.atom(AtomTag::DEMN, raster_names)?;
    sizes.defn = w.end()?;

    w.begin(AtomTag::GEOD);
    for pool in &content.pools.pools {
        w.begin(AtomTag::POOL);
        w.u32(pool.count() as u32);
        w.u8(pool.planes as u8);
        for plane in 0..pool.planes {
            w.u8(0);
            for point in pool.values.chunks_exact(pool.planes) {
                w.u16(point[plane]);
            }
        }
        w.end()?;
    }
    for pool in &content.pools.pools {
        w.begin(AtomTag::SCAL);
        for &(scale, offset) in &pool.scales {
            w.f32(scale);
            w.f32(offset);
        }
        w.end()?;
    }
    sizes.geod = w.end()?;

    if let Some(rasters) = content.rasters.filter(|r| !r.layers.is_empty()) {
        w.begin(AtomTag::DEMS);
        for layer in &rasters.layers {
            w.atom(AtomTag::DEMI, &layer.info_bytes())?;
            w.atom(AtomTag::DEMD, &layer.data)?;
        }
        sizes.dems = w.end()?;
    }

    sizes.cmds = w.atom(AtomTag::CMDS, &encode_commands(content))?;

    let data = w.finish()?;
    sizes.total = data.len();
    log::info!(
        "DSF atoms: HEAD {} DEFN {} GEOD {} DEMS {} CMDS {} bytes, {} bytes total",
        sizes.head, sizes.defn, sizes.geod, sizes.dems, sizes.cmds, sizes.total
    );
    Ok((data, sizes))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Path the previous version of `path` is kept at.
pub fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, ".bak")
}

/// Save `data` to `path`, keeping the previous file as `.bak`.
///
/// The file is written to `.tmp` first and renamed into place, so a
/// partially written DSF is never left at `path`.
pub fn write_dsf(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bak = backup_path(path);
    if bak.exists() {
        fs::remove_file(&bak)?;
    }
    if path.exists() {
        fs::rename(path, &bak)?;
    }
    let tmp = with_suffix(path, ".tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    log::info!("Wrote {} ({} bytes)", path.display(), data.len());
    Ok(())
}
