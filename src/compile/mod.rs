//! Tile compilation pipeline.
//!
//! The stages run in order on one tile:
//! 1. Read the upstream mesh
//! 2. Recut coastal triangles along classification boundaries
//! 3. Sample bathymetry ratios (optional)
//! 4. Partition nodes into pools
//! 5. Classify triangles into terrains, queueing missing textures
//! 6. Fill point pools and encode the DSF
//! 7. Write terrain descriptors and the DSF
//!
//! Nothing under `Earth nav data` or `terrain` is written before every
//! stage has succeeded, so a cancelled or failed tile leaves the previous
//! output untouched.

pub mod config;

pub use config::CompileConfig;

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use crate::bathymetry::{BathymetrySampler, BathymetryStats, DirMaskSource};
use crate::core::{CancelToken, Result};
use crate::dsf::{
    encode_dsf, write_dsf, AtomSizes, CompanionRasters, DsfContent, PointPoolBuilder, PoolStats,
};
use crate::fetch::FetchQueue;
use crate::geo::TileCoord;
use crate::mesh::{read_mesh, recut_coastline, Mesh, RecutStats};
use crate::pool::PoolSet;
use crate::terrain::descriptor::required_resources;
use crate::terrain::{Classification, LegacyMaskOracle, TerrainClassifier, ZoneMap};

/// Summary of one compiled tile.
#[derive(Debug, Clone, Default)]
pub struct CompileReport {
    pub tile: Option<TileCoord>,
    pub dsf_path: PathBuf,
    pub recut: RecutStats,
    pub bathymetry: Option<BathymetryStats>,
    pub quad_pools: usize,
    pub point_pools: usize,
    pub terrains: usize,
    pub textures_requested: usize,
    pub masks_saved: usize,
    pub geometry: PoolStats,
    pub atoms: AtomSizes,
    pub descriptors_written: usize,
}

/// Compiles tiles of one build directory.
pub struct TileCompiler<'a> {
    config: &'a CompileConfig,
    build_dir: PathBuf,
    queue: FetchQueue,
    cancel: CancelToken,
}

impl<'a> TileCompiler<'a> {
    pub fn new(config: &'a CompileConfig, build_dir: impl Into<PathBuf>, queue: FetchQueue, cancel: CancelToken) -> Self {
        Self { config, build_dir: build_dir.into(), queue, cancel }
    }

    pub fn textures_dir(&self) -> PathBuf {
        self.build_dir.join("textures")
    }

    pub fn terrain_dir(&self) -> PathBuf {
        self.build_dir.join("terrain")
    }

    /// Mask root; relative paths are taken from the build directory.
    pub fn mask_root(&self) -> PathBuf {
        if self.config.mask_dir.is_absolute() {
            self.config.mask_dir.clone()
        } else {
            self.build_dir.join(&self.config.mask_dir)
        }
    }

    /// Compile `tile` from its mesh file in the build directory.
    ///
    /// The fetch queue always receives this producer's quit marker, whether
    /// or not compilation succeeds.
    pub fn compile(&self, tile: TileCoord) -> Result<CompileReport> {
        let result = read_mesh(&tile.mesh_path(&self.build_dir), tile, self.config.use_masks_for_inland)
            .and_then(|mesh| self.compile_mesh(tile, mesh));
        self.queue.finish();
        if let Err(e) = &result {
            log::warn!("Tile {} failed: {}", tile, e);
        }
        result
    }

    /// Run every stage after mesh loading.
    pub fn compile_mesh(&self, tile: TileCoord, mut mesh: Mesh) -> Result<CompileReport> {
        let start = Instant::now();
        let cancel = &self.cancel;
        let mut report = CompileReport {
            tile: Some(tile),
            dsf_path: tile.dsf_path(&self.build_dir),
            ..Default::default()
        };
        log::info!(
            "Compiling {}: {} nodes, {} triangles",
            tile,
            mesh.node_count(),
            mesh.triangle_count()
        );

        cancel.check()?;
        report.recut = recut_coastline(&mut mesh);
        log::info!(
            "Recut: {} coastal triangles, {} edges cut, {} nodes and {} triangles added",
            report.recut.coast_triangles,
            report.recut.cut_edges,
            report.recut.nodes_added,
            report.recut.triangles_added
        );

        if self.config.use_bathymetry {
            let source = DirMaskSource::for_tile(&self.mask_root(), tile);
            let mut sampler = BathymetrySampler::new(source, tile, self.config.mask_zl, self.config.ratio_bathy);
            report.bathymetry = Some(sampler.apply(&mut mesh, cancel)?);
        }

        cancel.check()?;
        let pools = PoolSet::build(
            &mesh,
            tile,
            self.config.quad_init_depth(),
            self.config.quad_capacity(),
        )?;
        report.quad_pools = pools.len();

        let classes = self.classify(tile, &mesh)?;
        report.terrains = classes.terrains.len();
        report.textures_requested = classes.requested.len();
        report.masks_saved = classes.masks_saved;

        let encoded = PointPoolBuilder::new(&mesh, &pools, tile, self.config).build(&classes, cancel)?;
        report.point_pools = encoded.pools.len();
        report.geometry = encoded.stats;

        let rasters = self.companion_rasters()?;
        let content = DsfContent {
            tile,
            terrains: &classes.terrains,
            pools: &encoded,
            rasters: rasters.as_ref(),
            overlay_lod: self.config.overlay_lod,
        };
        let (data, sizes) = encode_dsf(&content)?;
        report.atoms = sizes;

        cancel.check()?;
        report.descriptors_written = self.write_descriptors(&classes)?;
        write_dsf(&report.dsf_path, &data)?;

        log::info!(
            "Tile {} done in {:.2}s: {} terrains, {} point pools, {} bytes",
            tile,
            start.elapsed().as_secs_f64(),
            report.terrains,
            report.point_pools,
            report.atoms.total
        );
        Ok(report)
    }

    fn classify(&self, tile: TileCoord, mesh: &Mesh) -> Result<Classification> {
        let cfg = self.config;
        let zones = ZoneMap::new(tile, cfg.mesh_zl, cfg.default_zl, cfg.default_provider.clone(), cfg.zones.clone());
        let masks = LegacyMaskOracle::for_tile(&self.mask_root(), tile, cfg.mask_zl);
        let textures_dir = self.textures_dir();
        fs::create_dir_all(&textures_dir)?;
        TerrainClassifier::new(cfg, tile, &zones, &masks, &self.queue, textures_dir).classify(mesh, &self.cancel)
    }

    fn companion_rasters(&self) -> Result<Option<CompanionRasters>> {
        let Some(path) = &self.config.companion_dsf else {
            return Ok(None);
        };
        let mut rasters = CompanionRasters::read(path)?;
        let changed = rasters.clamp_bathymetry()?;
        log::info!(
            "Companion {}: {} raster layers, {} bathymetry samples lowered",
            path.display(),
            rasters.layers.len(),
            changed
        );
        Ok(Some(rasters))
    }

    /// Write `.ter` files and copy the shared textures they reference.
    fn write_descriptors(&self, classes: &Classification) -> Result<usize> {
        let terrain_dir = self.terrain_dir();
        fs::create_dir_all(&terrain_dir)?;
        let mut written = 0;
        for def in &classes.terrains {
            let Some((file, text)) = &def.descriptor else {
                continue;
            };
            fs::write(terrain_dir.join(file), text)?;
            written += 1;
            if let Some(resource) = required_resources(def.kind, def.style, self.config) {
                self.copy_resource(resource)?;
            }
        }
        Ok(written)
    }

    fn copy_resource(&self, name: &str) -> Result<()> {
        let target = self.textures_dir().join(name);
        if target.exists() {
            return Ok(());
        }
        let Some(resources) = &self.config.resources_dir else {
            log::debug!("No resources directory, {} not copied", name);
            return Ok(());
        };
        let source = resources.join(name);
        if source.exists() {
            fs::copy(&source, &target)?;
        } else {
            log::warn!("Resource {} not found in {}", name, resources.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;
    use crate::dsf::{backup_path, decode_commands, Command, DsfFile};
    use crate::fetch::FetchRequest;
    use crate::mesh::io::write_mesh;
    use crate::mesh::{grid_mesh, TriType};
    use tempfile::TempDir;

    fn tile() -> TileCoord {
        TileCoord::new(45, 5)
    }

    /// Land on the west half, inland water on the east, shrunk into one texture.
    fn coast_mesh() -> Mesh {
        let mut mesh = grid_mesh(4, 4, |i, _, _| if i < 2 { TriType::Land } else { TriType::Water });
        for node in &mut mesh.nodes {
            node.pos.x *= 0.02;
            node.pos.y *= 0.02;
        }
        mesh
    }

    fn config() -> CompileConfig {
        CompileConfig { default_zl: 14, ..Default::default() }
    }

    fn setup(mesh: &Mesh) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        write_mesh(&tile().mesh_path(dir.path()), mesh, tile()).unwrap();
        dir
    }

    #[test]
    fn test_compile_tile_end_to_end() {
        let mesh = coast_mesh();
        let dir = setup(&mesh);
        let cfg = config();
        let (queue, mut rx) = FetchQueue::channel();
        let compiler = TileCompiler::new(&cfg, dir.path(), queue, CancelToken::new());

        let report = compiler.compile(tile()).unwrap();
        assert_eq!(report.recut.nodes_added, 0);
        assert!(report.terrains >= 3);
        assert_eq!(report.geometry.degenerate, 0);

        let data = fs::read(&report.dsf_path).unwrap();
        assert_eq!(data.len(), report.atoms.total);
        let file = DsfFile::parse(&data).unwrap();
        assert_eq!(file.terrains.len(), report.terrains);
        assert_eq!(file.terrains[0], "terrain_Water");
        assert_eq!(file.pools.len(), report.point_pools);

        // Every triangle is drawn once textured; water triangles once more as water
        let mut drawn = 0;
        for cmd in decode_commands(&file.commands).unwrap() {
            match cmd {
                Command::Triangles(s) => drawn += s.len() / 3,
                Command::CrossPoolTriangles(c) => drawn += c.len() / 3,
                _ => {}
            }
        }
        let water = mesh.triangles.iter().filter(|t| t.kind == TriType::Water).count();
        assert_eq!(drawn, mesh.triangle_count() + water);

        // Descriptors on disk for every textured terrain
        assert_eq!(report.descriptors_written, report.terrains - 1);
        for name in &file.terrains[1..] {
            assert!(dir.path().join(name).exists(), "missing {}", name);
        }

        // Missing textures requested once each, then the quit marker
        let mut requests = Vec::new();
        while let Ok(req) = rx.try_recv() {
            requests.push(req);
        }
        assert_eq!(requests.last(), Some(&FetchRequest::Quit));
        assert_eq!(requests.len(), report.textures_requested + 1);
    }

    #[test]
    fn test_recompile_keeps_backup() {
        let mesh = coast_mesh();
        let dir = setup(&mesh);
        let cfg = config();
        let compiler = TileCompiler::new(&cfg, dir.path(), FetchQueue::detached(), CancelToken::new());
        let first = compiler.compile(tile()).unwrap();
        compiler.compile(tile()).unwrap();
        assert_eq!(fs::read(backup_path(&first.dsf_path)).unwrap(), fs::read(&first.dsf_path).unwrap());
    }

    #[test]
    fn test_cancelled_compile_writes_nothing() {
        let mesh = coast_mesh();
        let dir = setup(&mesh);
        let cfg = config();
        let cancel = CancelToken::new();
        cancel.cancel();
        let (queue, mut rx) = FetchQueue::channel();
        let compiler = TileCompiler::new(&cfg, dir.path(), queue, cancel);

        let result = compiler.compile(tile());
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!tile().dsf_path(dir.path()).exists());
        assert!(!compiler.terrain_dir().exists());
        assert_eq!(rx.try_recv().ok(), Some(FetchRequest::Quit));
    }

    #[test]
    fn test_malformed_mesh_aborts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(tile().mesh_path(dir.path()), "MeshVersionFormatted 1.3\nDimension 3\nVertices\n2\n").unwrap();
        let cfg = config();
        let (queue, mut rx) = FetchQueue::channel();
        let compiler = TileCompiler::new(&cfg, dir.path(), queue, CancelToken::new());
        assert!(matches!(compiler.compile(tile()), Err(Error::MalformedMesh { .. })));
        assert!(!tile().dsf_path(dir.path()).exists());
        assert_eq!(rx.try_recv().ok(), Some(FetchRequest::Quit));
    }

    #[test]
    fn test_resources_copied_for_water_overlays() {
        let mesh = coast_mesh();
        let dir = setup(&mesh);
        let resources = tempfile::tempdir().unwrap();
        fs::write(resources.path().join("water_transition.png"), b"png").unwrap();
        let cfg = CompileConfig {
            resources_dir: Some(resources.path().to_path_buf()),
            ..config()
        };
        let compiler = TileCompiler::new(&cfg, dir.path(), FetchQueue::detached(), CancelToken::new());
        compiler.compile(tile()).unwrap();
        assert_eq!(fs::read(compiler.textures_dir().join("water_transition.png")).unwrap(), b"png");
    }

    #[test]
    fn test_companion_rasters_spliced() {
        use crate::dsf::atom::{string_table, AtomTag, AtomWriter};
        use crate::dsf::RasterLayer;

        let layer = |values: [i16; 2]| RasterLayer {
            version: 1,
            bytes_per_pixel: 2,
            flags: 1,
            width: 2,
            height: 1,
            scale: 1.0,
            offset: 0.0,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        };
        let mut w = AtomWriter::new();
        w.begin(AtomTag::DEFN);
        w.atom(AtomTag::DEMN, &string_table(["elevation", "bathymetry"])).unwrap();
        w.end().unwrap();
        w.begin(AtomTag::DEMS);
        for l in [layer([10, 0]), layer([12, -30])] {
            w.atom(AtomTag::DEMI, &l.info_bytes()).unwrap();
            w.atom(AtomTag::DEMD, &l.data).unwrap();
        }
        w.end().unwrap();

        let mesh = coast_mesh();
        let dir = setup(&mesh);
        let companion = dir.path().join("companion.dsf");
        fs::write(&companion, w.finish().unwrap()).unwrap();

        let cfg = CompileConfig { companion_dsf: Some(companion), ..config() };
        let compiler = TileCompiler::new(&cfg, dir.path(), FetchQueue::detached(), CancelToken::new());
        let report = compiler.compile(tile()).unwrap();
        let file = DsfFile::read(&report.dsf_path).unwrap();
        assert_eq!(file.raster_names, ["elevation", "bathymetry"]);
        assert_eq!(file.rasters.len(), 2);
        assert_eq!(file.rasters[1].value(0), 8.0);
        assert_eq!(file.rasters[1].value(1), -30.0);
    }
}
