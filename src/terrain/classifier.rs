//! Assigns every triangle to terrain definitions.
//!
//! Sea triangles are scanned first, then land and inland water. Each
//! (texture, triangle type) pair gets its own terrain the first time it is
//! seen; textures that are missing or stale are pushed to the fetch queue
//! once per run.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

use image::GrayImage;

use crate::compile::config::CompileConfig;
use crate::core::{CancelToken, Error, Result};
use crate::fetch::FetchQueue;
use crate::geo::{wgs84_to_orthogrid, TextureKey, TileCoord};
use crate::mesh::{Mesh, TriType, Triangle};

use super::descriptor::{render_descriptor, terrain_file_name};
use super::{AlphaMaskOracle, Classification, Draw, TerrainDef, VertexStyle, ZoneLookup};

/// Zoom level of the low-resolution sea layer.
pub const LOW_RES_SEA_ZL: u8 = 14;
/// Provider code of the low-resolution sea layer.
pub const LOW_RES_SEA_PROVIDER: &str = "SEA";

/// Single-use classifier for one tile.
pub struct TerrainClassifier<'a> {
    config: &'a CompileConfig,
    tile: TileCoord,
    zones: &'a dyn ZoneLookup,
    masks: &'a dyn AlphaMaskOracle,
    queue: &'a FetchQueue,
    textures_dir: PathBuf,
    registry: HashMap<(TextureKey, TriType), u16>,
    unmasked: HashSet<TextureKey>,
    treated: HashSet<TextureKey>,
    cells: HashMap<(u32, u32), TextureKey>,
    out: Classification,
}

impl<'a> TerrainClassifier<'a> {
    pub fn new(
        config: &'a CompileConfig,
        tile: TileCoord,
        zones: &'a dyn ZoneLookup,
        masks: &'a dyn AlphaMaskOracle,
        queue: &'a FetchQueue,
        textures_dir: impl Into<PathBuf>,
    ) -> Self {
        let out = Classification {
            terrains: vec![TerrainDef::water()],
            ..Default::default()
        };
        Self {
            config,
            tile,
            zones,
            masks,
            queue,
            textures_dir: textures_dir.into(),
            registry: HashMap::new(),
            unmasked: HashSet::new(),
            treated: HashSet::new(),
            cells: HashMap::new(),
            out,
        }
    }

    /// Classify every triangle of `mesh`.
    pub fn classify(mut self, mesh: &Mesh, cancel: &CancelToken) -> Result<Classification> {
        let sea = mesh.triangles.iter().enumerate().filter(|(_, t)| t.kind == TriType::Sea);
        for (idx, tri) in sea {
            cancel.check()?;
            self.classify_sea(mesh, idx as u32, tri)?;
        }

        let rest = mesh.triangles.iter().enumerate().filter(|(_, t)| t.kind != TriType::Sea);
        for (idx, tri) in rest {
            cancel.check()?;
            self.classify_land_or_water(mesh, idx as u32, tri)?;
        }

        log::info!(
            "Classified {} triangles: {} terrains, {} draws, {} textures requested, {} masks",
            mesh.triangles.len(),
            self.out.terrains.len(),
            self.out.draws.len(),
            self.out.requested.len(),
            self.out.masks_saved
        );
        Ok(self.out)
    }

    /// Absolute (lat, lon) of a triangle's barycenter.
    fn centroid(&self, mesh: &Mesh, tri: &Triangle) -> (f64, f64) {
        let c = mesh.centroid(tri);
        (c.y + self.tile.lat as f64, c.x + self.tile.lon as f64)
    }

    fn texture_key(&mut self, lat: f64, lon: f64) -> TextureKey {
        let cell = wgs84_to_orthogrid(lat, lon, self.zones.mesh_zl());
        let zones = self.zones;
        self.cells
            .entry(cell)
            .or_insert_with(|| zones.texture_key(cell.0, cell.1))
            .clone()
    }

    fn draw(&mut self, tri: u32, terrain: u16) {
        self.out.draws.push(Draw { tri, terrain });
    }

    fn classify_sea(&mut self, mesh: &Mesh, idx: u32, tri: &Triangle) -> Result<()> {
        let (lat, lon) = self.centroid(mesh, tri);
        let key = self.texture_key(lat, lon);

        let existing = self.registry.get(&(key.clone(), TriType::Sea)).copied();
        let id = match existing {
            Some(id) => id,
            None if self.unmasked.contains(&key) => 0,
            None => match self.masks.mask(&key) {
                Some(mask) => {
                    let stale = self.texture_stale(&key);
                    self.save_mask(&key, &mask)?;
                    let style = if self.config.imprint_masks_to_dds {
                        VertexStyle::Shaded
                    } else {
                        VertexStyle::BorderMasked
                    };
                    let id = self.register(key.clone(), TriType::Sea, style, true)?;
                    self.request(&key, stale || self.config.imprint_masks_to_dds);
                    id
                }
                None => {
                    self.remove_mask(&key);
                    self.unmasked.insert(key);
                    0
                }
            },
        };
        if id != 0 {
            self.draw(idx, id);
        }

        if !self.config.experimental_sea() {
            self.draw(idx, 0);
        }

        if self.config.low_res_sea() {
            let (til_x, til_y) = wgs84_to_orthogrid(lat, lon, LOW_RES_SEA_ZL);
            let key = TextureKey::new(til_x, til_y, LOW_RES_SEA_ZL, LOW_RES_SEA_PROVIDER);
            let existing = self.registry.get(&(key.clone(), TriType::Sea)).copied();
            let id = match existing {
                Some(id) => id,
                None => {
                    let (style, overlay) = if self.config.experimental_sea() {
                        (VertexStyle::FlatTextured, false)
                    } else {
                        (VertexStyle::AlphaOverlay, true)
                    };
                    let id = self.register(key.clone(), TriType::Sea, style, overlay)?;
                    let missing = !self.textures_dir.join(key.dds_file_name()).exists();
                    self.request(&key, missing);
                    id
                }
            };
            self.draw(idx, id);
        }
        Ok(())
    }

    fn classify_land_or_water(&mut self, mesh: &Mesh, idx: u32, tri: &Triangle) -> Result<()> {
        let (lat, lon) = self.centroid(mesh, tri);
        let key = self.texture_key(lat, lon);
        let kind = tri.kind;

        let existing = self.registry.get(&(key.clone(), kind)).copied();
        let id = match existing {
            Some(id) => id,
            None => {
                let (style, overlay) = match kind {
                    TriType::Water if self.config.experimental_inland() => (VertexStyle::FlatTextured, false),
                    TriType::Water => (VertexStyle::AlphaOverlay, true),
                    _ => (VertexStyle::Shaded, false),
                };
                let id = self.register(key.clone(), kind, style, overlay)?;
                let stale = self.texture_stale(&key);
                self.request(&key, stale);
                id
            }
        };
        self.draw(idx, id);

        if kind == TriType::Water && !self.config.experimental_inland() {
            self.draw(idx, 0);
        }
        Ok(())
    }

    fn register(&mut self, key: TextureKey, kind: TriType, style: VertexStyle, overlay: bool) -> Result<u16> {
        let id = u16::try_from(self.out.terrains.len())
            .map_err(|_| Error::InvalidDsf("more than 65535 terrain definitions".to_string()))?;
        let file_name = terrain_file_name(&key, kind, overlay);
        let text = render_descriptor(&key, kind, style, self.config);
        log::debug!("Terrain {} -> {} ({:?}{})", id, file_name, style, if overlay { ", overlay" } else { "" });

        self.out.terrains.push(TerrainDef {
            id,
            name: format!("terrain/{file_name}"),
            key: Some(key.clone()),
            kind,
            style,
            overlay,
            descriptor: Some((file_name, text)),
        });
        self.registry.insert((key, kind), id);
        Ok(id)
    }

    /// Queue a texture the first time it is seen, if `needed`.
    fn request(&mut self, key: &TextureKey, needed: bool) {
        if !self.treated.insert(key.clone()) {
            return;
        }
        if needed {
            self.queue.request(key.clone());
            self.out.requested.push(key.clone());
        } else {
            log::debug!("Texture {} already present", key.dds_file_name());
        }
    }

    /// Texture missing, or older than its mask.
    fn texture_stale(&self, key: &TextureKey) -> bool {
        let dds = self.textures_dir.join(key.dds_file_name());
        let Ok(dds_time) = fs::metadata(&dds).and_then(|m| m.modified()) else {
            return true;
        };
        let mask = self.textures_dir.join(key.mask_file_name());
        match fs::metadata(&mask).and_then(|m| m.modified()) {
            Ok(mask_time) => mask_time > dds_time,
            Err(_) => false,
        }
    }

    fn save_mask(&mut self, key: &TextureKey, mask: &GrayImage) -> Result<()> {
        fs::create_dir_all(&self.textures_dir)?;
        mask.save(self.textures_dir.join(key.mask_file_name()))?;
        self.out.masks_saved += 1;
        Ok(())
    }

    fn remove_mask(&self, key: &TextureKey) {
        let path = self.textures_dir.join(key.mask_file_name());
        if path.exists() {
            match fs::remove_file(&path) {
                Ok(()) => log::debug!("Removed stale mask {}", path.display()),
                Err(e) => log::warn!("Could not remove stale mask {}: {}", path.display(), e),
            }
        }
    }
}
