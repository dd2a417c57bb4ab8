//! Point pools of the output file and the triangle patches addressing them.
//!
//! Every quadtree pool feeds three point pools, one per vertex layout:
//! 7 planes (shaded and flat textured), 9 planes (border masked and alpha
//! overlay) and 5 planes (built-in water). Textured vertices are shared
//! between triangles of the same terrain when they quantize to the same
//! (x, y) in the same pool; water vertices are shared per mesh node.

use std::collections::{BTreeMap, HashMap};

use crate::compile::config::CompileConfig;
use crate::core::{CancelToken, Error, Result};
use crate::geo::{st_coord, TextureKey, TileCoord};
use crate::mesh::Mesh;
use crate::pool::{encode_normal_x, encode_normal_y, encode_unit, PoolSet, FLAT_NORMAL};
use crate::terrain::{Classification, VertexStyle};

use super::commands::PoolRef;

/// Point pools derived from each quadtree pool.
pub const BANKS: usize = 3;
/// Plane count of each bank.
pub const BANK_PLANES: [usize; BANKS] = [7, 9, 5];

const MAX_POINTS: usize = 1 << 16;

/// A finished point pool.
#[derive(Debug, Clone, PartialEq)]
pub struct PointPoolData {
    pub planes: usize,
    /// Point-major values, `planes` per point
    pub values: Vec<u16>,
    /// `(scale, offset)` per plane
    pub scales: Vec<(f32, f32)>,
}

impl PointPoolData {
    pub fn count(&self) -> usize {
        self.values.len() / self.planes
    }

    /// Raw values of point `i`.
    pub fn point(&self, i: usize) -> &[u16] {
        &self.values[i * self.planes..(i + 1) * self.planes]
    }
}

/// Triangles of one terrain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerrainPatches {
    /// Slots by pool, for triangles whose corners share a pool
    pub same_pool: BTreeMap<u16, Vec<u16>>,
    /// Corners of triangles spanning pools
    pub cross_pool: Vec<PoolRef>,
}

impl TerrainPatches {
    pub fn is_empty(&self) -> bool {
        self.same_pool.is_empty() && self.cross_pool.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        (self.same_pool.values().map(Vec::len).sum::<usize>() + self.cross_pool.len()) / 3
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub vertices: usize,
    pub triangles: usize,
    pub cross_pool: usize,
    pub degenerate: usize,
}

/// Point pools and patches ready for encoding.
#[derive(Debug, Clone, Default)]
pub struct EncodedPools {
    pub pools: Vec<PointPoolData>,
    /// By terrain id, terrains without triangles omitted
    pub patches: BTreeMap<u16, TerrainPatches>,
    pub stats: PoolStats,
}

type Provisional = (u32, u16);

#[derive(Default)]
struct ProvisionalPatches {
    same_pool: BTreeMap<u32, Vec<u16>>,
    cross_pool: Vec<Provisional>,
}

/// Fills the point pools of one tile.
pub struct PointPoolBuilder<'a> {
    mesh: &'a Mesh,
    pools: &'a PoolSet,
    tile: TileCoord,
    config: &'a CompileConfig,
    /// Indexed `bank * pool_count + pool`
    banks: Vec<Vec<u16>>,
    textured: HashMap<(u32, u16, u16, u16), Provisional>,
    water: HashMap<(u32, u16, u16), Provisional>,
    patches: BTreeMap<u16, ProvisionalPatches>,
    stats: PoolStats,
}

impl<'a> PointPoolBuilder<'a> {
    pub fn new(mesh: &'a Mesh, pools: &'a PoolSet, tile: TileCoord, config: &'a CompileConfig) -> Self {
        Self {
            mesh,
            pools,
            tile,
            config,
            banks: vec![Vec::new(); BANKS * pools.len()],
            textured: HashMap::new(),
            water: HashMap::new(),
            patches: BTreeMap::new(),
            stats: PoolStats::default(),
        }
    }

    /// Place every draw of `classes`, then drop empty pools and renumber.
    pub fn build(mut self, classes: &Classification, cancel: &CancelToken) -> Result<EncodedPools> {
        for (i, draw) in classes.draws.iter().enumerate() {
            if i % 4096 == 0 {
                cancel.check()?;
            }
            let def = classes.terrain(draw.terrain);
            let tri = self.mesh.triangles[draw.tri as usize];
            let [n1, n2, n3] = tri.nodes;
            // Renderer winding
            let mut corners = [(0u32, 0u16); 3];
            for (corner, n) in corners.iter_mut().zip([n1, n3, n2]) {
                *corner = self.vertex(n, draw.terrain, def.style, def.key.as_ref())?;
            }
            self.add_triangle(draw.terrain, corners);
        }
        self.finish()
    }

    fn add_triangle(&mut self, terrain: u16, [a, b, c]: [Provisional; 3]) {
        if a == b || b == c || c == a {
            self.stats.degenerate += 1;
            return;
        }
        self.stats.triangles += 1;
        let patches = self.patches.entry(terrain).or_default();
        if a.0 == b.0 && b.0 == c.0 {
            patches.same_pool.entry(a.0).or_default().extend([a.1, b.1, c.1]);
        } else {
            self.stats.cross_pool += 1;
            patches.cross_pool.extend([a, b, c]);
        }
    }

    /// Pool and slot of node `n` drawn with `terrain`, adding it if new.
    fn vertex(
        &mut self,
        n: u32,
        terrain: u16,
        style: VertexStyle,
        key: Option<&TextureKey>,
    ) -> Result<Provisional> {
        let pool = self.pools.node_pool[n as usize];
        let [ix, iy, iz] = self.pools.node_coords[n as usize];

        let existing = match style {
            VertexStyle::Water => self.water.get(&(pool, ix, iy)),
            _ => self.textured.get(&(pool, ix, iy, terrain)),
        };
        if let Some(&found) = existing {
            return Ok(found);
        }

        let node = self.mesh.node(n);
        let (s, t) = match key {
            Some(key) => {
                let lat = node.lat() + self.tile.lat as f64;
                let lon = node.lon() + self.tile.lon as f64;
                let (s, t) = st_coord(lat, lon, key);
                (encode_unit(s), encode_unit(t))
            }
            None => (0, 0),
        };
        let strength = self.config.normal_map_strength;
        let (nx, ny) = (
            encode_normal_x(node.normal.x, strength),
            encode_normal_y(node.normal.y, strength),
        );
        let ratio = if self.config.use_bathymetry {
            node.bathy
        } else {
            self.config.ratio_water
        };

        let values = match style {
            VertexStyle::Shaded => vec![ix, iy, iz, nx, ny, s, t],
            VertexStyle::FlatTextured => vec![ix, iy, iz, FLAT_NORMAL, FLAT_NORMAL, s, t],
            VertexStyle::BorderMasked => vec![ix, iy, iz, nx, ny, s, t, s, t],
            VertexStyle::AlphaOverlay => {
                vec![ix, iy, iz, FLAT_NORMAL, FLAT_NORMAL, s, t, 0, encode_unit(ratio)]
            }
            VertexStyle::Water => vec![ix, iy, iz, FLAT_NORMAL, FLAT_NORMAL],
        };
        debug_assert_eq!(values.len(), style.planes());

        let index = style.bank() * self.pools.len() + pool as usize;
        let bank = &mut self.banks[index];
        let slot = bank.len() / style.planes();
        if slot >= MAX_POINTS {
            return Err(Error::PoolOverflow { pool: index, len: slot + 1 });
        }
        bank.extend_from_slice(&values);
        self.stats.vertices += 1;

        let placed = (index as u32, slot as u16);
        match style {
            VertexStyle::Water => self.water.insert((pool, ix, iy), placed),
            _ => self.textured.insert((pool, ix, iy, terrain), placed),
        };
        Ok(placed)
    }

    fn finish(self) -> Result<EncodedPools> {
        let pool_count = self.pools.len();
        let mut renumber = vec![None; self.banks.len()];
        let mut out = Vec::new();

        for (index, values) in self.banks.into_iter().enumerate() {
            if values.is_empty() {
                continue;
            }
            let final_index = u16::try_from(out.len())
                .map_err(|_| Error::PoolOverflow { pool: index, len: out.len() + 1 })?;
            renumber[index] = Some(final_index);

            let bank = index / pool_count;
            let pool = &self.pools.pools[index % pool_count];
            let planes = BANK_PLANES[bank];
            let mut scales = vec![
                (pool.x.scale as f32, pool.x.offset as f32),
                (pool.y.scale as f32, pool.y.offset as f32),
                (pool.z.scale as f32, pool.z.alt_min as f32),
                (2.0, -1.0),
                (2.0, -1.0),
            ];
            scales.resize(planes, (1.0, 0.0));
            out.push(PointPoolData { planes, values, scales });
        }

        let lookup = |index: u32| -> Result<u16> {
            renumber
                .get(index as usize)
                .copied()
                .flatten()
                .ok_or_else(|| Error::InvalidDsf(format!("triangle references empty pool {}", index)))
        };

        let mut patches = BTreeMap::new();
        for (terrain, provisional) in self.patches {
            let mut done = TerrainPatches::default();
            for (index, slots) in provisional.same_pool {
                done.same_pool.insert(lookup(index)?, slots);
            }
            for (index, slot) in provisional.cross_pool {
                done.cross_pool.push(PoolRef { pool: lookup(index)?, slot });
            }
            if !done.is_empty() {
                patches.insert(terrain, done);
            }
        }

        log::info!(
            "Point pools: {} of {} non-empty, {} vertices, {} triangles ({} cross-pool, {} degenerate dropped)",
            out.len(),
            BANKS * pool_count,
            self.stats.vertices,
            self.stats.triangles,
            self.stats.cross_pool,
            self.stats.degenerate
        );
        Ok(EncodedPools { pools: out, patches, stats: self.stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{grid_mesh, Node, TriType, Triangle};
    use crate::terrain::{Draw, TerrainDef};
    use glam::{DVec2, DVec3};

    fn tile() -> TileCoord {
        TileCoord::new(45, 5)
    }

    fn textured(id: u16, style: VertexStyle, overlay: bool) -> TerrainDef {
        TerrainDef {
            id,
            name: format!("terrain/t{}.ter", id),
            key: Some(TextureKey::new(8448, 5888, 14, "BI")),
            kind: TriType::Land,
            style,
            overlay,
            descriptor: None,
        }
    }

    fn classes(mesh: &Mesh, terrains: Vec<TerrainDef>, pick: impl Fn(&Triangle) -> u16) -> Classification {
        let draws = mesh
            .triangles
            .iter()
            .enumerate()
            .map(|(i, t)| Draw { tri: i as u32, terrain: pick(t) })
            .collect();
        Classification { terrains, draws, ..Default::default() }
    }

    /// Shrink a unit-tile grid into the first 1/8 cell.
    fn in_one_cell(mut mesh: Mesh) -> Mesh {
        for node in &mut mesh.nodes {
            node.pos.x *= 0.1;
            node.pos.y *= 0.1;
        }
        mesh
    }

    fn build(mesh: &Mesh, classes: &Classification, capacity: usize) -> EncodedPools {
        let config = CompileConfig::default();
        let pools = PoolSet::build(mesh, tile(), 3, capacity).unwrap();
        PointPoolBuilder::new(mesh, &pools, tile(), &config)
            .build(classes, &CancelToken::new())
            .unwrap()
    }

    #[test]
    fn test_shared_vertices_deduplicated() {
        let mesh = in_one_cell(grid_mesh(4, 4, |_, _, _| TriType::Land));
        let classes = classes(&mesh, vec![TerrainDef::water(), textured(1, VertexStyle::Shaded, false)], |_| 1);
        let out = build(&mesh, &classes, 1000);

        assert_eq!(out.pools.len(), 1);
        assert_eq!(out.pools[0].planes, 7);
        assert_eq!(out.pools[0].count(), mesh.node_count());
        assert_eq!(out.stats.triangles, mesh.triangle_count());
        assert_eq!(out.patches[&1].same_pool[&0].len(), 3 * mesh.triangle_count());
        assert!(out.patches[&1].cross_pool.is_empty());
    }

    #[test]
    fn test_water_and_textured_use_separate_banks() {
        let mesh = in_one_cell(grid_mesh(2, 2, |_, _, _| TriType::Water));
        let terrains = vec![TerrainDef::water(), textured(1, VertexStyle::AlphaOverlay, true)];
        let mut classes = classes(&mesh, terrains, |_| 1);
        let extra: Vec<Draw> = (0..mesh.triangle_count() as u32)
            .map(|tri| Draw { tri, terrain: 0 })
            .collect();
        classes.draws.extend(extra);

        let out = build(&mesh, &classes, 1000);
        let planes: Vec<usize> = out.pools.iter().map(|p| p.planes).collect();
        assert_eq!(planes, [9, 5]);
        assert_eq!(out.patches.keys().copied().collect::<Vec<_>>(), [0, 1]);
        assert_eq!(out.patches[&1].same_pool.keys().copied().collect::<Vec<_>>(), [0]);
        assert_eq!(out.patches[&0].same_pool.keys().copied().collect::<Vec<_>>(), [1]);

        let water = &out.pools[1];
        assert_eq!(&water.point(0)[3..], &[FLAT_NORMAL, FLAT_NORMAL]);
        let overlay = &out.pools[0];
        let ratio = encode_unit(CompileConfig::default().ratio_water);
        assert!((0..overlay.count()).all(|i| overlay.point(i)[8] == ratio && overlay.point(i)[7] == 0));
    }

    #[test]
    fn test_corner_order_reverses_winding() {
        let mesh = in_one_cell(grid_mesh(1, 1, |_, _, upper| if upper { TriType::Water } else { TriType::Land }));
        let classes = classes(&mesh, vec![TerrainDef::water(), textured(1, VertexStyle::Shaded, false)], |t| {
            if t.kind == TriType::Land { 1 } else { 0 }
        });
        let out = build(&mesh, &classes, 1000);
        // Vertices are created in (n1, n3, n2) order, so the first triangle reads 0, 1, 2
        assert_eq!(out.patches[&1].same_pool[&0], vec![0, 1, 2]);
        let pool = &out.pools[0];
        let coords = PoolSet::build(&mesh, tile(), 3, 1000).unwrap().node_coords;
        let lower = mesh.triangles[0].nodes;
        for (slot, n) in [lower[0], lower[2], lower[1]].into_iter().enumerate() {
            let [ix, iy, _] = coords[n as usize];
            assert_eq!(&pool.point(slot)[..2], &[ix, iy]);
        }
    }

    /// Triangles (0, 1, 2) and (3, 1, 0) where node 3 sits within a
    /// quantization step of node 0.
    fn collapsing_mesh(kind: TriType) -> Mesh {
        let mut mesh = Mesh::new(Vec::new(), Vec::new());
        let n = |lon: f64, lat: f64| Node::new(DVec3::new(lon, lat, 0.0), DVec2::ZERO);
        mesh.add_node(n(0.01, 0.01));
        mesh.add_node(n(0.02, 0.01));
        mesh.add_node(n(0.02, 0.02));
        mesh.add_node(n(0.01 + 1e-9, 0.01 + 1e-9));
        mesh.add_triangle(Triangle::new(0, 1, 2, kind));
        mesh.add_triangle(Triangle::new(3, 1, 0, kind));
        mesh
    }

    #[test]
    fn test_degenerate_triangle_dropped() {
        let mesh = collapsing_mesh(TriType::Land);
        let classes = classes(&mesh, vec![TerrainDef::water(), textured(1, VertexStyle::Shaded, false)], |_| 1);
        let out = build(&mesh, &classes, 1000);
        assert_eq!(out.stats.degenerate, 1);
        assert_eq!(out.stats.triangles, 1);
        assert_eq!(out.patches[&1].triangle_count(), 1);
    }

    #[test]
    fn test_degenerate_water_triangle_dropped() {
        let mesh = collapsing_mesh(TriType::Water);
        let classes = classes(&mesh, vec![TerrainDef::water()], |_| 0);
        let out = build(&mesh, &classes, 1000);
        assert_eq!(out.stats.degenerate, 1);
        assert_eq!(out.stats.triangles, 1);
        assert_eq!(out.stats.vertices, 3);
        assert_eq!(out.patches[&0].triangle_count(), 1);
        assert_eq!(out.pools.len(), 1);
        assert_eq!(out.pools[0].planes, 5);
        assert_eq!(out.pools[0].count(), 3);
    }

    #[test]
    fn test_degenerate_dropped_for_every_textured_style() {
        for (style, overlay) in [
            (VertexStyle::Shaded, false),
            (VertexStyle::FlatTextured, false),
            (VertexStyle::BorderMasked, true),
            (VertexStyle::AlphaOverlay, true),
        ] {
            let mesh = collapsing_mesh(TriType::Water);
            let classes = classes(&mesh, vec![TerrainDef::water(), textured(1, style, overlay)], |_| 1);
            let out = build(&mesh, &classes, 1000);
            assert_eq!(out.stats.degenerate, 1, "{:?}", style);
            assert_eq!(out.patches[&1].triangle_count(), 1, "{:?}", style);
            assert_eq!(out.pools[0].planes, style.planes(), "{:?}", style);
        }
    }

    #[test]
    fn test_corner_shared_across_terrains_kept() {
        let mesh = in_one_cell(grid_mesh(1, 1, |_, _, _| TriType::Land));
        let terrains = vec![
            TerrainDef::water(),
            textured(1, VertexStyle::Shaded, false),
            textured(2, VertexStyle::Shaded, false),
        ];
        let classes = classes(&mesh, terrains, |_| 0);
        let classes = Classification {
            draws: vec![Draw { tri: 0, terrain: 1 }, Draw { tri: 1, terrain: 2 }],
            ..classes
        };
        let out = build(&mesh, &classes, 1000);
        assert_eq!(out.stats.degenerate, 0);
        assert_eq!(out.stats.triangles, 2);
        // The diagonal's two nodes get one vertex per terrain
        assert_eq!(out.stats.vertices, 6);
        assert_eq!(out.patches[&1].triangle_count(), 1);
        assert_eq!(out.patches[&2].triangle_count(), 1);
    }

    #[test]
    fn test_cross_pool_triangles_and_renumbering() {
        let mesh = in_one_cell(grid_mesh(16, 16, |_, _, _| TriType::Land));
        let classes = classes(&mesh, vec![TerrainDef::water(), textured(1, VertexStyle::Shaded, false)], |_| 1);
        let out = build(&mesh, &classes, 40);

        let patches = &out.patches[&1];
        assert!(!patches.cross_pool.is_empty());
        assert_eq!(patches.triangle_count(), mesh.triangle_count());
        assert_eq!(out.stats.cross_pool, patches.cross_pool.len() / 3);
        // Renumbered densely
        let max_ref = patches
            .cross_pool
            .iter()
            .map(|c| c.pool)
            .chain(patches.same_pool.keys().copied())
            .max()
            .unwrap();
        assert!((max_ref as usize) < out.pools.len());
        for c in &patches.cross_pool {
            assert!((c.slot as usize) < out.pools[c.pool as usize].count());
        }
        for pool in &out.pools {
            assert_eq!(pool.scales.len(), pool.planes);
            assert_eq!(pool.scales[3], (2.0, -1.0));
            assert_eq!(pool.scales[6], (1.0, 0.0));
        }
    }

    #[test]
    fn test_cancelled_build() {
        let mesh = grid_mesh(2, 2, |_, _, _| TriType::Land);
        let classes = classes(&mesh, vec![TerrainDef::water(), textured(1, VertexStyle::Shaded, false)], |_| 1);
        let config = CompileConfig::default();
        let pools = PoolSet::build(&mesh, tile(), 3, 100).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = PointPoolBuilder::new(&mesh, &pools, tile(), &config).build(&classes, &cancel);
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
