//! Bounded-capacity quadtree partitioning mesh nodes into pools.
//!
//! The tile starts as a uniform grid of `4^init_depth` buckets. A bucket that
//! reaches capacity is split into its four children and the insertion retries
//! one level deeper, so buckets only ever subdivide where nodes are dense.

use std::collections::BTreeMap;

use crate::core::{Error, Result};
use crate::geo::TileCoord;
use crate::mesh::Mesh;

use super::quantize::{address, cell_index, AltitudeScale, AxisScale};

/// Deepest cell a bucket can be split into. Below this the 16-bit planes
/// would carry less precision than the 32-bit addresses.
pub const MAX_DEPTH: u8 = 16;

/// A quadtree cell: `x`, `y` index the `2^depth` columns and rows of the tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub depth: u8,
    pub x: u32,
    pub y: u32,
}

impl CellKey {
    pub fn new(depth: u8, x: u32, y: u32) -> Self {
        Self { depth, x, y }
    }

    /// Cell holding the address pair at `depth`.
    pub fn containing(addr: (u32, u32), depth: u8) -> Self {
        Self::new(depth, cell_index(addr.0, depth), cell_index(addr.1, depth))
    }

    pub fn children(&self) -> [CellKey; 4] {
        let (d, x, y) = (self.depth + 1, self.x * 2, self.y * 2);
        [
            CellKey::new(d, x, y),
            CellKey::new(d, x, y + 1),
            CellKey::new(d, x + 1, y),
            CellKey::new(d, x + 1, y + 1),
        ]
    }
}

/// Bucket statistics, logged after partitioning.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QuadtreeStats {
    pub buckets: usize,
    pub average_depth: f64,
    pub average_size: f64,
    pub max_depth: u8,
}

/// Quadtree of node buckets keyed by cell.
#[derive(Debug, Clone)]
pub struct PoolQuadtree {
    capacity: usize,
    init_depth: u8,
    buckets: BTreeMap<CellKey, Vec<u32>>,
    addresses: Vec<(u32, u32)>,
}

impl PoolQuadtree {
    /// Create a uniform grid of empty buckets at `init_depth`.
    pub fn new(init_depth: u8, capacity: usize) -> Self {
        let side = 1u32 << init_depth;
        let mut buckets = BTreeMap::new();
        for x in 0..side {
            for y in 0..side {
                buckets.insert(CellKey::new(init_depth, x, y), Vec::new());
            }
        }
        Self {
            capacity: capacity.max(1),
            init_depth,
            buckets,
            addresses: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of inserted nodes.
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    fn leaf_containing(&self, addr: (u32, u32), from: u8) -> Result<CellKey> {
        (from..=MAX_DEPTH)
            .map(|depth| CellKey::containing(addr, depth))
            .find(|key| self.buckets.contains_key(key))
            .ok_or_else(|| Error::Partition(format!("no bucket holds address {:08x},{:08x}", addr.0, addr.1)))
    }

    fn split(&mut self, key: CellKey) {
        let Some(members) = self.buckets.remove(&key) else {
            return;
        };
        for child in key.children() {
            self.buckets.insert(child, Vec::new());
        }
        for idx in members {
            let child = CellKey::containing(self.addresses[idx as usize], key.depth + 1);
            if let Some(bucket) = self.buckets.get_mut(&child) {
                bucket.push(idx);
            }
        }
    }

    /// Insert the next node at tile-relative (x, y), returning its index.
    pub fn insert(&mut self, x: f64, y: f64) -> Result<u32> {
        let addr = (address(x), address(y));
        let idx = self.addresses.len() as u32;
        self.addresses.push(addr);

        let mut depth = self.init_depth;
        loop {
            let key = self.leaf_containing(addr, depth)?;
            let capacity = self.capacity;
            if let Some(bucket) = self.buckets.get_mut(&key) {
                if bucket.len() < capacity {
                    bucket.push(idx);
                    return Ok(idx);
                }
            }
            if key.depth >= MAX_DEPTH {
                self.addresses.pop();
                return Err(Error::Partition(format!(
                    "bucket {:?} is full at maximum depth ({} nodes too close together)",
                    key, capacity
                )));
            }
            self.split(key);
            depth = key.depth + 1;
        }
    }

    /// Drop empty buckets.
    pub fn clean(&mut self) {
        self.buckets.retain(|_, members| !members.is_empty());
    }

    pub fn statistics(&self) -> QuadtreeStats {
        let n = self.buckets.len();
        if n == 0 {
            return QuadtreeStats::default();
        }
        let depth_sum: usize = self.buckets.keys().map(|k| k.depth as usize).sum();
        let size_sum: usize = self.buckets.values().map(Vec::len).sum();
        QuadtreeStats {
            buckets: n,
            average_depth: depth_sum as f64 / n as f64,
            average_size: size_sum as f64 / n as f64,
            max_depth: self.buckets.keys().map(|k| k.depth).max().unwrap_or(0),
        }
    }

    /// Buckets in cell order.
    pub fn buckets(&self) -> impl Iterator<Item = (&CellKey, &Vec<u32>)> {
        self.buckets.iter()
    }
}

/// A finished leaf: member nodes plus their shared quantization.
#[derive(Debug, Clone)]
pub struct Pool {
    pub cell: CellKey,
    /// Member node indices, ascending
    pub members: Vec<u32>,
    pub x: AxisScale,
    pub y: AxisScale,
    pub z: AltitudeScale,
}

/// Result of partitioning a mesh.
#[derive(Debug, Clone, Default)]
pub struct PoolSet {
    pub pools: Vec<Pool>,
    /// Pool index of every node
    pub node_pool: Vec<u32>,
    /// Quantized (x, y, z) of every node in its pool
    pub node_coords: Vec<[u16; 3]>,
}

impl PoolSet {
    /// Partition all nodes of `mesh`, then quantize them in their pools.
    pub fn build(mesh: &Mesh, tile: TileCoord, init_depth: u8, capacity: usize) -> Result<Self> {
        let mut tree = PoolQuadtree::new(init_depth, capacity);
        for node in &mesh.nodes {
            tree.insert(node.lon(), node.lat())?;
        }
        tree.clean();
        let stats = tree.statistics();
        log::info!(
            "Pool quadtree: {} buckets, average depth {:.2}, average size {:.1}, largest depth {}",
            stats.buckets, stats.average_depth, stats.average_size, stats.max_depth
        );
        Ok(Self::from_tree(tree, mesh, tile))
    }

    /// Freeze a cleaned quadtree into pools.
    pub fn from_tree(tree: PoolQuadtree, mesh: &Mesh, tile: TileCoord) -> Self {
        let (lon0, lat0) = (tile.lon as f64, tile.lat as f64);
        let mut node_pool = vec![0u32; mesh.nodes.len()];
        let mut node_coords = vec![[0u16; 3]; mesh.nodes.len()];
        let mut pools = Vec::with_capacity(tree.buckets.len());

        for (cell, members) in tree.buckets.into_iter().filter(|(_, m)| !m.is_empty()) {
            let (min, max) = members.iter().fold((f64::MAX, f64::MIN), |(lo, hi), &n| {
                let alt = mesh.nodes[n as usize].alt();
                (lo.min(alt), hi.max(alt))
            });
            let x = AxisScale::for_cell(lon0, cell.x, cell.depth);
            let y = AxisScale::for_cell(lat0, cell.y, cell.depth);
            let z = AltitudeScale::for_range(min, max);

            let pool_idx = pools.len() as u32;
            for &n in &members {
                let node = &mesh.nodes[n as usize];
                node_pool[n as usize] = pool_idx;
                node_coords[n as usize] = [
                    x.encode(node.lon() + lon0),
                    y.encode(node.lat() + lat0),
                    z.encode(node.alt()),
                ];
            }
            pools.push(Pool { cell, members, x, y, z });
        }

        Self { pools, node_pool, node_coords }
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Decoded absolute (lon, lat, alt) of a node.
    pub fn decode(&self, node: u32) -> (f64, f64, f64) {
        let pool = &self.pools[self.node_pool[node as usize] as usize];
        let [ix, iy, iz] = self.node_coords[node as usize];
        (pool.x.decode(ix), pool.y.decode(iy), pool.z.decode(iz))
    }
}
