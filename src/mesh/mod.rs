//! Terrain mesh arena: nodes and triangles addressed by index.
//!
//! Nodes and triangles are loaded once from the upstream mesh file. Later
//! passes only append (recutting) or annotate (bathymetry, classification).

pub mod io;
pub mod recut;
pub mod builder;

use glam::{DVec2, DVec3};

pub use io::{read_mesh, parse_mesh};
pub use recut::{recut_coastline, RecutStats};
pub use builder::grid_mesh;

/// Triangle classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TriType {
    Land = 0,
    Water = 1,
    Sea = 2,
}

impl TriType {
    /// Bit of this type in a [`TypeMask`].
    pub fn bit(self) -> u8 {
        1 << self as u8
    }

    pub fn is_wet(self) -> bool {
        self != TriType::Land
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(TriType::Land),
            1 => Some(TriType::Water),
            2 => Some(TriType::Sea),
            _ => None,
        }
    }
}

/// OR of the type bits of every triangle touching a node or edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TypeMask(pub u8);

impl TypeMask {
    pub const LAND: u8 = 1;
    pub const WATER: u8 = 2;
    pub const SEA: u8 = 4;
    pub const WET: u8 = Self::WATER | Self::SEA;

    pub fn add(&mut self, kind: TriType) {
        self.0 |= kind.bit();
    }

    pub fn has_land(self) -> bool {
        self.0 & Self::LAND != 0
    }

    pub fn has_wet(self) -> bool {
        self.0 & Self::WET != 0
    }

    /// Touches both land and water or sea.
    pub fn is_coast(self) -> bool {
        self.has_land() && self.has_wet()
    }
}

/// A mesh vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Node {
    /// (lon, lat) relative to the tile origin in degrees, altitude in metres
    pub pos: DVec3,
    /// Horizontal components of the surface normal
    pub normal: DVec2,
    /// Shallow-water blend ratio in [0, 1]
    pub bathy: f64,
    pub coast: bool,
    pub types: TypeMask,
}

impl Node {
    pub fn new(pos: DVec3, normal: DVec2) -> Self {
        Self {
            pos,
            normal,
            bathy: 1.0,
            coast: false,
            types: TypeMask::default(),
        }
    }

    pub fn lon(&self) -> f64 {
        self.pos.x
    }

    pub fn lat(&self) -> f64 {
        self.pos.y
    }

    pub fn alt(&self) -> f64 {
        self.pos.z
    }

    /// Attribute-wise mean of several nodes (used for inserted cut nodes).
    pub fn average(nodes: &[&Node]) -> Self {
        let n = nodes.len() as f64;
        let pos = nodes.iter().map(|node| node.pos).sum::<DVec3>() / n;
        let normal = nodes.iter().map(|node| node.normal).sum::<DVec2>() / n;
        Self::new(pos, normal)
    }
}

/// An index triangle. Vertex order defines the winding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Triangle {
    pub nodes: [u32; 3],
    pub kind: TriType,
}

impl Triangle {
    pub fn new(a: u32, b: u32, c: u32, kind: TriType) -> Self {
        Self { nodes: [a, b, c], kind }
    }

    /// Undirected edges in winding order: (a,b), (b,c), (c,a).
    pub fn edges(&self) -> [(u32, u32); 3] {
        let [a, b, c] = self.nodes;
        [(a, b), (b, c), (c, a)]
    }
}

/// Node and triangle arena for one tile.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub version: f64,
    pub nodes: Vec<Node>,
    pub triangles: Vec<Triangle>,
}

impl Mesh {
    pub fn new(nodes: Vec<Node>, triangles: Vec<Triangle>) -> Self {
        Self { version: 1.3, nodes, triangles }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn node(&self, index: u32) -> &Node {
        &self.nodes[index as usize]
    }

    /// Append a node, returning its index.
    pub fn add_node(&mut self, node: Node) -> u32 {
        let idx = self.nodes.len() as u32;
        self.nodes.push(node);
        idx
    }

    /// Append a triangle, returning its index.
    pub fn add_triangle(&mut self, tri: Triangle) -> u32 {
        let idx = self.triangles.len() as u32;
        self.triangles.push(tri);
        idx
    }

    /// Recompute every node's type mask and coast flag from the triangles.
    pub fn compute_node_types(&mut self) {
        for node in &mut self.nodes {
            node.types = TypeMask::default();
        }
        for tri in &self.triangles {
            for &n in &tri.nodes {
                self.nodes[n as usize].types.add(tri.kind);
            }
        }
        for node in &mut self.nodes {
            node.coast = node.types.is_coast();
        }
    }

    /// Barycenter (lon, lat) of a triangle, tile-relative.
    pub fn centroid(&self, tri: &Triangle) -> DVec2 {
        let sum = tri.nodes
            .iter()
            .map(|&n| self.node(n).pos.truncate())
            .sum::<DVec2>();
        sum / 3.0
    }

    /// Twice the signed (lon, lat) area of a triangle; positive when counter-clockwise.
    pub fn signed_area(&self, tri: &Triangle) -> f64 {
        let a = self.node(tri.nodes[0]).pos.truncate();
        let b = self.node(tri.nodes[1]).pos.truncate();
        let c = self.node(tri.nodes[2]).pos.truncate();
        (b - a).perp_dot(c - a)
    }
}
