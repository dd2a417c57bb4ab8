//! Synthetic regular-grid meshes for tests and benchmarks.

use glam::{DVec2, DVec3};

use super::{Mesh, Node, TriType, Triangle};

/// Build a `cols` x `rows` grid over the unit tile.
///
/// Each cell is split along its (0,0)-(1,1) diagonal into a lower and an
/// upper counter-clockwise triangle. `classify(col, row, upper)` picks the
/// type of each triangle. Altitude rises gently towards the north-east.
pub fn grid_mesh<F>(cols: u32, rows: u32, classify: F) -> Mesh
where
    F: Fn(u32, u32, bool) -> TriType,
{
    let stride = cols + 1;
    let mut nodes = Vec::with_capacity(((cols + 1) * (rows + 1)) as usize);
    for j in 0..=rows {
        for i in 0..=cols {
            let lon = i as f64 / cols as f64;
            let lat = j as f64 / rows as f64;
            nodes.push(Node::new(
                DVec3::new(lon, lat, 10.0 * (i + j) as f64),
                DVec2::ZERO,
            ));
        }
    }

    let mut triangles = Vec::with_capacity((2 * cols * rows) as usize);
    for j in 0..rows {
        for i in 0..cols {
            let p00 = j * stride + i;
            let p10 = p00 + 1;
            let p01 = p00 + stride;
            let p11 = p01 + 1;
            triangles.push(Triangle::new(p00, p10, p11, classify(i, j, false)));
            triangles.push(Triangle::new(p00, p11, p01, classify(i, j, true)));
        }
    }

    Mesh::new(nodes, triangles)
}
