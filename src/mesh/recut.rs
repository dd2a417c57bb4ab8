//! Coastline recutting.
//!
//! Water and sea triangles touching the coast are subdivided so that every
//! land/water boundary runs along triangle edges. Cut nodes are inserted at
//! edge midpoints (one per undirected edge) and children are appended after
//! the existing triangles, with the first child taking the parent's slot.

use std::collections::HashMap;

use super::{Mesh, Node, Triangle, TypeMask};

/// Summary of one recut pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecutStats {
    pub coast_triangles: usize,
    pub cut_edges: usize,
    pub split_triangles: usize,
    pub barycenter_splits: usize,
    pub nodes_added: usize,
    pub triangles_added: usize,
}

#[inline]
fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b { (a, b) } else { (b, a) }
}

/// Recut coastal water and sea triangles in place.
///
/// Node type masks and coast flags are recomputed first. Running the pass on
/// an already recut mesh adds nothing.
pub fn recut_coastline(mesh: &mut Mesh) -> RecutStats {
    mesh.compute_node_types();
    let mut stats = RecutStats::default();

    let node_count = mesh.nodes.len();
    let tri_count = mesh.triangles.len();

    let tri_is_coast: Vec<bool> = mesh
        .triangles
        .iter()
        .map(|tri| tri.nodes.iter().any(|&n| mesh.nodes[n as usize].coast))
        .collect();
    stats.coast_triangles = tri_is_coast.iter().filter(|&&c| c).count();

    // Type mask of every edge of a coastal triangle
    let mut edge_types: HashMap<(u32, u32), TypeMask> =
        HashMap::with_capacity(stats.coast_triangles * 3);
    for (tri, _) in mesh.triangles.iter().zip(&tri_is_coast).filter(|(_, c)| **c) {
        for (a, b) in tri.edges() {
            edge_types.entry(edge_key(a, b)).or_default().add(tri.kind);
        }
    }

    // Midpoints on wet edges joining two coast nodes
    let mut edge_cuts: HashMap<(u32, u32), u32> = HashMap::new();
    for t in (0..tri_count).filter(|&t| tri_is_coast[t]) {
        for (a, b) in mesh.triangles[t].edges() {
            let key = edge_key(a, b);
            if edge_cuts.contains_key(&key) {
                continue;
            }
            let mask = edge_types[&key];
            if mask.has_land() || !mesh.nodes[a as usize].coast || !mesh.nodes[b as usize].coast {
                continue;
            }
            let mut mid = Node::average(&[&mesh.nodes[a as usize], &mesh.nodes[b as usize]]);
            mid.types = mask;
            let idx = mesh.add_node(mid);
            edge_cuts.insert(key, idx);
        }
    }
    stats.cut_edges = edge_cuts.len();

    for t in 0..tri_count {
        let tri = mesh.triangles[t];
        if !tri.kind.is_wet() || !tri_is_coast[t] {
            continue;
        }
        let [a, b, c] = tri.nodes;
        let cut = |m: u32, n: u32| edge_cuts.get(&edge_key(m, n)).copied();
        let (cut_ab, cut_bc, cut_ca) = (cut(a, b), cut(b, c), cut(c, a));
        let cuts = [cut_ab, cut_bc, cut_ca].iter().filter(|c| c.is_some()).count();

        let children: Vec<[u32; 3]> = if cuts == 0 {
            // Only a wet triangle enclosed by land on all three sides
            let enclosed = tri
                .edges()
                .iter()
                .all(|&(m, n)| edge_types[&edge_key(m, n)].has_land());
            if !enclosed {
                continue;
            }
            let corners = [&mesh.nodes[a as usize], &mesh.nodes[b as usize], &mesh.nodes[c as usize]];
            let mut center = Node::average(&corners);
            center.types.add(tri.kind);
            let g = mesh.add_node(center);
            stats.barycenter_splits += 1;
            vec![[a, b, g], [b, c, g], [c, a, g]]
        } else {
            // Boundary walk: corners interleaved with their cut nodes.
            // `last_cut` is the position of the last cut node, `open` the
            // start of the last uncut edge.
            let mut ring = Vec::with_capacity(6);
            let mut last_cut = 0;
            let mut open = 0;
            for (corner, cut) in [(a, cut_ab), (b, cut_bc), (c, cut_ca)] {
                ring.push(corner);
                match cut {
                    Some(mid) => {
                        last_cut = ring.len();
                        ring.push(mid);
                    }
                    None => open = ring.len() - 1,
                }
            }
            let n = ring.len();
            let at = |start: usize, k: usize| ring[(start + k) % n];
            match cuts {
                1 => {
                    let (x, y, z, w) = (at(last_cut, 0), at(last_cut, 1), at(last_cut, 2), at(last_cut, 3));
                    vec![[x, y, z], [x, z, w]]
                }
                2 => {
                    let (x, y, z, w, u) = (at(open, 0), at(open, 1), at(open, 2), at(open, 3), at(open, 4));
                    vec![[x, y, z], [z, w, u], [x, z, u]]
                }
                _ => {
                    let v: Vec<u32> = (0..6).map(|k| at(last_cut, k)).collect();
                    vec![[v[0], v[1], v[2]], [v[2], v[3], v[4]], [v[4], v[5], v[0]], [v[0], v[2], v[4]]]
                }
            }
        };

        stats.split_triangles += 1;
        let mut children = children.into_iter();
        if let Some([x, y, z]) = children.next() {
            mesh.triangles[t] = Triangle::new(x, y, z, tri.kind);
        }
        for [x, y, z] in children {
            mesh.add_triangle(Triangle::new(x, y, z, tri.kind));
        }
    }

    stats.nodes_added = mesh.nodes.len() - node_count;
    stats.triangles_added = mesh.triangles.len() - tri_count;
    log::info!(
        "Recut: {} coast triangles, {} edges cut, {} triangles split ({} at barycenter), +{} nodes, +{} triangles",
        stats.coast_triangles,
        stats.cut_edges,
        stats.split_triangles,
        stats.barycenter_splits,
        stats.nodes_added,
        stats.triangles_added
    );
    stats
}
