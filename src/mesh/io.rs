//! Text mesh format reader and writer.
//!
//! ```text
//! MeshVersionFormatted 1.3
//! Dimension 3
//!
//! Vertices
//! <count>
//! <lon> <lat> <alt/100000> <ref>
//! Normals
//! <count>
//! <nx> <ny>
//! Triangles
//! <count>
//! <n1> <n2> <n3> <type bits>
//! ```
//!
//! Vertex coordinates are absolute, triangle indices are 1-based.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use glam::{DVec2, DVec3};

use crate::core::{Error, Result};
use crate::geo::TileCoord;

use super::{Mesh, Node, TriType, Triangle};

/// Altitudes are stored divided by this factor.
pub const ALTITUDE_FACTOR: f64 = 100_000.0;

/// Non-blank lines with their 1-based line numbers.
struct Lines<'a> {
    inner: std::iter::Enumerate<std::str::Lines<'a>>,
    last: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self { inner: text.lines().enumerate(), last: 0 }
    }

    fn next_line(&mut self, what: &str) -> Result<(usize, &'a str)> {
        for (idx, line) in self.inner.by_ref() {
            let line = line.trim();
            if !line.is_empty() {
                self.last = idx + 1;
                return Ok((idx + 1, line));
            }
        }
        Err(Error::malformed(self.last + 1, format!("unexpected end of file, expected {what}")))
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        let (line_no, line) = self.next_line(keyword)?;
        if line.split_whitespace().next() != Some(keyword) {
            return Err(Error::malformed(line_no, format!("expected `{keyword}`, found `{line}`")));
        }
        Ok(())
    }

    fn count(&mut self, section: &str) -> Result<usize> {
        let (line_no, line) = self.next_line(section)?;
        line.parse()
            .map_err(|_| Error::malformed(line_no, format!("invalid {section} count `{line}`")))
    }

    fn fields<T: FromStr>(&mut self, what: &str, n: usize) -> Result<(usize, Vec<T>)> {
        let (line_no, line) = self.next_line(what)?;
        let values = line
            .split_whitespace()
            .take(n)
            .map(|tok| tok.parse::<T>())
            .collect::<std::result::Result<Vec<T>, _>>()
            .map_err(|_| Error::malformed(line_no, format!("unparsable {what} `{line}`")))?;
        if values.len() < n {
            return Err(Error::malformed(line_no, format!("{what} needs {n} fields, found `{line}`")));
        }
        Ok((line_no, values))
    }
}

/// Map raw triangle type bits onto a [`TriType`].
///
/// Version 1.3 meshes carry three water bits, older ones two.
pub fn classify_raw_type(raw: u32, version: f64, use_masks_for_inland: bool) -> TriType {
    let has_water = if version >= 1.3 { 7 } else { 3 };
    let wet = raw & has_water;
    if wet == 0 {
        TriType::Land
    } else if wet > 1 || use_masks_for_inland {
        TriType::Sea
    } else {
        TriType::Water
    }
}

/// Parse mesh text for `tile`.
pub fn parse_mesh(text: &str, tile: TileCoord, use_masks_for_inland: bool) -> Result<Mesh> {
    let mut lines = Lines::new(text);

    let (line_no, header) = lines.next_line("MeshVersionFormatted")?;
    let mut words = header.split_whitespace();
    if words.next() != Some("MeshVersionFormatted") {
        return Err(Error::malformed(line_no, format!("expected `MeshVersionFormatted`, found `{header}`")));
    }
    let version = words
        .next_back()
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| Error::malformed(line_no, "missing mesh version"))?;
    lines.expect_keyword("Dimension")?;

    lines.expect_keyword("Vertices")?;
    let node_count = lines.count("Vertices")?;
    let (lon0, lat0) = (tile.lon as f64, tile.lat as f64);
    let mut nodes = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        let (_, v) = lines.fields::<f64>("vertex", 3)?;
        nodes.push(Node::new(
            DVec3::new(v[0] - lon0, v[1] - lat0, v[2] * ALTITUDE_FACTOR),
            DVec2::ZERO,
        ));
    }

    lines.expect_keyword("Normals")?;
    let line_no = lines.last;
    let normal_count = lines.count("Normals")?;
    if normal_count != node_count {
        return Err(Error::malformed(
            line_no + 1,
            format!("{normal_count} normals for {node_count} vertices"),
        ));
    }
    for node in &mut nodes {
        let (_, v) = lines.fields::<f64>("normal", 2)?;
        node.normal = DVec2::new(v[0], v[1]);
    }

    lines.expect_keyword("Triangles")?;
    let tri_count = lines.count("Triangles")?;
    let mut triangles = Vec::with_capacity(tri_count);
    for _ in 0..tri_count {
        let (line_no, v) = lines.fields::<u64>("triangle", 4)?;
        let mut idx = [0u32; 3];
        for (slot, &one_based) in idx.iter_mut().zip(&v[..3]) {
            if one_based == 0 || one_based as usize > node_count {
                return Err(Error::malformed(line_no, format!("vertex index {one_based} out of range")));
            }
            *slot = (one_based - 1) as u32;
        }
        let kind = classify_raw_type(v[3] as u32, version, use_masks_for_inland);
        triangles.push(Triangle::new(idx[0], idx[1], idx[2], kind));
    }

    log::debug!(
        "Parsed mesh v{} for {}: {} nodes, {} triangles",
        version, tile, node_count, tri_count
    );
    Ok(Mesh { version, nodes, triangles })
}

/// Read the mesh file for `tile` from disk.
pub fn read_mesh(path: &Path, tile: TileCoord, use_masks_for_inland: bool) -> Result<Mesh> {
    let text = fs::read_to_string(path)?;
    parse_mesh(&text, tile, use_masks_for_inland)
}

/// Serialize a mesh back to text. Triangle types are written as single bits
/// (land 0, water 1, sea 2).
pub fn format_mesh(mesh: &Mesh, tile: TileCoord) -> String {
    let (lon0, lat0) = (tile.lon as f64, tile.lat as f64);
    let mut out = String::new();
    out.push_str(&format!("MeshVersionFormatted {}\n", mesh.version));
    out.push_str("Dimension 3\n\nVertices\n");
    out.push_str(&format!("{}\n", mesh.nodes.len()));
    for node in &mesh.nodes {
        out.push_str(&format!(
            "{:.9} {:.9} {:.9} 0\n",
            node.pos.x + lon0,
            node.pos.y + lat0,
            node.pos.z / ALTITUDE_FACTOR
        ));
    }
    out.push_str("\nNormals\n");
    out.push_str(&format!("{}\n", mesh.nodes.len()));
    for node in &mesh.nodes {
        out.push_str(&format!("{:.9} {:.9}\n", node.normal.x, node.normal.y));
    }
    out.push_str("\nTriangles\n");
    out.push_str(&format!("{}\n", mesh.triangles.len()));
    for tri in &mesh.triangles {
        let raw = match tri.kind {
            TriType::Land => 0,
            TriType::Water => 1,
            TriType::Sea => 2,
        };
        let [a, b, c] = tri.nodes;
        out.push_str(&format!("{} {} {} {}\n", a + 1, b + 1, c + 1, raw));
    }
    out
}

/// Write a mesh file for `tile`.
pub fn write_mesh(path: &Path, mesh: &Mesh, tile: TileCoord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format_mesh(mesh, tile))?;
    Ok(())
}
