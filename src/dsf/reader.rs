//! Reading DSF files back: checksum verification, the atom tree and the
//! tables the compiler itself writes.

use std::fs;
use std::path::Path;

use crate::core::{Error, Result};

use super::atom::{AtomTag, ATOM_HEADER_LEN, CHECKSUM_LEN, FILE_HEADER_LEN, MAGIC, VERSION};
use super::raster::RasterLayer;

/// Little-endian cursor over a byte slice.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::InvalidDsf(format!(
                "truncated data: wanted {} bytes at offset {}, {} left",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }
}

/// A raw atom borrowed from its file.
#[derive(Debug, Clone, Copy)]
pub struct Atom<'a> {
    pub tag: AtomTag,
    pub payload: &'a [u8],
}

impl<'a> Atom<'a> {
    /// Declared length, header included.
    pub fn len(&self) -> usize {
        self.payload.len() + ATOM_HEADER_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn children(&self) -> AtomIter<'a> {
        AtomIter::new(self.payload)
    }
}

/// Iterates over consecutive atoms.
pub struct AtomIter<'a> {
    reader: ByteReader<'a>,
    failed: bool,
}

impl<'a> AtomIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { reader: ByteReader::new(data), failed: false }
    }

    fn next_atom(&mut self) -> Result<Atom<'a>> {
        let at = self.reader.position();
        let tag = AtomTag(self.reader.u32()?);
        let len = self.reader.u32()? as usize;
        if len < ATOM_HEADER_LEN {
            return Err(Error::InvalidDsf(format!(
                "{} atom at offset {} declares length {}",
                tag, at, len
            )));
        }
        let payload = self.reader.take(len - ATOM_HEADER_LEN)?;
        Ok(Atom { tag, payload })
    }
}

impl<'a> Iterator for AtomIter<'a> {
    type Item = Result<Atom<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.reader.is_empty() {
            return None;
        }
        let atom = self.next_atom();
        self.failed = atom.is_err();
        Some(atom)
    }
}

/// Check magic, version and trailing MD5; return the top-level atom bytes.
pub fn verify(data: &[u8]) -> Result<&[u8]> {
    if data.len() < FILE_HEADER_LEN + CHECKSUM_LEN {
        return Err(Error::InvalidDsf(format!("file too short: {} bytes", data.len())));
    }
    if &data[..8] != MAGIC {
        return Err(Error::InvalidDsf("bad magic".into()));
    }
    let version = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
    if version != VERSION {
        return Err(Error::InvalidDsf(format!("unsupported version {}", version)));
    }
    let body_end = data.len() - CHECKSUM_LEN;
    let digest = md5::compute(&data[..body_end]);
    if digest.0 != data[body_end..] {
        return Err(Error::InvalidDsf("checksum mismatch".into()));
    }
    Ok(&data[FILE_HEADER_LEN..body_end])
}

/// Split a NUL-terminated string table.
pub fn parse_strings(payload: &[u8]) -> Vec<String> {
    let trimmed = payload.strip_suffix(&[0]).unwrap_or(payload);
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed
        .split(|&b| b == 0)
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect()
}

/// Position and size of one atom, nested.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomInfo {
    pub tag: AtomTag,
    pub len: usize,
    pub children: Vec<AtomInfo>,
}

/// A decoded point pool with its scale and offset per plane.
#[derive(Debug, Clone, PartialEq)]
pub struct PointPool {
    pub count: usize,
    /// Plane-major raw values, `planes[p][i]`
    pub planes: Vec<Vec<u16>>,
    /// `(scale, offset)` per plane, empty until the matching SCAL is read
    pub scales: Vec<(f32, f32)>,
}

impl PointPool {
    /// Raw values of point `i`.
    pub fn point(&self, i: usize) -> Vec<u16> {
        self.planes.iter().map(|p| p[i]).collect()
    }

    /// Value of plane `plane` of point `i` after scaling.
    pub fn decode(&self, plane: usize, i: usize) -> f64 {
        let raw = self.planes[plane][i] as f64;
        match self.scales.get(plane) {
            Some(&(scale, offset)) if scale != 0.0 => offset as f64 + raw * scale as f64 / 65535.0,
            _ => raw,
        }
    }
}

/// The parts of a DSF the compiler and the inspector care about.
#[derive(Debug, Clone, Default)]
pub struct DsfFile {
    pub atoms: Vec<AtomInfo>,
    pub properties: Vec<(String, String)>,
    pub terrains: Vec<String>,
    pub objects: Vec<String>,
    pub polygons: Vec<String>,
    pub networks: Vec<String>,
    pub raster_names: Vec<String>,
    pub pools: Vec<PointPool>,
    pub rasters: Vec<RasterLayer>,
    pub commands: Vec<u8>,
}

impl DsfFile {
    pub fn read(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Self::parse(&data)
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let body = verify(data)?;
        let mut file = DsfFile::default();
        let mut scal_index = 0;
        let mut pending_info = None;

        for atom in AtomIter::new(body) {
            let atom = atom?;
            let mut info = AtomInfo { tag: atom.tag, len: atom.len(), children: Vec::new() };
            if atom.tag.is_container() {
                for child in atom.children() {
                    let child = child?;
                    info.children.push(AtomInfo {
                        tag: child.tag,
                        len: child.len(),
                        children: Vec::new(),
                    });
                    match child.tag {
                        AtomTag::PROP => {
                            let strings = parse_strings(child.payload);
                            file.properties.extend(
                                strings
                                    .chunks_exact(2)
                                    .map(|kv| (kv[0].clone(), kv[1].clone())),
                            );
                        }
                        AtomTag::TERT => file.terrains = parse_strings(child.payload),
                        AtomTag::OBJT => file.objects = parse_strings(child.payload),
                        AtomTag::POLY => file.polygons = parse_strings(child.payload),
                        AtomTag::NETW => file.networks = parse_strings(child.payload),
                        AtomTag::DEMN => file.raster_names = parse_strings(child.payload),
                        AtomTag::POOL => file.pools.push(parse_pool(child.payload)?),
                        AtomTag::SCAL => {
                            let scales = parse_scales(child.payload)?;
                            if let Some(pool) = file.pools.get_mut(scal_index) {
                                pool.scales = scales;
                            }
                            scal_index += 1;
                        }
                        AtomTag::DEMI => pending_info = Some(child.payload),
                        AtomTag::DEMD => {
                            let header = pending_info.take().ok_or_else(|| {
                                Error::InvalidDsf("DEMD without a preceding DEMI".into())
                            })?;
                            file.rasters.push(RasterLayer::parse(header, child.payload)?);
                        }
                        _ => {}
                    }
                }
            } else if atom.tag == AtomTag::CMDS {
                file.commands = atom.payload.to_vec();
            }
            file.atoms.push(info);
        }
        Ok(file)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Decode a 16-bit point pool.
///
/// Planes may be stored raw (0), differenced (1), run-length (2) or both
/// (3). The compiler only writes raw planes.
pub fn parse_pool(payload: &[u8]) -> Result<PointPool> {
    let mut r = ByteReader::new(payload);
    let count = r.u32()? as usize;
    let plane_count = r.u8()? as usize;
    let mut planes = Vec::with_capacity(plane_count);
    for _ in 0..plane_count {
        let encoding = r.u8()?;
        if encoding > 3 {
            return Err(Error::InvalidDsf(format!("unknown plane encoding {}", encoding)));
        }
        let mut values = Vec::with_capacity(count);
        if encoding & 2 == 0 {
            for _ in 0..count {
                values.push(r.u16()?);
            }
        } else {
            while values.len() < count {
                let code = r.u8()?;
                let run = (code & 0x7f) as usize;
                if code & 0x80 != 0 {
                    let v = r.u16()?;
                    values.extend(std::iter::repeat_n(v, run));
                } else {
                    for _ in 0..run {
                        values.push(r.u16()?);
                    }
                }
            }
            if values.len() != count {
                return Err(Error::InvalidDsf("pool run overflows its point count".into()));
            }
        }
        if encoding & 1 != 0 {
            for i in 1..values.len() {
                values[i] = values[i].wrapping_add(values[i - 1]);
            }
        }
        planes.push(values);
    }
    Ok(PointPool { count, planes, scales: Vec::new() })
}

fn parse_scales(payload: &[u8]) -> Result<Vec<(f32, f32)>> {
    if payload.len() % 8 != 0 {
        return Err(Error::InvalidDsf(format!("SCAL payload of {} bytes", payload.len())));
    }
    let mut r = ByteReader::new(payload);
    let mut out = Vec::with_capacity(payload.len() / 8);
    while !r.is_empty() {
        out.push((r.f32()?, r.f32()?));
    }
    Ok(out)
}
