//! Atom framing: tags, the file header and a length-patching writer.
//!
//! Every atom is a little-endian `u32` tag, a `u32` length that counts the
//! 8 header bytes, and the payload. Container atoms nest further atoms.

use std::fmt;

use crate::core::{Error, Result};

pub const MAGIC: &[u8; 8] = b"XPLNEDSF";
pub const VERSION: u32 = 1;

/// Magic plus version.
pub const FILE_HEADER_LEN: usize = 12;
pub const ATOM_HEADER_LEN: usize = 8;
pub const CHECKSUM_LEN: usize = 16;
/// Bytes of a file not covered by its top-level atoms.
pub const FIXED_OVERHEAD: usize = FILE_HEADER_LEN + CHECKSUM_LEN;

/// Four-character atom identifier, stored as a little-endian `u32`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomTag(pub u32);

impl AtomTag {
    pub const HEAD: Self = Self(0x4845_4144);
    pub const DEFN: Self = Self(0x4445_464e);
    pub const GEOD: Self = Self(0x4745_4f44);
    pub const DEMS: Self = Self(0x4445_4d53);
    pub const CMDS: Self = Self(0x434d_4453);

    pub const PROP: Self = Self(0x5052_4f50);
    pub const TERT: Self = Self(0x5445_5254);
    pub const OBJT: Self = Self(0x4f42_4a54);
    pub const POLY: Self = Self(0x504f_4c59);
    pub const NETW: Self = Self(0x4e45_5457);
    pub const DEMN: Self = Self(0x4445_4d4e);

    pub const POOL: Self = Self(0x504f_4f4c);
    pub const SCAL: Self = Self(0x5343_414c);
    pub const PO32: Self = Self(0x504f_3332);
    pub const SC32: Self = Self(0x5343_3332);

    pub const DEMI: Self = Self(0x4445_4d49);
    pub const DEMD: Self = Self(0x4445_4d44);

    /// Atoms whose payload is a sequence of atoms.
    pub fn is_container(self) -> bool {
        matches!(self, Self::HEAD | Self::DEFN | Self::GEOD | Self::DEMS)
    }

    /// Readable name, e.g. `HEAD`.
    pub fn name(self) -> String {
        self.0
            .to_be_bytes()
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
            .collect()
    }
}

impl fmt::Debug for AtomTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AtomTag({})", self.name())
    }
}

impl fmt::Display for AtomTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Builds a DSF file in memory.
///
/// Atoms are opened with [`begin`](Self::begin) and closed with
/// [`end`](Self::end), which back-patches the declared length so it always
/// equals the bytes actually written.
pub struct AtomWriter {
    buf: Vec<u8>,
    open: Vec<(AtomTag, usize)>,
}

impl AtomWriter {
    /// Start a file: magic and version are written immediately.
    pub fn new() -> Self {
        let mut buf = Vec::with_capacity(1 << 16);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&VERSION.to_le_bytes());
        Self { buf, open: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn begin(&mut self, tag: AtomTag) {
        self.open.push((tag, self.buf.len()));
        self.buf.extend_from_slice(&tag.0.to_le_bytes());
        self.buf.extend_from_slice(&0u32.to_le_bytes());
    }

    /// Close the innermost atom and return its total length.
    pub fn end(&mut self) -> Result<usize> {
        let (tag, start) = self
            .open
            .pop()
            .ok_or_else(|| Error::InvalidDsf("end() without an open atom".into()))?;
        let len = self.buf.len() - start;
        let declared = u32::try_from(len)
            .map_err(|_| Error::InvalidDsf(format!("{} atom too large: {} bytes", tag, len)))?;
        self.buf[start + 4..start + 8].copy_from_slice(&declared.to_le_bytes());
        Ok(len)
    }

    /// Write a whole leaf atom.
    pub fn atom(&mut self, tag: AtomTag, payload: &[u8]) -> Result<usize> {
        self.begin(tag);
        self.bytes(payload);
        self.end()
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Append the MD5 of everything written so far and return the file.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if let Some((tag, _)) = self.open.last() {
            return Err(Error::InvalidDsf(format!("{} atom left open", tag)));
        }
        let digest = md5::compute(&self.buf);
        self.buf.extend_from_slice(&digest.0);
        Ok(self.buf)
    }
}

impl Default for AtomWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Concatenate NUL-terminated strings, the layout of string table atoms.
pub fn string_table<I, S>(items: I) -> Vec<u8>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Vec::new();
    for item in items {
        out.extend_from_slice(item.as_ref().as_bytes());
        out.push(0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_names() {
        assert_eq!(AtomTag::HEAD.name(), "HEAD");
        assert_eq!(AtomTag::DEMN.name(), "DEMN");
        // Stored little-endian, so the file shows the name reversed
        assert_eq!(&AtomTag::HEAD.0.to_le_bytes(), b"DAEH");
        assert!(AtomTag::GEOD.is_container());
        assert!(!AtomTag::CMDS.is_container());
    }

    #[test]
    fn test_nested_lengths_are_patched() {
        let mut w = AtomWriter::new();
        w.begin(AtomTag::HEAD);
        let inner = w.atom(AtomTag::PROP, b"sim/west\0-4\0").unwrap();
        let outer = w.end().unwrap();
        assert_eq!(inner, 8 + 12);
        assert_eq!(outer, 8 + inner);

        let data = w.finish().unwrap();
        assert_eq!(&data[..8], MAGIC);
        assert_eq!(u32::from_le_bytes(data[12..16].try_into().unwrap()), AtomTag::HEAD.0);
        assert_eq!(u32::from_le_bytes(data[16..20].try_into().unwrap()) as usize, outer);
        assert_eq!(data.len(), FIXED_OVERHEAD + outer);

        let digest = md5::compute(&data[..data.len() - CHECKSUM_LEN]);
        assert_eq!(&data[data.len() - CHECKSUM_LEN..], &digest.0);
    }

    #[test]
    fn test_unbalanced_atoms_rejected() {
        let mut w = AtomWriter::new();
        assert!(w.end().is_err());
        w.begin(AtomTag::CMDS);
        assert!(matches!(w.finish(), Err(Error::InvalidDsf(_))));
    }

    #[test]
    fn test_string_table() {
        assert_eq!(string_table(["a", "bc"]), b"a\0bc\0");
        assert!(string_table(Vec::<String>::new()).is_empty());
    }
}
