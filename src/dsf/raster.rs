//! Raster layers carried over from a companion DSF.
//!
//! Layers are taken by position: the first is elevation, the second
//! bathymetry. Bathymetry is pulled at least 2 m under the elevation before
//! being embedded again.

use std::path::Path;

use crate::core::{Error, Result};

use super::atom::AtomTag;
use super::reader::{parse_strings, AtomIter, ByteReader};

/// Sample type of a raster, the low bits of the DEMI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Float,
    Signed,
    Unsigned,
}

impl SampleFormat {
    fn from_flags(flags: u16) -> Result<Self> {
        match flags & 3 {
            0 => Ok(SampleFormat::Float),
            1 => Ok(SampleFormat::Signed),
            2 => Ok(SampleFormat::Unsigned),
            other => Err(Error::InvalidDsf(format!("unknown raster sample format {}", other))),
        }
    }
}

/// One DEMI/DEMD pair.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayer {
    pub version: u8,
    pub bytes_per_pixel: u8,
    pub flags: u16,
    pub width: u32,
    pub height: u32,
    pub scale: f32,
    pub offset: f32,
    pub data: Vec<u8>,
}

impl RasterLayer {
    /// Decode from a DEMI payload and its DEMD data.
    pub fn parse(info: &[u8], data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(info);
        let layer = Self {
            version: r.u8()?,
            bytes_per_pixel: r.u8()?,
            flags: r.u16()?,
            width: r.u32()?,
            height: r.u32()?,
            scale: r.f32()?,
            offset: r.f32()?,
            data: data.to_vec(),
        };
        let format = layer.format()?;
        let bpp_ok = match format {
            SampleFormat::Float => layer.bytes_per_pixel == 4,
            _ => matches!(layer.bytes_per_pixel, 1 | 2 | 4),
        };
        if !bpp_ok {
            return Err(Error::InvalidDsf(format!(
                "{:?} raster with {} bytes per pixel",
                format, layer.bytes_per_pixel
            )));
        }
        if layer.data.len() != layer.len() * layer.bytes_per_pixel as usize {
            return Err(Error::InvalidDsf(format!(
                "raster {}x{} holds {} bytes",
                layer.width,
                layer.height,
                layer.data.len()
            )));
        }
        Ok(layer)
    }

    pub fn format(&self) -> Result<SampleFormat> {
        SampleFormat::from_flags(self.flags)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// DEMI payload.
    pub fn info_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(20);
        out.push(self.version);
        out.push(self.bytes_per_pixel);
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.scale.to_le_bytes());
        out.extend_from_slice(&self.offset.to_le_bytes());
        out
    }

    fn raw(&self, i: usize) -> f64 {
        let bpp = self.bytes_per_pixel as usize;
        let b = &self.data[i * bpp..(i + 1) * bpp];
        match (self.flags & 3, bpp) {
            (0, _) => f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            (1, 1) => b[0] as i8 as f64,
            (1, 2) => i16::from_le_bytes([b[0], b[1]]) as f64,
            (1, _) => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            (_, 1) => b[0] as f64,
            (_, 2) => u16::from_le_bytes([b[0], b[1]]) as f64,
            (_, _) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
        }
    }

    /// Physical value of sample `i`.
    pub fn value(&self, i: usize) -> f64 {
        self.raw(i) * self.scale as f64 + self.offset as f64
    }

    /// Store a physical value at `i`, saturating to the layer's encoding.
    pub fn set_value(&mut self, i: usize, value: f64) {
        let bpp = self.bytes_per_pixel as usize;
        let raw = if self.scale != 0.0 {
            (value - self.offset as f64) / self.scale as f64
        } else {
            value - self.offset as f64
        };
        let out = &mut self.data[i * bpp..(i + 1) * bpp];
        match (self.flags & 3, bpp) {
            (0, _) => out.copy_from_slice(&(raw as f32).to_le_bytes()),
            (1, 1) => out[0] = raw.round() as i8 as u8,
            (1, 2) => out.copy_from_slice(&(raw.round() as i16).to_le_bytes()),
            (1, _) => out.copy_from_slice(&(raw.round() as i32).to_le_bytes()),
            (_, 1) => out[0] = raw.round() as u8,
            (_, 2) => out.copy_from_slice(&(raw.round() as u16).to_le_bytes()),
            (_, _) => out.copy_from_slice(&(raw.round() as u32).to_le_bytes()),
        }
    }
}

/// Raster names and layers borrowed from a companion DSF.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanionRasters {
    /// Raw DEMN payload, copied verbatim into the definitions
    pub names: Vec<u8>,
    pub layers: Vec<RasterLayer>,
}

impl CompanionRasters {
    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let body = super::reader::verify(&data)?;
        Self::from_atoms(body)
    }

    /// Collect DEMN and the DEMI/DEMD pairs from top-level atom bytes.
    pub fn from_atoms(body: &[u8]) -> Result<Self> {
        let mut out = Self::default();
        for atom in AtomIter::new(body) {
            let atom = atom?;
            match atom.tag {
                AtomTag::DEFN => {
                    for child in atom.children() {
                        let child = child?;
                        if child.tag == AtomTag::DEMN {
                            out.names = child.payload.to_vec();
                        }
                    }
                }
                AtomTag::DEMS => {
                    let mut info = None;
                    for child in atom.children() {
                        let child = child?;
                        match child.tag {
                            AtomTag::DEMI => info = Some(child.payload),
                            AtomTag::DEMD => {
                                let header = info.take().ok_or_else(|| {
                                    Error::InvalidDsf("DEMD without a preceding DEMI".into())
                                })?;
                                out.layers.push(RasterLayer::parse(header, child.payload)?);
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(out)
    }

    pub fn names(&self) -> Vec<String> {
        parse_strings(&self.names)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.layers.is_empty()
    }

    /// Rewrite the bathymetry layer as `min(bathymetry, elevation - 2)`.
    ///
    /// Returns the number of samples changed. Files with fewer than two
    /// layers are left alone.
    pub fn clamp_bathymetry(&mut self) -> Result<usize> {
        let [elevation, bathymetry, ..] = self.layers.as_mut_slice() else {
            return Ok(0);
        };
        if elevation.width != bathymetry.width || elevation.height != bathymetry.height {
            return Err(Error::InvalidDsf(format!(
                "elevation {}x{} and bathymetry {}x{} rasters differ",
                elevation.width, elevation.height, bathymetry.width, bathymetry.height
            )));
        }
        let mut changed = 0;
        for i in 0..bathymetry.len() {
            let ceiling = elevation.value(i) - 2.0;
            if bathymetry.value(i) > ceiling {
                bathymetry.set_value(i, ceiling);
                changed += 1;
            }
        }
        Ok(changed)
    }
}
