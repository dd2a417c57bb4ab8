//! Command stream encoding.
//!
//! Only the opcodes a terrain mesh needs are produced: terrain selection,
//! pool selection, patch flags with LOD range and the two triangle patch
//! forms. Triangle runs are split so no count exceeds 255.

use crate::core::{Error, Result};

use super::reader::ByteReader;

pub const POOL_SELECT: u8 = 1;
pub const SET_DEFINITION16: u8 = 4;
pub const PATCH_FLAGS_LOD: u8 = 18;
pub const PATCH_TRIANGLE: u8 = 23;
pub const PATCH_TRIANGLE_CROSS_POOL: u8 = 24;

/// Largest coordinate count of one patch command.
pub const MAX_RUN: usize = 255;

/// Patch flag of load-bearing terrain.
pub const FLAG_PHYSICAL: u8 = 1;
/// Patch flag of draped terrain.
pub const FLAG_OVERLAY: u8 = 2;

/// A corner addressed across pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolRef {
    pub pool: u16,
    pub slot: u16,
}

#[derive(Debug, Default)]
pub struct CommandWriter {
    buf: Vec<u8>,
}

impl CommandWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_definition(&mut self, terrain: u16) {
        self.buf.push(SET_DEFINITION16);
        self.buf.extend_from_slice(&terrain.to_le_bytes());
    }

    pub fn select_pool(&mut self, pool: u16) {
        self.buf.push(POOL_SELECT);
        self.buf.extend_from_slice(&pool.to_le_bytes());
    }

    /// Physical patches never fade out (far LOD −1).
    pub fn patch_flags(&mut self, overlay: bool, overlay_lod: f32) {
        let (flag, far) = if overlay {
            (FLAG_OVERLAY, overlay_lod)
        } else {
            (FLAG_PHYSICAL, -1.0)
        };
        self.buf.push(PATCH_FLAGS_LOD);
        self.buf.push(flag);
        self.buf.extend_from_slice(&0f32.to_le_bytes());
        self.buf.extend_from_slice(&far.to_le_bytes());
    }

    /// Triangles of the selected pool, three slots each.
    pub fn triangles(&mut self, slots: &[u16]) {
        for run in slots.chunks(MAX_RUN) {
            self.buf.push(PATCH_TRIANGLE);
            self.buf.push(run.len() as u8);
            for slot in run {
                self.buf.extend_from_slice(&slot.to_le_bytes());
            }
        }
    }

    /// Triangles spanning pools, three corners each.
    pub fn cross_pool_triangles(&mut self, corners: &[PoolRef]) {
        for run in corners.chunks(MAX_RUN) {
            self.buf.push(PATCH_TRIANGLE_CROSS_POOL);
            self.buf.push(run.len() as u8);
            for corner in run {
                self.buf.extend_from_slice(&corner.pool.to_le_bytes());
                self.buf.extend_from_slice(&corner.slot.to_le_bytes());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// A decoded command, as far as this crate writes them.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    PoolSelect(u16),
    SetDefinition(u16),
    PatchFlags { flags: u8, near: f32, far: f32 },
    Triangles(Vec<u16>),
    CrossPoolTriangles(Vec<PoolRef>),
}

/// Decode a command stream. Unknown opcodes are an error.
pub fn decode_commands(data: &[u8]) -> Result<Vec<Command>> {
    let mut r = ByteReader::new(data);
    let mut out = Vec::new();
    while !r.is_empty() {
        let op = r.u8()?;
        let cmd = match op {
            POOL_SELECT => Command::PoolSelect(r.u16()?),
            SET_DEFINITION16 => Command::SetDefinition(r.u16()?),
            PATCH_FLAGS_LOD => Command::PatchFlags {
                flags: r.u8()?,
                near: r.f32()?,
                far: r.f32()?,
            },
            PATCH_TRIANGLE => {
                let n = r.u8()? as usize;
                let slots = (0..n).map(|_| r.u16()).collect::<Result<Vec<_>>>()?;
                Command::Triangles(slots)
            }
            PATCH_TRIANGLE_CROSS_POOL => {
                let n = r.u8()? as usize;
                let mut corners = Vec::with_capacity(n);
                for _ in 0..n {
                    corners.push(PoolRef { pool: r.u16()?, slot: r.u16()? });
                }
                Command::CrossPoolTriangles(corners)
            }
            other => {
                return Err(Error::InvalidDsf(format!(
                    "unsupported command {} at offset {}",
                    other,
                    r.position() - 1
                )));
            }
        };
        out.push(cmd);
    }
    Ok(out)
}
