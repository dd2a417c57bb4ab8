//! Fixed-precision encodings used by the point pools.
//!
//! DSF planes store unsigned 16-bit integers decoded as
//! `offset + raw * scale / 65535`.

/// Largest raw plane value.
pub const RAW_MAX: f64 = 65535.0;

/// Raw value of a horizontal normal component of zero.
pub const FLAT_NORMAL: u16 = 32768;

/// Binary-fraction address of a tile-relative coordinate in [0, 1].
///
/// Bit 31 is the first split of the tile, bit 30 the second and so on.
/// Values at or past the north/east edge map to the last address.
pub fn address(v: f64) -> u32 {
    if v >= 1.0 {
        u32::MAX
    } else if v <= 0.0 {
        0
    } else {
        (v * 4_294_967_296.0) as u32
    }
}

/// Index of the quadtree cell holding `addr` at `depth`.
pub fn cell_index(addr: u32, depth: u8) -> u32 {
    if depth == 0 {
        0
    } else {
        addr >> (32 - depth as u32)
    }
}

#[inline]
fn to_raw(v: f64) -> u16 {
    v.round().clamp(0.0, RAW_MAX) as u16
}

/// Linear 16-bit quantization over `[offset, offset + scale]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisScale {
    pub scale: f64,
    pub offset: f64,
}

impl AxisScale {
    pub fn new(scale: f64, offset: f64) -> Self {
        Self { scale, offset }
    }

    /// Horizontal axis of a quadtree cell: scale `2^-depth`, offset at the
    /// cell's lower edge.
    pub fn for_cell(origin: f64, index: u32, depth: u8) -> Self {
        let scale = 0.5f64.powi(depth as i32);
        Self::new(scale, origin + index as f64 * scale)
    }

    /// Size of one quantization step.
    pub fn step(&self) -> f64 {
        self.scale / RAW_MAX
    }

    pub fn encode(&self, v: f64) -> u16 {
        to_raw((v - self.offset) / self.scale * RAW_MAX)
    }

    pub fn decode(&self, raw: u16) -> f64 {
        self.offset + raw as f64 * self.scale / RAW_MAX
    }
}

/// Altitude quantization of one pool.
///
/// The scale is picked from four fixed ranges whose steps divide 65535
/// exactly: 1/85, 1/51, 1/15 and 1/5 metre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AltitudeScale {
    pub scale: u32,
    pub inv_step: u32,
    pub alt_min: f64,
}

impl AltitudeScale {
    pub const TABLE: [(f64, u32, u32); 3] = [
        (770.0, 771, 85),
        (1284.0, 1285, 51),
        (4368.0, 4369, 15),
    ];
    pub const WIDEST: (u32, u32) = (13107, 5);

    /// Pick the finest scale covering altitudes `min..=max`.
    pub fn for_range(min: f64, max: f64) -> Self {
        let alt_min = min.floor();
        let range = max.ceil() - alt_min;
        let (scale, inv_step) = Self::TABLE
            .iter()
            .find(|(limit, _, _)| range < *limit)
            .map(|&(_, scale, inv_step)| (scale, inv_step))
            .unwrap_or(Self::WIDEST);
        Self { scale, inv_step, alt_min }
    }

    pub fn step(&self) -> f64 {
        1.0 / self.inv_step as f64
    }

    pub fn axis(&self) -> AxisScale {
        AxisScale::new(self.scale as f64, self.alt_min)
    }

    pub fn encode(&self, alt: f64) -> u16 {
        to_raw((alt - self.alt_min) * self.inv_step as f64)
    }

    pub fn decode(&self, raw: u16) -> f64 {
        self.alt_min + raw as f64 / self.inv_step as f64
    }
}

/// East component of a normal, mapped [-1, 1] to [0, 65535].
pub fn encode_normal_x(nx: f64, strength: f64) -> u16 {
    to_raw((1.0 + strength * nx) / 2.0 * RAW_MAX)
}

/// North component of a normal. DSF normals point south, hence the flip.
pub fn encode_normal_y(ny: f64, strength: f64) -> u16 {
    to_raw((1.0 - strength * ny) / 2.0 * RAW_MAX)
}

/// Unit interval value (texture coordinate, ratio) mapped to [0, 65535].
pub fn encode_unit(v: f64) -> u16 {
    to_raw(v * RAW_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_edges() {
        assert_eq!(address(0.0), 0);
        assert_eq!(address(-1e-9), 0);
        assert_eq!(address(1.0), u32::MAX);
        assert_eq!(address(0.5), 1 << 31);
        assert_eq!(cell_index(address(0.5), 1), 1);
        assert_eq!(cell_index(address(0.4999), 1), 0);
        assert_eq!(cell_index(address(0.3), 3), 2);
        assert_eq!(cell_index(address(1.0), 3), 7);
        assert_eq!(cell_index(u32::MAX, 0), 0);
    }

    #[test]
    fn test_altitude_table() {
        for &(limit, scale, inv_step) in &AltitudeScale::TABLE {
            assert_eq!(scale * inv_step, 65535);
            assert!((limit as u32) < scale);
        }
        assert_eq!(AltitudeScale::WIDEST.0 * AltitudeScale::WIDEST.1, 65535);

        let low = AltitudeScale::for_range(10.2, 500.0);
        assert_eq!((low.scale, low.inv_step, low.alt_min), (771, 85, 10.0));
        assert_eq!(AltitudeScale::for_range(0.0, 770.0).scale, 1285);
        assert_eq!(AltitudeScale::for_range(0.0, 1283.0).scale, 1285);
        assert_eq!(AltitudeScale::for_range(-100.0, 3000.0).scale, 4369);
        assert_eq!(AltitudeScale::for_range(0.0, 8848.0).scale, 13107);
    }

    #[test]
    fn test_altitude_error_within_half_step() {
        let scale = AltitudeScale::for_range(123.4, 1100.0);
        let mut alt = 123.4;
        while alt <= 1100.0 {
            let back = scale.decode(scale.encode(alt));
            assert!((back - alt).abs() <= scale.step() / 2.0 + 1e-9);
            alt += 0.731;
        }
    }

    #[test]
    fn test_axis_error_within_half_step() {
        let axis = AxisScale::for_cell(6.0, 5, 4);
        assert_eq!(axis.offset, 6.3125);
        let mut x = axis.offset;
        while x <= axis.offset + axis.scale {
            let back = axis.decode(axis.encode(x));
            assert!((back - x).abs() <= axis.step() / 2.0 + 1e-12);
            x += 0.000_123_7;
        }
    }

    #[test]
    fn test_normal_and_unit_encoding() {
        assert_eq!(encode_normal_x(0.0, 1.0), FLAT_NORMAL);
        assert_eq!(encode_normal_y(0.0, 1.0), FLAT_NORMAL);
        assert_eq!(encode_normal_x(1.0, 1.0), 65535);
        assert_eq!(encode_normal_y(1.0, 1.0), 0);
        assert_eq!(encode_normal_x(-1.0, 0.5), 16384);
        assert_eq!(encode_unit(0.0), 0);
        assert_eq!(encode_unit(1.0), 65535);
        assert_eq!(encode_unit(2.0), 65535);
    }
}
