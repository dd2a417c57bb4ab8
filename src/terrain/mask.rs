//! Alpha masks for textured sea terrains.

use std::path::{Path, PathBuf};

use image::GrayImage;

use crate::geo::{legacy_mask_file_name, TextureKey, TileCoord};

/// Mask rasters are 4096 pixels square.
pub const MASK_SIZE: u32 = 4096;

/// Masks whose brightest pixel is at or below this are treated as empty.
pub const EMPTY_MASK_MAX: u8 = 30;

/// Decides whether a texture needs an alpha mask and provides it.
pub trait AlphaMaskOracle: Send + Sync {
    fn mask(&self, key: &TextureKey) -> Option<GrayImage>;
}

/// Never masks anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMasks;

impl AlphaMaskOracle for NoMasks {
    fn mask(&self, _key: &TextureKey) -> Option<GrayImage> {
        None
    }
}

/// Crops texture masks out of the per-cell legacy masks at the mask zoom level.
#[derive(Debug, Clone)]
pub struct LegacyMaskOracle {
    dir: PathBuf,
    mask_zl: u8,
}

impl LegacyMaskOracle {
    pub fn new(dir: impl Into<PathBuf>, mask_zl: u8) -> Self {
        Self { dir: dir.into(), mask_zl }
    }

    pub fn for_tile(mask_root: &Path, tile: TileCoord, mask_zl: u8) -> Self {
        Self::new(tile.mask_dir(mask_root), mask_zl)
    }

    /// Legacy mask cell and the crop (x, y, size) covering `key`, or `None`
    /// when the texture is coarser than the masks.
    pub fn locate(&self, key: &TextureKey) -> Option<((u32, u32), (u32, u32, u32))> {
        if key.zoom < self.mask_zl {
            return None;
        }
        let factor = 1u32 << (key.zoom - self.mask_zl);
        let m_x = (key.til_x / factor) / 16 * 16;
        let m_y = (key.til_y / factor) / 16 * 16;
        let rx = (key.til_x - factor * m_x) / 16;
        let ry = (key.til_y - factor * m_y) / 16;
        let size = MASK_SIZE / factor;
        Some(((m_x, m_y), (rx * size, ry * size, size)))
    }
}

impl AlphaMaskOracle for LegacyMaskOracle {
    fn mask(&self, key: &TextureKey) -> Option<GrayImage> {
        let ((m_x, m_y), (x0, y0, size)) = self.locate(key)?;
        let path = self.dir.join(legacy_mask_file_name(m_x, m_y));
        if !path.exists() {
            return None;
        }
        let big = match image::open(&path) {
            Ok(img) => img.to_luma8(),
            Err(e) => {
                log::warn!("Unreadable mask {}: {}", path.display(), e);
                return None;
            }
        };
        if x0 + size > big.width() || y0 + size > big.height() {
            log::warn!("Mask {} is smaller than {}x{}", path.display(), MASK_SIZE, MASK_SIZE);
            return None;
        }
        let crop = image::imageops::crop_imm(&big, x0, y0, size, size).to_image();
        let max = crop.pixels().map(|p| p.0[0]).max().unwrap_or(0);
        if max <= EMPTY_MASK_MAX {
            return None;
        }
        Some(crop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_locate_sub_square() {
        let oracle = LegacyMaskOracle::new("unused", 14);
        // ZL16 texture: 4x4 textures per legacy mask, 1024 px each
        let key = TextureKey::new(16 * 4 * 10 + 32, 16 * 4 * 7 + 48, 16, "BI");
        let ((m_x, m_y), (x0, y0, size)) = oracle.locate(&key).unwrap();
        assert_eq!((m_x, m_y), (160, 112));
        assert_eq!(size, 1024);
        assert_eq!((x0, y0), (2048, 3072));

        assert!(oracle.locate(&TextureKey::new(0, 0, 13, "BI")).is_none());
        let same = oracle.locate(&TextureKey::new(32, 16, 14, "BI")).unwrap();
        assert_eq!(same, ((32, 16), (0, 0, 4096)));
    }

    #[test]
    fn test_mask_cropped_and_thresholded() {
        let dir = TempDir::new().unwrap();
        let mut big = GrayImage::new(MASK_SIZE, MASK_SIZE);
        // Bright square in the second quarter column, first row, at ZL15
        for y in 0..100 {
            for x in 2048..2148 {
                big.put_pixel(x, y, image::Luma([200]));
            }
        }
        big.put_pixel(10, 10, image::Luma([EMPTY_MASK_MAX]));
        big.save(dir.path().join(legacy_mask_file_name(0, 0))).unwrap();

        let oracle = LegacyMaskOracle::new(dir.path(), 14);
        let bright = oracle.mask(&TextureKey::new(16, 0, 15, "BI")).unwrap();
        assert_eq!(bright.dimensions(), (2048, 2048));
        assert_eq!(bright.get_pixel(0, 0).0[0], 200);

        assert!(oracle.mask(&TextureKey::new(0, 0, 15, "BI")).is_none());
        assert!(oracle.mask(&TextureKey::new(0, 16, 15, "BI")).is_none());
        assert!(oracle.mask(&TextureKey::new(512, 0, 15, "BI")).is_none());
    }

    #[test]
    fn test_no_masks() {
        assert!(NoMasks.mask(&TextureKey::new(0, 0, 18, "BI")).is_none());
    }
}
