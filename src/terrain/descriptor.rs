//! Text terrain descriptors (`.ter` files) referenced from the DSF.

use crate::compile::config::CompileConfig;
use crate::geo::{gtile_to_wgs84, webmercator_pixel_size, TextureKey};
use crate::mesh::TriType;

use super::VertexStyle;

/// Shared normal map used by physical water terrains.
pub const WATER_NORMAL_MAP: &str = "water_normal_map.dds";
/// Shared border texture used by constant-alpha water overlays.
pub const WATER_TRANSITION: &str = "water_transition.png";

const DECAL_LIB: &str = "lib/g10/decals/maquify_2_green_key.dcl";

/// Descriptor file name: the texture stem with type and overlay suffixes.
pub fn terrain_file_name(key: &TextureKey, kind: TriType, overlay: bool) -> String {
    let dds = key.dds_file_name();
    let stem = dds.strip_suffix(".dds").unwrap_or(&dds);
    let suffix = match kind {
        TriType::Land => "",
        TriType::Water => "_water",
        TriType::Sea => "_sea",
    };
    let overlay = if overlay { "_overlay" } else { "" };
    format!("{stem}{suffix}{overlay}.ter")
}

/// Which lines the texture needs beyond the base texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finish {
    Plain,
    NormalMap,
    Transition,
    BorderMask,
}

fn finish(kind: TriType, style: VertexStyle, config: &CompileConfig) -> Finish {
    match style {
        VertexStyle::FlatTextured => Finish::NormalMap,
        VertexStyle::AlphaOverlay => Finish::Transition,
        VertexStyle::BorderMasked => Finish::BorderMask,
        VertexStyle::Shaded if kind == TriType::Sea && config.experimental_sea() => Finish::NormalMap,
        VertexStyle::Shaded | VertexStyle::Water => Finish::Plain,
    }
}

/// Resource textures a descriptor refers to.
pub fn required_resources(kind: TriType, style: VertexStyle, config: &CompileConfig) -> Option<&'static str> {
    match finish(kind, style, config) {
        Finish::NormalMap => Some(WATER_NORMAL_MAP),
        Finish::Transition => Some(WATER_TRANSITION),
        Finish::Plain | Finish::BorderMask => None,
    }
}

/// Render the descriptor text for a textured terrain.
pub fn render_descriptor(
    key: &TextureKey,
    kind: TriType,
    style: VertexStyle,
    config: &CompileConfig,
) -> String {
    let zl = key.zoom;
    let (lat, lon) = gtile_to_wgs84(key.til_x as f64 + 8.0, key.til_y as f64 + 8.0, zl);
    let size = (webmercator_pixel_size(lat, zl) * 4096.0) as u64;

    let mut out = String::from("A\n800\nTERRAIN\n\n");
    out.push_str(&format!("LOAD_CENTER {lat:.5} {lon:.5} {size} 4096\n"));
    out.push_str(&format!("BASE_TEX_NOWRAP ../textures/{}\n", key.dds_file_name()));

    match finish(kind, style, config) {
        Finish::NormalMap => {
            let scale = 2f64.powi(17 - zl as i32);
            out.push_str(&format!("TEXTURE_NORMAL {scale} ../textures/{WATER_NORMAL_MAP}\n"));
            out.push_str("GLOBAL_specular 1.0\n");
            out.push_str("NORMAL_METALNESS\n");
        }
        Finish::Transition => {
            out.push_str(&format!("BORDER_TEX ../textures/{WATER_TRANSITION}\n"));
        }
        Finish::BorderMask => {
            let border = 4096u32 >> zl.saturating_sub(config.mask_zl).min(12);
            out.push_str(&format!("LOAD_CENTER_BORDER {lat:.5} {lon:.5} {size} {border}\n"));
            out.push_str(&format!("BORDER_TEX ../textures/{}\n", key.mask_file_name()));
        }
        Finish::Plain => {}
    }

    if kind == TriType::Land && config.use_decal_on_terrain {
        out.push_str(&format!("DECAL_LIB {DECAL_LIB}\n"));
    }
    out.push_str(if kind.is_wet() { "WET\n" } else { "NO_ALPHA\n" });
    if kind.is_wet() || !config.terrain_casts_shadows {
        out.push_str("NO_SHADOW\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> TextureKey {
        TextureKey::new(34000, 23000, 16, "BI")
    }

    #[test]
    fn test_file_names() {
        assert_eq!(terrain_file_name(&key(), TriType::Land, false), "23000_34000_BI16.ter");
        assert_eq!(terrain_file_name(&key(), TriType::Water, true), "23000_34000_BI16_water_overlay.ter");
        assert_eq!(terrain_file_name(&key(), TriType::Sea, false), "23000_34000_BI16_sea.ter");
    }

    #[test]
    fn test_land_descriptor() {
        let mut cfg = CompileConfig::default();
        let text = render_descriptor(&key(), TriType::Land, VertexStyle::Shaded, &cfg);
        assert!(text.starts_with("A\n800\nTERRAIN\n\nLOAD_CENTER "));
        assert!(text.contains("BASE_TEX_NOWRAP ../textures/23000_34000_BI16.dds\n"));
        assert!(text.ends_with("NO_ALPHA\n"));
        assert!(!text.contains("NO_SHADOW"));
        assert!(!text.contains("DECAL_LIB"));

        cfg.use_decal_on_terrain = true;
        cfg.terrain_casts_shadows = false;
        let text = render_descriptor(&key(), TriType::Land, VertexStyle::Shaded, &cfg);
        assert!(text.contains("DECAL_LIB lib/g10/decals/maquify_2_green_key.dcl\n"));
        assert!(text.ends_with("NO_ALPHA\nNO_SHADOW\n"));
    }

    #[test]
    fn test_load_center_values() {
        let cfg = CompileConfig::default();
        let text = render_descriptor(&key(), TriType::Land, VertexStyle::Shaded, &cfg);
        let line = text.lines().find(|l| l.starts_with("LOAD_CENTER ")).unwrap();
        let parts: Vec<&str> = line.split_whitespace().collect();
        let (lat, lon) = gtile_to_wgs84(34008.0, 23008.0, 16);
        assert_eq!(parts[1], format!("{lat:.5}"));
        assert_eq!(parts[2], format!("{lon:.5}"));
        let size: u64 = parts[3].parse().unwrap();
        assert!(size > 1000 && size < 10000);
        assert_eq!(parts[4], "4096");
    }

    #[test]
    fn test_water_descriptors() {
        let cfg = CompileConfig::default();
        let overlay = render_descriptor(&key(), TriType::Water, VertexStyle::AlphaOverlay, &cfg);
        assert!(overlay.contains("BORDER_TEX ../textures/water_transition.png\n"));
        assert!(overlay.ends_with("WET\nNO_SHADOW\n"));

        let physical = render_descriptor(&key(), TriType::Water, VertexStyle::FlatTextured, &cfg);
        assert!(physical.contains("TEXTURE_NORMAL 2 ../textures/water_normal_map.dds\n"));
        assert!(physical.contains("GLOBAL_specular 1.0\nNORMAL_METALNESS\n"));
        assert_eq!(required_resources(TriType::Water, VertexStyle::FlatTextured, &cfg), Some(WATER_NORMAL_MAP));
    }

    #[test]
    fn test_sea_descriptors() {
        let mut cfg = CompileConfig::default();
        let masked = render_descriptor(&key(), TriType::Sea, VertexStyle::BorderMasked, &cfg);
        assert!(masked.contains(" 1024\nBORDER_TEX ../textures/23000_34000_ZL16.png\n"));
        assert!(masked.contains("LOAD_CENTER_BORDER "));

        let imprinted = render_descriptor(&key(), TriType::Sea, VertexStyle::Shaded, &cfg);
        assert!(!imprinted.contains("BORDER_TEX"));
        assert!(!imprinted.contains("TEXTURE_NORMAL"));

        cfg.experimental_water = 2;
        let imprinted = render_descriptor(&key(), TriType::Sea, VertexStyle::Shaded, &cfg);
        assert!(imprinted.contains("TEXTURE_NORMAL 2 "));
    }

    #[test]
    fn test_normal_scale_fractional_above_zl17() {
        let cfg = CompileConfig::default();
        let key = TextureKey::new(0, 0, 18, "GO2");
        let text = render_descriptor(&key, TriType::Water, VertexStyle::FlatTextured, &cfg);
        assert!(text.contains("TEXTURE_NORMAL 0.5 "));
    }
}
