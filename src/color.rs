//! Colour space conversions.
//!
//! Three YCbCr conventions show up around PS1 media and they are not
//! interchangeable:
//! - PSX (MDEC output): Y, Cb and Cr all centred on 0, full range.
//! - JFIF: Y in 0..=255, Cb and Cr centred on 128, full range.
//! - Rec.601: studio range, Y in 16..=235, chroma in 16..=240.

use crate::config::ChromaConversion;

#[inline(always)]
pub fn clamp(n: i32) -> u8 {
    if n > 255 {
        255
    } else if n < 0 {
        0
    } else {
        n as u8
    }
}

// PSX chroma coefficients in 8-bit fixed point.
const CR_TO_R: i32 = 359; // 1.402
const CB_TO_G: i32 = -88; // -0.3437
const CR_TO_G: i32 = -183; // -0.7143
const CB_TO_B: i32 = 454; // 1.772

/// Convert one MDEC sample triple to RGB, as the hardware does.
#[inline]
pub fn psx_to_rgb(y: i32, cb: i32, cr: i32, chroma: ChromaConversion) -> [u8; 3] {
    let (cb, cr) = match chroma {
        ChromaConversion::Psx => (cb, cr),
        ChromaConversion::LegacySwapped => (cr, cb),
    };
    let r = (CR_TO_R * cr + 128) >> 8;
    let g = (CB_TO_G * cb + CR_TO_G * cr + 128) >> 8;
    let b = (CB_TO_B * cb + 128) >> 8;
    let y = y + 128;
    [clamp(y + r), clamp(y + g), clamp(y + b)]
}

/// PSX YCbCr with real valued components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsxYCbCr {
    pub y: f64,
    pub cb: f64,
    pub cr: f64,
}

impl PsxYCbCr {
    pub fn to_rgb(&self) -> [f64; 3] {
        let y = self.y + 128.0;
        [
            y + 1.402 * self.cr,
            y - 0.3437 * self.cb - 0.7143 * self.cr,
            y + 1.772 * self.cb,
        ]
    }

    pub fn from_rgb(rgb: [f64; 3]) -> PsxYCbCr {
        let [r, g, b] = rgb;
        PsxYCbCr {
            y: 0.299 * r + 0.587 * g + 0.114 * b - 128.0,
            cb: -0.168736 * r - 0.331264 * g + 0.5 * b,
            cr: 0.5 * r - 0.418688 * g - 0.081312 * b,
        }
    }
}

/// JPEG File Interchange Format YCbCr.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JfifYCbCr {
    pub y: f64,
    pub cb: f64,
    pub cr: f64,
}

impl JfifYCbCr {
    pub fn to_rgb(&self) -> [f64; 3] {
        let (cb, cr) = (self.cb - 128.0, self.cr - 128.0);
        [
            self.y + 1.402 * cr,
            self.y - 0.344136 * cb - 0.714136 * cr,
            self.y + 1.772 * cb,
        ]
    }

    pub fn from_rgb(rgb: [f64; 3]) -> JfifYCbCr {
        let [r, g, b] = rgb;
        JfifYCbCr {
            y: 0.299 * r + 0.587 * g + 0.114 * b,
            cb: 128.0 - 0.168736 * r - 0.331264 * g + 0.5 * b,
            cr: 128.0 + 0.5 * r - 0.418688 * g - 0.081312 * b,
        }
    }
}

/// ITU-R BT.601 studio range YCbCr.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rec601YCbCr {
    pub y: f64,
    pub cb: f64,
    pub cr: f64,
}

impl Rec601YCbCr {
    pub fn to_rgb(&self) -> [f64; 3] {
        let y = 1.164 * (self.y - 16.0);
        let (cb, cr) = (self.cb - 128.0, self.cr - 128.0);
        [y + 1.596 * cr, y - 0.392 * cb - 0.813 * cr, y + 2.017 * cb]
    }

    pub fn from_rgb(rgb: [f64; 3]) -> Rec601YCbCr {
        let [r, g, b] = rgb;
        Rec601YCbCr {
            y: 16.0 + 0.257 * r + 0.504 * g + 0.098 * b,
            cb: 128.0 - 0.148 * r - 0.291 * g + 0.439 * b,
            cr: 128.0 + 0.439 * r - 0.368 * g - 0.071 * b,
        }
    }
}

/// Alpha given to ABGR1555 pixels that are not black but have the
/// semi-transparency bit set.
pub const SEMI_TRANSPARENT_ALPHA: u8 = 0x7F;

const STP_BIT: u16 = 0x8000;

#[inline]
fn expand5(c: u16) -> u32 {
    let c = u32::from(c & 0x1F);
    (c << 3) | (c >> 2)
}

/// 16-bit ABGR1555 (as used by TIM images) to ARGB8888.
pub fn abgr1555_to_argb8888(pixel: u16) -> u32 {
    let r = expand5(pixel);
    let g = expand5(pixel >> 5);
    let b = expand5(pixel >> 10);
    let black = pixel & 0x7FFF == 0;
    let alpha: u32 = match (black, pixel & STP_BIT != 0) {
        (true, false) => 0,
        (true, true) => 255,
        (false, false) => 255,
        (false, true) => u32::from(SEMI_TRANSPARENT_ALPHA),
    };
    (alpha << 24) | (r << 16) | (g << 8) | b
}

/// ARGB8888 back to ABGR1555. Colour is quantized to 5 bits; any alpha
/// other than 0 or 255 becomes semi-transparent. Semi-transparent black has
/// no encoding and becomes the darkest red instead.
pub fn argb8888_to_abgr1555(pixel: u32) -> u16 {
    let alpha = (pixel >> 24) as u8;
    let r = ((pixel >> 19) & 0x1F) as u16;
    let g = ((pixel >> 11) & 0x1F) as u16;
    let b = ((pixel >> 3) & 0x1F) as u16;
    let rgb5 = (b << 10) | (g << 5) | r;
    match alpha {
        0 => 0,
        255 if rgb5 == 0 => STP_BIT,
        255 => rgb5,
        _ if rgb5 == 0 => 0x0001 | STP_BIT,
        _ => rgb5 | STP_BIT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray() {
        assert_eq!(psx_to_rgb(20, 0, 0, ChromaConversion::Psx), [148, 148, 148]);
        assert_eq!(psx_to_rgb(-128, 0, 0, ChromaConversion::Psx), [0, 0, 0]);
        assert_eq!(psx_to_rgb(127, 0, 0, ChromaConversion::Psx), [255, 255, 255]);
    }

    #[test]
    fn legacy_swaps_chroma() {
        let psx = psx_to_rgb(0, 40, -20, ChromaConversion::Psx);
        let legacy = psx_to_rgb(0, -20, 40, ChromaConversion::LegacySwapped);
        assert_eq!(psx, legacy);
        assert_ne!(psx, psx_to_rgb(0, 40, -20, ChromaConversion::LegacySwapped));
    }

    #[test]
    fn fixed_point_tracks_real_valued() {
        for y in (-128..128).step_by(17) {
            for cb in (-128..128).step_by(13) {
                for cr in (-128..128).step_by(11) {
                    let fixed = psx_to_rgb(y, cb, cr, ChromaConversion::Psx);
                    let real = PsxYCbCr {
                        y: f64::from(y),
                        cb: f64::from(cb),
                        cr: f64::from(cr),
                    }
                    .to_rgb();
                    for (f, r) in fixed.iter().zip(real.iter()) {
                        let r = r.round().clamp(0.0, 255.0);
                        assert!((f64::from(*f) - r).abs() <= 1.0, "{} {} {}", y, cb, cr);
                    }
                }
            }
        }
    }

    #[test]
    fn colour_spaces_are_distinct() {
        let rgb = [250.0, 240.0, 230.0];
        let psx = PsxYCbCr::from_rgb(rgb);
        let jfif = JfifYCbCr::from_rgb(rgb);
        let rec = Rec601YCbCr::from_rgb(rgb);
        assert!((psx.y + 128.0 - jfif.y).abs() < 1e-9);
        assert!((jfif.y - rec.y).abs() > 1.0);

        for back in [psx.to_rgb(), jfif.to_rgb(), rec.to_rgb()] {
            for (a, b) in back.iter().zip(rgb.iter()) {
                assert!((a - b).abs() < 1.5, "{:?}", back);
            }
        }
    }

    #[test]
    fn abgr1555_alpha_rules() {
        assert_eq!(abgr1555_to_argb8888(0x0000), 0x0000_0000);
        assert_eq!(abgr1555_to_argb8888(0x8000), 0xFF00_0000);
        assert_eq!(abgr1555_to_argb8888(0x001F), 0xFFFF_0000);
        assert_eq!(abgr1555_to_argb8888(0x7C00 | 0x8000) >> 24, u32::from(SEMI_TRANSPARENT_ALPHA));
        assert_eq!(abgr1555_to_argb8888(0x7C00) & 0xFF, 0xFF);
    }

    #[test]
    fn argb_round_trip() {
        let expand = |c5: u32| (c5 << 3) | (c5 >> 2);
        assert_eq!(abgr1555_to_argb8888(argb8888_to_abgr1555(0)), 0);
        for (r5, g5, b5) in [(0, 0, 0), (1, 2, 3), (31, 0, 16), (7, 31, 31)] {
            let argb = 0xFF00_0000 | (expand(r5) << 16) | (expand(g5) << 8) | expand(b5);
            assert_eq!(abgr1555_to_argb8888(argb8888_to_abgr1555(argb)), argb, "{:08x}", argb);
        }
    }

    #[test]
    fn partial_alpha_becomes_sentinel() {
        for alpha in [1u32, 64, 128, 254] {
            let argb = (alpha << 24) | 0x00_80_40_20;
            let back = abgr1555_to_argb8888(argb8888_to_abgr1555(argb));
            assert_eq!(back >> 24, u32::from(SEMI_TRANSPARENT_ALPHA));
            assert_eq!(back & 0x00FF_FFFF, 0x00_84_42_21);
        }
    }

    #[test]
    fn semi_transparent_black_stays_semi_transparent() {
        let pixel = argb8888_to_abgr1555(0x8000_0000);
        assert_eq!(pixel, 0x8001);
        assert_eq!(abgr1555_to_argb8888(pixel), 0x7F08_0000);
    }
}
