//! MDEC stage: MDEC codes to dequantized blocks to YCbCr planes.

use log::trace;

use crate::bitstream::{MdecCode, MdecInput, BLOCKS_PER_MACROBLOCK};
use crate::color::psx_to_rgb;
use crate::config::{ChromaConversion, IdctKind};
use crate::error::DecodeError;
use crate::idct;

/// Maps zig-zag order to raster order.
#[rustfmt::skip]
pub const ZIG_ZAG: [u8; 64] = [
     0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

/// Default intra quantization matrix in raster order. The DC weight is 2.
#[rustfmt::skip]
pub const PSX_QUANTIZATION_MATRIX: [u8; 64] = [
     2, 16, 19, 22, 26, 27, 29, 34,
    16, 16, 22, 24, 27, 29, 34, 37,
    19, 22, 26, 27, 29, 34, 34, 38,
    22, 22, 26, 27, 29, 34, 37, 40,
    22, 26, 27, 29, 32, 35, 40, 48,
    26, 27, 29, 32, 35, 40, 48, 58,
    26, 27, 29, 34, 38, 46, 56, 69,
    27, 29, 35, 38, 46, 56, 69, 83,
];

fn saturate12(v: i32) -> i32 {
    v.clamp(-2048, 2047)
}

/// Dequantize an AC level at raster position `pos`.
#[inline]
pub fn dequantize_ac(level: i32, qscale: u8, pos: usize) -> i32 {
    saturate12((level * i32::from(PSX_QUANTIZATION_MATRIX[pos]) * i32::from(qscale) + 4) >> 3)
}

/// Read one block from `input` into `block` (raster order, dequantized).
/// Returns whether any AC coefficient was present.
pub fn read_block<I: MdecInput + ?Sized>(input: &mut I, block: &mut [i32; 64]) -> Result<bool, DecodeError> {
    block.fill(0);

    let header = input.next_code()?;
    let qscale = header.top6;
    block[0] = saturate12(i32::from(header.bottom10) * i32::from(PSX_QUANTIZATION_MATRIX[0]));

    let mut pos = 0usize;
    let mut has_ac = false;
    loop {
        let code: MdecCode = input.next_code()?;
        if code.is_end_of_block() {
            break;
        }
        pos += usize::from(code.top6) + 1;
        if pos > 63 {
            return Err(DecodeError::RunLengthOutOfBounds {
                position: pos,
                bit_position: input.position(),
            });
        }
        let raster = usize::from(ZIG_ZAG[pos]);
        block[raster] = dequantize_ac(i32::from(code.bottom10), qscale, raster);
        has_ac = true;
    }
    Ok(has_ac)
}

/// One plane of signed samples.
pub struct Plane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<i16>,
}

impl Plane {
    fn new(width: usize, height: usize) -> Plane {
        Plane {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> i16 {
        self.data[y * self.width + x]
    }

    /// Store an 8x8 block at `(x, y)`, clamped to the signed 8-bit range.
    fn block_set(&mut self, x: usize, y: usize, samples: &[i32; 64]) {
        for row in 0..8 {
            let dest = (y + row) * self.width + x;
            for (d, s) in self.data[dest..dest + 8].iter_mut().zip(samples[row * 8..row * 8 + 8].iter()) {
                *d = (*s).clamp(-128, 127) as i16;
            }
        }
    }
}

/// Decodes whole frames of MDEC codes into Y, Cb and Cr planes.
pub struct MdecDecoder {
    width: u16,
    height: u16,
    mb_width: usize,
    mb_height: usize,
    idct: IdctKind,
    y: Plane,
    cb: Plane,
    cr: Plane,
}

impl MdecDecoder {
    pub fn new(width: u16, height: u16, idct: IdctKind) -> MdecDecoder {
        let mb_width = (usize::from(width) + 15) / 16;
        let mb_height = (usize::from(height) + 15) / 16;
        MdecDecoder {
            width,
            height,
            mb_width,
            mb_height,
            idct,
            // 16 luma and 8 chroma samples per macroblock side.
            y: Plane::new(mb_width * 16, mb_height * 16),
            cb: Plane::new(mb_width * 8, mb_height * 8),
            cr: Plane::new(mb_width * 8, mb_height * 8),
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn macroblocks(&self) -> usize {
        self.mb_width * self.mb_height
    }

    pub fn luma(&self) -> &Plane {
        &self.y
    }

    pub fn cb(&self) -> &Plane {
        &self.cb
    }

    pub fn cr(&self) -> &Plane {
        &self.cr
    }

    /// Decode every macroblock of one frame. Macroblocks run down each
    /// column before moving right.
    pub fn decode<I: MdecInput + ?Sized>(&mut self, input: &mut I) -> Result<(), DecodeError> {
        let mut block = [0i32; 64];
        for mb in 0..self.macroblocks() {
            let mb_x = mb / self.mb_height;
            let mb_y = mb % self.mb_height;
            for b in 0..BLOCKS_PER_MACROBLOCK {
                let has_ac = read_block(input, &mut block)?;
                idct::transform(self.idct, &mut block, has_ac);
                match b {
                    0 => self.cr.block_set(mb_x * 8, mb_y * 8, &block),
                    1 => self.cb.block_set(mb_x * 8, mb_y * 8, &block),
                    _ => {
                        let n = b - 2;
                        let x = mb_x * 16 + (n & 1) * 8;
                        let y = mb_y * 16 + (n >> 1) * 8;
                        self.y.block_set(x, y, &block);
                    }
                }
            }
            trace!("macroblock {} ({}, {}) done at bit {}", mb, mb_x, mb_y, input.position());
        }
        Ok(())
    }

    /// Convert the decoded planes to packed RGB24, cropped to the frame size.
    pub fn to_rgb(&self, chroma: ChromaConversion) -> Vec<u8> {
        let bytes_per_pixel = 3;
        let (width, height) = (usize::from(self.width), usize::from(self.height));
        let mut dest = vec![0u8; width * height * bytes_per_pixel];

        // Each chroma sample covers a 2x2 square of luma samples.
        for row in 0..(height + 1) / 2 {
            for col in 0..(width + 1) / 2 {
                let cb = i32::from(self.cb.get(col, row));
                let cr = i32::from(self.cr.get(col, row));
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    let (x, y) = (col * 2 + dx, row * 2 + dy);
                    if x >= width || y >= height {
                        continue;
                    }
                    let rgb = psx_to_rgb(i32::from(self.y.get(x, y)), cb, cr, chroma);
                    let d = (y * width + x) * bytes_per_pixel;
                    dest[d..d + 3].copy_from_slice(&rgb);
                }
            }
        }
        dest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::RawMdecInput;

    fn raw(codes: &[MdecCode]) -> Vec<u8> {
        codes.iter().flat_map(|c| c.to_u16().to_le_bytes()).collect()
    }

    #[test]
    fn dequantizes_and_unzigzags() {
        let data = raw(&[
            MdecCode::new(8, 80),
            MdecCode::new(0, 3),
            MdecCode::new(1, -2),
            MdecCode::END_OF_BLOCK,
        ]);
        let mut block = [0i32; 64];
        let has_ac = read_block(&mut RawMdecInput::new(&data), &mut block).unwrap();
        assert!(has_ac);
        assert_eq!(block[0], 160);
        // zig-zag 1 is raster 1, zig-zag 3 is raster 16.
        assert_eq!(block[1], (3 * 16 * 8 + 4) >> 3);
        assert_eq!(block[16], (-2 * 19 * 8 + 4) >> 3);
        assert_eq!(block.iter().filter(|&&v| v != 0).count(), 3);
    }

    #[test]
    fn levels_saturate() {
        assert_eq!(dequantize_ac(511, 63, 63), 2047);
        assert_eq!(dequantize_ac(-512, 63, 63), -2048);
    }

    #[test]
    fn run_past_end_of_block() {
        let data = raw(&[MdecCode::new(1, 0), MdecCode::new(40, 1), MdecCode::new(30, 1)]);
        let mut block = [0i32; 64];
        assert!(matches!(
            read_block(&mut RawMdecInput::new(&data), &mut block),
            Err(DecodeError::RunLengthOutOfBounds { position: 72, .. })
        ));
    }

    #[test]
    fn macroblock_layout() {
        // 16x32: two macroblocks in one column. Luma DCs tag each block.
        let mut codes = Vec::new();
        for mb in 0..2i16 {
            for b in 0..6i16 {
                codes.push(MdecCode::new(1, (mb * 6 + b) * 8 * 4));
                codes.push(MdecCode::END_OF_BLOCK);
            }
        }
        let data = raw(&codes);
        let mut dec = MdecDecoder::new(16, 32, IdctKind::FixedPoint);
        dec.decode(&mut RawMdecInput::new(&data)).unwrap();

        // dc * 2 / 8 == tag * 8
        let tag = |v: i16| v / 8;
        assert_eq!(tag(dec.cr().get(0, 0)), 0);
        assert_eq!(tag(dec.cb().get(7, 7)), 1);
        assert_eq!(tag(dec.luma().get(0, 0)), 2);
        assert_eq!(tag(dec.luma().get(8, 0)), 3);
        assert_eq!(tag(dec.luma().get(0, 8)), 4);
        assert_eq!(tag(dec.luma().get(15, 15)), 5);
        // Second macroblock sits below the first.
        assert_eq!(tag(dec.cr().get(0, 8)), 6);
        assert_eq!(tag(dec.luma().get(0, 16)), 8);
        assert_eq!(tag(dec.luma().get(15, 31)), 11);
    }

    #[test]
    fn uniform_gray() {
        let mut codes = Vec::new();
        for b in 0..6 {
            codes.push(MdecCode::new(1, if b < 2 { 0 } else { 80 }));
            codes.push(MdecCode::END_OF_BLOCK);
        }
        let data = raw(&codes);
        let mut dec = MdecDecoder::new(16, 16, IdctKind::Reference);
        dec.decode(&mut RawMdecInput::new(&data)).unwrap();
        let rgb = dec.to_rgb(ChromaConversion::Psx);
        assert_eq!(rgb.len(), 16 * 16 * 3);
        assert!(rgb.iter().all(|&v| v == 148));
    }
}
