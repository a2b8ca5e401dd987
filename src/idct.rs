//! 8x8 inverse DCTs.
//!
//! Coefficients are in raster order and use the orthonormal scale: a block
//! with only DC = `d` transforms to `d / 8` everywhere.

// The fixed point transform is the one from pl_mpeg
// (https://github.com/phoboslab/pl_mpeg), with the scale factors folded
// into a premultiplier applied to the input.

use std::f64::consts::PI;

use crate::config::IdctKind;

#[rustfmt::skip]
pub const PREMULTIPLIER: [i32; 64] = [
    32, 44, 42, 38, 32, 25, 17,  9,
    44, 62, 58, 52, 44, 35, 24, 12,
    42, 58, 55, 49, 42, 33, 23, 12,
    38, 52, 49, 44, 38, 30, 20, 10,
    32, 44, 42, 38, 32, 25, 17,  9,
    25, 35, 33, 30, 25, 20, 14,  7,
    17, 24, 23, 20, 17, 14,  9,  5,
     9, 12, 12, 10,  9,  7,  5,  2,
];

/// Floating point transform, straight from the definition. Slow; used as
/// the correctness oracle.
pub fn reference(coefficients: &[i32; 64]) -> [f64; 64] {
    let c = |u: usize| if u == 0 { std::f64::consts::FRAC_1_SQRT_2 } else { 1.0 };
    let mut out = [0f64; 64];
    for y in 0..8 {
        for x in 0..8 {
            let mut sum = 0.0;
            for v in 0..8 {
                for u in 0..8 {
                    let coeff = coefficients[v * 8 + u];
                    if coeff == 0 {
                        continue;
                    }
                    sum += c(u)
                        * c(v)
                        * f64::from(coeff)
                        * (((2 * x + 1) as f64 * u as f64 * PI) / 16.0).cos()
                        * (((2 * y + 1) as f64 * v as f64 * PI) / 16.0).cos();
                }
            }
            out[y * 8 + x] = sum / 4.0;
        }
    }
    out
}

/// Integer transform, in place.
pub fn fixed_point(block: &mut [i32; 64]) {
    for (b, m) in block.iter_mut().zip(PREMULTIPLIER.iter()) {
        *b *= m;
    }

    // Columns
    for i in 0..8 {
        let b1 = block[4 * 8 + i];
        let b3 = block[2 * 8 + i] + block[6 * 8 + i];
        let b4 = block[5 * 8 + i] - block[3 * 8 + i];
        let tmp1 = block[8 + i] + block[7 * 8 + i];
        let tmp2 = block[3 * 8 + i] + block[5 * 8 + i];
        let b6 = block[8 + i] - block[7 * 8 + i];
        let b7 = tmp1 + tmp2;
        let m0 = block[i];
        let x4 = ((b6 * 473 - b4 * 196 + 128) >> 8) - b7;
        let x0 = x4 - (((tmp1 - tmp2) * 362 + 128) >> 8);
        let x1 = m0 - b1;
        let x2 = (((block[2 * 8 + i] - block[6 * 8 + i]) * 362 + 128) >> 8) - b3;
        let x3 = m0 + b1;
        let y3 = x1 + x2;
        let y4 = x3 + b3;
        let y5 = x1 - x2;
        let y6 = x3 - b3;
        let y7 = -x0 - ((b4 * 473 + b6 * 196 + 128) >> 8);
        block[i] = b7 + y4;
        block[8 + i] = x4 + y3;
        block[2 * 8 + i] = y5 - x0;
        block[3 * 8 + i] = y6 - y7;
        block[4 * 8 + i] = y6 + y7;
        block[5 * 8 + i] = x0 + y5;
        block[6 * 8 + i] = y3 - x4;
        block[7 * 8 + i] = y4 - b7;
    }

    // Rows
    for i in (0..64).step_by(8) {
        let b1 = block[4 + i];
        let b3 = block[2 + i] + block[6 + i];
        let b4 = block[5 + i] - block[3 + i];
        let tmp1 = block[1 + i] + block[7 + i];
        let tmp2 = block[3 + i] + block[5 + i];
        let b6 = block[1 + i] - block[7 + i];
        let b7 = tmp1 + tmp2;
        let m0 = block[i];
        let x4 = ((b6 * 473 - b4 * 196 + 128) >> 8) - b7;
        let x0 = x4 - (((tmp1 - tmp2) * 362 + 128) >> 8);
        let x1 = m0 - b1;
        let x2 = (((block[2 + i] - block[6 + i]) * 362 + 128) >> 8) - b3;
        let x3 = m0 + b1;
        let y3 = x1 + x2;
        let y4 = x3 + b3;
        let y5 = x1 - x2;
        let y6 = x3 - b3;
        let y7 = -x0 - ((b4 * 473 + b6 * 196 + 128) >> 8);
        block[i] = (b7 + y4 + 128) >> 8;
        block[1 + i] = (x4 + y3 + 128) >> 8;
        block[2 + i] = (y5 - x0 + 128) >> 8;
        block[3 + i] = (y6 - y7 + 128) >> 8;
        block[4 + i] = (y6 + y7 + 128) >> 8;
        block[5 + i] = (x0 + y5 + 128) >> 8;
        block[6 + i] = (y3 - x4 + 128) >> 8;
        block[7 + i] = (y4 - b7 + 128) >> 8;
    }
}

/// Output value of every sample when only the DC coefficient is set.
#[inline(always)]
pub fn dc_only(dc: i32) -> i32 {
    (dc + 4) >> 3
}

/// Transform `block` in place with the chosen implementation, taking the DC
/// shortcut when no AC coefficient is set.
pub fn transform(kind: IdctKind, block: &mut [i32; 64], has_ac: bool) {
    if !has_ac {
        let v = dc_only(block[0]);
        block.fill(v);
        return;
    }
    match kind {
        IdctKind::FixedPoint => fixed_point(block),
        IdctKind::Reference => {
            let out = reference(block);
            for (b, o) in block.iter_mut().zip(out.iter()) {
                *b = o.round() as i32;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idct_23002_2;

    // Taken from https://en.wikipedia.org/wiki/JPEG#Discrete_cosine_transform
    #[rustfmt::skip]
    const JPEG_COEFFICIENTS: [i32; 64] = [
        -416, -33, -60,  32,  48, -40, 0, 0,
           0, -24, -56,  19,  26,   0, 0, 0,
         -42,  13,  80, -24, -40,   0, 0, 0,
         -42,  17,  44, -29,   0,   0, 0, 0,
          18,   0,   0,   0,   0,   0, 0, 0,
           0,   0,   0,   0,   0,   0, 0, 0,
           0,   0,   0,   0,   0,   0, 0, 0,
           0,   0,   0,   0,   0,   0, 0, 0,
    ];

    #[rustfmt::skip]
    const JPEG_SAMPLES: [i32; 64] = [
        -66, -63, -71, -68, -56, -65, -68, -46,
        -71, -73, -72, -46, -20, -41, -66, -57,
        -70, -78, -68, -17,  20, -14, -61, -63,
        -63, -73, -62,  -8,  27, -14, -60, -58,
        -58, -65, -61, -27,  -6, -40, -68, -50,
        -57, -57, -64, -58, -48, -66, -72, -47,
        -53, -46, -61, -74, -65, -63, -62, -45,
        -47, -34, -53, -74, -60, -47, -47, -41,
    ];

    #[test]
    fn reference_matches_known_block() {
        let out = reference(&JPEG_COEFFICIENTS);
        for (o, e) in out.iter().zip(JPEG_SAMPLES.iter()) {
            assert!((o - f64::from(*e)).abs() <= 0.5 + 1e-9, "{} vs {}", o, e);
        }
    }

    #[test]
    fn integer_transforms_agree() {
        let mut m = JPEG_COEFFICIENTS;
        idct_23002_2::transform(&mut m);
        assert_eq!(m, JPEG_SAMPLES);

        // The two integer transforms are not identical, but the cumulative
        // element-wise difference stays small.
        let mut m2 = JPEG_COEFFICIENTS;
        fixed_point(&mut m2);
        let delta: i32 = m2.iter().zip(JPEG_SAMPLES.iter()).map(|(a, b)| (a - b).abs()).sum();
        assert!(delta < 5, "delta {}", delta);
    }

    #[test]
    fn dc_only_matches_full_transforms() {
        for dc in (-2048..=2047).step_by(7) {
            let mut block = [0i32; 64];
            block[0] = dc;
            let oracle = reference(&block);
            let fast = dc_only(dc);
            for o in oracle.iter() {
                assert!((f64::from(fast) - o).abs() <= 1.0, "dc {}: {} vs {}", dc, fast, o);
            }

            let mut fixed = block;
            fixed_point(&mut fixed);
            assert!(fixed.iter().all(|&v| v == fast), "dc {}", dc);
        }
    }

    #[test]
    fn transform_takes_dc_shortcut() {
        let mut block = [0i32; 64];
        block[0] = 160;
        transform(IdctKind::Reference, &mut block, false);
        assert_eq!(block, [20; 64]);

        let mut block = [0i32; 64];
        block[0] = 160;
        block[1] = 30;
        let expected = reference(&block);
        transform(IdctKind::Reference, &mut block, true);
        assert_eq!(block[0], expected[0].round() as i32);
    }
}
