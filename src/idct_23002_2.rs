// Integer IDCT after ISO/IEC 23002-2 [1, 2]. Only used by tests, to check the
// production transforms against an independent one.
//
// [1] http://www.reznik.org/software.html
// [2] http://www.reznik.org/software/ISO-IEC-23002-2.zip
#![cfg(test)]

/// Returns `(y, z)` after the first dyadic multiplier pair.
fn pmul_1(y: i32) -> (i32, i32) {
    let y2 = (y >> 3) - (y >> 7);
    let y3 = y2 - (y >> 11);
    (y - y2, y2 + (y3 >> 1))
}

fn pmul_2(y: i32) -> (i32, i32) {
    let y2 = (y >> 9) - y;
    ((y2 >> 2) - y2, y >> 1)
}

fn pmul_3(y: i32) -> (i32, i32) {
    let y2 = y + (y >> 5);
    let y3 = y2 >> 2;
    (y3 + (y >> 4), y2 - y3)
}

/// One scaled 1D pass over `input[0..8]`, written to `out` with stride 8.
fn scaled_1d(input: &[i32], out: &mut [i32]) {
    // odd part
    let (xa, xb) = (input[1] + input[7], input[1] - input[7]);
    let (x1, x3) = (xa + input[3], xa - input[3]);
    let (x7, x5) = (xb + input[5], xb - input[5]);

    let (x3, xa) = pmul_1(x3);
    let (x5, xb) = pmul_1(x5);
    let (x3, x5) = (x3 - xb, x5 + xa);

    let (x1, xa) = pmul_2(x1);
    let (x7, xb) = pmul_2(x7);
    let (x1, x7) = (x1 + xb, x7 - xa);

    // even part
    let (x2, xa) = pmul_3(input[2]);
    let (x6, xb) = pmul_3(input[6]);
    let (x2, x6) = (x2 - xb, x6 + xa);

    let (xa, xb) = (input[0] + input[4], input[0] - input[4]);
    let (x0, x6) = (xa + x6, xa - x6);
    let (x4, x2) = (xb + x2, xb - x2);

    out[0] = x0 + x1;
    out[8] = x4 + x5;
    out[2 * 8] = x2 + x3;
    out[3 * 8] = x6 + x7;
    out[4 * 8] = x6 - x7;
    out[5 * 8] = x2 - x3;
    out[6 * 8] = x4 - x5;
    out[7 * 8] = x0 - x1;
}

const A: i32 = 1024;
const B: i32 = 1138;
const C: i32 = 1730;
const D: i32 = 1609;
const E: i32 = 1264;
const F: i32 = 1922;
const G: i32 = 1788;
const H: i32 = 2923;
const I: i32 = 2718;
const J: i32 = 2528;

#[rustfmt::skip]
const SCALE: [i32; 64] = [
    A, B, C, D, A, D, C, B,
    B, E, F, G, B, G, F, E,
    C, F, H, I, C, I, H, F,
    D, G, I, J, D, J, I, G,
    A, B, C, D, A, D, C, B,
    D, G, I, J, D, J, I, G,
    C, F, H, I, C, I, H, F,
    B, E, F, G, B, G, F, E,
];

/// Transform coefficients in place; output has the same scale as an
/// orthonormal IDCT, rounded.
pub fn transform(coefficients: &mut [i32; 64]) {
    let mut block = [0i32; 64];
    let mut block2 = [0i32; 64];

    for (b, (&c, &s)) in block.iter_mut().zip(coefficients.iter().zip(SCALE.iter())) {
        *b = c * s;
    }
    // DC bias for rounding
    block[0] += 1 << 12;

    for i in 0..8 {
        scaled_1d(&block[i * 8..i * 8 + 8], &mut block2[i..]);
    }
    for i in 0..8 {
        scaled_1d(&block2[i * 8..i * 8 + 8], &mut block[i..]);
    }

    for (c, &b) in coefficients.iter_mut().zip(block.iter()) {
        *c = b >> 13;
    }
}
