//! Variable-length codes of the PS1 video bitstream.
//!
//! The AC run/level table is the MPEG-1 intra table; the DC size tables are
//! the MPEG-1 luminance and chrominance tables, used by version 3 frames.
//! Decoding walks the code trees one bit at a time; encoding looks codes up
//! in a flat list.

use crate::bitreader::{BitReader, BitWriter};
use crate::error::DecodeError;

/// `(bits, code)` of the end-of-block marker.
pub const END_OF_BLOCK: (u32, u32) = (2, 0b10);

/// `(bits, code)` of the escape prefix.
pub const ESCAPE: (u32, u32) = (6, 0b000001);

/// Longest AC code in bits, not counting the sign bit.
pub const MAX_AC_CODE_BITS: u32 = 16;

// Code trees. Each pair is a node: a positive first element is the index
// (times two) of the child node, zero marks a leaf carrying the second
// element, -1 marks an unused code.

const LUMA_DC_SIZE_TREE: [(i16, i16); 18] = [
    (  1 << 1,    0), (  2 << 1,    0),  //   0: x
    (       0,    1), (       0,    2),  //   1: 0x
    (  3 << 1,    0), (  4 << 1,    0),  //   2: 1x
    (       0,    0), (       0,    3),  //   3: 10x
    (       0,    4), (  5 << 1,    0),  //   4: 11x
    (       0,    5), (  6 << 1,    0),  //   5: 111x
    (       0,    6), (  7 << 1,    0),  //   6: 1111x
    (       0,    7), (  8 << 1,    0),  //   7: 1111 1x
    (       0,    8), (      -1,    0),  //   8: 1111 11x
];

const CHROMA_DC_SIZE_TREE: [(i16, i16); 18] = [
    (  1 << 1,    0), (  2 << 1,    0),  //   0: x
    (       0,    0), (       0,    1),  //   1: 0x
    (       0,    2), (  3 << 1,    0),  //   2: 1x
    (       0,    3), (  4 << 1,    0),  //   3: 11x
    (       0,    4), (  5 << 1,    0),  //   4: 111x
    (       0,    5), (  6 << 1,    0),  //   5: 1111x
    (       0,    6), (  7 << 1,    0),  //   6: 1111 1x
    (       0,    7), (  8 << 1,    0),  //   7: 1111 11x
    (       0,    8), (      -1,    0),  //   8: 1111 111x
];

// Leaf values are (run << 8) | level. 0xffff is the escape. Decoded levels
// are unsigned; the sign bit follows in the stream.
const AC_TREE: [(i16, u16); 224] = [
    (  1 << 1,        0), (       0,   0x0001),  //   0: x
    (  2 << 1,        0), (  3 << 1,        0),  //   1: 0x
    (  4 << 1,        0), (  5 << 1,        0),  //   2: 00x
    (  6 << 1,        0), (       0,   0x0101),  //   3: 01x
    (  7 << 1,        0), (  8 << 1,        0),  //   4: 000x
    (  9 << 1,        0), ( 10 << 1,        0),  //   5: 001x
    (       0,   0x0002), (       0,   0x0201),  //   6: 010x
    ( 11 << 1,        0), ( 12 << 1,        0),  //   7: 0000x
    ( 13 << 1,        0), ( 14 << 1,        0),  //   8: 0001x
    ( 15 << 1,        0), (       0,   0x0003),  //   9: 0010x
    (       0,   0x0401), (       0,   0x0301),  //  10: 0011x
    ( 16 << 1,        0), (       0,   0xffff),  //  11: 0000 0x
    ( 17 << 1,        0), ( 18 << 1,        0),  //  12: 0000 1x
    (       0,   0x0701), (       0,   0x0601),  //  13: 0001 0x
    (       0,   0x0102), (       0,   0x0501),  //  14: 0001 1x
    ( 19 << 1,        0), ( 20 << 1,        0),  //  15: 0010 0x
    ( 21 << 1,        0), ( 22 << 1,        0),  //  16: 0000 00x
    (       0,   0x0202), (       0,   0x0901),  //  17: 0000 10x
    (       0,   0x0004), (       0,   0x0801),  //  18: 0000 11x
    ( 23 << 1,        0), ( 24 << 1,        0),  //  19: 0010 00x
    ( 25 << 1,        0), ( 26 << 1,        0),  //  20: 0010 01x
    ( 27 << 1,        0), ( 28 << 1,        0),  //  21: 0000 000x
    ( 29 << 1,        0), ( 30 << 1,        0),  //  22: 0000 001x
    (       0,   0x0d01), (       0,   0x0006),  //  23: 0010 000x
    (       0,   0x0c01), (       0,   0x0b01),  //  24: 0010 001x
    (       0,   0x0302), (       0,   0x0103),  //  25: 0010 010x
    (       0,   0x0005), (       0,   0x0a01),  //  26: 0010 011x
    ( 31 << 1,        0), ( 32 << 1,        0),  //  27: 0000 0000x
    ( 33 << 1,        0), ( 34 << 1,        0),  //  28: 0000 0001x
    ( 35 << 1,        0), ( 36 << 1,        0),  //  29: 0000 0010x
    ( 37 << 1,        0), ( 38 << 1,        0),  //  30: 0000 0011x
    ( 39 << 1,        0), ( 40 << 1,        0),  //  31: 0000 0000 0x
    ( 41 << 1,        0), ( 42 << 1,        0),  //  32: 0000 0000 1x
    ( 43 << 1,        0), ( 44 << 1,        0),  //  33: 0000 0001 0x
    ( 45 << 1,        0), ( 46 << 1,        0),  //  34: 0000 0001 1x
    (       0,   0x1001), (       0,   0x0502),  //  35: 0000 0010 0x
    (       0,   0x0007), (       0,   0x0203),  //  36: 0000 0010 1x
    (       0,   0x0104), (       0,   0x0f01),  //  37: 0000 0011 0x
    (       0,   0x0e01), (       0,   0x0402),  //  38: 0000 0011 1x
    ( 47 << 1,        0), ( 48 << 1,        0),  //  39: 0000 0000 00x
    ( 49 << 1,        0), ( 50 << 1,        0),  //  40: 0000 0000 01x
    ( 51 << 1,        0), ( 52 << 1,        0),  //  41: 0000 0000 10x
    ( 53 << 1,        0), ( 54 << 1,        0),  //  42: 0000 0000 11x
    ( 55 << 1,        0), ( 56 << 1,        0),  //  43: 0000 0001 00x
    ( 57 << 1,        0), ( 58 << 1,        0),  //  44: 0000 0001 01x
    ( 59 << 1,        0), ( 60 << 1,        0),  //  45: 0000 0001 10x
    ( 61 << 1,        0), ( 62 << 1,        0),  //  46: 0000 0001 11x
    (      -1,        0), ( 63 << 1,        0),  //  47: 0000 0000 000x
    ( 64 << 1,        0), ( 65 << 1,        0),  //  48: 0000 0000 001x
    ( 66 << 1,        0), ( 67 << 1,        0),  //  49: 0000 0000 010x
    ( 68 << 1,        0), ( 69 << 1,        0),  //  50: 0000 0000 011x
    ( 70 << 1,        0), ( 71 << 1,        0),  //  51: 0000 0000 100x
    ( 72 << 1,        0), ( 73 << 1,        0),  //  52: 0000 0000 101x
    ( 74 << 1,        0), ( 75 << 1,        0),  //  53: 0000 0000 110x
    ( 76 << 1,        0), ( 77 << 1,        0),  //  54: 0000 0000 111x
    (       0,   0x000b), (       0,   0x0802),  //  55: 0000 0001 000x
    (       0,   0x0403), (       0,   0x000a),  //  56: 0000 0001 001x
    (       0,   0x0204), (       0,   0x0702),  //  57: 0000 0001 010x
    (       0,   0x1501), (       0,   0x1401),  //  58: 0000 0001 011x
    (       0,   0x0009), (       0,   0x1301),  //  59: 0000 0001 100x
    (       0,   0x1201), (       0,   0x0105),  //  60: 0000 0001 101x
    (       0,   0x0303), (       0,   0x0008),  //  61: 0000 0001 110x
    (       0,   0x0602), (       0,   0x1101),  //  62: 0000 0001 111x
    ( 78 << 1,        0), ( 79 << 1,        0),  //  63: 0000 0000 0001x
    ( 80 << 1,        0), ( 81 << 1,        0),  //  64: 0000 0000 0010x
    ( 82 << 1,        0), ( 83 << 1,        0),  //  65: 0000 0000 0011x
    ( 84 << 1,        0), ( 85 << 1,        0),  //  66: 0000 0000 0100x
    ( 86 << 1,        0), ( 87 << 1,        0),  //  67: 0000 0000 0101x
    ( 88 << 1,        0), ( 89 << 1,        0),  //  68: 0000 0000 0110x
    ( 90 << 1,        0), ( 91 << 1,        0),  //  69: 0000 0000 0111x
    (       0,   0x0a02), (       0,   0x0902),  //  70: 0000 0000 1000x
    (       0,   0x0503), (       0,   0x0304),  //  71: 0000 0000 1001x
    (       0,   0x0205), (       0,   0x0107),  //  72: 0000 0000 1010x
    (       0,   0x0106), (       0,   0x000f),  //  73: 0000 0000 1011x
    (       0,   0x000e), (       0,   0x000d),  //  74: 0000 0000 1100x
    (       0,   0x000c), (       0,   0x1a01),  //  75: 0000 0000 1101x
    (       0,   0x1901), (       0,   0x1801),  //  76: 0000 0000 1110x
    (       0,   0x1701), (       0,   0x1601),  //  77: 0000 0000 1111x
    ( 92 << 1,        0), ( 93 << 1,        0),  //  78: 0000 0000 0001 0x
    ( 94 << 1,        0), ( 95 << 1,        0),  //  79: 0000 0000 0001 1x
    ( 96 << 1,        0), ( 97 << 1,        0),  //  80: 0000 0000 0010 0x
    ( 98 << 1,        0), ( 99 << 1,        0),  //  81: 0000 0000 0010 1x
    (100 << 1,        0), (101 << 1,        0),  //  82: 0000 0000 0011 0x
    (102 << 1,        0), (103 << 1,        0),  //  83: 0000 0000 0011 1x
    (       0,   0x001f), (       0,   0x001e),  //  84: 0000 0000 0100 0x
    (       0,   0x001d), (       0,   0x001c),  //  85: 0000 0000 0100 1x
    (       0,   0x001b), (       0,   0x001a),  //  86: 0000 0000 0101 0x
    (       0,   0x0019), (       0,   0x0018),  //  87: 0000 0000 0101 1x
    (       0,   0x0017), (       0,   0x0016),  //  88: 0000 0000 0110 0x
    (       0,   0x0015), (       0,   0x0014),  //  89: 0000 0000 0110 1x
    (       0,   0x0013), (       0,   0x0012),  //  90: 0000 0000 0111 0x
    (       0,   0x0011), (       0,   0x0010),  //  91: 0000 0000 0111 1x
    (104 << 1,        0), (105 << 1,        0),  //  92: 0000 0000 0001 00x
    (106 << 1,        0), (107 << 1,        0),  //  93: 0000 0000 0001 01x
    (108 << 1,        0), (109 << 1,        0),  //  94: 0000 0000 0001 10x
    (110 << 1,        0), (111 << 1,        0),  //  95: 0000 0000 0001 11x
    (       0,   0x0028), (       0,   0x0027),  //  96: 0000 0000 0010 00x
    (       0,   0x0026), (       0,   0x0025),  //  97: 0000 0000 0010 01x
    (       0,   0x0024), (       0,   0x0023),  //  98: 0000 0000 0010 10x
    (       0,   0x0022), (       0,   0x0021),  //  99: 0000 0000 0010 11x
    (       0,   0x0020), (       0,   0x010e),  // 100: 0000 0000 0011 00x
    (       0,   0x010d), (       0,   0x010c),  // 101: 0000 0000 0011 01x
    (       0,   0x010b), (       0,   0x010a),  // 102: 0000 0000 0011 10x
    (       0,   0x0109), (       0,   0x0108),  // 103: 0000 0000 0011 11x
    (       0,   0x0112), (       0,   0x0111),  // 104: 0000 0000 0001 000x
    (       0,   0x0110), (       0,   0x010f),  // 105: 0000 0000 0001 001x
    (       0,   0x0603), (       0,   0x1002),  // 106: 0000 0000 0001 010x
    (       0,   0x0f02), (       0,   0x0e02),  // 107: 0000 0000 0001 011x
    (       0,   0x0d02), (       0,   0x0c02),  // 108: 0000 0000 0001 100x
    (       0,   0x0b02), (       0,   0x1f01),  // 109: 0000 0000 0001 101x
    (       0,   0x1e01), (       0,   0x1d01),  // 110: 0000 0000 0001 110x
    (       0,   0x1c01), (       0,   0x1b01),  // 111: 0000 0000 0001 111x
];

/// Every run/level code as `(bits, code, run, level)`, level unsigned.
pub const AC_CODES: [(u32, u32, u8, u8); 111] = [
    ( 2, 0b11,  0,  1),
    ( 3, 0b011,  1,  1),
    ( 4, 0b0100,  0,  2),
    ( 4, 0b0101,  2,  1),
    ( 5, 0b00101,  0,  3),
    ( 5, 0b00110,  4,  1),
    ( 5, 0b00111,  3,  1),
    ( 6, 0b000100,  7,  1),
    ( 6, 0b000101,  6,  1),
    ( 6, 0b000110,  1,  2),
    ( 6, 0b000111,  5,  1),
    ( 7, 0b0000100,  2,  2),
    ( 7, 0b0000101,  9,  1),
    ( 7, 0b0000110,  0,  4),
    ( 7, 0b0000111,  8,  1),
    ( 8, 0b00100000, 13,  1),
    ( 8, 0b00100001,  0,  6),
    ( 8, 0b00100010, 12,  1),
    ( 8, 0b00100011, 11,  1),
    ( 8, 0b00100100,  3,  2),
    ( 8, 0b00100101,  1,  3),
    ( 8, 0b00100110,  0,  5),
    ( 8, 0b00100111, 10,  1),
    (10, 0b0000001000, 16,  1),
    (10, 0b0000001001,  5,  2),
    (10, 0b0000001010,  0,  7),
    (10, 0b0000001011,  2,  3),
    (10, 0b0000001100,  1,  4),
    (10, 0b0000001101, 15,  1),
    (10, 0b0000001110, 14,  1),
    (10, 0b0000001111,  4,  2),
    (12, 0b000000010000,  0, 11),
    (12, 0b000000010001,  8,  2),
    (12, 0b000000010010,  4,  3),
    (12, 0b000000010011,  0, 10),
    (12, 0b000000010100,  2,  4),
    (12, 0b000000010101,  7,  2),
    (12, 0b000000010110, 21,  1),
    (12, 0b000000010111, 20,  1),
    (12, 0b000000011000,  0,  9),
    (12, 0b000000011001, 19,  1),
    (12, 0b000000011010, 18,  1),
    (12, 0b000000011011,  1,  5),
    (12, 0b000000011100,  3,  3),
    (12, 0b000000011101,  0,  8),
    (12, 0b000000011110,  6,  2),
    (12, 0b000000011111, 17,  1),
    (13, 0b0000000010000, 10,  2),
    (13, 0b0000000010001,  9,  2),
    (13, 0b0000000010010,  5,  3),
    (13, 0b0000000010011,  3,  4),
    (13, 0b0000000010100,  2,  5),
    (13, 0b0000000010101,  1,  7),
    (13, 0b0000000010110,  1,  6),
    (13, 0b0000000010111,  0, 15),
    (13, 0b0000000011000,  0, 14),
    (13, 0b0000000011001,  0, 13),
    (13, 0b0000000011010,  0, 12),
    (13, 0b0000000011011, 26,  1),
    (13, 0b0000000011100, 25,  1),
    (13, 0b0000000011101, 24,  1),
    (13, 0b0000000011110, 23,  1),
    (13, 0b0000000011111, 22,  1),
    (14, 0b00000000010000,  0, 31),
    (14, 0b00000000010001,  0, 30),
    (14, 0b00000000010010,  0, 29),
    (14, 0b00000000010011,  0, 28),
    (14, 0b00000000010100,  0, 27),
    (14, 0b00000000010101,  0, 26),
    (14, 0b00000000010110,  0, 25),
    (14, 0b00000000010111,  0, 24),
    (14, 0b00000000011000,  0, 23),
    (14, 0b00000000011001,  0, 22),
    (14, 0b00000000011010,  0, 21),
    (14, 0b00000000011011,  0, 20),
    (14, 0b00000000011100,  0, 19),
    (14, 0b00000000011101,  0, 18),
    (14, 0b00000000011110,  0, 17),
    (14, 0b00000000011111,  0, 16),
    (15, 0b000000000010000,  0, 40),
    (15, 0b000000000010001,  0, 39),
    (15, 0b000000000010010,  0, 38),
    (15, 0b000000000010011,  0, 37),
    (15, 0b000000000010100,  0, 36),
    (15, 0b000000000010101,  0, 35),
    (15, 0b000000000010110,  0, 34),
    (15, 0b000000000010111,  0, 33),
    (15, 0b000000000011000,  0, 32),
    (15, 0b000000000011001,  1, 14),
    (15, 0b000000000011010,  1, 13),
    (15, 0b000000000011011,  1, 12),
    (15, 0b000000000011100,  1, 11),
    (15, 0b000000000011101,  1, 10),
    (15, 0b000000000011110,  1,  9),
    (15, 0b000000000011111,  1,  8),
    (16, 0b0000000000010000,  1, 18),
    (16, 0b0000000000010001,  1, 17),
    (16, 0b0000000000010010,  1, 16),
    (16, 0b0000000000010011,  1, 15),
    (16, 0b0000000000010100,  6,  3),
    (16, 0b0000000000010101, 16,  2),
    (16, 0b0000000000010110, 15,  2),
    (16, 0b0000000000010111, 14,  2),
    (16, 0b0000000000011000, 13,  2),
    (16, 0b0000000000011001, 12,  2),
    (16, 0b0000000000011010, 11,  2),
    (16, 0b0000000000011011, 31,  1),
    (16, 0b0000000000011100, 30,  1),
    (16, 0b0000000000011101, 29,  1),
    (16, 0b0000000000011110, 28,  1),
    (16, 0b0000000000011111, 27,  1),
];

const LUMA_DC_SIZE_CODES: [(u32, u32); 9] = [
    (3, 0b100),
    (2, 0b00),
    (2, 0b01),
    (3, 0b101),
    (3, 0b110),
    (4, 0b1110),
    (5, 0b11110),
    (6, 0b111110),
    (7, 0b1111110),
];

const CHROMA_DC_SIZE_CODES: [(u32, u32); 9] = [
    (2, 0b00),
    (2, 0b01),
    (2, 0b10),
    (3, 0b110),
    (4, 0b1110),
    (5, 0b11110),
    (6, 0b111110),
    (7, 0b1111110),
    (8, 0b11111110),
];

const ESCAPE_LEAF: u16 = 0xffff;

/// One decoded AC symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcCode {
    EndOfBlock,
    /// Explicit run and level follow; their layout depends on the format.
    Escape,
    RunLevel { run: u8, level: i16 },
}

fn read_tree<S: Copy>(table: &[(i16, S)], r: &mut BitReader<'_>) -> Result<S, DecodeError> {
    let start = r.position();
    let mut bits = 0u32;
    let mut node: i16 = 0;

    loop {
        let bit = r.read_bit()?;
        bits = (bits << 1) | u32::from(bit);
        let unmatched = DecodeError::UnmatchedVlc {
            bits,
            bit_position: start,
        };
        let Some(&(next, value)) = usize::try_from(node + i16::from(bit)).ok().and_then(|i| table.get(i)) else {
            return Err(unmatched);
        };
        if next == 0 {
            return Ok(value);
        }
        if next < 0 {
            return Err(unmatched);
        }
        node = next;
    }
}

/// Read one AC code including its sign bit.
pub fn read_ac(r: &mut BitReader<'_>) -> Result<AcCode, DecodeError> {
    let coeff = read_tree(&AC_TREE, r)?;

    // "1" alone is ambiguous: "10" ends the block, "11" is run 0 level 1.
    if coeff == 0x0001 && !r.read_bit()? {
        return Ok(AcCode::EndOfBlock);
    }
    if coeff == ESCAPE_LEAF {
        return Ok(AcCode::Escape);
    }

    let run = (coeff >> 8) as u8;
    let mut level = (coeff & 0xff) as i16;
    if r.read_bit()? {
        level = -level;
    }
    Ok(AcCode::RunLevel { run, level })
}

pub fn read_dc_size(r: &mut BitReader<'_>, luma: bool) -> Result<u8, DecodeError> {
    let table = if luma { &LUMA_DC_SIZE_TREE } else { &CHROMA_DC_SIZE_TREE };
    let size = read_tree(table, r)?;
    Ok(size as u8)
}

/// MPEG-1 style DC difference: values with the top bit clear are negative.
pub fn decode_dc_diff(coded: u32, size: u8) -> i32 {
    if size == 0 {
        return 0;
    }
    if coded & (1 << (size - 1)) != 0 {
        coded as i32
    } else {
        (-(1i32 << size)) | (coded as i32 + 1)
    }
}

/// Inverse of [`decode_dc_diff`]: `(size, coded)`.
pub fn encode_dc_diff(diff: i32) -> (u8, u32) {
    if diff == 0 {
        return (0, 0);
    }
    let size = (32 - diff.unsigned_abs().leading_zeros()) as u8;
    let coded = if diff > 0 { diff } else { diff + (1 << size) - 1 };
    (size, coded as u32)
}

/// `(bits, code)` for a run and unsigned level, if the table has one.
pub fn ac_code(run: u8, level: u16) -> Option<(u32, u32)> {
    AC_CODES
        .iter()
        .find(|&&(_, _, r, l)| r == run && u16::from(l) == level)
        .map(|&(bits, code, _, _)| (bits, code))
}

pub fn dc_size_code(size: u8, luma: bool) -> Option<(u32, u32)> {
    let table = if luma { &LUMA_DC_SIZE_CODES } else { &CHROMA_DC_SIZE_CODES };
    table.get(usize::from(size)).copied()
}

/// Write a run/level pair from the table followed by its sign. Returns
/// `false`, writing nothing, when the pair needs an escape.
pub fn write_ac(w: &mut BitWriter, run: u8, level: i16) -> std::io::Result<bool> {
    if level == 0 {
        return Ok(false);
    }
    let Some((bits, code)) = ac_code(run, level.unsigned_abs()) else {
        return Ok(false);
    };
    w.write(bits, code)?;
    w.write(1, u32::from(level < 0))?;
    Ok(true)
}
