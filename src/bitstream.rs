//! Compressed frame bitstreams and the MDEC codes they expand to.
//!
//! A frame starts with an 8-byte header, followed by one variable-length
//! coded block after another: a block header (DC and quantization scale),
//! run/level pairs, then an end-of-block code. Six blocks make a macroblock.

use log::{debug, trace};

use crate::bitreader::{BitReader, BitWriter, WordOrder};
use crate::error::{DecodeError, EncodeError};
use crate::vlc::{self, AcCode};

pub const FRAME_HEADER_SIZE: usize = 8;

/// Constant in the second header word of every frame.
pub const FRAME_MAGIC: u16 = 0x3800;

pub const MAX_QSCALE: u8 = 63;

/// Blocks per macroblock, in decode order Cr, Cb, Y1, Y2, Y3, Y4.
pub const BLOCKS_PER_MACROBLOCK: usize = 6;

/// Bitstream flavour, picked from the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitstreamFormat {
    /// Versions 0 to 2: fixed-width DC.
    StrV2,
    /// Version 3: DC coded as a difference from the previous block.
    StrV3,
    /// Alternate engine: big endian words, separate luma/chroma scales.
    Lain,
}

impl BitstreamFormat {
    pub fn word_order(&self) -> WordOrder {
        match self {
            BitstreamFormat::StrV2 | BitstreamFormat::StrV3 => WordOrder::LittleEndian,
            BitstreamFormat::Lain => WordOrder::BigEndian,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BitstreamFormat::StrV2 => "STRv2",
            BitstreamFormat::StrV3 => "STRv3",
            BitstreamFormat::Lain => "Lain",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub format: BitstreamFormat,
    pub version: u16,
    /// Half the number of MDEC codes in the frame, rounded up to 32.
    pub run_length_count: u16,
    pub luma_qscale: u8,
    pub chroma_qscale: u8,
}

fn le_u16(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

fn qscale(value: u16) -> Result<u8, DecodeError> {
    match value {
        0 => Err(DecodeError::ZeroQuantizationScale),
        1..=63 => Ok(value as u8),
        _ => Err(DecodeError::UnrecognizedHeader(format!("quantization scale {}", value))),
    }
}

impl FrameHeader {
    /// Identify the bitstream format of a frame. Failing here means the
    /// buffer is not a frame we know, as opposed to a damaged one.
    pub fn parse(data: &[u8]) -> Result<FrameHeader, DecodeError> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(DecodeError::UnrecognizedHeader(format!("frame is only {} bytes", data.len())));
        }
        let magic = le_u16(data, 2);
        if magic != FRAME_MAGIC {
            return Err(DecodeError::UnrecognizedHeader(format!("magic {:#06x}", magic)));
        }
        let version = le_u16(data, 6);
        let shared = |format| -> Result<FrameHeader, DecodeError> {
            let q = qscale(le_u16(data, 4))?;
            Ok(FrameHeader {
                format,
                version,
                run_length_count: le_u16(data, 0),
                luma_qscale: q,
                chroma_qscale: q,
            })
        };

        match version {
            1 | 2 => shared(BitstreamFormat::StrV2),
            3 => shared(BitstreamFormat::StrV3),
            0 => {
                let q = le_u16(data, 4);
                if (1..=u16::from(MAX_QSCALE)).contains(&q) {
                    return shared(BitstreamFormat::StrV2);
                }
                let (lq, cq) = (data[0], data[1]);
                if lq == 0 && cq == 0 {
                    return Err(DecodeError::ZeroQuantizationScale);
                }
                if (1..=MAX_QSCALE).contains(&lq) && (1..=MAX_QSCALE).contains(&cq) {
                    return Ok(FrameHeader {
                        format: BitstreamFormat::Lain,
                        version,
                        run_length_count: q,
                        luma_qscale: lq,
                        chroma_qscale: cq,
                    });
                }
                if q == 0 {
                    return Err(DecodeError::ZeroQuantizationScale);
                }
                Err(DecodeError::UnrecognizedHeader(format!(
                    "version 0 with scale {} and bytes {:#04x} {:#04x}",
                    q, lq, cq
                )))
            }
            v => Err(DecodeError::UnrecognizedHeader(format!("version {}", v))),
        }
    }

    fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut b = [0u8; FRAME_HEADER_SIZE];
        b[2..4].copy_from_slice(&FRAME_MAGIC.to_le_bytes());
        b[6..8].copy_from_slice(&self.version.to_le_bytes());
        match self.format {
            BitstreamFormat::StrV2 | BitstreamFormat::StrV3 => {
                b[0..2].copy_from_slice(&self.run_length_count.to_le_bytes());
                b[4..6].copy_from_slice(&u16::from(self.luma_qscale).to_le_bytes());
            }
            BitstreamFormat::Lain => {
                b[0] = self.luma_qscale;
                b[1] = self.chroma_qscale;
                b[4..6].copy_from_slice(&self.run_length_count.to_le_bytes());
            }
        }
        b
    }
}

/// One 16-bit MDEC code: a 6-bit field over a signed 10-bit field.
///
/// In a block header the fields are the quantization scale and the DC
/// coefficient; afterwards they are a zero run and an AC level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MdecCode {
    pub top6: u8,
    pub bottom10: i16,
}

impl MdecCode {
    pub const END_OF_BLOCK: MdecCode = MdecCode { top6: 63, bottom10: 0 };

    pub fn new(top6: u8, bottom10: i16) -> MdecCode {
        MdecCode { top6, bottom10 }
    }

    pub fn from_u16(v: u16) -> MdecCode {
        MdecCode {
            top6: (v >> 10) as u8,
            bottom10: (((v & 0x3FF) << 6) as i16) >> 6,
        }
    }

    pub fn to_u16(&self) -> u16 {
        (u16::from(self.top6 & 0x3F) << 10) | (self.bottom10 as u16 & 0x3FF)
    }

    pub fn is_end_of_block(&self) -> bool {
        *self == MdecCode::END_OF_BLOCK
    }
}

impl std::fmt::Display for MdecCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_end_of_block() {
            write!(f, "{:04x} EOB", self.to_u16())
        } else {
            write!(f, "{:04x} ({}, {})", self.to_u16(), self.top6, self.bottom10)
        }
    }
}

/// A source of MDEC codes.
pub trait MdecInput {
    fn next_code(&mut self) -> Result<MdecCode, DecodeError>;

    /// Bits (or code words) consumed, for diagnostics.
    fn position(&self) -> u64;
}

/// Expands a compressed frame into MDEC codes.
pub struct BitstreamDecoder<'a> {
    header: FrameHeader,
    reader: BitReader<'a>,
    block: usize,
    in_block: bool,
    /// Y, Cb, Cr predictors for version 3 DC coding.
    dc_predictor: [i32; 3],
    debug_checks: bool,
    codes: u64,
}

impl<'a> BitstreamDecoder<'a> {
    pub fn new(frame: &'a [u8]) -> Result<BitstreamDecoder<'a>, DecodeError> {
        let header = FrameHeader::parse(frame)?;
        debug!(
            "{} frame, qscale {}/{}, {} bytes",
            header.format.name(),
            header.luma_qscale,
            header.chroma_qscale,
            frame.len()
        );
        Ok(BitstreamDecoder {
            header,
            reader: BitReader::new(&frame[FRAME_HEADER_SIZE..], header.format.word_order()),
            block: 0,
            in_block: false,
            dc_predictor: [0; 3],
            debug_checks: false,
            codes: 0,
        })
    }

    /// Re-check every decoded code against the encoder tables. Only active
    /// in builds with debug assertions.
    pub fn with_debug_checks(mut self, enabled: bool) -> Self {
        self.debug_checks = enabled;
        self
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// MDEC codes produced so far.
    pub fn codes_read(&self) -> u64 {
        self.codes
    }

    fn is_luma(&self) -> bool {
        self.block >= 2
    }

    fn read_block_header(&mut self) -> Result<MdecCode, DecodeError> {
        let position = self.reader.position();
        let luma = self.is_luma();
        let qscale = if luma {
            self.header.luma_qscale
        } else {
            self.header.chroma_qscale
        };

        let dc = match self.header.format {
            BitstreamFormat::StrV2 | BitstreamFormat::Lain => self.reader.read_signed(10)?,
            BitstreamFormat::StrV3 => {
                let size = vlc::read_dc_size(&mut self.reader, luma)?;
                let coded = self.reader.read(u32::from(size))?;
                let diff = vlc::decode_dc_diff(coded, size);
                // Blocks are Cr, Cb, then luma.
                let plane = match self.block {
                    0 => 2,
                    1 => 1,
                    _ => 0,
                };
                let dc = self.dc_predictor[plane] + diff * 4;
                if !(-512..=511).contains(&dc) {
                    return Err(DecodeError::DcOutOfRange {
                        dc,
                        bit_position: position,
                    });
                }
                self.dc_predictor[plane] = dc;
                dc
            }
        };
        trace!("block {} qscale {} dc {} at bit {}", self.block, qscale, dc, position);
        Ok(MdecCode::new(qscale, dc as i16))
    }

    fn read_escape(&mut self) -> Result<MdecCode, DecodeError> {
        let run = self.reader.read(6)? as u8;
        let level = match self.header.format {
            BitstreamFormat::StrV2 | BitstreamFormat::StrV3 => self.reader.read_signed(10)?,
            BitstreamFormat::Lain => {
                let mut level = self.reader.read(8)? as i32;
                if level == 0 {
                    level = self.reader.read(8)? as i32;
                } else if level == 128 {
                    level = self.reader.read(8)? as i32 - 256;
                } else if level > 128 {
                    level -= 256;
                }
                level
            }
        };
        Ok(MdecCode::new(run, level as i16))
    }

    fn check_code(&self, code: &AcCode) {
        if !self.debug_checks {
            return;
        }
        if let AcCode::RunLevel { run, level } = *code {
            debug_assert!(
                vlc::ac_code(run, level.unsigned_abs()).is_some(),
                "decoded ({}, {}) has no table code",
                run,
                level
            );
        }
    }
}

impl<'a> MdecInput for BitstreamDecoder<'a> {
    fn next_code(&mut self) -> Result<MdecCode, DecodeError> {
        let code = if !self.in_block {
            let code = self.read_block_header()?;
            self.in_block = true;
            code
        } else {
            let ac = vlc::read_ac(&mut self.reader)?;
            self.check_code(&ac);
            match ac {
                AcCode::EndOfBlock => {
                    self.in_block = false;
                    self.block = (self.block + 1) % BLOCKS_PER_MACROBLOCK;
                    MdecCode::END_OF_BLOCK
                }
                AcCode::Escape => self.read_escape()?,
                AcCode::RunLevel { run, level } => MdecCode::new(run, level),
            }
        };
        self.codes += 1;
        Ok(code)
    }

    fn position(&self) -> u64 {
        self.reader.position()
    }
}

/// Reads MDEC codes stored uncompressed as little endian 16-bit words.
pub struct RawMdecInput<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> RawMdecInput<'a> {
    pub fn new(data: &'a [u8]) -> RawMdecInput<'a> {
        RawMdecInput { data, offset: 0 }
    }
}

impl<'a> MdecInput for RawMdecInput<'a> {
    fn next_code(&mut self) -> Result<MdecCode, DecodeError> {
        let Some(word) = self.data.get(self.offset..self.offset + 2) else {
            return Err(DecodeError::EndOfStream {
                bit_position: self.offset as u64 * 8,
            });
        };
        self.offset += 2;
        Ok(MdecCode::from_u16(u16::from_le_bytes([word[0], word[1]])))
    }

    fn position(&self) -> u64 {
        self.offset as u64 * 8
    }
}

/// Compresses MDEC codes into a frame bitstream.
#[derive(Debug, Clone, Copy)]
pub struct BitstreamEncoder {
    format: BitstreamFormat,
    luma_qscale: u8,
    chroma_qscale: u8,
}

impl BitstreamEncoder {
    /// Encoder for the formats with a single quantization scale.
    pub fn new(format: BitstreamFormat, qscale: u8) -> BitstreamEncoder {
        BitstreamEncoder {
            format,
            luma_qscale: qscale,
            chroma_qscale: qscale,
        }
    }

    pub fn lain(luma_qscale: u8, chroma_qscale: u8) -> BitstreamEncoder {
        BitstreamEncoder {
            format: BitstreamFormat::Lain,
            luma_qscale,
            chroma_qscale,
        }
    }

    fn write_escape(&self, w: &mut BitWriter, code: MdecCode) -> Result<(), EncodeError> {
        w.write(vlc::ESCAPE.0, vlc::ESCAPE.1)?;
        w.write(6, u32::from(code.top6))?;
        match self.format {
            BitstreamFormat::StrV2 | BitstreamFormat::StrV3 => {
                w.write_signed(10, i32::from(code.bottom10))?;
            }
            BitstreamFormat::Lain => {
                let level = i32::from(code.bottom10);
                match level {
                    1..=127 => w.write(8, level as u32)?,
                    -127..=-1 => w.write(8, (level + 256) as u32)?,
                    128..=255 => {
                        w.write(8, 0)?;
                        w.write(8, level as u32)?;
                    }
                    -255..=-128 => {
                        w.write(8, 0x80)?;
                        w.write(8, (level + 256) as u32)?;
                    }
                    _ => return Err(EncodeError::LevelOutOfRange(code.bottom10)),
                }
            }
        }
        Ok(())
    }

    /// Encode a complete code stream (whole blocks only) into a frame,
    /// header included.
    pub fn encode(&self, codes: &[MdecCode]) -> Result<Vec<u8>, EncodeError> {
        let mut w = BitWriter::new(self.format.word_order());
        let mut predictor = [0i16; 3];
        let mut block = 0usize;
        let mut codes_iter = codes.iter();

        while let Some(&head) = codes_iter.next() {
            if head.is_end_of_block() {
                return Err(EncodeError::MissingBlockHeader(head.to_u16()));
            }
            let luma = block >= 2;
            let expected = if luma { self.luma_qscale } else { self.chroma_qscale };
            if head.top6 != expected {
                return Err(EncodeError::QscaleMismatch {
                    expected,
                    found: head.top6,
                });
            }

            match self.format {
                BitstreamFormat::StrV2 | BitstreamFormat::Lain => {
                    w.write_signed(10, i32::from(head.bottom10))?;
                }
                BitstreamFormat::StrV3 => {
                    let plane = match block {
                        0 => 2,
                        1 => 1,
                        _ => 0,
                    };
                    let diff = head.bottom10 - predictor[plane];
                    if diff % 4 != 0 {
                        return Err(EncodeError::UnencodableDc {
                            dc: head.bottom10,
                            predictor: predictor[plane],
                        });
                    }
                    let (size, coded) = vlc::encode_dc_diff(i32::from(diff / 4));
                    let (bits, size_code) = vlc::dc_size_code(size, luma).ok_or(EncodeError::UnencodableDc {
                        dc: head.bottom10,
                        predictor: predictor[plane],
                    })?;
                    w.write(bits, size_code)?;
                    w.write(u32::from(size), coded)?;
                    predictor[plane] = head.bottom10;
                }
            }

            loop {
                let Some(&code) = codes_iter.next() else {
                    return Err(EncodeError::UnterminatedBlock);
                };
                if code.is_end_of_block() {
                    w.write(vlc::END_OF_BLOCK.0, vlc::END_OF_BLOCK.1)?;
                    break;
                }
                if !vlc::write_ac(&mut w, code.top6, code.bottom10)? {
                    self.write_escape(&mut w, code)?;
                }
            }
            block = (block + 1) % BLOCKS_PER_MACROBLOCK;
        }

        let header = FrameHeader {
            format: self.format,
            version: match self.format {
                BitstreamFormat::StrV2 => 2,
                BitstreamFormat::StrV3 => 3,
                BitstreamFormat::Lain => 0,
            },
            run_length_count: (((codes.len() + 1) / 2 + 31) & !31) as u16,
            luma_qscale: self.luma_qscale,
            chroma_qscale: self.chroma_qscale,
        };
        let body = w.finish()?;
        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
        frame.extend_from_slice(&header.to_bytes());
        frame.extend(body);
        Ok(frame)
    }
}
