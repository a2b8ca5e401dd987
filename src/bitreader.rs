//! Bit-level access to frame bitstreams.
//!
//! PS1 bitstreams are sequences of 16-bit words, read most significant bit
//! first. Depending on the format the words are stored little or big endian;
//! little endian buffers are byte swapped up front so that a plain big endian
//! bit reader can walk them.

use std::borrow::Cow;
use std::io::Cursor;

use bitstream_io::{BigEndian, BitRead, BitWrite};

use crate::error::DecodeError;

/// Byte order of the 16-bit words in a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordOrder {
    LittleEndian,
    BigEndian,
}

fn swap_words(data: &[u8]) -> Vec<u8> {
    let mut swapped = Vec::with_capacity(data.len() + 1);
    for pair in data.chunks(2) {
        match pair {
            [a, b] => swapped.extend([*b, *a]),
            [a] => swapped.extend([0, *a]),
            _ => {}
        }
    }
    swapped
}

pub struct BitReader<'a> {
    inner: bitstream_io::BitReader<Cursor<Cow<'a, [u8]>>, BigEndian>,
    position: u64,
    len_bits: u64,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8], order: WordOrder) -> BitReader<'a> {
        let bytes: Cow<'a, [u8]> = match order {
            WordOrder::BigEndian => Cow::Borrowed(data),
            WordOrder::LittleEndian => Cow::Owned(swap_words(data)),
        };
        let len_bits = bytes.len() as u64 * 8;
        BitReader {
            inner: bitstream_io::BitReader::new(Cursor::new(bytes)),
            position: 0,
            len_bits,
        }
    }

    /// Bits consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn remaining(&self) -> u64 {
        self.len_bits - self.position
    }

    fn check(&self, bits: u32) -> Result<(), DecodeError> {
        if u64::from(bits) > self.remaining() {
            return Err(DecodeError::EndOfStream {
                bit_position: self.position,
            });
        }
        Ok(())
    }

    fn eos(&self) -> DecodeError {
        DecodeError::EndOfStream {
            bit_position: self.position,
        }
    }

    pub fn read(&mut self, bits: u32) -> Result<u32, DecodeError> {
        if bits == 0 {
            return Ok(0);
        }
        self.check(bits)?;
        let v = self.inner.read::<u32>(bits).map_err(|_| self.eos())?;
        self.position += u64::from(bits);
        Ok(v)
    }

    /// Two's complement value of `bits` width.
    pub fn read_signed(&mut self, bits: u32) -> Result<i32, DecodeError> {
        self.check(bits)?;
        let v = self.inner.read_signed::<i32>(bits).map_err(|_| self.eos())?;
        self.position += u64::from(bits);
        Ok(v)
    }

    pub fn read_bit(&mut self) -> Result<bool, DecodeError> {
        self.check(1)?;
        let v = self.inner.read_bit().map_err(|_| self.eos())?;
        self.position += 1;
        Ok(v)
    }

    pub fn skip(&mut self, bits: u32) -> Result<(), DecodeError> {
        self.check(bits)?;
        self.inner.skip(bits).map_err(|_| self.eos())?;
        self.position += u64::from(bits);
        Ok(())
    }
}

/// Writes 16-bit-word bitstreams; the inverse of [`BitReader`].
pub struct BitWriter {
    inner: bitstream_io::BitWriter<Vec<u8>, BigEndian>,
    order: WordOrder,
    position: u64,
}

impl BitWriter {
    pub fn new(order: WordOrder) -> BitWriter {
        BitWriter {
            inner: bitstream_io::BitWriter::new(Vec::new()),
            order,
            position: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn write(&mut self, bits: u32, value: u32) -> std::io::Result<()> {
        if bits == 0 {
            return Ok(());
        }
        self.inner.write(bits, value)?;
        self.position += u64::from(bits);
        Ok(())
    }

    pub fn write_signed(&mut self, bits: u32, value: i32) -> std::io::Result<()> {
        self.inner.write_signed(bits, value)?;
        self.position += u64::from(bits);
        Ok(())
    }

    /// Pad with zero bits to a whole number of 16-bit words and return the
    /// bytes in the requested word order.
    pub fn finish(mut self) -> std::io::Result<Vec<u8>> {
        let pad = (16 - self.position % 16) % 16;
        self.write(pad as u32, 0)?;
        self.inner.byte_align()?;
        let bytes = self.inner.into_writer();
        Ok(match self.order {
            WordOrder::BigEndian => bytes,
            WordOrder::LittleEndian => swap_words(&bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_words() {
        // Word 0x8001 stored LE: first bit read is the word's top bit.
        let data = [0x01, 0x80, 0xFF, 0x00];
        let mut r = BitReader::new(&data, WordOrder::LittleEndian);
        assert!(r.read_bit().unwrap());
        assert_eq!(r.read(14).unwrap(), 0);
        assert!(r.read_bit().unwrap());
        assert_eq!(r.read(8).unwrap(), 0);
        assert_eq!(r.read(8).unwrap(), 0xFF);
        assert_eq!(r.position(), 32);
    }

    #[test]
    fn signed_reads() {
        let data = [0b1111_1111, 0b1100_0000];
        let mut r = BitReader::new(&data, WordOrder::BigEndian);
        assert_eq!(r.read_signed(10).unwrap(), -1);
        assert_eq!(r.read_signed(6).unwrap(), 0);
    }

    #[test]
    fn end_of_stream_reports_position() {
        let data = [0u8; 2];
        let mut r = BitReader::new(&data, WordOrder::BigEndian);
        r.skip(12).unwrap();
        assert_eq!(r.read(8), Err(DecodeError::EndOfStream { bit_position: 12 }));
    }

    #[test]
    fn writer_matches_reader() {
        let mut w = BitWriter::new(WordOrder::LittleEndian);
        w.write(6, 0b000001).unwrap();
        w.write_signed(10, -300).unwrap();
        w.write(3, 0b101).unwrap();
        let bytes = w.finish().unwrap();
        assert_eq!(bytes.len(), 4);

        let mut r = BitReader::new(&bytes, WordOrder::LittleEndian);
        assert_eq!(r.read(6).unwrap(), 1);
        assert_eq!(r.read_signed(10).unwrap(), -300);
        assert_eq!(r.read(3).unwrap(), 0b101);
        assert_eq!(r.read(13).unwrap(), 0);
    }
}
