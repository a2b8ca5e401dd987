use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use log::{debug, info};

use crate::video::{DecodedFrame, FrameSink, RgbImage};

const FILE_HEADER_SIZE: u32 = 14;
const CORE_HEADER_SIZE: u32 = 12;
const BYTES_PER_PIXEL: u32 = 3;

struct BmpFileHeader {
    file_size: u32,
    offset: u32,
}

impl BmpFileHeader {
    fn serialize(&self) -> [u8; 14] {
        let mut ret = [0; 14];
        ret[0] = b'B';
        ret[1] = b'M';
        ret[2..6].copy_from_slice(&self.file_size.to_le_bytes());
        ret[10..14].copy_from_slice(&self.offset.to_le_bytes());
        ret
    }
}

#[derive(Debug, Default, Copy, Clone)]
struct BmpCoreHeader {
    size: u32,
    width: u16,
    height: u16,
    nr_planes: u16,
    bits_per_pixel: u16,
}

impl BmpCoreHeader {
    fn serialize(&self) -> [u8; 12] {
        let mut ret = [0; 12];
        ret[0..4].copy_from_slice(&self.size.to_le_bytes());
        ret[4..6].copy_from_slice(&self.width.to_le_bytes());
        ret[6..8].copy_from_slice(&self.height.to_le_bytes());
        ret[8..10].copy_from_slice(&self.nr_planes.to_le_bytes());
        ret[10..12].copy_from_slice(&self.bits_per_pixel.to_le_bytes());
        ret
    }
}

fn row_padding(width: u16) -> usize {
    let row = u32::from(width) * BYTES_PER_PIXEL;
    ((4 - row % 4) % 4) as usize
}

/// Write `image` as a 24-bit OS/2 style bitmap.
pub fn write_bmp<W: Write>(image: &RgbImage, writer: &mut W) -> io::Result<()> {
    let (width, height) = (image.width(), image.height());
    let padding = row_padding(width);
    let row_bytes = usize::from(width) * BYTES_PER_PIXEL as usize;
    let data_size = (row_bytes + padding) * usize::from(height);

    let offset = FILE_HEADER_SIZE + CORE_HEADER_SIZE;
    let file_size = u32::try_from(data_size)
        .ok()
        .and_then(|d| d.checked_add(offset))
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "image too large for BMP"))?;
    writer.write_all(&BmpFileHeader { file_size, offset }.serialize())?;

    let core = BmpCoreHeader {
        size: CORE_HEADER_SIZE,
        width,
        height,
        nr_planes: 1,
        bits_per_pixel: (BYTES_PER_PIXEL * 8) as u16,
    };
    writer.write_all(&core.serialize())?;

    let pad = [0u8; 3];
    let mut bgr = vec![0u8; row_bytes];
    // Pixel data stored bottom-to-top, hence .rev()
    for row in image.pixels().chunks_exact(row_bytes.max(1)).rev() {
        for (dst, src) in bgr.chunks_exact_mut(3).zip(row.chunks_exact(3)) {
            dst.copy_from_slice(&[src[2], src[1], src[0]]);
        }
        writer.write_all(&bgr)?;
        writer.write_all(&pad[..padding])?;
    }
    Ok(())
}

/// Writes every frame to `<prefix><frame number>.bmp` in a directory.
pub struct BmpSequenceSink {
    dir: PathBuf,
    prefix: String,
    written: u32,
}

impl BmpSequenceSink {
    pub fn new<P: Into<PathBuf>>(dir: P, prefix: &str) -> BmpSequenceSink {
        BmpSequenceSink {
            dir: dir.into(),
            prefix: prefix.to_string(),
            written: 0,
        }
    }

    pub fn path_for(&self, frame_number: u32) -> PathBuf {
        self.dir.join(format!("{}{:05}.bmp", self.prefix, frame_number))
    }

    pub fn written(&self) -> u32 {
        self.written
    }
}

impl FrameSink for BmpSequenceSink {
    fn frame(&mut self, frame: &DecodedFrame) -> io::Result<()> {
        let path = self.path_for(frame.frame_number);
        debug!("writing {}", path.display());
        let mut writer = BufWriter::new(File::create(&path)?);
        write_bmp(&frame.image, &mut writer)?;
        writer.flush()?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        info!("{} frames written to {}", self.written, self.dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn simple_bmp() {
        let pixels: Vec<u8> = vec![255, 0, 0, 0, 255, 0, 0, 0, 255];
        let mut out = Vec::new();
        write_bmp(&RgbImage::new(3, 1, pixels), &mut out).unwrap();

        assert_eq!(&out[0..2], b"BM");
        assert_eq!(out.len(), 14 + 12 + 12);
        assert_eq!(u32::from_le_bytes([out[2], out[3], out[4], out[5]]), out.len() as u32);
        assert_eq!(u32::from_le_bytes([out[10], out[11], out[12], out[13]]), 26);
        // Red stored as BGR, then three bytes of row padding.
        assert_eq!(&out[26..29], &[0, 0, 255]);
        assert_eq!(&out[32..35], &[255, 0, 0]);
        assert_eq!(&out[35..], &[0, 0, 0]);
    }

    #[test]
    fn rows_bottom_up() {
        let mut pixels = vec![0u8; 4 * 2 * 3];
        pixels[0] = 10;
        pixels[4 * 3] = 20;
        let mut out = Vec::new();
        write_bmp(&RgbImage::new(4, 2, pixels), &mut out).unwrap();
        assert_eq!(out.len(), 26 + 2 * 12);
        // Bottom row first; its first pixel has red 20.
        assert_eq!(out[26 + 2], 20);
        assert_eq!(out[26 + 12 + 2], 10);
    }

    #[test]
    fn sequence_sink_writes_files() {
        let dir = std::env::temp_dir().join(format!("psx-ox-bmp-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut sink = BmpSequenceSink::new(&dir, "frame");
        let frame = DecodedFrame {
            frame_number: 7,
            image: RgbImage::placeholder(16, 16),
            header: None,
            error: None,
        };
        sink.frame(&frame).unwrap();
        sink.finish().unwrap();
        let path = sink.path_for(7);
        assert!(path.ends_with("frame00007.bmp"));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 26 + 16 * 16 * 3);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
