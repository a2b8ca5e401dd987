use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use log::{debug, warn};

use crate::error::DiscError;
use crate::sector::{CdSector, SectorLayout, SubMode, CD_SYNC_PATTERN};

/// Random access to the sectors of a disc image.
pub trait SectorSource {
    fn sector_count(&self) -> u32;

    /// Read one sector. Failures are not retried.
    fn read_sector(&mut self, index: u32) -> Result<CdSector, DiscError>;
}

/// Number of consecutive sectors that must agree before a layout is accepted.
const CONFIRM_SECTORS: u64 = 4;

const ISO_PVD_SECTOR: u64 = 16;

/// A disc image file with a detected (or declared) sector layout.
pub struct DiscImage<R> {
    reader: R,
    layout: SectorLayout,
    first_sector_offset: u64,
    sector_count: u32,
}

impl DiscImage<BufReader<File>> {
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, DiscError> {
        let f = File::open(path)?;
        DiscImage::open(BufReader::new(f))
    }
}

impl<R: Read + Seek> DiscImage<R> {
    /// Open an image, probing for its sector layout.
    pub fn open(mut reader: R) -> Result<Self, DiscError> {
        let (layout, offset) = detect_layout(&mut reader)?;
        Self::with_layout(reader, layout, offset)
    }

    /// Open an image whose layout is already known.
    pub fn with_layout(mut reader: R, layout: SectorLayout, first_sector_offset: u64) -> Result<Self, DiscError> {
        let len = reader.seek(SeekFrom::End(0))?;
        let usable = len.saturating_sub(first_sector_offset);
        let size = layout.raw_size() as u64;
        if usable % size != 0 {
            warn!("image has {} trailing bytes after the last whole sector", usable % size);
        }
        let sector_count = u32::try_from(usable / size).unwrap_or(u32::MAX);
        debug!("{} image, first sector at {}, {} sectors", layout.name(), first_sector_offset, sector_count);
        Ok(DiscImage {
            reader,
            layout,
            first_sector_offset,
            sector_count,
        })
    }

    pub fn layout(&self) -> SectorLayout {
        self.layout
    }

    pub fn first_sector_offset(&self) -> u64 {
        self.first_sector_offset
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read + Seek> SectorSource for DiscImage<R> {
    fn sector_count(&self) -> u32 {
        self.sector_count
    }

    fn read_sector(&mut self, index: u32) -> Result<CdSector, DiscError> {
        if index >= self.sector_count {
            return Err(DiscError::SectorOutOfRange {
                index,
                count: self.sector_count,
            });
        }
        let size = self.layout.raw_size();
        let offset = self.first_sector_offset + u64::from(index) * size as u64;
        self.reader.seek(SeekFrom::Start(offset))?;
        let mut raw = vec![0u8; size];
        self.reader.read_exact(&mut raw).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                DiscError::TruncatedSector { index }
            } else {
                DiscError::Io(e)
            }
        })?;
        Ok(CdSector::new(index, self.layout, raw))
    }
}

fn read_at<R: Read + Seek>(reader: &mut R, offset: u64, buf: &mut [u8]) -> Result<bool, DiscError> {
    reader.seek(SeekFrom::Start(offset))?;
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(DiscError::Io(e)),
    }
}

/// Search the first two sector lengths for the sync pattern, then require it
/// to repeat at `size` intervals.
fn probe_sync<R: Read + Seek>(reader: &mut R, len: u64, size: u64) -> Result<Option<u64>, DiscError> {
    let window = (size * 2).min(len) as usize;
    if window < CD_SYNC_PATTERN.len() {
        return Ok(None);
    }
    let mut head = vec![0u8; window];
    if !read_at(reader, 0, &mut head)? {
        return Ok(None);
    }

    for offset in 0..=window - CD_SYNC_PATTERN.len() {
        if head[offset..offset + CD_SYNC_PATTERN.len()] != CD_SYNC_PATTERN {
            continue;
        }
        let offset = offset as u64;
        let available = (len - offset) / size;
        if available == 0 {
            continue;
        }
        let mut confirmed = true;
        let mut sync = [0u8; 12];
        for k in 1..available.min(CONFIRM_SECTORS) {
            if !read_at(reader, offset + k * size, &mut sync)? || sync != CD_SYNC_PATTERN {
                confirmed = false;
                break;
            }
        }
        if confirmed {
            return Ok(Some(offset));
        }
    }
    Ok(None)
}

fn has_iso_signature<R: Read + Seek>(reader: &mut R, size: u64, data_offset: u64) -> Result<bool, DiscError> {
    let mut sig = [0u8; 6];
    let found = read_at(reader, ISO_PVD_SECTOR * size + data_offset, &mut sig)?;
    Ok(found && &sig[1..6] == b"CD001")
}

/// Mode 2 sectors without sync: the doubled sub-header must repeat for a few
/// sectors and at least one must have a non-empty submode.
fn probe_2336<R: Read + Seek>(reader: &mut R, len: u64) -> Result<bool, DiscError> {
    let size = 2336u64;
    let count = (len / size).min(CONFIRM_SECTORS);
    if count == 0 || len % size != 0 {
        return Ok(false);
    }
    let mut any_submode = false;
    for k in 0..count {
        let mut sh = [0u8; 8];
        if !read_at(reader, k * size, &mut sh)? || sh[..4] != sh[4..] || sh[1] >= 32 {
            return Ok(false);
        }
        any_submode |= sh[2] & (SubMode::AUDIO | SubMode::VIDEO | SubMode::DATA) != 0;
    }
    Ok(any_submode)
}

/// Guess the raw sector layout and the offset of the first sector.
pub fn detect_layout<R: Read + Seek>(reader: &mut R) -> Result<(SectorLayout, u64), DiscError> {
    let len = reader.seek(SeekFrom::End(0))?;

    for layout in [SectorLayout::Raw2352, SectorLayout::Raw2448] {
        if let Some(offset) = probe_sync(reader, len, layout.raw_size() as u64)? {
            return Ok((layout, offset));
        }
    }

    if has_iso_signature(reader, 2048, 0)? {
        return Ok((SectorLayout::Iso2048, 0));
    }
    if has_iso_signature(reader, 2336, 8)? || probe_2336(reader, len)? {
        return Ok((SectorLayout::Mode2_2336, 0));
    }
    if len > 0 && len % 2048 == 0 {
        warn!("no sector layout detected, assuming 2048 byte sectors");
        return Ok((SectorLayout::Iso2048, 0));
    }
    Err(DiscError::UnrecognizedLayout { len })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sector::{build_mode2_sector, CodingInfo, SubHeader};
    use std::io::Cursor;

    fn subheader() -> SubHeader {
        SubHeader {
            file_number: 1,
            channel: 0,
            submode: SubMode(SubMode::DATA),
            coding_info: CodingInfo(0),
        }
    }

    fn raw_image(sectors: u32) -> Vec<u8> {
        let mut data = Vec::new();
        for i in 0..sectors {
            data.extend(build_mode2_sector(i, subheader(), &[i as u8; 2048]));
        }
        data
    }

    #[test]
    fn detects_raw_2352() {
        let mut img = DiscImage::open(Cursor::new(raw_image(6))).unwrap();
        assert_eq!(img.layout(), SectorLayout::Raw2352);
        assert_eq!(img.sector_count(), 6);
        let s = img.read_sector(4).unwrap();
        assert_eq!(s.user_data()[0], 4);
    }

    #[test]
    fn detects_leading_garbage() {
        let mut data = vec![0xAAu8; 100];
        data.extend(raw_image(5));
        let img = DiscImage::open(Cursor::new(data)).unwrap();
        assert_eq!(img.layout(), SectorLayout::Raw2352);
        assert_eq!(img.first_sector_offset(), 100);
        assert_eq!(img.sector_count(), 5);
    }

    #[test]
    fn detects_2448() {
        let mut data = Vec::new();
        for i in 0..5 {
            data.extend(build_mode2_sector(i, subheader(), &[]));
            data.extend([0u8; 96]);
        }
        let img = DiscImage::open(Cursor::new(data)).unwrap();
        assert_eq!(img.layout(), SectorLayout::Raw2448);
    }

    #[test]
    fn detects_2336() {
        let mut data = Vec::new();
        for i in 0..5 {
            data.extend_from_slice(&build_mode2_sector(i, subheader(), &[])[16..]);
        }
        let img = DiscImage::open(Cursor::new(data)).unwrap();
        assert_eq!(img.layout(), SectorLayout::Mode2_2336);
    }

    #[test]
    fn detects_iso() {
        let mut data = vec![0u8; 20 * 2048];
        data[16 * 2048] = 1;
        data[16 * 2048 + 1..16 * 2048 + 6].copy_from_slice(b"CD001");
        let img = DiscImage::open(Cursor::new(data)).unwrap();
        assert_eq!(img.layout(), SectorLayout::Iso2048);
        assert_eq!(img.sector_count(), 20);
    }

    #[test]
    fn rejects_odd_sized_garbage() {
        let err = DiscImage::open(Cursor::new(vec![0x11u8; 3001])).err().unwrap();
        assert!(matches!(err, DiscError::UnrecognizedLayout { len: 3001 }));
    }

    #[test]
    fn out_of_range_read() {
        let mut img = DiscImage::open(Cursor::new(raw_image(2))).unwrap();
        assert!(matches!(
            img.read_sector(2),
            Err(DiscError::SectorOutOfRange { index: 2, count: 2 })
        ));
    }
}
