use std::sync::Arc;

use log::{debug, trace};

use crate::bitstream::{BitstreamFormat, FrameHeader};
use crate::claim::{ClaimCursor, Claimer};
use crate::error::PipelineError;
use crate::identified::{IdentifiedSector, VideoChunkSector, VideoSectorFormat, VIDEO_CHUNK_HEADER_SIZE};
use crate::sector::CdSector;

const CHUNK_MAGIC: u16 = 0x0160;
const CHUNK_TYPE_MDEC: u16 = 0x8001;
const MAX_WIDTH: u16 = 1024;
const MAX_HEIGHT: u16 = 512;

/// Fields of the 32-byte header at the start of every video sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub chunk_number: u16,
    pub chunks_in_frame: u16,
    pub frame_number: u32,
    pub demux_size: u32,
    pub width: u16,
    pub height: u16,
    /// From the copy of the frame header kept in the chunk header, if it
    /// could be read.
    pub format: Option<VideoSectorFormat>,
}

fn u16_at(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

fn u32_at(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

/// Parse a video chunk header from sector user data.
pub fn parse_chunk_header(data: &[u8]) -> Option<ChunkHeader> {
    if data.len() < VIDEO_CHUNK_HEADER_SIZE {
        return None;
    }
    if u16_at(data, 0) != CHUNK_MAGIC || u16_at(data, 2) != CHUNK_TYPE_MDEC {
        return None;
    }
    let h = ChunkHeader {
        chunk_number: u16_at(data, 4),
        chunks_in_frame: u16_at(data, 6),
        frame_number: u32_at(data, 8),
        demux_size: u32_at(data, 12),
        width: u16_at(data, 16),
        height: u16_at(data, 18),
        format: FrameHeader::parse(&data[20..28]).ok().map(|f| match f.format {
            BitstreamFormat::Lain => VideoSectorFormat::Lain,
            BitstreamFormat::StrV2 | BitstreamFormat::StrV3 => VideoSectorFormat::Str,
        }),
    };
    if h.chunk_number >= h.chunks_in_frame || h.frame_number == 0 {
        return None;
    }
    if h.width == 0 || h.height == 0 || h.width > MAX_WIDTH || h.height > MAX_HEIGHT {
        return None;
    }
    Some(h)
}

fn identify(sector: &Arc<CdSector>) -> Option<VideoChunkSector> {
    if sector.is_cd_audio() || sector.is_form2() {
        return None;
    }
    let h = parse_chunk_header(sector.user_data())?;

    let mut confidence: u8 = match sector.subheader() {
        Some(sh) if sh.submode.video() => 100,
        _ => 80,
    };
    let format = h.format.unwrap_or_else(|| {
        trace!("sector {}: no readable frame header copy", sector.index());
        confidence -= 20;
        VideoSectorFormat::Str
    });

    Some(VideoChunkSector {
        sector: Arc::clone(sector),
        confidence,
        format,
        frame_number: h.frame_number,
        chunk_number: h.chunk_number,
        chunks_in_frame: h.chunks_in_frame,
        width: h.width,
        height: h.height,
        demux_size: h.demux_size,
    })
}

/// Claims the chunk sectors of STR video streams.
#[derive(Debug, Default)]
pub struct StrVideoClaimer {
    claimed: u32,
}

impl StrVideoClaimer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Claimer for StrVideoClaimer {
    fn name(&self) -> &'static str {
        "str-video"
    }

    fn on_sector(&mut self, cursor: &mut ClaimCursor<'_>) -> Result<(), PipelineError> {
        let current = cursor.current();
        if current.is_claimed() {
            return Ok(());
        }
        if let Some(chunk) = identify(current.sector()) {
            if cursor.claim_current(IdentifiedSector::VideoChunk(chunk)) {
                self.claimed += 1;
            }
        }
        Ok(())
    }

    fn on_end_of_sectors(&mut self) -> Result<(), PipelineError> {
        debug!("{} video chunk sectors", self.claimed);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sector::{build_mode2_sector, CodingInfo, SectorLayout, SubHeader, SubMode};

    /// User data of a video sector: chunk header, then `payload`.
    pub(crate) fn chunk_data(frame: u32, chunk: u16, chunks: u16, width: u16, height: u16, payload: &[u8]) -> Vec<u8> {
        let mut d = vec![0u8; 2048];
        d[0..2].copy_from_slice(&CHUNK_MAGIC.to_le_bytes());
        d[2..4].copy_from_slice(&CHUNK_TYPE_MDEC.to_le_bytes());
        d[4..6].copy_from_slice(&chunk.to_le_bytes());
        d[6..8].copy_from_slice(&chunks.to_le_bytes());
        d[8..12].copy_from_slice(&frame.to_le_bytes());
        d[12..16].copy_from_slice(&(u32::from(chunks) * 2016).to_le_bytes());
        d[16..18].copy_from_slice(&width.to_le_bytes());
        d[18..20].copy_from_slice(&height.to_le_bytes());
        // Frame header copy: version 2, scale 1.
        d[20..22].copy_from_slice(&32u16.to_le_bytes());
        d[22..24].copy_from_slice(&0x3800u16.to_le_bytes());
        d[24..26].copy_from_slice(&1u16.to_le_bytes());
        d[26..28].copy_from_slice(&2u16.to_le_bytes());
        let n = payload.len().min(2048 - VIDEO_CHUNK_HEADER_SIZE);
        d[VIDEO_CHUNK_HEADER_SIZE..VIDEO_CHUNK_HEADER_SIZE + n].copy_from_slice(&payload[..n]);
        d
    }

    pub(crate) fn video_sector(lba: u32, data: &[u8]) -> Vec<u8> {
        let sh = SubHeader {
            file_number: 1,
            channel: 1,
            submode: SubMode(SubMode::VIDEO | SubMode::DATA | SubMode::REAL_TIME),
            coding_info: CodingInfo(0),
        };
        build_mode2_sector(lba, sh, data)
    }

    #[test]
    fn parses_header() {
        let h = parse_chunk_header(&chunk_data(7, 1, 4, 320, 240, &[])).unwrap();
        assert_eq!(h.frame_number, 7);
        assert_eq!((h.chunk_number, h.chunks_in_frame), (1, 4));
        assert_eq!((h.width, h.height), (320, 240));
        assert_eq!(h.demux_size, 4 * 2016);
        assert_eq!(h.format, Some(VideoSectorFormat::Str));
    }

    #[test]
    fn rejects_bad_headers() {
        assert!(parse_chunk_header(&chunk_data(0, 0, 4, 320, 240, &[])).is_none());
        assert!(parse_chunk_header(&chunk_data(1, 4, 4, 320, 240, &[])).is_none());
        assert!(parse_chunk_header(&chunk_data(1, 0, 4, 0, 240, &[])).is_none());
        assert!(parse_chunk_header(&chunk_data(1, 0, 4, 320, 1000, &[])).is_none());
        let mut d = chunk_data(1, 0, 4, 320, 240, &[]);
        d[0] = 0;
        assert!(parse_chunk_header(&d).is_none());
        assert!(parse_chunk_header(&d[..16]).is_none());
    }

    #[test]
    fn confidence_follows_submode() {
        let data = chunk_data(1, 0, 1, 16, 16, &[]);
        let s = Arc::new(CdSector::new(5, SectorLayout::Raw2352, video_sector(5, &data)));
        let c = identify(&s).unwrap();
        assert_eq!(c.confidence, 100);
        assert_eq!(c.payload().len(), 2048 - VIDEO_CHUNK_HEADER_SIZE);

        let plain = Arc::new(CdSector::new(5, SectorLayout::Iso2048, data.clone()));
        assert_eq!(identify(&plain).unwrap().confidence, 80);

        let mut no_copy = data;
        no_copy[22] = 0;
        let plain = Arc::new(CdSector::new(5, SectorLayout::Iso2048, no_copy));
        assert_eq!(identify(&plain).unwrap().confidence, 60);
    }

    #[test]
    fn lain_header_copy() {
        let mut d = chunk_data(1, 0, 1, 320, 176, &[]);
        d[20] = 10;
        d[21] = 12;
        d[24..28].fill(0);
        let h = parse_chunk_header(&d).unwrap();
        assert_eq!(h.format, Some(VideoSectorFormat::Lain));
    }

    #[test]
    fn form2_is_not_video() {
        let sh = SubHeader {
            file_number: 1,
            channel: 1,
            submode: SubMode(SubMode::VIDEO | SubMode::FORM2),
            coding_info: CodingInfo(0),
        };
        let raw = build_mode2_sector(0, sh, &chunk_data(1, 0, 1, 16, 16, &[]));
        let s = Arc::new(CdSector::new(0, SectorLayout::Raw2352, raw));
        assert!(identify(&s).is_none());
    }
}
