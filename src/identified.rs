//! Sector kinds recognised by the claimers.

use std::sync::Arc;

use crate::iso9660::{DirectoryRecord, Extent};
use crate::sector::CdSector;

/// Tag used to route identified sectors to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectorKind {
    XaAudio,
    CdAudio,
    IsoVolumeDescriptor,
    IsoDirectory,
    VideoChunk,
    Unidentified,
}

#[derive(Debug, Clone)]
pub struct XaAudioSector {
    pub sector: Arc<CdSector>,
    pub confidence: u8,
    pub file_number: u8,
    pub channel: u8,
    pub sample_rate: u32,
    pub stereo: bool,
    pub bits_per_sample: u8,
    pub emphasis: bool,
}

#[derive(Debug, Clone)]
pub struct CdAudioSector {
    pub sector: Arc<CdSector>,
    pub confidence: u8,
}

#[derive(Debug, Clone)]
pub struct IsoVolumeDescriptorSector {
    pub sector: Arc<CdSector>,
    pub confidence: u8,
    pub descriptor_type: u8,
    pub system_identifier: String,
    pub volume_identifier: String,
    pub volume_space_size: u32,
    pub root_directory: Option<Extent>,
}

#[derive(Debug, Clone)]
pub struct IsoDirectorySector {
    pub sector: Arc<CdSector>,
    pub confidence: u8,
    pub records: Vec<DirectoryRecord>,
}

/// Engine family a video chunk belongs to; selects the bitstream flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSectorFormat {
    Str,
    Lain,
}

/// Size of the chunk header preceding the frame payload in a video sector.
pub const VIDEO_CHUNK_HEADER_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct VideoChunkSector {
    pub sector: Arc<CdSector>,
    pub confidence: u8,
    pub format: VideoSectorFormat,
    pub frame_number: u32,
    pub chunk_number: u16,
    pub chunks_in_frame: u16,
    pub width: u16,
    pub height: u16,
    /// Size in bytes of the frame's compressed bitstream.
    pub demux_size: u32,
}

impl VideoChunkSector {
    /// This chunk's share of the compressed frame.
    pub fn payload(&self) -> &[u8] {
        &self.sector.user_data()[VIDEO_CHUNK_HEADER_SIZE..]
    }

    pub fn channel(&self) -> Option<u8> {
        self.sector.subheader().map(|s| s.channel)
    }
}

/// A sector after claim resolution.
#[derive(Debug, Clone)]
pub enum IdentifiedSector {
    XaAudio(XaAudioSector),
    CdAudio(CdAudioSector),
    IsoVolumeDescriptor(IsoVolumeDescriptorSector),
    IsoDirectory(IsoDirectorySector),
    VideoChunk(VideoChunkSector),
    /// Nothing claimed the sector.
    Unidentified(Arc<CdSector>),
}

impl IdentifiedSector {
    pub fn sector(&self) -> &Arc<CdSector> {
        match self {
            Self::XaAudio(s) => &s.sector,
            Self::CdAudio(s) => &s.sector,
            Self::IsoVolumeDescriptor(s) => &s.sector,
            Self::IsoDirectory(s) => &s.sector,
            Self::VideoChunk(s) => &s.sector,
            Self::Unidentified(s) => s,
        }
    }

    pub fn index(&self) -> u32 {
        self.sector().index()
    }

    /// Recogniser confidence, 0-100. Unidentified sectors report 0.
    pub fn confidence(&self) -> u8 {
        match self {
            Self::XaAudio(s) => s.confidence,
            Self::CdAudio(s) => s.confidence,
            Self::IsoVolumeDescriptor(s) => s.confidence,
            Self::IsoDirectory(s) => s.confidence,
            Self::VideoChunk(s) => s.confidence,
            Self::Unidentified(_) => 0,
        }
    }

    pub fn kind(&self) -> SectorKind {
        match self {
            Self::XaAudio(_) => SectorKind::XaAudio,
            Self::CdAudio(_) => SectorKind::CdAudio,
            Self::IsoVolumeDescriptor(_) => SectorKind::IsoVolumeDescriptor,
            Self::IsoDirectory(_) => SectorKind::IsoDirectory,
            Self::VideoChunk(_) => SectorKind::VideoChunk,
            Self::Unidentified(_) => SectorKind::Unidentified,
        }
    }
}

impl std::fmt::Display for IdentifiedSector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] ", self.index())?;
        match self {
            Self::XaAudio(s) => write!(
                f,
                "XA audio file {} channel {} {}Hz {} {}-bit",
                s.file_number,
                s.channel,
                s.sample_rate,
                if s.stereo { "stereo" } else { "mono" },
                s.bits_per_sample
            ),
            Self::CdAudio(_) => write!(f, "CD audio"),
            Self::IsoVolumeDescriptor(s) => write!(
                f,
                "ISO9660 volume descriptor type {} \"{}\"",
                s.descriptor_type, s.volume_identifier
            ),
            Self::IsoDirectory(s) => write!(f, "ISO9660 directory ({} records)", s.records.len()),
            Self::VideoChunk(s) => write!(
                f,
                "{:?} video frame {} chunk {}/{} {}x{}",
                s.format, s.frame_number, s.chunk_number, s.chunks_in_frame, s.width, s.height
            ),
            Self::Unidentified(_) => write!(f, "unidentified"),
        }
    }
}
