// Resources
//
// https://psx-spx.consoledev.net/macroblockdecodermdec/
// https://psx-spx.consoledev.net/cdromdrive/
// http://dvdnav.mplayerhq.hu/dvdinfo/mpeghdrs.html
// http://www.reznik.org/papers/SPIE07_MPEG-C_IDCT.pdf

// https://github.com/phoboslab/pl_mpeg

pub mod audio;
pub mod bitreader;
pub mod bitstream;
pub mod bmp;
pub mod claim;
pub mod claimers;
pub mod color;
pub mod config;
pub mod demux;
pub mod disc;
pub mod error;
pub mod idct;
pub mod identified;
pub mod iso9660;
pub mod mdec;
pub mod playback;
pub mod sector;
pub mod video;
pub mod vlc;

mod idct_23002_2;

pub use audio::{AudioSink, AudioStream, AudioStreamListener, PcmBlock, XaDecoder};
pub use bitstream::{BitstreamDecoder, BitstreamEncoder, BitstreamFormat, FrameHeader, MdecCode, MdecInput};
pub use claim::{ClaimCursor, Claimer, SectorClaimPipeline, SectorListener};
pub use claimers::default_claimers;
pub use config::{ChromaConversion, DecoderConfig, FrameOrder, IdctKind};
pub use demux::{DemuxedFrame, FrameAssembler, FrameDemuxer};
pub use disc::{DiscImage, SectorSource};
pub use error::{DecodeError, DemuxError, DiscError, EncodeError, Error, FrameError, PipelineError};
pub use identified::{IdentifiedSector, SectorKind};
pub use mdec::MdecDecoder;
pub use sector::{CdSector, SectorLayout};
pub use video::{DecodedFrame, FrameSink, RgbImage, VideoDecoder, VideoStreamListener};
