//! From demuxed frames to RGB images, and the listener that drives it.

use std::io;

use log::{debug, error, trace};

use crate::bitstream::{BitstreamDecoder, FrameHeader};
use crate::claim::SectorListener;
use crate::config::DecoderConfig;
use crate::demux::{DemuxedFrame, FrameAssembler};
use crate::error::{FrameError, PipelineError};
use crate::identified::{IdentifiedSector, SectorKind};
use crate::mdec::MdecDecoder;

/// Packed RGB24, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    width: u16,
    height: u16,
    pixels: Vec<u8>,
}

impl RgbImage {
    pub fn new(width: u16, height: u16, pixels: Vec<u8>) -> RgbImage {
        debug_assert_eq!(pixels.len(), usize::from(width) * usize::from(height) * 3);
        RgbImage { width, height, pixels }
    }

    /// Black with a red cross, shown in place of a frame that failed.
    pub fn placeholder(width: u16, height: u16) -> RgbImage {
        let (w, h) = (usize::from(width), usize::from(height));
        let mut pixels = vec![0u8; w * h * 3];
        if w > 0 && h > 0 {
            let longest = w.max(h);
            for i in 0..longest {
                let x = i * w / longest;
                let y = i * h / longest;
                for x in [x, w - 1 - x] {
                    pixels[(y * w + x) * 3] = 0xFF;
                }
            }
        }
        RgbImage { width, height, pixels }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * usize::from(self.width) + x) * 3;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }
}

#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub frame_number: u32,
    pub image: RgbImage,
    /// `None` for placeholders whose header could not be read.
    pub header: Option<FrameHeader>,
    /// Set when `image` is a placeholder.
    pub error: Option<FrameError>,
}

impl DecodedFrame {
    pub fn placeholder(frame_number: u32, width: u16, height: u16, error: FrameError) -> DecodedFrame {
        DecodedFrame {
            frame_number,
            image: RgbImage::placeholder(width, height),
            header: None,
            error: Some(error),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.error.is_some()
    }
}

/// Decodes demuxed frames. Keeps its plane buffers between frames of the
/// same size.
pub struct VideoDecoder {
    config: DecoderConfig,
    mdec: Option<MdecDecoder>,
}

impl VideoDecoder {
    pub fn new(config: DecoderConfig) -> VideoDecoder {
        config.validate();
        VideoDecoder { config, mdec: None }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    fn mdec_for(&mut self, width: u16, height: u16) -> &mut MdecDecoder {
        let idct = self.config.idct;
        let reuse = self
            .mdec
            .as_ref()
            .map_or(false, |m| m.width() == width && m.height() == height);
        if !reuse {
            debug!("new {}x{} MDEC buffers", width, height);
            self.mdec = None;
        }
        self.mdec.get_or_insert_with(|| MdecDecoder::new(width, height, idct))
    }

    pub fn decode(&mut self, frame: &DemuxedFrame) -> Result<DecodedFrame, FrameError> {
        let frame_number = frame.frame_number;
        let wrap = |source| FrameError::Decode { frame_number, source };

        let debug_checks = self.config.debug_checks;
        let chroma = self.config.chroma;
        let mut bitstream = BitstreamDecoder::new(&frame.data).map_err(wrap)?.with_debug_checks(debug_checks);
        let header = *bitstream.header();
        trace!("frame {}: {:?}", frame_number, header);

        let mdec = self.mdec_for(frame.width, frame.height);
        mdec.decode(&mut bitstream).map_err(wrap)?;
        trace!("frame {}: {} MDEC codes", frame_number, bitstream.codes_read());

        Ok(DecodedFrame {
            frame_number,
            image: RgbImage::new(frame.width, frame.height, mdec.to_rgb(chroma)),
            header: Some(header),
            error: None,
        })
    }

    /// Decode, substituting a placeholder (with the error attached) on
    /// failure.
    pub fn decode_or_placeholder(&mut self, frame: &DemuxedFrame) -> DecodedFrame {
        self.decode(frame).unwrap_or_else(|e| {
            error!("{}", e);
            DecodedFrame::placeholder(frame.frame_number, frame.width, frame.height, e)
        })
    }
}

/// Receives decoded frames, placeholders included.
pub trait FrameSink {
    fn frame(&mut self, frame: &DecodedFrame) -> io::Result<()>;

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<F: FnMut(&DecodedFrame) -> io::Result<()>> FrameSink for F {
    fn frame(&mut self, frame: &DecodedFrame) -> io::Result<()> {
        self(frame)
    }
}

/// Follows one video stream through the claimed sectors: reassembles its
/// frames, decodes them and hands them to a sink.
pub struct VideoStreamListener<S> {
    start: u32,
    end: u32,
    channel: Option<u8>,
    assembler: FrameAssembler,
    decoder: VideoDecoder,
    sink: S,
    width: u16,
    height: u16,
    frames: u32,
    failed: u32,
}

impl<S: FrameSink> VideoStreamListener<S> {
    pub fn new(config: DecoderConfig, sink: S) -> Self {
        VideoStreamListener {
            start: 0,
            end: u32::MAX,
            channel: None,
            assembler: FrameAssembler::new(config.frame_order),
            decoder: VideoDecoder::new(config),
            sink,
            width: 0,
            height: 0,
            frames: 0,
            failed: 0,
        }
    }

    /// Only take chunks from sectors `start..=end`.
    pub fn sectors(mut self, start: u32, end: u32) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Only take chunks whose sub-header names `channel`.
    pub fn channel(mut self, channel: u8) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn emit(&mut self, result: Result<DemuxedFrame, FrameError>) -> io::Result<()> {
        let decoded = match result {
            Ok(frame) => self.decoder.decode_or_placeholder(&frame),
            Err(e) => {
                error!("{}", e);
                DecodedFrame::placeholder(e.frame_number(), self.width, self.height, e)
            }
        };
        self.frames += 1;
        if decoded.is_placeholder() {
            self.failed += 1;
        }
        self.sink.frame(&decoded)
    }
}

impl<S: FrameSink> SectorListener for VideoStreamListener<S> {
    fn kind(&self) -> Option<SectorKind> {
        Some(SectorKind::VideoChunk)
    }

    fn feed(&mut self, sector: &IdentifiedSector) -> Result<(), PipelineError> {
        let IdentifiedSector::VideoChunk(chunk) = sector else {
            return Ok(());
        };
        let index = chunk.sector.index();
        if index < self.start || index > self.end {
            return Ok(());
        }
        if let (Some(want), Some(found)) = (self.channel, chunk.channel()) {
            if want != found {
                return Ok(());
            }
        }
        self.width = chunk.width;
        self.height = chunk.height;
        for result in self.assembler.push(chunk) {
            self.emit(result)?;
        }
        Ok(())
    }

    fn end_of_feed(&mut self) -> Result<(), PipelineError> {
        for result in self.assembler.flush() {
            self.emit(result)?;
        }
        debug!("{} frames, {} replaced by placeholders", self.frames, self.failed);
        self.sink.finish()?;
        Ok(())
    }
}
