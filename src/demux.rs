//! Reassembling video frames from their chunk sectors.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use crate::config::FrameOrder;
use crate::error::{DemuxError, FrameError};
use crate::identified::{IdentifiedSector, VideoChunkSector};

/// Under [`FrameOrder::Unordered`], how many frame numbers back a failed
/// frame is remembered so its stragglers can be dropped.
const FAILED_FRAME_WINDOW: u32 = 32;

/// The compressed bitstream of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxedFrame {
    pub frame_number: u32,
    pub width: u16,
    pub height: u16,
    /// Chunk payloads concatenated in chunk order.
    pub data: Vec<u8>,
    /// Bitstream size declared by the chunk headers.
    pub demux_size: u32,
    pub first_sector: u32,
    pub last_sector: u32,
}

/// Collects the chunks of a single frame.
#[derive(Debug)]
pub struct FrameDemuxer {
    frame_number: u32,
    width: u16,
    height: u16,
    demux_size: u32,
    declared_chunks: usize,
    chunks: Vec<Option<Vec<u8>>>,
    received: usize,
    first_sector: u32,
    last_sector: u32,
}

impl FrameDemuxer {
    /// Start a frame from its first chunk to arrive.
    pub fn new(first: &VideoChunkSector) -> FrameDemuxer {
        let declared = usize::from(first.chunks_in_frame);
        let mut d = FrameDemuxer {
            frame_number: first.frame_number,
            width: first.width,
            height: first.height,
            demux_size: first.demux_size,
            declared_chunks: declared,
            chunks: vec![None; declared],
            received: 0,
            first_sector: first.sector.index(),
            last_sector: first.sector.index(),
        };
        d.store(first);
        d
    }

    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    fn store(&mut self, chunk: &VideoChunkSector) {
        let n = usize::from(chunk.chunk_number);
        if n >= self.chunks.len() {
            self.chunks.resize(n + 1, None);
        }
        self.chunks[n] = Some(chunk.payload().to_vec());
        self.received += 1;
        let index = chunk.sector.index();
        self.first_sector = self.first_sector.min(index);
        self.last_sector = self.last_sector.max(index);
    }

    fn mismatch(&self, chunk: &VideoChunkSector, field: &'static str, expected: u32, found: u32) -> DemuxError {
        DemuxError::MismatchedChunk {
            frame: self.frame_number,
            chunk: chunk.chunk_number,
            field,
            expected,
            found,
        }
    }

    /// Add a chunk of this frame.
    pub fn push(&mut self, chunk: &VideoChunkSector) -> Result<(), DemuxError> {
        if chunk.frame_number != self.frame_number {
            return Err(self.mismatch(chunk, "frame number", self.frame_number, chunk.frame_number));
        }
        if chunk.width != self.width {
            return Err(self.mismatch(chunk, "width", self.width.into(), chunk.width.into()));
        }
        if chunk.height != self.height {
            return Err(self.mismatch(chunk, "height", self.height.into(), chunk.height.into()));
        }
        let n = usize::from(chunk.chunk_number);
        if self.chunks.get(n).map_or(false, |c| c.is_some()) {
            return Err(DemuxError::DuplicateChunk {
                frame: self.frame_number,
                chunk: chunk.chunk_number,
            });
        }
        if n >= self.declared_chunks {
            debug!(
                "frame {}: chunk {} beyond the declared {} chunks",
                self.frame_number, n, self.declared_chunks
            );
        }
        // Later chunks may declare a larger frame.
        self.declared_chunks = self.declared_chunks.max(usize::from(chunk.chunks_in_frame));
        self.store(chunk);
        Ok(())
    }

    /// Chunks expected: the declared count, or more if higher chunk numbers
    /// turned up.
    pub fn expected_chunks(&self) -> usize {
        self.chunks.len().max(self.declared_chunks)
    }

    pub fn chunks_received(&self) -> usize {
        self.received
    }

    pub fn is_full(&self) -> bool {
        self.received == self.expected_chunks()
    }

    pub fn finish(self) -> Result<DemuxedFrame, DemuxError> {
        if !self.is_full() {
            return Err(DemuxError::Incomplete {
                frame: self.frame_number,
                received: self.received,
                expected: self.expected_chunks(),
            });
        }
        let data = self.chunks.into_iter().flatten().flatten().collect();
        Ok(DemuxedFrame {
            frame_number: self.frame_number,
            width: self.width,
            height: self.height,
            data,
            demux_size: self.demux_size,
            first_sector: self.first_sector,
            last_sector: self.last_sector,
        })
    }

    /// Pull the chunks of frame `frame_number` out of `sectors`.
    ///
    /// Sectors that are not chunks of the frame are consumed and skipped,
    /// except that under [`FrameOrder::Monotonic`] a chunk of a later frame
    /// ends the search and is left unconsumed. Returns `Ok(None)` if no chunk
    /// of the frame was found. A duplicate or mismatched chunk is consumed
    /// before its error is returned.
    pub fn pull<I>(
        sectors: &mut std::iter::Peekable<I>,
        frame_number: u32,
        order: FrameOrder,
    ) -> Result<Option<DemuxedFrame>, DemuxError>
    where
        I: Iterator<Item = IdentifiedSector>,
    {
        let mut demuxer: Option<FrameDemuxer> = None;

        while let Some(next) = sectors.peek() {
            let IdentifiedSector::VideoChunk(chunk) = next else {
                sectors.next();
                continue;
            };
            if chunk.frame_number > frame_number && order == FrameOrder::Monotonic {
                break;
            }
            if chunk.frame_number != frame_number {
                sectors.next();
                continue;
            }
            let pushed = match demuxer.as_mut() {
                Some(d) => d.push(chunk),
                None => {
                    demuxer = Some(FrameDemuxer::new(chunk));
                    Ok(())
                }
            };
            // A rejected chunk is consumed too, so a retry moves past it.
            sectors.next();
            pushed?;
            if demuxer.as_ref().map_or(false, |d| d.is_full()) {
                break;
            }
        }
        demuxer.map(FrameDemuxer::finish).transpose()
    }
}

/// Push-mode reassembly of a whole video stream.
pub struct FrameAssembler {
    order: FrameOrder,
    pending: BTreeMap<u32, FrameDemuxer>,
    /// Frames that already failed; their remaining chunks are dropped.
    failed: BTreeSet<u32>,
}

impl FrameAssembler {
    pub fn new(order: FrameOrder) -> FrameAssembler {
        FrameAssembler {
            order,
            pending: BTreeMap::new(),
            failed: BTreeSet::new(),
        }
    }

    pub fn pending_frames(&self) -> usize {
        self.pending.len()
    }

    /// Feed one chunk. Returns the frames (or frame failures) this chunk
    /// completes, oldest first.
    pub fn push(&mut self, chunk: &VideoChunkSector) -> Vec<Result<DemuxedFrame, FrameError>> {
        let mut out = Vec::new();
        let frame = chunk.frame_number;

        if self.order == FrameOrder::Monotonic {
            let newer = self.pending.split_off(&frame);
            let older = std::mem::replace(&mut self.pending, newer);
            for (_, d) in older {
                out.push(d.finish().map_err(FrameError::from));
            }
            self.failed = self.failed.split_off(&frame);
        } else {
            let floor = frame.saturating_sub(FAILED_FRAME_WINDOW);
            self.failed = self.failed.split_off(&floor);
        }

        if self.failed.contains(&frame) {
            return out;
        }

        let result = match self.pending.get_mut(&frame) {
            Some(d) => d.push(chunk),
            None => {
                self.pending.insert(frame, FrameDemuxer::new(chunk));
                Ok(())
            }
        };

        match result {
            Err(e) => {
                warn!("{}", e);
                self.pending.remove(&frame);
                self.failed.insert(frame);
                out.push(Err(e.into()));
            }
            Ok(()) => {
                if self.pending.get(&frame).map_or(false, |d| d.is_full()) {
                    if let Some(d) = self.pending.remove(&frame) {
                        out.push(d.finish().map_err(FrameError::from));
                    }
                }
            }
        }
        out
    }

    /// End of stream: every frame still pending is reported incomplete.
    pub fn flush(&mut self) -> Vec<Result<DemuxedFrame, FrameError>> {
        self.failed.clear();
        std::mem::take(&mut self.pending)
            .into_values()
            .map(|d| d.finish().map_err(FrameError::from))
            .collect()
    }
}
