use thiserror::Error;

/// Fatal errors reading the disc image. These abort a whole pipeline run.
#[derive(Debug, Error)]
pub enum DiscError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unrecognized disc image layout ({len} bytes)")]
    UnrecognizedLayout { len: u64 },

    #[error("sector {index} out of range (image has {count} sectors)")]
    SectorOutOfRange { index: u32, count: u32 },

    #[error("sector {index} is truncated")]
    TruncatedSector { index: u32 },
}

/// Errors that stop the sector claim pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Disc(#[from] DiscError),

    #[error("claimer {claimer} failed at sector {sector}: {message}")]
    Claimer {
        claimer: &'static str,
        sector: u32,
        message: String,
    },

    #[error("sink failed: {0}")]
    Sink(#[from] std::io::Error),
}

/// Per-frame reassembly failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DemuxError {
    #[error("frame {frame}: chunk {chunk} supplied twice")]
    DuplicateChunk { frame: u32, chunk: u16 },

    #[error("frame {frame}: chunk {chunk} disagrees on {field} ({expected} vs {found})")]
    MismatchedChunk {
        frame: u32,
        chunk: u16,
        field: &'static str,
        expected: u32,
        found: u32,
    },

    #[error("frame {frame}: only {received} of {expected} chunks arrived")]
    Incomplete {
        frame: u32,
        received: usize,
        expected: usize,
    },
}

/// Per-frame bitstream decoding failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer does not look like any supported frame format.
    #[error("unrecognized frame header: {0}")]
    UnrecognizedHeader(String),

    #[error("quantization scale is zero")]
    ZeroQuantizationScale,

    #[error("no variable-length code matches bits {bits:#b} at bit {bit_position}")]
    UnmatchedVlc { bits: u32, bit_position: u64 },

    #[error("run length moves past coefficient 63 (to {position}) at bit {bit_position}")]
    RunLengthOutOfBounds { position: usize, bit_position: u64 },

    #[error("DC coefficient {dc} out of range at bit {bit_position}")]
    DcOutOfRange { dc: i32, bit_position: u64 },

    #[error("bitstream ended at bit {bit_position}")]
    EndOfStream { bit_position: u64 },
}

/// A frame that could not be produced, with enough context to report it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error(transparent)]
    Demux(#[from] DemuxError),

    #[error("frame {frame_number}: {source}")]
    Decode {
        frame_number: u32,
        #[source]
        source: DecodeError,
    },
}

impl FrameError {
    pub fn frame_number(&self) -> u32 {
        match self {
            FrameError::Demux(DemuxError::DuplicateChunk { frame, .. })
            | FrameError::Demux(DemuxError::MismatchedChunk { frame, .. })
            | FrameError::Demux(DemuxError::Incomplete { frame, .. }) => *frame,
            FrameError::Decode { frame_number, .. } => *frame_number,
        }
    }
}

/// Errors from the bitstream encoder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("expected a block header, found run/level code {0:#06x}")]
    MissingBlockHeader(u16),

    #[error("MDEC code stream ended inside a block")]
    UnterminatedBlock,

    #[error("qscale {found} does not match the frame qscale {expected}")]
    QscaleMismatch { expected: u8, found: u8 },

    #[error("DC {dc} cannot be coded as a difference from {predictor}")]
    UnencodableDc { dc: i16, predictor: i16 },

    #[error("AC level {0} does not fit the escape code")]
    LevelOutOfRange(i16),

    #[error("bitstream write failed: {0}")]
    Write(String),
}

impl From<std::io::Error> for EncodeError {
    fn from(e: std::io::Error) -> Self {
        EncodeError::Write(e.to_string())
    }
}

/// Catch-all error for callers that do not distinguish the levels.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Disc(#[from] DiscError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DemuxError> for Error {
    fn from(e: DemuxError) -> Self {
        Error::Frame(FrameError::Demux(e))
    }
}
