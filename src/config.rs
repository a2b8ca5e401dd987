use log::warn;

/// Which chroma coefficients the YCbCr to RGB conversion uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChromaConversion {
    /// Matches the console hardware.
    #[default]
    Psx,
    /// Cb and Cr swapped, as some older decoders did. Only for reproducing
    /// their output.
    LegacySwapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdctKind {
    #[default]
    FixedPoint,
    /// Floating point, rounded. Slow.
    Reference,
}

/// How frame numbers are expected to progress through a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameOrder {
    /// Frame numbers never decrease in sector order, so a chunk from a later
    /// frame means every earlier frame has all the chunks it will get.
    #[default]
    Monotonic,
    /// Chunks of different frames may interleave; frames are only finished
    /// when complete or at the end of the stream.
    Unordered,
}

/// Options for decoding video. Passed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecoderConfig {
    pub chroma: ChromaConversion,
    pub idct: IdctKind,
    /// Extra self-consistency assertions while decoding. Needs a build with
    /// debug assertions.
    pub debug_checks: bool,
    pub frame_order: FrameOrder,
}

impl DecoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chroma(mut self, chroma: ChromaConversion) -> Self {
        self.chroma = chroma;
        self
    }

    pub fn idct(mut self, idct: IdctKind) -> Self {
        self.idct = idct;
        self
    }

    pub fn debug_checks(mut self, enabled: bool) -> Self {
        self.debug_checks = enabled;
        self
    }

    pub fn frame_order(mut self, order: FrameOrder) -> Self {
        self.frame_order = order;
        self
    }

    /// Log anything about the configuration that will not behave as asked.
    pub(crate) fn validate(&self) {
        if self.debug_checks && !cfg!(debug_assertions) {
            warn!("debug checks requested, but this build has no debug assertions; they will not run");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = DecoderConfig::default();
        assert_eq!(c.chroma, ChromaConversion::Psx);
        assert_eq!(c.idct, IdctKind::FixedPoint);
        assert!(!c.debug_checks);
        assert_eq!(c.frame_order, FrameOrder::Monotonic);
    }

    #[test]
    fn builder() {
        let c = DecoderConfig::new()
            .chroma(ChromaConversion::LegacySwapped)
            .idct(IdctKind::Reference)
            .frame_order(FrameOrder::Unordered)
            .debug_checks(true);
        assert_eq!(c.chroma, ChromaConversion::LegacySwapped);
        assert_eq!(c.idct, IdctKind::Reference);
        assert_eq!(c.frame_order, FrameOrder::Unordered);
        assert!(c.debug_checks);
        c.validate();
    }
}
