//! Format recognisers plugged into the claim pipeline.

mod cdda;
mod iso;
mod str_video;
mod xa;

pub use cdda::CdAudioClaimer;
pub use iso::Iso9660Claimer;
pub use str_video::{parse_chunk_header, ChunkHeader, StrVideoClaimer};
pub use xa::XaAudioClaimer;

use crate::claim::Claimer;

/// The standard claimers in priority order: CD-standard formats first, then
/// per-title video.
pub fn default_claimers() -> Vec<Box<dyn Claimer>> {
    vec![
        Box::new(XaAudioClaimer::new()),
        Box::new(CdAudioClaimer::new()),
        Box::new(Iso9660Claimer::new()),
        Box::new(StrVideoClaimer::new()),
    ]
}

#[cfg(test)]
pub(crate) use str_video::tests as str_video_tests;
