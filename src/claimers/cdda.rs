use std::sync::Arc;

use crate::claim::{ClaimCursor, Claimer};
use crate::error::PipelineError;
use crate::identified::{CdAudioSector, IdentifiedSector};

/// Claims raw sectors without a sync pattern, which can only be CD-DA.
#[derive(Debug, Default)]
pub struct CdAudioClaimer {
    claimed: u32,
}

impl CdAudioClaimer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Claimer for CdAudioClaimer {
    fn name(&self) -> &'static str {
        "cd-audio"
    }

    fn on_sector(&mut self, cursor: &mut ClaimCursor<'_>) -> Result<(), PipelineError> {
        let current = cursor.current();
        if current.is_claimed() || !current.sector().is_cd_audio() {
            return Ok(());
        }
        let id = IdentifiedSector::CdAudio(CdAudioSector {
            sector: Arc::clone(current.sector()),
            confidence: 100,
        });
        if cursor.claim_current(id) {
            self.claimed += 1;
        }
        Ok(())
    }

    fn on_end_of_sectors(&mut self) -> Result<(), PipelineError> {
        log::debug!("{} CD audio sectors", self.claimed);
        Ok(())
    }
}
