use std::sync::Arc;

use log::{debug, trace};

use crate::audio::{SOUND_GROUPS_PER_SECTOR, SOUND_GROUP_SIZE};
use crate::claim::{ClaimCursor, Claimer};
use crate::error::PipelineError;
use crate::identified::{IdentifiedSector, XaAudioSector};
use crate::sector::CdSector;

/// Claims Mode 2 Form 2 sectors carrying XA ADPCM audio.
#[derive(Debug, Default)]
pub struct XaAudioClaimer {
    claimed: u32,
}

impl XaAudioClaimer {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Sound parameters are stored twice in every sound group header.
fn sound_groups_consistent(data: &[u8]) -> bool {
    (0..SOUND_GROUPS_PER_SECTOR).all(|g| {
        let h = &data[g * SOUND_GROUP_SIZE..g * SOUND_GROUP_SIZE + 16];
        h[0..4] == h[4..8] && h[8..12] == h[12..16]
    })
}

fn identify(sector: &Arc<CdSector>) -> Option<XaAudioSector> {
    let sh = sector.subheader()?;
    if !sh.submode.audio() || !sh.submode.form2() || sh.submode.video() || sh.submode.data() {
        return None;
    }
    if !sh.coding_info.is_valid_audio() || sh.channel >= 32 {
        return None;
    }

    let mut confidence = 100;
    if !sound_groups_consistent(sector.user_data()) {
        trace!("sector {}: inconsistent sound group headers", sector.index());
        confidence = 60;
    }
    if !sector.subheader_copies_match() {
        confidence -= 10;
    }

    Some(XaAudioSector {
        sector: Arc::clone(sector),
        confidence,
        file_number: sh.file_number,
        channel: sh.channel,
        sample_rate: sh.coding_info.sample_rate(),
        stereo: sh.coding_info.stereo(),
        bits_per_sample: sh.coding_info.bits_per_sample(),
        emphasis: sh.coding_info.emphasis(),
    })
}

impl Claimer for XaAudioClaimer {
    fn name(&self) -> &'static str {
        "xa-audio"
    }

    fn on_sector(&mut self, cursor: &mut ClaimCursor<'_>) -> Result<(), PipelineError> {
        let current = cursor.current();
        if current.is_claimed() {
            return Ok(());
        }
        if let Some(xa) = identify(current.sector()) {
            if cursor.claim_current(IdentifiedSector::XaAudio(xa)) {
                self.claimed += 1;
            }
        }
        Ok(())
    }

    fn on_end_of_sectors(&mut self) -> Result<(), PipelineError> {
        debug!("{} XA audio sectors", self.claimed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sector::{build_mode2_sector, CodingInfo, SectorLayout, SubHeader, SubMode};

    fn sector(submode: u8, coding: u8, data: &[u8]) -> Arc<CdSector> {
        let sh = SubHeader {
            file_number: 1,
            channel: 3,
            submode: SubMode(submode),
            coding_info: CodingInfo(coding),
        };
        Arc::new(CdSector::new(0, SectorLayout::Raw2352, build_mode2_sector(0, sh, data)))
    }

    #[test]
    fn identifies_audio() {
        let s = sector(SubMode::AUDIO | SubMode::FORM2 | SubMode::REAL_TIME, 0x01, &[]);
        let xa = identify(&s).unwrap();
        assert_eq!(xa.confidence, 100);
        assert_eq!(xa.channel, 3);
        assert!(xa.stereo);
        assert_eq!(xa.sample_rate, 37800);
        assert_eq!(xa.bits_per_sample, 4);
    }

    #[test]
    fn form1_is_not_audio() {
        assert!(identify(&sector(SubMode::AUDIO, 0, &[])).is_none());
    }

    #[test]
    fn reserved_coding_is_not_audio() {
        assert!(identify(&sector(SubMode::AUDIO | SubMode::FORM2, 0x80, &[])).is_none());
    }

    #[test]
    fn inconsistent_headers_lower_confidence() {
        let mut data = vec![0u8; 2324];
        data[0] = 0x12;
        let xa = identify(&sector(SubMode::AUDIO | SubMode::FORM2, 0, &data)).unwrap();
        assert_eq!(xa.confidence, 60);
    }
}
