//! XA ADPCM and CD-DA audio to signed 16-bit PCM.

use std::io;

use log::{debug, trace, warn};

use crate::claim::SectorListener;
use crate::error::PipelineError;
use crate::identified::{IdentifiedSector, SectorKind, XaAudioSector};
use crate::sector::{CdSector, SECTOR_CD_AUDIO};

pub const SOUND_GROUPS_PER_SECTOR: usize = 18;
pub const SOUND_GROUP_SIZE: usize = 128;
const SOUND_GROUP_HEADER_SIZE: usize = 16;
const SAMPLES_PER_SOUND_UNIT: usize = 28;

pub const CD_AUDIO_SAMPLE_RATE: u32 = 44100;
/// Stereo sample frames in one CD-DA sector.
pub const CD_AUDIO_FRAMES_PER_SECTOR: usize = SECTOR_CD_AUDIO / 4;

// Prediction filter coefficients, scaled by 64.
const K0: [i32; 4] = [0, 60, 115, 98];
const K1: [i32; 4] = [0, 0, -52, -55];

/// Decoded audio of one sector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBlock {
    pub sample_rate: u32,
    pub channels: u8,
    /// Interleaved when stereo.
    pub samples: Vec<i16>,
    pub sector: u32,
}

impl PcmBlock {
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }
}

/// Decoder history for one output channel.
#[derive(Debug, Default, Clone, Copy)]
struct History {
    s1: i32,
    s2: i32,
}

impl History {
    fn decode(&mut self, raw: i32, shift: u8, filter: usize) -> i16 {
        let sample = (raw >> shift) + ((self.s1 * K0[filter] + self.s2 * K1[filter] + 32) >> 6);
        let sample = sample.clamp(i32::from(i16::MIN), i32::from(i16::MAX));
        self.s2 = self.s1;
        self.s1 = sample;
        sample as i16
    }
}

/// Decodes consecutive XA ADPCM sectors of one stream. History carries over
/// from sector to sector, so feed the sectors in order.
#[derive(Debug, Default)]
pub struct XaDecoder {
    history: [History; 2],
}

impl XaDecoder {
    pub fn new() -> XaDecoder {
        XaDecoder::default()
    }

    pub fn reset(&mut self) {
        self.history = [History::default(); 2];
    }

    /// Decode one sector's 18 sound groups.
    pub fn decode(&mut self, xa: &XaAudioSector) -> PcmBlock {
        let data = xa.sector.user_data();
        let eight_bit = xa.bits_per_sample == 8;
        let units = if eight_bit { 4 } else { 8 };
        let channels: u8 = if xa.stereo { 2 } else { 1 };
        let mut samples = Vec::with_capacity(SOUND_GROUPS_PER_SECTOR * units * SAMPLES_PER_SOUND_UNIT);

        for g in 0..SOUND_GROUPS_PER_SECTOR {
            let Some(group) = data.get(g * SOUND_GROUP_SIZE..(g + 1) * SOUND_GROUP_SIZE) else {
                warn!("sector {}: short audio payload, {} sound groups", xa.sector.index(), g);
                break;
            };
            if xa.stereo {
                // Even units are left, odd units right.
                for pair in 0..units / 2 {
                    let left = self.sound_unit(group, pair * 2, eight_bit, 0);
                    let right = self.sound_unit(group, pair * 2 + 1, eight_bit, 1);
                    for (l, r) in left.iter().zip(right.iter()) {
                        samples.push(*l);
                        samples.push(*r);
                    }
                }
            } else {
                for unit in 0..units {
                    samples.extend_from_slice(&self.sound_unit(group, unit, eight_bit, 0));
                }
            }
        }
        trace!("sector {}: {} samples", xa.sector.index(), samples.len());

        PcmBlock {
            sample_rate: xa.sample_rate,
            channels,
            samples,
            sector: xa.sector.index(),
        }
    }

    fn sound_unit(&mut self, group: &[u8], unit: usize, eight_bit: bool, channel: usize) -> [i16; SAMPLES_PER_SOUND_UNIT] {
        let param = group[4 + unit];
        let mut shift = param & 0x0F;
        if shift > 12 {
            shift = 9;
        }
        let filter = usize::from((param >> 4) & 0x03);
        let history = &mut self.history[channel];

        let mut out = [0i16; SAMPLES_PER_SOUND_UNIT];
        for (i, o) in out.iter_mut().enumerate() {
            let word = &group[SOUND_GROUP_HEADER_SIZE + i * 4..SOUND_GROUP_HEADER_SIZE + i * 4 + 4];
            let raw = if eight_bit {
                i32::from(word[unit] as i8) << 8
            } else {
                let byte = word[unit / 2];
                let nibble = if unit & 1 == 0 { byte & 0x0F } else { byte >> 4 };
                i32::from(((nibble << 4) as i8) as i16) << 8
            };
            *o = history.decode(raw, shift, filter);
        }
        out
    }
}

/// A CD-DA sector as 588 frames of 44.1kHz stereo.
pub fn decode_cd_audio(sector: &CdSector) -> PcmBlock {
    let samples = sector
        .user_data()
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    PcmBlock {
        sample_rate: CD_AUDIO_SAMPLE_RATE,
        channels: 2,
        samples,
        sector: sector.index(),
    }
}

/// Receives decoded audio.
pub trait AudioSink {
    fn write(&mut self, block: &PcmBlock) -> io::Result<()>;

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<F: FnMut(&PcmBlock) -> io::Result<()>> AudioSink for F {
    fn write(&mut self, block: &PcmBlock) -> io::Result<()> {
        self(block)
    }
}

/// Which audio a listener follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioStream {
    Xa { file_number: u8, channel: u8 },
    CdAudio,
}

/// Decodes one audio stream out of the claimed sectors into a sink.
pub struct AudioStreamListener<S> {
    stream: AudioStream,
    decoder: XaDecoder,
    sink: S,
    blocks: u32,
}

impl<S: AudioSink> AudioStreamListener<S> {
    pub fn new(stream: AudioStream, sink: S) -> Self {
        AudioStreamListener {
            stream,
            decoder: XaDecoder::new(),
            sink,
            blocks: 0,
        }
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<S: AudioSink> SectorListener for AudioStreamListener<S> {
    fn kind(&self) -> Option<SectorKind> {
        Some(match self.stream {
            AudioStream::Xa { .. } => SectorKind::XaAudio,
            AudioStream::CdAudio => SectorKind::CdAudio,
        })
    }

    fn feed(&mut self, sector: &IdentifiedSector) -> Result<(), PipelineError> {
        let block = match (self.stream, sector) {
            (AudioStream::Xa { file_number, channel }, IdentifiedSector::XaAudio(xa)) => {
                if xa.file_number != file_number || xa.channel != channel {
                    return Ok(());
                }
                self.decoder.decode(xa)
            }
            (AudioStream::CdAudio, IdentifiedSector::CdAudio(cd)) => decode_cd_audio(&cd.sector),
            _ => return Ok(()),
        };
        self.blocks += 1;
        self.sink.write(&block)?;
        Ok(())
    }

    fn end_of_feed(&mut self) -> Result<(), PipelineError> {
        debug!("{:?}: {} audio blocks", self.stream, self.blocks);
        self.sink.finish()?;
        Ok(())
    }
}
