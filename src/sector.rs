use std::ops::Range;

use log::trace;

/// CD sync pattern at the start of every raw (2352-byte) data sector.
pub const CD_SYNC_PATTERN: [u8; 12] = [
    0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00,
];

pub const SECTOR_USER_DATA_FORM1: usize = 2048;
pub const SECTOR_USER_DATA_FORM2: usize = 2324;
/// Sectors of audio CD tracks carry 2352 bytes of PCM and no header.
pub const SECTOR_CD_AUDIO: usize = 2352;

const SYNC_LEN: usize = 12;
const HEADER_LEN: usize = 4;
const SUBHEADER_LEN: usize = 8;

/// How the sectors of a disc image are laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorLayout {
    /// User data only (plain ISO image).
    Iso2048,
    /// Sub-header + user data + EDC/ECC, no sync or header.
    Mode2_2336,
    /// Full raw sector: sync + header + sub-header + data + EDC/ECC.
    Raw2352,
    /// Raw sector followed by 96 bytes of subchannel data.
    Raw2448,
}

impl SectorLayout {
    pub fn raw_size(&self) -> usize {
        match self {
            Self::Iso2048 => 2048,
            Self::Mode2_2336 => 2336,
            Self::Raw2352 => 2352,
            Self::Raw2448 => 2448,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Iso2048 => "ISO (2048)",
            Self::Mode2_2336 => "Mode 2 (2336)",
            Self::Raw2352 => "Raw BIN (2352)",
            Self::Raw2448 => "Raw BIN + subchannel (2448)",
        }
    }
}

/// The 4-byte header following the sync pattern: BCD minute/second/frame and mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CdHeader {
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
    pub mode: u8,
}

fn from_bcd(b: u8) -> u32 {
    u32::from(b >> 4) * 10 + u32::from(b & 0x0F)
}

impl CdHeader {
    fn parse(raw: &[u8]) -> CdHeader {
        CdHeader {
            minutes: raw[0],
            seconds: raw[1],
            frames: raw[2],
            mode: raw[3],
        }
    }

    /// Logical block address, taking the 2 second lead-in into account.
    pub fn lba(&self) -> i64 {
        let abs = (from_bcd(self.minutes) * 60 + from_bcd(self.seconds)) * 75
            + from_bcd(self.frames);
        i64::from(abs) - 150
    }
}

/// Sub-header submode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubMode(pub u8);

impl SubMode {
    pub const END_OF_RECORD: u8 = 0x01;
    pub const VIDEO: u8 = 0x02;
    pub const AUDIO: u8 = 0x04;
    pub const DATA: u8 = 0x08;
    pub const TRIGGER: u8 = 0x10;
    pub const FORM2: u8 = 0x20;
    pub const REAL_TIME: u8 = 0x40;
    pub const END_OF_FILE: u8 = 0x80;

    fn has(&self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub fn end_of_record(&self) -> bool {
        self.has(Self::END_OF_RECORD)
    }
    pub fn video(&self) -> bool {
        self.has(Self::VIDEO)
    }
    pub fn audio(&self) -> bool {
        self.has(Self::AUDIO)
    }
    pub fn data(&self) -> bool {
        self.has(Self::DATA)
    }
    pub fn trigger(&self) -> bool {
        self.has(Self::TRIGGER)
    }
    pub fn form2(&self) -> bool {
        self.has(Self::FORM2)
    }
    pub fn real_time(&self) -> bool {
        self.has(Self::REAL_TIME)
    }
    pub fn end_of_file(&self) -> bool {
        self.has(Self::END_OF_FILE)
    }
}

/// Sub-header coding info byte. Only meaningful for audio sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodingInfo(pub u8);

impl CodingInfo {
    /// Reserved bit patterns make the byte invalid for XA audio.
    pub fn is_valid_audio(&self) -> bool {
        (self.0 & 0x03) <= 1 && ((self.0 >> 2) & 0x03) <= 1 && ((self.0 >> 4) & 0x03) <= 1
            && self.0 & 0x80 == 0
    }

    pub fn stereo(&self) -> bool {
        self.0 & 0x03 == 1
    }

    pub fn sample_rate(&self) -> u32 {
        if (self.0 >> 2) & 0x03 == 0 {
            37800
        } else {
            18900
        }
    }

    pub fn bits_per_sample(&self) -> u8 {
        if (self.0 >> 4) & 0x03 == 0 {
            4
        } else {
            8
        }
    }

    pub fn emphasis(&self) -> bool {
        self.0 & 0x40 != 0
    }
}

/// Mode 2 sub-header. Stored twice on disc; the first copy is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubHeader {
    pub file_number: u8,
    pub channel: u8,
    pub submode: SubMode,
    pub coding_info: CodingInfo,
}

impl SubHeader {
    fn parse(raw: &[u8]) -> SubHeader {
        SubHeader {
            file_number: raw[0],
            channel: raw[1],
            submode: SubMode(raw[2]),
            coding_info: CodingInfo(raw[3]),
        }
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        [
            self.file_number,
            self.channel,
            self.submode.0,
            self.coding_info.0,
        ]
    }
}

/// One sector read from a disc image. Immutable once read.
#[derive(Debug, Clone)]
pub struct CdSector {
    index: u32,
    layout: SectorLayout,
    raw: Vec<u8>,
    header: Option<CdHeader>,
    subheader: Option<SubHeader>,
    subheader_copies_match: bool,
    cd_audio: bool,
    data: Range<usize>,
}

impl CdSector {
    /// Interpret `raw` (exactly `layout.raw_size()` bytes) as sector `index`.
    pub fn new(index: u32, layout: SectorLayout, raw: Vec<u8>) -> CdSector {
        let mut sector = CdSector {
            index,
            layout,
            raw,
            header: None,
            subheader: None,
            subheader_copies_match: false,
            cd_audio: false,
            data: 0..0,
        };

        match layout {
            SectorLayout::Iso2048 => {
                sector.data = 0..SECTOR_USER_DATA_FORM1;
            }
            SectorLayout::Mode2_2336 => {
                sector.read_subheader(0);
            }
            SectorLayout::Raw2352 | SectorLayout::Raw2448 => {
                if sector.raw[..SYNC_LEN] != CD_SYNC_PATTERN {
                    sector.cd_audio = true;
                    sector.data = 0..SECTOR_CD_AUDIO;
                } else {
                    let header = CdHeader::parse(&sector.raw[SYNC_LEN..SYNC_LEN + HEADER_LEN]);
                    sector.header = Some(header);
                    let start = SYNC_LEN + HEADER_LEN;
                    match header.mode {
                        1 => sector.data = start..start + SECTOR_USER_DATA_FORM1,
                        2 => sector.read_subheader(start),
                        mode => {
                            trace!("sector {} has mode {}", index, mode);
                            sector.data = start..start + 2336;
                        }
                    }
                }
            }
        }
        sector
    }

    fn read_subheader(&mut self, at: usize) {
        let raw = &self.raw[at..at + SUBHEADER_LEN];
        let subheader = SubHeader::parse(raw);
        self.subheader_copies_match = raw[..4] == raw[4..];
        let start = at + SUBHEADER_LEN;
        let len = if subheader.submode.form2() {
            SECTOR_USER_DATA_FORM2
        } else {
            SECTOR_USER_DATA_FORM1
        };
        self.subheader = Some(subheader);
        self.data = start..start + len;
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn layout(&self) -> SectorLayout {
        self.layout
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Payload after stripping sync, header, sub-header and EDC/ECC.
    pub fn user_data(&self) -> &[u8] {
        &self.raw[self.data.clone()]
    }

    pub fn header(&self) -> Option<&CdHeader> {
        self.header.as_ref()
    }

    pub fn subheader(&self) -> Option<&SubHeader> {
        self.subheader.as_ref()
    }

    /// Whether both stored copies of the sub-header agree.
    pub fn subheader_copies_match(&self) -> bool {
        self.subheader_copies_match
    }

    /// Raw sector with no sync pattern, i.e. a CD-DA audio sector.
    pub fn is_cd_audio(&self) -> bool {
        self.cd_audio
    }

    pub fn is_form2(&self) -> bool {
        self.subheader.map_or(false, |s| s.submode.form2())
    }
}

/// Build a raw 2352-byte Mode 2 sector around `user_data`, for tests and tools.
pub fn build_mode2_sector(lba: u32, subheader: SubHeader, user_data: &[u8]) -> Vec<u8> {
    let mut raw = vec![0u8; 2352];
    raw[..SYNC_LEN].copy_from_slice(&CD_SYNC_PATTERN);
    let abs = lba + 150;
    let to_bcd = |v: u32| -> u8 { (((v / 10) << 4) | (v % 10)) as u8 };
    raw[12] = to_bcd(abs / 75 / 60);
    raw[13] = to_bcd((abs / 75) % 60);
    raw[14] = to_bcd(abs % 75);
    raw[15] = 2;
    let sh = subheader.to_bytes();
    raw[16..20].copy_from_slice(&sh);
    raw[20..24].copy_from_slice(&sh);
    let max = if subheader.submode.form2() {
        SECTOR_USER_DATA_FORM2
    } else {
        SECTOR_USER_DATA_FORM1
    };
    let n = user_data.len().min(max);
    raw[24..24 + n].copy_from_slice(&user_data[..n]);
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_subheader() -> SubHeader {
        SubHeader {
            file_number: 1,
            channel: 2,
            submode: SubMode(SubMode::DATA),
            coding_info: CodingInfo(0),
        }
    }

    #[test]
    fn raw_mode2_form1() {
        let raw = build_mode2_sector(16, data_subheader(), &[7u8; 2048]);
        let sector = CdSector::new(16, SectorLayout::Raw2352, raw);
        assert!(!sector.is_cd_audio());
        assert_eq!(sector.header().unwrap().lba(), 16);
        assert_eq!(sector.subheader().unwrap().channel, 2);
        assert!(sector.subheader_copies_match());
        assert_eq!(sector.user_data().len(), 2048);
        assert!(sector.user_data().iter().all(|&b| b == 7));
    }

    #[test]
    fn raw_mode2_form2_is_longer() {
        let mut sh = data_subheader();
        sh.submode = SubMode(SubMode::AUDIO | SubMode::FORM2);
        let raw = build_mode2_sector(0, sh, &[]);
        let sector = CdSector::new(0, SectorLayout::Raw2352, raw);
        assert!(sector.is_form2());
        assert_eq!(sector.user_data().len(), SECTOR_USER_DATA_FORM2);
    }

    #[test]
    fn missing_sync_is_cd_audio() {
        let sector = CdSector::new(3, SectorLayout::Raw2352, vec![0x55; 2352]);
        assert!(sector.is_cd_audio());
        assert!(sector.subheader().is_none());
        assert_eq!(sector.user_data().len(), 2352);
    }

    #[test]
    fn mode2_2336_reads_subheader() {
        let raw = build_mode2_sector(0, data_subheader(), &[1u8; 2048]);
        let sector = CdSector::new(0, SectorLayout::Mode2_2336, raw[16..].to_vec());
        assert_eq!(sector.subheader().unwrap().file_number, 1);
        assert_eq!(sector.user_data(), &[1u8; 2048][..]);
    }

    #[test]
    fn coding_info_fields() {
        let ci = CodingInfo(0b0001_0101);
        assert!(ci.is_valid_audio());
        assert!(ci.stereo());
        assert_eq!(ci.sample_rate(), 18900);
        assert_eq!(ci.bits_per_sample(), 8);
        assert!(!CodingInfo(0x03).is_valid_audio());
    }
}
