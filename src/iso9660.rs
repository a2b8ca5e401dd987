//! ISO 9660 volume descriptor and directory record parsing.

/// Standard identifier found at offset 1 of every volume descriptor.
pub const STANDARD_IDENTIFIER: &[u8; 5] = b"CD001";

pub const DESCRIPTOR_PRIMARY: u8 = 0x01;
pub const DESCRIPTOR_TERMINATOR: u8 = 0xFF;

pub const FLAG_DIRECTORY: u8 = 0x02;

/// Location and size of a file or directory on disc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub lba: u32,
    pub length: u32,
}

impl Extent {
    pub fn sectors(&self) -> u32 {
        self.length.div_ceil(2048)
    }
}

/// A parsed volume descriptor. Only the primary descriptor fills in the
/// identifier fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeDescriptor {
    pub descriptor_type: u8,
    pub system_identifier: String,
    pub volume_identifier: String,
    pub volume_space_size: u32,
    pub root_directory: Option<Extent>,
}

/// A parsed directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub extent: Extent,
    pub file_flags: u8,
    pub file_identifier: String,
}

impl DirectoryRecord {
    pub fn is_directory(&self) -> bool {
        self.file_flags & FLAG_DIRECTORY != 0
    }

    /// The `.` and `..` entries.
    pub fn is_self_or_parent(&self) -> bool {
        self.file_identifier == "." || self.file_identifier == ".."
    }
}

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

/// Read a padded ISO 9660 string (strip trailing spaces).
fn read_str_a(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end().to_string()
}

/// Parse a volume descriptor from 2048 bytes of user data.
pub fn parse_volume_descriptor(data: &[u8]) -> Option<VolumeDescriptor> {
    if data.len() < 2048 || &data[1..6] != STANDARD_IDENTIFIER || data[6] != 1 {
        return None;
    }
    let descriptor_type = data[0];
    if !matches!(descriptor_type, 0..=3 | DESCRIPTOR_TERMINATOR) {
        return None;
    }

    if descriptor_type != DESCRIPTOR_PRIMARY {
        return Some(VolumeDescriptor {
            descriptor_type,
            system_identifier: String::new(),
            volume_identifier: String::new(),
            volume_space_size: 0,
            root_directory: None,
        });
    }

    let root = parse_directory_record(&data[156..190]).map(|r| r.extent);
    Some(VolumeDescriptor {
        descriptor_type,
        system_identifier: read_str_a(&data[8..40]),
        volume_identifier: read_str_a(&data[40..72]),
        volume_space_size: le_u32(&data[80..84]),
        root_directory: root,
    })
}

/// Parse a single directory record starting at `data[0]`.
pub fn parse_directory_record(data: &[u8]) -> Option<DirectoryRecord> {
    let record_len = *data.first()? as usize;
    if record_len < 34 || record_len > data.len() {
        return None;
    }

    let id_len = data[32] as usize;
    if id_len == 0 || 33 + id_len > record_len {
        return None;
    }

    let file_identifier = if id_len == 1 && data[33] == 0x00 {
        ".".to_string()
    } else if id_len == 1 && data[33] == 0x01 {
        "..".to_string()
    } else {
        String::from_utf8_lossy(&data[33..33 + id_len]).to_string()
    };

    Some(DirectoryRecord {
        extent: Extent {
            lba: le_u32(&data[2..6]),
            length: le_u32(&data[10..14]),
        },
        file_flags: data[25],
        file_identifier,
    })
}

/// Parse every record of one directory sector. Returns `None` if the sector
/// is not structurally a directory sector.
pub fn parse_directory_sector(data: &[u8]) -> Option<Vec<DirectoryRecord>> {
    let data = data.get(..2048)?;
    let mut records = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let record_len = data[pos] as usize;
        if record_len == 0 {
            // Records never straddle sectors; the remainder is padding.
            if data[pos..].iter().any(|&b| b != 0) {
                return None;
            }
            break;
        }
        records.push(parse_directory_record(&data[pos..])?);
        pos += record_len;
    }
    if records.is_empty() {
        None
    } else {
        Some(records)
    }
}

/// Encode a directory record, for building test images.
pub fn build_directory_record(identifier: &[u8], extent: Extent, flags: u8) -> Vec<u8> {
    let id_len = identifier.len();
    let record_len = 33 + id_len + ((id_len + 1) % 2);
    let mut rec = vec![0u8; record_len];
    rec[0] = record_len as u8;
    rec[2..6].copy_from_slice(&extent.lba.to_le_bytes());
    rec[6..10].copy_from_slice(&extent.lba.to_be_bytes());
    rec[10..14].copy_from_slice(&extent.length.to_le_bytes());
    rec[14..18].copy_from_slice(&extent.length.to_be_bytes());
    rec[25] = flags;
    rec[32] = id_len as u8;
    rec[33..33 + id_len].copy_from_slice(identifier);
    rec
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pvd(root: Extent) -> Vec<u8> {
        let mut sector = vec![0u8; 2048];
        sector[0] = DESCRIPTOR_PRIMARY;
        sector[1..6].copy_from_slice(STANDARD_IDENTIFIER);
        sector[6] = 1;
        sector[8..40].copy_from_slice(&[b' '; 32]);
        sector[8..19].copy_from_slice(b"PLAYSTATION");
        sector[40..72].copy_from_slice(&[b' '; 32]);
        sector[40..44].copy_from_slice(b"DISC");
        sector[80..84].copy_from_slice(&200u32.to_le_bytes());
        let rec = build_directory_record(&[0], root, FLAG_DIRECTORY);
        sector[156..156 + rec.len()].copy_from_slice(&rec);
        sector
    }

    #[test]
    fn primary_descriptor() {
        let vd = parse_volume_descriptor(&pvd(Extent { lba: 22, length: 4096 })).unwrap();
        assert_eq!(vd.system_identifier, "PLAYSTATION");
        assert_eq!(vd.volume_identifier, "DISC");
        assert_eq!(vd.volume_space_size, 200);
        assert_eq!(vd.root_directory, Some(Extent { lba: 22, length: 4096 }));
        assert_eq!(vd.root_directory.unwrap().sectors(), 2);
    }

    #[test]
    fn rejects_non_descriptor() {
        assert!(parse_volume_descriptor(&[0u8; 2048]).is_none());
    }

    #[test]
    fn directory_sector() {
        let mut sector = vec![0u8; 2048];
        let mut pos = 0;
        for rec in [
            build_directory_record(&[0], Extent { lba: 22, length: 2048 }, FLAG_DIRECTORY),
            build_directory_record(&[1], Extent { lba: 22, length: 2048 }, FLAG_DIRECTORY),
            build_directory_record(b"MOVIE.STR;1", Extent { lba: 30, length: 20480 }, 0),
        ] {
            sector[pos..pos + rec.len()].copy_from_slice(&rec);
            pos += rec.len();
        }
        let records = parse_directory_sector(&sector).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].is_self_or_parent());
        assert_eq!(records[2].file_identifier, "MOVIE.STR;1");
        assert_eq!(records[2].extent.sectors(), 10);
        assert!(!records[2].is_directory());
    }

    #[test]
    fn zero_sector_is_not_a_directory() {
        assert!(parse_directory_sector(&[0u8; 2048]).is_none());
    }
}
