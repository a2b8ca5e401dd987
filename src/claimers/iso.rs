use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, warn};

use crate::claim::{ClaimCursor, Claimer};
use crate::error::PipelineError;
use crate::identified::{IdentifiedSector, IsoDirectorySector, IsoVolumeDescriptorSector};
use crate::iso9660::{parse_directory_sector, parse_volume_descriptor, DirectoryRecord, Extent, DESCRIPTOR_PRIMARY};
use crate::sector::CdSector;

/// How far past a volume descriptor the claimer will peek for its root directory.
const DIRECTORY_LOOKAHEAD: u32 = 64;

/// Largest directory extent that is followed, in sectors.
const MAX_DIRECTORY_SECTORS: u32 = 256;

/// Claims ISO 9660 volume descriptors and directory sectors.
///
/// Sector indices are treated as logical block addresses, i.e. the image is
/// expected to start at LBA 0.
#[derive(Debug, Default)]
pub struct Iso9660Claimer {
    /// Sectors known to hold directory records, from parsed extents.
    directory_sectors: BTreeSet<u32>,
    /// Volume size from the primary descriptor; extents past it are ignored.
    volume_sectors: Option<u32>,
    claimed: u32,
}

fn is_form1_data(sector: &CdSector) -> bool {
    !sector.is_cd_audio() && !sector.is_form2() && sector.user_data().len() >= 2048
}

fn looks_like_directory_start(records: &[DirectoryRecord]) -> bool {
    records.len() >= 2
        && records[0].file_identifier == "."
        && records[1].file_identifier == ".."
        && records[0].is_directory()
        && records[1].is_directory()
}

impl Iso9660Claimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember sectors `skip..` of a directory extent. Extents that run past
    /// the volume, or are implausibly long, are dropped.
    fn register_extent(&mut self, extent: Extent, skip: u32) {
        let sectors = extent.sectors();
        let end = match extent.lba.checked_add(sectors) {
            Some(end) if sectors <= MAX_DIRECTORY_SECTORS => end,
            _ => {
                warn!("ignoring directory extent at {} of {} bytes", extent.lba, extent.length);
                return;
            }
        };
        if self.volume_sectors.map_or(false, |size| end > size) {
            warn!("directory extent at {} runs past the volume", extent.lba);
            return;
        }
        self.directory_sectors.extend(extent.lba + skip.min(sectors)..end);
    }

    /// Parse a directory sector and remember the subdirectories it names.
    fn directory(&mut self, sector: &Arc<CdSector>, confidence: u8) -> Option<IdentifiedSector> {
        if !is_form1_data(sector) {
            return None;
        }
        let records = parse_directory_sector(sector.user_data())?;
        if confidence < 100 && !looks_like_directory_start(&records) {
            return None;
        }
        for rec in &records {
            if rec.is_directory() && !rec.is_self_or_parent() {
                self.register_extent(rec.extent, 0);
            } else if rec.file_identifier == "." && rec.extent.lba == sector.index() {
                // Later sectors of a multi-sector directory.
                self.register_extent(rec.extent, 1);
            }
        }
        Some(IdentifiedSector::IsoDirectory(IsoDirectorySector {
            sector: Arc::clone(sector),
            confidence,
            records,
        }))
    }

    fn claim_directories_ahead(&mut self, cursor: &mut ClaimCursor<'_>) -> Result<(), PipelineError> {
        let index = cursor.index();
        let pending: Vec<u32> = self
            .directory_sectors
            .range(index.saturating_add(1)..=index.saturating_add(DIRECTORY_LOOKAHEAD))
            .copied()
            .collect();

        for lba in pending {
            let ahead = lba - index;
            let Some(peeked) = cursor.peek(ahead)? else {
                break;
            };
            if peeked.is_claimed() {
                continue;
            }
            let sector = Arc::clone(peeked.sector());
            if let Some(id) = self.directory(&sector, 100) {
                self.directory_sectors.remove(&lba);
                if cursor.claim_ahead(ahead, id)? {
                    self.claimed += 1;
                }
            }
        }
        Ok(())
    }
}

impl Claimer for Iso9660Claimer {
    fn name(&self) -> &'static str {
        "iso9660"
    }

    fn on_sector(&mut self, cursor: &mut ClaimCursor<'_>) -> Result<(), PipelineError> {
        let index = cursor.index();
        let known_directory = self.directory_sectors.remove(&index);
        let current = cursor.current();
        if current.is_claimed() {
            return Ok(());
        }
        let sector = Arc::clone(current.sector());
        if !is_form1_data(&sector) {
            return Ok(());
        }

        if let Some(vd) = parse_volume_descriptor(sector.user_data()) {
            debug!("sector {}: volume descriptor type {}", index, vd.descriptor_type);
            if vd.descriptor_type == DESCRIPTOR_PRIMARY && vd.volume_space_size > 0 {
                self.volume_sectors = Some(vd.volume_space_size);
            }
            if let Some(root) = vd.root_directory {
                self.register_extent(root, 0);
            }
            let id = IdentifiedSector::IsoVolumeDescriptor(IsoVolumeDescriptorSector {
                sector,
                confidence: 100,
                descriptor_type: vd.descriptor_type,
                system_identifier: vd.system_identifier,
                volume_identifier: vd.volume_identifier,
                volume_space_size: vd.volume_space_size,
                root_directory: vd.root_directory,
            });
            if cursor.claim_current(id) {
                self.claimed += 1;
            }
            return self.claim_directories_ahead(cursor);
        }

        let confidence = if known_directory { 100 } else { 75 };
        match self.directory(&sector, confidence) {
            Some(id) => {
                if cursor.claim_current(id) {
                    self.claimed += 1;
                }
            }
            None if known_directory => {
                warn!("sector {} should hold directory records but does not", index);
            }
            None => {}
        }
        Ok(())
    }

    fn on_end_of_sectors(&mut self) -> Result<(), PipelineError> {
        debug!("{} ISO9660 sectors", self.claimed);
        if !self.directory_sectors.is_empty() {
            debug!("{} directory sectors never reached", self.directory_sectors.len());
        }
        Ok(())
    }
}
