use psx_ox::{default_claimers, DiscImage, Error, SectorClaimPipeline, SectorKind, SectorSource};

use std::collections::BTreeMap;

extern crate env_logger;

gflags::define! {
    /// Disc image to scan.
    -f, --file: &std::path::Path
}

gflags::define! {
    /// First sector to scan.
    --start: u32 = 0
}

gflags::define! {
    /// Last sector to scan.
    --end: u32 = 4294967295
}

// List every sector of a disc image with what it was identified as.

fn main() -> Result<(), Error> {
    env_logger::init();
    let _args = gflags::parse();

    if !FILE.is_present() {
        gflags::print_help_and_exit(0);
    }

    let disc = DiscImage::open_path(FILE.flag)?;
    println!("{} sectors, {} layout", disc.sector_count(), disc.layout().name());

    let mut pipeline = SectorClaimPipeline::with_range(disc, START.flag, END.flag);
    pipeline.add_claimers(default_claimers());

    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for sector in pipeline {
        let sector = sector?;
        if sector.kind() != SectorKind::Unidentified || log::log_enabled!(log::Level::Debug) {
            println!("{}", sector);
        }
        *counts.entry(format!("{:?}", sector.kind())).or_default() += 1;
    }
    for (kind, n) in counts {
        println!("{:>24}: {}", kind, n);
    }
    Ok(())
}
