use psx_ox::bmp::BmpSequenceSink;
use psx_ox::{
    default_claimers, ChromaConversion, DecoderConfig, DiscImage, Error, SectorClaimPipeline, VideoStreamListener,
};

extern crate env_logger;

gflags::define! {
    /// Disc image to decode.
    -f, --file: &std::path::Path
}

gflags::define! {
    /// Directory the frames are written to.
    -o, --out: &std::path::Path
}

gflags::define! {
    /// First sector of the video.
    --start: u32 = 0
}

gflags::define! {
    /// Last sector of the video.
    --end: u32 = 4294967295
}

gflags::define! {
    /// Swap Cb and Cr the way some older decoders do.
    --legacy-chroma = false
}

// Decode every STR video frame in a sector range to numbered BMP files.

fn main() -> Result<(), Error> {
    env_logger::init();
    let _args = gflags::parse();

    if !FILE.is_present() {
        gflags::print_help_and_exit(0);
    }
    let out = if OUT.is_present() { OUT.flag } else { std::path::Path::new(".") };
    std::fs::create_dir_all(out)?;

    let mut config = DecoderConfig::new();
    if LEGACY_CHROMA.flag {
        config = config.chroma(ChromaConversion::LegacySwapped);
    }

    let disc = DiscImage::open_path(FILE.flag)?;
    let mut pipeline = SectorClaimPipeline::with_range(disc, START.flag, END.flag);
    pipeline.add_claimers(default_claimers());
    pipeline.add_listener(Box::new(
        VideoStreamListener::new(config, BmpSequenceSink::new(out, "frame")).sectors(START.flag, END.flag),
    ));
    pipeline.run()?;
    Ok(())
}
