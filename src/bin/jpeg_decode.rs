use std::path::PathBuf;

use anyhow::{Context, Result};
use baseline_jpeg::{JpegReader, TiffWriter};
use clap::Parser;
use log::info;

/// Decodes a baseline JPEG into an uncompressed RGB TIFF.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Input JPEG file
    input: PathBuf,

    /// Output TIFF file; defaults to the input path with a .tiff extension
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let output = args
        .output
        .unwrap_or_else(|| args.input.with_extension("tiff"));

    let reader = JpegReader::from_file_path(&args.input)
        .with_context(|| format!("cannot open {}", args.input.display()))?;
    let mut decoder = reader.decoder();
    let frame = decoder
        .read_headers()
        .with_context(|| format!("cannot read the headers of {}", args.input.display()))?;

    let mut tiff = TiffWriter::create(
        &output,
        frame.width as usize,
        frame.height as usize,
        frame.geometry().mcu_height,
    )
    .with_context(|| format!("cannot create {}", output.display()))?;

    decoder
        .decode_into(&mut tiff)
        .with_context(|| format!("cannot decode {}", args.input.display()))?;
    tiff.close()
        .with_context(|| format!("cannot finish {}", output.display()))?;

    info!(
        "decoded {}x{} {:?} image into {}",
        frame.width,
        frame.height,
        frame.component_type,
        output.display()
    );
    Ok(())
}
