use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use baseline_jpeg::{encode, EncoderOptions, JpegReader, PixelBuffer, RasterSource, TiffReader};
use clap::Parser;
use log::info;

/// Encodes a JPEG or TIFF image as a baseline JPEG.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Input image: .jpg, .jpeg, .tif or .tiff
    input: PathBuf,

    /// Output JPEG file
    #[arg(short, long)]
    output: PathBuf,

    /// Compression level, 0 (finest quantization) to 25
    #[arg(short = 'c', long = "compression", default_value_t = 2,
          value_parser = clap::value_parser!(u8).range(0..=25))]
    quality: u8,

    /// Luma blocks per MCU as HxV, each 1 or 2
    #[arg(short = 'm', long = "mcu", value_parser = parse_sampling)]
    sampling: Option<(u8, u8)>,

    /// Write a single-component grayscale image
    #[arg(short, long)]
    grayscale: bool,
}

fn parse_sampling(s: &str) -> Result<(u8, u8)> {
    let (h, v) = s
        .split_once(|c: char| c.eq_ignore_ascii_case(&'x'))
        .ok_or_else(|| anyhow!("expected HxV, e.g. 2x2"))?;
    let (h, v) = (h.trim().parse::<u8>()?, v.trim().parse::<u8>()?);
    if !(1..=2).contains(&h) || !(1..=2).contains(&v) {
        bail!("sampling factors must be 1 or 2, got {h}x{v}");
    }

    Ok((h, v))
}

enum InputKind {
    Jpeg,
    Tiff,
}

fn input_kind(path: &Path) -> Result<InputKind> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("jpg" | "jpeg") => Ok(InputKind::Jpeg),
        Some("tif" | "tiff") => Ok(InputKind::Tiff),
        _ => bail!(
            "{} is not a .jpg, .jpeg, .tif or .tiff file",
            path.display()
        ),
    }
}

fn encode_from(source: &mut impl RasterSource, output: &Path, options: &EncoderOptions) -> Result<()> {
    let file = File::create(output).with_context(|| format!("cannot create {}", output.display()))?;
    encode(source, BufWriter::new(file), options)
        .with_context(|| format!("cannot encode {}", output.display()))?;
    Ok(())
}

fn main() -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let options = EncoderOptions {
        quality: args.quality,
        luma_sampling: args.sampling.unwrap_or((1, 1)),
        grayscale: args.grayscale,
    };
    options.validate()?;

    let (width, height) = match input_kind(&args.input)? {
        InputKind::Jpeg => {
            let reader = JpegReader::from_file_path(&args.input)
                .with_context(|| format!("cannot open {}", args.input.display()))?;
            let mut image: PixelBuffer = reader
                .decode_to_buffer()
                .with_context(|| format!("cannot decode {}", args.input.display()))?;
            encode_from(&mut image, &args.output, &options)?;
            (image.width(), image.height())
        }
        InputKind::Tiff => {
            let mut tiff = TiffReader::open(&args.input)
                .with_context(|| format!("cannot read {}", args.input.display()))?;
            let size = (tiff.width(), tiff.height());
            encode_from(&mut tiff, &args.output, &options)?;
            size
        }
    };

    info!(
        "encoded {width}x{height} image into {} (quality {}, luma {:?}{})",
        args.output.display(),
        options.quality,
        options.luma_sampling,
        if options.grayscale { ", grayscale" } else { "" }
    );
    Ok(())
}
