//! Baseline sequential encoding with Huffman tables built for the image being encoded.
//!
//! Every MCU goes through the forward stage (color conversion, downsampling, forward DCT,
//! quantization) on the rayon pool. The quantized blocks are then scanned twice in MCU order:
//! the first pass only counts symbols, the second emits them with the tables built from those
//! counts.

use std::io::{Cursor, Seek, Write};

use log::{debug, trace};
use rayon::prelude::*;

use crate::bitstream::BitWriter;
use crate::color_spaces::{rgb_to_gray, rgb_to_ycbcr};
use crate::dct::forward_dct;
use crate::entropy::block::{pack_block, BLOCK_SIZE};
use crate::entropy::huffman_table::{HuffmanClass, HuffmanTree};
use crate::entropy::{FrequencyCounter, HuffmanEmitter};
use crate::error::{Error, Result};
use crate::interchange::component::{Component, ComponentType, FrameInfo, McuGeometry};
use crate::interchange::jfif::{
    write_app0, write_com, write_dht, write_dqt, write_marker, write_sof0, write_sos,
};
use crate::interchange::marker::Marker;
use crate::interchange::sample_precision::SamplePrecision;
use crate::quantize::quantization_table::{
    scaled_table, QuantizationTable, CHROMINANCE, LUMINANCE, MAX_QUALITY,
};
use crate::quantize::quantize;
use crate::raster::{PixelBuffer, RasterSource};
use crate::sampling::{downsample, plane_to_blocks};

/// Quantized coefficients of one MCU, per frame component, in zigzag order.
type McuCoefficients = Vec<Vec<[i32; BLOCK_SIZE]>>;

#[derive(Debug, Clone, PartialEq)]
pub struct EncoderOptions {
    /// `0..=25`: 0 quantizes with all ones, higher values scale the baseline tables up.
    pub quality: u8,
    /// Luma blocks per MCU, horizontally and vertically. Chroma is always one block.
    pub luma_sampling: (u8, u8),
    /// Emit a single-component image.
    pub grayscale: bool,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        EncoderOptions {
            quality: 2,
            luma_sampling: (1, 1),
            grayscale: false,
        }
    }
}

impl EncoderOptions {
    pub fn validate(&self) -> Result<()> {
        if self.quality > MAX_QUALITY {
            return Err(Error::InvalidParameter(format!(
                "quality {} is outside 0..={MAX_QUALITY}",
                self.quality
            )));
        }

        let (h, v) = self.luma_sampling;
        if !(1..=2).contains(&h) || !(1..=2).contains(&v) {
            return Err(Error::InvalidParameter(format!(
                "luma sampling {h}x{v}, factors must be 1 or 2"
            )));
        }

        Ok(())
    }

    fn frame(&self, width: u16, height: u16) -> FrameInfo {
        let components = if self.grayscale {
            vec![Component::from(0, 1, 1, 0)]
        } else {
            let (h, v) = self.luma_sampling;
            let mut chroma = [Component::from(1, 1, 1, 1), Component::from(2, 1, 1, 1)];
            for c in &mut chroma {
                c.dc_table_id = 1;
                c.ac_table_id = 1;
            }

            let mut components = vec![Component::from(0, h, v, 0)];
            components.extend(chroma);
            components
        };

        FrameInfo {
            precision: SamplePrecision::EightBit,
            height,
            width,
            component_type: if self.grayscale {
                ComponentType::Grayscale
            } else {
                ComponentType::Color
            },
            components,
        }
    }
}

/// Encodes every row of `source` as a baseline JFIF stream written to `writer`.
pub fn encode<W: Write + Seek>(
    source: &mut impl RasterSource,
    writer: W,
    options: &EncoderOptions,
) -> Result<W> {
    options.validate()?;

    let (width, height) = match (u16::try_from(source.width()), u16::try_from(source.height())) {
        (Ok(w), Ok(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(Error::InvalidParameter(format!(
                "image dimensions {}x{} are outside 1..=65535",
                source.width(),
                source.height()
            )))
        }
    };
    let image = PixelBuffer::read_from(source)?;

    let frame = options.frame(width, height);
    let geometry = frame.geometry();
    let scan_order: Vec<usize> = (0..frame.components().len()).collect();

    let quant_tables = [
        QuantizationTable::from(0, scaled_table(&LUMINANCE, options.quality)),
        QuantizationTable::from(1, scaled_table(&CHROMINANCE, options.quality)),
    ];
    let component_quant: Vec<&[u8; BLOCK_SIZE]> = frame
        .components()
        .iter()
        .map(|c| quant_tables[c.qt_table_id as usize].elements())
        .collect();

    debug!(
        "encoding {width}x{height} {:?}, {} MCUs of {}x{} pixels, quality {}",
        frame.component_type,
        geometry.mcu_count(),
        geometry.mcu_width,
        geometry.mcu_height,
        options.quality
    );

    let mcus: Vec<McuCoefficients> = (0..geometry.mcu_count())
        .into_par_iter()
        .map(|n| {
            let origin = (
                (n % geometry.mcus_x) * geometry.mcu_width,
                (n / geometry.mcus_x) * geometry.mcu_height,
            );
            forward_mcu(&image, &frame, &geometry, origin, &component_quant)
        })
        .collect();

    // one table slot for luma, one shared by both chroma components
    let slots = if options.grayscale { 1 } else { 2 };
    let mut dc_freqs = vec![[0u32; 256]; slots];
    let mut ac_freqs = vec![[0u32; 256]; slots];
    scan_blocks(&frame, &scan_order, &mcus, |slot, block, last_dc| {
        let mut counter = FrequencyCounter::new(&mut dc_freqs[slot], &mut ac_freqs[slot]);
        pack_block(block, last_dc, &mut counter)
    })?;

    let dc_tables = build_tables(HuffmanClass::DC, &dc_freqs)?;
    let ac_tables = build_tables(HuffmanClass::AC, &ac_freqs)?;

    let mut writer = BitWriter::new(writer);
    write_marker(&mut writer, Marker::SOI)?;
    write_app0(&mut writer)?;
    write_com(
        &mut writer,
        format!("baseline_jpeg {}", env!("CARGO_PKG_VERSION")).as_bytes(),
    )?;
    write_dqt(&mut writer, &quant_tables.iter().take(slots).collect::<Vec<_>>())?;
    write_sof0(&mut writer, &frame)?;
    write_dht(
        &mut writer,
        &dc_tables.iter().chain(&ac_tables).collect::<Vec<_>>(),
    )?;
    write_sos(&mut writer, &frame, &scan_order)?;

    let entropy_start = writer.tell()?;
    scan_blocks(&frame, &scan_order, &mcus, |slot, block, last_dc| {
        let mut emitter = HuffmanEmitter::new(&mut writer, &dc_tables[slot], &ac_tables[slot]);
        pack_block(block, last_dc, &mut emitter)
    })?;
    writer.flush()?;
    debug!("{} bytes of entropy-coded data", writer.tell()? - entropy_start);

    write_marker(&mut writer, Marker::EOI)?;
    writer.flush()?;

    Ok(writer.into_inner())
}

/// Encodes `source` into a new byte vector.
pub fn encode_to_vec(source: &mut impl RasterSource, options: &EncoderOptions) -> Result<Vec<u8>> {
    Ok(encode(source, Cursor::new(Vec::new()), options)?.into_inner())
}

/// Walks the blocks in stream order, handing each to `visit` with its component's table slot
/// and DC predictor. DC prediction restarts at zero for every pass.
fn scan_blocks<F>(
    frame: &FrameInfo,
    scan_order: &[usize],
    mcus: &[McuCoefficients],
    mut visit: F,
) -> Result<()>
where
    F: FnMut(usize, &[i32; BLOCK_SIZE], &mut i32) -> Result<()>,
{
    let mut last_dc = vec![0i32; frame.components().len()];

    for (n, mcu) in mcus.iter().enumerate() {
        for &idx in scan_order {
            let slot = frame.components()[idx].dc_table_id as usize;
            for block in &mcu[idx] {
                visit(slot, block, &mut last_dc[idx])?;
            }
        }
        trace!("scanned MCU {n}");
    }

    Ok(())
}

fn build_tables(class: HuffmanClass, freqs: &[[u32; 256]]) -> Result<Vec<HuffmanTree>> {
    freqs
        .iter()
        .enumerate()
        .map(|(slot, freqs)| HuffmanTree::from_frequencies(class, slot as u8, freqs))
        .collect()
}

/// Runs the forward stage for the MCU whose top-left pixel is `(x0, y0)`. Pixels past the
/// right or bottom edge repeat the last column or row.
fn forward_mcu(
    image: &PixelBuffer,
    frame: &FrameInfo,
    geometry: &McuGeometry,
    (x0, y0): (usize, usize),
    quant_tables: &[&[u8; BLOCK_SIZE]],
) -> McuCoefficients {
    let (width, height) = (geometry.mcu_width, geometry.mcu_height);
    let mut planes = vec![vec![0u8; width * height]; frame.components().len()];

    for y in 0..height {
        let src_y = (y0 + y).min(image.height() - 1);
        for x in 0..width {
            let pixel = image.pixel((x0 + x).min(image.width() - 1), src_y);
            let i = y * width + x;

            match frame.component_type {
                ComponentType::Grayscale => planes[0][i] = rgb_to_gray(pixel),
                ComponentType::Color => {
                    let (luma, cb, cr) = rgb_to_ycbcr(pixel);
                    planes[0][i] = luma;
                    planes[1][i] = cb;
                    planes[2][i] = cr;
                }
            }
        }
    }

    planes
        .iter()
        .enumerate()
        .map(|(idx, plane)| {
            let (fx, fy) = geometry.scale(idx);
            let (h, v) = geometry.blocks[idx];
            let native = downsample(plane, width, height, fx, fy);

            plane_to_blocks(&native, h, v)
                .iter()
                .map(|samples| quantize(&forward_dct(samples), quant_tables[idx]))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color_spaces::{pack_rgb, unpack_rgb};
    use crate::decoder::{decode_to_buffer, JpegDecoder};
    use anyhow::Result;

    fn max_channel_error(a: u32, b: u32) -> u8 {
        let (a, b) = (unpack_rgb(a), unpack_rgb(b));
        [a.0.abs_diff(b.0), a.1.abs_diff(b.1), a.2.abs_diff(b.2)]
            .into_iter()
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn test_uniform_color_round_trip() -> Result<()> {
        let pixel = pack_rgb(200, 100, 50);
        let mut image = PixelBuffer::from_pixels(16, 16, vec![pixel; 256])?;
        let options = EncoderOptions {
            quality: 0,
            ..EncoderOptions::default()
        };

        let jpeg = encode_to_vec(&mut image, &options)?;
        let decoded = decode_to_buffer(&jpeg)?;

        assert_eq!((decoded.width(), decoded.height()), (16, 16));
        for &p in decoded.pixels() {
            assert!(max_channel_error(p, pixel) <= 3, "{p:06x}");
        }

        Ok(())
    }

    #[test]
    fn test_stream_layout() -> Result<()> {
        let mut image = PixelBuffer::from_pixels(8, 8, vec![0x336699; 64])?;
        let jpeg = encode_to_vec(&mut image, &EncoderOptions::default())?;

        assert_eq!(&jpeg[..4], &[0xFF, 0xD8, 0xFF, 0xE0]);
        assert_eq!(&jpeg[6..11], b"JFIF\0");
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);

        let comment = format!("baseline_jpeg {}", env!("CARGO_PKG_VERSION"));
        assert!(jpeg
            .windows(comment.len())
            .any(|w| w == comment.as_bytes()));

        Ok(())
    }

    #[test]
    fn test_grayscale_gradient() -> Result<()> {
        let pixels: Vec<u32> = (0..16 * 16)
            .map(|i| {
                let (x, y) = (i % 16, i / 16);
                let v = (40 + 6 * x + 4 * y) as u8;
                pack_rgb(v, v, v)
            })
            .collect();
        let mut image = PixelBuffer::from_pixels(16, 16, pixels.clone())?;
        let options = EncoderOptions {
            quality: 0,
            grayscale: true,
            ..EncoderOptions::default()
        };

        let jpeg = encode_to_vec(&mut image, &options)?;
        let mut decoder = JpegDecoder::new(&jpeg);
        let frame = decoder.read_headers()?;
        assert_eq!(frame.component_type, ComponentType::Grayscale);
        assert_eq!(frame.components().len(), 1);

        let decoded = decode_to_buffer(&jpeg)?;
        for (&got, &want) in decoded.pixels().iter().zip(&pixels) {
            assert!(max_channel_error(got, want) <= 3, "{got:06x} vs {want:06x}");
        }

        Ok(())
    }

    #[test]
    fn test_subsampled_partial_mcus() -> Result<()> {
        // 17x10 with 2x2 luma: a 2x1 grid of 16x16 MCUs, both partially filled
        let pixel = pack_rgb(30, 160, 220);
        let mut image = PixelBuffer::from_pixels(17, 10, vec![pixel; 170])?;
        let options = EncoderOptions {
            quality: 0,
            luma_sampling: (2, 2),
            ..EncoderOptions::default()
        };

        let jpeg = encode_to_vec(&mut image, &options)?;
        let mut decoder = JpegDecoder::new(&jpeg);
        let frame = decoder.read_headers()?;
        assert_eq!(frame.components()[0].sampling(), (2, 2));
        assert_eq!(frame.geometry().mcu_count(), 2);

        let decoded = decode_to_buffer(&jpeg)?;
        assert_eq!((decoded.width(), decoded.height()), (17, 10));
        for &p in decoded.pixels() {
            assert!(max_channel_error(p, pixel) <= 4, "{p:06x}");
        }

        Ok(())
    }

    #[test]
    fn test_higher_quality_values_shrink_the_stream() -> Result<()> {
        let pixels: Vec<u32> = (0..32 * 32u32)
            .map(|i| pack_rgb((i * 7) as u8, (i * 13) as u8, (i / 5) as u8))
            .collect();

        let sizes = [0, 10]
            .into_iter()
            .map(|quality| -> Result<usize> {
                let mut image = PixelBuffer::from_pixels(32, 32, pixels.clone())?;
                let options = EncoderOptions {
                    quality,
                    ..EncoderOptions::default()
                };
                let jpeg = encode_to_vec(&mut image, &options)?;
                decode_to_buffer(&jpeg)?;
                Ok(jpeg.len())
            })
            .collect::<Result<Vec<_>>>()?;

        assert!(sizes[1] < sizes[0], "{sizes:?}");
        Ok(())
    }

    #[test]
    fn test_invalid_options() {
        let bad_quality = EncoderOptions {
            quality: MAX_QUALITY + 1,
            ..EncoderOptions::default()
        };
        assert!(matches!(
            bad_quality.validate(),
            Err(Error::InvalidParameter(_))
        ));

        let bad_sampling = EncoderOptions {
            luma_sampling: (3, 1),
            ..EncoderOptions::default()
        };
        assert!(bad_sampling.validate().is_err());

        let mut empty = PixelBuffer::new(0, 0);
        assert!(encode_to_vec(&mut empty, &EncoderOptions::default()).is_err());
    }

    /// Declares a huge raster; rows must never be requested.
    struct Oversized;

    impl RasterSource for Oversized {
        fn width(&self) -> usize {
            100_000
        }

        fn height(&self) -> usize {
            100_000
        }

        fn read_row(&mut self, _out: &mut [u32]) -> crate::error::Result<()> {
            panic!("rows read before the dimension check");
        }
    }

    #[test]
    fn test_dimensions_checked_before_reading() {
        assert!(matches!(
            encode_to_vec(&mut Oversized, &EncoderOptions::default()),
            Err(Error::InvalidParameter(_))
        ));
    }
}
