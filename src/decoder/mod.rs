//! Baseline sequential decoding.
//!
//! Header segments are parsed in order until SOS. The entropy-coded data is then decoded one row
//! of MCUs at a time: Huffman decoding is sequential because every block's DC value is predicted
//! from the previous block of its component, while reconstruction (dequantization, inverse DCT,
//! upsampling, color conversion) is independent per MCU and runs on the rayon pool.

use log::{debug, trace, warn};
use rayon::prelude::*;

use crate::bitstream::BitReader;
use crate::color_spaces::{gray_to_rgb, ycbcr_to_rgb};
use crate::dct::inverse_dct;
use crate::entropy::block::{unpack_block, BLOCK_SIZE};
use crate::entropy::huffman_table::{HuffmanClass, HuffmanTree};
use crate::error::{Error, Result};
use crate::interchange::component::{ComponentType, FrameInfo, McuGeometry};
use crate::interchange::jfif::{JfifHeader, Sections, JFIF};
use crate::interchange::marker::{classify, Marker, MarkerType, Unknown};
use crate::quantize::dequantize;
use crate::raster::{PixelBuffer, RasterSink};
use crate::sampling::{blocks_to_plane, upsample};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    HeaderScan,
    EntropyData,
    Done,
}

/// The tables one component of the scan is decoded with.
struct ScanComponent<'t> {
    /// Index into the frame's components.
    index: usize,
    blocks: usize,
    dc: &'t HuffmanTree,
    ac: &'t HuffmanTree,
}

/// Quantized coefficients of one MCU, per frame component, in zigzag order.
type McuCoefficients = Vec<Vec<[i32; BLOCK_SIZE]>>;

pub struct JpegDecoder<'a> {
    reader: BitReader<'a>,
    state: State,
    jfif: JFIF,
}

impl<'a> JpegDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        JpegDecoder {
            reader: BitReader::new(data),
            state: State::Start,
            jfif: JFIF::default(),
        }
    }

    /// Parses every segment up to and including SOS and returns the frame they describe.
    pub fn read_headers(&mut self) -> Result<FrameInfo> {
        if self.state == State::Start {
            self.expect_start_of_image()?;
            self.state = State::HeaderScan;
        }

        if self.state == State::HeaderScan {
            self.scan_headers()?;
            self.state = State::EntropyData;
        }

        self.jfif.frame().cloned()
    }

    /// The APP0 fields, if the stream carried one.
    pub fn jfif_header(&self) -> Option<JfifHeader> {
        self.jfif.header
    }

    /// Decodes the image into `sink`, one MCU at a time in raster order.
    pub fn decode_into(&mut self, sink: &mut impl RasterSink) -> Result<FrameInfo> {
        let frame = self.read_headers()?;
        if self.state != State::EntropyData {
            return Err(Error::InvalidParameter(
                "the image has already been decoded".to_string(),
            ));
        }

        let geometry = frame.geometry();
        debug!(
            "{}x{} MCUs of {}x{} pixels, {} blocks each",
            geometry.mcus_x,
            geometry.mcus_y,
            geometry.mcu_width,
            geometry.mcu_height,
            geometry.blocks_per_mcu()
        );

        let JpegDecoder { reader, jfif, .. } = self;
        let scan = scan_components(jfif, &frame, &geometry)?;
        let quant_tables = frame
            .components()
            .iter()
            .map(|c| jfif.quant_table(c.qt_table_id).map(|t| t.elements()))
            .collect::<Result<Vec<_>>>()?;

        let mut last_dc = vec![0i32; frame.components().len()];

        for mcu_y in 0..geometry.mcus_y {
            let mut row: Vec<McuCoefficients> = Vec::with_capacity(geometry.mcus_x);
            for _ in 0..geometry.mcus_x {
                let mut mcu = vec![Vec::new(); frame.components().len()];
                for component in &scan {
                    for _ in 0..component.blocks {
                        let block = unpack_block(
                            reader,
                            component.dc,
                            component.ac,
                            &mut last_dc[component.index],
                        )?;
                        mcu[component.index].push(block);
                    }
                }
                row.push(mcu);
            }
            trace!("entropy-decoded MCU row {mcu_y}");

            let pixels: Vec<Vec<u32>> = row
                .par_iter()
                .map(|mcu| reconstruct_mcu(mcu, &frame, &geometry, &quant_tables))
                .collect();

            for mcu in &pixels {
                sink.write_row_block(mcu, geometry.max_h, geometry.max_v)?;
            }
        }

        self.expect_end_of_image()?;
        self.state = State::Done;

        Ok(frame)
    }

    fn expect_start_of_image(&mut self) -> Result<()> {
        let (prefix, code) = (self.reader.read_u8()?, self.reader.read_u8()?);
        if (prefix, code) != (Marker::PREFIX, Marker::SOI as u8) {
            return Err(Error::MissingStartOfImage(prefix, code));
        }

        debug!("SOI");
        Ok(())
    }

    fn expect_end_of_image(&mut self) -> Result<()> {
        let code = self.next_marker()?;
        if code != Marker::EOI as u8 {
            return Err(Error::UnexpectedMarker {
                expected: "EOI",
                found: code,
            });
        }

        if !self.reader.at_end() {
            warn!(
                "ignoring {} bytes after EOI",
                self.reader.data.len() - self.reader.tell()
            );
        }
        debug!("EOI");

        Ok(())
    }

    /// Reads a marker code, skipping any fill bytes before it.
    fn next_marker(&mut self) -> Result<u8> {
        self.reader.align();

        let prefix = self.reader.read_u8()?;
        if prefix != Marker::PREFIX {
            return Err(Error::MissingMarkerPrefix(prefix));
        }

        loop {
            let code = self.reader.read_u8()?;
            if code != Marker::PREFIX {
                return Ok(code);
            }
        }
    }

    fn scan_headers(&mut self) -> Result<()> {
        loop {
            let code = self.next_marker()?;

            match Marker::from_u8(code) {
                Some(Marker::SOS) => {
                    let sections = self.jfif.sections;
                    if !sections.contains(Sections::ALL) {
                        return Err(Error::MissingSections(sections.missing().join(", ")));
                    }

                    return self.read_segment(Marker::SOS);
                }
                Some(marker) if matches!(marker.is_segment(), MarkerType::StandAlone) => {
                    return Err(Error::UnexpectedMarker {
                        expected: "a header segment",
                        found: code,
                    });
                }
                Some(marker) => self.read_segment(marker)?,
                None => match classify(code) {
                    Unknown::UnsupportedFrame => {
                        return Err(Error::Unsupported(format!(
                            "marker 0xFF{code:02X} (only baseline frames are decoded)"
                        )));
                    }
                    Unknown::StandAlone => warn!("ignoring standalone marker 0xFF{code:02X}"),
                    Unknown::Skippable => {
                        let length = self.segment_length()?;
                        warn!("skipping segment 0xFF{code:02X}, {length} bytes");
                        self.reader.skip(length)?;
                    }
                },
            }
        }
    }

    /// Length of the segment body, excluding the two length bytes.
    fn segment_length(&mut self) -> Result<usize> {
        let length = self.reader.read_u16_be()? as usize;
        if length < 2 {
            return Err(Error::segment("marker", format!("segment length {length}")));
        }

        Ok(length - 2)
    }

    /// Hands the body of a known segment to its parser, which must consume it exactly.
    fn read_segment(&mut self, marker: Marker) -> Result<()> {
        let declared = self.segment_length()?;
        let data = self.reader.read_slice(declared)?;
        debug!("{} segment, {} bytes", marker.name(), declared + 2);

        let mut body = BitReader::new(data);
        let parsed = match marker {
            Marker::APP0 => self.jfif.parse_app0(&mut body),
            Marker::COM => {
                debug!("comment: {}", String::from_utf8_lossy(data));
                body.skip(declared)
            }
            Marker::DQT => self.jfif.parse_dqt(&mut body),
            Marker::SOF0 => self.jfif.parse_sof0(&mut body),
            Marker::DHT => self.jfif.parse_dht(&mut body),
            Marker::SOS => self.jfif.parse_sos(&mut body),
            Marker::DRI => JFIF::parse_dri(&mut body),
            Marker::SOI | Marker::EOI => Err(Error::UnexpectedMarker {
                expected: "a header segment",
                found: marker as u8,
            }),
        };

        match parsed {
            Err(Error::UnexpectedEof) => {
                return Err(Error::segment(
                    marker.name(),
                    format!("{declared} byte body ends early"),
                ))
            }
            parsed => parsed?,
        }

        if body.tell() != declared {
            return Err(Error::SegmentLength {
                segment: marker.name(),
                declared: declared + 2,
                consumed: body.tell() + 2,
            });
        }

        Ok(())
    }
}

/// Resolves the Huffman tables of every scan component, in scan order.
fn scan_components<'t>(
    jfif: &'t JFIF,
    frame: &FrameInfo,
    geometry: &McuGeometry,
) -> Result<Vec<ScanComponent<'t>>> {
    jfif.scan_order
        .iter()
        .map(|&index| {
            let component = &frame.components()[index];
            let (h, v) = geometry.blocks[index];
            Ok(ScanComponent {
                index,
                blocks: h * v,
                dc: jfif.huffman_table(HuffmanClass::DC, component.dc_table_id)?,
                ac: jfif.huffman_table(HuffmanClass::AC, component.ac_table_id)?,
            })
        })
        .collect()
}

/// Turns the coefficients of one MCU into `0x00RRGGBB` pixels, `mcu_width` per row.
fn reconstruct_mcu(
    mcu: &McuCoefficients,
    frame: &FrameInfo,
    geometry: &McuGeometry,
    quant_tables: &[&[u8; BLOCK_SIZE]],
) -> Vec<u32> {
    let planes: Vec<Vec<u8>> = mcu
        .iter()
        .enumerate()
        .map(|(idx, blocks)| {
            let samples: Vec<[u8; BLOCK_SIZE]> = blocks
                .iter()
                .map(|block| inverse_dct(&dequantize(block, quant_tables[idx])))
                .collect();

            let (h, v) = geometry.blocks[idx];
            let (fx, fy) = geometry.scale(idx);
            upsample(&blocks_to_plane(&samples, h, v), h * 8, v * 8, fx, fy)
        })
        .collect();

    match frame.component_type {
        ComponentType::Grayscale => planes[0].iter().map(|&y| gray_to_rgb(y)).collect(),
        ComponentType::Color => planes[0]
            .iter()
            .zip(&planes[1])
            .zip(&planes[2])
            .map(|((&y, &cb), &cr)| ycbcr_to_rgb(y, cb, cr))
            .collect(),
    }
}

/// Decodes a complete JPEG stream into `sink`.
pub fn decode(data: &[u8], sink: &mut impl RasterSink) -> Result<FrameInfo> {
    JpegDecoder::new(data).decode_into(sink)
}

/// Decodes a complete JPEG stream into memory.
pub fn decode_to_buffer(data: &[u8]) -> Result<PixelBuffer> {
    let mut decoder = JpegDecoder::new(data);
    let frame = decoder.read_headers()?;

    let mut buffer = PixelBuffer::new(frame.width as usize, frame.height as usize);
    decoder.decode_into(&mut buffer)?;

    Ok(buffer)
}
