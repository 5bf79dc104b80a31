//! Baseline TIFF: uncompressed, 8 bits per sample, chunky (interleaved) samples.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use log::debug;
use memmap::Mmap;

use crate::color_spaces::{gray_to_rgb, pack_rgb, unpack_rgb};
use crate::error::{Error, Result};
use crate::raster::{blit_mcu, McuCursor, RasterSink, RasterSource};

const IMAGE_WIDTH: u16 = 256;
const IMAGE_LENGTH: u16 = 257;
const BITS_PER_SAMPLE: u16 = 258;
const COMPRESSION: u16 = 259;
const PHOTOMETRIC_INTERPRETATION: u16 = 262;
const STRIP_OFFSETS: u16 = 273;
const SAMPLES_PER_PIXEL: u16 = 277;
const ROWS_PER_STRIP: u16 = 278;
const STRIP_BYTE_COUNTS: u16 = 279;
const X_RESOLUTION: u16 = 282;
const Y_RESOLUTION: u16 = 283;
const PLANAR_CONFIGURATION: u16 = 284;
const RESOLUTION_UNIT: u16 = 296;

const SHORT: u16 = 3;
const LONG: u16 = 4;
const RATIONAL: u16 = 5;

const PHOTOMETRIC_BLACK_IS_ZERO: u32 = 1;
const PHOTOMETRIC_RGB: u32 = 2;

/// Writes an RGB TIFF as MCUs arrive, one strip per row of MCUs.
pub struct TiffWriter<W: Write + Seek> {
    writer: W,
    width: usize,
    height: usize,
    rows_per_strip: usize,
    strip: Vec<u32>,
    strip_top: usize,
    cursor: McuCursor,
    strip_offsets: Vec<u32>,
    strip_byte_counts: Vec<u32>,
}

impl TiffWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(
        path: P,
        width: usize,
        height: usize,
        rows_per_strip: usize,
    ) -> Result<Self> {
        let file = File::create(path)?;
        TiffWriter::new(BufWriter::new(file), width, height, rows_per_strip)
    }
}

impl<W: Write + Seek> TiffWriter<W> {
    pub fn new(mut writer: W, width: usize, height: usize, rows_per_strip: usize) -> Result<Self> {
        if width == 0 || height == 0 || rows_per_strip == 0 {
            return Err(Error::InvalidRaster(format!(
                "{width}x{height} image with {rows_per_strip} rows per strip"
            )));
        }
        if width > u32::MAX as usize || height > u32::MAX as usize {
            return Err(Error::InvalidRaster(format!("{width}x{height} image")));
        }

        // byte order, magic, IFD offset patched on close
        writer.write_all(b"II")?;
        writer.write_u16::<LittleEndian>(42)?;
        writer.write_u32::<LittleEndian>(0)?;

        Ok(TiffWriter {
            writer,
            width,
            height,
            rows_per_strip,
            strip: vec![0; width * rows_per_strip],
            strip_top: 0,
            cursor: McuCursor::new(width, height),
            strip_offsets: vec![],
            strip_byte_counts: vec![],
        })
    }

    fn flush_strip(&mut self) -> Result<()> {
        let rows = self.rows_per_strip.min(self.height - self.strip_top);
        let offset = self.position()?;

        let mut bytes = Vec::with_capacity(rows * self.width * 3);
        for &pixel in &self.strip[..rows * self.width] {
            let (r, g, b) = unpack_rgb(pixel);
            bytes.extend_from_slice(&[r, g, b]);
        }
        self.writer.write_all(&bytes)?;

        self.strip_offsets.push(offset);
        self.strip_byte_counts.push(bytes.len() as u32);
        self.strip_top += rows;

        Ok(())
    }

    fn position(&mut self) -> Result<u32> {
        let position = self.writer.stream_position()?;
        u32::try_from(position)
            .map_err(|_| Error::InvalidRaster("TIFF output exceeds 4 GiB".to_string()))
    }

    /// Writes the IFD and patches its offset into the header.
    pub fn close(mut self) -> Result<W> {
        if !self.cursor.is_done() {
            return Err(Error::InvalidRaster(format!(
                "closed after {} of {} rows",
                self.strip_top, self.height
            )));
        }

        let strips = self.strip_offsets.len() as u32;

        // out-of-line values
        let bits_at = self.position()?;
        for _ in 0..3 {
            self.writer.write_u16::<LittleEndian>(8)?;
        }
        let resolution_at = self.position()?;
        self.writer.write_u32::<LittleEndian>(72)?;
        self.writer.write_u32::<LittleEndian>(1)?;

        let offsets_at = self.position()?;
        if strips > 1 {
            for &offset in &self.strip_offsets {
                self.writer.write_u32::<LittleEndian>(offset)?;
            }
        }
        let counts_at = self.position()?;
        if strips > 1 {
            for &count in &self.strip_byte_counts {
                self.writer.write_u32::<LittleEndian>(count)?;
            }
        }

        // word-aligned IFD
        if self.position()? % 2 == 1 {
            self.writer.write_u8(0)?;
        }
        let ifd_at = self.position()?;

        let (offsets_value, counts_value) = if strips > 1 {
            (offsets_at, counts_at)
        } else {
            (self.strip_offsets[0], self.strip_byte_counts[0])
        };

        let entries: [(u16, u16, u32, u32); 13] = [
            (IMAGE_WIDTH, LONG, 1, self.width as u32),
            (IMAGE_LENGTH, LONG, 1, self.height as u32),
            (BITS_PER_SAMPLE, SHORT, 3, bits_at),
            (COMPRESSION, SHORT, 1, 1),
            (PHOTOMETRIC_INTERPRETATION, SHORT, 1, PHOTOMETRIC_RGB),
            (STRIP_OFFSETS, LONG, strips, offsets_value),
            (SAMPLES_PER_PIXEL, SHORT, 1, 3),
            (ROWS_PER_STRIP, LONG, 1, self.rows_per_strip as u32),
            (STRIP_BYTE_COUNTS, LONG, strips, counts_value),
            (X_RESOLUTION, RATIONAL, 1, resolution_at),
            (Y_RESOLUTION, RATIONAL, 1, resolution_at),
            (PLANAR_CONFIGURATION, SHORT, 1, 1),
            // no absolute unit
            (RESOLUTION_UNIT, SHORT, 1, 1),
        ];

        self.writer.write_u16::<LittleEndian>(entries.len() as u16)?;
        for (tag, kind, count, value) in entries {
            self.writer.write_u16::<LittleEndian>(tag)?;
            self.writer.write_u16::<LittleEndian>(kind)?;
            self.writer.write_u32::<LittleEndian>(count)?;
            if kind == SHORT && count == 1 {
                self.writer.write_u16::<LittleEndian>(value as u16)?;
                self.writer.write_u16::<LittleEndian>(0)?;
            } else {
                self.writer.write_u32::<LittleEndian>(value)?;
            }
        }
        self.writer.write_u32::<LittleEndian>(0)?;

        self.writer.seek(SeekFrom::Start(4))?;
        self.writer.write_u32::<LittleEndian>(ifd_at)?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;

        debug!(
            "wrote {}x{} TIFF, {strips} strips, IFD at {ifd_at}",
            self.width, self.height
        );
        Ok(self.writer)
    }
}

impl<W: Write + Seek> RasterSink for TiffWriter<W> {
    fn write_row_block(&mut self, pixels: &[u32], blocks_h: usize, blocks_v: usize) -> Result<()> {
        let (mcu_width, mcu_height) = (blocks_h * 8, blocks_v * 8);
        if mcu_height != self.rows_per_strip || pixels.len() != mcu_width * mcu_height {
            return Err(Error::InvalidRaster(format!(
                "{mcu_width}x{mcu_height} MCU for strips of {} rows",
                self.rows_per_strip
            )));
        }

        let (x0, y0) = self.cursor.advance(mcu_width, mcu_height)?;
        let strip_rows = self.rows_per_strip.min(self.height - self.strip_top);
        blit_mcu(
            &mut self.strip,
            self.width,
            strip_rows,
            (x0, y0 - self.strip_top),
            pixels,
            mcu_width,
        );

        if self.cursor.at_row_start() {
            self.flush_strip()?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u16(self, bytes: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(bytes),
            Endian::Big => BigEndian::read_u16(bytes),
        }
    }

    fn u32(self, bytes: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(bytes),
            Endian::Big => BigEndian::read_u32(bytes),
        }
    }
}

fn slice_at(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    bytes
        .get(offset..offset + len)
        .ok_or_else(|| Error::InvalidRaster(format!("offset {offset} out of bounds")))
}

/// Reads rows out of a baseline TIFF held in memory (or mapped from a file).
pub struct TiffReader<D: AsRef<[u8]>> {
    data: D,
    width: usize,
    height: usize,
    samples_per_pixel: usize,
    rows_per_strip: usize,
    strip_offsets: Vec<usize>,
    next_row: usize,
}

impl TiffReader<Mmap> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        TiffReader::from_bytes(mmap)
    }
}

impl<D: AsRef<[u8]>> TiffReader<D> {
    pub fn from_bytes(data: D) -> Result<Self> {
        let bytes = data.as_ref();

        let endian = match bytes.get(..2) {
            Some(b"II") => Endian::Little,
            Some(b"MM") => Endian::Big,
            _ => return Err(Error::InvalidRaster("not a TIFF file".to_string())),
        };
        let slice = |offset: usize, len: usize| slice_at(bytes, offset, len);

        if endian.u16(slice(2, 2)?) != 42 {
            return Err(Error::InvalidRaster("bad TIFF magic".to_string()));
        }
        let ifd_at = endian.u32(slice(4, 4)?) as usize;
        let entry_count = endian.u16(slice(ifd_at, 2)?) as usize;

        let mut width = None;
        let mut height = None;
        let mut bits_per_sample = vec![1];
        let mut compression = 1;
        let mut photometric = None;
        let mut samples_per_pixel = 1;
        let mut rows_per_strip = None;
        let mut strip_offsets = vec![];
        let mut planar = 1;

        for i in 0..entry_count {
            let entry = slice(ifd_at + 2 + i * 12, 12)?;
            let tag = endian.u16(&entry[0..2]);
            let kind = endian.u16(&entry[2..4]);
            let count = endian.u32(&entry[4..8]) as usize;

            let size = match kind {
                SHORT => 2,
                LONG => 4,
                _ => continue,
            };
            let values_at = if size * count <= 4 {
                ifd_at + 2 + i * 12 + 8
            } else {
                endian.u32(&entry[8..12]) as usize
            };
            let raw = slice(values_at, size * count)?;
            let values: Vec<u32> = raw
                .chunks_exact(size)
                .map(|v| {
                    if size == 2 {
                        endian.u16(v) as u32
                    } else {
                        endian.u32(v)
                    }
                })
                .collect();
            let first = values.first().copied().unwrap_or(0);

            match tag {
                IMAGE_WIDTH => width = Some(first as usize),
                IMAGE_LENGTH => height = Some(first as usize),
                BITS_PER_SAMPLE => bits_per_sample = values,
                COMPRESSION => compression = first,
                PHOTOMETRIC_INTERPRETATION => photometric = Some(first),
                STRIP_OFFSETS => strip_offsets = values.iter().map(|&v| v as usize).collect(),
                SAMPLES_PER_PIXEL => samples_per_pixel = first as usize,
                ROWS_PER_STRIP => rows_per_strip = Some(first as usize),
                PLANAR_CONFIGURATION => planar = first,
                _ => {}
            }
        }

        let (Some(width), Some(height)) = (width, height) else {
            return Err(Error::InvalidRaster("missing image dimensions".to_string()));
        };
        if width == 0 || height == 0 {
            return Err(Error::InvalidRaster(format!("{width}x{height} image")));
        }
        if compression != 1 {
            return Err(Error::InvalidRaster(format!("compression scheme {compression}")));
        }
        if !matches!(samples_per_pixel, 1 | 3 | 4) || bits_per_sample.iter().any(|&b| b != 8) {
            return Err(Error::InvalidRaster(format!(
                "{samples_per_pixel} samples of {bits_per_sample:?} bits"
            )));
        }
        if planar != 1 && samples_per_pixel > 1 {
            return Err(Error::InvalidRaster("planar sample layout".to_string()));
        }
        let expected_photometric = if samples_per_pixel == 1 {
            PHOTOMETRIC_BLACK_IS_ZERO
        } else {
            PHOTOMETRIC_RGB
        };
        if photometric.is_some_and(|p| p != expected_photometric) {
            return Err(Error::InvalidRaster(format!(
                "photometric interpretation {photometric:?}"
            )));
        }

        let rows_per_strip = rows_per_strip.unwrap_or(height).clamp(1, height);
        if strip_offsets.len() < height.div_ceil(rows_per_strip) {
            return Err(Error::InvalidRaster(format!(
                "{} strips for {height} rows",
                strip_offsets.len()
            )));
        }

        debug!(
            "TIFF {width}x{height}, {samples_per_pixel} samples, {} strips",
            strip_offsets.len()
        );

        Ok(TiffReader {
            data,
            width,
            height,
            samples_per_pixel,
            rows_per_strip,
            strip_offsets,
            next_row: 0,
        })
    }
}

impl<D: AsRef<[u8]>> RasterSource for TiffReader<D> {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn read_row(&mut self, out: &mut [u32]) -> Result<()> {
        if self.next_row >= self.height {
            return Err(Error::InvalidRaster("read past the last row".to_string()));
        }

        let row_bytes = self.width * self.samples_per_pixel;
        let strip = self.next_row / self.rows_per_strip;
        let start =
            self.strip_offsets[strip] + (self.next_row % self.rows_per_strip) * row_bytes;
        let row = self
            .data
            .as_ref()
            .get(start..start + row_bytes)
            .ok_or_else(|| Error::InvalidRaster(format!("row {} is truncated", self.next_row)))?;

        for (pixel, samples) in out.iter_mut().zip(row.chunks_exact(self.samples_per_pixel)) {
            *pixel = match samples {
                [gray] => gray_to_rgb(*gray),
                [r, g, b, ..] => pack_rgb(*r, *g, *b),
                _ => 0,
            };
        }
        self.next_row += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Cursor;

    #[test]
    fn test_write_then_read() -> Result<()> {
        // 10x12 image in 8x8 MCUs: two strips, the last one cropped to 4 rows
        let mut writer = TiffWriter::new(Cursor::new(vec![]), 10, 12, 8)?;
        for n in 0..4u32 {
            let mcu: Vec<u32> = (0..64).map(|i| n << 16 | i).collect();
            writer.write_row_block(&mcu, 1, 1)?;
        }
        let bytes = writer.close()?.into_inner();

        assert_eq!(&bytes[..4], b"II*\0");
        // 10 * 8 * 3 + 10 * 4 * 3 pixel bytes follow the header
        assert!(bytes.len() > 8 + 360);

        let mut reader = TiffReader::from_bytes(bytes)?;
        assert_eq!((reader.width(), reader.height()), (10, 12));

        let mut row = vec![0u32; 10];
        reader.read_row(&mut row)?;
        assert_eq!(row[0], 0);
        assert_eq!(row[7], 7);
        assert_eq!(row[8], 1 << 16);
        assert_eq!(row[9], 1 << 16 | 1);

        for _ in 1..9 {
            reader.read_row(&mut row)?;
        }
        // image row 9 is MCU row 1, pixel row 1
        assert_eq!(row[0], 2 << 16 | 8);
        assert_eq!(row[9], 3 << 16 | 9);

        Ok(())
    }

    #[test]
    fn test_close_before_complete_fails() -> Result<()> {
        let mut writer = TiffWriter::new(Cursor::new(vec![]), 16, 8, 8)?;
        writer.write_row_block(&[0; 64], 1, 1)?;
        assert!(writer.close().is_err());

        Ok(())
    }

    #[test]
    fn test_reads_big_endian_gray() -> Result<()> {
        let mut data = vec![];
        data.extend_from_slice(b"MM\0\x2A\0\0\0\x08");
        let entries: [(u16, u16, u32, u32); 5] = [
            (IMAGE_WIDTH, SHORT, 1, 2 << 16),
            (IMAGE_LENGTH, SHORT, 1, 1 << 16),
            (BITS_PER_SAMPLE, SHORT, 1, 8 << 16),
            (PHOTOMETRIC_INTERPRETATION, SHORT, 1, 1 << 16),
            (STRIP_OFFSETS, LONG, 1, 8 + 2 + 5 * 12 + 4),
        ];
        data.extend_from_slice(&(entries.len() as u16).to_be_bytes());
        for (tag, kind, count, value) in entries {
            data.extend_from_slice(&tag.to_be_bytes());
            data.extend_from_slice(&kind.to_be_bytes());
            data.extend_from_slice(&count.to_be_bytes());
            data.extend_from_slice(&value.to_be_bytes());
        }
        data.extend_from_slice(&[0, 0, 0, 0]);
        data.extend_from_slice(&[0x10, 0xF0]);

        let mut reader = TiffReader::from_bytes(data)?;
        let mut row = [0u32; 2];
        reader.read_row(&mut row)?;
        assert_eq!(row, [0x101010, 0xF0F0F0]);

        Ok(())
    }

    #[test]
    fn test_rejects_compressed() {
        let mut data = vec![];
        data.extend_from_slice(b"II\x2A\0\x08\0\0\0");
        data.extend_from_slice(&3u16.to_le_bytes());
        for (tag, value) in [(IMAGE_WIDTH, 1u32), (IMAGE_LENGTH, 1), (COMPRESSION, 5)] {
            data.extend_from_slice(&tag.to_le_bytes());
            data.extend_from_slice(&SHORT.to_le_bytes());
            data.extend_from_slice(&1u32.to_le_bytes());
            data.extend_from_slice(&value.to_le_bytes());
        }

        assert!(matches!(
            TiffReader::from_bytes(data),
            Err(Error::InvalidRaster(_))
        ));
    }
}
