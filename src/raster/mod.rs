//! Uncompressed raster images on either side of the codec.
//!
//! Pixels are packed `0x00RRGGBB`. The decoder hands its output over one MCU at a time, in
//! raster order of the MCU grid; the encoder pulls its input one row at a time.

pub mod tiff;

use crate::error::{Error, Result};

/// Receives decoded MCUs.
pub trait RasterSink {
    /// Appends one MCU, `8 * blocks_h` pixels wide and `8 * blocks_v` tall, row-major. Pixels
    /// falling outside the image are dropped.
    fn write_row_block(&mut self, pixels: &[u32], blocks_h: usize, blocks_v: usize) -> Result<()>;
}

/// Supplies rows of an image to encode, top to bottom.
pub trait RasterSource {
    fn width(&self) -> usize;

    fn height(&self) -> usize;

    /// Fills `out` (at least `width` long) with the next row.
    fn read_row(&mut self, out: &mut [u32]) -> Result<()>;
}

/// Position of the next MCU in an image of fixed size.
#[derive(Debug, Clone)]
pub(crate) struct McuCursor {
    width: usize,
    height: usize,
    x: usize,
    y: usize,
}

impl McuCursor {
    pub(crate) fn new(width: usize, height: usize) -> Self {
        McuCursor {
            width,
            height,
            x: 0,
            y: 0,
        }
    }

    /// Returns the top-left pixel of the next MCU and moves past it, wrapping to the next MCU
    /// row at the right edge.
    pub(crate) fn advance(&mut self, mcu_width: usize, mcu_height: usize) -> Result<(usize, usize)> {
        if self.is_done() {
            return Err(Error::InvalidRaster(
                "more MCUs than the image holds".to_string(),
            ));
        }

        let origin = (self.x, self.y);
        self.x += mcu_width;
        if self.x >= self.width {
            self.x = 0;
            self.y += mcu_height;
        }

        Ok(origin)
    }

    /// Whether the last MCU placed completed a row of MCUs.
    pub(crate) fn at_row_start(&self) -> bool {
        self.x == 0
    }

    pub(crate) fn is_done(&self) -> bool {
        self.y >= self.height
    }
}

/// Copies the part of an MCU placed at `(x0, y0)` that falls inside a row-major
/// `dst_width` x `dst_height` destination.
pub(crate) fn blit_mcu<T: Copy>(
    dst: &mut [T],
    dst_width: usize,
    dst_height: usize,
    (x0, y0): (usize, usize),
    mcu: &[T],
    mcu_width: usize,
) {
    let mcu_height = mcu.len() / mcu_width;
    let cols = mcu_width.min(dst_width.saturating_sub(x0));
    let rows = mcu_height.min(dst_height.saturating_sub(y0));

    for row in 0..rows {
        let dst_start = (y0 + row) * dst_width + x0;
        dst[dst_start..dst_start + cols].copy_from_slice(&mcu[row * mcu_width..][..cols]);
    }
}

/// An image held in memory, usable both as a decode target and an encode source.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
    cursor: McuCursor,
    next_row: usize,
}

impl PixelBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        PixelBuffer {
            width,
            height,
            pixels: vec![0; width * height],
            cursor: McuCursor::new(width, height),
            next_row: 0,
        }
    }

    pub fn from_pixels(width: usize, height: usize, pixels: Vec<u32>) -> Result<Self> {
        if pixels.len() != width * height {
            return Err(Error::InvalidRaster(format!(
                "{} pixels for a {width}x{height} image",
                pixels.len()
            )));
        }

        Ok(PixelBuffer {
            pixels,
            ..PixelBuffer::new(width, height)
        })
    }

    /// Reads every row of `source`.
    pub fn read_from(source: &mut impl RasterSource) -> Result<Self> {
        let (width, height) = (source.width(), source.height());
        let mut buffer = PixelBuffer::new(width, height);

        for row in buffer.pixels.chunks_exact_mut(width.max(1)) {
            source.read_row(row)?;
        }

        Ok(buffer)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        self.pixels[y * self.width + x]
    }
}

impl RasterSink for PixelBuffer {
    fn write_row_block(&mut self, pixels: &[u32], blocks_h: usize, blocks_v: usize) -> Result<()> {
        let (mcu_width, mcu_height) = (blocks_h * 8, blocks_v * 8);
        if pixels.len() != mcu_width * mcu_height {
            return Err(Error::InvalidRaster(format!(
                "MCU of {} pixels, expected {mcu_width}x{mcu_height}",
                pixels.len()
            )));
        }

        let origin = self.cursor.advance(mcu_width, mcu_height)?;
        blit_mcu(&mut self.pixels, self.width, self.height, origin, pixels, mcu_width);

        Ok(())
    }
}

impl RasterSource for PixelBuffer {
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

        let start = self.next_row * self.width;
        out[..self.width].copy_from_slice(&self.pixels[start..start + self.width]);
        self.next_row += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_mcus_are_cropped_at_the_edges() -> Result<()> {
        // 12x10 image, 8x8 MCUs: a 2x2 grid
        let mut buffer = PixelBuffer::new(12, 10);
        for n in 0..4u32 {
            buffer.write_row_block(&[n + 1; 64], 1, 1)?;
        }

        assert_eq!(buffer.pixel(0, 0), 1);
        assert_eq!(buffer.pixel(11, 7), 2);
        assert_eq!(buffer.pixel(7, 8), 3);
        assert_eq!(buffer.pixel(11, 9), 4);
        assert!(buffer.write_row_block(&[0; 64], 1, 1).is_err());

        Ok(())
    }

    #[test]
    fn test_rows_come_back_in_order() -> Result<()> {
        let mut buffer = PixelBuffer::from_pixels(2, 2, vec![1, 2, 3, 4])?;
        let mut row = [0u32; 2];

        buffer.read_row(&mut row)?;
        assert_eq!(row, [1, 2]);
        buffer.read_row(&mut row)?;
        assert_eq!(row, [3, 4]);
        assert!(buffer.read_row(&mut row).is_err());

        assert!(PixelBuffer::from_pixels(3, 2, vec![0; 5]).is_err());
        Ok(())
    }

    #[test]
    fn test_wide_mcus() -> Result<()> {
        let mut buffer = PixelBuffer::new(20, 8);
        let mut mcu = vec![0u32; 16 * 16];
        for (i, p) in mcu.iter_mut().enumerate() {
            *p = i as u32;
        }

        buffer.write_row_block(&mcu, 2, 2)?;
        buffer.write_row_block(&mcu, 2, 2)?;

        assert_eq!(buffer.pixel(15, 7), 7 * 16 + 15);
        assert_eq!(buffer.pixel(19, 0), 3);
        assert!(buffer.write_row_block(&mcu, 2, 2).is_err());

        Ok(())
    }
}
