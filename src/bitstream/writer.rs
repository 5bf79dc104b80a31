use std::io::{Seek, SeekFrom, Write};

use crate::error::Result;

/// Bit-level writer for JPEG streams.
///
/// Entropy-coded bits accumulate MSB-first in `current`; `bits_used` is the number of pending
/// bits and is 0 on a byte boundary. Byte-aligned writes bypass stuffing.
pub struct BitWriter<W: Write + Seek> {
    inner: W,
    current: u8,
    bits_used: u8,
}

impl<W: Write + Seek> BitWriter<W> {
    pub fn new(inner: W) -> Self {
        BitWriter {
            inner,
            current: 0,
            bits_used: 0,
        }
    }

    /// Appends one bit. A completed byte is written out, followed by a `0x00` pad when
    /// `stuffing` is set and the byte was `0xFF`.
    pub fn write_bit(&mut self, bit: u8, stuffing: bool) -> Result<()> {
        self.current = (self.current << 1) | (bit & 1);
        self.bits_used += 1;

        if self.bits_used == 8 {
            let byte = self.current;
            self.current = 0;
            self.bits_used = 0;

            self.inner.write_all(&[byte])?;
            if stuffing && byte == 0xFF {
                self.inner.write_all(&[0x00])?;
            }
        }

        Ok(())
    }

    /// Writes the low `count` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u32, count: u8, stuffing: bool) -> Result<()> {
        debug_assert!(count <= 32);
        for i in (0..count).rev() {
            self.write_bit(((value >> i) & 1) as u8, stuffing)?;
        }
        Ok(())
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        debug_assert_eq!(self.bits_used, 0, "byte write on a partial byte");
        self.inner.write_all(&[byte])?;
        Ok(())
    }

    pub fn write_u16_be(&mut self, value: u16) -> Result<()> {
        debug_assert_eq!(self.bits_used, 0, "byte write on a partial byte");
        self.inner.write_all(&value.to_be_bytes())?;
        Ok(())
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        debug_assert_eq!(self.bits_used, 0, "byte write on a partial byte");
        self.inner.write_all(bytes)?;
        Ok(())
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        debug_assert_eq!(self.bits_used, 0, "seek on a partial byte");
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    /// Writes out a pending partial byte, its unused low bits set to zero.
    pub fn flush(&mut self) -> Result<()> {
        if self.bits_used > 0 {
            let byte = self.current << (8 - self.bits_used);
            self.current = 0;
            self.bits_used = 0;
            self.inner.write_all(&[byte])?;
        }
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Cursor;

    fn writer() -> BitWriter<Cursor<Vec<u8>>> {
        BitWriter::new(Cursor::new(vec![]))
    }

    #[test]
    fn test_write_bits() -> Result<()> {
        let mut w = writer();
        w.write_bits(0b1010, 4, true)?;
        w.write_bits(0b0101, 4, true)?;
        w.write_bits(0b110, 3, true)?;
        w.flush()?;

        assert_eq!(w.into_inner().into_inner(), vec![0xA5, 0xC0]);
        Ok(())
    }

    #[test]
    fn test_stuffing_only_when_requested() -> Result<()> {
        let mut w = writer();
        w.write_bits(0xFF, 8, true)?;
        w.write_bits(0xFF, 8, false)?;
        w.write_byte(0xFF)?;
        w.flush()?;

        assert_eq!(w.into_inner().into_inner(), vec![0xFF, 0x00, 0xFF, 0xFF]);
        Ok(())
    }

    #[test]
    fn test_patch_length_placeholder() -> Result<()> {
        let mut w = writer();
        w.write_u16_be(0xFFFE)?;
        let length_at = w.tell()?;
        w.write_u16_be(0)?;
        w.write_all(b"hello")?;
        let end = w.tell()?;

        w.seek(length_at)?;
        w.write_u16_be((end - length_at) as u16)?;
        w.seek(end)?;
        w.write_byte(0x01)?;

        assert_eq!(
            w.into_inner().into_inner(),
            vec![0xFF, 0xFE, 0x00, 0x07, b'h', b'e', b'l', b'l', b'o', 0x01]
        );
        Ok(())
    }
}
