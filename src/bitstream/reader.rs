use crate::error::{Error, Result};

/// Outcome of pulling the next byte into the bit buffer.
enum Fill {
    Loaded,
    /// A `0xFF` not followed by a stuffed `0x00`; the `0xFF` is left unconsumed.
    Marker,
    Eof,
}

/// Byte-buffered, bit-addressable reader over a JPEG byte stream.
///
/// Bits are read most-significant first. `bits_left` counts the bits of `current` that have not
/// been handed out yet: 0 means the reader sits on a byte boundary, 8 means `current` was loaded
/// but none of its bits were consumed.
pub struct BitReader<'a> {
    pub(crate) data: &'a [u8],
    pub(crate) byte_cur: usize,
    current: u8,
    bits_left: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_cur: 0,
            current: 0,
            bits_left: 0,
        }
    }

    /// Reads `count` bits (1..=32), returning `(value, bits_actually_read)`.
    ///
    /// With `stuffing`, a `0xFF 0x00` pair yields the single data byte `0xFF`, while a `0xFF`
    /// followed by anything else is a marker boundary: reading stops there and fewer bits than
    /// requested are returned. Running out of input before a single bit could be read is an
    /// error.
    pub fn read_bits(&mut self, count: u8, stuffing: bool) -> Result<(u32, u8)> {
        debug_assert!((1..=32).contains(&count));

        if !stuffing && self.bits_left == 0 && count % 8 == 0 {
            let len = count as usize / 8;
            let bytes = self
                .data
                .get(self.byte_cur..self.byte_cur + len)
                .ok_or(Error::UnexpectedEof)?;
            let value = bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);
            self.byte_cur += len;
            return Ok((value, count));
        }

        let mut value = 0u32;
        let mut read = 0u8;

        while read < count {
            if self.bits_left == 0 {
                match self.fill(stuffing) {
                    Fill::Loaded => {}
                    Fill::Marker => break,
                    Fill::Eof if read == 0 => return Err(Error::UnexpectedEof),
                    Fill::Eof => break,
                }
            }

            self.bits_left -= 1;
            value = (value << 1) | ((self.current >> self.bits_left) & 1) as u32;
            read += 1;
        }

        Ok((value, read))
    }

    /// Reads one stuffed bit of entropy-coded data, or `None` at a marker boundary.
    pub fn read_bit(&mut self) -> Result<Option<u8>> {
        match self.read_bits(1, true)? {
            (bit, 1) => Ok(Some(bit as u8)),
            _ => Ok(None),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        match self.read_bits(8, false)? {
            (value, 8) => Ok(value as u8),
            _ => Err(Error::UnexpectedEof),
        }
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        match self.read_bits(16, false)? {
            (value, 16) => Ok(value as u16),
            _ => Err(Error::UnexpectedEof),
        }
    }

    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        self.align();
        let data = self.data;
        let bytes = data
            .get(self.byte_cur..self.byte_cur + len)
            .ok_or(Error::UnexpectedEof)?;
        self.byte_cur += len;
        Ok(bytes)
    }

    /// Drops the unread bits of the current byte.
    pub fn align(&mut self) {
        self.bits_left = 0;
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_slice(len).map(|_| ())
    }

    /// Discards bytes until `marker` has been consumed.
    ///
    /// A buffered byte none of whose bits were handed out counts as a candidate; partially read
    /// bytes are dropped. On success the matched byte is behind the cursor, so the next aligned
    /// read returns the byte that follows it.
    pub fn skip_until(&mut self, marker: u8) -> Result<()> {
        if self.bits_left == 8 && self.current == marker {
            self.bits_left = 0;
            return Ok(());
        }
        self.bits_left = 0;

        let offset = self.data[self.byte_cur.min(self.data.len())..]
            .iter()
            .position(|&b| b == marker)
            .ok_or(Error::UnexpectedEof)?;
        self.byte_cur += offset + 1;

        Ok(())
    }

    pub fn seek(&mut self, pos: usize) {
        self.byte_cur = pos;
        self.bits_left = 0;
    }

    /// Offset of the next byte that has not been loaded.
    pub fn tell(&self) -> usize {
        self.byte_cur
    }

    pub fn at_end(&self) -> bool {
        self.bits_left == 0 && self.byte_cur >= self.data.len()
    }

    fn fill(&mut self, stuffing: bool) -> Fill {
        let Some(&byte) = self.data.get(self.byte_cur) else {
            return Fill::Eof;
        };

        if stuffing && byte == 0xFF {
            match self.data.get(self.byte_cur + 1) {
                Some(0x00) => self.byte_cur += 2,
                _ => return Fill::Marker,
            }
        } else {
            self.byte_cur += 1;
        }

        self.current = byte;
        self.bits_left = 8;
        Fill::Loaded
    }
}
