//! Huffman entropy coding of quantized coefficient blocks.

use std::io::{Seek, Write};

use crate::bitstream::{BitReader, BitWriter};
use crate::entropy::huffman_table::HuffmanTree;
use crate::error::{Error, Result};

pub mod block;
pub mod huffman_table;

/// AC symbol ending a block whose remaining coefficients are zero.
pub const END_OF_BLOCK: u8 = 0x00;
/// AC symbol standing for a run of 16 zero coefficients.
pub const ZERO_RUN_LENGTH: u8 = 0xF0;

/// Number of bits needed to represent `|value|`, 0 for 0.
pub fn magnitude_class(value: i32) -> u8 {
    (u32::BITS - value.unsigned_abs().leading_zeros()) as u8
}

/// The `class` raw bits transmitted after a magnitude class symbol. Negative values are sent as
/// `value + 2^class - 1`, which clears their top bit.
pub(crate) fn encode_magnitude(value: i32, class: u8) -> u32 {
    if value < 0 {
        (value + (1 << class) - 1) as u32
    } else {
        value as u32
    }
}

/// Inverse of [`encode_magnitude`].
pub(crate) fn extend(bits: u32, class: u8) -> i32 {
    if class == 0 {
        return 0;
    }

    if bits < 1 << (class - 1) {
        bits as i32 - (1 << class) + 1
    } else {
        bits as i32
    }
}

pub(crate) fn read_magnitude(reader: &mut BitReader, class: u8) -> Result<i32> {
    if class == 0 {
        return Ok(0);
    }

    match reader.read_bits(class, true)? {
        (bits, read) if read == class => Ok(extend(bits, class)),
        _ => Err(Error::TruncatedEntropyData),
    }
}

/// Destination of the symbols produced while scanning a block.
///
/// The encoder scans every block twice: once into a [`FrequencyCounter`] to learn the symbol
/// statistics, once into a [`HuffmanEmitter`] built from them.
pub(crate) trait SymbolSink {
    fn dc_symbol(&mut self, symbol: u8) -> Result<()>;

    fn ac_symbol(&mut self, symbol: u8) -> Result<()>;

    fn magnitude(&mut self, value: i32, class: u8) -> Result<()>;
}

pub(crate) struct FrequencyCounter<'a> {
    dc: &'a mut [u32; 256],
    ac: &'a mut [u32; 256],
}

impl<'a> FrequencyCounter<'a> {
    pub(crate) fn new(dc: &'a mut [u32; 256], ac: &'a mut [u32; 256]) -> Self {
        FrequencyCounter { dc, ac }
    }
}

impl SymbolSink for FrequencyCounter<'_> {
    fn dc_symbol(&mut self, symbol: u8) -> Result<()> {
        self.dc[symbol as usize] += 1;
        Ok(())
    }

    fn ac_symbol(&mut self, symbol: u8) -> Result<()> {
        self.ac[symbol as usize] += 1;
        Ok(())
    }

    fn magnitude(&mut self, _value: i32, _class: u8) -> Result<()> {
        Ok(())
    }
}

pub(crate) struct HuffmanEmitter<'a, W: Write + Seek> {
    writer: &'a mut BitWriter<W>,
    dc: &'a HuffmanTree,
    ac: &'a HuffmanTree,
}

impl<'a, W: Write + Seek> HuffmanEmitter<'a, W> {
    pub(crate) fn new(writer: &'a mut BitWriter<W>, dc: &'a HuffmanTree, ac: &'a HuffmanTree) -> Self {
        HuffmanEmitter { writer, dc, ac }
    }
}

impl<W: Write + Seek> SymbolSink for HuffmanEmitter<'_, W> {
    fn dc_symbol(&mut self, symbol: u8) -> Result<()> {
        self.dc.encode_symbol(symbol, self.writer)
    }

    fn ac_symbol(&mut self, symbol: u8) -> Result<()> {
        self.ac.encode_symbol(symbol, self.writer)
    }

    fn magnitude(&mut self, value: i32, class: u8) -> Result<()> {
        if class == 0 {
            return Ok(());
        }
        self.writer
            .write_bits(encode_magnitude(value, class), class, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_magnitude_class() {
        assert_eq!(magnitude_class(0), 0);
        assert_eq!(magnitude_class(1), 1);
        assert_eq!(magnitude_class(-1), 1);
        assert_eq!(magnitude_class(2), 2);
        assert_eq!(magnitude_class(-3), 2);
        assert_eq!(magnitude_class(255), 8);
        assert_eq!(magnitude_class(-1024), 11);
        assert_eq!(magnitude_class(2047), 11);
    }

    #[test]
    fn test_magnitude_class_invariant() {
        for v in -4096i32..=4096 {
            let class = magnitude_class(v);
            assert_eq!(class, magnitude_class(-v));

            if class == 0 {
                assert_eq!(v, 0);
            } else {
                let abs = v.unsigned_abs();
                assert!(1u32 << (class - 1) <= abs && abs < 1u32 << class, "{v}");
            }
        }
    }

    #[test]
    fn test_extend_inverts_encode_magnitude() {
        assert_eq!(encode_magnitude(-1, 1), 0);
        assert_eq!(encode_magnitude(-3, 2), 0b00);
        assert_eq!(encode_magnitude(-2, 2), 0b01);
        assert_eq!(encode_magnitude(5, 3), 0b101);

        for v in -2047i32..=2047 {
            let class = magnitude_class(v);
            let bits = encode_magnitude(v, class);
            assert!(class == 0 || bits < 1 << class);
            assert_eq!(extend(bits, class), v);
        }
    }

    #[test]
    fn test_frequency_counter() -> Result<()> {
        let mut dc = [0u32; 256];
        let mut ac = [0u32; 256];

        {
            let mut counter = FrequencyCounter::new(&mut dc, &mut ac);
            counter.dc_symbol(3)?;
            counter.magnitude(-5, 3)?;
            counter.ac_symbol(END_OF_BLOCK)?;
            counter.ac_symbol(END_OF_BLOCK)?;
            counter.ac_symbol(ZERO_RUN_LENGTH)?;
        }

        assert_eq!(dc[3], 1);
        assert_eq!(dc.iter().sum::<u32>(), 1);
        assert_eq!(ac[0x00], 2);
        assert_eq!(ac[0xF0], 1);

        Ok(())
    }
}
