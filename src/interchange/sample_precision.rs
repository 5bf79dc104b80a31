use crate::error::{Error, Result};

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum SamplePrecision {
    EightBit,
    SixteenBit,
}

impl SamplePrecision {
    /// From the Pq nibble of a DQT table.
    pub(crate) fn decode(b: u8) -> Result<Self> {
        match b {
            0 => Ok(SamplePrecision::EightBit),
            1 => Ok(SamplePrecision::SixteenBit),
            _ => Err(Error::segment("DQT", format!("unknown table precision {b}"))),
        }
    }

    /// From the P byte of a frame header.
    pub(crate) fn parse(number_of_bits: u8) -> Result<Self> {
        match number_of_bits {
            8 => Ok(SamplePrecision::EightBit),
            16 => Ok(SamplePrecision::SixteenBit),
            _ => Err(Error::segment(
                "SOF0",
                format!("sample precision of {number_of_bits} bits"),
            )),
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            SamplePrecision::EightBit => 8,
            SamplePrecision::SixteenBit => 16,
        }
    }
}
