use crate::entropy::block::BLOCK_SIZE;
use crate::interchange::sample_precision::SamplePrecision;

/// ITU-T T.81 Table K.1, in zigzag order.
pub const LUMINANCE: [u8; BLOCK_SIZE] = [
    16, 11, 12, 14, 12, 10, 16, 14, //
    13, 14, 18, 17, 16, 19, 24, 40, //
    26, 24, 22, 22, 24, 49, 35, 37, //
    29, 40, 58, 51, 61, 60, 57, 51, //
    56, 55, 64, 72, 92, 78, 64, 68, //
    87, 69, 55, 56, 80, 109, 81, 87, //
    95, 98, 103, 104, 103, 62, 77, 113, //
    121, 112, 100, 120, 92, 101, 103, 99,
];

/// ITU-T T.81 Table K.2, in zigzag order.
pub const CHROMINANCE: [u8; BLOCK_SIZE] = [
    17, 18, 18, 24, 21, 24, 47, 26, //
    26, 47, 99, 66, 56, 66, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99,
];

/// Highest quality setting accepted by [`scaled_table`].
pub const MAX_QUALITY: u8 = 25;

/// Interpolates a baseline table: `1 + (base - 1) * quality`, so quality 0 is all ones.
pub fn scaled_table(base: &[u8; BLOCK_SIZE], quality: u8) -> [u8; BLOCK_SIZE] {
    let mut table = [1u8; BLOCK_SIZE];
    for (out, &b) in table.iter_mut().zip(base) {
        let scaled = 1 + (b as u32 - 1) * quality as u32;
        *out = scaled.min(255) as u8;
    }
    table
}

/// The set of 64 quantization values used to quantize the DCT coefficients
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizationTable {
    /// Specifies the precision of the qk values. Only 8-bit values are accepted.
    pub(crate) precision: SamplePrecision,

    /// Specifies one of the destinations (0..=15) into which the table is installed.
    pub(crate) table_destination_id: u8,

    /// The quantization elements, in zig-zag scan order.
    pub(crate) elements: [u8; BLOCK_SIZE],
}

impl QuantizationTable {
    pub(crate) fn from(table_destination_id: u8, elements: [u8; BLOCK_SIZE]) -> Self {
        QuantizationTable {
            precision: SamplePrecision::EightBit,
            table_destination_id,
            elements,
        }
    }

    pub fn destination_id(&self) -> u8 {
        self.table_destination_id
    }

    pub fn elements(&self) -> &[u8; BLOCK_SIZE] {
        &self.elements
    }
}
