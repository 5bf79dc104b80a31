//! Zigzag serialization and (de)quantization of 8x8 coefficient blocks.

pub mod quantization_table;

use crate::entropy::block::BLOCK_SIZE;

/// Position in the zigzag scan of each coefficient of a row-major 8x8 block.
pub const ZIGZAG: [usize; BLOCK_SIZE] = [
    0, 1, 5, 6, 14, 15, 27, 28, //
    2, 4, 7, 13, 16, 26, 29, 42, //
    3, 8, 12, 17, 25, 30, 41, 43, //
    9, 11, 18, 24, 31, 40, 44, 53, //
    10, 19, 23, 32, 39, 45, 52, 54, //
    20, 22, 33, 38, 46, 51, 55, 60, //
    21, 34, 37, 47, 50, 56, 59, 61, //
    35, 36, 48, 49, 57, 58, 62, 63,
];

/// Scales zigzag-ordered coefficients by a zigzag-ordered table, returning them in natural
/// (row-major) order.
pub fn dequantize(coeffs: &[i32; BLOCK_SIZE], table: &[u8; BLOCK_SIZE]) -> [i32; BLOCK_SIZE] {
    let mut out = [0i32; BLOCK_SIZE];
    for (i, &zz) in ZIGZAG.iter().enumerate() {
        out[i] = coeffs[zz] * table[zz] as i32;
    }
    out
}

/// Divides natural-order coefficients by a zigzag-ordered table, returning them in zigzag
/// order.
///
/// Division truncates toward zero, so `-7 / 2 == -3`.
pub fn quantize(coeffs: &[i32; BLOCK_SIZE], table: &[u8; BLOCK_SIZE]) -> [i32; BLOCK_SIZE] {
    let mut out = [0i32; BLOCK_SIZE];
    for (i, &zz) in ZIGZAG.iter().enumerate() {
        out[zz] = coeffs[i] / table[zz] as i32;
    }
    out
}
