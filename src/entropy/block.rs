use log::trace;

use crate::bitstream::BitReader;
use crate::entropy::huffman_table::HuffmanTree;
use crate::entropy::{
    magnitude_class, read_magnitude, SymbolSink, END_OF_BLOCK, ZERO_RUN_LENGTH,
};
use crate::error::{Error, Result};

/// Coefficients per 8x8 block.
pub const BLOCK_SIZE: usize = 64;

/// Largest DC difference class that an 8-bit baseline stream can carry.
const MAX_DC_CLASS: u8 = 11;

/// Largest AC magnitude class that an 8-bit baseline stream can carry.
const MAX_AC_CLASS: u8 = 10;

/// Largest magnitude of a quantized DC coefficient for 8-bit samples.
const MAX_DC: i32 = (1 << MAX_DC_CLASS) - 1;

/// Decodes one block of quantized coefficients, returned in zigzag order.
///
/// `last_dc` is the component's DC predictor; it is updated with this block's DC value.
pub fn unpack_block(
    reader: &mut BitReader,
    dc_table: &HuffmanTree,
    ac_table: &HuffmanTree,
    last_dc: &mut i32,
) -> Result<[i32; BLOCK_SIZE]> {
    let mut coeffs = [0i32; BLOCK_SIZE];

    let class = dc_table.decode_symbol(reader)?;
    if class > MAX_DC_CLASS {
        return Err(Error::InvalidDcClass(class));
    }
    let dc = *last_dc + read_magnitude(reader, class)?;
    if dc.abs() > MAX_DC {
        return Err(Error::DcOutOfRange(dc));
    }
    *last_dc = dc;
    coeffs[0] = dc;

    let mut k = 1;
    while k < BLOCK_SIZE {
        let symbol = ac_table.decode_symbol(reader)?;

        match symbol {
            END_OF_BLOCK => break,
            ZERO_RUN_LENGTH => {
                if k + 16 > BLOCK_SIZE {
                    return Err(Error::InvalidAcSymbol { symbol, index: k });
                }
                k += 16;
            }
            _ => {
                let run = (symbol >> 4) as usize;
                let class = symbol & 0x0F;

                k += run;
                if class == 0 || class > MAX_AC_CLASS || k >= BLOCK_SIZE {
                    return Err(Error::InvalidAcSymbol { symbol, index: k });
                }

                coeffs[k] = read_magnitude(reader, class)?;
                k += 1;
            }
        }
    }

    Ok(coeffs)
}

/// Scans one block of zigzag-ordered coefficients into `sink`.
///
/// Emits the DC difference against `last_dc` (then updates it), followed by the AC
/// coefficients as zero-run/magnitude symbols. Runs of 16 or more zeros followed by a non-zero
/// coefficient are split with ZRL symbols; trailing zeros collapse into a single EOB.
pub(crate) fn pack_block(
    coeffs: &[i32; BLOCK_SIZE],
    last_dc: &mut i32,
    sink: &mut impl SymbolSink,
) -> Result<()> {
    let diff = coeffs[0] - *last_dc;
    *last_dc = coeffs[0];

    let class = magnitude_class(diff);
    sink.dc_symbol(class)?;
    sink.magnitude(diff, class)?;

    let mut run = 0u8;
    for &coeff in &coeffs[1..] {
        if coeff == 0 {
            run += 1;
            continue;
        }

        while run >= 16 {
            sink.ac_symbol(ZERO_RUN_LENGTH)?;
            run -= 16;
        }

        let class = magnitude_class(coeff);
        if class > MAX_AC_CLASS {
            return Err(Error::InvalidParameter(format!(
                "AC coefficient {coeff} does not fit a baseline magnitude class"
            )));
        }
        sink.ac_symbol((run << 4) | class)?;
        sink.magnitude(coeff, class)?;
        run = 0;
    }

    if run > 0 {
        trace!("end of block after {run} trailing zeros");
        sink.ac_symbol(END_OF_BLOCK)?;
    }

    Ok(())
}
