use thiserror::Error;

use crate::entropy::huffman_table::HuffmanClass;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected end of data")]
    UnexpectedEof,
    #[error("missing SOI marker (0xFFD8), found {0:02X}{1:02X}")]
    MissingStartOfImage(u8, u8),
    #[error("expected {expected}, found marker 0xFF{found:02X}")]
    UnexpectedMarker { expected: &'static str, found: u8 },
    #[error("expected a marker prefix 0xFF, found {0:#04x}")]
    MissingMarkerPrefix(u8),
    #[error("{segment} segment declares {declared} bytes but {consumed} were consumed")]
    SegmentLength {
        segment: &'static str,
        declared: usize,
        consumed: usize,
    },
    #[error("invalid {segment} segment: {reason}")]
    InvalidSegment {
        segment: &'static str,
        reason: String,
    },
    #[error("pixel data reached before required sections: missing {0}")]
    MissingSections(String),
    #[error("malformed Huffman table: {0}")]
    MalformedHuffmanTable(&'static str),
    #[error("{0:?} Huffman table {1} is not defined")]
    MissingHuffmanTable(HuffmanClass, u8),
    #[error("quantization table {0} is not defined")]
    MissingQuantTable(u8),
    #[error("invalid Huffman code in entropy-coded data")]
    InvalidHuffmanCode,
    #[error("DC magnitude class {0} is out of range")]
    InvalidDcClass(u8),
    #[error("DC coefficient {0} is outside the 8-bit baseline range")]
    DcOutOfRange(i32),
    #[error("invalid AC symbol {symbol:#04x} at coefficient {index}")]
    InvalidAcSymbol { symbol: u8, index: usize },
    #[error("entropy-coded data ended at a marker before the image was complete")]
    TruncatedEntropyData,
    // Internal: the table builder did not assign a code to a symbol it was asked to emit.
    #[error("symbol {1:#04x} missing from {0:?} Huffman table")]
    SymbolNotFound(HuffmanClass, u8),
    #[error("unsupported JPEG feature: {0}")]
    Unsupported(String),
    #[error("invalid raster container: {0}")]
    InvalidRaster(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl Error {
    pub(crate) fn segment(segment: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidSegment {
            segment,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
