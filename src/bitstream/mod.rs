//! Bit-level access to JPEG streams, including the `0xFF 0x00` byte stuffing used inside
//! entropy-coded segments.

pub(crate) mod reader;
pub(crate) mod writer;

pub use reader::BitReader;
pub use writer::BitWriter;
