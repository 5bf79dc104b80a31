/// Bit-level access to entropy-coded data, with JPEG byte stuffing.
pub mod bitstream;
pub mod color_spaces;
pub mod dct;

/// The decoder takes as input compressed image data and table specifications, and by means of a
/// specific set of procedures generates as output `digital reconstructed image data`.
pub mod decoder;

/// The encoder takes as input digital source image data and table specifications, and by means
/// of a specific set of procedures generates as output compressed image data.
pub mod encoder;

pub mod entropy;
pub mod error;
pub mod interchange;
pub mod quantize;
pub mod raster;
pub mod sampling;

pub use decoder::{decode, decode_to_buffer, JpegDecoder};
pub use encoder::{encode, encode_to_vec, EncoderOptions};
pub use error::{Error, Result};
pub use interchange::component::FrameInfo;
pub use interchange::reader::JpegReader;
pub use raster::tiff::{TiffReader, TiffWriter};
pub use raster::{PixelBuffer, RasterSink, RasterSource};
