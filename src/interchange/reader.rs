use std::fs::File;
use std::path::Path;

use memmap::Mmap;

use crate::decoder::JpegDecoder;
use crate::error::Result;
use crate::interchange::component::FrameInfo;
use crate::raster::{PixelBuffer, RasterSink};

/// A JPEG file mapped into memory.
pub struct JpegReader {
    mmap: Mmap,
}

impl JpegReader {
    pub fn from_file(file: File) -> Result<Self> {
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(JpegReader { mmap })
    }

    pub fn from_file_path<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let file = File::open(file_path)?;
        JpegReader::from_file(file)
    }

    pub fn data(&self) -> &[u8] {
        &self.mmap
    }

    pub fn decoder(&self) -> JpegDecoder<'_> {
        JpegDecoder::new(&self.mmap)
    }

    pub fn decode_into(&self, sink: &mut impl RasterSink) -> Result<FrameInfo> {
        self.decoder().decode_into(sink)
    }

    pub fn decode_to_buffer(&self) -> Result<PixelBuffer> {
        crate::decoder::decode_to_buffer(&self.mmap)
    }
}
