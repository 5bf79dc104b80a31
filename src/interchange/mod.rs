//! The JPEG interchange format: markers, header segments, and the frame they describe.

pub mod component;
pub mod jfif;
pub mod marker;
pub mod reader;
pub mod sample_precision;
