pub mod image_io;
pub mod pattern;
pub mod reader;
