mod assemble;
mod buffer;
mod crop;

pub use assemble::{assemble, AssembledMosaic, MosaicPlan};
pub use buffer::MosaicBuffer;
pub use crop::{CropSpec, CropWindow};
