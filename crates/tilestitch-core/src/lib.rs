pub mod align;
pub mod batch;
pub mod consts;
pub mod error;
pub mod export;
pub mod io;
pub mod mosaic;
pub mod pipeline;
pub mod rescale;
pub mod thumbnail;
pub mod tile;
