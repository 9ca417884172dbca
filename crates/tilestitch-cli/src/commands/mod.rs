pub mod batch;
pub mod config;
pub mod info;
pub mod stitch;
pub mod thumbnail;
