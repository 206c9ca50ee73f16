pub mod bm25;
pub mod config;
pub mod fuse;
