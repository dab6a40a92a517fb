pub mod archive;
pub mod cors;
pub mod error;
pub mod headers;
pub mod range;
pub mod tree;
