pub mod common;
pub mod feed;
pub mod image;
pub mod wire;

pub use common::*;
pub use feed::*;
pub use image::*;
pub use wire::*;
