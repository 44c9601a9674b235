pub use archive::*;
pub use sample::*;
pub use train::*;

pub mod archive;
pub mod sample;
pub mod train;
