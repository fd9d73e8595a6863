//! Domain models

pub use artifacts::*;
pub use chunks::*;
pub use engine::*;
pub use filenames::*;

mod artifacts;
mod chunks;
mod engine;
mod filenames;
