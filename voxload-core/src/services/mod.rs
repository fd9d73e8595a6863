mod archives;
mod artifacts;
mod chunks;
mod coordinator;
mod locks;

pub use archives::*;
pub use artifacts::*;
pub use chunks::*;
pub use coordinator::*;
pub use locks::*;
